//! Process model: gyroscope-driven state propagation

use nalgebra::{Vector3, Vector4};

use crate::math::{StateMatrix, StateVector, omega_matrix, rotate, rotation_jacobian};

/// Output of one process model evaluation
#[derive(Debug, Clone, Copy)]
pub struct Prediction {
    /// Predicted state `f(X, u)`
    pub state: StateVector,
    /// Jacobian `F = ∂f/∂X` evaluated at the previous state
    pub jacobian: StateMatrix,
    /// Process noise `Q` for this time step
    pub noise: StateMatrix,
}

/// Propagates the state with the angular velocity and the latest accelerometer sample
///
/// The orientation is integrated to first order through the Hamilton product
/// with the body-frame angular velocity. The linear acceleration is re-derived
/// on every step from the accelerometer sample rotated into the ground frame,
/// minus gravity.
#[derive(Debug, Clone, Copy)]
pub struct ProcessModel {
    gravity: f64,
    /// Process noise per second
    noise: StateMatrix,
}

impl ProcessModel {
    pub fn new(gravity: f64, noise: StateMatrix) -> Self {
        Self { gravity, noise }
    }

    /// Evaluate `f`, `F` and `Q` at `state`
    ///
    /// # Arguments
    /// * `state` - Previous a posteriori state with a unit quaternion
    /// * `angular_velocity` - Gyroscope reading in rad/s, body frame
    /// * `accelerometer` - Latest bias-corrected accelerometer reading in m/s², if any
    /// * `delta_time` - Time since the previous gyroscope sample in seconds
    ///
    /// Without an accelerometer reading the acceleration block is carried over unchanged.
    pub fn predict(
        &self,
        state: &StateVector,
        angular_velocity: &Vector3<f64>,
        accelerometer: Option<&Vector3<f64>>,
        delta_time: f64,
    ) -> Prediction {
        let quaternion: Vector4<f64> = state.fixed_rows::<4>(0).into_owned();
        let half_omega = omega_matrix(angular_velocity) * (0.5 * delta_time);

        let mut predicted = *state;
        predicted
            .fixed_rows_mut::<4>(0)
            .copy_from(&(quaternion + half_omega * quaternion));

        let mut jacobian = StateMatrix::identity();
        let mut orientation_block = jacobian.fixed_view_mut::<4, 4>(0, 0);
        orientation_block += half_omega;

        if let Some(accelerometer) = accelerometer {
            let ground = rotate(&quaternion, accelerometer) - Vector3::new(0.0, 0.0, self.gravity);
            predicted.fixed_rows_mut::<3>(4).copy_from(&ground);

            jacobian
                .fixed_view_mut::<3, 4>(4, 0)
                .copy_from(&rotation_jacobian(&quaternion, accelerometer));
            jacobian.fixed_view_mut::<3, 3>(4, 4).fill(0.0);
        }

        Prediction {
            state: predicted,
            jacobian,
            noise: self.noise * delta_time,
        }
    }
}
