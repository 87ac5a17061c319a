//! Observation model: gravity and magnetic north as seen from the body frame

use nalgebra::{Vector3, Vector4};

use crate::math::{
    MeasurementMatrix, MeasurementVector, ObservationMatrix, StateVector, Vector3Ext,
    inverse_rotation_jacobian, rotate_inverse,
};
use crate::noise::{AdaptiveNoise, NoiseEstimate};

/// Projected magnetic vectors shorter than this are treated as missing
const MIN_HORIZONTAL_FIELD: f64 = 1e-9;

/// Output of one observation model evaluation
#[derive(Debug, Clone, Copy)]
pub struct Observation {
    /// Measurement `z = (a − bias, m)`
    pub measurement: MeasurementVector,
    /// Predicted measurement `h(X)`
    pub predicted: MeasurementVector,
    /// Jacobian `H = ∂h/∂X`
    pub jacobian: ObservationMatrix,
    /// Observation noise `R = diag(I₃·Rg, I₃·Ry)`
    pub noise: MeasurementMatrix,
    /// Noise levels behind `noise`, committed to the estimator once the correction is applied
    pub estimate: NoiseEstimate,
    /// Whether the magnetic rows carry information
    pub magnetometer_used: bool,
}

/// Expected readings: gravity along ground `z`, magnetic north along ground `y`
///
/// The magnetometer reading is projected onto the plane orthogonal to the
/// estimated floor normal and normalized, so that only its heading informs the
/// correction. Without a usable magnetometer reading the magnetic rows of `z`,
/// `h` and `H` are all zero.
#[derive(Debug, Clone, Copy)]
pub struct ObservationModel {
    gravity: f64,
    accelerometer_bias: Vector3<f64>,
}

impl ObservationModel {
    pub fn new(gravity: f64, accelerometer_bias: Vector3<f64>) -> Self {
        Self {
            gravity,
            accelerometer_bias,
        }
    }

    /// Remove the configured bias from a raw accelerometer reading
    pub fn corrected_accelerometer(&self, accelerometer: &Vector3<f64>) -> Vector3<f64> {
        accelerometer - self.accelerometer_bias
    }

    /// Evaluate `z`, `h`, `H` and `R` at the predicted state
    ///
    /// # Arguments
    /// * `state` - Predicted state with a unit quaternion
    /// * `accelerometer` - Bias-corrected accelerometer reading in m/s²
    /// * `magnetometer` - Latest magnetometer reading, if any
    /// * `angular_velocity` - Latest gyroscope reading in rad/s
    /// * `elapsed` - Seconds of filter time since initialisation
    /// * `noise` - Adaptive noise estimator; its running means are left untouched
    pub fn observe(
        &self,
        state: &StateVector,
        accelerometer: &Vector3<f64>,
        magnetometer: Option<&Vector3<f64>>,
        angular_velocity: &Vector3<f64>,
        elapsed: f64,
        noise: &AdaptiveNoise,
    ) -> Observation {
        let quaternion: Vector4<f64> = state.fixed_rows::<4>(0).into_owned();
        let up = Vector3::z();
        let north = Vector3::y();
        let floor = rotate_inverse(&quaternion, &up);

        let estimate = noise.estimate(angular_velocity, accelerometer, magnetometer, &floor, elapsed);
        let levels = estimate.levels;

        let mut measurement = MeasurementVector::zeros();
        let mut predicted = MeasurementVector::zeros();
        let mut jacobian = ObservationMatrix::zeros();

        let gravity = up * self.gravity;
        measurement.fixed_rows_mut::<3>(0).copy_from(accelerometer);
        predicted
            .fixed_rows_mut::<3>(0)
            .copy_from(&rotate_inverse(&quaternion, &gravity));
        jacobian
            .fixed_view_mut::<3, 4>(0, 0)
            .copy_from(&inverse_rotation_jacobian(&quaternion, &gravity));

        let horizontal = magnetometer
            .map(|m| m - floor * m.dot(&floor))
            .filter(|m| m.norm() > MIN_HORIZONTAL_FIELD);

        if let Some(horizontal) = horizontal {
            measurement
                .fixed_rows_mut::<3>(3)
                .copy_from(&horizontal.safe_normalize());
            predicted
                .fixed_rows_mut::<3>(3)
                .copy_from(&rotate_inverse(&quaternion, &north));
            jacobian
                .fixed_view_mut::<3, 4>(3, 0)
                .copy_from(&inverse_rotation_jacobian(&quaternion, &north));
        }

        let covariance = MeasurementMatrix::from_diagonal(&MeasurementVector::new(
            levels.gravity,
            levels.gravity,
            levels.gravity,
            levels.magnetic,
            levels.magnetic,
            levels.magnetic,
        ));

        Observation {
            measurement,
            predicted,
            jacobian,
            noise: covariance,
            estimate,
            magnetometer_used: horizontal.is_some(),
        }
    }
}
