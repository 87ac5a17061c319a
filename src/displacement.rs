//! Velocity and displacement integration on top of the filter output

use nalgebra::{ComplexField, UnitQuaternion, Vector3};

use crate::math::QuaternionExt;
use crate::types::{AngleAxis, DisplacementSettings};

/// Displacement integrator
///
/// Integrates the filter's ground-frame linear acceleration into a velocity and
/// a position. Double integration of a noisy acceleration drifts quickly, so
/// the velocity is multiplied on every step by two decay factors that vanish
/// when the device was inertially quiet on the previous step, i.e. when its
/// angular rate or linear acceleration was close to zero.
///
/// Displacements are reported relative to a reference captured by
/// [`reset`](Displacement::reset), expressed in the device frame at that time.
///
/// # Example
/// ```
/// use imu_ekf::{Displacement, DisplacementSettings};
/// use nalgebra::{UnitQuaternion, Vector3};
///
/// let mut displacement = Displacement::new(DisplacementSettings::default());
/// displacement.reset(UnitQuaternion::identity());
///
/// for _ in 0..10 {
///     displacement.advance(&Vector3::new(1.0, 0.0, 0.0), &Vector3::new(0.0, 0.0, 0.5), 0.01);
/// }
/// assert!(displacement.translation().x > 0.0);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Displacement {
    settings: DisplacementSettings,
    /// Ground-frame velocity in m/s
    velocity: Vector3<f64>,
    /// Ground-frame position in m
    position: Vector3<f64>,
    reference_orientation: UnitQuaternion<f64>,
    reference_position: Vector3<f64>,
    /// Angular rate magnitude of the previous step
    angular_rate: f64,
    /// Linear acceleration magnitude of the previous step
    acceleration: f64,
}

impl Displacement {
    pub fn new(settings: DisplacementSettings) -> Self {
        Self {
            settings,
            velocity: Vector3::zeros(),
            position: Vector3::zeros(),
            reference_orientation: UnitQuaternion::identity(),
            reference_position: Vector3::zeros(),
            angular_rate: 0.0,
            acceleration: 0.0,
        }
    }

    /// Integrate one filter step
    ///
    /// The velocity decays with the motion of the previous step, so a device
    /// starting from rest only begins to move on its second moving step.
    ///
    /// # Arguments
    /// * `acceleration` - Gravity-free linear acceleration in the ground frame, m/s²
    /// * `angular_velocity` - Gyroscope reading in rad/s
    /// * `delta_time` - Time step in seconds; non-positive steps are ignored
    pub fn advance(
        &mut self,
        acceleration: &Vector3<f64>,
        angular_velocity: &Vector3<f64>,
        delta_time: f64,
    ) {
        if !(delta_time.is_finite() && delta_time > 0.0) {
            return;
        }

        let decay = decay_factor(self.settings.angular_decay, self.angular_rate)
            * decay_factor(self.settings.linear_decay, self.acceleration);

        self.velocity = (self.velocity + acceleration * delta_time) * decay;
        self.position += self.velocity * delta_time;
        self.angular_rate = angular_velocity.norm();
        self.acceleration = acceleration.norm();
    }

    /// Re-baseline the displacement reference to the current pose
    pub fn reset(&mut self, orientation: UnitQuaternion<f64>) {
        self.reference_orientation = orientation;
        self.reference_position = self.position;
    }

    /// Translation since the last reset, in the device frame at reset time
    pub fn translation(&self) -> Vector3<f64> {
        self.reference_orientation
            .inverse_transform_vector(&(self.position - self.reference_position))
    }

    /// Rotation from the reset orientation to `orientation`, in the device frame at reset time
    pub fn rotation(&self, orientation: &UnitQuaternion<f64>) -> AngleAxis {
        (self.reference_orientation.inverse() * orientation).to_angle_axis()
    }

    pub fn velocity(&self) -> Vector3<f64> {
        self.velocity
    }

    pub fn position(&self) -> Vector3<f64> {
        self.position
    }
}

impl Default for Displacement {
    fn default() -> Self {
        Self::new(DisplacementSettings::default())
    }
}

/// `(1 − e^{−k·x}) / (1 + e^{−k·x})`: zero at rest, tending to one with motion
fn decay_factor(rate: f64, magnitude: f64) -> f64 {
    let e = ComplexField::exp(-rate * magnitude);
    (1.0 - e) / (1.0 + e)
}
