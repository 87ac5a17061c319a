//! Extended Kalman filter over the quaternion/acceleration state

use log::{debug, warn};
use nalgebra::{UnitQuaternion, Vector3, Vector4};

use crate::error::{FilterError, Sensor};
use crate::math::{
    MeasurementVector, QuaternionExt, StateMatrix, StateVector, Vector3Ext, normalize_and_align,
    unit_quaternion,
};
use crate::noise::{AdaptiveNoise, NoiseLevels};
use crate::observation::ObservationModel;
use crate::process::ProcessModel;
use crate::types::{AngleAxis, EkfSettings, FilterFlags, FilterInternalStates};

/// Extended Kalman filter estimating orientation and linear acceleration
///
/// The state is `X = (q, a)`: the unit quaternion `q = (w, x, y, z)` rotating
/// body-frame vectors into the ground frame, and the gravity-free linear
/// acceleration `a` in the ground frame. Gyroscope samples drive
/// [`predict`](Ekf::predict); accelerometer samples, optionally paired with the
/// latest magnetometer sample, drive [`correct`](Ekf::correct).
///
/// After both steps the quaternion is renormalized and kept on the same
/// hemisphere as the previous estimate.
///
/// # Example
/// ```
/// use imu_ekf::Ekf;
/// use nalgebra::Vector3;
///
/// let mut ekf = Ekf::new();
///
/// ekf.predict(Vector3::new(0.0, 0.0, 0.1), 0.01).unwrap();
/// ekf.correct(Vector3::new(0.0, 0.0, 9.81), None).unwrap();
///
/// let rotation = ekf.rotation();
/// assert!(rotation.angle < 0.01);
/// ```
#[derive(Debug, Clone)]
pub struct Ekf {
    settings: EkfSettings,
    process: ProcessModel,
    observation: ObservationModel,
    noise: AdaptiveNoise,
    /// State estimate `(qw, qx, qy, qz, ax, ay, az)`
    state: StateVector,
    /// State covariance
    covariance: StateMatrix,
    /// Latest gyroscope reading in rad/s
    angular_velocity: Vector3<f64>,
    /// Latest bias-corrected accelerometer reading in m/s²
    accelerometer: Option<Vector3<f64>>,
    /// Filter time accumulated from gyroscope time steps
    elapsed: f64,
    levels: NoiseLevels,
    innovation: MeasurementVector,
    magnetometer_used: bool,
    covariance_resets: u32,
}

impl Ekf {
    /// Create a new filter with default settings
    pub fn new() -> Self {
        Self::build(EkfSettings::default())
    }

    /// Create a new filter with the specified settings
    pub fn with_settings(settings: EkfSettings) -> Result<Self, FilterError> {
        settings.validate()?;
        Ok(Self::build(settings))
    }

    fn build(settings: EkfSettings) -> Self {
        let mut ekf = Ekf {
            settings,
            process: ProcessModel::new(settings.gravity, settings.process_noise),
            observation: ObservationModel::new(settings.gravity, settings.accelerometer_bias),
            noise: AdaptiveNoise::new(settings.noise, settings.gravity),
            state: StateVector::zeros(),
            covariance: StateMatrix::zeros(),
            angular_velocity: Vector3::zeros(),
            accelerometer: None,
            elapsed: 0.0,
            levels: NoiseLevels {
                gravity: settings.noise.warmup_gravity,
                magnetic: settings.noise.warmup_magnetic,
            },
            innovation: MeasurementVector::zeros(),
            magnetometer_used: false,
            covariance_resets: 0,
        };
        ekf.initialise();
        ekf
    }

    /// Reset state, covariance and running statistics to their initial values
    pub fn initialise(&mut self) {
        self.state = StateVector::zeros();
        self.state[0] = 1.0;
        self.covariance = self.prior();
        self.noise.reset();
        self.angular_velocity = Vector3::zeros();
        self.accelerometer = None;
        self.elapsed = 0.0;
        self.levels = NoiseLevels {
            gravity: self.settings.noise.warmup_gravity,
            magnetic: self.settings.noise.warmup_magnetic,
        };
        self.innovation = MeasurementVector::zeros();
        self.magnetometer_used = false;
        self.covariance_resets = 0;
    }

    /// Reset the filter (alias for initialise)
    pub fn reset(&mut self) {
        self.initialise();
    }

    pub fn settings(&self) -> EkfSettings {
        self.settings
    }

    /// Propagate the estimate with a gyroscope reading
    ///
    /// # Arguments
    /// * `angular_velocity` - Gyroscope reading in rad/s, body frame
    /// * `delta_time` - Seconds since the previous gyroscope reading, must be positive
    ///
    /// Invalid samples are rejected without touching the estimate.
    pub fn predict(
        &mut self,
        angular_velocity: Vector3<f64>,
        delta_time: f64,
    ) -> Result<(), FilterError> {
        if !(delta_time.is_finite() && delta_time > 0.0) {
            debug!("gyroscope sample dropped: time step {delta_time}");
            return Err(FilterError::InvalidTimeStep(delta_time));
        }
        if !angular_velocity.is_finite() {
            debug!("gyroscope sample dropped: non-finite value");
            return Err(FilterError::NonFinite(Sensor::Gyroscope));
        }

        let previous = self.quaternion_coords();
        let prediction = self.process.predict(
            &self.state,
            &angular_velocity,
            self.accelerometer.as_ref(),
            delta_time,
        );

        self.state = prediction.state;
        self.covariance =
            prediction.jacobian * self.covariance * prediction.jacobian.transpose() + prediction.noise;
        self.angular_velocity = angular_velocity;
        self.elapsed += delta_time;

        self.normalize_quaternion(&previous);
        self.check_covariance();
        Ok(())
    }

    /// Correct the estimate with an accelerometer and optional magnetometer reading
    ///
    /// # Arguments
    /// * `accelerometer` - Raw accelerometer reading in m/s², gravity reaction included
    /// * `magnetometer` - Latest magnetometer reading in any consistent unit, if available
    ///
    /// Without a magnetometer reading only pitch and roll are corrected. When the
    /// innovation covariance cannot be inverted the sample is discarded: state,
    /// noise statistics and the stored accelerometer reading keep their
    /// predicted values and [`FilterError::SingularInnovation`] is returned.
    pub fn correct(
        &mut self,
        accelerometer: Vector3<f64>,
        magnetometer: Option<Vector3<f64>>,
    ) -> Result<(), FilterError> {
        if !accelerometer.is_finite() {
            debug!("accelerometer sample dropped: non-finite value");
            return Err(FilterError::NonFinite(Sensor::Accelerometer));
        }
        if magnetometer.is_some_and(|m| !m.is_finite()) {
            debug!("magnetometer sample dropped: non-finite value");
            return Err(FilterError::NonFinite(Sensor::Magnetometer));
        }

        let accelerometer = self.observation.corrected_accelerometer(&accelerometer);
        let observation = self.observation.observe(
            &self.state,
            &accelerometer,
            magnetometer.as_ref(),
            &self.angular_velocity,
            self.elapsed,
            &self.noise,
        );

        let innovation = observation.measurement - observation.predicted;
        let h = observation.jacobian;
        let innovation_covariance = h * self.covariance * h.transpose() + observation.noise;

        let Some(inverse) = innovation_covariance
            .try_inverse()
            .filter(|inverse| inverse.iter().all(|v| v.is_finite()))
        else {
            warn!("innovation covariance is singular, correction skipped");
            return Err(FilterError::SingularInnovation);
        };

        self.noise.commit(&observation.estimate);
        self.levels = observation.estimate.levels;
        self.accelerometer = Some(accelerometer);

        let gain = self.covariance * h.transpose() * inverse;
        let previous = self.quaternion_coords();

        self.state += gain * innovation;
        self.covariance = (StateMatrix::identity() - gain * h) * self.covariance;
        self.innovation = innovation;
        self.magnetometer_used = observation.magnetometer_used;

        self.normalize_quaternion(&previous);
        self.check_covariance();
        Ok(())
    }

    /// Get current orientation quaternion
    pub fn quaternion(&self) -> UnitQuaternion<f64> {
        unit_quaternion(&self.quaternion_coords())
    }

    /// Get current orientation in angle-axis form
    pub fn rotation(&self) -> AngleAxis {
        self.quaternion().to_angle_axis()
    }

    /// Get the gravity-free linear acceleration in the ground frame
    pub fn linear_acceleration(&self) -> Vector3<f64> {
        self.state.fixed_rows::<3>(4).into_owned()
    }

    /// Whether an accelerometer sample has been seen since initialisation
    pub fn has_accelerometer(&self) -> bool {
        self.accelerometer.is_some()
    }

    pub fn state(&self) -> &StateVector {
        &self.state
    }

    pub fn covariance(&self) -> &StateMatrix {
        &self.covariance
    }

    /// Seconds of filter time since initialisation
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Get algorithm flags
    pub fn flags(&self) -> FilterFlags {
        FilterFlags {
            warming_up: self.elapsed < self.settings.noise.warmup_duration,
            magnetometer_used: self.magnetometer_used,
            covariance_resets: self.covariance_resets,
        }
    }

    /// Get internal algorithm states
    pub fn internal_states(&self) -> FilterInternalStates {
        let means = self.noise.means();
        FilterInternalStates {
            gravity_noise: self.levels.gravity,
            magnetic_noise: self.levels.magnetic,
            magnitude_mean: means.magnitude,
            dip_mean: means.dip,
            innovation: self.innovation.into(),
            covariance_trace: self.covariance.trace(),
            quaternion: self.quaternion_coords(),
        }
    }

    fn prior(&self) -> StateMatrix {
        StateMatrix::from_diagonal(&self.settings.initial_covariance)
    }

    fn quaternion_coords(&self) -> Vector4<f64> {
        self.state.fixed_rows::<4>(0).into_owned()
    }

    fn normalize_quaternion(&mut self, previous: &Vector4<f64>) {
        let aligned = normalize_and_align(&self.quaternion_coords(), previous);
        self.state.fixed_rows_mut::<4>(0).copy_from(&aligned);
    }

    /// Symmetrize the covariance and fall back to the prior if it has diverged
    fn check_covariance(&mut self) {
        self.covariance = (self.covariance + self.covariance.transpose()) * 0.5;

        let trace = self.covariance.trace();
        let diverged = !trace.is_finite()
            || trace > self.settings.max_covariance_trace
            || self.covariance.diagonal().iter().any(|v| *v < 0.0);

        if diverged {
            warn!("state covariance diverged (trace {trace}), resetting to prior");
            self.covariance = self.prior();
            self.covariance_resets = self.covariance_resets.saturating_add(1);
        }
    }
}

impl Default for Ekf {
    fn default() -> Self {
        Self::new()
    }
}
