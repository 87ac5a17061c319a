//! Timestamped sample front-end driving the filter and the displacement integrator

use log::debug;
use nalgebra::{UnitQuaternion, Vector3};

use crate::displacement::Displacement;
use crate::ekf::Ekf;
use crate::error::{FilterError, Sensor};
use crate::math::Vector3Ext;
use crate::types::{AngleAxis, FilterFlags, ImuSettings};

const MICROSECONDS_PER_SECOND: f64 = 1e6;

/// IMU sample processor
///
/// Accepts gyroscope, accelerometer and magnetometer samples with microsecond
/// timestamps and keeps the orientation, linear acceleration and displacement
/// estimates current:
///
/// - every gyroscope sample after the first predicts the filter over the
///   elapsed time and advances the displacement integrator
/// - every accelerometer sample corrects the filter, together with the latest
///   magnetometer sample if any
/// - magnetometer samples are only stored
///
/// Hosts that need change notification poll [`version`](Imu::version), which
/// increments whenever the estimate changes.
///
/// # Example
/// ```
/// use imu_ekf::Imu;
/// use nalgebra::Vector3;
///
/// let mut imu = Imu::new();
///
/// for i in 0..100u64 {
///     let timestamp = i * 10_000; // 100 Hz
///     imu.on_gyroscope(timestamp, Vector3::new(0.0, 0.0, 0.5)).unwrap();
///     imu.on_accelerometer(timestamp, Vector3::new(0.0, 0.0, 9.81)).unwrap();
/// }
///
/// let rotation = imu.rotation();
/// assert!((rotation.angle - 0.495).abs() < 0.01);
/// ```
#[derive(Debug, Clone)]
pub struct Imu {
    ekf: Ekf,
    displacement: Displacement,
    gyroscope_timestamp: Option<u64>,
    accelerometer_timestamp: Option<u64>,
    magnetometer_timestamp: Option<u64>,
    magnetometer: Option<Vector3<f64>>,
    version: u64,
}

impl Imu {
    /// Create a new processor with default settings
    pub fn new() -> Self {
        Self::build(Ekf::new(), ImuSettings::default())
    }

    /// Create a new processor with the specified settings
    pub fn with_settings(settings: ImuSettings) -> Result<Self, FilterError> {
        let ekf = Ekf::with_settings(settings.ekf)?;
        Ok(Self::build(ekf, settings))
    }

    fn build(ekf: Ekf, settings: ImuSettings) -> Self {
        Self {
            ekf,
            displacement: Displacement::new(settings.displacement),
            gyroscope_timestamp: None,
            accelerometer_timestamp: None,
            magnetometer_timestamp: None,
            magnetometer: None,
            version: 0,
        }
    }

    /// Process a gyroscope sample
    ///
    /// # Arguments
    /// * `timestamp` - Sample time in microseconds, strictly increasing
    /// * `angular_velocity` - Angular velocity in rad/s, body frame
    ///
    /// The first sample only starts the clock.
    pub fn on_gyroscope(
        &mut self,
        timestamp: u64,
        angular_velocity: Vector3<f64>,
    ) -> Result<(), FilterError> {
        if !angular_velocity.is_finite() {
            debug!("gyroscope sample dropped: non-finite value");
            return Err(FilterError::NonFinite(Sensor::Gyroscope));
        }

        let Some(previous) = self.gyroscope_timestamp else {
            self.gyroscope_timestamp = Some(timestamp);
            return Ok(());
        };
        if timestamp <= previous {
            debug!("gyroscope sample dropped: timestamp {timestamp} after {previous}");
            return Err(FilterError::OutOfOrder(Sensor::Gyroscope));
        }

        let delta_time = (timestamp - previous) as f64 / MICROSECONDS_PER_SECOND;
        self.ekf.predict(angular_velocity, delta_time)?;
        self.gyroscope_timestamp = Some(timestamp);

        if self.ekf.has_accelerometer() {
            self.displacement.advance(
                &self.ekf.linear_acceleration(),
                &angular_velocity,
                delta_time,
            );
        }

        self.bump_version();
        Ok(())
    }

    /// Process an accelerometer sample
    ///
    /// # Arguments
    /// * `timestamp` - Sample time in microseconds, strictly increasing
    /// * `acceleration` - Measured acceleration in m/s², gravity reaction included
    ///
    /// Requires a prior gyroscope sample; without one the sample is refused with
    /// [`FilterError::Uninitialised`].
    pub fn on_accelerometer(
        &mut self,
        timestamp: u64,
        acceleration: Vector3<f64>,
    ) -> Result<(), FilterError> {
        if self.gyroscope_timestamp.is_none() {
            return Err(FilterError::Uninitialised);
        }
        if self.accelerometer_timestamp.is_some_and(|previous| timestamp <= previous) {
            debug!("accelerometer sample dropped: out-of-order timestamp {timestamp}");
            return Err(FilterError::OutOfOrder(Sensor::Accelerometer));
        }

        self.ekf.correct(acceleration, self.magnetometer)?;
        self.accelerometer_timestamp = Some(timestamp);
        self.bump_version();
        Ok(())
    }

    /// Store a magnetometer sample for the next correction
    ///
    /// # Arguments
    /// * `timestamp` - Sample time in microseconds, strictly increasing
    /// * `field` - Magnetic flux in any consistent unit
    pub fn on_magnetometer(&mut self, timestamp: u64, field: Vector3<f64>) -> Result<(), FilterError> {
        if !field.is_finite() {
            debug!("magnetometer sample dropped: non-finite value");
            return Err(FilterError::NonFinite(Sensor::Magnetometer));
        }
        if self.magnetometer_timestamp.is_some_and(|previous| timestamp <= previous) {
            debug!("magnetometer sample dropped: out-of-order timestamp {timestamp}");
            return Err(FilterError::OutOfOrder(Sensor::Magnetometer));
        }

        self.magnetometer = Some(field);
        self.magnetometer_timestamp = Some(timestamp);
        Ok(())
    }

    /// Current orientation with respect to the ground frame
    pub fn rotation(&self) -> AngleAxis {
        self.ekf.rotation()
    }

    pub fn quaternion(&self) -> UnitQuaternion<f64> {
        self.ekf.quaternion()
    }

    /// Current gravity-free linear acceleration in the ground frame
    pub fn linear_acceleration(&self) -> Vector3<f64> {
        self.ekf.linear_acceleration()
    }

    /// Make the current pose the reference for displacement queries
    pub fn reset_displacement(&mut self) {
        self.displacement.reset(self.ekf.quaternion());
        self.bump_version();
    }

    /// Translation since the last displacement reset, in the device frame at reset time
    pub fn linear_displacement(&self) -> Vector3<f64> {
        self.displacement.translation()
    }

    /// Rotation since the last displacement reset, in the device frame at reset time
    pub fn angular_displacement(&self) -> AngleAxis {
        self.displacement.rotation(&self.ekf.quaternion())
    }

    /// Counter incremented whenever the estimate changes
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn flags(&self) -> FilterFlags {
        self.ekf.flags()
    }

    pub fn ekf(&self) -> &Ekf {
        &self.ekf
    }

    pub fn displacement(&self) -> &Displacement {
        &self.displacement
    }

    fn bump_version(&mut self) {
        self.version = self.version.wrapping_add(1);
    }
}

impl Default for Imu {
    fn default() -> Self {
        Self::new()
    }
}
