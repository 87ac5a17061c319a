//! Settings, diagnostics and output types for the IMU filter

use nalgebra::{Vector3, Vector4};

use crate::error::FilterError;
use crate::math::{STANDARD_GRAVITY, StateMatrix, StateVector};

/// Rotation expressed as a unit axis and an angle in radians
///
/// The identity rotation has a zero axis and a zero angle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleAxis {
    /// Unit rotation axis, or zero for the identity
    pub axis: Vector3<f64>,
    /// Rotation angle in radians, in `[0, π]`
    pub angle: f64,
}

impl AngleAxis {
    pub fn identity() -> Self {
        Self {
            axis: Vector3::zeros(),
            angle: 0.0,
        }
    }
}

impl Default for AngleAxis {
    fn default() -> Self {
        Self::identity()
    }
}

/// Coefficients of the accelerometer (gravity) observation noise `Rg`
///
/// `Rg = base + angular_rate·|w| + gravity_deviation·|g − |a||`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GravityNoise {
    /// Constant term (`Rg_k0`)
    pub base: f64,
    /// Weight of the angular rate magnitude in rad/s (`Rg_kw`)
    pub angular_rate: f64,
    /// Weight of the accelerometer magnitude deviation from gravity (`Rg_kg`)
    pub gravity_deviation: f64,
}

impl Default for GravityNoise {
    fn default() -> Self {
        Self {
            base: 0.1,
            angular_rate: 0.5,
            gravity_deviation: 1.0,
        }
    }
}

/// Coefficients of the magnetometer (north) observation noise `Ry`
///
/// `Ry = base + angular_rate·|w| + gravity_deviation·|g − |a|| +
/// magnitude_deviation·||m| − mean| + dip_deviation·|dip − dip mean|`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagneticNoise {
    /// Constant term (`Ry_k0`)
    pub base: f64,
    /// Weight of the angular rate magnitude (`Ry_kw`)
    pub angular_rate: f64,
    /// Weight of the accelerometer magnitude deviation from gravity (`Ry_kg`)
    pub gravity_deviation: f64,
    /// Weight of the field magnitude deviation from its running mean (`Ry_kn`)
    pub magnitude_deviation: f64,
    /// Weight of the dip angle deviation from its running mean in rad (`Ry_kd`)
    pub dip_deviation: f64,
}

impl Default for MagneticNoise {
    fn default() -> Self {
        Self {
            base: 0.05,
            angular_rate: 0.5,
            gravity_deviation: 0.5,
            magnitude_deviation: 0.05,
            dip_deviation: 1.0,
        }
    }
}

/// Adaptive observation noise settings
///
/// # Example
/// ```
/// use imu_ekf::{GravityNoise, NoiseSettings};
///
/// let settings = NoiseSettings {
///     gravity: GravityNoise { base: 0.2, ..Default::default() },
///     warmup_duration: 5.0,
///     ..Default::default()
/// };
/// assert_eq!(settings.mean_alpha, 0.99);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseSettings {
    pub gravity: GravityNoise,
    pub magnetic: MagneticNoise,
    /// Smoothing factor of the magnetic magnitude and dip angle means, in `[0, 1]`
    ///
    /// Higher values make the means follow new samples more slowly.
    pub mean_alpha: f64,
    /// Duration in seconds during which the warm-up noise values are used
    pub warmup_duration: f64,
    /// Gravity observation noise during warm-up
    pub warmup_gravity: f64,
    /// Magnetic observation noise during warm-up
    pub warmup_magnetic: f64,
}

impl Default for NoiseSettings {
    fn default() -> Self {
        Self {
            gravity: GravityNoise::default(),
            magnetic: MagneticNoise::default(),
            mean_alpha: 0.99,
            warmup_duration: 2.0,
            warmup_gravity: 1e-3,
            warmup_magnetic: 1e-3,
        }
    }
}

/// Extended Kalman filter settings
///
/// # Example
/// ```
/// use imu_ekf::{Ekf, EkfSettings};
/// use nalgebra::Vector3;
///
/// let settings = EkfSettings {
///     accelerometer_bias: Vector3::new(0.02, -0.01, 0.05),
///     ..Default::default()
/// };
/// let ekf = Ekf::with_settings(settings).unwrap();
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EkfSettings {
    /// Gravity magnitude in m/s²
    pub gravity: f64,
    /// Accelerometer bias subtracted from every accelerometer sample
    pub accelerometer_bias: Vector3<f64>,
    /// Process noise per second; scaled by the gyroscope time step
    pub process_noise: StateMatrix,
    /// Diagonal of the initial state covariance
    pub initial_covariance: StateVector,
    /// Covariance trace above which the covariance is considered diverged
    pub max_covariance_trace: f64,
    pub noise: NoiseSettings,
}

impl EkfSettings {
    /// Check the settings for values the filter cannot operate with
    pub fn validate(&self) -> Result<(), FilterError> {
        if !(self.gravity.is_finite() && self.gravity > 0.0) {
            return Err(FilterError::InvalidSettings("gravity must be positive"));
        }
        if !self.accelerometer_bias.iter().all(|v| v.is_finite()) {
            return Err(FilterError::InvalidSettings("accelerometer bias must be finite"));
        }
        if !self.process_noise.iter().all(|v| v.is_finite()) {
            return Err(FilterError::InvalidSettings("process noise must be finite"));
        }
        if !self.initial_covariance.iter().all(|v| v.is_finite() && *v >= 0.0) {
            return Err(FilterError::InvalidSettings(
                "initial covariance must be finite and non-negative",
            ));
        }
        if !(self.max_covariance_trace > 0.0) {
            return Err(FilterError::InvalidSettings(
                "maximum covariance trace must be positive",
            ));
        }

        let noise = &self.noise;
        if !(0.0..=1.0).contains(&noise.mean_alpha) {
            return Err(FilterError::InvalidSettings("mean alpha must lie in [0, 1]"));
        }
        if !(noise.warmup_duration >= 0.0) {
            return Err(FilterError::InvalidSettings(
                "warm-up duration must be non-negative",
            ));
        }
        let coefficients = [
            noise.gravity.base,
            noise.gravity.angular_rate,
            noise.gravity.gravity_deviation,
            noise.magnetic.base,
            noise.magnetic.angular_rate,
            noise.magnetic.gravity_deviation,
            noise.magnetic.magnitude_deviation,
            noise.magnetic.dip_deviation,
            noise.warmup_gravity,
            noise.warmup_magnetic,
        ];
        if !coefficients.iter().all(|v| v.is_finite() && *v >= 0.0) {
            return Err(FilterError::InvalidSettings(
                "noise coefficients must be finite and non-negative",
            ));
        }
        Ok(())
    }
}

impl Default for EkfSettings {
    fn default() -> Self {
        Self {
            gravity: STANDARD_GRAVITY,
            accelerometer_bias: Vector3::zeros(),
            process_noise: StateMatrix::from_diagonal(&StateVector::from_column_slice(&[
                1e-3, 1e-3, 1e-3, 1e-3, 1.0, 1.0, 1.0,
            ])),
            initial_covariance: StateVector::from_element(1.0),
            max_covariance_trace: 1e6,
            noise: NoiseSettings::default(),
        }
    }
}

/// Velocity decay settings of the displacement integrator
///
/// The decay factor `(1 − e^{−k·x}) / (1 + e^{−k·x})` tends to zero when the
/// device is inertially quiet, pulling the velocity estimate back to rest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplacementSettings {
    /// Rate `k` applied to the angular velocity magnitude (`w_decay`)
    pub angular_decay: f64,
    /// Rate `k` applied to the linear acceleration magnitude (`a_decay`)
    pub linear_decay: f64,
}

impl Default for DisplacementSettings {
    fn default() -> Self {
        Self {
            angular_decay: 20.0,
            linear_decay: 10.0,
        }
    }
}

/// Settings of the [`Imu`](crate::Imu) front-end
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ImuSettings {
    pub ekf: EkfSettings,
    pub displacement: DisplacementSettings,
}

/// Filter status flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterFlags {
    /// Whether the warm-up observation noise is in effect
    pub warming_up: bool,
    /// Whether the last correction used a magnetometer sample
    pub magnetometer_used: bool,
    /// Number of times the covariance was reset to the prior after diverging
    pub covariance_resets: u32,
}

/// Filter internal states
///
/// Diagnostic values from the most recent correction, useful for tuning the
/// noise coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterInternalStates {
    /// Gravity observation noise used by the last correction
    pub gravity_noise: f64,
    /// Magnetic observation noise used by the last correction
    pub magnetic_noise: f64,
    /// Running mean of the magnetic field magnitude, if any sample was seen
    pub magnitude_mean: Option<f64>,
    /// Running mean of the dip angle in radians, if any sample was seen
    pub dip_mean: Option<f64>,
    /// Innovation `z − h` of the last correction
    pub innovation: [f64; 6],
    /// Trace of the state covariance
    pub covariance_trace: f64,
    /// Orientation quaternion `(w, x, y, z)`
    pub quaternion: Vector4<f64>,
}
