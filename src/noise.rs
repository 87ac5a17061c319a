//! Adaptive observation noise
//!
//! The accelerometer is only a good gravity sensor when the device is not
//! accelerating, and the magnetometer is only a good compass away from magnetic
//! disturbances. The observation noise therefore grows with the angular rate,
//! with the deviation of the accelerometer magnitude from gravity, and with the
//! deviation of the magnetic field magnitude and dip angle from their running
//! means.

use log::info;
use nalgebra::{ComplexField, Vector3};

use crate::math::angle_between;
use crate::types::NoiseSettings;

/// Observation noise variances for one correction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseLevels {
    /// Variance of each accelerometer component (`Rg`)
    pub gravity: f64,
    /// Variance of each projected magnetometer component (`Ry`)
    pub magnetic: f64,
}

/// Running statistics of the magnetometer signal
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AdaptiveMeans {
    /// Smoothed magnetic field magnitude
    pub magnitude: Option<f64>,
    /// Smoothed angle between the floor normal and the magnetic field, in radians
    pub dip: Option<f64>,
}

/// Noise levels for one correction, with the statistics to commit once it is applied
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseEstimate {
    pub levels: NoiseLevels,
    elapsed: f64,
    warming_up: bool,
    /// Magnetic field magnitude and dip angle of the sample, if any
    sample: Option<(f64, f64)>,
}

/// Adaptive estimator of the accelerometer and magnetometer observation noise
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveNoise {
    settings: NoiseSettings,
    gravity: f64,
    means: AdaptiveMeans,
    warming_up: bool,
}

impl AdaptiveNoise {
    pub fn new(settings: NoiseSettings, gravity: f64) -> Self {
        Self {
            settings,
            gravity,
            means: AdaptiveMeans::default(),
            warming_up: true,
        }
    }

    /// Forget the running means
    pub fn reset(&mut self) {
        self.means = AdaptiveMeans::default();
        self.warming_up = true;
    }

    pub fn means(&self) -> AdaptiveMeans {
        self.means
    }

    /// Whether the last committed estimate used the warm-up noise values
    pub fn is_warming_up(&self) -> bool {
        self.warming_up
    }

    /// Compute the noise levels for a correction without touching the running means
    ///
    /// # Arguments
    /// * `angular_velocity` - Latest gyroscope reading in rad/s
    /// * `accelerometer` - Bias-corrected accelerometer reading in m/s²
    /// * `magnetometer` - Magnetometer reading, if one is available
    /// * `floor` - Estimated floor normal in the body frame
    /// * `elapsed` - Seconds of filter time since initialisation
    pub fn estimate(
        &self,
        angular_velocity: &Vector3<f64>,
        accelerometer: &Vector3<f64>,
        magnetometer: Option<&Vector3<f64>>,
        floor: &Vector3<f64>,
        elapsed: f64,
    ) -> NoiseEstimate {
        let rate = angular_velocity.norm();
        let gravity_deviation = ComplexField::abs(self.gravity - accelerometer.norm());
        let sample = magnetometer.map(|m| (m.norm(), angle_between(floor, m)));
        let warming_up = elapsed < self.settings.warmup_duration;

        let levels = if warming_up {
            NoiseLevels {
                gravity: self.settings.warmup_gravity,
                magnetic: self.settings.warmup_magnetic,
            }
        } else {
            let g = &self.settings.gravity;
            let m = &self.settings.magnetic;

            let (magnitude_deviation, dip_deviation) = match sample {
                Some((magnitude, dip)) => (
                    deviation(magnitude, self.means.magnitude),
                    deviation(dip, self.means.dip),
                ),
                None => (0.0, 0.0),
            };

            NoiseLevels {
                gravity: g.base + g.angular_rate * rate + g.gravity_deviation * gravity_deviation,
                magnetic: m.base
                    + m.angular_rate * rate
                    + m.gravity_deviation * gravity_deviation
                    + m.magnitude_deviation * magnitude_deviation
                    + m.dip_deviation * dip_deviation,
            }
        };

        NoiseEstimate {
            levels,
            elapsed,
            warming_up,
            sample,
        }
    }

    /// Fold an applied estimate into the running means
    pub fn commit(&mut self, estimate: &NoiseEstimate) {
        if self.warming_up && !estimate.warming_up {
            info!(
                "observation noise warm-up finished after {:.3} s",
                estimate.elapsed
            );
        }
        self.warming_up = estimate.warming_up;

        if let Some((magnitude, dip)) = estimate.sample {
            let alpha = self.settings.mean_alpha;
            self.means.magnitude = Some(smooth(self.means.magnitude, magnitude, alpha));
            self.means.dip = Some(smooth(self.means.dip, dip, alpha));
        }
    }

    /// Estimate and commit in one step
    pub fn update(
        &mut self,
        angular_velocity: &Vector3<f64>,
        accelerometer: &Vector3<f64>,
        magnetometer: Option<&Vector3<f64>>,
        floor: &Vector3<f64>,
        elapsed: f64,
    ) -> NoiseLevels {
        let estimate = self.estimate(angular_velocity, accelerometer, magnetometer, floor, elapsed);
        self.commit(&estimate);
        estimate.levels
    }
}

fn deviation(value: f64, mean: Option<f64>) -> f64 {
    mean.map_or(0.0, |mean| ComplexField::abs(value - mean))
}

/// Exponential smoothing; the first sample seeds the mean
fn smooth(mean: Option<f64>, value: f64, alpha: f64) -> f64 {
    match mean {
        Some(mean) => alpha * mean + (1.0 - alpha) * value,
        None => value,
    }
}
