//! Error type shared by the filter and its front-end

use core::fmt;

use thiserror::Error;

/// Sensor that produced a rejected sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensor {
    Gyroscope,
    Accelerometer,
    Magnetometer,
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Sensor::Gyroscope => "gyroscope",
            Sensor::Accelerometer => "accelerometer",
            Sensor::Magnetometer => "magnetometer",
        };
        f.write_str(name)
    }
}

/// Conditions reported by the filter
///
/// None of these are fatal. Sample errors leave the estimate untouched, and a
/// singular innovation keeps the predicted state.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum FilterError {
    #[error("sample dropped: non-positive time step {0} s")]
    InvalidTimeStep(f64),

    #[error("sample dropped: out-of-order {0} timestamp")]
    OutOfOrder(Sensor),

    #[error("sample dropped: non-finite {0} value")]
    NonFinite(Sensor),

    #[error("innovation covariance is singular, correction skipped")]
    SingularInnovation,

    #[error("no gyroscope sample received yet")]
    Uninitialised,

    #[error("invalid settings: {0}")]
    InvalidSettings(&'static str),
}

