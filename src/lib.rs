#![no_std]

//! IMU EKF - orientation, linear acceleration and displacement from inertial sensors
//!
//! This library fuses gyroscope, accelerometer and magnetometer samples with an
//! extended Kalman filter over a 7-dimensional state: the orientation quaternion
//! of the device in a fixed ground frame and the device's linear acceleration
//! with gravity removed. A displacement integrator on top of the filter answers
//! "how far has the device moved and turned since I last asked?".
//!
//! # Features
//!
//! - Quaternion process model driven by the gyroscope, with exact Jacobians
//! - Gravity and magnetic-north observation model, magnetometer optional
//! - Adaptive observation noise that distrusts the accelerometer during motion
//!   and the magnetometer during magnetic disturbances
//! - Warm-up period with low observation noise for fast initial convergence
//! - Quaternion sign continuity and covariance health checks
//! - Velocity and displacement integration with motion-dependent decay
//! - `#![no_std]` compatible, fixed-size stack matrices only
//!
//! # Quick Start
//!
//! ```rust
//! use nalgebra::Vector3;
//! use imu_ekf::Imu;
//!
//! let mut imu = Imu::new();
//!
//! // Sensor readings with microsecond timestamps
//! imu.on_gyroscope(0, Vector3::new(0.0, 0.0, 0.0)).unwrap();             // rad/s
//! imu.on_magnetometer(5_000, Vector3::new(0.0, 20.0, -40.0)).unwrap();   // µT
//! imu.on_gyroscope(10_000, Vector3::new(0.01, 0.02, 0.0)).unwrap();
//! imu.on_accelerometer(10_000, Vector3::new(0.0, 0.0, 9.81)).unwrap();   // m/s²
//!
//! // Orientation in angle-axis form
//! let rotation = imu.rotation();
//!
//! // Displacement since a reference pose
//! imu.reset_displacement();
//! let translation = imu.linear_displacement();
//! assert_eq!(translation, Vector3::zeros());
//! ```
//!
//! The filter can also be driven directly through [`Ekf::predict`] and
//! [`Ekf::correct`] when the host already tracks time steps.

mod displacement;
mod ekf;
mod error;
mod imu;
pub mod math;
pub mod noise;
pub mod observation;
pub mod process;
mod types;

// Re-export all public types and functions
pub use displacement::Displacement;
pub use ekf::Ekf;
pub use error::{FilterError, Sensor};
pub use imu::Imu;
pub use math::{QuaternionExt, STANDARD_GRAVITY, Vector3Ext};
pub use noise::{AdaptiveMeans, AdaptiveNoise, NoiseEstimate, NoiseLevels};
pub use observation::{Observation, ObservationModel};
pub use process::{Prediction, ProcessModel};
pub use types::*;
