//! Simulated trajectory demonstration
//!
//! Generates gyroscope, accelerometer and magnetometer samples for a device
//! that rests for a few seconds and then sways and shakes, runs them through
//! the filter and compares the estimate against the simulated truth.
//!
//! Outputs:
//! - CSV of true and estimated orientation, estimated acceleration and
//!   displacement on stdout
//! - `trajectory.png` with three panels: true (thin) and estimated (thick)
//!   Euler angles, estimated linear acceleration, and displacement since the
//!   end of the rest period
//!
//! Run with: `cargo run --example trajectory > trajectory.csv`

use imu_ekf::{Imu, STANDARD_GRAVITY};
use nalgebra::{UnitQuaternion, Vector3};
use plotters::prelude::*;
use rand::prelude::*;
use rand_pcg::Pcg64;
use serde::Serialize;
use std::error::Error;

const SAMPLE_PERIOD_US: u64 = 10_000; // 100 Hz
const DURATION: f64 = 20.0;
const REST: f64 = 3.0;

#[derive(Debug, Serialize)]
struct Record {
    #[serde(rename = "Time (s)")]
    time: f64,
    #[serde(rename = "True roll (deg)")]
    true_roll: f64,
    #[serde(rename = "True pitch (deg)")]
    true_pitch: f64,
    #[serde(rename = "True yaw (deg)")]
    true_yaw: f64,
    #[serde(rename = "Roll (deg)")]
    roll: f64,
    #[serde(rename = "Pitch (deg)")]
    pitch: f64,
    #[serde(rename = "Yaw (deg)")]
    yaw: f64,
    #[serde(rename = "Acceleration X (m/s2)")]
    accel_x: f64,
    #[serde(rename = "Acceleration Y (m/s2)")]
    accel_y: f64,
    #[serde(rename = "Acceleration Z (m/s2)")]
    accel_z: f64,
    #[serde(rename = "Displacement X (m)")]
    displacement_x: f64,
    #[serde(rename = "Displacement Y (m)")]
    displacement_y: f64,
    #[serde(rename = "Displacement Z (m)")]
    displacement_z: f64,
    #[serde(rename = "Gravity noise")]
    gravity_noise: f64,
    #[serde(rename = "Magnetic noise")]
    magnetic_noise: f64,
}

/// Body-frame angular velocity of the simulated motion in rad/s
fn angular_velocity(time: f64) -> Vector3<f64> {
    if time < REST {
        return Vector3::zeros();
    }
    Vector3::new(
        0.4 * (1.1 * time).sin(),
        0.3 * (0.7 * time).cos(),
        0.8 * (0.5 * time).sin(),
    )
}

/// Ground-frame linear acceleration of the simulated motion in m/s²
fn ground_acceleration(time: f64) -> Vector3<f64> {
    if time < REST {
        return Vector3::zeros();
    }
    Vector3::new(0.8 * (2.0 * time).sin(), 0.5 * (1.5 * time).cos(), 0.2 * (3.0 * time).sin())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let mut rng = Pcg64::seed_from_u64(2024);
    let mut noise = |scale: f64| {
        Vector3::new(
            rng.random_range(-scale..scale),
            rng.random_range(-scale..scale),
            rng.random_range(-scale..scale),
        )
    };

    let gravity = Vector3::new(0.0, 0.0, STANDARD_GRAVITY);
    let field = Vector3::new(0.0, 22.0, -42.0); // µT, north along +y

    let mut imu = Imu::new();
    let mut truth = UnitQuaternion::identity();
    let mut writer = csv::Writer::from_writer(std::io::stdout());
    let mut records = Vec::new();
    let mut rest_over = false;

    let samples = (DURATION * 1e6) as u64 / SAMPLE_PERIOD_US;
    for i in 0..samples {
        let timestamp = i * SAMPLE_PERIOD_US;
        let time = timestamp as f64 * 1e-6;

        let w = angular_velocity(time);
        truth *= UnitQuaternion::from_scaled_axis(w * (SAMPLE_PERIOD_US as f64 * 1e-6));

        let accelerometer = truth.inverse_transform_vector(&(ground_acceleration(time) + gravity));
        let magnetometer = truth.inverse_transform_vector(&field);

        imu.on_gyroscope(timestamp, w + noise(0.005))?;
        imu.on_magnetometer(timestamp, magnetometer + noise(0.3))?;
        imu.on_accelerometer(timestamp, accelerometer + noise(0.02))?;

        if !rest_over && time >= REST {
            imu.reset_displacement();
            rest_over = true;
        }

        let (true_roll, true_pitch, true_yaw) = truth.euler_angles();
        let (roll, pitch, yaw) = imu.quaternion().euler_angles();
        let acceleration = imu.linear_acceleration();
        let displacement = imu.linear_displacement();
        let states = imu.ekf().internal_states();

        let record = Record {
            time,
            true_roll: true_roll.to_degrees(),
            true_pitch: true_pitch.to_degrees(),
            true_yaw: true_yaw.to_degrees(),
            roll: roll.to_degrees(),
            pitch: pitch.to_degrees(),
            yaw: yaw.to_degrees(),
            accel_x: acceleration.x,
            accel_y: acceleration.y,
            accel_z: acceleration.z,
            displacement_x: displacement.x,
            displacement_y: displacement.y,
            displacement_z: displacement.z,
            gravity_noise: states.gravity_noise,
            magnetic_noise: states.magnetic_noise,
        };
        writer.serialize(&record)?;
        records.push(record);
    }
    writer.flush()?;

    let flags = imu.flags();
    eprintln!(
        "Processed {} samples, covariance resets: {}, magnetometer used: {}",
        records.len(),
        flags.covariance_resets,
        flags.magnetometer_used
    );

    create_plots(&records)?;
    eprintln!("✓ Plots saved to trajectory.png");
    Ok(())
}

/// Three stacked panels without text: Euler angles, acceleration, displacement
fn create_plots(records: &[Record]) -> Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new("trajectory.png", (1000, 900)).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((3, 1));

    let time_range = 0f64..DURATION;
    let series = |select: fn(&Record) -> f64| -> Vec<(f64, f64)> {
        records.iter().map(|r| (r.time, select(r))).collect()
    };

    // 1. Euler angles, truth thin and estimate thick
    let mut euler_chart = ChartBuilder::on(&panels[0])
        .margin(10)
        .build_cartesian_2d(time_range.clone(), -180f64..180f64)?;
    for (truth, estimate, color) in [
        (series(|r| r.true_roll), series(|r| r.roll), RED),
        (series(|r| r.true_pitch), series(|r| r.pitch), GREEN),
        (series(|r| r.true_yaw), series(|r| r.yaw), BLUE),
    ] {
        euler_chart.draw_series(LineSeries::new(truth, color.stroke_width(1)))?;
        euler_chart.draw_series(LineSeries::new(estimate, color.stroke_width(3)))?;
    }

    // 2. Linear acceleration
    let mut accel_chart = ChartBuilder::on(&panels[1])
        .margin(10)
        .build_cartesian_2d(time_range.clone(), -2f64..2f64)?;
    accel_chart.draw_series(LineSeries::new(series(|r| r.accel_x), &RED))?;
    accel_chart.draw_series(LineSeries::new(series(|r| r.accel_y), &GREEN))?;
    accel_chart.draw_series(LineSeries::new(series(|r| r.accel_z), &BLUE))?;

    // 3. Displacement
    let extent = records
        .iter()
        .flat_map(|r| [r.displacement_x, r.displacement_y, r.displacement_z])
        .fold(0.1f64, |acc, v| acc.max(v.abs()));
    let mut displacement_chart = ChartBuilder::on(&panels[2])
        .margin(10)
        .build_cartesian_2d(time_range, -extent..extent)?;
    displacement_chart.draw_series(LineSeries::new(series(|r| r.displacement_x), &RED))?;
    displacement_chart.draw_series(LineSeries::new(series(|r| r.displacement_y), &GREEN))?;
    displacement_chart.draw_series(LineSeries::new(series(|r| r.displacement_z), &BLUE))?;

    root.present()?;
    Ok(())
}
