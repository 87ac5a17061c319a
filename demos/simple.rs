use imu_ekf::Imu;
use nalgebra::Vector3;

const SAMPLE_PERIOD_US: u64 = 10_000; // 10 ms sample period

fn main() {
    env_logger::init();

    let mut imu = Imu::new();

    for i in 0..10u64 {
        // this loop should repeat each time new sensor data is available
        let timestamp = i * SAMPLE_PERIOD_US;
        let gyroscope = Vector3::new(0.0, 0.0, 0.0); // replace this with actual gyroscope data in rad/s
        let accelerometer = Vector3::new(0.0, 0.0, 9.81); // replace this with actual accelerometer data in m/s²

        if let Err(error) = imu.on_gyroscope(timestamp, gyroscope) {
            eprintln!("{error}");
        }
        if let Err(error) = imu.on_accelerometer(timestamp, accelerometer) {
            eprintln!("{error}");
        }

        let (roll, pitch, yaw) = imu.quaternion().euler_angles();
        let acceleration = imu.linear_acceleration();

        println!(
            "Roll: {:.2}, Pitch: {:.2}, Yaw: {:.2}, Acceleration: ({:.3}, {:.3}, {:.3})",
            roll.to_degrees(),
            pitch.to_degrees(),
            yaw.to_degrees(),
            acceleration.x,
            acceleration.y,
            acceleration.z
        );
    }
}
