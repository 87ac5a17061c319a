use imu_ekf::math::{StateMatrix, StateVector};
use imu_ekf::{DisplacementSettings, FilterError, Imu, ImuSettings, STANDARD_GRAVITY, Sensor};
use nalgebra::{UnitQuaternion, Vector3};

const PERIOD_US: u64 = 10_000; // 100 Hz
const EPSILON: f64 = 1e-12;

fn level() -> Vector3<f64> {
    Vector3::new(0.0, 0.0, STANDARD_GRAVITY)
}

/// Feed gyroscope and accelerometer samples at 100 Hz starting after `start`
fn run(imu: &mut Imu, start: u64, samples: u64, gyroscope: Vector3<f64>, accelerometer: Vector3<f64>) -> u64 {
    let mut timestamp = start;
    for _ in 0..samples {
        timestamp += PERIOD_US;
        imu.on_gyroscope(timestamp, gyroscope).unwrap();
        imu.on_accelerometer(timestamp, accelerometer).unwrap();
    }
    timestamp
}

#[test]
fn test_reset_displacement_zeroes_queries() {
    let mut imu = Imu::new();
    imu.on_gyroscope(0, Vector3::zeros()).unwrap();
    let timestamp = run(&mut imu, 0, 200, Vector3::new(0.3, -0.1, 0.2), Vector3::new(0.5, 0.2, 9.6));

    imu.reset_displacement();

    assert_eq!(imu.linear_displacement(), Vector3::zeros());
    let rotation = imu.angular_displacement();
    assert!(rotation.angle.abs() < EPSILON);

    // Later samples move the queries away from zero again
    run(&mut imu, timestamp, 10, Vector3::new(0.0, 0.0, 1.0), level());
    assert!(imu.angular_displacement().angle > 0.05);
}

#[test]
fn test_angular_displacement_tracks_yaw() {
    let mut imu = Imu::new();
    imu.on_gyroscope(0, Vector3::zeros()).unwrap();
    let timestamp = run(&mut imu, 0, 300, Vector3::zeros(), level());
    imu.reset_displacement();

    // Half a second at 1 rad/s about the vertical axis
    run(&mut imu, timestamp, 50, Vector3::new(0.0, 0.0, 1.0), level());

    let rotation = imu.angular_displacement();
    assert!((rotation.angle - 0.5).abs() < 1e-3, "angle {}", rotation.angle);
    assert!((rotation.axis - Vector3::z()).norm() < 1e-3);
}

#[test]
fn test_quiet_device_stays_put() {
    let mut imu = Imu::new();
    imu.on_gyroscope(0, Vector3::zeros()).unwrap();
    imu.reset_displacement();

    run(&mut imu, 0, 500, Vector3::zeros(), level());

    assert!(imu.linear_displacement().norm() < 1e-9);
    assert!(imu.linear_acceleration().norm() < 1e-9);
}

#[test]
fn test_acceleration_burst_moves_device() {
    let settings = ImuSettings {
        displacement: DisplacementSettings {
            angular_decay: 1e6,
            linear_decay: 1e6,
        },
        ..Default::default()
    };
    let mut imu = Imu::with_settings(settings).unwrap();
    // Slow turn keeps the angular decay factor saturated
    let turning = Vector3::new(0.0, 0.0, 1e-3);

    imu.on_gyroscope(0, turning).unwrap();
    let timestamp = run(&mut imu, 0, 300, turning, level());
    imu.reset_displacement();

    run(&mut imu, timestamp, 20, turning, Vector3::new(1.0, 0.0, STANDARD_GRAVITY));

    let translation = imu.linear_displacement();
    assert!(translation.x > 0.0, "translation {translation:?}");
    assert!(translation.y.abs() < translation.x);
}

#[test]
fn test_version_counts_estimate_changes() {
    let mut imu = Imu::new();
    assert_eq!(imu.version(), 0);

    imu.on_gyroscope(0, Vector3::zeros()).unwrap();
    imu.on_magnetometer(1, Vector3::new(0.0, 20.0, -40.0)).unwrap();
    assert_eq!(imu.version(), 0);

    imu.on_gyroscope(PERIOD_US, Vector3::zeros()).unwrap();
    imu.on_accelerometer(PERIOD_US, level()).unwrap();
    imu.reset_displacement();
    assert_eq!(imu.version(), 3);

    // Rejected samples leave the counter alone
    assert!(imu.on_gyroscope(PERIOD_US, Vector3::zeros()).is_err());
    assert!(imu.on_accelerometer(PERIOD_US, level()).is_err());
    assert_eq!(imu.version(), 3);
}

#[test]
fn test_rejected_samples_leave_estimate_untouched() {
    let mut imu = Imu::new();
    imu.on_gyroscope(0, Vector3::zeros()).unwrap();
    let timestamp = run(&mut imu, 0, 50, Vector3::new(0.1, 0.2, 0.3), Vector3::new(0.2, 0.0, 9.8));

    let state = *imu.ekf().state();
    let covariance = *imu.ekf().covariance();

    assert_eq!(
        imu.on_gyroscope(timestamp - 1, Vector3::zeros()),
        Err(FilterError::OutOfOrder(Sensor::Gyroscope))
    );
    assert_eq!(
        imu.on_accelerometer(timestamp, level()),
        Err(FilterError::OutOfOrder(Sensor::Accelerometer))
    );
    assert_eq!(
        imu.on_gyroscope(timestamp + PERIOD_US, Vector3::new(f64::INFINITY, 0.0, 0.0)),
        Err(FilterError::NonFinite(Sensor::Gyroscope))
    );
    assert_eq!(
        imu.on_accelerometer(timestamp + PERIOD_US, Vector3::new(f64::NAN, 0.0, 0.0)),
        Err(FilterError::NonFinite(Sensor::Accelerometer))
    );
    assert_eq!(
        imu.on_magnetometer(timestamp, Vector3::new(0.0, f64::NAN, 0.0)),
        Err(FilterError::NonFinite(Sensor::Magnetometer))
    );

    assert_eq!(*imu.ekf().state(), state);
    assert_eq!(*imu.ekf().covariance(), covariance);
}

#[test]
fn test_magnetometer_feeds_next_correction() {
    let mut imu = Imu::new();
    let orientation = UnitQuaternion::from_euler_angles(0.0, 0.0, -0.4);
    let accelerometer = orientation.inverse_transform_vector(&level());
    let field = orientation.inverse_transform_vector(&Vector3::new(0.0, 22.0, -42.0));

    imu.on_gyroscope(0, Vector3::zeros()).unwrap();
    let mut timestamp = 0;
    for _ in 0..500 {
        timestamp += PERIOD_US;
        imu.on_gyroscope(timestamp, Vector3::zeros()).unwrap();
        imu.on_magnetometer(timestamp, field).unwrap();
        imu.on_accelerometer(timestamp, accelerometer).unwrap();
    }

    assert!(imu.flags().magnetometer_used);
    let (_, _, yaw) = imu.quaternion().euler_angles();
    assert!((yaw + 0.4).abs() < 1e-2, "yaw {yaw}");
}

#[test]
fn test_invalid_settings_rejected() {
    let mut settings = ImuSettings::default();
    settings.ekf.gravity = -1.0;
    assert!(matches!(
        Imu::with_settings(settings),
        Err(FilterError::InvalidSettings(_))
    ));
}

#[test]
fn test_discarded_accelerometer_sample_is_forgotten() {
    let mut settings = ImuSettings::default();
    settings.ekf.initial_covariance = StateVector::zeros();
    settings.ekf.process_noise = StateMatrix::zeros();
    settings.ekf.noise.warmup_gravity = 0.0;
    settings.ekf.noise.warmup_magnetic = 0.0;
    let mut imu = Imu::with_settings(settings).unwrap();

    imu.on_gyroscope(0, Vector3::zeros()).unwrap();
    imu.on_gyroscope(PERIOD_US, Vector3::new(0.0, 0.0, 1.0)).unwrap();
    imu.on_magnetometer(PERIOD_US, Vector3::new(0.0, 22.0, -42.0)).unwrap();
    let version = imu.version();

    assert_eq!(
        imu.on_accelerometer(PERIOD_US, Vector3::new(3.0, 0.0, STANDARD_GRAVITY)),
        Err(FilterError::SingularInnovation)
    );
    assert_eq!(imu.version(), version);
    assert!(!imu.ekf().has_accelerometer());
    assert_eq!(imu.ekf().internal_states().magnitude_mean, None);

    // The same timestamp is still free, and the gyroscope does not integrate the dropped sample
    imu.on_gyroscope(2 * PERIOD_US, Vector3::new(0.0, 0.0, 1.0)).unwrap();
    assert_eq!(imu.linear_acceleration(), Vector3::zeros());
    assert_eq!(imu.displacement().position(), Vector3::zeros());
    assert_eq!(
        imu.on_accelerometer(PERIOD_US, Vector3::new(3.0, 0.0, STANDARD_GRAVITY)),
        Err(FilterError::SingularInnovation)
    );
}
