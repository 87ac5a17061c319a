//! Quaternion algebra and fixed-size matrix aliases used by the filter
//!
//! Quaternions inside the state vector are stored scalar-first as `(w, x, y, z)`.
//! `Rot(q)` denotes the rotation taking body-frame vectors into the ground frame.

use nalgebra::{
    ComplexField, Matrix3x4, Matrix4, Quaternion, SMatrix, SVector, UnitQuaternion, Vector3,
    Vector4,
};

use crate::types::AngleAxis;

/// Length of the filter state `(qw, qx, qy, qz, ax, ay, az)`
pub const STATE_DIM: usize = 7;
/// Length of the measurement vector `(gravity, magnetic north)`
pub const MEASUREMENT_DIM: usize = 6;

/// Standard gravity in m/s²
pub const STANDARD_GRAVITY: f64 = 9.81;

pub type StateVector = SVector<f64, STATE_DIM>;
pub type StateMatrix = SMatrix<f64, STATE_DIM, STATE_DIM>;
pub type MeasurementVector = SVector<f64, MEASUREMENT_DIM>;
pub type MeasurementMatrix = SMatrix<f64, MEASUREMENT_DIM, MEASUREMENT_DIM>;
pub type ObservationMatrix = SMatrix<f64, MEASUREMENT_DIM, STATE_DIM>;
pub type GainMatrix = SMatrix<f64, STATE_DIM, MEASUREMENT_DIM>;

/// Extension trait for Vector3 operations
pub trait Vector3Ext {
    /// Normalize the vector, returning zero vector if magnitude is zero
    fn safe_normalize(&self) -> Vector3<f64>;

    /// Whether every component is finite
    fn is_finite(&self) -> bool;
}

impl Vector3Ext for Vector3<f64> {
    fn safe_normalize(&self) -> Vector3<f64> {
        let magnitude = self.norm();
        if magnitude > f64::EPSILON {
            *self / magnitude
        } else {
            Vector3::zeros()
        }
    }

    fn is_finite(&self) -> bool {
        self.iter().all(|v| v.is_finite())
    }
}

/// Extension trait for UnitQuaternion operations
pub trait QuaternionExt {
    /// Convert to angle-axis form, with a zero axis and angle for the identity
    fn to_angle_axis(&self) -> AngleAxis;

    /// Scalar-first coordinates `(w, x, y, z)`
    fn to_wxyz(&self) -> Vector4<f64>;
}

impl QuaternionExt for UnitQuaternion<f64> {
    fn to_angle_axis(&self) -> AngleAxis {
        match self.axis_angle() {
            Some((axis, angle)) => AngleAxis {
                axis: axis.into_inner(),
                angle,
            },
            None => AngleAxis::identity(),
        }
    }

    fn to_wxyz(&self) -> Vector4<f64> {
        Vector4::new(self.w, self.i, self.j, self.k)
    }
}

/// Build a unit quaternion from scalar-first coordinates
pub fn unit_quaternion(q: &Vector4<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_quaternion(Quaternion::new(q[0], q[1], q[2], q[3]))
}

/// Left-multiplication matrix of the pure quaternion `(0, w)`
///
/// `q ⊗ (0, w) = omega_matrix(w) · q` for scalar-first `q`.
pub fn omega_matrix(w: &Vector3<f64>) -> Matrix4<f64> {
    Matrix4::new(
        0.0, -w.x, -w.y, -w.z, //
        w.x, 0.0, w.z, -w.y, //
        w.y, -w.z, 0.0, w.x, //
        w.z, w.y, -w.x, 0.0,
    )
}

/// `Rot(q)·v` in polynomial form, exact for unit `q`
pub fn rotate(q: &Vector4<f64>, v: &Vector3<f64>) -> Vector3<f64> {
    let w = q[0];
    let u = Vector3::new(q[1], q[2], q[3]);
    v * (w * w - u.dot(&u)) + u * (2.0 * u.dot(v)) + u.cross(v) * (2.0 * w)
}

/// `Rot(q)⁻¹·v`, i.e. the rotation by the conjugate quaternion
pub fn rotate_inverse(q: &Vector4<f64>, v: &Vector3<f64>) -> Vector3<f64> {
    rotate(&conjugate(q), v)
}

/// Jacobian of `rotate(q, v)` with respect to `(w, x, y, z)`
pub fn rotation_jacobian(q: &Vector4<f64>, v: &Vector3<f64>) -> Matrix3x4<f64> {
    let w = q[0];
    let u = Vector3::new(q[1], q[2], q[3]);
    let u_dot_v = u.dot(v);

    let mut jacobian = Matrix3x4::zeros();
    jacobian.set_column(0, &((v * w + u.cross(v)) * 2.0));
    for i in 0..3 {
        let axis = Vector3::ith(i, 1.0);
        let column = -v * u[i] + axis * u_dot_v + u * v[i] + axis.cross(v) * w;
        jacobian.set_column(i + 1, &(column * 2.0));
    }
    jacobian
}

/// Jacobian of `rotate_inverse(q, v)` with respect to `(w, x, y, z)`
pub fn inverse_rotation_jacobian(q: &Vector4<f64>, v: &Vector3<f64>) -> Matrix3x4<f64> {
    let mut jacobian = rotation_jacobian(&conjugate(q), v);
    for i in 1..4 {
        jacobian.column_mut(i).neg_mut();
    }
    jacobian
}

/// Normalize `q` to unit length and flip it onto the hemisphere of `reference`
///
/// `q` and `-q` describe the same rotation; keeping consecutive estimates on the
/// same side avoids sign jumps in the output.
pub fn normalize_and_align(q: &Vector4<f64>, reference: &Vector4<f64>) -> Vector4<f64> {
    let norm = q.norm();
    let normalized = if norm > f64::EPSILON {
        q / norm
    } else {
        *reference
    };
    if normalized.dot(reference) < 0.0 {
        -normalized
    } else {
        normalized
    }
}

/// Angle between two vectors in radians, zero when either is degenerate
pub fn angle_between(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    let denominator = a.norm() * b.norm();
    if denominator <= f64::EPSILON {
        return 0.0;
    }
    ComplexField::acos((a.dot(b) / denominator).clamp(-1.0, 1.0))
}

fn conjugate(q: &Vector4<f64>) -> Vector4<f64> {
    Vector4::new(q[0], -q[1], -q[2], -q[3])
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: f64 = 1e-7;

    fn sample_quaternion() -> Vector4<f64> {
        UnitQuaternion::from_euler_angles(0.3, -0.7, 1.9).to_wxyz()
    }

    #[test]
    fn test_rotate_matches_nalgebra() {
        let q = sample_quaternion();
        let v = Vector3::new(0.4, -1.2, 9.0);

        let expected = unit_quaternion(&q) * v;
        assert!((rotate(&q, &v) - expected).norm() < 1e-12);

        let expected_inverse = unit_quaternion(&q).inverse_transform_vector(&v);
        assert!((rotate_inverse(&q, &v) - expected_inverse).norm() < 1e-12);
    }

    #[test]
    fn test_omega_matrix_is_hamilton_product() {
        let q = sample_quaternion();
        let w = Vector3::new(0.5, -0.25, 2.0);

        let product = Quaternion::new(q[0], q[1], q[2], q[3]) * Quaternion::from_imag(w);
        let expected = Vector4::new(product.w, product.i, product.j, product.k);

        assert!((omega_matrix(&w) * q - expected).norm() < 1e-12);
    }

    #[test]
    fn test_rotation_jacobians_match_finite_differences() {
        let q = sample_quaternion();
        let v = Vector3::new(0.0, 1.0, 9.81);

        let analytic = rotation_jacobian(&q, &v);
        let analytic_inverse = inverse_rotation_jacobian(&q, &v);

        for i in 0..4 {
            let mut plus = q;
            let mut minus = q;
            plus[i] += STEP;
            minus[i] -= STEP;

            let numeric = (rotate(&plus, &v) - rotate(&minus, &v)) / (2.0 * STEP);
            assert!((analytic.column(i) - numeric).norm() < 1e-6);

            let numeric_inverse =
                (rotate_inverse(&plus, &v) - rotate_inverse(&minus, &v)) / (2.0 * STEP);
            assert!((analytic_inverse.column(i) - numeric_inverse).norm() < 1e-6);
        }
    }

    #[test]
    fn test_normalize_and_align() {
        let reference = Vector4::new(1.0, 0.0, 0.0, 0.0);
        let flipped = Vector4::new(-2.0, 0.0, 0.0, 0.0);

        let aligned = normalize_and_align(&flipped, &reference);
        assert!((aligned - reference).norm() < 1e-12);
        assert!((aligned.norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_identity_angle_axis() {
        let angle_axis = UnitQuaternion::<f64>::identity().to_angle_axis();
        assert_eq!(angle_axis.angle, 0.0);
        assert_eq!(angle_axis.axis, Vector3::zeros());
    }

    #[test]
    fn test_angle_between() {
        let a = Vector3::new(1.0, 0.0, 0.0);
        let b = Vector3::new(0.0, 3.0, 0.0);
        assert!((angle_between(&a, &b) - core::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert_eq!(angle_between(&a, &Vector3::zeros()), 0.0);
    }
}
