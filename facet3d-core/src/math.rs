/// Column-major affine and projective math on top of nalgebra
///
/// All matrices are `Matrix4<f32>` in column-vector convention (`v' = M * v`),
/// so translation lives in elements 12..=14 of the column-major storage.
/// Every builder returns a fresh value; compose them with `*`.
use nalgebra::{Matrix3, Matrix4, Point3, Vector3, Vector4};

use crate::error::MathError;

/// Determinant magnitude below which a matrix is treated as singular
pub const SINGULAR_EPSILON: f32 = 1e-10;

/// Cross-product magnitude below which look-at forward and up are parallel
const PARALLEL_EPSILON: f32 = 1e-6;

/// Nudge applied to a forward vector that is parallel to world-up
const LOOK_AT_NUDGE: f32 = 1e-4;

/// Rotation state around three axes (in radians)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationState {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl RotationState {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    /// Rotation matrix in the fixed Z, then X, then Y order: `Rz * Rx * Ry`
    pub fn to_matrix(&self) -> Matrix4<f32> {
        Transform::rotation_z(self.z) * Transform::rotation_x(self.x) * Transform::rotation_y(self.y)
    }
}

impl Default for RotationState {
    fn default() -> Self {
        Self::zero()
    }
}

/// Transform builder for 3D transformations
pub struct Transform;

impl Transform {
    pub fn identity() -> Matrix4<f32> {
        Matrix4::identity()
    }

    /// Create a translation matrix
    pub fn translation(x: f32, y: f32, z: f32) -> Matrix4<f32> {
        Matrix4::new_translation(&Vector3::new(x, y, z))
    }

    /// Counter-clockwise rotation about +X when looking down the axis
    pub fn rotation_x(angle: f32) -> Matrix4<f32> {
        let (s, c) = angle.sin_cos();
        #[rustfmt::skip]
        let m = Matrix4::new(
            1.0, 0.0, 0.0, 0.0,
            0.0,   c,  -s, 0.0,
            0.0,   s,   c, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );
        m
    }

    pub fn rotation_y(angle: f32) -> Matrix4<f32> {
        let (s, c) = angle.sin_cos();
        #[rustfmt::skip]
        let m = Matrix4::new(
              c, 0.0,   s, 0.0,
            0.0, 1.0, 0.0, 0.0,
             -s, 0.0,   c, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );
        m
    }

    pub fn rotation_z(angle: f32) -> Matrix4<f32> {
        let (s, c) = angle.sin_cos();
        #[rustfmt::skip]
        let m = Matrix4::new(
              c,  -s, 0.0, 0.0,
              s,   c, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );
        m
    }

    /// Create a scale matrix
    pub fn scale(sx: f32, sy: f32, sz: f32) -> Matrix4<f32> {
        Matrix4::new_nonuniform_scaling(&Vector3::new(sx, sy, sz))
    }

    /// OpenGL-style perspective projection. `fov_y` is the vertical field of view in radians.
    pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Matrix4<f32> {
        Matrix4::new_perspective(aspect, fov_y, near, far)
    }

    /// OpenGL-style orthographic projection onto the `[-1, 1]` cube
    pub fn orthographic(
        left: f32,
        right: f32,
        top: f32,
        bottom: f32,
        near: f32,
        far: f32,
    ) -> Matrix4<f32> {
        Matrix4::new_orthographic(left, right, bottom, top, near, far)
    }

    /// Right-handed view matrix looking from `eye` towards `target`.
    ///
    /// When the view direction is parallel to `up` the forward vector is nudged
    /// before the cross product so the right vector never collapses to zero.
    pub fn look_at(eye: &Point3<f32>, target: &Point3<f32>, up: &Vector3<f32>) -> Matrix4<f32> {
        let mut forward = normalize_or_zero(&(target - eye));
        if forward.cross(up).norm() < PARALLEL_EPSILON {
            forward = normalize_or_zero(&(forward + Vector3::new(LOOK_AT_NUDGE, 0.0, LOOK_AT_NUDGE)));
        }

        let right = normalize_or_zero(&forward.cross(up));
        let true_up = right.cross(&forward);
        let eye = eye.coords;

        #[rustfmt::skip]
        let m = Matrix4::new(
                right.x,    right.y,    right.z,   -right.dot(&eye),
              true_up.x,  true_up.y,  true_up.z, -true_up.dot(&eye),
             -forward.x, -forward.y, -forward.z,  forward.dot(&eye),
                    0.0,        0.0,        0.0,               1.0,
        );
        m
    }

    /// `a := a * b`
    pub fn multiply(a: &Matrix4<f32>, b: &Matrix4<f32>) -> Matrix4<f32> {
        a * b
    }

    /// `a := b * a`
    pub fn premultiply(a: &Matrix4<f32>, b: &Matrix4<f32>) -> Matrix4<f32> {
        b * a
    }

    /// Transform a point, performing the homogeneous divide when `w` is usable
    pub fn transform_point(m: &Matrix4<f32>, point: &Point3<f32>) -> Point3<f32> {
        let v = m * point.to_homogeneous();
        if v.w.abs() > f32::EPSILON {
            Point3::new(v.x / v.w, v.y / v.w, v.z / v.w)
        } else {
            Point3::new(v.x, v.y, v.z)
        }
    }

    /// Transform a point into clip space without dividing by `w`
    pub fn transform_homogeneous(m: &Matrix4<f32>, point: &Point3<f32>) -> Vector4<f32> {
        m * point.to_homogeneous()
    }

    /// Invert `m`, failing instead of producing garbage for singular input
    pub fn invert(m: &Matrix4<f32>) -> Result<Matrix4<f32>, MathError> {
        let determinant = m.determinant();
        if determinant.abs() < SINGULAR_EPSILON || !determinant.is_finite() {
            return Err(MathError::SingularMatrix { determinant });
        }
        m.try_inverse()
            .ok_or(MathError::SingularMatrix { determinant })
    }

    /// Inverse-transpose of the upper 3x3 block, for carrying surface normals
    /// through non-uniform scale. `None` when that block is singular.
    pub fn normal_matrix(m: &Matrix4<f32>) -> Option<Matrix3<f32>> {
        let linear: Matrix3<f32> = m.fixed_view::<3, 3>(0, 0).into_owned();
        let determinant = linear.determinant();
        if determinant.abs() < SINGULAR_EPSILON || !determinant.is_finite() {
            return None;
        }
        linear.try_inverse().map(|inverse| inverse.transpose())
    }
}

/// Normalize `v`; a zero-length vector maps to itself
pub fn normalize_or_zero(v: &Vector3<f32>) -> Vector3<f32> {
    let length = v.norm();
    v / if length > 0.0 { length } else { 1.0 }
}

/// Extract the translation column of an affine matrix
pub fn translation_of(m: &Matrix4<f32>) -> Point3<f32> {
    Point3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_identity_rotation() {
        let rotation = RotationState::zero();
        let matrix = rotation.to_matrix();
        assert!((matrix - Matrix4::identity()).norm() < 1e-6);
    }

    #[test]
    fn translation_is_stored_column_major() {
        let m = Transform::translation(1.0, 2.0, 3.0);
        let storage = m.as_slice();
        assert_eq!(storage[12], 1.0);
        assert_eq!(storage[13], 2.0);
        assert_eq!(storage[14], 3.0);
    }

    #[test]
    fn rotation_order_is_z_then_x_then_y() {
        let rotation = RotationState::new(FRAC_PI_2, FRAC_PI_2, 0.0);
        let m = rotation.to_matrix();
        // Ry first maps +X to -Z, then Rx maps -Z to +Y.
        let p = Transform::transform_point(&m, &Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-6);
        assert_relative_eq!(p.z, 0.0, epsilon = 1e-6);

        let reversed = Transform::rotation_y(FRAC_PI_2) * Transform::rotation_x(FRAC_PI_2);
        assert!((reversed - m).norm() > 0.5);
    }

    #[test]
    fn multiply_and_premultiply_differ_in_order() {
        let t = Transform::translation(1.0, 0.0, 0.0);
        let r = Transform::rotation_z(FRAC_PI_2);
        let origin = Point3::origin();

        let tr = Transform::multiply(&t, &r);
        let rt = Transform::premultiply(&t, &r);
        let a = Transform::transform_point(&tr, &origin);
        let b = Transform::transform_point(&rt, &origin);
        assert_relative_eq!(a.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(b.y, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn transform_point_divides_by_w() {
        let projection = Transform::perspective(FRAC_PI_2, 1.0, 1.0, 10.0);
        let near = Transform::transform_point(&projection, &Point3::new(0.0, 0.0, -1.0));
        let far = Transform::transform_point(&projection, &Point3::new(0.0, 0.0, -10.0));
        assert_relative_eq!(near.z, -1.0, epsilon = 1e-5);
        assert_relative_eq!(far.z, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn normalize_is_idempotent() {
        let v = Vector3::new(3.0, -4.0, 12.0);
        let once = normalize_or_zero(&v);
        let twice = normalize_or_zero(&once);
        assert_relative_eq!(once, twice, epsilon = 1e-6);
        assert_relative_eq!(once.norm(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn normalize_zero_vector_is_zero() {
        let zero = Vector3::zeros();
        assert_eq!(normalize_or_zero(&zero), zero);
        assert_eq!(normalize_or_zero(&normalize_or_zero(&zero)), zero);
    }

    #[test]
    fn double_inverse_restores_matrix() {
        let m = Transform::translation(1.0, -2.0, 3.5)
            * RotationState::new(0.3, -1.1, 0.7).to_matrix()
            * Transform::scale(2.0, 0.5, 1.5);
        let inverse = Transform::invert(&m).unwrap();
        let restored = Transform::invert(&inverse).unwrap();
        for (a, b) in m.iter().zip(restored.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-4);
        }
    }

    #[test]
    fn singular_inverse_fails() {
        let flat = Transform::scale(1.0, 0.0, 1.0);
        assert!(matches!(
            Transform::invert(&flat),
            Err(MathError::SingularMatrix { .. })
        ));
    }

    #[test]
    fn normal_matrix_keeps_normals_perpendicular_under_stretch() {
        let m = Transform::translation(3.0, 0.0, 0.0) * Transform::scale(1.0, 2.0, 1.0);
        let linear = m.fixed_view::<3, 3>(0, 0).into_owned();
        let tangent = linear * Vector3::new(1.0, -1.0, 0.0);
        let normal = Transform::normal_matrix(&m).unwrap() * Vector3::new(1.0, 1.0, 0.0);
        assert_relative_eq!(normal.dot(&tangent), 0.0, epsilon = 1e-6);

        // The plain linear block tilts the normal off the surface
        let naive = linear * Vector3::new(1.0, 1.0, 0.0);
        assert!(naive.dot(&tangent).abs() > 0.5);
    }

    #[test]
    fn normal_matrix_of_flattening_transform_is_none() {
        assert!(Transform::normal_matrix(&Transform::scale(1.0, 0.0, 1.0)).is_none());
    }

    #[test]
    fn look_at_matches_nalgebra_in_regular_case() {
        let eye = Point3::new(3.0, 2.0, 5.0);
        let target = Point3::new(0.0, 0.5, 0.0);
        let up = Vector3::y();
        let ours = Transform::look_at(&eye, &target, &up);
        let theirs = Matrix4::look_at_rh(&eye, &target, &up);
        assert_relative_eq!(ours, theirs, epsilon = 1e-5);
    }

    #[test]
    fn look_at_straight_down_stays_finite() {
        let eye = Point3::new(0.0, 10.0, 0.0);
        let view = Transform::look_at(&eye, &Point3::origin(), &Vector3::y());
        assert!(view.iter().all(|v| v.is_finite()));
        assert!(Transform::invert(&view).is_ok());
        let p = Transform::transform_point(&view, &Point3::origin());
        assert_relative_eq!(p.z, -10.0, epsilon = 1e-3);
    }
}
