//! Column-major 4x4 matrix

use std::ops::Mul;

use serde::{Deserialize, Serialize};

use super::Vector3;

/// A 4x4 single-precision matrix stored in column-major order.
///
/// Element `(row, col)` lives at index `col * 4 + row`, matching the layout
/// GPU uniform buffers expect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Matrix4 {
    cols: [f32; 16],
}

impl Matrix4 {
    pub const IDENTITY: Self = Self {
        cols: [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ],
    };

    pub const ZERO: Self = Self { cols: [0.0; 16] };

    /// Identity matrix
    #[must_use]
    pub const fn identity() -> Self {
        Self::IDENTITY
    }

    /// Build from 16 column-major values
    #[must_use]
    pub const fn from_cols_array(cols: [f32; 16]) -> Self {
        Self { cols }
    }

    #[must_use]
    pub const fn to_cols_array(&self) -> [f32; 16] {
        self.cols
    }

    /// Columns as nested arrays, the shape uniform structs use
    #[must_use]
    pub fn to_cols_array_2d(&self) -> [[f32; 4]; 4] {
        let c = &self.cols;
        [
            [c[0], c[1], c[2], c[3]],
            [c[4], c[5], c[6], c[7]],
            [c[8], c[9], c[10], c[11]],
            [c[12], c[13], c[14], c[15]],
        ]
    }

    #[must_use]
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.cols[col * 4 + row]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.cols[col * 4 + row] = value;
    }

    /// `a × b`. Not commutative.
    #[must_use]
    pub fn multiply(a: &Self, b: &Self) -> Self {
        let mut out = Self::ZERO;
        for col in 0..4 {
            for row in 0..4 {
                let mut sum = 0.0;
                for k in 0..4 {
                    sum += a.get(row, k) * b.get(k, col);
                }
                out.set(row, col, sum);
            }
        }
        out
    }

    /// Translation by `offset`
    #[must_use]
    pub fn translate(offset: Vector3) -> Self {
        let mut m = Self::IDENTITY;
        m.set(0, 3, offset.x);
        m.set(1, 3, offset.y);
        m.set(2, 3, offset.z);
        m
    }

    /// Non-uniform scale
    #[must_use]
    pub fn scale(factors: Vector3) -> Self {
        let mut m = Self::IDENTITY;
        m.set(0, 0, factors.x);
        m.set(1, 1, factors.y);
        m.set(2, 2, factors.z);
        m
    }

    /// Rotation of `angle_degrees` around `axis` (Rodrigues' formula).
    ///
    /// The axis must already be unit length. A non-unit axis is not
    /// corrected and produces a scaling/shearing matrix.
    #[must_use]
    pub fn rotate(angle_degrees: f32, axis: Vector3) -> Self {
        let (s, c) = angle_degrees.to_radians().sin_cos();
        let t = 1.0 - c;
        let Vector3 { x, y, z } = axis;

        let mut m = Self::IDENTITY;
        m.set(0, 0, t * x * x + c);
        m.set(0, 1, t * x * y - s * z);
        m.set(0, 2, t * x * z + s * y);

        m.set(1, 0, t * x * y + s * z);
        m.set(1, 1, t * y * y + c);
        m.set(1, 2, t * y * z - s * x);

        m.set(2, 0, t * x * z - s * y);
        m.set(2, 1, t * y * z + s * x);
        m.set(2, 2, t * z * z + c);
        m
    }

    /// OpenGL-style perspective projection (NDC z in -1..1)
    #[must_use]
    pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        let f = 1.0 / (fov_y_degrees.to_radians() * 0.5).tan();
        let mut m = Self::ZERO;
        m.set(0, 0, f / aspect);
        m.set(1, 1, f);
        m.set(2, 2, (far + near) / (near - far));
        m.set(2, 3, 2.0 * far * near / (near - far));
        m.set(3, 2, -1.0);
        m
    }

    /// OpenGL-style orthographic projection
    #[must_use]
    pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Self {
        let mut m = Self::IDENTITY;
        m.set(0, 0, 2.0 / (right - left));
        m.set(1, 1, 2.0 / (top - bottom));
        m.set(2, 2, -2.0 / (far - near));
        m.set(0, 3, -(right + left) / (right - left));
        m.set(1, 3, -(top + bottom) / (top - bottom));
        m.set(2, 3, -(far + near) / (far - near));
        m
    }

    /// Right-handed view matrix looking from `eye` towards `target`
    #[must_use]
    pub fn look_at(eye: Vector3, target: Vector3, up: Vector3) -> Self {
        let f = (target - eye).normal();
        let s = f.cross(up).normal();
        let u = s.cross(f);

        let mut m = Self::IDENTITY;
        m.set(0, 0, s.x);
        m.set(0, 1, s.y);
        m.set(0, 2, s.z);
        m.set(1, 0, u.x);
        m.set(1, 1, u.y);
        m.set(1, 2, u.z);
        m.set(2, 0, -f.x);
        m.set(2, 1, -f.y);
        m.set(2, 2, -f.z);
        m.set(0, 3, -s.dot(eye));
        m.set(1, 3, -u.dot(eye));
        m.set(2, 3, f.dot(eye));
        m
    }

    #[must_use]
    pub fn transpose(&self) -> Self {
        let mut out = Self::ZERO;
        for row in 0..4 {
            for col in 0..4 {
                out.set(col, row, self.get(row, col));
            }
        }
        out
    }

    /// Determinant of the 3x3 minor left after removing `skip_row` and `skip_col`
    fn minor(&self, skip_row: usize, skip_col: usize) -> f32 {
        let mut m = [[0.0_f32; 3]; 3];
        let mut r = 0;
        for row in (0..4).filter(|&row| row != skip_row) {
            let mut c = 0;
            for col in (0..4).filter(|&col| col != skip_col) {
                m[r][c] = self.get(row, col);
                c += 1;
            }
            r += 1;
        }

        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    fn cofactor(&self, row: usize, col: usize) -> f32 {
        let sign = if (row + col) % 2 == 0 { 1.0 } else { -1.0 };
        sign * self.minor(row, col)
    }

    #[must_use]
    pub fn determinant(&self) -> f32 {
        (0..4).map(|col| self.get(0, col) * self.cofactor(0, col)).sum()
    }

    /// General inverse via the adjugate.
    ///
    /// A singular matrix (determinant exactly zero) yields the identity
    /// instead of an error.
    #[must_use]
    pub fn invert(&self) -> Self {
        let det = self.determinant();
        if det == 0.0 {
            return Self::IDENTITY;
        }

        let inv_det = 1.0 / det;
        let mut out = Self::ZERO;
        for row in 0..4 {
            for col in 0..4 {
                // adjugate is the transposed cofactor matrix
                out.set(col, row, self.cofactor(row, col) * inv_det);
            }
        }
        out
    }

    /// Translation component (last column)
    #[must_use]
    pub fn translation(&self) -> Vector3 {
        Vector3::new(self.get(0, 3), self.get(1, 3), self.get(2, 3))
    }

    /// Transform a point (w = 1, no perspective divide)
    #[must_use]
    pub fn transform_point(&self, p: Vector3) -> Vector3 {
        Vector3::new(
            self.get(0, 0) * p.x + self.get(0, 1) * p.y + self.get(0, 2) * p.z + self.get(0, 3),
            self.get(1, 0) * p.x + self.get(1, 1) * p.y + self.get(1, 2) * p.z + self.get(1, 3),
            self.get(2, 0) * p.x + self.get(2, 1) * p.y + self.get(2, 2) * p.z + self.get(2, 3),
        )
    }

    /// Transform a direction (w = 0)
    #[must_use]
    pub fn transform_vector(&self, v: Vector3) -> Vector3 {
        Vector3::new(
            self.get(0, 0) * v.x + self.get(0, 1) * v.y + self.get(0, 2) * v.z,
            self.get(1, 0) * v.x + self.get(1, 1) * v.y + self.get(1, 2) * v.z,
            self.get(2, 0) * v.x + self.get(2, 1) * v.y + self.get(2, 2) * v.z,
        )
    }

    #[must_use]
    pub fn abs_diff_eq(&self, other: &Self, epsilon: f32) -> bool {
        self.cols
            .iter()
            .zip(other.cols.iter())
            .all(|(a, b)| (a - b).abs() <= epsilon)
    }
}

impl Default for Matrix4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Matrix4 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self::multiply(&self, &rhs)
    }
}

impl From<glam::Mat4> for Matrix4 {
    fn from(value: glam::Mat4) -> Self {
        Self::from_cols_array(value.to_cols_array())
    }
}

impl From<Matrix4> for glam::Mat4 {
    fn from(value: Matrix4) -> Self {
        glam::Mat4::from_cols_array(&value.cols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    fn sample() -> Matrix4 {
        Matrix4::translate(Vector3::new(3.0, -2.0, 5.0))
            * Matrix4::rotate(37.0, Vector3::new(0.0, 0.6, 0.8))
            * Matrix4::scale(Vector3::new(2.0, 0.5, 1.5))
    }

    #[test]
    fn test_identity_is_neutral() {
        let a = sample();
        assert_eq!(Matrix4::multiply(&a, &Matrix4::identity()), a);
        assert_eq!(Matrix4::multiply(&Matrix4::identity(), &a), a);
    }

    #[test]
    fn test_multiply_is_not_commutative() {
        let t = Matrix4::translate(Vector3::new(1.0, 0.0, 0.0));
        let r = Matrix4::rotate(90.0, Vector3::Z);
        assert!(!(t * r).abs_diff_eq(&(r * t), EPSILON));
    }

    #[test]
    fn test_multiply_matches_glam() {
        let a = sample();
        let b = Matrix4::perspective(60.0, 1.5, 0.1, 100.0);
        let expected: Matrix4 = (glam::Mat4::from(a) * glam::Mat4::from(b)).into();
        assert!((a * b).abs_diff_eq(&expected, EPSILON));
    }

    #[test]
    fn test_invert_matches_glam() {
        let m = sample();
        let expected: Matrix4 = glam::Mat4::from(m).inverse().into();
        assert!(m.invert().abs_diff_eq(&expected, EPSILON));
        assert!((m * m.invert()).abs_diff_eq(&Matrix4::IDENTITY, EPSILON));
    }

    #[test]
    fn test_double_inverse_round_trips() {
        let m = sample();
        assert!(m.invert().invert().abs_diff_eq(&m, EPSILON));

        let p = Matrix4::perspective(45.0, 16.0 / 9.0, 0.1, 50.0);
        assert!(p.invert().invert().abs_diff_eq(&p, 1e-3));
    }

    #[test]
    fn test_singular_inverse_is_identity() {
        let flat = Matrix4::scale(Vector3::new(1.0, 0.0, 1.0));
        assert_eq!(flat.determinant(), 0.0);
        assert_eq!(flat.invert(), Matrix4::IDENTITY);
        assert_eq!(Matrix4::ZERO.invert(), Matrix4::IDENTITY);
    }

    #[test]
    fn test_translation_extraction() {
        let m = Matrix4::translate(Vector3::new(4.0, 5.0, 6.0)) * Matrix4::rotate(30.0, Vector3::Z);
        assert_eq!(m.translation(), Vector3::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn test_rotate_z_quarter_turn() {
        let r = Matrix4::rotate(90.0, Vector3::Z);
        assert!(r.transform_point(Vector3::X).abs_diff_eq(Vector3::Y, EPSILON));

        let expected: Matrix4 =
            glam::Mat4::from_axis_angle(glam::Vec3::Z, 90.0_f32.to_radians()).into();
        assert!(r.abs_diff_eq(&expected, EPSILON));
    }

    #[test]
    fn test_rotate_with_non_unit_axis_is_not_rigid() {
        let rigid = Matrix4::rotate(45.0, Vector3::Z);
        let skewed = Matrix4::rotate(45.0, Vector3::new(0.0, 0.0, 2.0));
        assert!((rigid.determinant() - 1.0).abs() < EPSILON);
        assert!((skewed.determinant() - 1.0).abs() > 0.1);
    }

    #[test]
    fn test_projections_match_gl_conventions() {
        let p = Matrix4::perspective(60.0, 1.5, 0.1, 100.0);
        let expected: Matrix4 =
            glam::Mat4::perspective_rh_gl(60.0_f32.to_radians(), 1.5, 0.1, 100.0).into();
        assert!(p.abs_diff_eq(&expected, EPSILON));
        assert_eq!(p.get(3, 2), -1.0);
        assert_eq!(p.get(3, 3), 0.0);

        let o = Matrix4::orthographic(-4.0, 4.0, -3.0, 3.0, -1.0, 10.0);
        let expected: Matrix4 =
            glam::Mat4::orthographic_rh_gl(-4.0, 4.0, -3.0, 3.0, -1.0, 10.0).into();
        assert!(o.abs_diff_eq(&expected, EPSILON));
    }

    #[test]
    fn test_look_at_matches_glam() {
        let eye = Vector3::new(2.0, 3.0, 8.0);
        let target = Vector3::new(0.0, 1.0, 0.0);
        let view = Matrix4::look_at(eye, target, Vector3::Y);
        let expected: Matrix4 =
            glam::Mat4::look_at_rh(eye.into(), target.into(), glam::Vec3::Y).into();
        assert!(view.abs_diff_eq(&expected, EPSILON));
    }
}
