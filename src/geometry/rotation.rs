//! Rotations between unit vectors

use super::Vec3;

/// Tolerance on |n.n0| - 1 below which two directions are
/// treated as exactly parallel or antiparallel.
const PARALLEL_TOLERANCE: f64 = 1.0e-14;

/// A real 3x3 matrix, stored by rows.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Matrix3 {
    rows: [Vec3; 3],
}

impl Matrix3 {
    pub fn identity() -> Self {
        Matrix3 {
            rows: [
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
                Vec3::new(0.0, 0.0, 1.0),
            ]
        }
    }

    /// The dyadic product a b^T.
    pub fn outer(a: Vec3, b: Vec3) -> Self {
        Matrix3 {
            rows: [a.x * b, a.y * b, a.z * b]
        }
    }

    pub fn transpose(&self) -> Self {
        let r = &self.rows;
        Matrix3 {
            rows: [
                Vec3::new(r[0].x, r[1].x, r[2].x),
                Vec3::new(r[0].y, r[1].y, r[2].y),
                Vec3::new(r[0].z, r[1].z, r[2].z),
            ]
        }
    }

    /// The rotation that takes the unit vector `n0` onto the unit
    /// vector `n`, about the axis n0 x n:
    /// ```text
    ///   R = I + (n n0^T - n0 n^T) + [(n.n0)(n n0^T + n0 n^T) - (n n^T + n0 n0^T)] / (1 + n.n0)
    /// ```
    /// The expression is singular for antiparallel vectors. In that case
    /// (and when n0 = n exactly) the rotation is chosen explicitly: the
    /// identity for parallel vectors, and a half-turn about `fallback_axis`,
    /// which must be perpendicular to `n0`, for antiparallel ones.
    pub fn rotation_between(n0: Vec3, n: Vec3, fallback_axis: Vec3) -> Self {
        let c = n * n0;
        if c >= 1.0 - PARALLEL_TOLERANCE {
            Matrix3::identity()
        } else if c <= -1.0 + PARALLEL_TOLERANCE {
            // R = 2 a a^T - I
            let a = fallback_axis.reject_from(n0).checked_normalize().unwrap_or_else(|| n0.orthogonal());
            2.0 * Matrix3::outer(a, a) - Matrix3::identity()
        } else {
            let cross = Matrix3::outer(n, n0) - Matrix3::outer(n0, n);
            let sym = c * (Matrix3::outer(n, n0) + Matrix3::outer(n0, n))
                - (Matrix3::outer(n, n) + Matrix3::outer(n0, n0));
            Matrix3::identity() + cross + (1.0 / (1.0 + c)) * sym
        }
    }

    pub fn apply(&self, v: Vec3) -> Vec3 {
        Vec3::new(self.rows[0] * v, self.rows[1] * v, self.rows[2] * v)
    }

    pub fn zero() -> Self {
        Matrix3 {rows: [Vec3::zero(); 3]}
    }

    pub fn determinant(&self) -> f64 {
        self.rows[0] * self.rows[1].cross(self.rows[2])
    }

    /// Solves M x = b by Cramer's rule, returning None if M is singular.
    pub fn solve(&self, b: Vec3) -> Option<Vec3> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let cols = self.transpose().rows;
        let x = b * cols[1].cross(cols[2]) / det;
        let y = cols[0] * b.cross(cols[2]) / det;
        let z = cols[0] * cols[1].cross(b) / det;
        Some(Vec3::new(x, y, z))
    }
}

impl std::ops::Add for Matrix3 {
    type Output = Matrix3;
    fn add(self, other: Matrix3) -> Matrix3 {
        Matrix3 {
            rows: [
                self.rows[0] + other.rows[0],
                self.rows[1] + other.rows[1],
                self.rows[2] + other.rows[2],
            ]
        }
    }
}

impl std::ops::Sub for Matrix3 {
    type Output = Matrix3;
    fn sub(self, other: Matrix3) -> Matrix3 {
        self + (-1.0) * other
    }
}

impl std::ops::Mul<Matrix3> for f64 {
    type Output = Matrix3;
    fn mul(self, m: Matrix3) -> Matrix3 {
        Matrix3 {
            rows: [self * m.rows[0], self * m.rows[1], self * m.rows[2]]
        }
    }
}

impl std::ops::Mul<Vec3> for Matrix3 {
    type Output = Vec3;
    fn mul(self, v: Vec3) -> Vec3 {
        self.apply(v)
    }
}
