//! Vectors, rotations and polarization states

mod vec3;
mod rotation;
mod stokes;

pub use self::vec3::*;
pub use self::rotation::*;
pub use self::stokes::*;

/// Orthonormal triad attached to a photon travelling along `n`.
///
/// The transverse vectors are obtained by rotating the bunch's
/// transverse axes (`ex`, `ey`) with the rotation that takes the
/// bunch axis onto `n`. Stokes parameters and field amplitudes of
/// a photon are always quoted with respect to this basis.
#[derive(Copy, Clone, Debug)]
pub struct PhotonFrame {
    pub n: Vec3,
    pub e1: Vec3,
    pub e2: Vec3,
}

impl PhotonFrame {
    pub fn new(n: Vec3, axis: Vec3, ex: Vec3, ey: Vec3) -> Self {
        let r = Matrix3::rotation_between(axis, n, ey);
        PhotonFrame {
            n,
            e1: r.apply(ex),
            e2: r.apply(ey),
        }
    }

    /// Angle between `e1` and the projection of `v` onto the plane
    /// perpendicular to `n`. If that projection vanishes, the angle
    /// is ill-defined and zero is returned.
    pub fn azimuth_of(&self, v: Vec3) -> f64 {
        let p = v.reject_from(self.n);
        let (a, b) = (p * self.e1, p * self.e2);
        if a == 0.0 && b == 0.0 {
            0.0
        } else {
            b.atan2(a)
        }
    }
}
