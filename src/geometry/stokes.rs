//! Defines a polarization state

/// A set of Stokes parameters: total intensity `i`, linear
/// polarization along the first (`q > 0`) or second (`q < 0`)
/// basis vector, linear polarization along the diagonals `u`,
/// and circular polarization `v`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StokesVector {
    i: f64,
    q: f64,
    u: f64,
    v: f64,
}

impl StokesVector {
    /// Creates a new Stokes vector with the specified components.
    pub fn new(i: f64, q: f64, u: f64, v: f64) -> Self {
        Self{i, q, u, v}
    }

    pub fn unpolarized() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }

    /// A unit-intensity Stokes vector with the given normalized
    /// polarization parameters.
    pub fn from_normalized(xi: [f64; 3]) -> Self {
        Self::new(1.0, xi[0], xi[1], xi[2])
    }

    pub fn intensity(&self) -> f64 {
        self.i
    }

    /// Degree of polarization. Zero for a vanishing intensity.
    pub fn dop(&self) -> f64 {
        if self.i > 0.0 {
            self.q.hypot(self.u).hypot(self.v) / self.i
        } else {
            0.0
        }
    }

    /// The polarization parameters (q, u, v) / i, rescaled if necessary
    /// so that their magnitude does not exceed unity.
    pub fn normalized(&self) -> [f64; 3] {
        if !(self.i > 0.0) {
            return [0.0; 3];
        }
        let xi = [self.q / self.i, self.u / self.i, self.v / self.i];
        clamp_to_unit_ball(xi)
    }

    /// Returns the Stokes vector if the polarization basis is rotated
    /// around the direction of propagation by an angle `theta`
    pub fn rotate_by(&self, theta: f64) -> Self {
        Self {
            i: self.i,
            q: (2.0 * theta).cos() * self.q + (2.0 * theta).sin() * self.u,
            u: -(2.0 * theta).sin() * self.q + (2.0 * theta).cos() * self.u,
            v: self.v,
        }
    }

    /// Replaces any non-finite component by zero.
    pub fn finite_or_zero(&self) -> Self {
        let fix = |x: f64| if x.is_finite() {x} else {0.0};
        Self::new(fix(self.i), fix(self.q), fix(self.u), fix(self.v))
    }

    pub fn is_finite(&self) -> bool {
        self.i.is_finite() && self.q.is_finite() && self.u.is_finite() && self.v.is_finite()
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.i, self.q, self.u, self.v]
    }
}

/// Rescales `xi` onto the unit sphere if its magnitude exceeds one.
pub fn clamp_to_unit_ball(xi: [f64; 3]) -> [f64; 3] {
    let mag = xi[0].hypot(xi[1]).hypot(xi[2]);
    if mag > 1.0 {
        [xi[0] / mag, xi[1] / mag, xi[2] / mag]
    } else {
        xi
    }
}

impl std::ops::Index<usize> for StokesVector {
    type Output = f64;
    fn index(&self, index: usize) -> &Self::Output {
        match index {
            0 => &self.i,
            1 => &self.q,
            2 => &self.u,
            3 => &self.v,
            _ => panic!("index out of bounds: a Stokes vector has 4 components but the index is {}", index)
        }
    }
}

impl std::ops::Add for StokesVector {
    type Output = Self;
    fn add(self, other: Self) -> Self::Output {
        StokesVector {
            i: self.i + other.i,
            q: self.q + other.q,
            u: self.u + other.u,
            v: self.v + other.v
        }
    }
}

impl std::ops::Mul<f64> for StokesVector {
    type Output = Self;
    fn mul(self, other: f64) -> Self {
        Self {
            i: self.i * other,
            q: self.q * other,
            u: self.u * other,
            v: self.v * other,
        }
    }
}

impl std::ops::Div<f64> for StokesVector {
    type Output = Self;
    fn div(self, other: f64) -> Self {
        Self {
            i: self.i / other,
            q: self.q / other,
            u: self.u / other,
            v: self.v / other,
        }
    }
}

impl std::convert::From<[f64; 4]> for StokesVector {
    fn from(item: [f64; 4]) -> Self {
        Self::new(item[0], item[1], item[2], item[3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_by_half_turn_is_identity() {
        let sv = StokesVector::new(1.0, 0.3, -0.4, 0.5);
        let rotated = sv.rotate_by(std::f64::consts::PI);
        for k in 0..4 {
            assert!((rotated[k] - sv[k]).abs() < 1.0e-12);
        }
    }

    #[test]
    fn rotation_preserves_degree() {
        let sv = StokesVector::new(2.0, 0.3, -0.4, 0.5);
        let rotated = sv.rotate_by(0.37);
        println!("dop = {}, after rotation = {}", sv.dop(), rotated.dop());
        assert!((rotated.dop() - sv.dop()).abs() < 1.0e-12);
    }

    #[test]
    fn oversized_polarization_is_clamped() {
        let sv = StokesVector::new(1.0, 1.0, 1.0, 0.0);
        let xi = sv.normalized();
        let mag = xi[0].hypot(xi[1]).hypot(xi[2]);
        assert!((mag - 1.0).abs() < 1.0e-12);
        assert_eq!(StokesVector::zero().normalized(), [0.0; 3]);
    }
}
