use std::fmt;

#[derive(Copy, Clone, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64
}

impl fmt::Debug for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({:.6e}, {:.6e}, {:.6e})", self.x, self.y, self.z)
    }
}

// Operator overloading

// Add two vectors together
impl std::ops::Add for Vec3 {
    type Output = Vec3;
    fn add(self, other: Vec3) -> Vec3 {
        Vec3 {x: self.x + other.x, y: self.y + other.y, z: self.z + other.z}
    }
}

// Subtract one vector from another
impl std::ops::Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, other: Vec3) -> Vec3 {
        Vec3 {x: self.x - other.x, y: self.y - other.y, z: self.z - other.z}
    }
}

// Multiply, i.e. dot, two vectors
impl std::ops::Mul for Vec3 {
    type Output = f64;
    fn mul(self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }
}

// Multiply a vector by a scalar
impl std::ops::Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, other: f64) -> Vec3 {
        Vec3{x: self.x * other, y: self.y * other, z: self.z * other}
    }
}

// Multiply a scalar by a vector
impl std::ops::Mul<Vec3> for f64 {
    type Output = Vec3;
    fn mul(self, other: Vec3) -> Vec3 {
        Vec3{x: self * other.x, y: self * other.y, z: self * other.z}
    }
}

// Negate a vector
impl std::ops::Neg for Vec3 {
    type Output = Vec3;
    fn neg(self) -> Vec3 {
        -1.0 * self
    }
}

// Divide a vector by a scalar
impl std::ops::Div<f64> for Vec3 {
    type Output = Vec3;
    fn div(self, other: f64) -> Vec3 {
        Vec3{x: self.x / other, y: self.y / other, z: self.z / other}
    }
}

impl std::ops::Index<usize> for Vec3 {
    type Output = f64;
    fn index(&self, index: usize) -> &f64 {
        match index {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("index out of bounds: a Vec3 has 3 components but the index is {}", index)
        }
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from(a: [f64; 3]) -> Vec3 {
        Vec3::new_from_slice(&a)
    }
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Vec3 {
        Vec3{x: x, y: y, z: z}
    }

    pub fn zero() -> Vec3 {
        Vec3{x: 0.0, y: 0.0, z: 0.0}
    }

    pub fn new_from_slice(a: &[f64; 3]) -> Vec3 {
        Vec3{x: a[0], y: a[1], z: a[2]}
    }

    pub fn cross(self, other: Vec3) -> Vec3 {
        Vec3 {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    pub fn norm_sqr(self) -> f64 {
        self * self
    }

    pub fn norm(self) -> f64 {
        self.norm_sqr().sqrt()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn normalize(self) -> Self {
        let mag = self.norm_sqr().sqrt();
        assert!(mag > 0.0);
        self / mag
    }

    /// Unit vector parallel to self, or None if self has
    /// zero (or non-finite) length.
    pub fn checked_normalize(self) -> Option<Self> {
        let mag = self.norm_sqr().sqrt();
        if mag > 0.0 && mag.is_finite() {
            Some(self / mag)
        } else {
            None
        }
    }

    /// Returns the component of self perpendicular to
    /// the unit vector `axis`.
    pub fn reject_from(self, axis: Vec3) -> Vec3 {
        self - (self * axis) * axis
    }

    /// A unit vector perpendicular to self, chosen to lie as
    /// close as possible to the x axis.
    pub fn orthogonal(self) -> Vec3 {
        let n = self.normalize();
        Vec3::new(1.0, 0.0, 0.0).reject_from(n)
            .checked_normalize()
            .unwrap_or_else(|| Vec3::new(0.0, 1.0, 0.0).reject_from(n).normalize())
    }
}
