//! Parameters of the colliding electron bunch and laser pulse

mod electron;
mod laser;

pub use self::electron::*;
pub use self::laser::*;

/// Smallest length (in metres) or angle (in radians) used where a
/// width or spread appears in a denominator.
pub const WIDTH_FLOOR: f64 = 1.0e-15;
