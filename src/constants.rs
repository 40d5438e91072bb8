//! Physical constants, in SI units unless stated otherwise

pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;
pub const ELEMENTARY_CHARGE: f64 = 1.602_176_634e-19;
pub const ELECTRON_MASS: f64 = 9.109_383_7015e-31;
pub const PLANCK_CONSTANT: f64 = 6.626_070_15e-34;
pub const REDUCED_PLANCK_CONSTANT: f64 = 1.054_571_817e-34;
pub const CLASSICAL_ELECTRON_RADIUS: f64 = 2.817_940_3262e-15;

/// sigma_T = 8 pi r_e^2 / 3
pub const THOMSON_CROSS_SECTION: f64 = 6.652_458_7321e-29;

#[cfg(test)]
mod tests {
    use std::f64::consts;
    use super::*;

    #[test]
    fn thomson_cross_section() {
        let target = 8.0 * consts::PI * CLASSICAL_ELECTRON_RADIUS.powi(2) / 3.0;
        println!("sigma_T = {:.10e}, 8 pi r_e^2 / 3 = {:.10e}", THOMSON_CROSS_SECTION, target);
        assert!(((THOMSON_CROSS_SECTION - target) / target).abs() < 1.0e-9);
    }
}
