use std::f64::consts;

use crate::constants::*;
use crate::geometry::*;
use crate::SourceError;

use super::WIDTH_FLOOR;

/// A relativistic electron bunch with Gaussian profiles in
/// all six phase-space coordinates.
///
/// The transverse rms widths follow the usual beta-function
/// evolution around the focus,
///   sigma_x^2(z) = eps_x (beta_x + z^2 / beta_x),
/// where z is measured from the focal point along the bunch
/// direction, and the rms angular divergence is sqrt(eps_x / beta_x).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ElectronBunch {
    gamma: f64,
    number: f64,
    delgamma: f64,
    length: f64,
    eps: [f64; 2],
    beta: [f64; 2],
    direction: Vec3,
    shift: Vec3,
}

impl Default for ElectronBunch {
    /// A 50 MeV, 1 nC bunch focused to ~10 micron spots.
    fn default() -> Self {
        ElectronBunch {
            gamma: 100.0,
            number: 1.0e-9 / ELEMENTARY_CHARGE,
            delgamma: 0.01,
            length: 3.0e-4,
            eps: [5.0e-9, 5.0e-9],
            beta: [0.02, 0.02],
            direction: Vec3::new(0.0, 0.0, 1.0),
            shift: Vec3::zero(),
        }
    }
}

impl ElectronBunch {
    pub fn with_gamma(&self, gamma: f64) -> Self {
        ElectronBunch {gamma, ..*self}
    }

    pub fn with_number(&self, number: f64) -> Self {
        ElectronBunch {number, ..*self}
    }

    /// Sets the relative rms energy spread, Delta gamma / gamma.
    pub fn with_energy_spread(&self, delgamma: f64) -> Self {
        ElectronBunch {delgamma, ..*self}
    }

    /// Sets the rms bunch length, in metres.
    pub fn with_length(&self, length: f64) -> Self {
        ElectronBunch {length, ..*self}
    }

    /// Sets the geometric emittances, in m rad.
    pub fn with_emittance(&self, eps_x: f64, eps_y: f64) -> Self {
        ElectronBunch {eps: [eps_x, eps_y], ..*self}
    }

    /// Sets the beta functions at the focus, in metres.
    pub fn with_beta(&self, beta_x: f64, beta_y: f64) -> Self {
        ElectronBunch {beta: [beta_x, beta_y], ..*self}
    }

    pub fn with_shift(&self, shift: Vec3) -> Self {
        ElectronBunch {shift, ..*self}
    }

    /// Sets the direction of propagation, which need not be
    /// normalized but must have non-zero length.
    pub fn with_direction(&self, direction: Vec3) -> Result<Self, SourceError> {
        let direction = direction.checked_normalize()
            .ok_or_else(|| SourceError::InvalidConfiguration("electron direction must have non-zero length".to_owned()))?;
        Ok(ElectronBunch {direction, ..*self})
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn number(&self) -> f64 {
        self.number
    }

    pub fn energy_spread(&self) -> f64 {
        self.delgamma
    }

    pub fn length(&self) -> f64 {
        self.length.max(WIDTH_FLOOR)
    }

    /// Electron speed in units of c.
    pub fn speed(&self) -> f64 {
        (1.0 - 1.0 / (self.gamma * self.gamma)).max(0.0).sqrt()
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn shift(&self) -> Vec3 {
        self.shift
    }

    /// The transverse axes (x, y) of the bunch, which together with
    /// its direction form a right-handed triad. x is chosen as close
    /// as possible to the lab x axis.
    pub fn transverse_axes(&self) -> (Vec3, Vec3) {
        let ex = self.direction.orthogonal();
        let ey = self.direction.cross(ex);
        (ex, ey)
    }

    fn width2(&self, i: usize, z: f64) -> f64 {
        let beta = self.beta[i].max(WIDTH_FLOOR);
        let eps = self.eps[i].max(WIDTH_FLOOR * WIDTH_FLOOR);
        eps * (beta + z * z / beta)
    }

    /// Square of the horizontal rms width at distance `z` from the focus.
    pub fn x_width2(&self, z: f64) -> f64 {
        self.width2(0, z)
    }

    /// Square of the vertical rms width at distance `z` from the focus.
    pub fn y_width2(&self, z: f64) -> f64 {
        self.width2(1, z)
    }

    pub fn x_width(&self, z: f64) -> f64 {
        self.x_width2(z).sqrt()
    }

    pub fn y_width(&self, z: f64) -> f64 {
        self.y_width2(z).sqrt()
    }

    /// rms angular divergence in the x direction.
    pub fn x_spread(&self) -> f64 {
        (self.eps[0].max(0.0) / self.beta[0].max(WIDTH_FLOOR)).sqrt().max(WIDTH_FLOOR)
    }

    /// rms angular divergence in the y direction.
    pub fn y_spread(&self) -> f64 {
        (self.eps[1].max(0.0) / self.beta[1].max(WIDTH_FLOOR)).sqrt().max(WIDTH_FLOOR)
    }

    /// Normalized probability density of the electron velocity
    /// deviating from the mean direction by the small angles
    /// `theta_x` and `theta_y`.
    pub fn angle_distribution(&self, theta_x: f64, theta_y: f64) -> f64 {
        let sx = self.x_spread();
        let sy = self.y_spread();
        let arg = 0.5 * (theta_x / sx).powi(2) + 0.5 * (theta_y / sy).powi(2);
        (-arg).exp() / (2.0 * consts::PI * sx * sy)
    }

    /// Maximum value of the angular distribution.
    pub fn angle_distribution_peak(&self) -> f64 {
        self.angle_distribution(0.0, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angular_distribution_is_normalized() {
        let bunch = ElectronBunch::default().with_emittance(4.0e-9, 1.0e-9);
        let (sx, sy) = (bunch.x_spread(), bunch.y_spread());
        let n = 200;
        let (hx, hy) = (12.0 * sx / (n as f64), 12.0 * sy / (n as f64));
        let mut total = 0.0;
        for i in 0..n {
            for j in 0..n {
                let tx = -6.0 * sx + ((i as f64) + 0.5) * hx;
                let ty = -6.0 * sy + ((j as f64) + 0.5) * hy;
                total += bunch.angle_distribution(tx, ty) * hx * hy;
            }
        }
        println!("integral of angular distribution = {}", total);
        assert!((total - 1.0).abs() < 1.0e-6);
    }

    #[test]
    fn waist_is_at_focus() {
        let bunch = ElectronBunch::default();
        let w0 = bunch.x_width(0.0);
        assert!(bunch.x_width(1.0e-3) > w0);
        assert!((bunch.x_width(-1.0e-3) - bunch.x_width(1.0e-3)).abs() < 1.0e-18);
        assert!((w0 - (5.0e-9_f64 * 0.02).sqrt()).abs() < 1.0e-15);
    }

    #[test]
    fn zero_direction_is_rejected() {
        let bunch = ElectronBunch::default();
        assert!(bunch.with_direction(Vec3::zero()).is_err());
        let tilted = bunch.with_direction(Vec3::new(0.0, 1.0, 1.0)).unwrap();
        assert!((tilted.direction().norm() - 1.0).abs() < 1.0e-15);
        let (ex, ey) = tilted.transverse_axes();
        assert!((ex * tilted.direction()).abs() < 1.0e-15);
        assert!((ex.cross(ey) - tilted.direction()).norm() < 1.0e-15);
    }
}
