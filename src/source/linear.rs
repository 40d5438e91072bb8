//! Scattering in the linear (single-photon) regime

use std::f64::consts;

use crate::beam::*;
use crate::constants::*;
use crate::geometry::*;
use super::{CrossSection, Interaction};

/// Smallest relative energy spread used in the spectral line shape.
const ENERGY_SPREAD_FLOOR: f64 = 1.0e-6;

/// Thomson scattering of laser photons by electrons with a Gaussian
/// energy distribution, in the electron rest frame described by the
/// classical Thomson cross section.
///
/// With u = 2 gamma^2 (1 - n.v), the angular flux density is
/// ```text
///   dN/dOmega = F G (3 gamma^2 / 2 pi) (1 + u^2) / (1 + u)^4,
/// ```
/// which integrates to F G over all directions.
#[derive(Copy, Clone, Debug, Default)]
pub struct LinearCompton;

impl LinearCompton {
    pub fn new() -> Self {
        LinearCompton
    }

    /// The normalized distribution of photon energy at fixed n.v,
    /// inherited from the Gaussian distribution of electron energy.
    ///
    /// An electron with Lorentz factor gamma' scatters into angle
    /// theta (theta^2 ~ 2(1 - n.v)) photons of energy
    /// e = 4 gamma'^2 E_ph / (1 + gamma'^2 theta^2); inverting this
    /// for gamma' gives the resonant Lorentz factor at energy e.
    fn line_shape(&self, bunch: &ElectronBunch, laser: &LaserPulse, nv: f64, e: f64) -> f64 {
        let gamma = bunch.gamma();
        let eph = laser.photon_energy();
        let delta = bunch.energy_spread().abs().max(ENERGY_SPREAD_FLOOR);

        let theta2 = 2.0 * (1.0 - nv);
        let theta2 = if theta2 < 0.0 {0.0} else {theta2};
        let denom = 1.0 - e * theta2 / (4.0 * eph);

        if e <= 0.0 || denom <= 0.0 {
            return 0.0;
        }

        let gamma_res = 0.5 * (e / eph / denom).sqrt();
        let k = (gamma_res - gamma) / (gamma * delta);
        let weight = (-0.5 * k * k).exp() / ((2.0 * consts::PI).sqrt() * gamma * delta);

        // d(gamma_res)/de
        weight * gamma_res / (2.0 * e * denom)
    }

    fn doppler_variable(&self, bunch: &ElectronBunch, nv: f64) -> f64 {
        let u = 2.0 * bunch.gamma().powi(2) * (1.0 - nv);
        if u < 0.0 {0.0} else {u}
    }
}

impl CrossSection for LinearCompton {
    fn name(&self) -> &str {
        "linear"
    }

    fn total_flux(&self, bunch: &ElectronBunch, laser: &LaserPulse) -> f64 {
        let sx2 = bunch.x_width2(0.0) + laser.width2(0.0);
        let sy2 = bunch.y_width2(0.0) + laser.width2(0.0);
        THOMSON_CROSS_SECTION * bunch.number() * laser.photon_number() * laser.frequency()
            / (2.0 * consts::PI * (sx2 * sy2).sqrt())
    }

    fn energy(&self, ctx: &Interaction, n: Vec3, v: Vec3) -> f64 {
        2.0 * ctx.laser.photon_energy() / (1.0 - (n * v) * ctx.bunch.speed())
    }

    fn flux(&self, ctx: &Interaction, n: Vec3, v: Vec3) -> f64 {
        let gamma = ctx.bunch.gamma();
        let u = self.doppler_variable(ctx.bunch, n * v);
        ctx.total_flux * ctx.geometric_factor
            * 3.0 * gamma * gamma / (2.0 * consts::PI)
            * (1.0 + u * u) / (1.0 + u).powi(4)
    }

    fn flux_no_spread(&self, ctx: &Interaction, n: Vec3, v: Vec3, e: f64) -> f64 {
        self.flux(ctx, n, v) * self.line_shape(ctx.bunch, ctx.laser, n * v, e)
    }

    /// In the electron rest frame, the incident polarization is
    /// transferred by the Thomson (dipole) matrix
    /// ```text
    ///   I' = [(c^2 + 1) I + (c^2 - 1) Q] / 2
    ///   Q' = [(c^2 - 1) I + (c^2 + 1) Q] / 2
    ///   U' = c U,  V' = c V
    /// ```
    /// where c = cos(theta*) = (1 - u)/(1 + u) and Q refers to the
    /// scattering plane. The scattering plane is fixed by the
    /// projection of `v` onto the plane perpendicular to `n`.
    fn polarization_no_spread(&self, ctx: &Interaction, n: Vec3, v: Vec3, e: f64) -> StokesVector {
        let nv = n * v;
        let g = self.line_shape(ctx.bunch, ctx.laser, nv, e);
        if g == 0.0 {
            return StokesVector::zero();
        }

        let gamma = ctx.bunch.gamma();
        let u = self.doppler_variable(ctx.bunch, nv);
        let c = (1.0 - u) / (1.0 + u);
        let c2 = c * c;
        let doppler2 = 4.0 * gamma * gamma / (1.0 + u).powi(2);

        let phi = ctx.photon_frame(n).azimuth_of(v);
        let incident = ctx.laser.polarization().rotate_by(phi);

        let scattered = StokesVector::new(
            0.5 * ((c2 + 1.0) * incident[0] + (c2 - 1.0) * incident[1]),
            0.5 * ((c2 - 1.0) * incident[0] + (c2 + 1.0) * incident[1]),
            c * incident[2],
            c * incident[3],
        );

        let norm = ctx.total_flux * ctx.geometric_factor * 3.0 * doppler2 / (8.0 * consts::PI);
        scattered.rotate_by(-phi) * (norm * g)
    }
}
