//! Spectral brilliance

use crate::geometry::*;
use crate::SourceError;
use super::{ThomsonSource, CancellationToken};

/// Extent of the line of sight, in bunch lengths either side of the
/// observed point.
const LINE_RANGE: f64 = 3.0;

/// Relative bandwidth that brilliance is quoted in.
const BANDWIDTH: f64 = 1.0e-3;

impl ThomsonSource {
    /// Integral of the (normalized) collision density along the line
    /// through `r0` in direction `n`, in m^-2.
    ///
    /// A direction of zero length has no line of sight and gives zero.
    fn line_of_sight(&self, r0: Vec3, n: Vec3, token: &CancellationToken) -> Result<f64, SourceError> {
        let n = match n.checked_normalize() {
            Some(n) => n,
            None => return Ok(0.0),
        };

        let gf = self.geometric_factor;
        if !(gf > 0.0) {
            return Ok(0.0);
        }

        let range = LINE_RANGE * self.bunch.length();
        let result = self.integrator(token)
            .integrate(|s| Ok(self.volume_density(r0 + s * n) / gf), -range, range);
        self.settle(result)
    }

    /// Spectral brilliance at `r0` of photons with energy `e`
    /// travelling along `n`, emitted by electrons moving along `v`,
    /// in photons / (s m^2 sr 0.1% bandwidth).
    pub fn brilliance(&self, r0: Vec3, n: Vec3, v: Vec3, e: f64, token: &CancellationToken) -> Result<f64, SourceError> {
        let line = self.line_of_sight(r0, n, token)?;
        if line == 0.0 {
            return Ok(0.0);
        }
        Ok(line * self.flux_no_spread(n, v, e) * e * BANDWIDTH)
    }

    /// As `brilliance`, including the divergence of the electron bunch.
    pub fn brilliance_spread(&self, r0: Vec3, n: Vec3, v0: Vec3, e: f64, token: &CancellationToken) -> Result<f64, SourceError> {
        let line = self.line_of_sight(r0, n, token)?;
        if line == 0.0 {
            return Ok(0.0);
        }
        Ok(line * self.flux_spread(n, v0, e, token)? * e * BANDWIDTH)
    }

    /// Brilliance resolved into Stokes parameters.
    pub fn brilliance_polarization(&self, r0: Vec3, n: Vec3, v: Vec3, e: f64, token: &CancellationToken) -> Result<StokesVector, SourceError> {
        let line = self.line_of_sight(r0, n, token)?;
        if line == 0.0 {
            return Ok(StokesVector::zero());
        }
        Ok(self.polarization_no_spread(n, v, e) * (line * e * BANDWIDTH))
    }

    /// Brilliance resolved into Stokes parameters, including the
    /// divergence of the electron bunch.
    pub fn brilliance_polarization_spread(&self, r0: Vec3, n: Vec3, v0: Vec3, e: f64, token: &CancellationToken) -> Result<StokesVector, SourceError> {
        let line = self.line_of_sight(r0, n, token)?;
        if line == 0.0 {
            return Ok(StokesVector::zero());
        }
        Ok(self.polarization_spread(n, v0, e, token)? * (line * e * BANDWIDTH))
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts;
    use crate::beam::*;
    use super::*;

    #[test]
    fn on_axis_brilliance() {
        // Round beams, negligible diffraction: along the axis the line
        // integral is the transverse density of the overlap at r0.
        let laser = LaserPulse::default().with_rayleigh_length(1.0e3);
        let w2 = laser.width2(0.0);
        let bunch = ElectronBunch::default().with_beta(1.0e3, 1.0e3).with_emittance(w2 / 1.0e3, w2 / 1.0e3);
        let mut source = ThomsonSource::new(bunch, laser).unwrap().with_precision(1.0e-8);
        source.set_geometric_factor(1.0);

        let token = CancellationToken::new();
        let n = Vec3::new(0.0, 0.0, 1.0);
        let e = source.energy(n, n);
        let value = source.brilliance(Vec3::zero(), n, n, e, &token).unwrap();

        // product of two Gaussians of variance w2 has variance w2 / 2
        let transverse = 1.0 / (2.0 * consts::PI * 0.5 * w2);
        let target = transverse * source.flux_no_spread(n, n, e) * e * 1.0e-3;
        println!("brilliance = {:.6e}, target = {:.6e}", value, target);
        assert!(((value - target) / target).abs() < 1.0e-4);
    }

    #[test]
    fn degenerate_direction() {
        let source = ThomsonSource::new(ElectronBunch::default(), LaserPulse::default()).unwrap();
        let token = CancellationToken::new();
        let v = Vec3::new(0.0, 0.0, 1.0);
        let e = source.energy(v, v);
        assert_eq!(source.brilliance(Vec3::zero(), Vec3::zero(), v, e, &token).unwrap(), 0.0);
        assert_eq!(source.brilliance_polarization(Vec3::zero(), Vec3::zero(), v, e, &token).unwrap(), StokesVector::zero());
        assert!(source.diagnostics().counts().is_clean());
    }

    #[test]
    fn polarization_matches_flux() {
        let source = ThomsonSource::new(ElectronBunch::default(), LaserPulse::default()).unwrap();
        let token = CancellationToken::new();
        let v = Vec3::new(0.0, 0.0, 1.0);
        let n = Vec3::new(1.0e-3, 0.0, 1.0).normalize();
        let e = source.energy(n, v);
        let r0 = Vec3::new(2.0e-6, -1.0e-6, 0.0);
        let scalar = source.brilliance(r0, n, v, e, &token).unwrap();
        let stokes = source.brilliance_polarization(r0, n, v, e, &token).unwrap();
        println!("brilliance = {:.6e}, I = {:.6e}", scalar, stokes[0]);
        assert!(scalar > 0.0);
        assert!(((stokes[0] - scalar) / scalar).abs() < 1.0e-10);
    }
}
