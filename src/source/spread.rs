//! Averages over the angular spread of the electron bunch

use std::f64::consts;

use rayon::prelude::*;

use crate::geometry::*;
use crate::quadrature::IntegrationError;
use crate::SourceError;
use super::{ThomsonSource, CancellationToken};

impl ThomsonSource {
    /// Integrates `primitive(v)` against the bunch's angular
    /// distribution around the mean velocity direction `v0`.
    ///
    /// Electron directions are parametrized by polar angles (theta, phi)
    /// around `v0`, with theta up to `spread_cutoff` times the larger
    /// rms divergence. The phi and theta integrals each have their own
    /// integrator.
    fn spread_average<F>(&self, v0: Vec3, token: &CancellationToken, primitive: F) -> Result<f64, SourceError>
    where F: Fn(Vec3) -> f64 {
        let (ex, ey) = self.bunch.transverse_axes();
        let cutoff = self.spread_cutoff * self.bunch.x_spread().max(self.bunch.y_spread());

        let integrand = |phi: f64| -> Result<f64, IntegrationError> {
            let (sin_phi, cos_phi) = phi.sin_cos();
            let radial = |theta: f64| -> Result<f64, IntegrationError> {
                let (tx, ty) = (theta * cos_phi, theta * sin_phi);
                let v = match (v0 + tx * ex + ty * ey).checked_normalize() {
                    Some(v) => v,
                    None => return Ok(0.0),
                };
                Ok(theta * self.bunch.angle_distribution(tx, ty) * primitive(v))
            };
            let result = self.integrator(token).integrate(radial, 0.0, cutoff);
            self.settle_inner(result)
        };

        let result = self.integrator(token).integrate(integrand, 0.0, 2.0 * consts::PI);
        self.settle(result)
    }

    /// Spectral angular flux density, averaged over the divergence of the bunch.
    pub fn flux_spread(&self, n: Vec3, v0: Vec3, e: f64, token: &CancellationToken) -> Result<f64, SourceError> {
        self.spread_average(v0, token, |v| self.flux_no_spread(n, v, e))
    }

    /// Angular flux density (integrated over energy), averaged over
    /// the divergence of the bunch.
    pub fn angular_flux_spread(&self, n: Vec3, v0: Vec3, token: &CancellationToken) -> Result<f64, SourceError> {
        self.spread_average(v0, token, |v| self.flux(n, v))
    }

    /// Stokes parameters of the spectral angular flux density, averaged
    /// over the divergence of the bunch. The four components are
    /// integrated concurrently on the worker pool.
    pub fn polarization_spread(&self, n: Vec3, v0: Vec3, e: f64, token: &CancellationToken) -> Result<StokesVector, SourceError> {
        let components: Vec<f64> = self.pool.install(|| {
            (0..4usize).into_par_iter()
                .map(|k| self.spread_average(v0, token, |v| self.polarization_no_spread(n, v, e)[k]))
                .collect::<Result<Vec<f64>, SourceError>>()
        })?;
        Ok(StokesVector::new(components[0], components[1], components[2], components[3]))
    }
}

#[cfg(test)]
mod tests {
    use crate::beam::*;
    use super::*;

    fn source(bunch: ElectronBunch) -> ThomsonSource {
        let mut source = ThomsonSource::new(bunch, LaserPulse::default())
            .unwrap()
            .with_precision(1.0e-6);
        source.set_geometric_factor(1.0);
        source
    }

    #[test]
    fn vanishing_spread_reproduces_primitive() {
        let bunch = ElectronBunch::default().with_emittance(1.0e-16, 1.0e-16);
        let source = source(bunch);
        let token = CancellationToken::new();
        let v0 = Vec3::new(0.0, 0.0, 1.0);
        for &angle in &[0.0, 2.0e-3, 5.0e-3] {
            let n = Vec3::new(angle, 0.0, 1.0).normalize();
            let e = source.energy(n, v0);
            let target = source.flux_no_spread(n, v0, e);
            let value = source.flux_spread(n, v0, e, &token).unwrap();
            println!("angle = {:.1e}: spread = {:.6e}, no spread = {:.6e}", angle, value, target);
            assert!(((value - target) / target).abs() < 1.0e-3);
        }
    }

    #[test]
    fn vanishing_spread_reproduces_stokes() {
        let bunch = ElectronBunch::default().with_emittance(1.0e-16, 1.0e-16);
        let laser = LaserPulse::default().with_polarization([0.6, 0.0, 0.8]);
        let mut source = ThomsonSource::new(bunch, laser).unwrap().with_precision(1.0e-6);
        source.set_geometric_factor(1.0);
        let token = CancellationToken::new();
        let v0 = Vec3::new(0.0, 0.0, 1.0);
        let n = Vec3::new(1.0e-3, 2.0e-3, 1.0).normalize();
        let e = source.energy(n, v0);
        let target = source.polarization_no_spread(n, v0, e);
        let value = source.polarization_spread(n, v0, e, &token).unwrap();
        println!("spread = {:?}\nno spread = {:?}", value, target);
        for k in 0..4 {
            assert!((value[k] - target[k]).abs() < 1.0e-3 * target[0]);
        }
    }

    #[test]
    fn divergence_broadens_angular_distribution() {
        let source = source(ElectronBunch::default().with_emittance(4.0e-7, 4.0e-7));
        let token = CancellationToken::new();
        let v0 = Vec3::new(0.0, 0.0, 1.0);
        let on_axis = source.angular_flux_spread(v0, v0, &token).unwrap();
        let far = Vec3::new(0.03, 0.0, 1.0).normalize();
        let off_axis = source.angular_flux_spread(far, v0, &token).unwrap();
        println!("on axis: {:.6e} vs {:.6e}; off axis: {:.6e} vs {:.6e}",
            on_axis, source.flux(v0, v0), off_axis, source.flux(far, v0));
        assert!(on_axis < source.flux(v0, v0));
        assert!(off_axis > source.flux(far, v0));
    }

    #[test]
    fn cancellation_propagates() {
        let source = source(ElectronBunch::default());
        let token = CancellationToken::new();
        token.cancel();
        let v0 = Vec3::new(0.0, 0.0, 1.0);
        let e = source.energy(v0, v0);
        assert!(matches!(source.flux_spread(v0, v0, e, &token), Err(SourceError::Cancelled)));
        assert!(matches!(source.polarization_spread(v0, v0, e, &token), Err(SourceError::Cancelled)));
    }
}
