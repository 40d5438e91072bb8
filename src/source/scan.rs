//! Tabulation of source properties over grids of energy, angle or position

use ndarray::prelude::*;
use rayon::prelude::*;

use crate::geometry::*;
use crate::SourceError;
use super::{ThomsonSource, CancellationToken};

/// Shapes a row-major list of values into an `nx` x `ny` array.
fn to_grid(values: Vec<f64>, nx: usize, ny: usize) -> Result<Array2<f64>, SourceError> {
    Array2::from_shape_vec((nx, ny), values)
        .map_err(|e| SourceError::InvalidConfiguration(e.to_string()))
}

impl ThomsonSource {
    /// Direction making small angles `tx` and `ty` with the bunch axis,
    /// measured along the bunch's transverse axes.
    pub fn direction_at(&self, tx: f64, ty: f64) -> Vec3 {
        let (ex, ey) = self.bunch.transverse_axes();
        let axis = self.bunch.direction();
        (axis + tx * ex + ty * ey).checked_normalize().unwrap_or(axis)
    }

    /// Spectral angular flux density along `n`, at each of `energies`,
    /// for electrons moving along the bunch axis. With `spread`, the
    /// divergence of the bunch is averaged over.
    pub fn spectrum(&self, n: Vec3, energies: &Array1<f64>, spread: bool, token: &CancellationToken) -> Result<Array1<f64>, SourceError> {
        let v0 = self.bunch.direction();
        let values = self.pool.install(|| {
            energies.to_vec().into_par_iter()
                .map(|e| {
                    token.check()?;
                    if spread {
                        self.flux_spread(n, v0, e, token)
                    } else {
                        Ok(self.flux_no_spread(n, v0, e))
                    }
                })
                .collect::<Result<Vec<f64>, SourceError>>()
        })?;
        Ok(Array1::from(values))
    }

    /// As `spectrum`, resolved into Stokes parameters: one row per energy,
    /// columns I, Q, U and V.
    pub fn polarization_spectrum(&self, n: Vec3, energies: &Array1<f64>, spread: bool, token: &CancellationToken) -> Result<Array2<f64>, SourceError> {
        let v0 = self.bunch.direction();
        let rows = energies.iter()
            .map(|&e| {
                token.check()?;
                if spread {
                    self.polarization_spread(n, v0, e, token)
                } else {
                    Ok(self.polarization_no_spread(n, v0, e))
                }
            })
            .collect::<Result<Vec<StokesVector>, SourceError>>()?;

        let values = rows.iter().flat_map(|sv| sv.to_array().to_vec()).collect();
        to_grid(values, energies.len(), 4)
    }

    /// Angular flux density (photons/s/sr) on the grid of observation
    /// angles `x_angles` x `y_angles` around the bunch axis.
    pub fn angular_map(&self, x_angles: &Array1<f64>, y_angles: &Array1<f64>, spread: bool, token: &CancellationToken) -> Result<Array2<f64>, SourceError> {
        let v0 = self.bunch.direction();
        let points: Vec<(f64, f64)> = x_angles.iter()
            .flat_map(|&tx| y_angles.iter().map(move |&ty| (tx, ty)))
            .collect();

        let values = self.pool.install(|| {
            points.into_par_iter()
                .map(|(tx, ty)| {
                    token.check()?;
                    let n = self.direction_at(tx, ty);
                    if spread {
                        self.angular_flux_spread(n, v0, token)
                    } else {
                        Ok(self.flux(n, v0))
                    }
                })
                .collect::<Result<Vec<f64>, SourceError>>()
        })?;

        to_grid(values, x_angles.len(), y_angles.len())
    }

    /// Brilliance of photons with energy `e`, travelling along `n`, on
    /// a grid of transverse offsets (`xs` x `ys`, along the bunch's
    /// transverse axes) from the centre of the interaction region.
    pub fn brilliance_map(&self, n: Vec3, e: f64, xs: &Array1<f64>, ys: &Array1<f64>, spread: bool, token: &CancellationToken) -> Result<Array2<f64>, SourceError> {
        let v0 = self.bunch.direction();
        let (ex, ey) = self.bunch.transverse_axes();
        let centre = self.interaction_box().centre;
        let points: Vec<Vec3> = xs.iter()
            .flat_map(|&x| ys.iter().map(move |&y| centre + x * ex + y * ey))
            .collect();

        let values = self.pool.install(|| {
            points.into_par_iter()
                .map(|r0| {
                    if spread {
                        self.brilliance_spread(r0, n, v0, e, token)
                    } else {
                        self.brilliance(r0, n, v0, e, token)
                    }
                })
                .collect::<Result<Vec<f64>, SourceError>>()
        })?;

        to_grid(values, xs.len(), ys.len())
    }

    /// Evaluates `observe` on a copy of the source for each of `values`.
    ///
    /// Each copy is modified by `configure`, after which its total flux
    /// and closed-form geometric factor are recomputed. The source
    /// itself is never modified. Points are processed concurrently.
    pub fn sweep<T, C, O>(&self, values: &Array1<f64>, configure: C, observe: O, token: &CancellationToken) -> Result<Array1<T>, SourceError>
    where
        T: Send,
        C: Fn(&mut ThomsonSource, f64) -> Result<(), SourceError> + Sync,
        O: Fn(&mut ThomsonSource) -> Result<T, SourceError> + Sync,
    {
        let results = self.pool.install(|| {
            values.to_vec().into_par_iter()
                .map(|x| {
                    token.check()?;
                    let mut copy = self.clone();
                    configure(&mut copy, x)?;
                    copy.calculate_total_flux();
                    copy.set_geometric_factor(copy.approximate_geometric_factor());
                    observe(&mut copy)
                })
                .collect::<Result<Vec<T>, SourceError>>()
        })?;
        Ok(Array1::from(results))
    }
}

#[cfg(test)]
mod tests {
    use crate::beam::*;
    use super::*;

    fn source() -> ThomsonSource {
        ThomsonSource::new(ElectronBunch::default(), LaserPulse::default()).unwrap()
    }

    #[test]
    fn spectrum_peaks_at_backscattered_energy() {
        let source = source();
        let token = CancellationToken::new();
        let axis = source.bunch().direction();
        let e0 = source.energy(axis, axis);
        let energies = Array1::linspace(0.9 * e0, 1.1 * e0, 201);
        let values = source.spectrum(axis, &energies, false, &token).unwrap();

        let (i_max, _) = values.iter()
            .enumerate()
            .fold((0, 0.0), |(i, m), (j, &v)| if v > m {(j, v)} else {(i, m)});
        println!("peak at {:.6e}, e0 = {:.6e}", energies[i_max], e0);
        assert_eq!(values.len(), 201);
        assert!(((energies[i_max] - e0) / e0).abs() < 2.0e-3);
        assert_eq!(values[50], source.flux_no_spread(axis, axis, energies[50]));
    }

    #[test]
    fn polarization_spectrum_has_four_columns() {
        let source = source();
        let token = CancellationToken::new();
        let n = source.direction_at(1.0e-3, 0.0);
        let e0 = source.energy(n, source.bunch().direction());
        let energies = Array1::linspace(0.95 * e0, 1.05 * e0, 5);
        let table = source.polarization_spectrum(n, &energies, false, &token).unwrap();
        let scalar = source.spectrum(n, &energies, false, &token).unwrap();
        assert_eq!(table.shape(), &[5, 4]);
        for i in 0..5 {
            assert!((table[[i, 0]] - scalar[i]).abs() <= 1.0e-10 * scalar[i].abs());
        }
    }

    #[test]
    fn angular_map_is_symmetric() {
        let source = source();
        let token = CancellationToken::new();
        let gamma = source.bunch().gamma();
        let xs = Array1::linspace(-2.0 / gamma, 2.0 / gamma, 5);
        let ys = Array1::linspace(-1.0 / gamma, 1.0 / gamma, 3);
        let map = source.angular_map(&xs, &ys, false, &token).unwrap();
        println!("{:e}", map);
        assert_eq!(map.shape(), &[5, 3]);
        assert!(((map[[0, 1]] - map[[4, 1]]) / map[[2, 1]]).abs() < 1.0e-10);
        assert!(map[[2, 1]] > map[[1, 1]]);
        assert!(map[[2, 1]] > map[[2, 0]]);
    }

    #[test]
    fn brilliance_map_peaks_on_axis() {
        let source = source();
        let token = CancellationToken::new();
        let axis = source.bunch().direction();
        let e0 = source.energy(axis, axis);
        let w = source.bunch().x_width(0.0);
        let xs = Array1::linspace(-2.0 * w, 2.0 * w, 3);
        let ys = Array1::from(vec![0.0]);
        let map = source.brilliance_map(axis, e0, &xs, &ys, false, &token).unwrap();
        println!("{:e}", map);
        assert!(map[[1, 0]] > map[[0, 0]]);
        assert!(map[[0, 0]] > 0.0);
    }

    #[test]
    fn sweep_leaves_source_untouched() {
        let source = source();
        let token = CancellationToken::new();
        let energies = Array1::from(vec![0.01, 0.02, 0.04]);
        let fluxes = source.sweep(
            &energies,
            |s, x| {
                let laser = s.laser().with_pulse_energy(x);
                s.set_laser(laser);
                Ok(())
            },
            |s| Ok(s.full_flux()),
            &token,
        ).unwrap();
        println!("{:e}", fluxes);
        assert_eq!(source.laser().pulse_energy(), 0.02);
        assert!(((fluxes[1] - source.full_flux()) / fluxes[1]).abs() < 1.0e-12);
        assert!((fluxes[2] / fluxes[0] - 4.0).abs() < 1.0e-12);
    }

    #[test]
    fn cancelled_scan() {
        let source = source();
        let token = CancellationToken::new();
        token.cancel();
        let xs = Array1::linspace(-1.0e-3, 1.0e-3, 4);
        assert!(matches!(source.angular_map(&xs, &xs, false, &token), Err(SourceError::Cancelled)));
        assert!(matches!(source.spectrum(source.bunch().direction(), &xs, true, &token), Err(SourceError::Cancelled)));
    }
}
