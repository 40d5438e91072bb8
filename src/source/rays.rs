//! Sampling of individual photons for ray tracing

use std::f64::consts;

use num::complex::Complex;
use rand::prelude::*;
use rand_distr::Uniform;
use rand_xoshiro::Xoshiro256StarStar;
use rayon::prelude::*;

use crate::constants::*;
use crate::geometry::*;
use crate::SourceError;
use super::*;

/// Number of columns in a ray record.
pub const RAY_COLUMNS: usize = 18;

/// A photon drawn from the source: where it was emitted, where it is
/// going, its energy and one realization of its polarization.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Ray {
    position: Vec3,
    direction: Vec3,
    energy: f64,
    pol: JonesVector,
    basis: [Vec3; 2],
}

impl Ray {
    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }

    /// Complex field amplitudes along the two basis vectors.
    pub fn polarization(&self) -> JonesVector {
        self.pol
    }

    /// Transverse basis vectors, which with the direction of
    /// propagation form a right-handed triad.
    pub fn basis(&self) -> [Vec3; 2] {
        self.basis
    }

    pub fn stokes(&self) -> StokesVector {
        stokes_of(&self.pol)
    }

    pub fn wavelength(&self) -> f64 {
        PLANCK_CONSTANT * SPEED_OF_LIGHT / self.energy
    }

    /// The component of the photon polarization along `dir`,
    /// mod-squared.
    pub fn linear_polarization_along(&self, dir: Vec3) -> f64 {
        let dir = match dir.checked_normalize() {
            Some(d) => d,
            None => return 0.0,
        };
        let amplitude = self.pol[0] * (dir * self.basis[0]) + self.pol[1] * (dir * self.basis[1]);
        amplitude.norm_sqr()
    }

    /// Probability that the photon has positive helicity: recall that
    /// e_pm = (e_1 \pm i e_2) / sqrt(2), so a_+ = (a_1 - i a_2) / sqrt(2).
    pub fn helicity(&self) -> f64 {
        let amplitude = (self.pol[0] - Complex::new(0.0, 1.0) * self.pol[1]) / 2.0f64.sqrt();
        amplitude.norm_sqr()
    }

    /// The ray as a row of the 18-column table read by ray-tracing
    /// codes of the SHADOW family.
    ///
    /// These codes place the beam axis along Y, so the source frame
    /// is mapped as X = -x, Y = z, Z = y. Lengths are in cm.
    ///
    /// | columns | content |
    /// |---|---|
    /// | 0-2 | position |
    /// | 3-5 | direction cosines |
    /// | 6-8 | s-polarized field amplitude (along the first basis vector) |
    /// | 9 | flag, 1 for a live ray |
    /// | 10 | wavenumber, cm^-1 |
    /// | 11 | ray index, counting from 1 |
    /// | 12 | optical path, 0 |
    /// | 13, 14 | phases of the s- and p-polarized fields |
    /// | 15-17 | p-polarized field amplitude |
    pub fn to_record(&self, index: usize) -> [f64; RAY_COLUMNS] {
        let map = |v: Vec3| [-v.x, v.z, v.y];
        let r = map(100.0 * self.position);
        let k = map(self.direction);
        let es = map(self.pol[0].norm() * self.basis[0]);
        let ep = map(self.pol[1].norm() * self.basis[1]);
        let wavenumber = 2.0 * consts::PI / (100.0 * self.wavelength());
        [
            r[0], r[1], r[2],
            k[0], k[1], k[2],
            es[0], es[1], es[2],
            1.0,
            wavenumber,
            (index + 1) as f64,
            0.0,
            self.pol[0].arg(),
            self.pol[1].arg(),
            ep[0], ep[1], ep[2],
        ]
    }
}

/// The window of phase space that rays are drawn from.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RaySettings {
    /// Half-width of the angular window around the bunch axis, in the bunch x direction
    pub x_angle_range: f64,
    /// Half-width of the angular window, in the bunch y direction
    pub y_angle_range: f64,
    pub min_energy: f64,
    pub max_energy: f64,
    /// If set, electron directions are drawn within this many rms
    /// divergences of the bunch axis
    pub spread_range: Option<f64>,
}

impl RaySettings {
    pub fn new(x_angle_range: f64, y_angle_range: f64, min_energy: f64, max_energy: f64) -> Self {
        RaySettings {
            x_angle_range,
            y_angle_range,
            min_energy,
            max_energy,
            spread_range: None,
        }
    }

    pub fn with_spread(self, range: f64) -> Self {
        RaySettings {spread_range: Some(range), ..self}
    }

    fn validate(&self) -> Result<(), SourceError> {
        let invalid = |s: &str| Err(SourceError::InvalidConfiguration(s.to_owned()));
        if !(self.x_angle_range > 0.0 && self.y_angle_range > 0.0) {
            invalid("ray angular ranges must be positive")
        } else if !(self.min_energy > 0.0 && self.max_energy > self.min_energy) {
            invalid("ray energy range must be positive and non-empty")
        } else if self.spread_range.map_or(false, |k| !(k > 0.0)) {
            invalid("ray spread range must be positive")
        } else {
            Ok(())
        }
    }
}

/// Rejection sampler for photons emitted by a source.
///
/// Proposals are drawn uniformly from a box in position, a rectangle
/// of small angles around the bunch axis, an energy interval and,
/// optionally, a rectangle of electron deviation angles. Each is
/// accepted with probability prob / prob0, where prob is the density
/// of emitted photons at that point and prob0 its value at the centre
/// of the box, on axis, at the on-axis energy.
///
/// A sampler is read-only and may be shared between threads; every
/// caller brings its own random number generator.
#[derive(Debug)]
pub struct RaySampler<'a> {
    source: &'a ThomsonSource,
    settings: RaySettings,
    bounds: InteractionBox,
    prob0: f64,
    stats: &'a RayStatistics,
}

impl<'a> RaySampler<'a> {
    pub fn new(source: &'a ThomsonSource, settings: RaySettings, stats: &'a RayStatistics) -> Result<Self, SourceError> {
        settings.validate()?;

        let gf = source.geometric_factor();
        if !(gf > 0.0) {
            return Err(SourceError::InvalidConfiguration("beams do not overlap (geometric factor is zero)".to_owned()));
        }

        let bounds = source.interaction_box();
        let axis = source.bunch().direction();
        let e_peak = source.energy(axis, axis);
        let mut prob0 = source.volume_density(bounds.centre) * source.flux_no_spread(axis, axis, e_peak) / gf;
        if settings.spread_range.is_some() {
            prob0 *= source.bunch().angle_distribution_peak();
        }

        if !(prob0 > 0.0 && prob0.is_finite()) {
            return Err(SourceError::InvalidConfiguration("photon density vanishes at the centre of the interaction region".to_owned()));
        }

        let sampler = RaySampler {source, settings, bounds, prob0, stats};
        stats.set_volume(sampler.phase_space_volume());
        Ok(sampler)
    }

    /// The density that bounds all proposals.
    pub fn envelope(&self) -> f64 {
        self.prob0
    }

    /// Volume of the window proposals are drawn from.
    pub fn phase_space_volume(&self) -> f64 {
        let s = &self.settings;
        let mut volume = self.bounds.volume()
            * 4.0 * s.x_angle_range * s.y_angle_range
            * (s.max_energy - s.min_energy);
        if let Some(k) = s.spread_range {
            let bunch = self.source.bunch();
            volume *= 4.0 * k * k * bunch.x_spread() * bunch.y_spread();
        }
        volume
    }

    /// Draws proposals until one is accepted, polling `token`
    /// before each.
    pub fn draw<R: Rng>(&self, rng: &mut R, token: &CancellationToken) -> Result<Ray, SourceError> {
        let source = self.source;
        let bunch = source.bunch();
        let axis = bunch.direction();
        let (ex, ey) = bunch.transverse_axes();
        let gf = source.geometric_factor();

        let unit = Uniform::new_inclusive(-1.0, 1.0);
        let energies = Uniform::new(self.settings.min_energy, self.settings.max_energy);

        loop {
            token.check()?;

            let r = self.bounds.sample(rng);
            let tx = self.settings.x_angle_range * rng.sample(unit);
            let ty = self.settings.y_angle_range * rng.sample(unit);
            let e = rng.sample(energies);

            let n = match (axis + tx * ex + ty * ey).checked_normalize() {
                Some(n) => n,
                None => continue,
            };

            let (v, weight) = match self.settings.spread_range {
                Some(k) => {
                    let dx = k * bunch.x_spread() * rng.sample(unit);
                    let dy = k * bunch.y_spread() * rng.sample(unit);
                    match (axis + dx * ex + dy * ey).checked_normalize() {
                        Some(v) => (v, bunch.angle_distribution(dx, dy)),
                        None => continue,
                    }
                },
                None => (axis, 1.0),
            };

            let (density, xi) = match source.fixed_polarization() {
                Some(xi) => (source.flux_no_spread(n, v, e), xi),
                None => {
                    let sv = source.polarization_no_spread(n, v, e);
                    (sv.intensity(), sv.normalized())
                },
            };

            let prob = source.volume_density(r) * density * weight / gf;
            self.stats.record(prob, e);

            if !prob.is_finite() {
                continue;
            }

            let mut ratio = prob / self.prob0;
            if ratio > 1.0 {
                source.diagnostics().note_envelope_violation(ratio);
                ratio = 1.0;
            }

            if rng.gen::<f64>() < ratio {
                let frame = source.photon_frame(n);
                return Ok(Ray {
                    position: r,
                    direction: n,
                    energy: e,
                    pol: synthesize(xi, rng),
                    basis: [frame.e1, frame.e2],
                });
            }
        }
    }
}

impl ThomsonSource {
    /// Draws `count` rays, sharing the work between the worker pool.
    ///
    /// `stats` is reset and then accumulates over the whole run;
    /// `progress` is called with the number of rays accepted so far,
    /// from whichever worker accepted the latest ray. Cancellation
    /// discards everything drawn so far.
    pub fn generate_rays<P>(&self, count: usize, settings: RaySettings, stats: &RayStatistics, token: &CancellationToken, progress: P) -> Result<Vec<Ray>, SourceError>
    where P: Fn(usize) + Sync {
        stats.reset();
        let sampler = RaySampler::new(self, settings, stats)?;
        let before = self.diagnostics.counts();
        let rng = Xoshiro256StarStar::seed_from_u64(self.seed);

        let batches = self.pool.install(|| {
            (0..self.threads).into_par_iter()
                .map(|i| -> Result<Vec<(usize, Ray)>, SourceError> {
                    let mut rng = rng.clone();
                    for _ in 0..i {
                        rng.jump();
                    }
                    let mut rays = Vec::new();
                    while stats.accepted() < count {
                        let ray = sampler.draw(&mut rng, token)?;
                        match stats.claim(count) {
                            Some(index) => {
                                progress(index + 1);
                                rays.push((index, ray));
                            },
                            None => break,
                        }
                    }
                    Ok(rays)
                })
                .collect::<Result<Vec<_>, SourceError>>()
        })?;

        let mut rays: Vec<(usize, Ray)> = batches.into_iter().flatten().collect();
        rays.sort_by_key(|(index, _)| *index);

        let after = self.diagnostics.counts();
        if after.envelope_violations > before.envelope_violations {
            log::warn!(
                "{} proposals exceeded the sampling envelope; the ray distribution is biased near its peak",
                after.envelope_violations - before.envelope_violations,
            );
        }
        log::debug!(
            "generated {} rays from {} proposals (acceptance {:.3e})",
            rays.len(), stats.attempted(), stats.acceptance_ratio()
        );

        Ok(rays.into_iter().map(|(_, ray)| ray).collect())
    }
}
