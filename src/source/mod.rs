//! The collision of an electron bunch and a laser pulse, treated
//! as a source of scattered photons.

use std::fmt;
use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::beam::*;
use crate::geometry::*;
use crate::quadrature::*;
use crate::SourceError;

mod stats;
mod spread;
mod volume;
mod brilliance;
mod polarization;
pub mod linear;
pub mod rays;
pub mod scan;

pub use self::stats::*;
pub use self::volume::{InteractionBox, GeometricFactorEstimate};
pub use self::polarization::*;
pub use self::rays::{Ray, RaySettings, RaySampler, RAY_COLUMNS};

use self::linear::LinearCompton;

/// Read-only view of a collision, handed to cross-section models.
#[derive(Copy, Clone, Debug)]
pub struct Interaction<'a> {
    pub bunch: &'a ElectronBunch,
    pub laser: &'a LaserPulse,
    /// Total photon flux (photons/s) for perfectly overlapping beams
    pub total_flux: f64,
    /// Fraction of the total flux realized by the actual overlap
    pub geometric_factor: f64,
}

impl<'a> Interaction<'a> {
    /// The polarization basis for photons travelling along `n`.
    pub fn photon_frame(&self, n: Vec3) -> PhotonFrame {
        let (ex, ey) = self.bunch.transverse_axes();
        PhotonFrame::new(n, self.bunch.direction(), ex, ey)
    }
}

/// Differential cross section of the scattering process, as seen by an
/// observer looking back along `n` at an electron moving along `v`.
///
/// All densities are per unit solid angle (and, where an energy `e` is
/// supplied, per joule) and already include the total flux and the
/// geometric factor. Implementations need not guard against non-finite
/// output; `ThomsonSource` replaces it by zero.
pub trait CrossSection: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Photons per second emitted by perfectly overlapping beams.
    fn total_flux(&self, bunch: &ElectronBunch, laser: &LaserPulse) -> f64;

    /// Energy of the photon scattered into `n`.
    fn energy(&self, ctx: &Interaction, n: Vec3, v: Vec3) -> f64;

    /// Angular flux density, integrated over energy.
    fn flux(&self, ctx: &Interaction, n: Vec3, v: Vec3) -> f64;

    /// Spectral angular flux density at energy `e`, for an electron
    /// velocity exactly along `v`.
    fn flux_no_spread(&self, ctx: &Interaction, n: Vec3, v: Vec3, e: f64) -> f64;

    /// As `flux_no_spread`, resolved into Stokes parameters with
    /// respect to the photon frame of `n`.
    fn polarization_no_spread(&self, ctx: &Interaction, n: Vec3, v: Vec3, e: f64) -> StokesVector;
}

/// A Thomson source: electron bunch, laser pulse and the numerical
/// machinery needed to turn their collision into photon densities.
///
/// The total flux and geometric factor are cached. They are *not*
/// updated automatically when the beams change: call
/// `calculate_total_flux` and `calculate_geometric_factor` after
/// modifying either beam.
///
/// Cloning a source copies both beams, the caches and the diagnostic
/// counters; the worker pool and the cross-section model are shared.
#[derive(Clone, Debug)]
pub struct ThomsonSource {
    bunch: ElectronBunch,
    laser: LaserPulse,
    model: Arc<dyn CrossSection>,
    total_flux: f64,
    geometric_factor: f64,
    precision: f64,
    max_evaluations: usize,
    threads: usize,
    pool: Arc<ThreadPool>,
    seed: u64,
    fixed_polarization: Option<[f64; 3]>,
    samples: usize,
    box_range: f64,
    spread_cutoff: f64,
    diagnostics: Diagnostics,
}

impl ThomsonSource {
    /// Creates a source in the linear regime, running on as many
    /// threads as rayon would use by default.
    ///
    /// The total flux is computed immediately, and the geometric
    /// factor is initialized to its closed-form approximation.
    pub fn new(bunch: ElectronBunch, laser: LaserPulse) -> Result<Self, SourceError> {
        let threads = rayon::current_num_threads();
        let pool = ThreadPoolBuilder::new().num_threads(threads).build()?;
        let mut source = ThomsonSource {
            bunch,
            laser,
            model: Arc::new(LinearCompton::new()),
            total_flux: 0.0,
            geometric_factor: 1.0,
            precision: 1.0e-4,
            max_evaluations: 1 << 15,
            threads,
            pool: Arc::new(pool),
            seed: 0,
            fixed_polarization: None,
            samples: 1_000_000,
            box_range: 3.0,
            spread_cutoff: 5.0,
            diagnostics: Diagnostics::new(),
        };
        source.calculate_total_flux();
        source.geometric_factor = source.approximate_geometric_factor();
        Ok(source)
    }

    /// Replaces the cross-section model. Caches are recomputed with
    /// the new model's normalization on the next explicit request.
    pub fn with_model(mut self, model: Arc<dyn CrossSection>) -> Self {
        self.model = model;
        self
    }

    /// Sets the number of worker threads, starting a new pool.
    pub fn with_threads(mut self, threads: usize) -> Result<Self, SourceError> {
        let threads = threads.max(1);
        let pool = ThreadPoolBuilder::new().num_threads(threads).build()?;
        self.threads = threads;
        self.pool = Arc::new(pool);
        Ok(self)
    }

    /// Sets the relative precision of all adaptive integrals.
    pub fn with_precision(mut self, precision: f64) -> Self {
        self.precision = precision.abs();
        self
    }

    pub fn with_max_evaluations(mut self, max_evaluations: usize) -> Self {
        self.max_evaluations = max_evaluations;
        self
    }

    /// Seeds the random streams of the Monte Carlo routines.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Uses the given normalized Stokes parameters for every sampled ray,
    /// instead of those predicted by the model.
    pub fn with_fixed_polarization(mut self, xi: Option<[f64; 3]>) -> Self {
        self.fixed_polarization = xi.map(clamp_to_unit_ball);
        self
    }

    /// Sets the number of points used to estimate the geometric factor.
    pub fn with_samples(mut self, samples: usize) -> Self {
        self.samples = samples.max(1);
        self
    }

    /// Sets the size of the sampling box, in multiples of the beam widths.
    pub fn with_box_range(mut self, range: f64) -> Self {
        self.box_range = range.abs();
        self
    }

    /// Sets the largest electron deviation angle considered in
    /// spread averages, in multiples of the rms angular spread.
    pub fn with_spread_cutoff(mut self, cutoff: f64) -> Self {
        self.spread_cutoff = cutoff.abs();
        self
    }

    pub fn bunch(&self) -> &ElectronBunch {
        &self.bunch
    }

    pub fn laser(&self) -> &LaserPulse {
        &self.laser
    }

    /// Replaces the electron bunch, leaving the cached values untouched.
    pub fn set_bunch(&mut self, bunch: ElectronBunch) {
        self.bunch = bunch;
    }

    /// Replaces the laser pulse, leaving the cached values untouched.
    pub fn set_laser(&mut self, laser: LaserPulse) {
        self.laser = laser;
    }

    pub fn model(&self) -> &dyn CrossSection {
        self.model.as_ref()
    }

    pub fn precision(&self) -> f64 {
        self.precision
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn fixed_polarization(&self) -> Option<[f64; 3]> {
        self.fixed_polarization
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn box_range(&self) -> f64 {
        self.box_range
    }

    pub fn spread_cutoff(&self) -> f64 {
        self.spread_cutoff
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn pool(&self) -> &ThreadPool {
        &self.pool
    }

    /// Total photon flux (photons/s) for perfectly overlapping beams.
    pub fn total_flux(&self) -> f64 {
        self.total_flux
    }

    pub fn geometric_factor(&self) -> f64 {
        self.geometric_factor
    }

    /// Photon flux (photons/s) from the actual overlap of the beams.
    pub fn full_flux(&self) -> f64 {
        self.total_flux * self.geometric_factor
    }

    /// Recomputes the cached total flux from the current beams.
    pub fn calculate_total_flux(&mut self) -> f64 {
        let flux = self.model.total_flux(&self.bunch, &self.laser);
        self.total_flux = if flux.is_finite() {
            flux
        } else {
            self.diagnostics.note_nan();
            0.0
        };
        self.total_flux
    }

    /// Overrides the cached geometric factor, e.g. with a value from
    /// an earlier run or from `approximate_geometric_factor`.
    pub fn set_geometric_factor(&mut self, geometric_factor: f64) {
        self.geometric_factor = geometric_factor;
    }

    pub fn interaction(&self) -> Interaction {
        Interaction {
            bunch: &self.bunch,
            laser: &self.laser,
            total_flux: self.total_flux,
            geometric_factor: self.geometric_factor,
        }
    }

    pub fn photon_frame(&self, n: Vec3) -> PhotonFrame {
        self.interaction().photon_frame(n)
    }

    fn finite_or_zero(&self, x: f64) -> f64 {
        if x.is_finite() {
            x
        } else {
            self.diagnostics.note_nan();
            0.0
        }
    }

    /// Energy (J) of the photon scattered into `n` by an electron moving along `v`.
    pub fn energy(&self, n: Vec3, v: Vec3) -> f64 {
        self.finite_or_zero(self.model.energy(&self.interaction(), n, v))
    }

    /// Angular flux density (photons/s/sr).
    pub fn flux(&self, n: Vec3, v: Vec3) -> f64 {
        self.finite_or_zero(self.model.flux(&self.interaction(), n, v))
    }

    /// Spectral angular flux density (photons/s/sr/J) at energy `e`.
    pub fn flux_no_spread(&self, n: Vec3, v: Vec3, e: f64) -> f64 {
        self.finite_or_zero(self.model.flux_no_spread(&self.interaction(), n, v, e))
    }

    /// Spectral angular flux density at energy `e`, resolved into Stokes parameters.
    pub fn polarization_no_spread(&self, n: Vec3, v: Vec3, e: f64) -> StokesVector {
        let sv = self.model.polarization_no_spread(&self.interaction(), n, v, e);
        if sv.is_finite() {
            sv
        } else {
            self.diagnostics.note_nan();
            sv.finite_or_zero()
        }
    }

    /// Degree of polarization of photons with energy `e` scattered into `n`.
    pub fn polarization_degree(&self, n: Vec3, v: Vec3, e: f64) -> f64 {
        self.polarization_no_spread(n, v, e).dop()
    }

    /// A fresh integrator with the source's precision and budget.
    pub(crate) fn integrator<'a>(&self, token: &'a CancellationToken) -> Romberg<'a> {
        Romberg::new(self.precision)
            .max_evaluations(self.max_evaluations)
            .cancellable(token)
    }

    /// Unwraps the result of a nested integral: non-convergence
    /// becomes a (counted) zero, cancellation is passed outwards.
    pub(crate) fn settle_inner(&self, result: Result<IntegrationResult, IntegrationError>) -> Result<f64, IntegrationError> {
        match result {
            Ok(r) => Ok(self.finite_or_zero(r.value)),
            Err(IntegrationError::NotConverged {evaluations, estimate}) => {
                self.diagnostics.note_nonconvergence(evaluations, estimate);
                Ok(0.0)
            },
            Err(IntegrationError::Cancelled) => Err(IntegrationError::Cancelled),
        }
    }

    /// As `settle_inner`, for an outermost integral.
    pub(crate) fn settle(&self, result: Result<IntegrationResult, IntegrationError>) -> Result<f64, SourceError> {
        self.settle_inner(result).map_err(|_| SourceError::Cancelled)
    }
}
