//! Shared accumulators, diagnostic counters and cancellation

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::SourceError;

/// Cooperative cancellation flag, shared between the caller and
/// any number of workers. Long-running operations poll it and
/// return `SourceError::Cancelled` once it is set.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> Result<(), SourceError> {
        if self.is_cancelled() {
            Err(SourceError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A floating-point sum that can be added to from many threads.
#[derive(Debug, Default)]
pub struct AtomicSum(AtomicU64);

impl AtomicSum {
    pub fn new() -> Self {
        AtomicSum(AtomicU64::new(0f64.to_bits()))
    }

    pub fn add(&self, x: f64) {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + x).to_bits();
            match self.0.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn reset(&self) {
        self.0.store(0f64.to_bits(), Ordering::Release);
    }
}

impl Clone for AtomicSum {
    fn clone(&self) -> Self {
        AtomicSum(AtomicU64::new(self.0.load(Ordering::Acquire)))
    }
}

/// Counts of numerical events that were absorbed rather than
/// reported as errors.
#[derive(Debug, Default)]
pub struct Diagnostics {
    nonconverged: AtomicU64,
    nan: AtomicU64,
    envelope: AtomicU64,
}

/// A snapshot of `Diagnostics`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DiagnosticCounts {
    /// Integrals that exhausted their evaluation budget and were replaced by zero
    pub nonconverged_integrals: u64,
    /// Non-finite densities replaced by zero
    pub nan_substitutions: u64,
    /// Sampler proposals whose density exceeded the envelope
    pub envelope_violations: u64,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note_nonconvergence(&self, evaluations: usize, estimate: f64) {
        if self.nonconverged.fetch_add(1, Ordering::Relaxed) == 0 {
            log::debug!("integral did not converge after {} evaluations (last estimate {:e}), using zero", evaluations, estimate);
        }
    }

    pub fn note_nan(&self) {
        if self.nan.fetch_add(1, Ordering::Relaxed) == 0 {
            log::debug!("non-finite density replaced by zero");
        }
    }

    pub fn note_envelope_violation(&self, ratio: f64) {
        if self.envelope.fetch_add(1, Ordering::Relaxed) == 0 {
            log::debug!("proposal density exceeds envelope by factor {:.3}", ratio);
        }
    }

    pub fn counts(&self) -> DiagnosticCounts {
        DiagnosticCounts {
            nonconverged_integrals: self.nonconverged.load(Ordering::Relaxed),
            nan_substitutions: self.nan.load(Ordering::Relaxed),
            envelope_violations: self.envelope.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.nonconverged.store(0, Ordering::Relaxed);
        self.nan.store(0, Ordering::Relaxed);
        self.envelope.store(0, Ordering::Relaxed);
    }
}

impl Clone for Diagnostics {
    fn clone(&self) -> Self {
        let c = self.counts();
        Diagnostics {
            nonconverged: AtomicU64::new(c.nonconverged_integrals),
            nan: AtomicU64::new(c.nan_substitutions),
            envelope: AtomicU64::new(c.envelope_violations),
        }
    }
}

impl DiagnosticCounts {
    pub fn is_clean(&self) -> bool {
        *self == DiagnosticCounts::default()
    }
}

impl fmt::Display for DiagnosticCounts {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} non-convergent integrals, {} NaN substitutions, {} envelope violations",
            self.nonconverged_integrals, self.nan_substitutions, self.envelope_violations)
    }
}

/// Running totals of a ray-generation run.
///
/// The sampler adds to these on every proposal, accepted or not,
/// so that they estimate integrals over the sampled phase space.
#[derive(Debug, Default)]
pub struct RayStatistics {
    accepted: AtomicUsize,
    attempted: AtomicU64,
    partial_flux: AtomicSum,
    density: AtomicSum,
    volume: AtomicSum,
}

impl RayStatistics {
    pub fn new() -> Self {
        RayStatistics {
            accepted: AtomicUsize::new(0),
            attempted: AtomicU64::new(0),
            partial_flux: AtomicSum::new(),
            density: AtomicSum::new(),
            volume: AtomicSum::new(),
        }
    }

    pub fn reset(&self) {
        self.accepted.store(0, Ordering::Release);
        self.attempted.store(0, Ordering::Release);
        self.partial_flux.reset();
        self.density.reset();
        self.volume.reset();
    }

    /// Records the phase-space volume that proposals are drawn from.
    pub(crate) fn set_volume(&self, volume: f64) {
        self.volume.reset();
        self.volume.add(volume);
    }

    /// Records one proposal with density `prob` at photon energy `energy`.
    pub(crate) fn record(&self, prob: f64, energy: f64) {
        self.attempted.fetch_add(1, Ordering::Relaxed);
        if prob.is_finite() && energy > 0.0 {
            self.partial_flux.add(prob / energy);
            self.density.add(prob);
        }
    }

    /// Claims the next free slot of a batch of `limit` rays,
    /// returning its index, or None if the batch is complete.
    pub(crate) fn claim(&self, limit: usize) -> Option<usize> {
        let mut current = self.accepted.load(Ordering::Acquire);
        loop {
            if current >= limit {
                return None;
            }
            match self.accepted.compare_exchange_weak(current, current + 1, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return Some(current),
                Err(actual) => current = actual,
            }
        }
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::Acquire)
    }

    pub fn attempted(&self) -> u64 {
        self.attempted.load(Ordering::Acquire)
    }

    /// Fraction of proposals that were accepted; zero before any attempt.
    pub fn acceptance_ratio(&self) -> f64 {
        let attempted = self.attempted();
        if attempted == 0 {
            0.0
        } else {
            (self.accepted() as f64) / (attempted as f64)
        }
    }

    /// Mean of density / energy over all proposals: proportional
    /// to the emitted power within the sampled window.
    pub fn partial_flux(&self) -> f64 {
        let attempted = self.attempted();
        if attempted == 0 {
            0.0
        } else {
            self.partial_flux.get() / (attempted as f64)
        }
    }

    /// Monte Carlo estimate of the photon flux (photons/s) inside the
    /// sampled window of positions, directions and energies.
    pub fn flux_estimate(&self) -> f64 {
        let attempted = self.attempted();
        if attempted == 0 {
            0.0
        } else {
            self.volume.get() * self.density.get() / (attempted as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use rayon::prelude::*;
    use super::*;

    #[test]
    fn concurrent_sum() {
        let sum = AtomicSum::new();
        (0..10_000).into_par_iter().for_each(|i| sum.add(i as f64));
        let target = 0.5 * 9999.0 * 10000.0;
        println!("sum = {}, target = {}", sum.get(), target);
        assert_eq!(sum.get(), target);
    }

    #[test]
    fn claims_never_exceed_limit() {
        let stats = RayStatistics::new();
        let claimed: Vec<usize> = (0..1000).into_par_iter().filter_map(|_| stats.claim(100)).collect();
        let mut claimed = claimed;
        claimed.sort();
        assert_eq!(claimed, (0..100).collect::<Vec<usize>>());
        assert_eq!(stats.accepted(), 100);
    }

    #[test]
    fn token_is_shared() {
        let token = CancellationToken::new();
        let copy = token.clone();
        assert!(copy.check().is_ok());
        token.cancel();
        assert!(copy.is_cancelled());
        assert!(matches!(copy.check(), Err(SourceError::Cancelled)));
    }

    #[test]
    fn diagnostics_clone_is_independent() {
        let diag = Diagnostics::new();
        diag.note_nan();
        let copy = diag.clone();
        diag.note_nan();
        assert_eq!(copy.counts().nan_substitutions, 1);
        assert_eq!(diag.counts().nan_substitutions, 2);
        diag.reset();
        assert!(diag.counts().is_clean());
    }
}
