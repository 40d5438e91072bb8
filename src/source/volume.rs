//! Spatial overlap of the two beams

use std::f64::consts;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::prelude::*;
use rand_distr::Uniform;
use rand_xoshiro::Xoshiro256StarStar;
use rayon::prelude::*;

use crate::geometry::*;
use crate::SourceError;
use super::{ThomsonSource, CancellationToken, AtomicSum};

/// A box, aligned with the electron bunch, that contains the
/// region where the beams overlap.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct InteractionBox {
    pub centre: Vec3,
    /// Bunch x, y and longitudinal axes
    pub axes: [Vec3; 3],
    pub half_widths: [f64; 3],
}

impl InteractionBox {
    pub fn volume(&self) -> f64 {
        8.0 * self.half_widths[0] * self.half_widths[1] * self.half_widths[2]
    }

    /// A point drawn uniformly from the box.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Vec3 {
        let unit = Uniform::new_inclusive(-1.0, 1.0);
        (0..3).fold(self.centre, |r, i| {
            r + (rng.sample(unit) * self.half_widths[i]) * self.axes[i]
        })
    }

    pub fn contains(&self, r: Vec3) -> bool {
        let d = r - self.centre;
        (0..3).all(|i| (d * self.axes[i]).abs() <= self.half_widths[i])
    }
}

/// Result of a Monte Carlo estimate of the geometric factor.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GeometricFactorEstimate {
    pub value: f64,
    /// Points actually evaluated
    pub samples: usize,
    /// True if the run was cancelled before all points were evaluated
    pub truncated: bool,
}

impl ThomsonSource {
    /// 2 pi sqrt[(sx_e^2 + s_l^2)(sy_e^2 + s_l^2)], evaluated at the foci,
    /// so that head-on beams that meet at their foci and do not
    /// diffract have a geometric factor of one.
    fn overlap_normalization(&self) -> f64 {
        let sl2 = self.laser.width2(0.0);
        2.0 * consts::PI * ((self.bunch.x_width2(0.0) + sl2) * (self.bunch.y_width2(0.0) + sl2)).sqrt()
    }

    /// Density of collisions at `r`, normalized such that its
    /// integral over all space is the geometric factor.
    ///
    /// Both beams are Gaussian, with transverse widths that depend
    /// on the distance from their respective foci. The longitudinal
    /// profiles are integrated over the collision time, leaving a
    /// Gaussian in the difference of the longitudinal coordinates.
    pub fn volume_density(&self, r: Vec3) -> f64 {
        let de = self.bunch.direction();
        let (ex, ey) = self.bunch.transverse_axes();
        let dl = self.laser.direction();

        let re = r - self.bunch.shift();
        let a = re * de;
        let (x, y) = (re * ex, re * ey);
        let sx2 = self.bunch.x_width2(a);
        let sy2 = self.bunch.y_width2(a);
        let rho_e = (-0.5 * x * x / sx2 - 0.5 * y * y / sy2).exp() / (2.0 * consts::PI * (sx2 * sy2).sqrt());

        let rl = r - self.laser.shift();
        let b = rl * dl;
        let t2 = (rl.norm_sqr() - b * b).max(0.0);
        let sl2 = self.laser.width2(b);
        let rho_l = (-0.5 * t2 / sl2).exp() / (2.0 * consts::PI * sl2);

        let var = self.bunch.length().powi(2) + self.laser.length().powi(2);
        let longitudinal = (-0.5 * (b - a).powi(2) / var).exp() / (2.0 * consts::PI * var).sqrt();

        let density = self.overlap_normalization() * (1.0 - de * dl) * rho_e * rho_l * longitudinal;
        self.finite_or_zero(density)
    }

    /// The box from which collision points are sampled. It is centred
    /// midway between the two foci and extends `box_range` times the
    /// larger beam width (or length) in each direction, plus half the
    /// separation of the foci.
    ///
    /// Transverse widths are taken at the rms length of the overlap
    /// region, so that strongly focused beams are not clipped.
    pub fn interaction_box(&self) -> InteractionBox {
        let de = self.bunch.direction();
        let (ex, ey) = self.bunch.transverse_axes();
        let separation = self.laser.shift() - self.bunch.shift();
        let centre = self.bunch.shift() + 0.5 * separation;

        let le = self.bunch.length();
        let ll = self.laser.length();
        let z = 0.5 * (le * le + ll * ll).sqrt();

        let sl = self.laser.width(z);
        let wx = self.bunch.x_width(z).max(sl);
        let wy = self.bunch.y_width(z).max(sl);
        let wz = le.max(ll);

        InteractionBox {
            centre,
            axes: [ex, ey, de],
            half_widths: [
                self.box_range * wx + 0.5 * (separation * ex).abs(),
                self.box_range * wy + 0.5 * (separation * ey).abs(),
                self.box_range * wz + 0.5 * (separation * de).abs(),
            ],
        }
    }

    /// Monte Carlo estimate of the geometric factor from `samples`
    /// points, shared out over the worker pool.
    ///
    /// Each worker draws from its own random stream and polls `token`
    /// before every point. If cancelled, the estimate is built from the
    /// points evaluated so far and is flagged as truncated.
    pub fn estimate_geometric_factor(&self, samples: usize, token: &CancellationToken) -> GeometricFactorEstimate {
        let bounds = self.interaction_box();
        let sum = AtomicSum::new();
        let done = AtomicUsize::new(0);

        let nthreads = self.threads;
        let per_thread = samples / nthreads;
        let remainder = samples % nthreads;
        let rng = Xoshiro256StarStar::seed_from_u64(self.seed);

        self.pool.install(|| {
            (0..nthreads).into_par_iter().for_each(|i| {
                let mut rng = rng.clone();
                for _ in 0..i {
                    rng.jump();
                }
                let count = per_thread + if i < remainder {1} else {0};
                let mut local = 0.0;
                let mut evaluated = 0;
                for _ in 0..count {
                    if token.is_cancelled() {
                        break;
                    }
                    local += self.volume_density(bounds.sample(&mut rng));
                    evaluated += 1;
                }
                sum.add(local);
                done.fetch_add(evaluated, Ordering::Relaxed);
            });
        });

        let evaluated = done.load(Ordering::Acquire);
        let value = if evaluated > 0 {
            bounds.volume() * sum.get() / (evaluated as f64)
        } else {
            0.0
        };

        GeometricFactorEstimate {
            value,
            samples: evaluated,
            truncated: evaluated < samples,
        }
    }

    /// Recomputes the cached geometric factor by Monte Carlo integration.
    /// On cancellation the cached value is left unchanged.
    pub fn calculate_geometric_factor(&mut self, token: &CancellationToken) -> Result<f64, SourceError> {
        let estimate = self.estimate_geometric_factor(self.samples, token);
        if estimate.truncated {
            return Err(SourceError::Cancelled);
        }
        self.geometric_factor = estimate.value.min(1.0);
        log::debug!("geometric factor = {:.6} from {} samples", self.geometric_factor, estimate.samples);
        Ok(self.geometric_factor)
    }

    /// As `calculate_geometric_factor`, but a cancelled run still
    /// updates the cache with its (less accurate) partial estimate,
    /// provided at least one point was evaluated.
    pub fn calculate_geometric_factor_best_effort(&mut self, token: &CancellationToken) -> GeometricFactorEstimate {
        let estimate = self.estimate_geometric_factor(self.samples, token);
        if estimate.samples > 0 {
            self.geometric_factor = estimate.value.min(1.0);
        }
        if estimate.truncated {
            log::warn!("geometric factor estimated from {} of {} samples", estimate.samples, self.samples);
        }
        estimate
    }

    /// Closed-form geometric factor that neglects the growth of the
    /// beam widths away from the foci (the hourglass effect).
    ///
    /// Cheap enough for interactive previews, but an approximation
    /// only: it overestimates the overlap of tightly focused beams.
    pub fn approximate_geometric_factor(&self) -> f64 {
        let de = self.bunch.direction();
        let (ex, ey) = self.bunch.transverse_axes();
        let dl = self.laser.direction();
        let lx = dl.orthogonal();
        let ly = dl.cross(lx);
        let re = self.bunch.shift();
        let rl = self.laser.shift();

        let sx2 = self.bunch.x_width2(0.0);
        let sy2 = self.bunch.y_width2(0.0);
        let sl2 = self.laser.width2(0.0);
        let var = self.bunch.length().powi(2) + self.laser.length().powi(2);

        // Each Gaussian factor is exp[-(u.r - c)^2 / 2 s^2].
        let w = dl - de;
        let terms = [
            (ex, ex * re, sx2),
            (ey, ey * re, sy2),
            (lx, lx * rl, sl2),
            (ly, ly * rl, sl2),
            (w, dl * rl - de * re, var),
        ];

        let mut a = Matrix3::zero();
        let mut b = Vec3::zero();
        let mut c = 0.0;
        for &(u, c0, s2) in terms.iter() {
            a = a + (1.0 / s2) * Matrix3::outer(u, u);
            b = b + (c0 / s2) * u;
            c += c0 * c0 / s2;
        }

        let det = a.determinant();
        let centre = match a.solve(b) {
            Some(x) if det > 0.0 => x,
            _ => return 0.0,
        };

        let integral = (2.0 * consts::PI).powf(1.5) / det.sqrt() * (0.5 * (b * centre) - 0.5 * c).exp();
        let prefactor = self.overlap_normalization() * (1.0 - de * dl)
            / (2.0 * consts::PI * (sx2 * sy2).sqrt())
            / (2.0 * consts::PI * sl2)
            / (2.0 * consts::PI * var).sqrt();

        self.finite_or_zero(prefactor * integral)
    }
}

#[cfg(test)]
mod tests {
    use crate::beam::*;
    use super::*;

    fn round_beams() -> (ElectronBunch, LaserPulse) {
        // laser focal spot s_0^2 = lambda z_R / 4 pi, matched to the bunch
        let laser = LaserPulse::default()
            .with_rayleigh_length(1.0e3);
        let w2 = laser.width2(0.0);
        let beta = 1.0e3;
        let bunch = ElectronBunch::default()
            .with_beta(beta, beta)
            .with_emittance(w2 / beta, w2 / beta);
        (bunch, laser)
    }

    #[test]
    fn ideal_overlap_is_one() {
        let (bunch, laser) = round_beams();
        let source = ThomsonSource::new(bunch, laser).unwrap();
        let approx = source.approximate_geometric_factor();
        println!("approximate geometric factor = {:.6}", approx);
        assert!((approx - 1.0).abs() < 1.0e-6);
    }

    #[test]
    fn monte_carlo_converges() {
        // equal, co-located, round beams without diffraction: G = 1
        let (bunch, laser) = round_beams();
        let source = ThomsonSource::new(bunch, laser).unwrap().with_seed(7);
        let token = CancellationToken::new();

        let mut errors = vec![];
        for &n in &[1_000, 30_000, 1_000_000] {
            let estimate = source.estimate_geometric_factor(n, &token);
            println!("N = {:>8}, G = {:.6}", n, estimate.value);
            assert!(!estimate.truncated);
            assert_eq!(estimate.samples, n);
            errors.push((estimate.value - 1.0).abs());
        }

        assert!(errors[2] < 0.015);
        assert!(errors[2] < errors[0] || errors[0] < 0.01);
    }

    #[test]
    fn shifted_beams_agree_with_closed_form() {
        let (bunch, laser) = round_beams();
        let w = laser.width(0.0);
        let bunch = bunch.with_shift(Vec3::new(w, 0.0, 0.0));
        let laser = laser.with_shift(Vec3::new(0.0, -0.5 * w, 1.0e-4));
        let mut source = ThomsonSource::new(bunch, laser).unwrap().with_samples(1_000_000);
        let approx = source.approximate_geometric_factor();
        let token = CancellationToken::new();
        let mc = source.calculate_geometric_factor(&token).unwrap();
        // transverse offsets d in quadrature: exp(-d^2 / (4 w^2))
        let target = (-(1.25 * w * w) / (4.0 * w * w)).exp();
        println!("closed form = {:.6}, Monte Carlo = {:.6}, target = {:.6}", approx, mc, target);
        assert!(((approx - target) / target).abs() < 1.0e-6);
        assert!(((mc - target) / target).abs() < 0.02);
    }

    #[test]
    fn hourglass_reduces_overlap() {
        let bunch = ElectronBunch::default().with_beta(1.0e-4, 1.0e-4).with_emittance(1.0e-6, 1.0e-6);
        let laser = LaserPulse::default();
        let mut source = ThomsonSource::new(bunch, laser).unwrap().with_samples(200_000);
        let approx = source.approximate_geometric_factor();
        let mc = source.calculate_geometric_factor(&CancellationToken::new()).unwrap();
        println!("closed form = {:.4}, Monte Carlo = {:.4}", approx, mc);
        assert!(mc < approx);
        assert!(mc > 0.0);
    }

    #[test]
    fn cancellation() {
        let mut source = ThomsonSource::new(ElectronBunch::default(), LaserPulse::default()).unwrap();
        let cached = source.geometric_factor();
        let token = CancellationToken::new();
        token.cancel();

        let result = source.calculate_geometric_factor(&token);
        assert!(matches!(result, Err(SourceError::Cancelled)));
        assert_eq!(source.geometric_factor(), cached);

        let estimate = source.calculate_geometric_factor_best_effort(&token);
        println!("{:?}", estimate);
        assert!(estimate.truncated);
        assert_eq!(estimate.samples, 0);
        assert_eq!(source.geometric_factor(), cached);
    }

    #[test]
    fn cancellation_mid_run() {
        let n = 1_000_000_000;
        let mut source = ThomsonSource::new(ElectronBunch::default(), LaserPulse::default())
            .unwrap()
            .with_samples(n);
        let cached = source.geometric_factor();

        let cancel_after = |token: &CancellationToken| {
            let token = token.clone();
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(20));
                token.cancel();
            })
        };

        let token = CancellationToken::new();
        let canceller = cancel_after(&token);
        let estimate = source.estimate_geometric_factor(n, &token);
        canceller.join().unwrap();
        println!("{:?}", estimate);
        assert!(estimate.truncated);
        assert!(estimate.samples > 0 && estimate.samples < n);
        assert!(estimate.value > 0.0);

        let token = CancellationToken::new();
        let canceller = cancel_after(&token);
        let result = source.calculate_geometric_factor(&token);
        canceller.join().unwrap();
        assert!(matches!(result, Err(SourceError::Cancelled)));
        assert_eq!(source.geometric_factor(), cached);
    }

    #[test]
    fn box_contains_both_foci() {
        let bunch = ElectronBunch::default().with_shift(Vec3::new(1.0e-5, 0.0, -2.0e-4));
        let laser = LaserPulse::default().with_shift(Vec3::new(0.0, 3.0e-5, 2.0e-4));
        let source = ThomsonSource::new(bunch, laser).unwrap();
        let bounds = source.interaction_box();
        println!("{:?}", bounds);
        assert!(bounds.contains(bunch.shift()));
        assert!(bounds.contains(laser.shift()));
        let mut rng = Xoshiro256StarStar::seed_from_u64(0);
        assert!((0..1000).all(|_| bounds.contains(bounds.sample(&mut rng))));
    }
}
