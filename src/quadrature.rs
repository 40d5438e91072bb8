//! Adaptive one-dimensional quadrature

use thiserror::Error;

use crate::source::CancellationToken;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IntegrationResult {
    pub value: f64,
    pub abserr: f64,
    pub evaluations: usize,
}

#[derive(Error, Copy, Clone, Debug, PartialEq)]
pub enum IntegrationError {
    #[error("no convergence after {evaluations} evaluations (last estimate {estimate:e})")]
    NotConverged {
        evaluations: usize,
        estimate: f64,
    },
    #[error("integration cancelled")]
    Cancelled,
}

/// Romberg integration: the trapezium rule on successively halved
/// grids, accelerated by Richardson extrapolation.
///
/// An integrator is a cheap value and holds no state between calls,
/// so nested or concurrent integrals simply build their own:
/// ```
/// # use tsource::quadrature::Romberg;
/// let result = Romberg::new(1.0e-8).integrate(|x| Ok(x * x), 0.0, 1.0).unwrap();
/// assert!((result.value - 1.0 / 3.0).abs() < 1.0e-8);
/// ```
#[derive(Copy, Clone, Debug)]
pub struct Romberg<'a> {
    epsabs: f64,
    epsrel: f64,
    max_evaluations: usize,
    min_levels: usize,
    cancel: Option<&'a CancellationToken>,
}

impl<'a> Romberg<'a> {
    /// Builds an integrator that stops when successive
    /// extrapolations agree to relative precision `epsrel`.
    pub fn new(epsrel: f64) -> Self {
        Romberg {
            epsabs: 0.0,
            epsrel,
            max_evaluations: 1 << 15,
            min_levels: 4,
            cancel: None,
        }
    }

    pub fn tolerance(self, epsabs: f64, epsrel: f64) -> Self {
        Romberg {epsabs, epsrel, ..self}
    }

    /// Sets the maximum number of integrand evaluations.
    pub fn max_evaluations(self, max_evaluations: usize) -> Self {
        Romberg {max_evaluations, ..self}
    }

    /// Sets the number of halvings that are always carried out
    /// before convergence is tested, so that narrow features are
    /// not missed by a coarse grid.
    pub fn min_levels(self, min_levels: usize) -> Self {
        Romberg {min_levels: min_levels.max(1), ..self}
    }

    /// Checks `token` before every refinement.
    pub fn cancellable(self, token: &'a CancellationToken) -> Self {
        Romberg {cancel: Some(token), ..self}
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.map_or(false, |t| t.is_cancelled())
    }

    /// Integrates `f` over [a, b]. The integrand may itself fail,
    /// e.g. if it is an integral that was cancelled, in which case
    /// the error is passed through unchanged.
    pub fn integrate<F>(&self, mut f: F, a: f64, b: f64) -> Result<IntegrationResult, IntegrationError>
    where F: FnMut(f64) -> Result<f64, IntegrationError> {
        if a == b {
            return Ok(IntegrationResult {value: 0.0, abserr: 0.0, evaluations: 0});
        }

        if self.is_cancelled() {
            return Err(IntegrationError::Cancelled);
        }

        let mut h = b - a;
        let mut evaluations = 2;
        let mut prev = vec![0.5 * h * (f(a)? + f(b)?)];

        let mut k = 1;
        loop {
            if self.is_cancelled() {
                return Err(IntegrationError::Cancelled);
            }

            let new_points = 1usize << (k - 1);
            if evaluations + new_points > self.max_evaluations {
                return Err(IntegrationError::NotConverged {
                    evaluations,
                    estimate: prev[k - 1],
                });
            }

            h *= 0.5;
            let mut sum = 0.0;
            for i in 0..new_points {
                sum += f(a + ((2 * i + 1) as f64) * h)?;
            }
            evaluations += new_points;

            let mut row = Vec::with_capacity(k + 1);
            row.push(0.5 * prev[0] + h * sum);
            let mut factor = 1.0;
            for j in 1..=k {
                factor *= 4.0;
                let next = row[j-1] + (row[j-1] - prev[j-1]) / (factor - 1.0);
                row.push(next);
            }

            let value = row[k];
            let abserr = (value - prev[k-1]).abs();
            if !value.is_finite() {
                return Err(IntegrationError::NotConverged {evaluations, estimate: value});
            }

            if k >= self.min_levels && (abserr <= self.epsabs || abserr <= self.epsrel * value.abs()) {
                return Ok(IntegrationResult {value, abserr, evaluations});
            }

            prev = row;
            k += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts;
    use super::*;

    #[test]
    fn gaussian() {
        let sigma = 0.3;
        let f = |x: f64| Ok((-0.5 * (x / sigma).powi(2)).exp() / ((2.0 * consts::PI).sqrt() * sigma));
        let result = Romberg::new(1.0e-10).integrate(f, -3.0, 3.0).unwrap();
        println!("integral = {:.12e} [{} evaluations], target = 1", result.value, result.evaluations);
        assert!((result.value - 1.0).abs() < 1.0e-9);
    }

    #[test]
    fn periodic() {
        // integral of 1/(2 - cos x) over a period is 2 pi / sqrt(3)
        let f = |x: f64| Ok(1.0 / (2.0 - x.cos()));
        let result = Romberg::new(1.0e-12).integrate(f, 0.0, 2.0 * consts::PI).unwrap();
        let target = 2.0 * consts::PI / 3.0f64.sqrt();
        println!("integral = {:.12e}, target = {:.12e}", result.value, target);
        assert!(((result.value - target) / target).abs() < 1.0e-10);
    }

    #[test]
    fn absolute_tolerance() {
        // vanishing integral: only the absolute criterion can be met
        let f = |x: f64| Ok(x.sin() * (-x * x).exp() * x.cos().powi(2));
        let result = Romberg::new(1.0e-12)
            .tolerance(1.0e-10, 0.0)
            .integrate(f, -2.0, 2.0)
            .unwrap();
        println!("integral = {:.3e} [{} evaluations]", result.value, result.evaluations);
        assert!(result.value.abs() < 1.0e-10);
        assert!(result.abserr <= 1.0e-10);
    }

    #[test]
    fn budget_is_respected() {
        let f = |x: f64| Ok((1.0 / x).sin());
        let result = Romberg::new(1.0e-12).max_evaluations(65).integrate(f, 1.0e-6, 1.0);
        println!("{:?}", result);
        match result {
            Err(IntegrationError::NotConverged {evaluations, ..}) => assert!(evaluations <= 65),
            _ => panic!("expected non-convergence"),
        }
    }

    #[test]
    fn cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let result = Romberg::new(1.0e-6).cancellable(&token).integrate(|x| Ok(x), 0.0, 1.0);
        assert_eq!(result, Err(IntegrationError::Cancelled));
    }

    #[test]
    fn nested() {
        // integral of x y over the unit square
        let outer = Romberg::new(1.0e-10);
        let result = outer.integrate(|x| {
            let inner = Romberg::new(1.0e-10).integrate(|y| Ok(x * y), 0.0, 1.0)?;
            Ok(inner.value)
        }, 0.0, 1.0).unwrap();
        println!("integral = {:.12e}", result.value);
        assert!((result.value - 0.25).abs() < 1.0e-10);
    }
}
