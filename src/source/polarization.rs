//! Random realizations of a partially polarized state

use std::f64::consts;

use num::complex::Complex;
use rand::prelude::*;
use rand_distr::Uniform;

use crate::geometry::*;

/// Closer than this to the south pole of the Poincare sphere
/// (s_1 = -1), the alternative Jones vector is used.
const POLE_TOLERANCE: f64 = 1.0e-9;

/// The complex field amplitudes along two orthogonal basis vectors.
pub type JonesVector = [Complex<f64>; 2];

/// The pure state with unit Stokes vector `s`, as a Jones vector.
fn pure_state(s: [f64; 3]) -> JonesVector {
    if 1.0 + s[0] > POLE_TOLERANCE {
        let norm = (2.0 * (1.0 + s[0])).sqrt();
        [Complex::new(1.0 + s[0], 0.0) / norm, Complex::new(s[1], s[2]) / norm]
    } else {
        let norm = (2.0 * (1.0 - s[0])).sqrt();
        [Complex::new(s[1], -s[2]) / norm, Complex::new(1.0 - s[0], 0.0) / norm]
    }
}

/// Draws one coherent realization of the polarization state with
/// normalized Stokes parameters `xi`.
///
/// The state is decomposed into a pure part, of weight (1 + P)/2 along
/// the unit Stokes vector s = xi/P, and the orthogonal pure state, of
/// weight (1 - P)/2. Each part gets an independent random phase, so
/// that a single ray is fully polarized but the ensemble average of the
/// Stokes parameters is `xi`. A vector with |xi| > 1 is rescaled to
/// unit length; |xi| = 0 is unpolarized.
pub fn synthesize<R: Rng>(xi: [f64; 3], rng: &mut R) -> JonesVector {
    let xi = clamp_to_unit_ball(xi);
    let p = xi[0].hypot(xi[1]).hypot(xi[2]);
    let s = if p > 0.0 {
        [xi[0] / p, xi[1] / p, xi[2] / p]
    } else {
        [1.0, 0.0, 0.0]
    };

    let u = pure_state(s);
    let u_perp = [-u[1].conj(), u[0].conj()];

    let phase = Uniform::new(0.0, 2.0 * consts::PI);
    let w1 = Complex::from_polar(&(0.5 * (1.0 + p)).sqrt(), &rng.sample(phase));
    let w2 = Complex::from_polar(&(0.5 * (1.0 - p)).max(0.0).sqrt(), &rng.sample(phase));

    [w1 * u[0] + w2 * u_perp[0], w1 * u[1] + w2 * u_perp[1]]
}

/// Stokes parameters of a fully coherent field with amplitudes `a`.
pub fn stokes_of(a: &JonesVector) -> StokesVector {
    let (i1, i2) = (a[0].norm_sqr(), a[1].norm_sqr());
    let cross = a[0].conj() * a[1];
    StokesVector::new(i1 + i2, i1 - i2, 2.0 * cross.re, 2.0 * cross.im)
}

#[cfg(test)]
mod tests {
    use rand_xoshiro::Xoshiro256StarStar;
    use super::*;

    #[test]
    fn ensemble_average() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(0);
        let states = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [-1.0, 0.0, 0.0],
            [-0.5, 0.0, 0.0],
            [0.3, -0.4, 0.5],
            [0.0, 0.0, -1.0],
            [0.0, 0.7, 0.0],
        ];
        let n = 100_000;
        for xi in states.iter() {
            let mut sum = StokesVector::zero();
            for _ in 0..n {
                let a = synthesize(*xi, &mut rng);
                let sv = stokes_of(&a);
                assert!((sv[0] - 1.0).abs() < 1.0e-12);
                sum = sum + sv;
            }
            let mean = sum / (n as f64);
            println!("xi = {:?}, ensemble = {:?}", xi, mean);
            for k in 0..3 {
                assert!((mean[k+1] - xi[k]).abs() < 0.015);
            }
        }
    }

    #[test]
    fn pure_states_are_exact() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(1);
        let s = 1.0 / 3.0f64.sqrt();
        for xi in [[1.0, 0.0, 0.0], [-1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [s, s, -s]].iter() {
            let sv = stokes_of(&synthesize(*xi, &mut rng));
            println!("xi = {:?}, single draw = {:?}", xi, sv);
            for k in 0..3 {
                assert!((sv[k+1] - xi[k]).abs() < 1.0e-12);
            }
        }
    }

    #[test]
    fn oversized_vector_is_clamped() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(2);
        let sv = stokes_of(&synthesize([0.0, 3.0, 4.0], &mut rng));
        assert!((sv[2] - 0.6).abs() < 1.0e-12);
        assert!((sv[3] - 0.8).abs() < 1.0e-12);
    }

    #[test]
    fn orthogonal_states() {
        let u = pure_state([0.3, -0.4, (1.0f64 - 0.25).sqrt()]);
        let u_perp = [-u[1].conj(), u[0].conj()];
        let overlap = u[0].conj() * u_perp[0] + u[1].conj() * u_perp[1];
        assert!(overlap.norm() < 1.0e-15);
        let sv = stokes_of(&u_perp);
        assert!((sv[1] + 0.3).abs() < 1.0e-12);
    }
}
