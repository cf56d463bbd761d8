//! Truncated Poisson probability vectors.
//!
//! Wraps the `statrs` crate's Poisson implementation to produce the jump
//! count distribution along a branch of the uniformized chain.

use crate::prob::vector::ProbVector;
use phy_core::{ensure, Real, Result};
use statrs::distribution::{Discrete, Poisson};

/// Build the pmf vector of a Poisson distribution with the given mean,
/// truncated at `mean + 6·√mean` (and at least 2 terms).
///
/// The returned vector's `len()` is the caller-visible truncation point.
/// A zero mean concentrates all mass at 0. The truncated tail is restored
/// by normalization.
pub fn poisson_probs(mean: Real) -> Result<ProbVector> {
    ensure!(
        mean.is_finite() && mean >= 0.0,
        Config,
        "Poisson mean must be finite and non-negative, got {mean}"
    );
    if mean == 0.0 {
        return Ok(ProbVector::point_mass(0));
    }
    let dist = Poisson::new(mean).map_err(|e| {
        phy_core::Error::Config(format!("invalid Poisson mean {mean}: {e}"))
    })?;
    let support = ((mean + 6.0 * mean.sqrt()).ceil() as usize + 1).max(2);
    let pmf: Vec<Real> = (0..support).map(|j| dist.pmf(j as u64)).collect();
    let mut p = ProbVector::from_vec(pmf);
    p.normalize()?;
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn zero_mean_is_point_mass() {
        let p = poisson_probs(0.0).unwrap();
        assert_eq!(p.len(), 1);
        assert_abs_diff_eq!(p[0], 1.0, epsilon = 1e-15);
    }

    #[test]
    fn small_mean_matches_pmf() {
        let mean = 0.5;
        let p = poisson_probs(mean).unwrap();
        // P(X=0) = e^{-1/2}; truncation and renormalization shift it only
        // beyond the trim threshold.
        assert_abs_diff_eq!(p[0], (-mean).exp(), epsilon = 1e-9);
        assert_abs_diff_eq!(p[1], mean * (-mean).exp(), epsilon = 1e-9);
    }

    #[test]
    fn mean_and_variance_match_lambda() {
        let p = poisson_probs(3.0).unwrap();
        let (mean, var) = p.stats();
        assert_abs_diff_eq!(mean, 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(var, 3.0, epsilon = 1e-4);
    }

    #[test]
    fn negative_mean_rejected() {
        assert!(poisson_probs(-1.0).is_err());
    }
}
