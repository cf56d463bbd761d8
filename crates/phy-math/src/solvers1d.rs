//! 1D root-finding.
//!
//! A single solver is needed here: a Newton iteration whose iterates are
//! clamped to a closed interval and whose convergence criterion is the
//! step size, matching the expected-length inversion it serves.

use phy_core::{ensure, Error, Real, Result};

/// Newton-Raphson iteration with per-step clamping to `[lo, hi]`.
///
/// `f_df` returns `(f(x), f'(x))`. The iteration converges when the clamped
/// step satisfies `|Δx| < step_tol` and fails with
/// [`Error::NonConvergence`] after `max_iter` steps. The initial guess is
/// used as given; every subsequent iterate is clamped.
pub fn newton_clamped<F>(
    f_df: F,
    x0: Real,
    lo: Real,
    hi: Real,
    step_tol: Real,
    max_iter: u32,
    what: &str,
) -> Result<Real>
where
    F: Fn(Real) -> (Real, Real),
{
    ensure!(lo < hi, Config, "invalid bracket [{lo}, {hi}]");
    ensure!(step_tol > 0.0, Config, "step tolerance must be positive, got {step_tol}");

    let mut x = x0;
    for _ in 0..max_iter {
        let (fx, dfx) = f_df(x);
        ensure!(
            fx.is_finite() && dfx.is_finite(),
            Numerics,
            "{what}: non-finite objective at x = {x}"
        );
        ensure!(
            dfx.abs() > f64::EPSILON,
            Numerics,
            "{what}: derivative vanished at x = {x}"
        );
        let x_new = (x - fx / dfx).clamp(lo, hi);
        let dx = x_new - x;
        x = x_new;
        if dx.abs() < step_tol {
            return Ok(x);
        }
    }
    Err(Error::NonConvergence {
        what: what.into(),
        iterations: max_iter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newton_sqrt2() {
        let root = newton_clamped(
            |x| (x * x - 2.0, 2.0 * x),
            1.5,
            0.0,
            2.0,
            1e-12,
            50,
            "sqrt",
        )
        .unwrap();
        assert!((root - 2.0_f64.sqrt()).abs() < 1e-10, "got {root}");
    }

    #[test]
    fn clamping_keeps_iterates_in_bounds() {
        // The unclamped first step from 0.1 overshoots far past 1.
        let root = newton_clamped(
            |x| ((x - 0.9) * (x - 0.9) * (x - 0.9), 3.0 * (x - 0.9) * (x - 0.9)),
            0.1,
            0.0,
            1.0,
            1e-6,
            100,
            "cubic",
        )
        .unwrap();
        assert!((0.0..=1.0).contains(&root));
        assert!((root - 0.9).abs() < 1e-2, "got {root}");
    }

    #[test]
    fn non_convergence_is_reported() {
        // A flat, discontinuous objective makes the clamped step bounce
        // between the two interval endpoints forever.
        let f = |x: f64| if x < 0.5 { (-1.0, 1e-3) } else { (1.0, 1e-3) };
        let err = newton_clamped(f, 0.25, 0.0, 1.0, 1e-12, 5, "bouncing").unwrap_err();
        match err {
            Error::NonConvergence { iterations, .. } => assert_eq!(iterations, 5),
            other => panic!("expected NonConvergence, got {other:?}"),
        }
    }
}
