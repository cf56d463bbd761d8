//! Error types for phyloscore.
//!
//! Every failure in the engine is fatal: the first error is surfaced to the
//! caller and computation stops. The variants follow the failure kinds of
//! the engine — bad configuration, numerical breakdown, exhausted
//! precomputed tables, degenerate conditioning, and solver non-convergence.
//! Solver non-convergence is a structured variant so callers can tell it
//! apart from a numeric failure.

use thiserror::Error;

/// The top-level error type used throughout phyloscore.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// Invalid model, tree, or alignment configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Numerical breakdown (probability mass checks, non-finite values).
    #[error("numerical error: {0}")]
    Numerics(String),

    /// A precomputed table is too small for the requested computation.
    #[error("resource limit exceeded: {0}")]
    Resource(String),

    /// Conditioning on an event of probability zero.
    #[error("degenerate conditioning: {0}")]
    Degeneracy(String),

    /// An iterative solver failed to converge.
    #[error("{what}: no convergence after {iterations} iterations")]
    NonConvergence {
        /// Description of the quantity being solved for.
        what: String,
        /// Number of iterations performed before giving up.
        iterations: u32,
    },
}

/// Shorthand `Result` type used throughout phyloscore.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Check a precondition, returning an error of the given kind otherwise.
///
/// # Example
/// ```
/// use phy_core::{ensure, errors::Error};
/// fn positive(x: f64) -> phy_core::errors::Result<f64> {
///     ensure!(x > 0.0, Config, "x must be positive, got {x}");
///     Ok(x)
/// }
/// assert!(positive(1.0).is_ok());
/// assert!(positive(-1.0).is_err());
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $kind:ident, $($msg:tt)*) => {
        if !$cond {
            return Err($crate::errors::Error::$kind(format!($($msg)*)));
        }
    };
}

/// Fail immediately with an error of the given kind.
///
/// # Example
/// ```
/// use phy_core::{fail, errors::Error};
/// fn always_err() -> phy_core::errors::Result<()> {
///     fail!(Numerics, "something went wrong");
/// }
/// assert!(always_err().is_err());
/// ```
#[macro_export]
macro_rules! fail {
    ($kind:ident, $($msg:tt)*) => {
        return Err($crate::errors::Error::$kind(format!($($msg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn needs_square(n: usize, m: usize) -> Result<()> {
        crate::ensure!(n == m, Config, "matrix must be square, got {n}x{m}");
        Ok(())
    }

    #[test]
    fn ensure_passes_and_fails() {
        assert!(needs_square(4, 4).is_ok());
        let err = needs_square(4, 3).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("4x3"));
    }

    #[test]
    fn non_convergence_is_distinguishable() {
        let err = Error::NonConvergence {
            what: "expected length inversion".into(),
            iterations: 30,
        };
        assert!(!matches!(err, Error::Numerics(_)));
        assert_eq!(
            err.to_string(),
            "expected length inversion: no convergence after 30 iterations"
        );
    }
}
