//! Discrete probability distributions over contiguous integer support.
//!
//! [`vector::ProbVector`] holds a distribution over counts `0 … N−1`;
//! [`matrix::ProbMatrix`] holds a bivariate distribution over a
//! `nrows × ncols` grid. Both support normalization, moment statistics,
//! convolution, and tail trimming at a shared threshold.

pub mod matrix;
pub mod vector;

use phy_core::Real;

/// Entries below this threshold are dropped from the tail of a
/// distribution's support after normalization. Interior zeros are kept.
pub const TRIM_EPS: Real = 1e-10;

/// Tolerance for probability-sum checks.
pub const SUM_TOL: Real = 1e-4;

/// Which tail of a distribution a p-value covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tail {
    /// `P(X ≤ x)`.
    Lower,
    /// `P(X ≥ x)`.
    Upper,
}
