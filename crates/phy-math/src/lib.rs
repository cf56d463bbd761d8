//! # phy-math
//!
//! Dense numeric primitives and discrete distribution algebra for
//! phyloscore: real-valued vectors and matrices, probability vectors and
//! matrices over contiguous integer support, truncated Poisson vectors,
//! and a clamped Newton solver.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod comparison;
pub mod matrix;
pub mod poisson;
pub mod prob;
pub mod solvers1d;
pub mod vector;

pub use matrix::Matrix;
pub use poisson::poisson_probs;
pub use prob::{matrix::ProbMatrix, vector::ProbVector, Tail, SUM_TOL, TRIM_EPS};
pub use vector::Vector;
