//! # phyloscore
//!
//! Prior and posterior probability distributions over the number of
//! nucleotide substitutions on a phylogenetic tree — per alignment site,
//! per alignment, and per annotated feature — with the p-values and
//! confidence intervals used to score conserved and accelerated regions.
//!
//! This crate is a **façade** that re-exports all public items from the
//! underlying workspace crates. Application code should depend on this
//! crate rather than the individual `phy-*` crates.
//!
//! ## Quick start
//!
//! ```rust
//! use phyloscore::model::{JumpProcess, SubstModel, TreeBuilder};
//!
//! let mut b = TreeBuilder::new();
//! let h = b.leaf("human");
//! let c = b.leaf("chimp");
//! let root = b.join(h, c, 0.1, 0.1);
//! let model = SubstModel::jukes_cantor(b.build(root).unwrap()).unwrap();
//! let jp = JumpProcess::build(&model).unwrap();
//! assert!(jp.lambda() > 0.0);
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Core types, aliases, and error definitions.
pub use phy_core as core;

/// Numeric primitives and discrete distribution algebra.
pub use phy_math as math;

/// Substitution models, trees, alignments, and the jump process.
pub use phy_model as model;

/// The tree DP, feature p-values, and the entropy tool.
pub use phy_engine as engine;
