//! # phy-model
//!
//! The modeling layer of phyloscore: substitution alphabets, rooted binary
//! phylogenetic trees, in-memory alignments with sufficient statistics,
//! continuous-time substitution models, and the uniformized jump process
//! with its per-branch conditional distributions.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod alphabet;
pub mod branch;
pub mod jump;
pub mod model;
pub mod msa;
pub mod simulate;
pub mod tree;

pub use alphabet::{Alphabet, CharClass};
pub use branch::BranchDistrib;
pub use jump::JumpProcess;
pub use model::SubstModel;
pub use msa::Msa;
pub use simulate::simulate_columns;
pub use tree::{Tree, TreeBuilder};
