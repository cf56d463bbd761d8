//! # phy-engine
//!
//! The computational layer of phyloscore: per-site scalar and bivariate
//! substitution-count distributions from a postorder tree dynamic
//! program, prior/posterior statistics and p-values over annotated
//! features, and the relative-entropy tool for tuning expected
//! conserved-element lengths.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod binding;
pub mod entropy;
pub mod features;
pub mod posterior;
pub mod prior;

pub use binding::ModelBinding;
pub use entropy::{
    expected_lengths, invert_expected_length, relative_entropy, ColumnLikelihood,
    EntropyResult, LengthEstimates,
};
pub use features::{
    feature_joint_stats, feature_scalar_stats, Feature, JointFeatureStats,
    ScalarFeatureStats, SideStats,
};
pub use posterior::{tuple_posterior, tuple_posterior_joint};
pub use prior::{
    alignment_posterior, alignment_posterior_joint, alignment_prior,
    alignment_prior_joint, site_prior, site_prior_joint,
};
