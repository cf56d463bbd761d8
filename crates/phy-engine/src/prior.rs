//! Prior and whole-alignment substitution-count distributions.
//!
//! The prior runs the same postorder DP as the posterior with every leaf
//! marginalized out, so it depends only on the model and tree. Alignment-
//! level distributions are convolutions of per-site results — site counts
//! are independent under an order-0 model.

use crate::binding::ModelBinding;
use crate::posterior::{
    dp_tables, joint_from_tables, scalar_from_tables, tuple_posterior, tuple_posterior_joint,
};
use phy_core::{ensure, Result, Size};
use phy_math::{ProbMatrix, ProbVector};
use phy_model::{JumpProcess, SubstModel};

/// Prior distribution of the total substitution count at a single site.
pub fn site_prior(model: &SubstModel, jp: &JumpProcess) -> Result<ProbVector> {
    let tables = dp_tables(model, jp, &|_| Ok(None))?;
    scalar_from_tables(model, &tables)
}

/// Joint prior of (left-subtree, right-subtree) counts at a single site.
pub fn site_prior_joint(model: &SubstModel, jp: &JumpProcess) -> Result<ProbMatrix> {
    let tables = dp_tables(model, jp, &|_| Ok(None))?;
    joint_from_tables(model, jp, &tables)
}

/// Prior distribution of the total substitution count over `nsites`
/// independent sites.
pub fn alignment_prior(model: &SubstModel, jp: &JumpProcess, nsites: Size) -> Result<ProbVector> {
    ensure!(nsites > 0, Config, "alignment prior needs at least one site");
    site_prior(model, jp)?.convolve(nsites)
}

/// Joint prior over `nsites` independent sites.
pub fn alignment_prior_joint(
    model: &SubstModel,
    jp: &JumpProcess,
    nsites: Size,
) -> Result<ProbMatrix> {
    ensure!(nsites > 0, Config, "alignment prior needs at least one site");
    site_prior_joint(model, jp)?.convolve(nsites)
}

/// Posterior distribution of the total substitution count over the whole
/// bound alignment: the convolution of per-tuple posteriors weighted by
/// tuple multiplicities.
pub fn alignment_posterior(binding: &ModelBinding<'_>) -> Result<ProbVector> {
    let msa = binding.msa();
    let mut posteriors = Vec::with_capacity(msa.ntuples());
    let mut counts = Vec::with_capacity(msa.ntuples());
    for t in 0..msa.ntuples() {
        posteriors.push(tuple_posterior(binding, t)?);
        counts.push(msa.tuple_count(t));
    }
    ProbVector::convolve_many(&posteriors, Some(&counts))
}

/// Joint posterior over the whole bound alignment.
pub fn alignment_posterior_joint(binding: &ModelBinding<'_>) -> Result<ProbMatrix> {
    let msa = binding.msa();
    let mut acc: Option<ProbMatrix> = None;
    for t in 0..msa.ntuples() {
        let tuple_power = tuple_posterior_joint(binding, t)?.convolve(msa.tuple_count(t))?;
        acc = Some(match acc {
            None => tuple_power,
            Some(a) => a.convolve_with_bounded(&tuple_power, usize::MAX, usize::MAX)?,
        });
    }
    match acc {
        Some(p) => Ok(p),
        None => Err(phy_core::Error::Config(
            "alignment has no columns to aggregate".into(),
        )),
    }
}
