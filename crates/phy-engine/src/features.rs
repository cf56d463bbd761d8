//! Per-feature substitution-count statistics and p-values.
//!
//! A feature is a contiguous span of alignment columns. For each feature
//! the orchestrator compares a prior distribution of substitution counts
//! (model + tree alone, convolved over the feature's length) against the
//! aggregated posterior moments of its columns, yielding conservation and
//! acceleration p-values. Power-of-two prior convolutions and per-tuple
//! posteriors are cached across the batch.

use crate::binding::ModelBinding;
use crate::posterior::{tuple_posterior, tuple_posterior_joint};
use crate::prior::{site_prior, site_prior_joint};
use log::debug;
use phy_core::{ensure, Real, Result, Size};
use phy_math::prob::matrix::{x_given_tot_indep, JointStats};
use phy_math::{ProbMatrix, ProbVector, Tail};
use statrs::distribution::{ContinuousCDF, Normal};

/// Confidence level of the reported prior intervals.
const PRIOR_CI: Real = 0.95;

/// Feature length above which CLT bounds replace the exact support in
/// joint convolutions.
const CLT_MIN_LEN: Size = 25;

/// A contiguous span of alignment columns, 1-based and inclusive on both
/// ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Feature {
    /// First column, 1-based.
    pub start: Size,
    /// Last column, 1-based, inclusive.
    pub end: Size,
}

impl Feature {
    /// Create a feature spanning columns `start..=end` (1-based).
    pub fn new(start: Size, end: Size) -> Self {
        Self { start, end }
    }

    /// Number of columns covered.
    pub fn len(&self) -> Size {
        self.end - self.start + 1
    }

    /// Return `true` if the span is degenerate (never, once validated).
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// 0-based column range `[start−1, end)`.
    fn cols(&self) -> std::ops::Range<Size> {
        (self.start - 1)..self.end
    }
}

/// Scalar (total-count) statistics of one feature.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScalarFeatureStats {
    /// The feature the row describes.
    pub feature: Feature,
    /// Mean of the prior count distribution.
    pub prior_mean: Real,
    /// Variance of the prior count distribution.
    pub prior_var: Real,
    /// 95% confidence interval of the prior count.
    pub prior_ci: (Size, Size),
    /// Aggregated posterior mean (sum over columns).
    pub post_mean: Real,
    /// Aggregated posterior variance (sum over columns).
    pub post_var: Real,
    /// Lower end of the posterior interval (the mean when no confidence
    /// level was requested).
    pub post_min: Real,
    /// Upper end of the posterior interval.
    pub post_max: Real,
    /// `P(prior ≤ post_max)` — small when the feature is conserved.
    pub p_cons: Real,
    /// `P(prior ≥ post_min)` — small when the feature is accelerated.
    pub p_anti_cons: Real,
}

/// Prior/posterior statistics for one side of the bivariate
/// decomposition (left subtree, right subtree, or their total).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SideStats {
    /// Mean of the prior count distribution.
    pub prior_mean: Real,
    /// Variance of the prior count distribution.
    pub prior_var: Real,
    /// 95% confidence interval of the prior count.
    pub prior_ci: (Size, Size),
    /// Aggregated posterior mean.
    pub post_mean: Real,
    /// Aggregated posterior variance.
    pub post_var: Real,
    /// Lower end of the posterior interval.
    pub post_min: Real,
    /// Upper end of the posterior interval.
    pub post_max: Real,
}

/// Bivariate (left/right) statistics of one feature.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JointFeatureStats {
    /// The feature the row describes.
    pub feature: Feature,
    /// Left-subtree statistics.
    pub left: SideStats,
    /// Right-subtree statistics.
    pub right: SideStats,
    /// Total-count statistics.
    pub total: SideStats,
    /// `P(prior_left ≤ post_max_left)`.
    pub p_cons_left: Real,
    /// `P(prior_left ≥ post_min_left)`.
    pub p_anti_cons_left: Real,
    /// `P(prior_right ≤ post_max_right)`.
    pub p_cons_right: Real,
    /// `P(prior_right ≥ post_min_right)`.
    pub p_anti_cons_right: Real,
    /// Left conservation p-value conditional on the posterior total.
    pub cond_p_cons_left: Real,
    /// Left acceleration p-value conditional on the posterior total.
    pub cond_p_anti_cons_left: Real,
    /// Right conservation p-value conditional on the posterior total.
    pub cond_p_cons_right: Real,
    /// Right acceleration p-value conditional on the posterior total.
    pub cond_p_anti_cons_right: Real,
    /// `true` when the joint prior convolution was skipped and conditional
    /// p-values fell back to the independence approximation.
    pub approximate: bool,
}

// ─── Shared helpers ───────────────────────────────────────────────────────────

fn validate_features(features: &[Feature], ncols: Size) -> Result<Size> {
    let mut maxlen = 0;
    for f in features {
        ensure!(
            f.start >= 1 && f.start <= f.end && f.end <= ncols,
            Config,
            "feature {}..{} out of range for a {ncols}-column alignment",
            f.start,
            f.end
        );
        maxlen = maxlen.max(f.len());
    }
    Ok(maxlen)
}

/// Number of power-of-two convolutions needed for lengths up to `maxlen`.
fn npow(maxlen: Size) -> usize {
    (Size::BITS - maxlen.leading_zeros()) as usize
}

/// Clone the cached powers matching the set bits of `len`, lowest first.
fn select_powers(pows: &[ProbVector], len: Size) -> Vec<ProbVector> {
    let mut sel = Vec::new();
    let mut l = len;
    let mut bit = 0;
    while l > 0 {
        if l & 1 == 1 {
            sel.push(pows[bit].clone());
        }
        l >>= 1;
        bit += 1;
    }
    sel
}

/// Posterior interval: a Gaussian `mean ± z(ci)·sd` floored/ceilinged to
/// integers when `ci > 0`, else collapsed onto the mean.
fn gaussian_interval(mean: Real, var: Real, ci: Real) -> Result<(Real, Real)> {
    if ci <= 0.0 {
        return Ok((mean, mean));
    }
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| phy_core::Error::Numerics(format!("standard normal: {e}")))?;
    let z = normal.inverse_cdf((1.0 + ci) / 2.0);
    let sd = var.max(0.0).sqrt();
    Ok(((mean - z * sd).floor().max(0.0), (mean + z * sd).ceil()))
}

/// CLT bound on the support of an `l`-fold convolution: `l·μ + 6·σ·√l`,
/// as a matrix dimension.
fn clt_dim(l: Size, mean: Real, sd: Real) -> Size {
    let l = l as Real;
    ((l * mean + 6.0 * sd * l.sqrt()).ceil() as Size).max(1) + 1
}

// ─── Scalar orchestrator ──────────────────────────────────────────────────────

/// Compute scalar prior/posterior statistics and p-values for a batch of
/// features.
///
/// `ci` is the confidence level of the posterior interval; pass 0 to use
/// the posterior mean directly. Results are emitted in input order.
pub fn feature_scalar_stats(
    binding: &ModelBinding<'_>,
    features: &[Feature],
    ci: Real,
) -> Result<Vec<ScalarFeatureStats>> {
    ensure!(ci < 1.0, Config, "confidence level must be below 1, got {ci}");
    let msa = binding.msa();
    let maxlen = validate_features(features, msa.len())?;
    if features.is_empty() {
        return Ok(Vec::new());
    }

    let mut touched = vec![false; msa.ntuples()];
    for f in features {
        for col in f.cols() {
            touched[msa.tuple_idx(col)] = true;
        }
    }

    let site = site_prior(binding.model(), binding.jump_process())?;
    let mut pows = Vec::with_capacity(npow(maxlen));
    pows.push(site);
    for i in 1..npow(maxlen) {
        let next = pows[i - 1].convolve_with(&pows[i - 1])?;
        pows.push(next);
    }
    debug!(
        "cached {} power-of-two priors for {} features (max length {maxlen})",
        pows.len(),
        features.len()
    );

    let mut tuple_stats: Vec<Option<(Real, Real)>> = vec![None; msa.ntuples()];
    for (t, stats) in tuple_stats.iter_mut().enumerate() {
        if touched[t] {
            *stats = Some(tuple_posterior(binding, t)?.stats());
        }
    }

    let mut out = Vec::with_capacity(features.len());
    for f in features {
        let prior = ProbVector::convolve_many(&select_powers(&pows, f.len()), None)?;
        let (prior_mean, prior_var) = prior.stats();
        let prior_ci = prior.confidence_interval(PRIOR_CI)?;

        let mut post_mean = 0.0;
        let mut post_var = 0.0;
        for col in f.cols() {
            let (m, v) = tuple_stats[msa.tuple_idx(col)]
                .ok_or_else(|| phy_core::Error::Config("untouched tuple in feature".into()))?;
            post_mean += m;
            post_var += v;
        }
        let (post_min, post_max) = gaussian_interval(post_mean, post_var, ci)?;

        out.push(ScalarFeatureStats {
            feature: *f,
            prior_mean,
            prior_var,
            prior_ci,
            post_mean,
            post_var,
            post_min,
            post_max,
            p_cons: prior.p_value(post_max, Tail::Lower),
            p_anti_cons: prior.p_value(post_min, Tail::Upper),
        });
    }
    Ok(out)
}

// ─── Joint orchestrator ───────────────────────────────────────────────────────

/// Joint prior convolution bounds for a feature of length `l`.
fn joint_bounds(l: Size, site: &ProbMatrix, st: &JointStats) -> (Size, Size) {
    if l > CLT_MIN_LEN {
        (
            clt_dim(l, st.mean_x, st.var_x.max(0.0).sqrt()),
            clt_dim(l, st.mean_y, st.var_y.max(0.0).sqrt()),
        )
    } else {
        (l * site.nrows(), l * site.ncols())
    }
}

/// Largest feature length whose CLT-bounded joint prior fits inside
/// `max_convolve_size` cells, found by iterating upward.
fn max_tractable_len(maxlen: Size, st: &JointStats, max_convolve_size: Size) -> Size {
    let (sd_x, sd_y) = (st.var_x.max(0.0).sqrt(), st.var_y.max(0.0).sqrt());
    let mut len = 0;
    while len < maxlen {
        let l = (len + 1) as Real;
        let size = (l * st.mean_x + 6.0 * sd_x * l.sqrt())
            * (l * st.mean_y + 6.0 * sd_y * l.sqrt());
        if size > max_convolve_size as Real {
            break;
        }
        len += 1;
    }
    len
}

/// Compute bivariate prior/posterior statistics and p-values for a batch
/// of features.
///
/// Features longer than the tractable joint-convolution length get
/// marginal statistics only, with conditional p-values from the
/// independence approximation and the `approximate` flag set. Results are
/// emitted in input order.
pub fn feature_joint_stats(
    binding: &ModelBinding<'_>,
    features: &[Feature],
    ci: Real,
    max_convolve_size: Size,
) -> Result<Vec<JointFeatureStats>> {
    ensure!(ci < 1.0, Config, "confidence level must be below 1, got {ci}");
    ensure!(
        max_convolve_size > 0,
        Config,
        "joint convolution size guard must be positive"
    );
    let msa = binding.msa();
    let maxlen = validate_features(features, msa.len())?;
    if features.is_empty() {
        return Ok(Vec::new());
    }

    let mut touched = vec![false; msa.ntuples()];
    for f in features {
        for col in f.cols() {
            touched[msa.tuple_idx(col)] = true;
        }
    }

    let site = site_prior_joint(binding.model(), binding.jump_process())?;
    let st = site.stats();
    let max_conv_len = max_tractable_len(maxlen, &st, max_convolve_size);
    debug!(
        "joint priors tractable up to length {max_conv_len} \
         (size guard {max_convolve_size}, max feature length {maxlen})"
    );

    // 1-D marginal powers serve the long-feature path and the totals.
    let (site_x, site_y, site_t) = (site.marg_x(), site.marg_y(), site.marg_tot());
    let n1d = npow(maxlen);
    let (mut pows_x, mut pows_y, mut pows_t) = (
        Vec::with_capacity(n1d),
        Vec::with_capacity(n1d),
        Vec::with_capacity(n1d),
    );
    pows_x.push(site_x);
    pows_y.push(site_y);
    pows_t.push(site_t);
    for i in 1..n1d {
        let next_x = pows_x[i - 1].convolve_with(&pows_x[i - 1])?;
        let next_y = pows_y[i - 1].convolve_with(&pows_y[i - 1])?;
        let next_t = pows_t[i - 1].convolve_with(&pows_t[i - 1])?;
        pows_x.push(next_x);
        pows_y.push(next_y);
        pows_t.push(next_t);
    }

    // Joint powers only up to the tractable length, each truncated to the
    // bounds of the doubled length.
    let n2d = if max_conv_len > 0 {
        npow(max_conv_len.min(maxlen))
    } else {
        0
    };
    let mut pows_m: Vec<ProbMatrix> = Vec::with_capacity(n2d);
    if n2d > 0 {
        pows_m.push(site.clone());
        for i in 1..n2d {
            let (rows, cols) = joint_bounds(1 << i, &site, &st);
            let next = pows_m[i - 1].convolve_with_bounded(&pows_m[i - 1], rows, cols)?;
            pows_m.push(next);
        }
    }

    let mut tuple_stats: Vec<Option<JointStats>> = vec![None; msa.ntuples()];
    for (t, stats) in tuple_stats.iter_mut().enumerate() {
        if touched[t] {
            *stats = Some(tuple_posterior_joint(binding, t)?.stats());
        }
    }

    let mut out = Vec::with_capacity(features.len());
    for f in features {
        let len = f.len();

        // Aggregate posterior moments over the feature's columns.
        let (mut mx, mut vx, mut my, mut vy, mut vtot) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for col in f.cols() {
            let s = tuple_stats[msa.tuple_idx(col)]
                .ok_or_else(|| phy_core::Error::Config("untouched tuple in feature".into()))?;
            mx += s.mean_x;
            vx += s.var_x;
            my += s.mean_y;
            vy += s.var_y;
            vtot += s.var_x + s.var_y + 2.0 * s.cov;
        }
        let (post_min_x, post_max_x) = gaussian_interval(mx, vx, ci)?;
        let (post_min_y, post_max_y) = gaussian_interval(my, vy, ci)?;
        let (post_min_t, post_max_t) = gaussian_interval(mx + my, vtot, ci)?;

        // Priors: explicit joint when tractable, 1-D marginals otherwise.
        let approximate = len > max_conv_len;
        let (prior_x, prior_y, prior_t, joint_prior) = if approximate {
            debug!(
                "feature {}..{} (length {len}) exceeds tractable joint length {max_conv_len}; \
                 conditional p-values use the independence approximation",
                f.start, f.end
            );
            (
                ProbVector::convolve_many(&select_powers(&pows_x, len), None)?,
                ProbVector::convolve_many(&select_powers(&pows_y, len), None)?,
                ProbVector::convolve_many(&select_powers(&pows_t, len), None)?,
                None,
            )
        } else {
            let (rows, cols) = joint_bounds(len, &site, &st);
            let mut sel = Vec::new();
            let mut l = len;
            let mut bit = 0;
            while l > 0 {
                if l & 1 == 1 {
                    sel.push(&pows_m[bit]);
                }
                l >>= 1;
                bit += 1;
            }
            let joint = ProbMatrix::convolve_many_fast(&sel, rows, cols)?;
            (joint.marg_x(), joint.marg_y(), joint.marg_tot(), Some(joint))
        };

        // Condition the prior on the aggregated posterior total, clamped
        // into the prior's support so the request is never degenerate.
        let s_tot = ((mx + my).round().max(0.0) as Size).min(prior_t.len() - 1);
        let (cond_x, cond_y) = match &joint_prior {
            Some(j) => {
                let s = s_tot.min(j.nrows() + j.ncols() - 2);
                (j.x_given_tot(s)?, j.y_given_tot(s)?)
            }
            None => {
                let s = s_tot.min(prior_x.len() + prior_y.len() - 2);
                (
                    x_given_tot_indep(s, &prior_x, &prior_y)?,
                    x_given_tot_indep(s, &prior_y, &prior_x)?,
                )
            }
        };

        let side = |prior: &ProbVector,
                    post_mean: Real,
                    post_var: Real,
                    post_min: Real,
                    post_max: Real|
         -> Result<SideStats> {
            let (prior_mean, prior_var) = prior.stats();
            Ok(SideStats {
                prior_mean,
                prior_var,
                prior_ci: prior.confidence_interval(PRIOR_CI)?,
                post_mean,
                post_var,
                post_min,
                post_max,
            })
        };

        out.push(JointFeatureStats {
            feature: *f,
            left: side(&prior_x, mx, vx, post_min_x, post_max_x)?,
            right: side(&prior_y, my, vy, post_min_y, post_max_y)?,
            total: side(&prior_t, mx + my, vtot, post_min_t, post_max_t)?,
            p_cons_left: prior_x.p_value(post_max_x, Tail::Lower),
            p_anti_cons_left: prior_x.p_value(post_min_x, Tail::Upper),
            p_cons_right: prior_y.p_value(post_max_y, Tail::Lower),
            p_anti_cons_right: prior_y.p_value(post_min_y, Tail::Upper),
            cond_p_cons_left: cond_x.p_value(post_max_x, Tail::Lower),
            cond_p_anti_cons_left: cond_x.p_value(post_min_x, Tail::Upper),
            cond_p_cons_right: cond_y.p_value(post_max_y, Tail::Lower),
            cond_p_anti_cons_right: cond_y.p_value(post_min_y, Tail::Upper),
            approximate,
        });
    }
    Ok(out)
}
