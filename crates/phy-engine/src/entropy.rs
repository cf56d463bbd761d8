//! Relative entropy between tree models, and expected-length tuning.
//!
//! The per-column relative entropy `H` between a conserved and a
//! non-conserved model drives phylo-HMM tuning: from `H`, a target
//! coverage, and an expected element length one obtains the minimum
//! detectable element length `L_min` (and the insertion tolerance
//! `L_max`), and a Newton iteration inverts the `L_min · H` relation back
//! to an expected length.

use log::debug;
use phy_core::{ensure, Real, Result};
use phy_math::solvers1d::newton_clamped;
use phy_model::{Msa, SubstModel};

/// Checksum tolerance on the total probability of all leaf labelings.
const CHECKSUM_TOL: Real = 1e-4;

/// Convergence tolerance on the Newton step in `μ`.
const MU_STEP_TOL: Real = 1e-4;

/// Iteration cap for the expected-length inversion.
const MAX_NEWTON_ITER: u32 = 30;

/// Clamp interval for `μ` during the inversion.
const MU_MIN: Real = 1e-3;

/// A provider of per-column log-likelihoods under a tree model.
///
/// The engine does not implement likelihood pruning itself; callers bring
/// their own (base-2) implementation.
pub trait ColumnLikelihood {
    /// Log₂ probability of each column of `columns` under `model`.
    fn column_log2_likelihoods(&self, model: &SubstModel, columns: &Msa) -> Result<Vec<Real>>;
}

/// Relative entropy of the conserved model against the non-conserved one,
/// and the reverse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntropyResult {
    /// `Σ_c P_cons(c) · [log₂ P_cons(c) − log₂ P_noncons(c)]`.
    pub h: Real,
    /// The symmetric quantity with the roles exchanged.
    pub h_alt: Real,
}

/// Expected length bounds derived from `H`, coverage, and expected
/// element length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LengthEstimates {
    /// Expected minimum length of a detectable conserved element.
    pub l_min: Real,
    /// Expected maximum tolerated non-conserved insertion length.
    pub l_max: Real,
}

/// Enumerate every leaf labeling of the model's tree as a synthetic
/// alignment of `S^leafcount` columns.
///
/// Columns are ordered with the first leaf as the most significant digit.
pub fn enumerate_leaf_labelings(model: &SubstModel) -> Result<Msa> {
    let alphabet = model.alphabet();
    let s = alphabet.size();
    let leaves: Vec<&str> = model
        .tree()
        .leaves()
        .map(|n| n.name.as_deref().unwrap_or_default())
        .collect();
    ensure!(
        leaves.iter().all(|n| !n.is_empty()),
        Config,
        "every leaf needs a name to enumerate labelings"
    );
    let ncols = s
        .checked_pow(leaves.len() as u32)
        .ok_or_else(|| {
            phy_core::Error::Config(format!(
                "labeling enumeration overflows: {s}^{}",
                leaves.len()
            ))
        })?;

    let mut rows = vec![String::with_capacity(ncols); leaves.len()];
    let mut divisors = vec![1usize; leaves.len()];
    for p in (0..leaves.len().saturating_sub(1)).rev() {
        divisors[p] = divisors[p + 1] * s;
    }
    for idx in 0..ncols {
        for (p, row) in rows.iter_mut().enumerate() {
            row.push(alphabet.symbol((idx / divisors[p]) % s));
        }
    }
    Msa::new(leaves.iter().map(|n| n.to_string()).collect(), rows)
}

/// Compute `H` and `H_alt` between two models over the same alphabet and
/// leaf set.
///
/// Both models' column probabilities are checked to sum to 1 within the
/// checksum tolerance.
pub fn relative_entropy<L: ColumnLikelihood>(
    cons: &SubstModel,
    noncons: &SubstModel,
    lik: &L,
) -> Result<EntropyResult> {
    ensure!(
        cons.alphabet() == noncons.alphabet(),
        Config,
        "models use different alphabets ('{}' vs '{}')",
        cons.alphabet().symbols(),
        noncons.alphabet().symbols()
    );
    let mut cons_names: Vec<_> = cons.tree().leaves().map(|n| n.name.clone()).collect();
    let mut noncons_names: Vec<_> = noncons.tree().leaves().map(|n| n.name.clone()).collect();
    cons_names.sort();
    noncons_names.sort();
    ensure!(
        cons_names == noncons_names,
        Config,
        "models are defined over different leaf sets"
    );

    let columns = enumerate_leaf_labelings(cons)?;
    let lc = lik.column_log2_likelihoods(cons, &columns)?;
    let ln = lik.column_log2_likelihoods(noncons, &columns)?;
    ensure!(
        lc.len() == columns.len() && ln.len() == columns.len(),
        Config,
        "likelihood provider returned {} / {} values for {} columns",
        lc.len(),
        ln.len(),
        columns.len()
    );

    let sum_cons: Real = lc.iter().map(|&l| (2.0_f64).powf(l)).sum();
    let sum_noncons: Real = ln.iter().map(|&l| (2.0_f64).powf(l)).sum();
    debug!("labeling probability checksums: cons {sum_cons}, noncons {sum_noncons}");
    ensure!(
        (sum_cons - 1.0).abs() < CHECKSUM_TOL,
        Numerics,
        "conserved-model labeling probabilities sum to {sum_cons}, expected 1"
    );
    ensure!(
        (sum_noncons - 1.0).abs() < CHECKSUM_TOL,
        Numerics,
        "non-conserved-model labeling probabilities sum to {sum_noncons}, expected 1"
    );

    let mut h = 0.0;
    let mut h_alt = 0.0;
    for (&c, &n) in lc.iter().zip(&ln) {
        h += (2.0_f64).powf(c) * (c - n);
        h_alt += (2.0_f64).powf(n) * (n - c);
    }
    Ok(EntropyResult { h, h_alt })
}

/// Derive `L_min` and `L_max` from the entropies, the target coverage
/// `γ`, and the expected element length `ω`.
pub fn expected_lengths(
    entropy: &EntropyResult,
    gamma: Real,
    omega: Real,
) -> Result<LengthEstimates> {
    ensure!(
        gamma > 0.0 && gamma < 1.0,
        Config,
        "coverage must be in (0, 1), got {gamma}"
    );
    ensure!(omega > 0.0, Config, "expected length must be positive, got {omega}");
    let mu = 1.0 / omega;
    let nu = mu * gamma / (1.0 - gamma);
    ensure!(
        mu < 1.0 && nu < 1.0,
        Config,
        "state-exit probabilities out of range (mu = {mu}, nu = {nu})"
    );

    let numerator = nu.log2() + mu.log2() - (1.0 - nu).log2() - (1.0 - mu).log2();
    let l_min = numerator / ((1.0 - nu).log2() - (1.0 - mu).log2() - entropy.h);
    let l_max = numerator / ((1.0 - mu).log2() - (1.0 - nu).log2() - entropy.h_alt);
    Ok(LengthEstimates { l_min, l_max })
}

/// Solve for the expected element length that attains a given
/// `L_min · H` target, by Newton iteration on `μ = 1/ω`.
///
/// `l_min` is held fixed at `target / h`; the iteration starts from
/// `μ = 1/omega0` (used unclamped), clamps every subsequent iterate to
/// `[1e-3, 1 − 1e-3]`, converges on `|Δμ| < 1e-4`, and fails after 30
/// iterations. Returns the new `ω`.
pub fn invert_expected_length(
    l_min: Real,
    h: Real,
    gamma: Real,
    omega0: Real,
) -> Result<Real> {
    ensure!(
        gamma > 0.0 && gamma < 1.0,
        Config,
        "coverage must be in (0, 1), got {gamma}"
    );
    ensure!(omega0 > 0.0, Config, "initial expected length must be positive, got {omega0}");
    ensure!(
        l_min.is_finite() && h.is_finite() && h > 0.0,
        Config,
        "invalid inversion target (l_min = {l_min}, h = {h})"
    );
    let gp = gamma / (1.0 - gamma);
    let ln2 = std::f64::consts::LN_2;

    let f_df = |mu: Real| {
        debug!("expected-length iterate: omega = {}", 1.0 / mu);
        let f = (l_min + 1.0) * (1.0 - gp * mu).ln() - (l_min - 1.0) * (1.0 - mu).ln()
            - (gp * mu).ln()
            - mu.ln()
            - l_min * h * ln2;
        let df = -(l_min + 1.0) * gp / (1.0 - gp * mu) + (l_min - 1.0) / (1.0 - mu)
            - 2.0 / mu;
        (f, df)
    };
    let mu = newton_clamped(
        f_df,
        1.0 / omega0,
        MU_MIN,
        1.0 - MU_MIN,
        MU_STEP_TOL,
        MAX_NEWTON_ITER,
        "expected length inversion",
    )?;
    Ok(1.0 / mu)
}
