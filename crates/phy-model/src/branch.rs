//! Branch-conditional substitution distributions.
//!
//! For a branch of length `t`, the number of uniformized jumps is
//! Poisson(λt); mixing the jump process's start-conditional tables over
//! that count gives `D[a][b][n] = P(end state b, n substitutions | start
//! state a, length t)` — the quantity the tree dynamic program consumes.

use crate::jump::JumpProcess;
use phy_core::{ensure, fail, BranchLength, Real, Result, Size};
use phy_math::{poisson_probs, Matrix, TRIM_EPS};

/// The conditional distribution of (end state, substitution count) on a
/// branch, per start state.
///
/// `cond[a]` is an `S × ncols` matrix: row `b`, column `n` holds
/// `P(end = b, n substitutions | start = a)`. All start states share one
/// `ncols` so the dynamic program can clip its split loops uniformly.
#[derive(Debug, Clone)]
pub struct BranchDistrib {
    t: BranchLength,
    cond: Vec<Matrix>,
    ncols: Size,
}

impl BranchDistrib {
    /// Build the conditional tables for a branch of length `t`.
    ///
    /// The Poisson truncation point must fall strictly inside the jump
    /// process's tables; a longer branch needs a rebuilt process with a
    /// larger `jmax`.
    pub fn new(jp: &JumpProcess, t: BranchLength) -> Result<Self> {
        ensure!(
            t.is_finite() && t >= 0.0,
            Config,
            "negative branch length {t}"
        );
        let s = jp.nstates();

        if t == 0.0 {
            // No time, no events: the state is carried through unchanged.
            let mut cond = Vec::with_capacity(s);
            for a in 0..s {
                let mut m = Matrix::zeros(s, 1);
                m[(a, 0)] = 1.0;
                cond.push(m);
            }
            return Ok(Self { t, cond, ncols: 1 });
        }

        let pois = poisson_probs(jp.lambda() * t)?;
        let jlen = pois.len();
        if jlen >= jp.jmax() {
            fail!(
                Resource,
                "Poisson truncation {jlen} exceeds jump table size {} on a branch of length {t}; \
                 rebuild the jump process with larger tables",
                jp.jmax()
            );
        }

        // n substitutions require at least n jumps, so the count support
        // is bounded by the Poisson truncation.
        let mut cond = Vec::with_capacity(s);
        for a in 0..s {
            let mut m = Matrix::zeros(s, jlen);
            for b in 0..s {
                let tab = jp.b_table(a, b);
                for n in 0..jlen {
                    let mut acc = 0.0;
                    for j in n..jlen {
                        acc += tab[(n, j)] * pois[j];
                    }
                    m[(b, n)] = acc;
                }
            }
            let mass = m.sum();
            ensure!(
                mass.is_finite() && mass > 0.0,
                Numerics,
                "branch table for start state {a} has mass {mass}"
            );
            m.scale_mut(1.0 / mass);
            cond.push(m);
        }

        // Trim trailing count columns that are negligible for every start
        // and end state, keeping the tables aligned.
        let mut ncols = jlen;
        while ncols > 1
            && cond
                .iter()
                .all(|m| (0..s).all(|b| m[(b, ncols - 1)] < TRIM_EPS))
        {
            ncols -= 1;
        }
        if ncols < jlen {
            for m in &mut cond {
                let mut shrunk = Matrix::zeros(s, ncols);
                for b in 0..s {
                    for n in 0..ncols {
                        shrunk[(b, n)] = m[(b, n)];
                    }
                }
                *m = shrunk;
            }
        }

        Ok(Self { t, cond, ncols })
    }

    /// Branch length the tables were built for.
    pub fn t(&self) -> BranchLength {
        self.t
    }

    /// Common support size of the substitution count, across start states.
    pub fn ncols(&self) -> Size {
        self.ncols
    }

    /// `P(end = b, n substitutions | start = a)`; zero beyond the support.
    pub fn prob(&self, a: Size, b: Size, n: Size) -> Real {
        if n < self.ncols {
            self.cond[a][(b, n)]
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SubstModel;
    use crate::tree::TreeBuilder;
    use approx::assert_abs_diff_eq;

    fn jc_jump(d: Real) -> JumpProcess {
        let mut b = TreeBuilder::new();
        let h = b.leaf("human");
        let c = b.leaf("chimp");
        let root = b.join(h, c, d, d);
        let model = SubstModel::jukes_cantor(b.build(root).unwrap()).unwrap();
        JumpProcess::build(&model).unwrap()
    }

    #[test]
    fn rows_sum_to_one_per_start_state() {
        let jp = jc_jump(0.1);
        let d = BranchDistrib::new(&jp, 0.3).unwrap();
        for a in 0..4 {
            let mut mass = 0.0;
            for b in 0..4 {
                for n in 0..d.ncols() {
                    mass += d.prob(a, b, n);
                }
            }
            assert_abs_diff_eq!(mass, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn zero_length_concentrates_at_start_state() {
        let jp = jc_jump(0.1);
        let d = BranchDistrib::new(&jp, 0.0).unwrap();
        assert_eq!(d.ncols(), 1);
        for a in 0..4 {
            for b in 0..4 {
                let expected = if a == b { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(d.prob(a, b, 0), expected, epsilon = 1e-15);
            }
        }
    }

    #[test]
    fn short_branch_rarely_substitutes() {
        let jp = jc_jump(0.1);
        let d = BranchDistrib::new(&jp, 0.01).unwrap();
        // P(no substitution, same state) ~ e^{-0.01}
        assert!(d.prob(0, 0, 0) > 0.98);
        let mut p_change = 0.0;
        for b in 0..4 {
            for n in 1..d.ncols() {
                p_change += d.prob(0, b, n);
            }
        }
        assert!(p_change < 0.02);
    }

    #[test]
    fn matches_jc_transition_probability() {
        // Under Jukes-Cantor the probability of observing a different
        // state after time t is (3/4)(1 - e^{-4t/3}).
        let jp = jc_jump(0.1);
        let t = 0.3;
        let d = BranchDistrib::new(&jp, t).unwrap();
        let mut p_diff = 0.0;
        for b in 1..4 {
            for n in 0..d.ncols() {
                p_diff += d.prob(0, b, n);
            }
        }
        // Tolerance reflects the truncated Poisson tail.
        let expected = 0.75 * (1.0 - (-4.0 * t / 3.0_f64).exp());
        assert_abs_diff_eq!(p_diff, expected, epsilon = 1e-4);
    }

    #[test]
    fn long_branch_exhausts_jump_tables() {
        let jp = jc_jump(0.1); // jmax = 20
        let err = BranchDistrib::new(&jp, 5.0).unwrap_err();
        assert!(matches!(err, phy_core::Error::Resource(_)));
    }

    #[test]
    fn negative_length_rejected() {
        let jp = jc_jump(0.1);
        assert!(BranchDistrib::new(&jp, -0.5).is_err());
    }
}
