//! The uniformized jump process.
//!
//! Uniformization turns the continuous-time substitution process into a
//! Poisson clock of rate `λ = max_i(−Q[i][i])` firing "jumps", each of
//! which moves the state according to `R = I + Q/λ`. A jump may leave the
//! state unchanged, so the number of actual substitutions given `j` jumps
//! is a nontrivial distribution — which the tables built here make
//! explicit, enabling substitution counts to be reasoned about
//! combinatorially.

use crate::branch::BranchDistrib;
use crate::model::SubstModel;
use phy_core::{ensure, NodeId, Real, Result, Size};
use phy_math::comparison::close;
use phy_math::Matrix;

/// Tolerance for the stochasticity check on `R` and the mass checks on
/// the jump tables.
const JUMP_TOL: Real = 1e-9;

/// Floor on the jump-count truncation.
const JMAX_FLOOR: Size = 20;

/// Jumps per unit of total branch length reserved in the tables.
const JMAX_PER_LENGTH: Real = 15.0;

/// Precomputed tables of the uniformized jump representation of a
/// substitution model on a tree.
///
/// Immutable after construction; build once per (model, tree) pair and
/// share by reference across all queries.
#[derive(Debug, Clone)]
pub struct JumpProcess {
    lambda: Real,
    r: Matrix,
    jmax: Size,
    /// `a[i][(n, j)] = P(end state i, n substitutions | j jumps)`, start
    /// state marginalized under `π`.
    a: Vec<Matrix>,
    /// `b[s][i][(n, j)] = P(end state i, n substitutions | j jumps, start
    /// state s)`.
    b: Vec<Vec<Matrix>>,
    /// `m[(n, j)] = P(n substitutions | j jumps)`.
    m: Matrix,
    branch: Vec<Option<BranchDistrib>>,
}

impl JumpProcess {
    /// Build the jump process for a model, including the per-branch
    /// conditional tables for every non-root node of its tree.
    pub fn build(model: &SubstModel) -> Result<Self> {
        let s = model.alphabet().size();
        ensure!(s > 0, Config, "cannot uniformize a zero-size alphabet");
        let q = model.rate_matrix();

        let lambda = (0..s).map(|i| -q[(i, i)]).fold(Real::MIN, Real::max);
        ensure!(
            lambda > 0.0,
            Config,
            "rate matrix has no transitions (lambda = {lambda})"
        );

        let r = Matrix::identity_plus_scaled(q, lambda);
        ensure!(
            r.is_row_stochastic(JUMP_TOL),
            Config,
            "jump matrix I + Q/lambda is not stochastic"
        );

        let total_len = model.tree().total_branch_length();
        let jmax = ((JMAX_PER_LENGTH * total_len).ceil() as Size).max(JMAX_FLOOR);

        let pi: Vec<Real> = model.backgd().iter().copied().collect();
        let a = jump_tables(&r, &pi, jmax)?;
        let mut b = Vec::with_capacity(s);
        for start in 0..s {
            let mut delta = vec![0.0; s];
            delta[start] = 1.0;
            b.push(jump_tables(&r, &delta, jmax)?);
        }

        let mut m = Matrix::zeros(jmax, jmax);
        for i in 0..s {
            for n in 0..jmax {
                for j in 0..jmax {
                    m[(n, j)] += a[i][(n, j)];
                }
            }
        }

        let mut jp = Self {
            lambda,
            r,
            jmax,
            a,
            b,
            m,
            branch: Vec::new(),
        };

        let tree = model.tree();
        let mut branch = vec![None; tree.nnodes()];
        for &id in tree.postorder() {
            if let Some(d) = tree.node(id).dparent {
                branch[id] = Some(BranchDistrib::new(&jp, d)?);
            }
        }
        jp.branch = branch;
        Ok(jp)
    }

    /// Uniformization rate `λ`.
    pub fn lambda(&self) -> Real {
        self.lambda
    }

    /// The jump matrix `R = I + Q/λ`.
    pub fn jump_matrix(&self) -> &Matrix {
        &self.r
    }

    /// Truncation of the jump and substitution counts in the tables.
    pub fn jmax(&self) -> Size {
        self.jmax
    }

    /// Number of states.
    pub fn nstates(&self) -> Size {
        self.a.len()
    }

    /// `P(end state i, n substitutions | j jumps)` with the start state
    /// marginalized under the equilibrium frequencies.
    pub fn a_table(&self, i: Size) -> &Matrix {
        &self.a[i]
    }

    /// `P(end state i, n substitutions | j jumps, start state s)`.
    pub fn b_table(&self, s: Size, i: Size) -> &Matrix {
        &self.b[s][i]
    }

    /// `P(n substitutions | j jumps)`, marginal over end states.
    pub fn subst_given_jumps(&self) -> &Matrix {
        &self.m
    }

    /// The precomputed branch-conditional table for a node, `None` at the
    /// root.
    pub fn branch_distrib(&self, node: NodeId) -> Option<&BranchDistrib> {
        self.branch[node].as_ref()
    }
}

/// Run the two-index jump recurrence from an initial state distribution.
///
/// Returns one `jmax × jmax` matrix per end state, indexed `(n, j)`:
/// a jump either keeps the state (diagonal of `R`, count unchanged) or
/// moves it (off-diagonal, count + 1). Each jump level's total mass is
/// checked against 1.
fn jump_tables(r: &Matrix, init: &[Real], jmax: Size) -> Result<Vec<Matrix>> {
    let s = r.nrows();
    let mut t: Vec<Matrix> = (0..s).map(|_| Matrix::zeros(jmax, jmax)).collect();
    for (i, &p) in init.iter().enumerate() {
        t[i][(0, 0)] = p;
    }
    for j in 1..jmax {
        for n in 0..=j {
            for i in 0..s {
                let mut v = t[i][(n, j - 1)] * r[(i, i)];
                if n > 0 {
                    for k in 0..s {
                        if k != i {
                            v += t[k][(n - 1, j - 1)] * r[(k, i)];
                        }
                    }
                }
                t[i][(n, j)] = v;
            }
        }
    }
    for j in 0..jmax {
        let mut mass = 0.0;
        for tab in &t {
            for n in 0..jmax {
                mass += tab[(n, j)];
            }
        }
        ensure!(
            close(mass, 1.0, JUMP_TOL),
            Numerics,
            "jump table mass at {j} jumps is {mass}, expected 1"
        );
    }
    Ok(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeBuilder;
    use approx::assert_abs_diff_eq;

    fn jc_pair_model(d: Real) -> SubstModel {
        let mut b = TreeBuilder::new();
        let h = b.leaf("human");
        let c = b.leaf("chimp");
        let root = b.join(h, c, d, d);
        SubstModel::jukes_cantor(b.build(root).unwrap()).unwrap()
    }

    #[test]
    fn lambda_and_jump_matrix() {
        let jp = JumpProcess::build(&jc_pair_model(0.1)).unwrap();
        assert_abs_diff_eq!(jp.lambda(), 1.0, epsilon = 1e-12);
        // Under Jukes-Cantor with total rate 1, a jump always changes the
        // state.
        assert_abs_diff_eq!(jp.jump_matrix()[(0, 0)], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(jp.jump_matrix()[(0, 1)], 1.0 / 3.0, epsilon = 1e-12);
        assert_eq!(jp.jmax(), 20);
    }

    #[test]
    fn a_table_masses_sum_to_one_per_jump_level() {
        let jp = JumpProcess::build(&jc_pair_model(0.1)).unwrap();
        for j in 0..jp.jmax() {
            let mut mass = 0.0;
            for i in 0..jp.nstates() {
                for n in 0..jp.jmax() {
                    mass += jp.a_table(i)[(n, j)];
                }
            }
            assert_abs_diff_eq!(mass, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn b_table_masses_sum_to_one_per_start_and_jump_level() {
        let jp = JumpProcess::build(&jc_pair_model(0.1)).unwrap();
        for s in 0..jp.nstates() {
            for j in 0..jp.jmax() {
                let mut mass = 0.0;
                for i in 0..jp.nstates() {
                    for n in 0..jp.jmax() {
                        mass += jp.b_table(s, i)[(n, j)];
                    }
                }
                assert_abs_diff_eq!(mass, 1.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn jc_jumps_always_substitute() {
        // With a zero diagonal in R, n substitutions given j jumps is a
        // point mass at n = j.
        let jp = JumpProcess::build(&jc_pair_model(0.1)).unwrap();
        let m = jp.subst_given_jumps();
        for j in 0..5 {
            for n in 0..5 {
                let expected = if n == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(m[(n, j)], expected, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn jmax_grows_with_tree_length() {
        let jp = JumpProcess::build(&jc_pair_model(3.0)).unwrap();
        assert_eq!(jp.jmax(), 90);
    }

    #[test]
    fn branch_tables_present_except_root() {
        let model = jc_pair_model(0.1);
        let jp = JumpProcess::build(&model).unwrap();
        let tree = model.tree();
        for &id in tree.postorder() {
            if id == tree.root() {
                assert!(jp.branch_distrib(id).is_none());
            } else {
                assert!(jp.branch_distrib(id).is_some());
            }
        }
    }
}
