//! Continuous-time substitution models.
//!
//! A [`SubstModel`] bundles an alphabet, a rate matrix, its equilibrium
//! frequencies, and a tree with branch lengths. Parameters are validated
//! at construction and immutable afterwards; fitting them is outside the
//! scope of this library.

use crate::alphabet::Alphabet;
use crate::tree::Tree;
use phy_core::{ensure, Real, Result};
use phy_math::comparison::close;
use phy_math::{Matrix, Vector};

/// Tolerance for the zero-row-sum check on the rate matrix.
const RATE_ROW_TOL: Real = 1e-6;

/// A substitution model: alphabet, rate matrix `Q`, equilibrium
/// frequencies `π`, tree, and Markov order.
#[derive(Debug, Clone, PartialEq)]
pub struct SubstModel {
    alphabet: Alphabet,
    rate_matrix: Matrix,
    backgd: Vector,
    tree: Tree,
    order: usize,
}

impl SubstModel {
    /// Create a model, validating the parameters.
    ///
    /// `Q` must be square of the alphabet's size with non-negative
    /// off-diagonals and zero row sums; `π` must be a probability vector
    /// of the same size. Branch lengths are validated by [`Tree`] itself.
    pub fn new(
        alphabet: Alphabet,
        rate_matrix: Matrix,
        backgd: Vector,
        tree: Tree,
        order: usize,
    ) -> Result<Self> {
        let size = alphabet.size();
        ensure!(
            rate_matrix.is_square() && rate_matrix.nrows() == size,
            Config,
            "rate matrix is {}x{}, expected {size}x{size}",
            rate_matrix.nrows(),
            rate_matrix.ncols()
        );
        for i in 0..size {
            for j in 0..size {
                if i != j {
                    ensure!(
                        rate_matrix[(i, j)] >= 0.0,
                        Config,
                        "negative off-diagonal rate {} at ({i}, {j})",
                        rate_matrix[(i, j)]
                    );
                }
            }
            let row = rate_matrix.row_sum(i);
            ensure!(
                close(row, 0.0, RATE_ROW_TOL),
                Config,
                "rate matrix row {i} sums to {row}, expected 0"
            );
        }
        ensure!(
            backgd.len() == size,
            Config,
            "background frequency vector has length {}, expected {size}",
            backgd.len()
        );
        ensure!(
            backgd.iter().all(|&p| p >= 0.0),
            Config,
            "negative background frequency"
        );
        let total = backgd.sum();
        ensure!(
            close(total, 1.0, phy_math::SUM_TOL),
            Config,
            "background frequencies sum to {total}, expected 1"
        );
        Ok(Self {
            alphabet,
            rate_matrix,
            backgd,
            tree,
            order,
        })
    }

    /// The Jukes–Cantor model on `ACGT`: all substitutions at rate 1/3,
    /// uniform equilibrium frequencies.
    pub fn jukes_cantor(tree: Tree) -> Result<Self> {
        let alphabet = Alphabet::dna();
        let s = alphabet.size();
        let mut q = Matrix::zeros(s, s);
        let off = 1.0 / (s as Real - 1.0);
        for i in 0..s {
            for j in 0..s {
                q[(i, j)] = if i == j { -1.0 } else { off };
            }
        }
        let backgd = Vector::from_vec(vec![1.0 / s as Real; s]);
        Self::new(alphabet, q, backgd, tree, 0)
    }

    /// The alphabet.
    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    /// The rate matrix `Q`.
    pub fn rate_matrix(&self) -> &Matrix {
        &self.rate_matrix
    }

    /// The equilibrium frequencies `π`.
    pub fn backgd(&self) -> &Vector {
        &self.backgd
    }

    /// The tree.
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Markov order of the model. The substitution-count machinery only
    /// supports order 0.
    pub fn order(&self) -> usize {
        self.order
    }

    /// A copy of this model with every branch length scaled by `factor`.
    pub fn with_scaled_tree(&self, factor: Real) -> Result<Self> {
        Ok(Self {
            tree: self.tree.scale_branches(factor)?,
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeBuilder;
    use approx::assert_abs_diff_eq;

    fn pair_tree() -> Tree {
        let mut b = TreeBuilder::new();
        let h = b.leaf("human");
        let c = b.leaf("chimp");
        let root = b.join(h, c, 0.1, 0.1);
        b.build(root).unwrap()
    }

    #[test]
    fn jukes_cantor_is_valid() {
        let m = SubstModel::jukes_cantor(pair_tree()).unwrap();
        assert_eq!(m.alphabet().size(), 4);
        assert_abs_diff_eq!(m.rate_matrix()[(0, 0)], -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.rate_matrix()[(0, 1)], 1.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.backgd().sum(), 1.0, epsilon = 1e-12);
        assert_eq!(m.order(), 0);
    }

    #[test]
    fn bad_row_sum_rejected() {
        let alphabet = Alphabet::dna();
        let q = Matrix::identity(4);
        let pi = Vector::from_vec(vec![0.25; 4]);
        assert!(SubstModel::new(alphabet, q, pi, pair_tree(), 0).is_err());
    }

    #[test]
    fn bad_frequencies_rejected() {
        let m = SubstModel::jukes_cantor(pair_tree()).unwrap();
        let pi = Vector::from_vec(vec![0.5; 4]);
        assert!(SubstModel::new(
            m.alphabet().clone(),
            m.rate_matrix().clone(),
            pi,
            pair_tree(),
            0
        )
        .is_err());
    }

    #[test]
    fn scaled_tree_model() {
        let m = SubstModel::jukes_cantor(pair_tree()).unwrap();
        let half = m.with_scaled_tree(0.5).unwrap();
        assert_abs_diff_eq!(half.tree().total_branch_length(), 0.1, epsilon = 1e-12);
    }
}
