//! `Matrix` — a two-dimensional matrix of reals.
//!
//! A thin newtype around `nalgebra::DMatrix<f64>`. Beyond the generic
//! constructors and indexing, it carries the operations the jump-process
//! machinery leans on: identity-plus-scaled construction, row sums, and
//! row-stochasticity checks.

use crate::comparison::close;
use crate::vector::Vector;
use nalgebra::DMatrix;
use phy_core::Real;
use std::ops::{Index, IndexMut};

/// A dynamically-sized 2D matrix of `Real` values (row/column indexed).
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix(DMatrix<Real>);

impl Matrix {
    /// Create a zero-filled `rows × cols` matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self(DMatrix::zeros(rows, cols))
    }

    /// Create an identity matrix of size `n × n`.
    pub fn identity(n: usize) -> Self {
        Self(DMatrix::identity(n, n))
    }

    /// Create from a row-major data slice.
    pub fn from_row_slice(rows: usize, cols: usize, data: &[Real]) -> Self {
        Self(DMatrix::from_row_slice(rows, cols, data))
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.0.nrows()
    }

    /// Number of columns.
    pub fn ncols(&self) -> usize {
        self.0.ncols()
    }

    /// Return `true` if the matrix is square.
    pub fn is_square(&self) -> bool {
        self.0.nrows() == self.0.ncols()
    }

    /// Sum of the elements of row `i`, accumulated left to right.
    pub fn row_sum(&self, i: usize) -> Real {
        (0..self.0.ncols()).map(|j| self.0[(i, j)]).sum()
    }

    /// Extract row `i` as a `Vector`.
    pub fn row(&self, i: usize) -> Vector {
        Vector::from_vec((0..self.0.ncols()).map(|j| self.0[(i, j)]).collect())
    }

    /// Sum of all elements.
    pub fn sum(&self) -> Real {
        self.0.iter().sum()
    }

    /// Multiply every element by `scalar` in place.
    pub fn scale_mut(&mut self, scalar: Real) {
        self.0 *= scalar;
    }

    /// Return `true` if every row sums to 1 within `tol` and all entries
    /// are non-negative.
    pub fn is_row_stochastic(&self, tol: Real) -> bool {
        if self.0.iter().any(|&x| x < 0.0) {
            return false;
        }
        (0..self.0.nrows()).all(|i| close(self.row_sum(i), 1.0, tol))
    }

    /// Build `I + M / lambda` for a square matrix `M`.
    pub fn identity_plus_scaled(m: &Matrix, lambda: Real) -> Self {
        debug_assert!(m.is_square());
        let n = m.nrows();
        let mut out = Self::identity(n);
        for i in 0..n {
            for j in 0..n {
                out[(i, j)] += m[(i, j)] / lambda;
            }
        }
        out
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = Real;
    fn index(&self, (i, j): (usize, usize)) -> &Real {
        &self.0[(i, j)]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut Real {
        &mut self.0[(i, j)]
    }
}

impl std::fmt::Display for Matrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for i in 0..self.0.nrows() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "[")?;
            for j in 0..self.0.ncols() {
                if j > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", self.0[(i, j)])?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity() {
        let m = Matrix::identity(3);
        assert_eq!(m[(0, 0)], 1.0);
        assert_eq!(m[(0, 1)], 0.0);
        assert_eq!(m.nrows(), 3);
    }

    #[test]
    fn row_sums() {
        let m = Matrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!((m.row_sum(0) - 6.0).abs() < 1e-12);
        assert!((m.row_sum(1) - 15.0).abs() < 1e-12);
    }

    #[test]
    fn stochastic_check() {
        let m = Matrix::from_row_slice(2, 2, &[0.9, 0.1, 0.4, 0.6]);
        assert!(m.is_row_stochastic(1e-12));
        let bad = Matrix::from_row_slice(2, 2, &[0.9, 0.2, 0.4, 0.6]);
        assert!(!bad.is_row_stochastic(1e-9));
        let neg = Matrix::from_row_slice(2, 2, &[1.1, -0.1, 0.4, 0.6]);
        assert!(!neg.is_row_stochastic(1e-9));
    }

    #[test]
    fn uniformized_jump_matrix() {
        // Jukes-Cantor rate matrix with total rate 1
        let q = Matrix::from_row_slice(
            4,
            4,
            &[
                -1.0,
                1.0 / 3.0,
                1.0 / 3.0,
                1.0 / 3.0,
                1.0 / 3.0,
                -1.0,
                1.0 / 3.0,
                1.0 / 3.0,
                1.0 / 3.0,
                1.0 / 3.0,
                -1.0,
                1.0 / 3.0,
                1.0 / 3.0,
                1.0 / 3.0,
                1.0 / 3.0,
                -1.0,
            ],
        );
        let r = Matrix::identity_plus_scaled(&q, 1.0);
        assert!(r.is_row_stochastic(1e-12));
        assert!((r[(0, 0)] - 0.0).abs() < 1e-12);
        assert!((r[(0, 1)] - 1.0 / 3.0).abs() < 1e-12);
    }
}
