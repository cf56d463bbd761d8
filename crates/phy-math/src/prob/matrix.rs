//! `ProbMatrix` — a bivariate discrete distribution over a grid.
//!
//! Rows index the first count (`x`), columns the second (`y`). Used for
//! joint left-subtree × right-subtree substitution counts.

use super::vector::ProbVector;
use super::TRIM_EPS;
use crate::matrix::Matrix;
use phy_core::{ensure, fail, Real, Result, Size};
use std::ops::Index;

/// Moment statistics of a bivariate count distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointStats {
    /// Mean of the row count.
    pub mean_x: Real,
    /// Mean of the column count.
    pub mean_y: Real,
    /// Variance of the row count.
    pub var_x: Real,
    /// Variance of the column count.
    pub var_y: Real,
    /// Covariance of the two counts.
    pub cov: Real,
}

/// A probability distribution over the grid `(0 … nrows−1) × (0 … ncols−1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbMatrix(Matrix);

impl ProbMatrix {
    /// A point mass at `(x, y)`.
    pub fn point_mass(x: Size, y: Size) -> Self {
        let mut m = Matrix::zeros(x + 1, y + 1);
        m[(x, y)] = 1.0;
        Self(m)
    }

    /// Wrap raw weights without normalizing. Call [`normalize`] before
    /// treating the result as a distribution.
    ///
    /// [`normalize`]: ProbMatrix::normalize
    pub fn from_matrix(m: Matrix) -> Self {
        Self(m)
    }

    /// Number of rows (support of the first count).
    pub fn nrows(&self) -> usize {
        self.0.nrows()
    }

    /// Number of columns (support of the second count).
    pub fn ncols(&self) -> usize {
        self.0.ncols()
    }

    /// Total mass, accumulated row-major in index-ascending order.
    pub fn sum(&self) -> Real {
        let mut s = 0.0;
        for x in 0..self.nrows() {
            for y in 0..self.ncols() {
                s += self.0[(x, y)];
            }
        }
        s
    }

    /// Divide by the total mass and trim trailing rows and columns.
    ///
    /// Fails with a numerical error if the mass is zero, negative, or not
    /// finite.
    pub fn normalize(&mut self) -> Result<()> {
        let s = self.sum();
        ensure!(
            s.is_finite() && s > 0.0,
            Numerics,
            "cannot normalize bivariate distribution with total mass {s}"
        );
        self.0.scale_mut(1.0 / s);
        self.trim();
        Ok(())
    }

    /// Drop trailing rows and columns whose entries are all below
    /// [`TRIM_EPS`], keeping at least a 1×1 grid.
    pub fn trim(&mut self) {
        let mut rows = self.nrows();
        while rows > 1 && (0..self.ncols()).all(|y| self.0[(rows - 1, y)] < TRIM_EPS) {
            rows -= 1;
        }
        let mut cols = self.ncols();
        while cols > 1 && (0..rows).all(|x| self.0[(x, cols - 1)] < TRIM_EPS) {
            cols -= 1;
        }
        if rows < self.nrows() || cols < self.ncols() {
            let mut m = Matrix::zeros(rows, cols);
            for x in 0..rows {
                for y in 0..cols {
                    m[(x, y)] = self.0[(x, y)];
                }
            }
            self.0 = m;
        }
    }

    /// Marginal of the row count: `Σ_y p[x][y]`.
    pub fn marg_x(&self) -> ProbVector {
        let mut out = vec![0.0; self.nrows()];
        for (x, o) in out.iter_mut().enumerate() {
            for y in 0..self.ncols() {
                *o += self.0[(x, y)];
            }
        }
        let mut p = ProbVector::from_vec(out);
        p.trim_tail();
        p
    }

    /// Marginal of the column count: `Σ_x p[x][y]`.
    pub fn marg_y(&self) -> ProbVector {
        let mut out = vec![0.0; self.ncols()];
        for (y, o) in out.iter_mut().enumerate() {
            for x in 0..self.nrows() {
                *o += self.0[(x, y)];
            }
        }
        let mut p = ProbVector::from_vec(out);
        p.trim_tail();
        p
    }

    /// Distribution of the total `X + Y`, by anti-diagonal summation.
    pub fn marg_tot(&self) -> ProbVector {
        let mut out = vec![0.0; self.nrows() + self.ncols() - 1];
        for (s, o) in out.iter_mut().enumerate() {
            let x_min = s.saturating_sub(self.ncols() - 1);
            let x_max = s.min(self.nrows() - 1);
            for x in x_min..=x_max {
                *o += self.0[(x, s - x)];
            }
        }
        let mut p = ProbVector::from_vec(out);
        p.trim_tail();
        p
    }

    /// Conditional distribution of `X` given `X + Y = s`.
    ///
    /// Entry `x` is `p[x][s−x] / P(X+Y = s)`. Fails with a degeneracy error
    /// when the conditioning event has zero mass.
    pub fn x_given_tot(&self, s: Size) -> Result<ProbVector> {
        let x_min = s.saturating_sub(self.ncols() - 1);
        let x_max = s.min(self.nrows() - 1);
        if x_min > x_max {
            fail!(Degeneracy, "total count {s} outside the joint support");
        }
        let mut tot = 0.0;
        for x in x_min..=x_max {
            tot += self.0[(x, s - x)];
        }
        if tot <= 0.0 {
            fail!(Degeneracy, "total count {s} has zero probability");
        }
        let mut out = vec![0.0; x_max + 1];
        for x in x_min..=x_max {
            out[x] = self.0[(x, s - x)] / tot;
        }
        let mut p = ProbVector::from_vec(out);
        p.trim_tail();
        Ok(p)
    }

    /// Conditional distribution of `Y` given `X + Y = s`.
    ///
    /// Entry `y` is `p[s−y][y] / P(X+Y = s)`. Fails with a degeneracy error
    /// when the conditioning event has zero mass.
    pub fn y_given_tot(&self, s: Size) -> Result<ProbVector> {
        let y_min = s.saturating_sub(self.nrows() - 1);
        let y_max = s.min(self.ncols() - 1);
        if y_min > y_max {
            fail!(Degeneracy, "total count {s} outside the joint support");
        }
        let mut tot = 0.0;
        for y in y_min..=y_max {
            tot += self.0[(s - y, y)];
        }
        if tot <= 0.0 {
            fail!(Degeneracy, "total count {s} has zero probability");
        }
        let mut out = vec![0.0; y_max + 1];
        for y in y_min..=y_max {
            out[y] = self.0[(s - y, y)] / tot;
        }
        let mut p = ProbVector::from_vec(out);
        p.trim_tail();
        Ok(p)
    }

    /// Convolve with another bivariate distribution, truncating the output
    /// grid to `max_rows × max_cols`.
    ///
    /// Accumulation runs row-major over the output with the inner split
    /// indices ascending; mass beyond the truncation bounds is dropped and
    /// restored by the final normalization.
    pub fn convolve_with_bounded(
        &self,
        other: &ProbMatrix,
        max_rows: Size,
        max_cols: Size,
    ) -> Result<ProbMatrix> {
        ensure!(
            max_rows > 0 && max_cols > 0,
            Config,
            "convolution bounds must be positive, got {max_rows}x{max_cols}"
        );
        let rows = (self.nrows() + other.nrows() - 1).min(max_rows);
        let cols = (self.ncols() + other.ncols() - 1).min(max_cols);
        let mut m = Matrix::zeros(rows, cols);
        for x in 0..rows {
            let i_min = x.saturating_sub(other.nrows() - 1);
            let i_max = x.min(self.nrows() - 1);
            for y in 0..cols {
                let j_min = y.saturating_sub(other.ncols() - 1);
                let j_max = y.min(self.ncols() - 1);
                let mut acc = 0.0;
                for i in i_min..=i_max {
                    for j in j_min..=j_max {
                        acc += self.0[(i, j)] * other.0[(x - i, y - j)];
                    }
                }
                m[(x, y)] = acc;
            }
        }
        let mut out = ProbMatrix(m);
        out.normalize()?;
        Ok(out)
    }

    /// `k`-fold convolution of `self` with itself, by repeated squaring.
    pub fn convolve(&self, k: Size) -> Result<ProbMatrix> {
        let mut acc: Option<ProbMatrix> = None;
        let mut pow = self.clone();
        let mut k = k;
        while k > 0 {
            if k & 1 == 1 {
                acc = Some(match acc {
                    None => pow.clone(),
                    Some(a) => a.convolve_with_bounded(&pow, usize::MAX, usize::MAX)?,
                });
            }
            k >>= 1;
            if k > 0 {
                pow = pow.convolve_with_bounded(&pow, usize::MAX, usize::MAX)?;
            }
        }
        Ok(acc.unwrap_or_else(|| ProbMatrix::point_mass(0, 0)))
    }

    /// Convolve a sequence of bivariate distributions left to right,
    /// truncating every intermediate to `max_rows × max_cols`.
    pub fn convolve_many_fast(
        ps: &[&ProbMatrix],
        max_rows: Size,
        max_cols: Size,
    ) -> Result<ProbMatrix> {
        ensure!(!ps.is_empty(), Config, "no distributions to convolve");
        let mut acc = ps[0].clone();
        for p in &ps[1..] {
            acc = acc.convolve_with_bounded(p, max_rows, max_cols)?;
        }
        Ok(acc)
    }

    /// Moment statistics: marginal means and variances plus covariance.
    pub fn stats(&self) -> JointStats {
        let mut mean_x = 0.0;
        let mut mean_y = 0.0;
        let mut ex2 = 0.0;
        let mut ey2 = 0.0;
        let mut exy = 0.0;
        for x in 0..self.nrows() {
            for y in 0..self.ncols() {
                let p = self.0[(x, y)];
                mean_x += x as Real * p;
                mean_y += y as Real * p;
                ex2 += (x * x) as Real * p;
                ey2 += (y * y) as Real * p;
                exy += (x * y) as Real * p;
            }
        }
        JointStats {
            mean_x,
            mean_y,
            var_x: ex2 - mean_x * mean_x,
            var_y: ey2 - mean_y * mean_y,
            cov: exy - mean_x * mean_y,
        }
    }
}

impl Index<(usize, usize)> for ProbMatrix {
    type Output = Real;
    fn index(&self, (x, y): (usize, usize)) -> &Real {
        &self.0[(x, y)]
    }
}

/// Conditional distribution of `X` given `X + Y = s`, assuming the two
/// counts are independent with marginals `px` and `py`.
///
/// Entry `x` is `px[x]·py[s−x] / Σ_u px[u]·py[s−u]`. Used when the explicit
/// joint prior was skipped for very long features.
pub fn x_given_tot_indep(s: Size, px: &ProbVector, py: &ProbVector) -> Result<ProbVector> {
    let x_min = s.saturating_sub(py.len() - 1);
    let x_max = s.min(px.len() - 1);
    if x_min > x_max {
        fail!(Degeneracy, "total count {s} outside the joint support");
    }
    let mut denom = 0.0;
    for u in x_min..=x_max {
        denom += px[u] * py[s - u];
    }
    if denom <= 0.0 {
        fail!(Degeneracy, "total count {s} has zero probability under independence");
    }
    let mut out = vec![0.0; x_max + 1];
    for x in x_min..=x_max {
        out[x] = px[x] * py[s - x] / denom;
    }
    let mut p = ProbVector::from_vec(out);
    p.trim_tail();
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Product distribution of two independent marginals.
    fn product(px: &[Real], py: &[Real]) -> ProbMatrix {
        let mut m = Matrix::zeros(px.len(), py.len());
        for (x, &a) in px.iter().enumerate() {
            for (y, &b) in py.iter().enumerate() {
                m[(x, y)] = a * b;
            }
        }
        let mut p = ProbMatrix::from_matrix(m);
        p.normalize().unwrap();
        p
    }

    #[test]
    fn marginals_of_product() {
        let p = product(&[0.25, 0.75], &[0.5, 0.3, 0.2]);
        let mx = p.marg_x();
        assert_abs_diff_eq!(mx[0], 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(mx[1], 0.75, epsilon = 1e-12);
        let my = p.marg_y();
        assert_abs_diff_eq!(my[1], 0.3, epsilon = 1e-12);
    }

    #[test]
    fn marg_tot_matches_vector_convolution() {
        let px = {
            let mut p = ProbVector::from_vec(vec![0.25, 0.75]);
            p.normalize().unwrap();
            p
        };
        let py = {
            let mut p = ProbVector::from_vec(vec![0.5, 0.3, 0.2]);
            p.normalize().unwrap();
            p
        };
        let joint = product(&[0.25, 0.75], &[0.5, 0.3, 0.2]);
        let tot = joint.marg_tot();
        let conv = px.convolve_with(&py).unwrap();
        assert_eq!(tot.len(), conv.len());
        for s in 0..tot.len() {
            assert_abs_diff_eq!(tot[s], conv[s], epsilon = 1e-9);
        }
    }

    #[test]
    fn conditional_matches_independent_formula() {
        let px = {
            let mut p = ProbVector::from_vec(vec![0.25, 0.75]);
            p.normalize().unwrap();
            p
        };
        let py = {
            let mut p = ProbVector::from_vec(vec![0.5, 0.3, 0.2]);
            p.normalize().unwrap();
            p
        };
        let joint = product(&[0.25, 0.75], &[0.5, 0.3, 0.2]);
        let exact = joint.x_given_tot(2).unwrap();
        let indep = x_given_tot_indep(2, &px, &py).unwrap();
        assert_eq!(exact.len(), indep.len());
        for x in 0..exact.len() {
            assert_abs_diff_eq!(exact[x], indep[x], epsilon = 1e-9);
        }
    }

    #[test]
    fn conditioning_on_zero_mass_total_fails() {
        let p = ProbMatrix::point_mass(0, 0);
        assert!(matches!(
            p.x_given_tot(0),
            Ok(ref v) if v.len() == 1
        ));
        let q = product(&[1.0, 0.0], &[1.0, 0.0]);
        assert!(q.x_given_tot(2).is_err());
    }

    #[test]
    fn marginal_commutes_with_convolution() {
        let p = product(&[0.3, 0.7], &[0.6, 0.4]);
        let left = p.convolve(2).unwrap().marg_x();
        let right = p.marg_x().convolve(2).unwrap();
        assert_eq!(left.len(), right.len());
        for x in 0..left.len() {
            assert_abs_diff_eq!(left[x], right[x], epsilon = 1e-9);
        }
    }

    #[test]
    fn bounded_convolution_truncates_and_renormalizes() {
        let p = product(&[0.5, 0.5], &[0.5, 0.5]);
        let full = p.convolve(2).unwrap();
        assert_eq!((full.nrows(), full.ncols()), (3, 3));
        let bounded = p.convolve_with_bounded(&p, 2, 2).unwrap();
        assert_eq!((bounded.nrows(), bounded.ncols()), (2, 2));
        assert_abs_diff_eq!(bounded.sum(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn stats_of_independent_product_has_zero_cov() {
        let p = product(&[0.25, 0.75], &[0.5, 0.3, 0.2]);
        let s = p.stats();
        assert_abs_diff_eq!(s.mean_x, 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(s.cov, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn trim_drops_dead_rows_and_cols() {
        let mut m = Matrix::zeros(4, 4);
        m[(0, 0)] = 0.5;
        m[(1, 1)] = 0.5;
        let mut p = ProbMatrix::from_matrix(m);
        p.normalize().unwrap();
        assert_eq!((p.nrows(), p.ncols()), (2, 2));
    }
}
