//! `ProbVector` — a discrete distribution over counts `0 … N−1`.

use super::{Tail, TRIM_EPS};
use crate::vector::Vector;
use phy_core::{ensure, fail, Real, Result, Size};
use std::ops::Index;

/// A probability distribution over the contiguous support `0 … len−1`.
///
/// The vector is kept normalized by the operations that produce new
/// distributions; trailing entries below [`TRIM_EPS`] are dropped so the
/// reported support stays tight.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbVector(Vector);

impl ProbVector {
    /// A point mass at count `n` (support `0 … n`).
    pub fn point_mass(n: Size) -> Self {
        let mut v = Vector::zeros(n + 1);
        v[n] = 1.0;
        Self(v)
    }

    /// Wrap raw weights without normalizing. Call [`normalize`] before
    /// treating the result as a distribution.
    ///
    /// [`normalize`]: ProbVector::normalize
    pub fn from_vec(data: Vec<Real>) -> Self {
        Self(Vector::from_vec(data))
    }

    /// Support size.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Return `true` if the support is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The entries as a slice.
    pub fn as_slice(&self) -> &[Real] {
        self.0.as_slice()
    }

    /// Sum of all entries, accumulated in index-ascending order.
    pub fn sum(&self) -> Real {
        self.0.sum()
    }

    /// Divide by the total mass and trim the tail.
    ///
    /// Fails with a numerical error if the mass is zero, negative, or not
    /// finite.
    pub fn normalize(&mut self) -> Result<()> {
        let s = self.sum();
        ensure!(
            s.is_finite() && s > 0.0,
            Numerics,
            "cannot normalize distribution with total mass {s}"
        );
        self.0.scale_mut(1.0 / s);
        self.trim_tail();
        Ok(())
    }

    /// Drop trailing entries below [`TRIM_EPS`], keeping at least one.
    pub fn trim_tail(&mut self) {
        let mut n = self.0.len();
        while n > 1 && self.0[n - 1] < TRIM_EPS {
            n -= 1;
        }
        self.0.truncate(n);
    }

    /// Mean and variance of the count: `Σ i·p[i]` and `Σ i²·p[i] − mean²`.
    pub fn stats(&self) -> (Real, Real) {
        let mut mean = 0.0;
        let mut ex2 = 0.0;
        for (i, &p) in self.0.iter().enumerate() {
            mean += i as Real * p;
            ex2 += (i * i) as Real * p;
        }
        (mean, ex2 - mean * mean)
    }

    /// Smallest two-sided interval `(lo, hi)` containing mass ≥ `alpha`.
    ///
    /// Mass is removed from both tails until each has given up at most
    /// `(1 − alpha)/2`, so the interval is symmetric in mass. When two
    /// intervals qualify, the one with the smaller `lo` is produced.
    pub fn confidence_interval(&self, alpha: Real) -> Result<(Size, Size)> {
        ensure!(
            alpha > 0.0 && alpha <= 1.0,
            Config,
            "confidence level must be in (0, 1], got {alpha}"
        );
        let tail = (1.0 - alpha) / 2.0;

        let mut lo = 0;
        let mut mass = 0.0;
        while lo + 1 < self.len() && mass + self.0[lo] <= tail {
            mass += self.0[lo];
            lo += 1;
        }

        let mut hi = self.len() - 1;
        mass = 0.0;
        while hi > lo && mass + self.0[hi] <= tail {
            mass += self.0[hi];
            hi -= 1;
        }

        Ok((lo, hi))
    }

    /// Tail probability over the discrete support: `P(X ≤ x)` for
    /// [`Tail::Lower`], `P(X ≥ x)` for [`Tail::Upper`].
    ///
    /// `x` may be fractional (e.g. a posterior mean); only the integer
    /// support on the requested side contributes.
    pub fn p_value(&self, x: Real, tail: Tail) -> Real {
        match tail {
            Tail::Lower => {
                if x < 0.0 {
                    return 0.0;
                }
                let hi = (x.floor() as Size).min(self.len() - 1);
                (0..=hi).map(|i| self.0[i]).sum()
            }
            Tail::Upper => {
                let lo = x.ceil().max(0.0) as Size;
                if lo >= self.len() {
                    0.0
                } else {
                    (lo..self.len()).map(|i| self.0[i]).sum()
                }
            }
        }
    }

    /// Convolve with another distribution.
    ///
    /// The output entry `n` accumulates `Σ_i self[i] · other[n−i]` with `i`
    /// ascending, then the result is normalized and trimmed.
    pub fn convolve_with(&self, other: &ProbVector) -> Result<ProbVector> {
        let (la, lb) = (self.len(), other.len());
        if la == 0 || lb == 0 {
            fail!(Numerics, "cannot convolve an empty distribution");
        }
        let mut out = vec![0.0; la + lb - 1];
        for (n, o) in out.iter_mut().enumerate() {
            let i_min = n.saturating_sub(lb - 1);
            let i_max = n.min(la - 1);
            for i in i_min..=i_max {
                *o += self.0[i] * other.0[n - i];
            }
        }
        let mut out = ProbVector::from_vec(out);
        out.normalize()?;
        Ok(out)
    }

    /// `k`-fold convolution of `self` with itself, by repeated squaring
    /// over the binary expansion of `k`.
    ///
    /// `k = 0` yields the convolution identity (a point mass at 0).
    pub fn convolve(&self, k: Size) -> Result<ProbVector> {
        let mut acc: Option<ProbVector> = None;
        let mut pow = self.clone();
        let mut k = k;
        while k > 0 {
            if k & 1 == 1 {
                acc = Some(match acc {
                    None => pow.clone(),
                    Some(a) => a.convolve_with(&pow)?,
                });
            }
            k >>= 1;
            if k > 0 {
                pow = pow.convolve_with(&pow)?;
            }
        }
        Ok(acc.unwrap_or_else(|| ProbVector::point_mass(0)))
    }

    /// Convolve a collection of distributions together.
    ///
    /// With `counts`, each `ps[i]` is first convolved with itself
    /// `counts[i]` times (entries with count 0 contribute the identity).
    /// Convolution is commutative, so the combination order only affects
    /// intermediate support sizes; terms are combined smallest support
    /// first to keep intermediates tight, ties broken by original index so
    /// results are bit-reproducible.
    pub fn convolve_many(ps: &[ProbVector], counts: Option<&[Size]>) -> Result<ProbVector> {
        if let Some(c) = counts {
            ensure!(
                c.len() == ps.len(),
                Config,
                "counts length {} does not match distribution count {}",
                c.len(),
                ps.len()
            );
        }
        let mut terms: Vec<ProbVector> = Vec::with_capacity(ps.len());
        for (i, p) in ps.iter().enumerate() {
            match counts {
                Some(c) if c[i] == 0 => {}
                Some(c) => terms.push(p.convolve(c[i])?),
                None => terms.push(p.clone()),
            }
        }
        if terms.is_empty() {
            return Ok(ProbVector::point_mass(0));
        }
        terms.sort_by_key(|t| t.len());
        let mut iter = terms.into_iter();
        let mut acc = iter.next().expect("terms is non-empty");
        for t in iter {
            acc = acc.convolve_with(&t)?;
        }
        Ok(acc)
    }
}

impl Index<usize> for ProbVector {
    type Output = Real;
    fn index(&self, i: usize) -> &Real {
        &self.0[i]
    }
}

impl From<ProbVector> for Vector {
    fn from(p: ProbVector) -> Self {
        p.0
    }
}
