//! In-memory multiple sequence alignments with sufficient statistics.
//!
//! The engine never walks raw columns: identical columns are collapsed
//! into distinct tuples with counts, and per-site computations are keyed
//! by tuple index. File formats are the callers' concern.

use phy_core::{ensure, Result, Size, TupleIdx};
use std::collections::HashMap;

/// A multiple sequence alignment plus its sufficient statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct Msa {
    names: Vec<String>,
    ncols: usize,
    tuples: Vec<Vec<char>>,
    tuple_idx: Vec<TupleIdx>,
    counts: Vec<usize>,
}

impl Msa {
    /// Build an alignment from sequence names and equal-length rows, and
    /// derive its sufficient statistics.
    ///
    /// Tuples are numbered in order of first appearance, so statistics are
    /// reproducible across runs.
    pub fn new(names: Vec<String>, rows: Vec<String>) -> Result<Self> {
        ensure!(!names.is_empty(), Config, "alignment has no sequences");
        ensure!(
            names.len() == rows.len(),
            Config,
            "{} names for {} sequences",
            names.len(),
            rows.len()
        );
        let rows: Vec<Vec<char>> = rows.iter().map(|r| r.chars().collect()).collect();
        let ncols = rows[0].len();
        ensure!(ncols > 0, Config, "alignment has no columns");
        for (name, row) in names.iter().zip(&rows) {
            ensure!(
                row.len() == ncols,
                Config,
                "sequence '{name}' has length {}, expected {ncols}",
                row.len()
            );
        }
        for (i, name) in names.iter().enumerate() {
            ensure!(
                !names[..i].contains(name),
                Config,
                "duplicate sequence name '{name}'"
            );
        }

        let mut tuples: Vec<Vec<char>> = Vec::new();
        let mut counts: Vec<usize> = Vec::new();
        let mut tuple_idx = Vec::with_capacity(ncols);
        let mut seen: HashMap<Vec<char>, TupleIdx> = HashMap::new();
        for col in 0..ncols {
            let tuple: Vec<char> = rows.iter().map(|r| r[col]).collect();
            let idx = match seen.get(&tuple) {
                Some(&i) => i,
                None => {
                    let i = tuples.len();
                    seen.insert(tuple.clone(), i);
                    tuples.push(tuple);
                    counts.push(0);
                    i
                }
            };
            counts[idx] += 1;
            tuple_idx.push(idx);
        }

        Ok(Self {
            names,
            ncols,
            tuples,
            tuple_idx,
            counts,
        })
    }

    /// Number of sequences (rows).
    pub fn nseqs(&self) -> usize {
        self.names.len()
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.ncols
    }

    /// Return `true` if the alignment has no columns.
    pub fn is_empty(&self) -> bool {
        self.ncols == 0
    }

    /// Number of distinct column tuples.
    pub fn ntuples(&self) -> usize {
        self.tuples.len()
    }

    /// Tuple index of column `pos`.
    pub fn tuple_idx(&self, pos: usize) -> TupleIdx {
        self.tuple_idx[pos]
    }

    /// Number of columns collapsed into tuple `t`.
    pub fn tuple_count(&self, t: TupleIdx) -> usize {
        self.counts[t]
    }

    /// Character of sequence `seq` in tuple `t`.
    pub fn tuple_char(&self, t: TupleIdx, seq: Size) -> char {
        self.tuples[t][seq]
    }

    /// Sequence names, in row order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Row index of the sequence with the given name.
    pub fn row_of(&self, name: &str) -> Option<Size> {
        self.names.iter().position(|n| n == name)
    }
}
