//! Model–alignment binding.
//!
//! The tree DP needs to know which alignment row each leaf observes. The
//! mapping is looked up by leaf name, built on first use, and cached for
//! the lifetime of the binding.

use phy_core::{ensure, NodeId, Result, Size};
use phy_model::{JumpProcess, Msa, SubstModel};
use std::cell::OnceCell;

/// A substitution model, its jump process, and an alignment, bound
/// together for per-site queries.
#[derive(Debug)]
pub struct ModelBinding<'a> {
    model: &'a SubstModel,
    jp: &'a JumpProcess,
    msa: &'a Msa,
    seq_idx: OnceCell<Vec<Option<Size>>>,
}

impl<'a> ModelBinding<'a> {
    /// Bind a model and its jump process to an alignment.
    ///
    /// The substitution-count machinery only supports order-0 models.
    pub fn new(model: &'a SubstModel, jp: &'a JumpProcess, msa: &'a Msa) -> Result<Self> {
        ensure!(
            model.order() == 0,
            Config,
            "substitution counting requires a model of order 0, got order {}",
            model.order()
        );
        Ok(Self {
            model,
            jp,
            msa,
            seq_idx: OnceCell::new(),
        })
    }

    /// The bound model.
    pub fn model(&self) -> &SubstModel {
        self.model
    }

    /// The bound jump process.
    pub fn jump_process(&self) -> &JumpProcess {
        self.jp
    }

    /// The bound alignment.
    pub fn msa(&self) -> &Msa {
        self.msa
    }

    /// Alignment row observed at leaf `node`, from the lazily built
    /// leaf-name index.
    pub fn seq_idx(&self, node: NodeId) -> Result<Size> {
        if self.seq_idx.get().is_none() {
            let built = self.build_seq_idx()?;
            let _ = self.seq_idx.set(built);
        }
        match self.seq_idx.get().and_then(|v| v[node]) {
            Some(row) => Ok(row),
            None => Err(phy_core::Error::Config(format!(
                "node {node} is not a leaf bound to an alignment row"
            ))),
        }
    }

    fn build_seq_idx(&self) -> Result<Vec<Option<Size>>> {
        let tree = self.model.tree();
        let mut idx = vec![None; tree.nnodes()];
        for leaf in tree.leaves() {
            let name = leaf.name.as_deref().ok_or_else(|| {
                phy_core::Error::Config(format!("leaf {} has no name", leaf.id))
            })?;
            let row = self.msa.row_of(name).ok_or_else(|| {
                phy_core::Error::Config(format!(
                    "leaf '{name}' has no matching sequence in the alignment"
                ))
            })?;
            idx[leaf.id] = Some(row);
        }
        Ok(idx)
    }
}
