//! Rooted binary phylogenetic trees.
//!
//! Nodes live in an arena indexed by [`NodeId`]; the tree precomputes its
//! postorder and preorder traversals at construction so the dynamic
//! program can walk it without recursion. Trees are built programmatically
//! through [`TreeBuilder`]; file parsing belongs to the callers.

use phy_core::{ensure, BranchLength, NodeId, Result};

/// A node of a rooted binary tree.
///
/// Internal nodes have exactly two children; leaves have none and carry a
/// `name` linking them to alignment rows. `dparent` is the branch length
/// to the parent, absent at the root.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Stable index of this node in the tree's arena.
    pub id: NodeId,
    /// Parent node, absent at the root.
    pub parent: Option<NodeId>,
    /// Left child, absent at leaves.
    pub lchild: Option<NodeId>,
    /// Right child, absent at leaves.
    pub rchild: Option<NodeId>,
    /// Branch length to the parent, absent at the root.
    pub dparent: Option<BranchLength>,
    /// Leaf name, absent at internal nodes.
    pub name: Option<String>,
}

impl Node {
    /// Return `true` if this node has no children.
    pub fn is_leaf(&self) -> bool {
        self.lchild.is_none()
    }
}

/// A rooted binary phylogenetic tree with precomputed traversals.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
    postorder: Vec<NodeId>,
    preorder: Vec<NodeId>,
}

impl Tree {
    /// Total number of nodes.
    pub fn nnodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of leaves. For a binary tree this is `(nnodes + 1) / 2`.
    pub fn nleaves(&self) -> usize {
        (self.nodes.len() + 1) / 2
    }

    /// The root's id.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Borrow a node.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Children-before-parents traversal.
    pub fn postorder(&self) -> &[NodeId] {
        &self.postorder
    }

    /// Parents-before-children traversal.
    pub fn preorder(&self) -> &[NodeId] {
        &self.preorder
    }

    /// Iterator over the leaves, in postorder.
    pub fn leaves(&self) -> impl Iterator<Item = &Node> {
        self.postorder
            .iter()
            .map(|&id| &self.nodes[id])
            .filter(|n| n.is_leaf())
    }

    /// Sum of all branch lengths.
    pub fn total_branch_length(&self) -> BranchLength {
        self.nodes.iter().filter_map(|n| n.dparent).sum()
    }

    /// A copy of this tree with every branch length multiplied by
    /// `factor`. Deriving a slowed (conserved) model from a neutral one is
    /// the typical use.
    pub fn scale_branches(&self, factor: f64) -> Result<Tree> {
        ensure!(
            factor.is_finite() && factor >= 0.0,
            Config,
            "branch scale factor must be non-negative, got {factor}"
        );
        let mut t = self.clone();
        for n in &mut t.nodes {
            if let Some(d) = n.dparent.as_mut() {
                *d *= factor;
            }
        }
        Ok(t)
    }
}

/// Incremental builder for [`Tree`].
///
/// Create leaves, join pairs of subtrees bottom-up, then call
/// [`TreeBuilder::build`] with the final join's id as root.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    nodes: Vec<Node>,
}

impl TreeBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a leaf with the given name.
    pub fn leaf(&mut self, name: &str) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            id,
            parent: None,
            lchild: None,
            rchild: None,
            dparent: None,
            name: Some(name.to_string()),
        });
        id
    }

    /// Join two subtrees under a new internal node, attaching them with
    /// branch lengths `dleft` and `dright`.
    pub fn join(
        &mut self,
        left: NodeId,
        right: NodeId,
        dleft: BranchLength,
        dright: BranchLength,
    ) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            id,
            parent: None,
            lchild: Some(left),
            rchild: Some(right),
            dparent: None,
            name: None,
        });
        self.nodes[left].parent = Some(id);
        self.nodes[left].dparent = Some(dleft);
        self.nodes[right].parent = Some(id);
        self.nodes[right].dparent = Some(dright);
        id
    }

    /// Finish the tree rooted at `root`.
    ///
    /// Fails on negative branch lengths, on nodes left unattached, or if
    /// the structure is not a single binary tree.
    pub fn build(self, root: NodeId) -> Result<Tree> {
        ensure!(root < self.nodes.len(), Config, "root id {root} out of range");
        for n in &self.nodes {
            if n.id != root {
                ensure!(
                    n.parent.is_some(),
                    Config,
                    "node {} is not attached to the tree",
                    n.id
                );
            }
            if let Some(d) = n.dparent {
                ensure!(
                    d >= 0.0,
                    Config,
                    "negative branch length {d} above node {}",
                    n.id
                );
            }
            ensure!(
                n.lchild.is_some() == n.rchild.is_some(),
                Config,
                "node {} has exactly one child",
                n.id
            );
        }

        // Iterative postorder: children pushed right-first so the left
        // subtree is emitted first.
        let mut postorder = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded || self.nodes[id].is_leaf() {
                postorder.push(id);
                continue;
            }
            stack.push((id, true));
            if let (Some(l), Some(r)) = (self.nodes[id].lchild, self.nodes[id].rchild) {
                stack.push((r, false));
                stack.push((l, false));
            }
        }
        ensure!(
            postorder.len() == self.nodes.len(),
            Config,
            "tree rooted at {root} does not reach all {} nodes",
            self.nodes.len()
        );

        let mut preorder = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            preorder.push(id);
            if let (Some(l), Some(r)) = (self.nodes[id].lchild, self.nodes[id].rchild) {
                stack.push(r);
                stack.push(l);
            }
        }

        Ok(Tree {
            nodes: self.nodes,
            root,
            postorder,
            preorder,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn three_leaf_tree() -> Tree {
        let mut b = TreeBuilder::new();
        let h = b.leaf("human");
        let c = b.leaf("chimp");
        let g = b.leaf("gorilla");
        let hc = b.join(h, c, 0.05, 0.05);
        let root = b.join(hc, g, 0.05, 0.05);
        b.build(root).unwrap()
    }

    #[test]
    fn leaf_count_invariant() {
        let t = three_leaf_tree();
        assert_eq!(t.nnodes(), 5);
        assert_eq!(t.nleaves(), 3);
        assert_eq!(t.nleaves(), (t.nnodes() + 1) / 2);
    }

    #[test]
    fn traversal_orders() {
        let t = three_leaf_tree();
        // Postorder visits both children before the parent.
        let pos: Vec<usize> = (0..t.nnodes())
            .map(|id| t.postorder().iter().position(|&x| x == id).unwrap())
            .collect();
        for n in (0..t.nnodes()).map(|id| t.node(id)) {
            if let (Some(l), Some(r)) = (n.lchild, n.rchild) {
                assert!(pos[l] < pos[n.id] && pos[r] < pos[n.id]);
            }
        }
        assert_eq!(t.preorder()[0], t.root());
    }

    #[test]
    fn total_branch_length_and_scaling() {
        let t = three_leaf_tree();
        assert_abs_diff_eq!(t.total_branch_length(), 0.2, epsilon = 1e-12);
        let half = t.scale_branches(0.5).unwrap();
        assert_abs_diff_eq!(half.total_branch_length(), 0.1, epsilon = 1e-12);
        assert!(t.scale_branches(-1.0).is_err());
    }

    #[test]
    fn unattached_node_rejected() {
        let mut b = TreeBuilder::new();
        let h = b.leaf("human");
        let c = b.leaf("chimp");
        let _stray = b.leaf("stray");
        let root = b.join(h, c, 0.1, 0.1);
        assert!(b.build(root).is_err());
    }

    #[test]
    fn negative_branch_rejected() {
        let mut b = TreeBuilder::new();
        let h = b.leaf("human");
        let c = b.leaf("chimp");
        let root = b.join(h, c, -0.1, 0.1);
        assert!(b.build(root).is_err());
    }

    #[test]
    fn single_leaf_tree() {
        let mut b = TreeBuilder::new();
        let only = b.leaf("only");
        let t = b.build(only).unwrap();
        assert_eq!(t.nnodes(), 1);
        assert_eq!(t.nleaves(), 1);
        assert_abs_diff_eq!(t.total_branch_length(), 0.0, epsilon = 1e-15);
    }
}
