//! Per-site substitution-count distributions.
//!
//! A postorder dynamic program over the tree. Each node `v` carries a
//! table `L[a][n] = P(data below v, n substitutions below v | v in state
//! a)`; branch-conditional tables combine child tables upward, and the
//! root folds in the equilibrium frequencies. Two root treatments are
//! provided: the scalar total count, and the bivariate decomposition into
//! left-subtree and right-subtree counts.

use crate::binding::ModelBinding;
use phy_core::{ensure, NodeId, Real, Result, Size, TupleIdx};
use phy_math::{Matrix, ProbMatrix, ProbVector};
use phy_model::{BranchDistrib, CharClass, JumpProcess, SubstModel};

/// Initial column capacity of a per-node DP table; tables grow to the
/// exact `maxsubst + 1` before filling.
const INITIAL_TABLE_COLS: usize = 500;

/// Per-node DP state: `l[a][n]`, with `n` bounded by `maxsubst`.
pub(crate) struct NodeTable {
    pub(crate) l: Vec<Vec<Real>>,
    pub(crate) maxsubst: Size,
}

impl NodeTable {
    fn with_cols(nstates: Size, cols: Size) -> Self {
        let mut l = Vec::with_capacity(nstates);
        for _ in 0..nstates {
            let mut row = Vec::with_capacity(INITIAL_TABLE_COLS.max(cols));
            row.resize(cols, 0.0);
            l.push(row);
        }
        Self {
            l,
            maxsubst: cols - 1,
        }
    }
}

/// Partial table of one child folded through its branch:
/// `out[a][j] = Σ_b Σ_i L_child[b][i] · d[a][b][j−i]`.
///
/// The split index `i` is clipped to `[max(0, j − ncols + 1),
/// min(j, maxsubst)]`; accumulation runs `b` outer, `i` inner, both
/// ascending.
fn fold_branch(child: &NodeTable, d: &BranchDistrib, nstates: Size) -> Vec<Vec<Real>> {
    let maxj = child.maxsubst + d.ncols() - 1;
    let mut out = vec![vec![0.0; maxj + 1]; nstates];
    for (a, row) in out.iter_mut().enumerate() {
        for (j, slot) in row.iter_mut().enumerate() {
            let i_min = j.saturating_sub(d.ncols() - 1);
            let i_max = j.min(child.maxsubst);
            let mut acc = 0.0;
            for b in 0..nstates {
                for i in i_min..=i_max {
                    acc += child.l[b][i] * d.prob(a, b, j - i);
                }
            }
            *slot = acc;
        }
    }
    out
}

/// Run the postorder DP, producing a table for every node.
///
/// `leaf_state` reports the observed state at a leaf: `Some(a)` for a
/// proper state, `None` to marginalize the leaf out (gaps, missing data,
/// or prior computations).
pub(crate) fn dp_tables(
    model: &SubstModel,
    jp: &JumpProcess,
    leaf_state: &dyn Fn(NodeId) -> Result<Option<Size>>,
) -> Result<Vec<Option<NodeTable>>> {
    let tree = model.tree();
    let s = model.alphabet().size();
    let mut tables: Vec<Option<NodeTable>> = (0..tree.nnodes()).map(|_| None).collect();

    for &id in tree.postorder() {
        let node = tree.node(id);
        let table = match (node.lchild, node.rchild) {
            (None, None) => {
                let mut t = NodeTable::with_cols(s, 1);
                match leaf_state(id)? {
                    Some(a) => t.l[a][0] = 1.0,
                    None => {
                        for a in 0..s {
                            t.l[a][0] = 1.0;
                        }
                    }
                }
                t
            }
            (Some(lc), Some(rc)) => {
                let dl = jp.branch_distrib(lc).ok_or_else(|| {
                    phy_core::Error::Config(format!("no branch table for node {lc}"))
                })?;
                let dr = jp.branch_distrib(rc).ok_or_else(|| {
                    phy_core::Error::Config(format!("no branch table for node {rc}"))
                })?;
                let tl = tables[lc].as_ref().ok_or_else(|| {
                    phy_core::Error::Config(format!("child {lc} visited before parent {id}"))
                })?;
                let tr = tables[rc].as_ref().ok_or_else(|| {
                    phy_core::Error::Config(format!("child {rc} visited before parent {id}"))
                })?;

                let left = fold_branch(tl, dl, s);
                let right = fold_branch(tr, dr, s);
                let maxl = tl.maxsubst + dl.ncols() - 1;
                let maxr = tr.maxsubst + dr.ncols() - 1;
                let maxv = maxl.max(maxr);

                let mut t = NodeTable::with_cols(s, maxv + 1);
                for a in 0..s {
                    for n in 0..=maxv {
                        let j_min = n.saturating_sub(maxr);
                        let j_max = n.min(maxl);
                        let mut acc = 0.0;
                        for j in j_min..=j_max {
                            acc += left[a][j] * right[a][n - j];
                        }
                        t.l[a][n] = acc;
                    }
                }
                t
            }
            _ => {
                return Err(phy_core::Error::Config(format!(
                    "node {id} has exactly one child"
                )))
            }
        };
        tables[id] = Some(table);
    }
    Ok(tables)
}

/// Fold the equilibrium frequencies into the root table and normalize.
pub(crate) fn scalar_from_tables(
    model: &SubstModel,
    tables: &[Option<NodeTable>],
) -> Result<ProbVector> {
    let root = model.tree().root();
    let table = tables[root]
        .as_ref()
        .ok_or_else(|| phy_core::Error::Config("root table missing".into()))?;
    let pi = model.backgd();
    let mut out = vec![0.0; table.maxsubst + 1];
    for (n, slot) in out.iter_mut().enumerate() {
        for a in 0..model.alphabet().size() {
            *slot += pi[a] * table.l[a][n];
        }
    }
    let mut p = ProbVector::from_vec(out);
    p.normalize()?;
    Ok(p)
}

/// Split the root fold into (left-subtree count, right-subtree count).
///
/// The left child is folded through its branch; the right subtree hangs
/// off the root at distance zero, so its own table supplies the second
/// axis unchanged.
pub(crate) fn joint_from_tables(
    model: &SubstModel,
    jp: &JumpProcess,
    tables: &[Option<NodeTable>],
) -> Result<ProbMatrix> {
    let tree = model.tree();
    let root = tree.node(tree.root());
    let (lc, rc) = match (root.lchild, root.rchild) {
        (Some(l), Some(r)) => (l, r),
        _ => {
            return Err(phy_core::Error::Config(
                "bivariate decomposition requires an internal root".into(),
            ))
        }
    };
    let s = model.alphabet().size();
    let dl = jp
        .branch_distrib(lc)
        .ok_or_else(|| phy_core::Error::Config(format!("no branch table for node {lc}")))?;
    let tl = tables[lc]
        .as_ref()
        .ok_or_else(|| phy_core::Error::Config("left child table missing".into()))?;
    let tr = tables[rc]
        .as_ref()
        .ok_or_else(|| phy_core::Error::Config("right child table missing".into()))?;

    let left = fold_branch(tl, dl, s);
    let maxl = tl.maxsubst + dl.ncols() - 1;
    let pi = model.backgd();

    let mut m = Matrix::zeros(maxl + 1, tr.maxsubst + 1);
    for n1 in 0..=maxl {
        for n2 in 0..=tr.maxsubst {
            let mut acc = 0.0;
            for a in 0..s {
                acc += pi[a] * left[a][n1] * tr.l[a][n2];
            }
            m[(n1, n2)] = acc;
        }
    }
    let mut p = ProbMatrix::from_matrix(m);
    p.normalize()?;
    Ok(p)
}

/// Leaf observation closure for an alignment column.
fn observed_states<'a>(
    binding: &'a ModelBinding<'a>,
    tuple: TupleIdx,
) -> impl Fn(NodeId) -> Result<Option<Size>> + 'a {
    move |node| {
        let row = binding.seq_idx(node)?;
        let c = binding.msa().tuple_char(tuple, row);
        match binding.model().alphabet().classify(c) {
            CharClass::State(a) => Ok(Some(a)),
            CharClass::Gap | CharClass::Missing => Ok(None),
            CharClass::Unknown => Err(phy_core::Error::Config(format!(
                "unparsable character '{c}' in alignment column"
            ))),
        }
    }
}

/// Posterior distribution of the total substitution count for one
/// alignment column, identified by its tuple index.
pub fn tuple_posterior(binding: &ModelBinding<'_>, tuple: TupleIdx) -> Result<ProbVector> {
    ensure!(
        tuple < binding.msa().ntuples(),
        Config,
        "tuple index {tuple} out of range ({} tuples)",
        binding.msa().ntuples()
    );
    let leaf = observed_states(binding, tuple);
    let tables = dp_tables(binding.model(), binding.jump_process(), &leaf)?;
    scalar_from_tables(binding.model(), &tables)
}

/// Joint posterior distribution of (left-subtree, right-subtree)
/// substitution counts for one alignment column.
pub fn tuple_posterior_joint(binding: &ModelBinding<'_>, tuple: TupleIdx) -> Result<ProbMatrix> {
    ensure!(
        tuple < binding.msa().ntuples(),
        Config,
        "tuple index {tuple} out of range ({} tuples)",
        binding.msa().ntuples()
    );
    let leaf = observed_states(binding, tuple);
    let tables = dp_tables(binding.model(), binding.jump_process(), &leaf)?;
    joint_from_tables(binding.model(), binding.jump_process(), &tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use phy_model::{Msa, TreeBuilder};

    fn jc_pair(d: Real) -> SubstModel {
        let mut b = TreeBuilder::new();
        let h = b.leaf("human");
        let c = b.leaf("chimp");
        let root = b.join(h, c, d, d);
        SubstModel::jukes_cantor(b.build(root).unwrap()).unwrap()
    }

    #[test]
    fn identical_pair_concentrates_at_zero() {
        let model = jc_pair(0.1);
        let jp = JumpProcess::build(&model).unwrap();
        let msa = Msa::new(
            vec!["human".into(), "chimp".into()],
            vec!["A".into(), "A".into()],
        )
        .unwrap();
        let binding = ModelBinding::new(&model, &jp, &msa).unwrap();
        let p = tuple_posterior(&binding, 0).unwrap();
        assert!(p[0] > 0.8, "P(N=0) = {}", p[0]);
        assert_abs_diff_eq!(p.sum(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn transversion_requires_a_substitution() {
        let model = jc_pair(0.1);
        let jp = JumpProcess::build(&model).unwrap();
        let msa = Msa::new(
            vec!["human".into(), "chimp".into()],
            vec!["A".into(), "T".into()],
        )
        .unwrap();
        let binding = ModelBinding::new(&model, &jp, &msa).unwrap();
        let p = tuple_posterior(&binding, 0).unwrap();
        assert_abs_diff_eq!(p[0], 0.0, epsilon = 1e-12);
        let (mean, _) = p.stats();
        assert!(mean >= 1.0, "mean {mean}");
    }

    #[test]
    fn gap_column_marginalizes_leaf() {
        let model = jc_pair(0.1);
        let jp = JumpProcess::build(&model).unwrap();
        let msa = Msa::new(
            vec!["human".into(), "chimp".into()],
            vec!["A".into(), "-".into()],
        )
        .unwrap();
        let binding = ModelBinding::new(&model, &jp, &msa).unwrap();
        let p = tuple_posterior(&binding, 0).unwrap();
        // One observed leaf constrains nothing about the count beyond the
        // prior on its own branch pair.
        assert!(p[0] > 0.7);
        assert_abs_diff_eq!(p.sum(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn unknown_character_is_fatal() {
        let model = jc_pair(0.1);
        let jp = JumpProcess::build(&model).unwrap();
        let msa = Msa::new(
            vec!["human".into(), "chimp".into()],
            vec!["A".into(), "X".into()],
        )
        .unwrap();
        let binding = ModelBinding::new(&model, &jp, &msa).unwrap();
        assert!(matches!(
            tuple_posterior(&binding, 0),
            Err(phy_core::Error::Config(_))
        ));
    }

    #[test]
    fn single_leaf_posterior_is_point_mass() {
        let mut b = TreeBuilder::new();
        let only = b.leaf("only");
        let model = SubstModel::jukes_cantor(b.build(only).unwrap()).unwrap();
        let jp = JumpProcess::build(&model).unwrap();
        let msa = Msa::new(vec!["only".into()], vec!["G".into()]).unwrap();
        let binding = ModelBinding::new(&model, &jp, &msa).unwrap();
        let p = tuple_posterior(&binding, 0).unwrap();
        assert_eq!(p.len(), 1);
        assert_abs_diff_eq!(p[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn joint_marginals_are_consistent() {
        let mut b = TreeBuilder::new();
        let h = b.leaf("human");
        let c = b.leaf("chimp");
        let g = b.leaf("gorilla");
        let hc = b.join(h, c, 0.05, 0.05);
        let root = b.join(hc, g, 0.05, 0.05);
        let model = SubstModel::jukes_cantor(b.build(root).unwrap()).unwrap();
        let jp = JumpProcess::build(&model).unwrap();
        let msa = Msa::new(
            vec!["human".into(), "chimp".into(), "gorilla".into()],
            vec!["A".into(), "A".into(), "C".into()],
        )
        .unwrap();
        let binding = ModelBinding::new(&model, &jp, &msa).unwrap();

        let joint = tuple_posterior_joint(&binding, 0).unwrap();
        assert_abs_diff_eq!(joint.sum(), 1.0, epsilon = 1e-6);

        // marg_x(P)[x] = sum_y P[x][y] by construction; check against the
        // direct matrix sums.
        let mx = joint.marg_x();
        for x in 0..mx.len() {
            let mut direct = 0.0;
            for y in 0..joint.ncols() {
                direct += joint[(x, y)];
            }
            assert_abs_diff_eq!(mx[x], direct, epsilon = 1e-12);
        }
    }

    #[test]
    fn joint_requires_internal_root() {
        let mut b = TreeBuilder::new();
        let only = b.leaf("only");
        let model = SubstModel::jukes_cantor(b.build(only).unwrap()).unwrap();
        let jp = JumpProcess::build(&model).unwrap();
        let msa = Msa::new(vec!["only".into()], vec!["G".into()]).unwrap();
        let binding = ModelBinding::new(&model, &jp, &msa).unwrap();
        assert!(tuple_posterior_joint(&binding, 0).is_err());
    }
}
