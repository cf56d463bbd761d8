//! Alignment column simulation.
//!
//! Draws columns from a substitution model by running the uniformized
//! chain down the tree: the root state comes from `π`, and each branch
//! applies a Poisson(λt) number of jumps through `R`. Used to calibrate
//! feature p-values against their neutral distribution.

use crate::jump::JumpProcess;
use crate::model::SubstModel;
use crate::msa::Msa;
use phy_core::{ensure, Result};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rand_distr::Poisson;

/// Simulate `ncols` alignment columns under `model` and return them as an
/// alignment over the tree's leaves.
pub fn simulate_columns<R: Rng>(
    model: &SubstModel,
    jp: &JumpProcess,
    ncols: usize,
    rng: &mut R,
) -> Result<Msa> {
    ensure!(ncols > 0, Config, "cannot simulate an empty alignment");
    let tree = model.tree();
    let alphabet = model.alphabet();
    let s = alphabet.size();

    let root_draw = WeightedIndex::new(model.backgd().iter().copied())
        .map_err(|e| phy_core::Error::Numerics(format!("bad equilibrium frequencies: {e}")))?;
    let mut jump_draw = Vec::with_capacity(s);
    for a in 0..s {
        let weights: Vec<f64> = (0..s).map(|b| jp.jump_matrix()[(a, b)]).collect();
        jump_draw.push(WeightedIndex::new(&weights).map_err(|e| {
            phy_core::Error::Numerics(format!("bad jump matrix row {a}: {e}"))
        })?);
    }

    let leaf_ids: Vec<usize> = tree.leaves().map(|n| n.id).collect();
    let mut rows: Vec<String> = vec![String::with_capacity(ncols); leaf_ids.len()];

    let mut states = vec![0usize; tree.nnodes()];
    for _ in 0..ncols {
        for &id in tree.preorder() {
            let node = tree.node(id);
            states[id] = match (node.parent, node.dparent) {
                (Some(parent), Some(t)) => {
                    let mut state = states[parent];
                    let mean = jp.lambda() * t;
                    if mean > 0.0 {
                        let pois = Poisson::new(mean).map_err(|e| {
                            phy_core::Error::Numerics(format!(
                                "bad Poisson mean {mean} on branch above node {id}: {e}"
                            ))
                        })?;
                        let jumps = pois.sample(rng) as usize;
                        for _ in 0..jumps {
                            state = jump_draw[state].sample(rng);
                        }
                    }
                    state
                }
                _ => root_draw.sample(rng),
            };
        }
        for (row, &id) in rows.iter_mut().zip(&leaf_ids) {
            row.push(alphabet.symbol(states[id]));
        }
    }

    let names = leaf_ids
        .iter()
        .map(|&id| {
            tree.node(id)
                .name
                .clone()
                .ok_or_else(|| phy_core::Error::Config(format!("leaf {id} has no name")))
        })
        .collect::<Result<Vec<_>>>()?;
    Msa::new(names, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeBuilder;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn jc_model(d: f64) -> SubstModel {
        let mut b = TreeBuilder::new();
        let h = b.leaf("human");
        let c = b.leaf("chimp");
        let root = b.join(h, c, d, d);
        SubstModel::jukes_cantor(b.build(root).unwrap()).unwrap()
    }

    #[test]
    fn simulated_alignment_has_requested_shape() {
        let model = jc_model(0.1);
        let jp = JumpProcess::build(&model).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let msa = simulate_columns(&model, &jp, 200, &mut rng).unwrap();
        assert_eq!(msa.nseqs(), 2);
        assert_eq!(msa.len(), 200);
        assert!(msa.row_of("human").is_some());
        assert!(msa.row_of("chimp").is_some());
    }

    #[test]
    fn short_branches_mostly_agree() {
        let model = jc_model(0.01);
        let jp = JumpProcess::build(&model).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let msa = simulate_columns(&model, &jp, 1000, &mut rng).unwrap();
        let mut same = 0;
        for pos in 0..msa.len() {
            let t = msa.tuple_idx(pos);
            if msa.tuple_char(t, 0) == msa.tuple_char(t, 1) {
                same += 1;
            }
        }
        // Two branches of 0.01 expected substitutions each.
        assert!(same > 950, "only {same}/1000 columns identical");
    }

    #[test]
    fn base_frequencies_near_uniform() {
        let model = jc_model(0.2);
        let jp = JumpProcess::build(&model).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let msa = simulate_columns(&model, &jp, 4000, &mut rng).unwrap();
        let mut counts = [0usize; 4];
        for pos in 0..msa.len() {
            let t = msa.tuple_idx(pos);
            let c = msa.tuple_char(t, 0);
            counts[model.alphabet().index(c).unwrap()] += 1;
        }
        for &c in &counts {
            let frac = c as f64 / 4000.0;
            assert!((frac - 0.25).abs() < 0.05, "frequency {frac} far from 0.25");
        }
    }
}
