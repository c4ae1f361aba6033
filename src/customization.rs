//! Weight customization: turning a [`CchStructure`] plus an input weight
//! vector into a query-ready [`Metric`].
//!
//! Customization is a full bottom-up pass over all triangles, O(number
//! of triangles) and independent of query volume; the same structure can
//! be customized any number of times with different weight vectors.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;
use std::time::Instant;

use log::info;

use crate::{
    constants::{Weight, INFINITY},
    error::CchError,
    graph::{EdgeIndex, NodeIndex},
    hierarchy::CchStructure,
};

/// Minimum arcs in a level before it is worth fanning out to threads.
const PARALLEL_LEVEL_CUTOFF: usize = 64;

/// A customized, query-ready weighting of a fixed CCH structure.
///
/// The weight state is shared mutable data: partial updates and
/// re-customization mutate it in place while queries read it. An
/// internal lock scoped to the weight vectors serializes mutations and
/// gives every query a consistent snapshot; the structure itself stays
/// immutable and lock-free.
pub struct Metric {
    structure: Arc<CchStructure>,
    state: RwLock<MetricState>,
}

pub(crate) struct MetricState {
    /// Current original input-arc weights, aligned to arc index.
    pub(crate) weights: Vec<Weight>,
    /// Per upward arc: weight of travel lo -> hi.
    pub(crate) fwd: Vec<Weight>,
    /// Per upward arc: weight of travel hi -> lo.
    pub(crate) bwd: Vec<Weight>,
}

/// Customizes `structure` with the given input weights.
///
/// Fails with `ArityMismatch` if the weight vector length differs from
/// the arc count and `NegativeWeight` on negative (or NaN) entries.
pub fn customize(structure: Arc<CchStructure>, weights: Vec<Weight>) -> Result<Metric, CchError> {
    validate_weights(&structure, &weights)?;

    let m = structure.up_arc_count();
    let mut state = MetricState {
        weights,
        fwd: vec![INFINITY; m],
        bwd: vec![INFINITY; m],
    };
    run_customization(&structure, &mut state);

    Ok(Metric {
        structure,
        state: RwLock::new(state),
    })
}

/// Parallel variant of [`customize`]: spreads each elimination-tree
/// level over `thread_count` workers. `thread_count == 0` uses the
/// available parallelism. The resulting state is identical to the
/// sequential pass.
pub fn customize_parallel(
    structure: Arc<CchStructure>,
    weights: Vec<Weight>,
    thread_count: usize,
) -> Result<Metric, CchError> {
    validate_weights(&structure, &weights)?;

    let threads = if thread_count == 0 {
        thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    } else {
        thread_count
    };

    let m = structure.up_arc_count();
    let mut state = MetricState {
        weights,
        fwd: vec![INFINITY; m],
        bwd: vec![INFINITY; m],
    };
    if threads <= 1 {
        run_customization(&structure, &mut state);
    } else {
        run_customization_parallel(&structure, &mut state, threads);
    }

    Ok(Metric {
        structure,
        state: RwLock::new(state),
    })
}

impl Metric {
    pub fn structure(&self) -> &Arc<CchStructure> {
        &self.structure
    }

    /// Snapshot of the current original-arc weights.
    pub fn weights(&self) -> Vec<Weight> {
        self.read_state().weights.clone()
    }

    /// Snapshot of the customized upward-arc weights as `(fwd, bwd)`
    /// vectors aligned to upward-arc indices. Two metrics over the same
    /// structure hold the same weighting iff these compare equal.
    pub fn shortcut_weights(&self) -> (Vec<Weight>, Vec<Weight>) {
        let state = self.read_state();
        (state.fwd.clone(), state.bwd.clone())
    }

    /// Re-runs full customization with a new weight vector, in place.
    ///
    /// Serializes against partial updates and other re-customizations;
    /// in-flight queries finish on the previous state first.
    pub fn recustomize(&self, weights: Vec<Weight>) -> Result<(), CchError> {
        validate_weights(&self.structure, &weights)?;
        let mut state = self.write_state();
        state.weights = weights;
        state.fwd.fill(INFINITY);
        state.bwd.fill(INFINITY);
        run_customization(&self.structure, &mut state);
        Ok(())
    }

    pub(crate) fn read_state(&self) -> RwLockReadGuard<'_, MetricState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn write_state(&self) -> RwLockWriteGuard<'_, MetricState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn validate_weights(structure: &CchStructure, weights: &[Weight]) -> Result<(), CchError> {
    if weights.len() != structure.input_arc_count() {
        return Err(CchError::ArityMismatch {
            expected: structure.input_arc_count(),
            got: weights.len(),
        });
    }
    for (arc, &w) in weights.iter().enumerate() {
        if !(w >= 0.0) {
            return Err(CchError::NegativeWeight { arc, weight: w });
        }
    }
    Ok(())
}

/// Full customization pass: arcs are processed grouped by the rank of
/// their lower endpoint, so every lower triangle references already
/// final arcs.
fn run_customization(structure: &CchStructure, state: &mut MetricState) {
    let now = Instant::now();
    for rank in 0..structure.node_count() {
        let node = structure.order.node_at(rank);
        for &arc in &structure.up_adj[node.index()] {
            let (fwd, bwd) = compute_arc_weights(structure, state, arc);
            state.fwd[arc.index()] = fwd;
            state.bwd[arc.index()] = bwd;
        }
    }
    info!(
        "Customized {} upward arcs in {:?}",
        structure.up_arc_count(),
        now.elapsed()
    );
}

/// Level-parallel customization. An arc's triangles only reference arcs
/// whose lower endpoint is a strict elimination-tree descendant of its
/// own, so arcs grouped by the subtree height of their lower endpoint
/// are independent within a group once all lower groups are final.
fn run_customization_parallel(structure: &CchStructure, state: &mut MetricState, threads: usize) {
    let now = Instant::now();
    let n = structure.node_count();

    let mut height = vec![0usize; n];
    let mut max_height = 0;
    for rank in 0..n {
        let node = structure.order.node_at(rank);
        let parent = structure.parent[node.index()];
        if parent != NodeIndex::end() {
            let h = height[node.index()] + 1;
            if h > height[parent.index()] {
                height[parent.index()] = h;
            }
        }
        max_height = max_height.max(height[node.index()]);
    }

    let mut levels: Vec<Vec<EdgeIndex>> = vec![Vec::new(); max_height + 1];
    for node in 0..n {
        for &arc in &structure.up_adj[node] {
            levels[height[node]].push(arc);
        }
    }

    for level in &levels {
        if level.len() < PARALLEL_LEVEL_CUTOFF {
            for &arc in level {
                let (fwd, bwd) = compute_arc_weights(structure, state, arc);
                state.fwd[arc.index()] = fwd;
                state.bwd[arc.index()] = bwd;
            }
            continue;
        }

        // Workers read the frozen lower levels and return their chunk's
        // results; the write-back happens single-threaded afterwards.
        let chunk_size = (level.len() + threads - 1) / threads;
        let frozen: &MetricState = state;
        let mut results: Vec<Vec<(EdgeIndex, Weight, Weight)>> = Vec::new();
        thread::scope(|scope| {
            let handles: Vec<_> = level
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|&arc| {
                                let (fwd, bwd) = compute_arc_weights(structure, frozen, arc);
                                (arc, fwd, bwd)
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            results = handles.into_iter().map(|h| h.join().unwrap()).collect();
        });
        for chunk in results {
            for (arc, fwd, bwd) in chunk {
                state.fwd[arc.index()] = fwd;
                state.bwd[arc.index()] = bwd;
            }
        }
    }

    info!(
        "Customized {} upward arcs across {} levels with {} threads in {:?}",
        structure.up_arc_count(),
        levels.len(),
        threads,
        now.elapsed()
    );
}

/// Weight of one upward arc from scratch: minimum over its mapped input
/// arcs and its lower triangles. Shared with the partial updater so both
/// paths produce bit-identical results.
pub(crate) fn compute_arc_weights(
    structure: &CchStructure,
    state: &MetricState,
    arc: EdgeIndex,
) -> (Weight, Weight) {
    let mut fwd = INFINITY;
    let mut bwd = INFINITY;
    for &input in &structure.fwd_inputs[arc.index()] {
        fwd = fwd.min(state.weights[input.index()]);
    }
    for &input in &structure.bwd_inputs[arc.index()] {
        bwd = bwd.min(state.weights[input.index()]);
    }
    for &[al, au] in &structure.triangles[arc.index()] {
        fwd = fwd.min(state.bwd[al.index()] + state.fwd[au.index()]);
        bwd = bwd.min(state.fwd[al.index()] + state.bwd[au.index()]);
    }
    (fwd, bwd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        contraction::build_structure,
        graph::Graph,
        ordering::{compute_order, NodeOrder},
        util::test_graphs::{complex_graph, line_graph},
    };

    /// Shortest s -> t distance allowing only intermediate nodes of rank
    /// below `max_rank`, by Bellman-Ford over the input arcs.
    fn restricted_dist(
        g: &Graph,
        weights: &[Weight],
        order: &NodeOrder,
        s: usize,
        t: usize,
        max_rank: usize,
    ) -> Weight {
        let mut dist = vec![INFINITY; g.node_count];
        dist[s] = 0.0;
        for _ in 0..g.node_count {
            for (i, edge) in g.edges().enumerate() {
                let u = edge.source.index();
                if u != s && order.rank(edge.source) >= max_rank {
                    continue;
                }
                let d = dist[u] + weights[i];
                if d < dist[edge.target.index()] {
                    dist[edge.target.index()] = d;
                }
            }
        }
        dist[t]
    }

    #[test]
    fn shortcut_weights_are_lower_rank_distances() {
        let (node_count, tail, head, weights) = complex_graph();
        let order = compute_order(node_count, &tail, &head).unwrap();
        let cch = Arc::new(build_structure(&order, &tail, &head, false).unwrap());
        let g = Graph::from_arcs(node_count, &tail, &head).unwrap();

        let metric = customize(cch.clone(), weights.clone()).unwrap();
        let state = metric.read_state();

        for arc in 0..cch.up_arc_count() {
            let up = cch.up_arc(crate::graph::edge_index(arc));
            let max_rank = order.rank(up.lo);
            let expected =
                restricted_dist(&g, &weights, &order, up.lo.index(), up.hi.index(), max_rank);
            let got = state.fwd[arc];
            if expected == INFINITY || got == INFINITY {
                assert_eq!(expected, got);
            } else {
                approx::assert_abs_diff_eq!(expected, got, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn line_graph_weights() {
        let (tail, head, weights) = line_graph();
        let order = NodeOrder::from_raw(&[0, 1, 2, 3]).unwrap();
        let cch = Arc::new(build_structure(&order, &tail, &head, true).unwrap());

        let metric = customize(cch, weights.clone()).unwrap();

        let state = metric.read_state();
        assert_eq!(state.fwd, vec![10.0, 5.0, 7.0]);
        assert_eq!(state.bwd, vec![INFINITY, INFINITY, INFINITY]);
        drop(state);
        assert_eq!(metric.weights(), weights);
    }

    #[test]
    fn shortcut_takes_triangle_minimum() {
        // Triangle 0 - 1 - 2 with a direct 0 - 2 edge; node 1 first.
        let tail = [0, 1, 1, 2, 0, 2];
        let head = [1, 0, 2, 1, 2, 0];
        let order = NodeOrder::from_raw(&[1, 0, 2]).unwrap();
        let cch = Arc::new(build_structure(&order, &tail, &head, false).unwrap());

        // Path through 1 (2 + 3) beats the direct edge (10).
        let metric = customize(cch.clone(), vec![2.0, 2.0, 3.0, 3.0, 10.0, 10.0]).unwrap();
        let state = metric.read_state();
        let direct = cch.input_to_up[4];
        assert_eq!(state.fwd[direct.index()], 5.0);
        assert_eq!(state.bwd[direct.index()], 5.0);
        drop(state);

        // Direct edge (4) beats the detour (6 + 6).
        metric.recustomize(vec![6.0, 6.0, 6.0, 6.0, 4.0, 4.0]).unwrap();
        let state = metric.read_state();
        assert_eq!(state.fwd[direct.index()], 4.0);
    }

    #[test]
    fn parallel_matches_sequential() {
        use rand::prelude::*;

        // Ring plus random chords, large enough that whole levels go
        // through the threaded branch.
        let mut rng: StdRng = SeedableRng::seed_from_u64(21);
        let node_count = 400usize;
        let mut tail = Vec::new();
        let mut head = Vec::new();
        let mut weights: Vec<Weight> = Vec::new();
        for u in 0..node_count {
            tail.push(u as u32);
            head.push(((u + 1) % node_count) as u32);
            weights.push(rng.gen_range(1.0..50.0));
        }
        for _ in 0..1200 {
            tail.push(rng.gen_range(0..node_count) as u32);
            head.push(rng.gen_range(0..node_count) as u32);
            weights.push(rng.gen_range(1.0..50.0));
        }

        let order = compute_order(node_count, &tail, &head).unwrap();
        let cch = Arc::new(build_structure(&order, &tail, &head, true).unwrap());

        let sequential = customize(cch.clone(), weights.clone()).unwrap();
        let parallel = customize_parallel(cch.clone(), weights.clone(), 4).unwrap();
        let default_threads = customize_parallel(cch, weights, 0).unwrap();

        assert_eq!(sequential.shortcut_weights(), parallel.shortcut_weights());
        assert_eq!(sequential.shortcut_weights(), default_threads.shortcut_weights());
    }

    #[test]
    fn rejects_wrong_arity() {
        let (tail, head, _) = line_graph();
        let order = NodeOrder::from_raw(&[0, 1, 2, 3]).unwrap();
        let cch = Arc::new(build_structure(&order, &tail, &head, true).unwrap());

        assert!(matches!(
            customize(cch, vec![1.0, 2.0]),
            Err(CchError::ArityMismatch { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn rejects_negative_weight() {
        let (tail, head, _) = line_graph();
        let order = NodeOrder::from_raw(&[0, 1, 2, 3]).unwrap();
        let cch = Arc::new(build_structure(&order, &tail, &head, true).unwrap());

        assert!(matches!(
            customize(cch, vec![1.0, -2.0, 3.0]),
            Err(CchError::NegativeWeight { arc: 1, .. })
        ));
    }
}
