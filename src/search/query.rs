//! Point-to-point queries on a customized [`Metric`].
//!
//! The search is bidirectional and guided by the elimination tree: both
//! frontiers move strictly upward in rank along the upward-arc graph
//! (forward with forward weights from the sources, backward with
//! backward weights from the targets), meet at common ancestors, and the
//! winning meeting node is unwound with shortcut unpacking into the
//! original arc path.

use std::collections::BinaryHeap;
use std::{cell::Cell, cmp::Reverse, marker::PhantomData};

use log::debug;

use crate::{
    constants::{Weight, INFINITY},
    customization::{Metric, MetricState},
    error::CchError,
    graph::{EdgeIndex, NodeIndex},
    search::ShortestPath,
    statistics::SearchStats,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Fwd,
    Bwd,
}

/// A reusable query instance bound to one metric.
///
/// Owns per-query scratch (distance labels, predecessor arcs, generation
/// marks) sized to the node count, reset in O(1) between runs. Not
/// shareable between threads: each worker creates its own instance via
/// [`CchQuery::new`]; the shared metric itself supports any number of
/// concurrently active instances.
pub struct CchQuery<'a> {
    metric: &'a Metric,
    pub stats: SearchStats,

    dist_fwd: Vec<Weight>,
    dist_bwd: Vec<Weight>,
    pred_fwd: Vec<EdgeIndex>,
    pred_bwd: Vec<EdgeIndex>,
    mark_fwd: Vec<u32>,
    mark_bwd: Vec<u32>,
    gen_fwd: u32,
    gen_bwd: u32,
    touched_fwd: Vec<NodeIndex>,
    touched_bwd: Vec<NodeIndex>,

    // Send but not Sync: concurrent runs would race on the scratch.
    _marker: PhantomData<Cell<()>>,
}

impl<'a> CchQuery<'a> {
    pub fn new(metric: &'a Metric) -> Self {
        let n = metric.structure().node_count();
        CchQuery {
            metric,
            stats: SearchStats::default(),
            dist_fwd: vec![INFINITY; n],
            dist_bwd: vec![INFINITY; n],
            pred_fwd: vec![EdgeIndex::end(); n],
            pred_bwd: vec![EdgeIndex::end(); n],
            mark_fwd: vec![0; n],
            mark_bwd: vec![0; n],
            gen_fwd: 0,
            gen_bwd: 0,
            touched_fwd: Vec::new(),
            touched_bwd: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Runs a single point-to-point query.
    ///
    /// Returns `None` if `target` is unreachable; that is a normal
    /// result, not an error. The returned arc path references original
    /// input arcs and sums exactly to the returned weight.
    pub fn run(
        &mut self,
        source: NodeIndex,
        target: NodeIndex,
    ) -> Result<Option<ShortestPath>, CchError> {
        self.check_node(source)?;
        self.check_node(target)?;
        self.stats.init();

        if source == target {
            self.stats.finish();
            return Ok(Some(ShortestPath::new(0.0, vec![source], vec![])));
        }

        let state = self.metric.read_state();
        self.sweep(&state, Direction::Fwd, &[(source, 0.0)]);
        self.sweep(&state, Direction::Bwd, &[(target, 0.0)]);

        let Some((meeting, weight)) = self.best_meeting(Direction::Fwd) else {
            self.stats.finish();
            debug!("No path from {:?} to {:?}", source, target);
            return Ok(None);
        };
        debug!("Meeting node {:?}, distance {}", meeting, weight);

        let sp = self.unwind(&state, source, meeting, weight);
        self.stats.finish();
        Ok(Some(sp))
    }

    /// Distances from one source to many targets. The forward sweep runs
    /// once and is shared across the whole batch.
    pub fn run_one_to_many(
        &mut self,
        source: NodeIndex,
        targets: &[NodeIndex],
    ) -> Result<Vec<Option<Weight>>, CchError> {
        self.check_node(source)?;
        for &t in targets {
            self.check_node(t)?;
        }
        self.stats.init();

        let state = self.metric.read_state();
        self.sweep(&state, Direction::Fwd, &[(source, 0.0)]);

        let mut results = Vec::with_capacity(targets.len());
        for &t in targets {
            self.sweep(&state, Direction::Bwd, &[(t, 0.0)]);
            results.push(self.best_meeting(Direction::Bwd).map(|(_, w)| w));
        }
        self.stats.finish();
        Ok(results)
    }

    /// Distances from many sources to one target; the backward sweep is
    /// shared across the batch.
    pub fn run_many_to_one(
        &mut self,
        sources: &[NodeIndex],
        target: NodeIndex,
    ) -> Result<Vec<Option<Weight>>, CchError> {
        self.check_node(target)?;
        for &s in sources {
            self.check_node(s)?;
        }
        self.stats.init();

        let state = self.metric.read_state();
        self.sweep(&state, Direction::Bwd, &[(target, 0.0)]);

        let mut results = Vec::with_capacity(sources.len());
        for &s in sources {
            self.sweep(&state, Direction::Fwd, &[(s, 0.0)]);
            results.push(self.best_meeting(Direction::Fwd).map(|(_, w)| w));
        }
        self.stats.finish();
        Ok(results)
    }

    /// Best distance between any added source and any added target, each
    /// carrying an initial-distance offset (0 for plain shortest paths).
    pub fn run_multi_st_with_dist(
        &mut self,
        sources: &[(NodeIndex, Weight)],
        targets: &[(NodeIndex, Weight)],
    ) -> Result<Option<Weight>, CchError> {
        for &(s, _) in sources {
            self.check_node(s)?;
        }
        for &(t, _) in targets {
            self.check_node(t)?;
        }
        self.stats.init();

        let state = self.metric.read_state();
        self.sweep(&state, Direction::Fwd, sources);
        self.sweep(&state, Direction::Bwd, targets);
        let best = self.best_meeting(Direction::Fwd).map(|(_, w)| w);
        self.stats.finish();
        Ok(best)
    }

    fn check_node(&self, node: NodeIndex) -> Result<(), CchError> {
        let node_count = self.metric.structure().node_count();
        if node.index() >= node_count {
            return Err(CchError::InvalidNode {
                node: node.index(),
                node_count,
            });
        }
        Ok(())
    }

    /// One upward sweep. Labels live only on elimination-tree ancestors
    /// of the start nodes; processing in ascending rank makes each node
    /// final when popped, so no decrease-key is needed.
    fn sweep(&mut self, state: &MetricState, dir: Direction, starts: &[(NodeIndex, Weight)]) {
        let structure = self.metric.structure();
        let (dist, pred, mark, gen, touched) = match dir {
            Direction::Fwd => {
                bump(&mut self.gen_fwd, &mut self.mark_fwd);
                (
                    &mut self.dist_fwd,
                    &mut self.pred_fwd,
                    &mut self.mark_fwd,
                    self.gen_fwd,
                    &mut self.touched_fwd,
                )
            }
            Direction::Bwd => {
                bump(&mut self.gen_bwd, &mut self.mark_bwd);
                (
                    &mut self.dist_bwd,
                    &mut self.pred_bwd,
                    &mut self.mark_bwd,
                    self.gen_bwd,
                    &mut self.touched_bwd,
                )
            }
        };
        touched.clear();

        let mut queue: BinaryHeap<Reverse<(usize, u32)>> = BinaryHeap::new();
        for &(node, offset) in starts {
            if mark[node.index()] == gen {
                dist[node.index()] = dist[node.index()].min(offset);
                continue;
            }
            mark[node.index()] = gen;
            dist[node.index()] = offset;
            pred[node.index()] = EdgeIndex::end();
            touched.push(node);
            queue.push(Reverse((structure.order().rank(node), node.index() as u32)));
        }

        while let Some(Reverse((_, node))) = queue.pop() {
            let node = NodeIndex::new(node as usize);
            self.stats.nodes_settled += 1;
            let d = dist[node.index()];

            for &arc in &structure.up_adj[node.index()] {
                let weight = match dir {
                    Direction::Fwd => state.fwd[arc.index()],
                    Direction::Bwd => state.bwd[arc.index()],
                };
                let new_dist = d + weight;
                if new_dist == INFINITY {
                    continue;
                }
                let hi = structure.up_arc(arc).hi;
                if mark[hi.index()] != gen {
                    mark[hi.index()] = gen;
                    dist[hi.index()] = new_dist;
                    pred[hi.index()] = arc;
                    touched.push(hi);
                    queue.push(Reverse((structure.order().rank(hi), hi.index() as u32)));
                } else if new_dist < dist[hi.index()] {
                    dist[hi.index()] = new_dist;
                    pred[hi.index()] = arc;
                }
            }
        }
    }

    /// Best meeting node over the touched set of `side`, by summed
    /// distance; first minimum in sweep order wins, so results are
    /// deterministic.
    fn best_meeting(&self, side: Direction) -> Option<(NodeIndex, Weight)> {
        let touched = match side {
            Direction::Fwd => &self.touched_fwd,
            Direction::Bwd => &self.touched_bwd,
        };
        let mut best = None;
        let mut best_dist = INFINITY;
        for &node in touched {
            if self.mark_fwd[node.index()] == self.gen_fwd
                && self.mark_bwd[node.index()] == self.gen_bwd
            {
                let d = self.dist_fwd[node.index()] + self.dist_bwd[node.index()];
                if d < best_dist {
                    best_dist = d;
                    best = Some(node);
                }
            }
        }
        best.map(|node| (node, best_dist))
    }

    /// Unwinds both predecessor chains from the meeting node and expands
    /// every upward arc into original input arcs.
    fn unwind(
        &self,
        state: &MetricState,
        source: NodeIndex,
        meeting: NodeIndex,
        weight: Weight,
    ) -> ShortestPath {
        let structure = self.metric.structure();

        // Upward arcs source -> meeting (collected backwards), then
        // meeting -> target (already in traversal order).
        let mut sequence: Vec<(EdgeIndex, Direction)> = Vec::new();
        let mut node = meeting;
        while self.pred_fwd[node.index()] != EdgeIndex::end() {
            let arc = self.pred_fwd[node.index()];
            sequence.push((arc, Direction::Fwd));
            node = structure.up_arc(arc).lo;
        }
        sequence.reverse();
        let mut node = meeting;
        while self.pred_bwd[node.index()] != EdgeIndex::end() {
            let arc = self.pred_bwd[node.index()];
            sequence.push((arc, Direction::Bwd));
            node = structure.up_arc(arc).lo;
        }

        let arcs = self.unpack(state, &sequence);

        let mut nodes = Vec::with_capacity(arcs.len() + 1);
        nodes.push(source);
        let mut current = source;
        for &arc in &arcs {
            let (tail, head) = structure.input_arc(arc);
            current = if tail == current { head } else { tail };
            nodes.push(current);
        }

        ShortestPath::new(weight, nodes, arcs)
    }

    /// Expands a sequence of upward arcs into original input arcs with
    /// an explicit worklist, bounding stack depth on deep hierarchies.
    ///
    /// Each arc resolves to the strictly minimal option among its mapped
    /// input arcs (scanned first) and its lower triangles in ascending
    /// eliminated-node rank, which makes tie-breaking canonical.
    fn unpack(&self, state: &MetricState, sequence: &[(EdgeIndex, Direction)]) -> Vec<EdgeIndex> {
        let structure = self.metric.structure();
        let mut arcs = Vec::new();
        let mut stack: Vec<(EdgeIndex, Direction)> = Vec::new();

        for &step in sequence {
            stack.push(step);
            while let Some((arc, dir)) = stack.pop() {
                let inputs = match dir {
                    Direction::Fwd => &structure.fwd_inputs[arc.index()],
                    Direction::Bwd => &structure.bwd_inputs[arc.index()],
                };

                let mut best_value = INFINITY;
                let mut best_input = None;
                let mut best_triangle = None;
                for &input in inputs {
                    if state.weights[input.index()] < best_value {
                        best_value = state.weights[input.index()];
                        best_input = Some(input);
                    }
                }
                for &[al, au] in &structure.triangles[arc.index()] {
                    let value = match dir {
                        Direction::Fwd => state.bwd[al.index()] + state.fwd[au.index()],
                        Direction::Bwd => state.fwd[al.index()] + state.bwd[au.index()],
                    };
                    if value < best_value {
                        best_value = value;
                        best_input = None;
                        best_triangle = Some([al, au]);
                    }
                }

                match (best_input, best_triangle) {
                    (Some(input), _) => arcs.push(input),
                    (None, Some([al, au])) => {
                        // Travel enters via the lower node of the
                        // triangle; push in reverse emission order.
                        match dir {
                            Direction::Fwd => {
                                // lo -> n -> hi
                                stack.push((au, Direction::Fwd));
                                stack.push((al, Direction::Bwd));
                            }
                            Direction::Bwd => {
                                // hi -> n -> lo
                                stack.push((al, Direction::Fwd));
                                stack.push((au, Direction::Bwd));
                            }
                        }
                    }
                    (None, None) => {
                        // Unreachable by the customization invariant: a
                        // finite arc weight always has a witness.
                        debug_assert!(false, "upward arc without witness");
                    }
                }
            }
        }
        arcs
    }
}

/// Generation bump with wrap-around protection for the mark arrays.
fn bump(gen: &mut u32, marks: &mut [u32]) {
    if *gen == u32::MAX {
        marks.fill(0);
        *gen = 1;
    } else {
        *gen += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        contraction::build_structure,
        customization::customize,
        graph::{node_index, Graph},
        ordering::{compute_order, NodeOrder},
        search::{assert_no_path, assert_path, dijkstra::Dijkstra},
        util::test_graphs::{complex_graph, line_graph},
    };
    use approx::assert_abs_diff_eq;

    fn init_log() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn line_graph_query() {
        init_log();
        let (tail, head, weights) = line_graph();
        let order = compute_order(4, &tail, &head).unwrap();
        let cch = Arc::new(build_structure(&order, &tail, &head, true).unwrap());
        let metric = customize(cch, weights).unwrap();

        let mut query = CchQuery::new(&metric);
        let sp = query.run(node_index(0), node_index(3)).unwrap();

        assert_path(vec![0, 1, 2, 3], 22.0, sp.clone());
        assert_eq!(
            sp.unwrap().arcs.iter().map(|a| a.index()).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        // The line is directed; the reverse direction is unreachable.
        let sp = query.run(node_index(3), node_index(0)).unwrap();
        assert_no_path(sp);
    }

    #[test]
    fn source_equals_target() {
        let (tail, head, weights) = line_graph();
        let order = compute_order(4, &tail, &head).unwrap();
        let cch = Arc::new(build_structure(&order, &tail, &head, true).unwrap());
        let metric = customize(cch, weights).unwrap();

        let mut query = CchQuery::new(&metric);
        let sp = query.run(node_index(2), node_index(2)).unwrap().unwrap();

        assert_eq!(sp.weight, 0.0);
        assert_eq!(sp.nodes, vec![node_index(2)]);
        assert!(sp.arcs.is_empty());
    }

    #[test]
    fn invalid_node_is_rejected() {
        let (tail, head, weights) = line_graph();
        let order = compute_order(4, &tail, &head).unwrap();
        let cch = Arc::new(build_structure(&order, &tail, &head, true).unwrap());
        let metric = customize(cch, weights).unwrap();

        let mut query = CchQuery::new(&metric);
        assert!(matches!(
            query.run(node_index(0), node_index(4)),
            Err(CchError::InvalidNode { node: 4, node_count: 4 })
        ));
    }

    #[test]
    fn matches_dijkstra_on_complex_graph() {
        init_log();
        let (node_count, tail, head, weights) = complex_graph();
        let order = compute_order(node_count, &tail, &head).unwrap();
        let cch = Arc::new(build_structure(&order, &tail, &head, true).unwrap());
        let metric = customize(cch, weights.clone()).unwrap();
        let g = Graph::from_arcs(node_count, &tail, &head).unwrap();

        let mut runner = proptest::test_runner::TestRunner::default();
        runner
            .run(&(0..node_count, 0..node_count), |(a, b)| {
                let mut query = CchQuery::new(&metric);
                let mut dijkstra = Dijkstra::new(&g, &weights);
                let expected = dijkstra.search(node_index(a), node_index(b));
                let got = query.run(node_index(a), node_index(b)).unwrap();
                match (expected, got) {
                    (Some(exp), Some(got)) => {
                        assert_abs_diff_eq!(exp.weight, got.weight, epsilon = 1e-9);
                        // The arc path must connect the endpoints and sum
                        // to the distance.
                        let total: Weight =
                            got.arcs.iter().map(|arc| weights[arc.index()]).sum();
                        assert_abs_diff_eq!(total, got.weight, epsilon = 1e-9);
                        assert_eq!(got.nodes.first(), Some(&node_index(a)));
                        assert_eq!(got.nodes.last(), Some(&node_index(b)));
                        assert_eq!(got.arcs.len() + 1, got.nodes.len());
                    }
                    (None, None) => {}
                    (exp, got) => panic!("mismatch: {:?} vs {:?}", exp, got),
                }
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn one_to_many_matches_single_runs() {
        let (node_count, tail, head, weights) = complex_graph();
        let order = compute_order(node_count, &tail, &head).unwrap();
        let cch = Arc::new(build_structure(&order, &tail, &head, true).unwrap());
        let metric = customize(cch, weights).unwrap();

        let mut query = CchQuery::new(&metric);
        let targets: Vec<NodeIndex> = (0..node_count).map(node_index).collect();
        let batch = query.run_one_to_many(node_index(0), &targets).unwrap();

        for (t, batch_dist) in targets.iter().zip(&batch) {
            let single = query.run(node_index(0), *t).unwrap().map(|sp| sp.weight);
            assert_eq!(single, *batch_dist);
        }

        let batch_rev = query.run_many_to_one(&targets, node_index(0)).unwrap();
        for (s, batch_dist) in targets.iter().zip(&batch_rev) {
            let single = query.run(*s, node_index(0)).unwrap().map(|sp| sp.weight);
            assert_eq!(single, *batch_dist);
        }
    }

    #[test]
    fn multi_st_respects_offsets() {
        let (tail, head, weights) = line_graph();
        let order = compute_order(4, &tail, &head).unwrap();
        let cch = Arc::new(build_structure(&order, &tail, &head, true).unwrap());
        let metric = customize(cch, weights).unwrap();

        let mut query = CchQuery::new(&metric);

        // Starting at node 1 with a head start of 3 beats node 0.
        let best = query
            .run_multi_st_with_dist(
                &[(node_index(0), 0.0), (node_index(1), 3.0)],
                &[(node_index(3), 0.0)],
            )
            .unwrap();
        assert_eq!(best, Some(15.0));

        let unreachable = query
            .run_multi_st_with_dist(&[(node_index(3), 0.0)], &[(node_index(0), 0.0)])
            .unwrap();
        assert_eq!(unreachable, None);
    }
}
