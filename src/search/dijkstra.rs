//! Plain Dijkstra over the input graph plus a weight slice.
//!
//! Used as the correctness reference for the hierarchy search, in tests
//! and in the demo binary; not meant to be fast.

use std::collections::BinaryHeap;

use log::debug;
use rustc_hash::FxHashMap;

use crate::constants::{Weight, INFINITY};
use crate::graph::{DefaultIdx, EdgeIndex, Graph, NodeIndex};
use crate::search::ShortestPath;
use crate::statistics::SearchStats;

#[derive(Debug)]
pub(crate) struct Candidate<Idx = DefaultIdx> {
    pub(crate) node_idx: NodeIndex<Idx>,
    pub(crate) weight: Weight,
}

impl Candidate {
    pub(crate) fn new(node_idx: NodeIndex, weight: Weight) -> Self {
        Self { node_idx, weight }
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        other.weight.partial_cmp(&self.weight)
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        other.weight == self.weight
    }
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .weight
            .partial_cmp(&self.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
    }
}

pub struct Dijkstra<'a> {
    pub stats: SearchStats,
    g: &'a Graph,
    weights: &'a [Weight],
}

impl<'a> Dijkstra<'a> {
    /// `weights` must be aligned to the graph's arc indices.
    pub fn new(graph: &'a Graph, weights: &'a [Weight]) -> Self {
        debug_assert_eq!(graph.edges.len(), weights.len());
        Dijkstra {
            g: graph,
            weights,
            stats: SearchStats::default(),
        }
    }

    pub fn search(&mut self, source: NodeIndex, target: NodeIndex) -> Option<ShortestPath> {
        self.stats.init();

        if source == target {
            self.stats.nodes_settled += 1;
            self.stats.finish();
            return Some(ShortestPath::new(0.0, vec![source], vec![]));
        }

        let mut node_data: FxHashMap<NodeIndex, (Weight, Option<EdgeIndex>)> = FxHashMap::default();
        node_data.insert(source, (0.0, None));

        let mut queue = BinaryHeap::new();
        queue.push(Candidate::new(source, 0.0));

        while let Some(Candidate { weight, node_idx }) = queue.pop() {
            self.stats.nodes_settled += 1;

            if node_idx == target {
                break;
            }

            for (edge_idx, edge) in self.g.neighbors_outgoing(node_idx) {
                let new_distance = weight + self.weights[edge_idx.index()];
                if new_distance < node_data.get(&edge.target).unwrap_or(&(INFINITY, None)).0 {
                    node_data.insert(edge.target, (new_distance, Some(edge_idx)));
                    queue.push(Candidate::new(edge.target, new_distance));
                }
            }
        }
        self.stats.finish();

        let sp = self.reconstruct(source, target, &node_data);
        debug!("{}, path found: {}", self.stats, sp.is_some());
        sp
    }

    fn reconstruct(
        &self,
        source: NodeIndex,
        target: NodeIndex,
        node_data: &FxHashMap<NodeIndex, (Weight, Option<EdgeIndex>)>,
    ) -> Option<ShortestPath> {
        let &(weight, last_edge) = node_data.get(&target)?;
        let mut arcs = vec![last_edge?];

        let mut node = self.g.edge(last_edge?).source;
        let mut nodes = vec![target];
        while node != source {
            nodes.push(node);
            let prev = node_data.get(&node)?.1?;
            arcs.push(prev);
            node = self.g.edge(prev).source;
        }
        nodes.push(source);
        nodes.reverse();
        arcs.reverse();

        Some(ShortestPath::new(weight, nodes, arcs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node_index;
    use crate::search::{assert_no_path, assert_path};

    #[test]
    fn simple_path() {
        //      7 -> 8 -> 9
        //      |         |
        // 0 -> 5 -> 6 -  |
        // |         |  \ |
        // 1 -> 2 -> 3 -> 4
        let tail = [0, 1, 2, 3, 0, 5, 6, 6, 5, 7, 8, 9];
        let head = [1, 2, 3, 4, 5, 6, 4, 3, 7, 8, 9, 4];
        let weights = [1.0, 1.0, 1.0, 20.0, 5.0, 1.0, 20.0, 20.0, 5.0, 1.0, 1.0, 1.0];
        let g = Graph::from_arcs(10, &tail, &head).unwrap();

        let mut d = Dijkstra::new(&g, &weights);

        assert_no_path(d.search(node_index(4), node_index(0))); // Cannot be reached
        assert_path(vec![0, 5, 7, 8, 9, 4], 13.0, d.search(node_index(0), node_index(4)));
        assert_path(vec![6, 3], 20.0, d.search(node_index(6), node_index(3)));
        assert_path(vec![4], 0.0, d.search(node_index(4), node_index(4)));
        assert_path(vec![1, 2, 3, 4], 22.0, d.search(node_index(1), node_index(4)));
    }

    #[test]
    fn arc_path_matches_weight() {
        let tail = [0, 0, 2, 3];
        let head = [1, 2, 3, 1];
        let weights = [10.0, 1.0, 1.0, 1.0];
        let g = Graph::from_arcs(4, &tail, &head).unwrap();

        let mut d = Dijkstra::new(&g, &weights);
        let sp = d.search(node_index(0), node_index(1)).unwrap();

        assert_eq!(sp.nodes.iter().map(|n| n.index()).collect::<Vec<_>>(), vec![0, 2, 3, 1]);
        assert_eq!(sp.arcs.iter().map(|a| a.index()).collect::<Vec<_>>(), vec![1, 2, 3]);
        let total: Weight = sp.arcs.iter().map(|a| weights[a.index()]).sum();
        assert_eq!(total, sp.weight);
    }
}
