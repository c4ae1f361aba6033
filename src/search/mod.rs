use crate::constants::Weight;
use crate::graph::{EdgeIndex, NodeIndex};

pub mod dijkstra;
pub mod query;

/// A reconstructed shortest path: total weight, node sequence (endpoints
/// inclusive) and the original input arcs connecting consecutive nodes.
#[derive(Debug, PartialEq, Clone)]
pub struct ShortestPath {
    pub weight: Weight,
    pub nodes: Vec<NodeIndex>,
    pub arcs: Vec<EdgeIndex>,
}

impl ShortestPath {
    pub fn new(weight: Weight, nodes: Vec<NodeIndex>, arcs: Vec<EdgeIndex>) -> Self {
        ShortestPath { weight, nodes, arcs }
    }
}

#[cfg(test)]
pub(crate) fn assert_path(nodes: Vec<usize>, weight: Weight, sp: Option<ShortestPath>) {
    let sp = sp.expect("expected a path");
    assert_eq!(
        nodes,
        sp.nodes.iter().map(|n| n.index()).collect::<Vec<_>>()
    );
    approx::assert_abs_diff_eq!(weight, sp.weight, epsilon = 1e-9);
    assert_eq!(sp.arcs.len() + 1, sp.nodes.len());
}

#[cfg(test)]
pub(crate) fn assert_no_path(sp: Option<ShortestPath>) {
    assert_eq!(None, sp);
}
