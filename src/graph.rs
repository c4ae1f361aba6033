use std::{fmt, hash::Hash};

use serde::{Deserialize, Serialize};

use crate::error::CchError;

/// Default integer type for node and arc indices.
/// Needs to be increased for very large graphs > u32::max
pub type DefaultIdx = u32;

pub trait IndexType: Copy + Default + Hash + Ord + fmt::Debug {
    fn new(idx: usize) -> Self;
    fn index(&self) -> usize;
    fn max() -> Self;
}

impl IndexType for usize {
    #[inline(always)]
    fn new(x: usize) -> Self {
        x
    }
    #[inline(always)]
    fn index(&self) -> Self {
        *self
    }
    #[inline(always)]
    fn max() -> Self {
        usize::MAX
    }
}

impl IndexType for u32 {
    #[inline(always)]
    fn new(x: usize) -> Self {
        x as u32
    }
    #[inline(always)]
    fn index(&self) -> usize {
        *self as usize
    }
    #[inline(always)]
    fn max() -> Self {
        u32::MAX
    }
}

/// Node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct NodeIndex<Idx = DefaultIdx>(Idx);

impl NodeIndex {
    #[inline]
    pub fn new(x: usize) -> Self {
        NodeIndex(IndexType::new(x))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0.index()
    }

    #[inline]
    pub fn end() -> Self {
        NodeIndex(IndexType::max())
    }
}

impl<Idx: IndexType> From<Idx> for NodeIndex<Idx> {
    fn from(ix: Idx) -> Self {
        NodeIndex(ix)
    }
}

/// Short version of `NodeIndex::new`
pub fn node_index(index: usize) -> NodeIndex {
    NodeIndex::new(index)
}

/// Arc identifier. Refers to an input arc by its position in the
/// tail/head arrays; weight vectors are aligned to this index.
#[derive(
    Debug, Copy, Clone, Default, PartialEq, PartialOrd, Eq, Ord, Hash, Deserialize, Serialize,
)]
pub struct EdgeIndex<Idx = DefaultIdx>(Idx);

impl<Idx: IndexType> From<Idx> for EdgeIndex<Idx> {
    fn from(ix: Idx) -> Self {
        EdgeIndex(ix)
    }
}

impl<Idx: IndexType> EdgeIndex<Idx> {
    #[inline]
    pub fn new(x: usize) -> Self {
        EdgeIndex(IndexType::new(x))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0.index()
    }

    /// An invalid `EdgeIndex` used to denote absence of an arc, for
    /// example as an unset predecessor.
    #[inline]
    pub fn end() -> Self {
        EdgeIndex(IndexType::max())
    }
}

/// Short version of `EdgeIndex::new`
pub fn edge_index(index: usize) -> EdgeIndex {
    EdgeIndex::new(index)
}

/// A directed input arc. Weights are not part of the topology; they are
/// bound later by a [`Metric`](crate::customization::Metric).
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct Edge<Idx = DefaultIdx> {
    pub source: NodeIndex<Idx>,
    pub target: NodeIndex<Idx>,
}

impl Edge {
    pub fn new(source: NodeIndex<DefaultIdx>, target: NodeIndex<DefaultIdx>) -> Self {
        Edge { source, target }
    }
}

/// Weight-free input topology: an arc list plus adjacency.
///
/// An undirected edge is represented as two opposite arcs. Arc identity
/// (its index) is stable; it is the unit referenced by arc paths and by
/// weight vectors.
#[derive(Clone, Serialize, Deserialize)]
pub struct Graph<Idx = DefaultIdx> {
    pub node_count: usize,
    pub edges: Vec<Edge<Idx>>,
    pub edges_out: Vec<Vec<EdgeIndex<Idx>>>,
    pub edges_in: Vec<Vec<EdgeIndex<Idx>>>,
}

impl Graph {
    /// Build a graph from parallel tail/head arrays with 0-based node ids.
    pub fn from_arcs(node_count: usize, tail: &[u32], head: &[u32]) -> Result<Self, CchError> {
        if tail.len() != head.len() {
            return Err(CchError::InvalidTopology(format!(
                "tail has {} entries, head has {}",
                tail.len(),
                head.len()
            )));
        }

        let mut edges = Vec::with_capacity(tail.len());
        let mut edges_out = vec![Vec::new(); node_count];
        let mut edges_in = vec![Vec::new(); node_count];

        for (i, (&t, &h)) in tail.iter().zip(head.iter()).enumerate() {
            if t as usize >= node_count || h as usize >= node_count {
                return Err(CchError::InvalidTopology(format!(
                    "arc {} = ({}, {}) exceeds node count {}",
                    i, t, h, node_count
                )));
            }
            let edge_idx = EdgeIndex::new(i);
            edges_out[t as usize].push(edge_idx);
            edges_in[h as usize].push(edge_idx);
            edges.push(Edge::new(node_index(t as usize), node_index(h as usize)));
        }

        Ok(Graph {
            node_count,
            edges,
            edges_out,
            edges_in,
        })
    }

    pub fn edge(&self, edge_idx: EdgeIndex) -> &Edge {
        &self.edges[edge_idx.index()]
    }

    /// Returns an iterator over all arcs of the graph
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    pub fn neighbors_outgoing(
        &self,
        node_idx: NodeIndex,
    ) -> impl Iterator<Item = (EdgeIndex, &Edge)> {
        self.edges_out[node_idx.index()]
            .iter()
            .map(|edge_idx| (*edge_idx, &self.edges[edge_idx.index()]))
    }

    pub fn neighbors_incoming(
        &self,
        node_idx: NodeIndex,
    ) -> impl Iterator<Item = (EdgeIndex, &Edge)> {
        self.edges_in[node_idx.index()]
            .iter()
            .map(|edge_idx| (*edge_idx, &self.edges[edge_idx.index()]))
    }

    pub fn print_info(&self) {
        println!(
            "InputGraph:\t#Nodes: {}, #Arcs: {}",
            self.node_count,
            self.edges.len()
        );
    }
}
