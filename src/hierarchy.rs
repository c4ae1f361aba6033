use std::fmt::Display;

use crate::{
    graph::{EdgeIndex, NodeIndex},
    ordering::NodeOrder,
};

/// An arc of the triangulated upward graph. `rank(lo) < rank(hi)`.
///
/// Forward direction means travel `lo -> hi`, backward `hi -> lo`; the
/// per-direction weights live in the [`Metric`](crate::customization::Metric).
#[derive(Debug, Clone, Copy)]
pub struct UpwardArc {
    pub lo: NodeIndex,
    pub hi: NodeIndex,
}

/// The weight-independent CCH structure: elimination tree plus the
/// triangulated upward graph with its triangle dependencies.
///
/// Immutable after construction and shared (via `Arc`) by every metric
/// built from it. Everything is held in flat containers referenced by
/// index, so no reference cycles arise from the triangle relation.
pub struct CchStructure {
    pub(crate) order: NodeOrder,
    pub(crate) input_arc_count: usize,
    pub(crate) directed: bool,
    /// Elimination tree parent per node; `NodeIndex::end()` for roots.
    pub(crate) parent: Vec<NodeIndex>,
    pub(crate) up_arcs: Vec<UpwardArc>,
    /// Per node: upward arcs whose lower endpoint is that node,
    /// ascending by the rank of the upper endpoint.
    pub(crate) up_adj: Vec<Vec<EdgeIndex>>,
    /// Per upward arc `(p, q)`: lower triangles `[arc(n,p), arc(n,q)]`,
    /// ascending by the rank of the eliminated node `n`.
    pub(crate) triangles: Vec<Vec<[EdgeIndex; 2]>>,
    /// Per upward arc: arcs that reference it in one of their triangles.
    pub(crate) dependents: Vec<Vec<EdgeIndex>>,
    /// Per upward arc: input arcs mapping into its forward/backward
    /// direction. Undirected builds map every input arc into both.
    pub(crate) fwd_inputs: Vec<Vec<EdgeIndex>>,
    pub(crate) bwd_inputs: Vec<Vec<EdgeIndex>>,
    /// Input arc -> containing upward arc; `EdgeIndex::end()` for self
    /// loops, which never enter the upward graph.
    pub(crate) input_to_up: Vec<EdgeIndex>,
    /// Input arc endpoints, for path reconstruction.
    pub(crate) input_tail: Vec<NodeIndex>,
    pub(crate) input_head: Vec<NodeIndex>,
}

impl CchStructure {
    pub fn node_count(&self) -> usize {
        self.order.len()
    }

    pub fn input_arc_count(&self) -> usize {
        self.input_arc_count
    }

    pub fn up_arc_count(&self) -> usize {
        self.up_arcs.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.iter().map(Vec::len).sum()
    }

    pub fn is_directed(&self) -> bool {
        self.directed
    }

    pub fn order(&self) -> &NodeOrder {
        &self.order
    }

    pub fn up_arc(&self, arc: EdgeIndex) -> &UpwardArc {
        &self.up_arcs[arc.index()]
    }

    /// Endpoints of an input arc as `(tail, head)`.
    pub fn input_arc(&self, arc: EdgeIndex) -> (NodeIndex, NodeIndex) {
        (self.input_tail[arc.index()], self.input_head[arc.index()])
    }

    /// Elimination tree parent: the lowest-rank remaining neighbor at
    /// elimination time, `None` for roots.
    pub fn parent(&self, node: NodeIndex) -> Option<NodeIndex> {
        let p = self.parent[node.index()];
        (p != NodeIndex::end()).then_some(p)
    }

    /// Upward arcs leaving `node`, ascending by upper-endpoint rank.
    pub fn up_edges(&self, node: NodeIndex) -> impl Iterator<Item = (EdgeIndex, &UpwardArc)> {
        self.up_adj[node.index()]
            .iter()
            .map(|arc| (*arc, &self.up_arcs[arc.index()]))
    }

    pub fn print_info(&self) {
        println!(
            "CchStructure:\t#Nodes: {}, #UpwardArcs: {} ({} shortcuts), #Triangles: {}",
            self.node_count(),
            self.up_arc_count(),
            self.up_arc_count().saturating_sub(self.input_arc_count),
            self.triangle_count()
        );
    }
}

impl Display for CchStructure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "CchStructure: #Nodes: {}, #UpwardArcs: {}",
            self.node_count(),
            self.up_arc_count()
        )?;
        for rank in 0..self.node_count() {
            let node = self.order.node_at(rank);
            write!(f, "  {} (rank {}):", node.index(), rank)?;
            for (_, arc) in self.up_edges(node) {
                write!(f, " {}->{} ", arc.lo.index(), arc.hi.index())?;
            }
            writeln!(f)?;
        }
        writeln!(f)
    }
}
