//! Symbolic (weight-free) elimination building a [`CchStructure`].
//!
//! Nodes are processed in increasing rank; eliminating a node connects
//! its still-remaining neighbors pairwise, inserting shortcut arcs where
//! no direct upward arc exists and recording the lower triangle on the
//! connecting arc. The result depends only on topology and order, never
//! on weights, so one structure backs arbitrarily many metrics.

use std::time::Instant;

use log::info;
use rustc_hash::FxHashMap;

use crate::{
    error::CchError,
    graph::{EdgeIndex, Graph, NodeIndex},
    hierarchy::{CchStructure, UpwardArc},
    ordering::NodeOrder,
};

/// Builds the CCH structure for the given order and arc list.
///
/// The node count is the length of `order`. `directed = false` treats
/// every input arc as bidirectional; `directed = true` preserves arc
/// direction, merging only where topology coincides.
pub fn build_structure(
    order: &NodeOrder,
    tail: &[u32],
    head: &[u32],
    directed: bool,
) -> Result<CchStructure, CchError> {
    let now = Instant::now();
    let g = Graph::from_arcs(order.len(), tail, head)?;

    let mut builder = Builder {
        order,
        // Per lower-endpoint rank: upper-endpoint rank -> upward arc.
        neighbors: vec![FxHashMap::default(); order.len()],
        up_arcs: Vec::with_capacity(g.edges.len()),
        triangles: Vec::with_capacity(g.edges.len()),
        dependents: Vec::with_capacity(g.edges.len()),
        fwd_inputs: Vec::with_capacity(g.edges.len()),
        bwd_inputs: Vec::with_capacity(g.edges.len()),
    };

    let mut input_to_up = Vec::with_capacity(g.edges.len());
    for (i, edge) in g.edges().enumerate() {
        if edge.source == edge.target {
            input_to_up.push(EdgeIndex::end());
            continue;
        }
        let rt = order.rank(edge.source);
        let rh = order.rank(edge.target);
        let arc = builder.arc_between(rt.min(rh), rt.max(rh));
        input_to_up.push(arc);

        let input = EdgeIndex::new(i);
        if !directed {
            builder.fwd_inputs[arc.index()].push(input);
            builder.bwd_inputs[arc.index()].push(input);
        } else if rt < rh {
            builder.fwd_inputs[arc.index()].push(input);
        } else {
            builder.bwd_inputs[arc.index()].push(input);
        }
    }

    let mut parent = vec![NodeIndex::end(); order.len()];
    let mut up_adj = vec![Vec::new(); order.len()];

    for rank in 0..order.len() {
        let node = order.node_at(rank);
        let mut neigh: Vec<(usize, EdgeIndex)> =
            builder.neighbors[rank].iter().map(|(&r, &a)| (r, a)).collect();
        neigh.sort_unstable_by_key(|&(r, _)| r);

        if let Some(&(lowest, _)) = neigh.first() {
            parent[node.index()] = order.node_at(lowest);
        }
        up_adj[node.index()] = neigh.iter().map(|&(_, a)| a).collect();

        for (i, &(p, ap)) in neigh.iter().enumerate() {
            for &(q, aq) in &neigh[i + 1..] {
                let b = builder.arc_between(p, q);
                builder.triangles[b.index()].push([ap, aq]);
                builder.dependents[ap.index()].push(b);
                builder.dependents[aq.index()].push(b);
            }
        }
    }

    let structure = CchStructure {
        order: order.clone(),
        input_arc_count: g.edges.len(),
        directed,
        parent,
        up_arcs: builder.up_arcs,
        up_adj,
        triangles: builder.triangles,
        dependents: builder.dependents,
        fwd_inputs: builder.fwd_inputs,
        bwd_inputs: builder.bwd_inputs,
        input_to_up,
        input_tail: g.edges.iter().map(|e| e.source).collect(),
        input_head: g.edges.iter().map(|e| e.target).collect(),
    };

    info!(
        "Built CCH structure in {:?}: {} upward arcs ({} shortcuts), {} triangles",
        now.elapsed(),
        structure.up_arc_count(),
        structure.up_arc_count() - structure.input_arc_count().min(structure.up_arc_count()),
        structure.triangle_count()
    );

    Ok(structure)
}

struct Builder<'a> {
    order: &'a NodeOrder,
    neighbors: Vec<FxHashMap<usize, EdgeIndex>>,
    up_arcs: Vec<UpwardArc>,
    triangles: Vec<Vec<[EdgeIndex; 2]>>,
    dependents: Vec<Vec<EdgeIndex>>,
    fwd_inputs: Vec<Vec<EdgeIndex>>,
    bwd_inputs: Vec<Vec<EdgeIndex>>,
}

impl Builder<'_> {
    /// Upward arc between the given ranks, inserted as a shortcut if absent.
    fn arc_between(&mut self, lo_rank: usize, hi_rank: usize) -> EdgeIndex {
        debug_assert!(lo_rank < hi_rank);
        if let Some(&arc) = self.neighbors[lo_rank].get(&hi_rank) {
            return arc;
        }
        let arc = EdgeIndex::new(self.up_arcs.len());
        self.up_arcs.push(UpwardArc {
            lo: self.order.node_at(lo_rank),
            hi: self.order.node_at(hi_rank),
        });
        self.triangles.push(Vec::new());
        self.dependents.push(Vec::new());
        self.fwd_inputs.push(Vec::new());
        self.bwd_inputs.push(Vec::new());
        self.neighbors[lo_rank].insert(hi_rank, arc);
        arc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node_index;
    use crate::util::test_graphs::line_graph;

    #[test]
    fn line_graph_structure() {
        // 0 -> 1 -> 2 -> 3, identity order: no shortcuts, tree is a path.
        let (tail, head, _) = line_graph();
        let order = NodeOrder::from_raw(&[0, 1, 2, 3]).unwrap();

        let cch = build_structure(&order, &tail, &head, true).unwrap();

        assert_eq!(cch.up_arc_count(), 3);
        assert_eq!(cch.triangle_count(), 0);
        assert_eq!(cch.parent(node_index(0)), Some(node_index(1)));
        assert_eq!(cch.parent(node_index(1)), Some(node_index(2)));
        assert_eq!(cch.parent(node_index(2)), Some(node_index(3)));
        assert_eq!(cch.parent(node_index(3)), None);
    }

    #[test]
    fn eliminating_middle_node_inserts_shortcut() {
        // 0 - 1 - 2 with node 1 eliminated first: shortcut 0 - 2.
        let tail = [0, 1, 1, 2];
        let head = [1, 0, 2, 1];
        let order = NodeOrder::from_raw(&[1, 0, 2]).unwrap();

        let cch = build_structure(&order, &tail, &head, false).unwrap();

        assert_eq!(cch.up_arc_count(), 3);
        assert_eq!(cch.triangle_count(), 1);

        // The shortcut connects 0 and 2 and carries the triangle over 1.
        let shortcut = EdgeIndex::new(2);
        assert_eq!(cch.up_arc(shortcut).lo.index(), 0);
        assert_eq!(cch.up_arc(shortcut).hi.index(), 2);
        assert_eq!(cch.triangles[shortcut.index()].len(), 1);

        // Both lower arcs list the shortcut as a dependent.
        let [al, au] = cch.triangles[shortcut.index()][0];
        assert!(cch.dependents[al.index()].contains(&shortcut));
        assert!(cch.dependents[au.index()].contains(&shortcut));

        // Parallel input arcs map into the lower arcs both ways (undirected).
        assert_eq!(cch.fwd_inputs[al.index()].len(), 1);
        assert_eq!(cch.bwd_inputs[al.index()].len(), 1);
    }

    #[test]
    fn directed_arcs_split_by_direction() {
        // 0 -> 1 and 1 -> 0 merge into one upward arc, opposite directions.
        let tail = [0, 1];
        let head = [1, 0];
        let order = NodeOrder::from_raw(&[0, 1]).unwrap();

        let cch = build_structure(&order, &tail, &head, true).unwrap();

        assert_eq!(cch.up_arc_count(), 1);
        assert_eq!(cch.fwd_inputs[0], vec![EdgeIndex::new(0)]);
        assert_eq!(cch.bwd_inputs[0], vec![EdgeIndex::new(1)]);
    }

    #[test]
    fn self_loops_are_ignored() {
        let tail = [0, 0];
        let head = [0, 1];
        let order = NodeOrder::from_raw(&[0, 1]).unwrap();

        let cch = build_structure(&order, &tail, &head, true).unwrap();

        assert_eq!(cch.up_arc_count(), 1);
        assert_eq!(cch.input_to_up[0], EdgeIndex::end());
        assert_eq!(cch.input_to_up[1], EdgeIndex::new(0));
    }

    #[test]
    fn rejects_non_bijective_order() {
        assert!(NodeOrder::from_raw(&[0, 0]).is_err());
    }
}
