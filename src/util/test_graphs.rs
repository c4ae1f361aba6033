//! Small fixed graphs shared by tests and examples, as parallel
//! tail/head/weight arrays.

use crate::constants::Weight;

/// Directed line 0 -> 1 -> 2 -> 3 with weights 10, 5, 7.
pub fn line_graph() -> (Vec<u32>, Vec<u32>, Vec<Weight>) {
    (vec![0, 1, 2], vec![1, 2, 3], vec![10.0, 5.0, 7.0])
}

/// Undirected 11-node graph with a few alternative routes; every
/// undirected edge is two opposite arcs.
pub fn complex_graph() -> (usize, Vec<u32>, Vec<u32>, Vec<Weight>) {
    let edges: [(u32, u32, Weight); 20] = [
        (0, 1, 3.0),
        (0, 2, 5.0),
        (0, 10, 3.0),
        (1, 3, 5.0),
        (1, 2, 3.0),
        (2, 3, 2.0),
        (2, 9, 2.0),
        (3, 9, 4.0),
        (3, 4, 7.0),
        (4, 9, 3.0),
        (4, 5, 6.0),
        (5, 7, 2.0),
        (5, 6, 4.0),
        (6, 7, 3.0),
        (6, 8, 5.0),
        (7, 8, 3.0),
        (7, 9, 2.0),
        (8, 9, 4.0),
        (8, 10, 6.0),
        (9, 10, 3.0),
    ];

    let mut tail = Vec::with_capacity(edges.len() * 2);
    let mut head = Vec::with_capacity(edges.len() * 2);
    let mut weights = Vec::with_capacity(edges.len() * 2);
    for (u, v, w) in edges {
        tail.push(u);
        head.push(v);
        weights.push(w);
        tail.push(v);
        head.push(u);
        weights.push(w);
    }
    (11, tail, head, weights)
}
