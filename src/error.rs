use thiserror::Error;

/// Errors surfaced synchronously by engine operations.
///
/// Unreachable source/target pairs are a normal query result, never an
/// error. Concurrent mutation conflicts are resolved by internal
/// serialization and never surface here.
#[derive(Debug, Error)]
pub enum CchError {
    /// Malformed node or arc indices
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    /// Order is not a bijection over the node ids
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    /// Weight vector length does not match the arc count
    #[error("arity mismatch: expected {expected} weights, got {got}")]
    ArityMismatch { expected: usize, got: usize },

    /// Negative (or NaN) arc weight
    #[error("negative weight {weight} for arc {arc}")]
    NegativeWeight { arc: usize, weight: f64 },

    /// Metric and updater were built from different structures
    #[error("metric was not built from this updater's structure")]
    StructureMismatch,

    /// Query endpoint out of range
    #[error("node id {node} out of range (node count {node_count})")]
    InvalidNode { node: usize, node_count: usize },
}
