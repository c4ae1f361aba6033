/// Arc weight type
pub type Weight = f64;
/// Label value for unreachable nodes and uninitialized shortcut weights
pub const INFINITY: Weight = f64::INFINITY;
