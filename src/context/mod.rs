//! Context domain: the branching conversation tree.
//! Owns context records, the adjacency index, and active-leaf resolution.

pub mod tree;
pub mod types;

pub use tree::{ContextTree, PathSegment};
pub use types::{Context, ContextStatus};
