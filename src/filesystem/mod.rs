//! Layered filesystem model.
//!
//! A [`LayerTree`] holds the entries one image layer contributes. The
//! [`StackEngine`] overlays layer trees into composites, removing whatever
//! whiteout markers delete and tagging every node with a [`ChangeStatus`].

mod change_status;
mod entry;
mod node;
mod render;
mod stack;
mod tree;

pub use change_status::{ChangeStatus, compare_nodes};
pub use entry::{Entry, EntryKind, Fingerprint, OPAQUE_WHITEOUT, WHITEOUT_PREFIX, whiteout_path};
pub use node::{Node, is_whiteout, strip_whiteout};
pub use render::RenderStyle;
pub use stack::{
    FileAction, MissingTargetPolicy, PathConsistencyError, RemovedPath, StackEngine, StackError,
    StackOutcome,
};
pub use tree::{LayerTree, TreeError};
