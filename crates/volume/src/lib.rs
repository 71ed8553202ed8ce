//! The spatial hierarchy: an octree of cubic volumes over scene proxies,
//! maintained incrementally by cooperative insert/remove/move tasks.
//!
//! # Invariants
//! - Every volume's bounds is a cube; a split volume has exactly eight
//!   children tiling it with no overlap beyond shared faces.
//! - Exactly one root exists; it is the only volume without a parent.
//! - Every ancestor of a volume whose membership changed is dirty until the
//!   next build pass.
//! - Internal volumes keep the flattened member list of their subtree.

mod maintainer;
mod tree;

pub use maintainer::{InsertTask, MoveTask, RemoveTask, TreeContext};
pub use tree::{
    DEFAULT_MAX_DEPTH, DEFAULT_SPLIT_THRESHOLD, ShrinkOutcome, SpatialVolume, TreeSettings,
    TreeStats, VolumeKey, VolumeTree,
};

pub fn crate_info() -> &'static str {
    "hlod-volume v0.1.0"
}
