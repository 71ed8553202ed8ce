//! Developer tooling: hierarchy inspector and volume-bounds gizmos.
//!
//! # Invariants
//! - Tools only read the system; nothing here mutates the hierarchy.

mod gizmos;
mod inspector;

pub use gizmos::{DEPTH_COLORS, VolumeGizmo, depth_color, tree_gizmos, volume_gizmos};
pub use inspector::{HierarchyInspector, HierarchySummary, VolumeInfo};

pub fn crate_info() -> &'static str {
    "hlod-tools v0.1.0"
}
