//! HLOD construction over the spatial hierarchy.
//!
//! Combined proxies are built bottom-up by cooperative tasks running against
//! an [`HlodWorld`]. Simplification and batching are pluggable capabilities
//! resolved by name from a [`CapabilityRegistry`].
//!
//! # Invariants
//! - A volume is only merged from its children when every populated child
//!   has a single combined renderer standing in for exactly the volume's
//!   material set; otherwise its members are batched.
//! - A combined proxy's owned geometry is freed before its replacement is
//!   installed, and when its volume is destroyed.
//! - Update passes visit children before parents.

mod builder;
mod capability;
mod error;
mod lod_chain;
mod registry;
mod world;

#[cfg(test)]
mod testing;

pub use builder::{BuildTask, Ineligible, MergeCheck, UpdateAllTask, check_merge, member_materials};
pub use capability::{Batcher, MaterialBatcher, MeshSimplifier, PassthroughBatcher, PassthroughSimplifier};
pub use error::BuildError;
pub use lod_chain::{CULL_HEIGHT, LodChainGenerator};
pub use registry::CapabilityRegistry;
pub use world::{BuildSettings, BuildStats, HlodEvent, HlodWorld, Toolset};

pub fn crate_info() -> &'static str {
    "hlod-build v0.1.0"
}
