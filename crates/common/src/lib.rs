//! Shared types for the HLOD workspace: identities, transforms and the
//! axis-aligned box / cube geometry every other crate builds on.
//!
//! # Invariants
//! - A `Cube` has equal extents on all three axes by construction.
//! - Octant subdivision of a `Cube` is exact: eight children tile the parent.

mod geometry;
mod types;

pub use geometry::{Aabb, Cube, MIN_CUBE_SIDE};
pub use types::{MaterialId, MeshHandle, ProxyId, Transform};
