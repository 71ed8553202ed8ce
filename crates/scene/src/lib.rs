//! Host scene substrate: the render proxies, meshes and LOD chains the HLOD
//! hierarchy is built over, plus the combined proxies it hands back.
//!
//! # Invariants
//! - The scene owns proxies; the hierarchy references them by id only.
//! - Every proxy mutation produces a `SceneEvent`.
//! - Geometry derived by the HLOD pipeline is owned by exactly one combined
//!   proxy and freed with it.

mod combined;
mod mesh;
mod proxy;
mod scene;

pub use combined::{CombinedProxy, HlodPart, SimplifiedLevel};
pub use mesh::{Mesh, MeshStore, Topology};
pub use proxy::{LodChain, LodLevel, LodRenderer, RenderProxy, RendererKind};
pub use scene::{ProxyDesc, Scene, SceneError, SceneEvent};

pub fn crate_info() -> &'static str {
    "hlod-scene v0.1.0"
}
