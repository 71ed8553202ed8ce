//! Host-facing HLOD system.
//!
//! Wires the scene, the spatial hierarchy, the build pipeline and the
//! cooperative scheduler together behind [`HlodSystem`], configured by
//! [`HlodConfig`].
//!
//! # Invariants
//! - Only the thread owning the `HlodSystem` mutates the hierarchy.
//! - Capability problems are reported when the system is built, never
//!   in the middle of a quantum.

mod config;
mod error;
mod system;

pub use config::{ConfigError, HlodConfig};
pub use error::HlodError;
pub use hlod_build::{CapabilityRegistry, HlodEvent};
pub use system::{HlodSystem, Readouts};

pub fn crate_info() -> &'static str {
    "hlod-runtime v0.1.0"
}
