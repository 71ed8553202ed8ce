use hlod_common::{MeshHandle, ProxyId};

/// Failures of the build pipeline and its capabilities.
///
/// Only the `*Unavailable` and `NoCapabilities` variants are configuration
/// problems for the host; the rest are reported per proxy or per volume and
/// the pipeline carries on.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("mesh simplifier '{name}' is not registered")]
    SimplifierUnavailable { name: String },
    #[error("batcher '{name}' is not registered")]
    BatcherUnavailable { name: String },
    #[error("no capabilities registered")]
    NoCapabilities,
    #[error("unsupported geometry on proxy {proxy}: {reason}")]
    UnsupportedGeometry { proxy: ProxyId, reason: String },
    #[error("proxy {0} not found")]
    UnknownProxy(ProxyId),
    #[error("mesh {0:?} not found")]
    MissingMesh(MeshHandle),
    #[error("simplification failed: {0}")]
    Simplify(String),
    #[error("simplifier worker stopped without a result")]
    SimplifierDisconnected,
}
