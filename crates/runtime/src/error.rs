use hlod_build::BuildError;

use crate::config::ConfigError;

/// Errors surfaced to the host.
#[derive(Debug, thiserror::Error)]
pub enum HlodError {
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("LOD generation is disabled: {reason}")]
    LodGenerationDisabled { reason: String },
}
