use serde::{Deserialize, Serialize};
use std::path::Path;

use hlod_build::BuildSettings;
use hlod_volume::{DEFAULT_MAX_DEPTH, DEFAULT_SPLIT_THRESHOLD, TreeSettings};

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for the HLOD system. Every field has a default, so partial files
/// are fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HlodConfig {
    /// Member count above which a leaf volume splits.
    pub split_threshold: usize,
    /// Scheduler quantum in milliseconds; 0 runs every quantum to completion.
    pub time_budget_ms: u64,
    /// Registry key of the mesh simplifier; unset picks the first registered.
    pub mesh_simplifier: Option<String>,
    /// Registry key of the batcher; unset picks the first registered.
    pub batcher: Option<String>,
    /// Emit volume-bounds gizmos from the inspector.
    pub draw_volume_bounds: bool,
    /// No split happens at or below this depth.
    pub max_depth: u32,
    /// When off, scene notifications are ignored.
    pub scene_lod_enabled: bool,
    /// Simplified renditions generated for merged combined proxies.
    pub hlod_lod_levels: u32,
    /// Coarsest level of generated per-proxy LOD chains.
    pub max_lod: u32,
}

impl Default for HlodConfig {
    fn default() -> Self {
        Self {
            split_threshold: DEFAULT_SPLIT_THRESHOLD,
            time_budget_ms: 8,
            mesh_simplifier: None,
            batcher: None,
            draw_volume_bounds: false,
            max_depth: DEFAULT_MAX_DEPTH,
            scene_lod_enabled: true,
            hlod_lod_levels: 1,
            max_lod: 2,
        }
    }
}

enum Format {
    Json,
    Yaml,
}

fn format_of(path: &Path) -> Result<Format, ConfigError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("yaml" | "yml") => Ok(Format::Yaml),
        _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
    }
}

impl HlodConfig {
    /// Load from a `.json`, `.yaml` or `.yml` file and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = format_of(path)?;
        let contents = std::fs::read_to_string(path)?;
        let config: Self = match format {
            Format::Json => serde_json::from_str(&contents)?,
            Format::Yaml => serde_yaml::from_str(&contents)?,
        };
        config.validate()?;
        tracing::info!(path = %path.display(), "loaded HLOD config");
        Ok(config)
    }

    /// Write to a `.json`, `.yaml` or `.yml` file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Yaml => serde_yaml::to_string(self)?,
        };
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.split_threshold == 0 {
            return Err(ConfigError::Invalid("split_threshold must be at least 1".into()));
        }
        if self.max_depth == 0 {
            return Err(ConfigError::Invalid("max_depth must be at least 1".into()));
        }
        Ok(())
    }

    pub fn tree_settings(&self) -> TreeSettings {
        TreeSettings {
            split_threshold: self.split_threshold,
            max_depth: self.max_depth,
        }
    }

    pub fn build_settings(&self) -> BuildSettings {
        BuildSettings {
            simplified_levels: self.hlod_lod_levels,
        }
    }
}
