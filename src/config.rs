//! Configuration loaded from a JSON file.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::translate::TagRemap;

/// Failure to load a [`PredicateConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Predicate translation settings.
///
/// ```json
/// { "tag_remap": { "_measurement": "_name" }, "log_level": "debug" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredicateConfig {
    /// Storage tag key -> expression variable name.
    pub tag_remap: HashMap<String, String>,
    /// `log` level filter for the CLI, e.g. `"debug"`. `RUST_LOG` wins.
    pub log_level: Option<String>,
}

impl Default for PredicateConfig {
    fn default() -> Self {
        Self {
            tag_remap: TagRemap::storage_defaults().mappings().clone(),
            log_level: None,
        }
    }
}

impl PredicateConfig {
    /// Loads the configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Self::from_json_str(&content)
    }

    /// Keys missing from `json` keep their defaults; an explicit `tag_remap`
    /// replaces the default one entirely.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn tag_remap(&self) -> TagRemap {
        TagRemap::new(self.tag_remap.clone())
    }
}
