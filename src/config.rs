//! Configuration — YAML file with per-section defaults
//!
//! Every section and field is optional in the file; missing values take the
//! defaults below. CLI flags override file values in the binary.

use crate::corpus::DEFAULT_EXTENSIONS;
use crate::embedding::{DEFAULT_DIMENSIONS, DEFAULT_MAX_INPUT_CHARS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Reference repositories cloned by `codematch fetch` when none are configured.
pub const DEFAULT_REPOSITORIES: &[&str] = &[
    "https://github.com/dodona-edu/dolos",
    "https://github.com/jplag/JPlag",
    "https://github.com/blingenf/copydetect",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Base directory for codematch data (~/.local/share/codematch)
pub fn default_base_dir() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("codematch")
}

/// Default config location (~/.config/codematch/config.yaml)
pub fn default_config_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".config"));
    config_dir.join("codematch").join("config.yaml")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub corpus: CorpusConfig,
    pub index: IndexConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub oracle: OracleConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Directory repositories are cloned into and scanned from
    pub data_dir: PathBuf,
    pub repositories: Vec<String>,
    /// Allowed file extensions, without the dot
    pub extensions: Vec<String>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            data_dir: default_base_dir().join("repos"),
            repositories: DEFAULT_REPOSITORIES.iter().map(|s| s.to_string()).collect(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// SQLite file backing the index; `None` keeps the index in memory.
    pub path: Option<PathBuf>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: Some(default_base_dir().join("index.db")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    Hashing,
    Fastembed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    /// Width of the hashing embedder; fastembed models fix their own.
    pub dimensions: usize,
    pub max_input_chars: usize,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Hashing,
            dimensions: DEFAULT_DIMENSIONS,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            batch_size: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_k: usize,
    pub max_k: usize,
    /// Candidates scoring below this are dropped. No cutoff when unset.
    pub min_similarity: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: 3,
            max_k: 20,
            min_similarity: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// API key from the configured environment variable, if set and non-empty.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

impl Config {
    pub fn from_yaml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text, path)
    }

    /// Load `path` if it exists, otherwise defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding.dimensions == 0 {
            return Err(ConfigError::Invalid {
                field: "embedding.dimensions",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "embedding.batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.retrieval.default_k == 0 || self.retrieval.default_k > self.retrieval.max_k {
            return Err(ConfigError::Invalid {
                field: "retrieval.default_k",
                reason: format!("must be between 1 and max_k ({})", self.retrieval.max_k),
            });
        }
        if let Some(threshold) = self.retrieval.min_similarity {
            if !(-1.0..=1.0).contains(&threshold) {
                return Err(ConfigError::Invalid {
                    field: "retrieval.min_similarity",
                    reason: format!("{} is outside [-1, 1]", threshold),
                });
            }
        }
        if self.oracle.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "oracle.timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
