//! # hashfs-config
//!
//! Configuration management for HashFS.
//!
//! Loads configuration from:
//! 1. `~/.hashfs/config.toml` (global)
//! 2. `.hashfs/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)

pub mod logging;
pub mod testing;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML render error: {0}")]
    TomlRender(#[from] toml::ser::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub index: IndexConfig,
    pub defaults: DefaultsConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                config = Self::from_file(&global_path)?;
            }
        }

        let project_path = Path::new(".hashfs/config.toml");
        if project_path.exists() {
            debug!("Loading project config from {:?}", project_path);
            config.merge(Self::from_file(project_path)?);
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Parse a single TOML file, without merging or env overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Global config path: ~/.hashfs/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".hashfs/config.toml"))
    }

    /// Merge a project config over this one, field by field where the
    /// project deviates from the defaults.
    fn merge(&mut self, other: Config) {
        let defaults = Config::default();
        if other.storage.index_dir != defaults.storage.index_dir {
            self.storage.index_dir = other.storage.index_dir;
        }
        if other.storage.blob_root != defaults.storage.blob_root {
            self.storage.blob_root = other.storage.blob_root;
        }
        if other.index.map_size != defaults.index.map_size {
            self.index.map_size = other.index.map_size;
        }
        if other.index.max_readers != defaults.index.max_readers {
            self.index.max_readers = other.index.max_readers;
        }
        if other.index.max_retries != defaults.index.max_retries {
            self.index.max_retries = other.index.max_retries;
        }
        if other.index.retry_backoff_ms != defaults.index.retry_backoff_ms {
            self.index.retry_backoff_ms = other.index.retry_backoff_ms;
        }
        if other.defaults.dir_mode != defaults.defaults.dir_mode {
            self.defaults.dir_mode = other.defaults.dir_mode;
        }
        if other.defaults.file_mode != defaults.defaults.file_mode {
            self.defaults.file_mode = other.defaults.file_mode;
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("HASHFS_INDEX_DIR") {
            self.storage.index_dir = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("HASHFS_BLOB_ROOT") {
            self.storage.blob_root = PathBuf::from(path);
        }
        if let Ok(retries) = std::env::var("HASHFS_MAX_RETRIES") {
            if let Ok(n) = retries.parse() {
                self.index.max_retries = n;
            }
        }
    }

    /// Generate default config TOML string
    pub fn default_toml() -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&Config::default())?)
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// LMDB environment directory for the metadata index
    pub index_dir: PathBuf,
    /// Root of the content-addressable blob store
    pub blob_root: PathBuf,
}

impl StorageConfig {
    pub fn resolved_index_dir(&self) -> PathBuf {
        expand_home(&self.index_dir)
    }

    pub fn resolved_blob_root(&self) -> PathBuf {
        expand_home(&self.blob_root)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("~/.hashfs/index.lmdb"),
            blob_root: PathBuf::from("~/.hashfs/blobs"),
        }
    }
}

/// Metadata index tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// LMDB map size in bytes
    pub map_size: usize,
    pub max_readers: u32,
    /// Attempts for a transaction that hits a retryable conflict
    pub max_retries: u32,
    /// Base delay between attempts (grows linearly)
    pub retry_backoff_ms: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            map_size: 1024 * 1024 * 1024,
            max_readers: 128,
            max_retries: 5,
            retry_backoff_ms: 10,
        }
    }
}

/// Modes applied when callers don't supply one
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub dir_mode: u32,
    pub file_mode: u32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            dir_mode: 0o755,
            file_mode: 0o644,
        }
    }
}
