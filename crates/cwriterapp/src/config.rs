//! # Configuration
//!
//! Cwriter configuration is managed by [`confique`], which handles layered
//! loading from a TOML file and environment variables.
//!
//! ## Storage Hierarchy
//!
//! Configuration is resolved in priority order:
//! 1. **Environment variables**: `CWRITER_DATA_DIR`, `CWRITER_PLATFORM`, etc.
//! 2. **Config file**: `cwriter.toml` in the data directory.
//! 3. **Compiled Defaults**: Built-in fallbacks via `#[config(default = ...)]`.
//!
//! ## Available Settings
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | `data_dir` | OS data dir (via `directories`) | Root of the document tree |
//! | `platform` | probed | `native-fs`, `mp-fs` or `kv-fallback` |
//! | `autosave_interval_secs` | `30` | Editor auto-save period |
//! | `log_capacity` | `1000` | Operation log ring-buffer size per user |
//! | `max_logs` | `1000` | Log entries kept by `cleanup` |
//! | `max_backups` | `10` | Backups kept by `cleanup` |
//! | `kv_snapshot` | none | File the key-value fallback persists to |

use crate::error::{CwriterError, Result};
use crate::platform::Platform;
use confique::Config;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "cwriter.toml";

/// Configuration for cwriter, stored in `cwriter.toml`.
#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CwriterConfig {
    /// Root directory for filesystem backends.
    #[config(env = "CWRITER_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Forces a platform instead of probing for one.
    #[config(env = "CWRITER_PLATFORM")]
    pub platform: Option<String>,

    #[config(env = "CWRITER_AUTOSAVE_INTERVAL_SECS", default = 30)]
    pub autosave_interval_secs: u64,

    #[config(env = "CWRITER_LOG_CAPACITY", default = 1000)]
    pub log_capacity: usize,

    #[config(env = "CWRITER_MAX_LOGS", default = 1000)]
    pub max_logs: usize,

    #[config(env = "CWRITER_MAX_BACKUPS", default = 10)]
    pub max_backups: usize,

    /// When set, the key-value fallback persists its map to this file.
    #[config(env = "CWRITER_KV_SNAPSHOT")]
    pub kv_snapshot: Option<PathBuf>,
}

impl Default for CwriterConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            platform: None,
            autosave_interval_secs: 30,
            log_capacity: 1000,
            max_logs: 1000,
            max_backups: 10,
            kv_snapshot: None,
        }
    }
}

impl CwriterConfig {
    /// Load from the environment and, if present, `cwriter.toml` in `dir`.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let mut builder = Self::builder().env();
        if let Some(dir) = dir {
            builder = builder.file(dir.join(CONFIG_FILE));
        }
        builder
            .load()
            .map_err(|e| CwriterError::Config(e.to_string()))
    }

    /// The configured data directory, or the OS default for this app.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        ProjectDirs::from("com", "cwriter", "cwriter")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| CwriterError::Config("could not determine data directory".to_string()))
    }

    /// The forced platform, if any.
    pub fn platform(&self) -> Result<Option<Platform>> {
        self.platform
            .as_deref()
            .map(str::parse::<Platform>)
            .transpose()
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs.max(1))
    }
}
