// rust/corpus-core/src/config.rs

//! Configuration for the corpus core.
//!
//! This module provides configuration parsing from TOML files, environment
//! variable overrides, and validation of configuration values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{CorpusError, Result};

// Top-level corpus configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub prefetch: PrefetchConfig,
    pub audio: AudioConfig,
}

/// Where corpora live on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one subdirectory per corpus.
    pub root: PathBuf,
}

impl StorageConfig {
    /// Directory of the corpus called `name`.
    pub fn corpus_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

/// Default storage root: `$HOME/.datasets`, or `./.datasets` without a home.
pub fn default_root() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home).join(".datasets"),
        _ => PathBuf::from("./.datasets"),
    }
}

// Sample cache options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    // Cache capacity for datasets built from this config; 0 disables caching.
    pub capacity: usize,
}

/// Worker pool options for threaded iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Number of worker threads.
    pub num_workers: usize,
    /// Maximum number of load steps in flight.
    pub prefetch: usize,
    /// Whether teardown waits for running load steps.
    pub shutdown_wait: bool,
}

// Audio options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    // Target sample rate in Hz.
    pub sample_rate: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
        }
    }
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            prefetch: 8,
            shutdown_wait: false,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
        }
    }
}

impl PrefetchConfig {
    #[must_use]
    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    #[must_use]
    pub fn with_prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = prefetch;
        self
    }

    #[must_use]
    pub fn with_shutdown_wait(mut self, shutdown_wait: bool) -> Self {
        self.shutdown_wait = shutdown_wait;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(CorpusError::invalid_argument(
                "prefetch.num_workers must be greater than 0",
            ));
        }
        if self.prefetch == 0 {
            return Err(CorpusError::invalid_argument(
                "prefetch.prefetch must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl FromStr for CorpusConfig {
    type Err = CorpusError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| CorpusError::config_with_source("failed to parse TOML config", e))
    }
}

impl CorpusConfig {
    // Load configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| CorpusError::io_with_source(path, "failed to read config file", e))?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    // Apply environment variable overrides.
    //
    // Variables are prefixed with `CORPUS_` followed by section and field:
    // - `CORPUS_STORAGE_ROOT` overrides `storage.root`
    // - `CORPUS_PREFETCH_NUM_WORKERS` overrides `prefetch.num_workers`
    // Values that fail to parse are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("CORPUS_STORAGE_ROOT") {
            self.storage.root = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("CORPUS_CACHE_CAPACITY") {
            if let Ok(v) = val.parse() {
                self.cache.capacity = v;
            }
        }
        if let Ok(val) = std::env::var("CORPUS_PREFETCH_NUM_WORKERS") {
            if let Ok(v) = val.parse() {
                self.prefetch.num_workers = v;
            }
        }
        if let Ok(val) = std::env::var("CORPUS_PREFETCH_PREFETCH") {
            if let Ok(v) = val.parse() {
                self.prefetch.prefetch = v;
            }
        }
        if let Ok(val) = std::env::var("CORPUS_PREFETCH_SHUTDOWN_WAIT") {
            if let Ok(v) = val.parse() {
                self.prefetch.shutdown_wait = v;
            }
        }
        if let Ok(val) = std::env::var("CORPUS_AUDIO_SAMPLE_RATE") {
            if let Ok(v) = val.parse() {
                self.audio.sample_rate = v;
            }
        }
        self
    }

    // Validate all configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.storage.root.exists() && !self.storage.root.is_dir() {
            return Err(CorpusError::config(format!(
                "storage.root {} exists but is not a directory",
                self.storage.root.display()
            )));
        }

        if self.prefetch.num_workers == 0 {
            return Err(CorpusError::config(
                "prefetch.num_workers must be greater than 0",
            ));
        }
        if self.prefetch.prefetch == 0 {
            return Err(CorpusError::config(
                "prefetch.prefetch must be greater than 0",
            ));
        }

        if self.audio.sample_rate == 0 {
            return Err(CorpusError::config(
                "audio.sample_rate must be greater than 0",
            ));
        }

        Ok(())
    }
}
