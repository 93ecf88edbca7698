//! Configuration for StrataKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, StrataError};

/// Main configuration for a StrataKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the SSTable files:
    ///   {data_dir}/
    ///     ├── 1_sstable.dat
    ///     ├── 2_sstable.dat
    ///     └── 3_sstable.tmp   (in-flight flush, never read)
    pub data_dir: PathBuf,

    /// Refuse to start if any SSTable fails to open
    /// (default: start with the files that did open and report the rest)
    pub strict_recovery: bool,

    /// Lowest generation number to use for new files.
    /// Never lowers the counter below one past the highest recovered file.
    pub start_generation: Option<u64>,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Max size of the current memtable before rotation (in bytes)
    pub memtable_size_limit: usize,

    // -------------------------------------------------------------------------
    // Flush Configuration
    // -------------------------------------------------------------------------
    /// Capacity of the hand-off queue to the flush worker.
    /// Writers block on rotation once this many tables are queued.
    pub flush_queue_capacity: usize,

    /// Attempts per flush job before the engine is marked degraded
    pub flush_max_attempts: u32,

    /// Delay before the first retry; doubles on every further attempt
    pub flush_retry_backoff: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./stratakv_data"),
            strict_recovery: false,
            start_generation: None,
            memtable_size_limit: 64 * 1024 * 1024, // 64 MB
            flush_queue_capacity: 2,
            flush_max_attempts: 3,
            flush_retry_backoff: Duration::from_millis(10),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check that every parameter is usable
    pub fn validate(&self) -> Result<()> {
        if self.flush_queue_capacity == 0 {
            return Err(StrataError::Config(
                "flush_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.flush_max_attempts == 0 {
            return Err(StrataError::Config(
                "flush_max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Fail startup when any SSTable cannot be opened
    pub fn strict_recovery(mut self, strict: bool) -> Self {
        self.config.strict_recovery = strict;
        self
    }

    /// Override the first generation used for new files
    pub fn start_generation(mut self, generation: u64) -> Self {
        self.config.start_generation = Some(generation);
        self
    }

    /// Set the memtable size limit (in bytes)
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    /// Set the flush queue capacity
    pub fn flush_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.flush_queue_capacity = capacity;
        self
    }

    /// Set the number of attempts per flush job
    pub fn flush_max_attempts(mut self, attempts: u32) -> Self {
        self.config.flush_max_attempts = attempts;
        self
    }

    /// Set the initial retry backoff
    pub fn flush_retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.flush_retry_backoff = backoff;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
