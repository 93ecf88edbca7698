//! Error types for StrataKV
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using StrataError
pub type Result<T> = std::result::Result<T, StrataError>;

/// Unified error type for StrataKV operations
///
/// A missing key is not an error: point reads return `Ok(None)`.
#[derive(Debug, Error)]
pub enum StrataError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("SSTable corruption detected: {0}")]
    Corruption(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("Failed to open {count} SSTable file(s): {failed:?}", count = .failed.len())]
    Recovery { failed: Vec<PathBuf> },

    // -------------------------------------------------------------------------
    // Flush Errors
    // -------------------------------------------------------------------------
    #[error("Flush of generation {generation} failed: {reason}")]
    FlushFailed { generation: u64, reason: String },

    #[error("Timed out waiting for pending flushes")]
    FlushTimeout,

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Shutdown error: {0}")]
    Shutdown(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
