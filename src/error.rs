//! Error types for fastmig
//!
//! This module defines the error hierarchy covering:
//! - Storage provider errors (local filesystem and object store)
//! - State store errors
//! - Configuration and CLI errors
//! - Worker pool errors
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Errors should be actionable - include context about what to do
//! - Preserve error chains for debugging

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the fastmig application
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Storage provider errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// State store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation cancelled by shutdown or scope cancellation
    #[error("Operation cancelled")]
    Cancelled,

    /// Job queue closed unexpectedly
    #[error("Job queue closed unexpectedly")]
    QueueClosed,

    /// Streaming integrity check failed
    #[error("Checksum mismatch for '{path}': read {read:#018x}, wrote {wrote:#018x}")]
    ChecksumMismatch {
        path: String,
        read: u64,
        wrote: u64,
    },
}

impl MigrateError {
    /// True when the error represents cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            MigrateError::Cancelled | MigrateError::Provider(ProviderError::Cancelled)
        )
    }
}

/// Storage provider errors
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Path does not exist on the backend
    #[error("Path not found: '{path}'")]
    NotFound { path: String },

    /// Local filesystem operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Object store operation failed
    #[error("Object store error for '{path}': {reason}")]
    Object { path: String, reason: String },

    /// Failed to construct the provider (credentials, runtime, config)
    #[error("Failed to initialize provider: {0}")]
    InitFailed(String),

    /// Operation cancelled mid-flight
    #[error("Operation cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Check whether this error means the path simply does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            ProviderError::NotFound { .. } => true,
            ProviderError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// State store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Record serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Failed to create or open the database file
    #[error("Failed to open state store at '{path}': {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    /// Job record does not exist
    #[error("Job not found: '{id}'")]
    JobNotFound { id: String },
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid stream (worker) count
    #[error("Invalid stream count {count}: must be between 1 and {max}")]
    InvalidStreamCount { count: usize, max: usize },

    /// Invalid buffer size
    #[error("Invalid buffer size {size}: must be between {min} and {max} bytes")]
    InvalidBufferSize { size: usize, min: usize, max: usize },

    /// Invalid queue capacity
    #[error("Invalid queue capacity {size}: must be at least {min}")]
    InvalidQueueCapacity { size: usize, min: usize },

    /// Failed to parse a storage URL
    #[error("Invalid storage URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// State directory error
    #[error("Invalid state directory '{path}': {reason}")]
    InvalidStateDir { path: PathBuf, reason: String },
}

/// Worker pool errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker thread could not be spawned
    #[error("Failed to spawn worker {id}: {reason}")]
    SpawnFailed { id: usize, reason: String },

    /// Worker panicked
    #[error("Worker {id} panicked")]
    Panicked { id: usize },

    /// Job queue send failed (queue closed)
    #[error("Failed to enqueue job: queue closed")]
    QueueSendFailed,
}

/// Result type alias for MigrateError
pub type Result<T> = std::result::Result<T, MigrateError>;

/// Result type alias for ProviderError
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Result type alias for StoreError
pub type StoreResult<T> = std::result::Result<T, StoreError>;
