//! Error types for the tree engine.
//!
//! `StorageError` is what the metadata backend and blob store report.
//! `FsError` is the operation-level taxonomy surfaced to callers; backend
//! failures are wrapped with the operation context before they get there.

use crate::types::{hash_hex, Hash, ObjectId};
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// A key read by the transaction changed before commit.
    #[error("Transaction conflict: read set changed before commit")]
    Conflict,

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        match err {
            sled::Error::Io(e) => StorageError::IoError(e),
            sled::Error::Corruption { .. } => StorageError::Corrupt(err.to_string()),
            other => StorageError::Unavailable(other.to_string()),
        }
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Corrupt(format!("bincode: {}", err))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Corrupt(format!("json: {}", err))
    }
}

/// Operation-level errors
#[derive(Debug, Error)]
pub enum FsError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Unexpected value: {0}")]
    UnexpectedValue(String),

    #[error("Directory not empty: {0}")]
    NotEmpty(String),

    /// Optimistic concurrency check failed; retry the whole operation.
    #[error("Conflict during {0}, retry the operation")]
    Conflict(String),

    #[error("Checksum mismatch for {object_id}: expected {}, got {}", hash_hex(.expected), hash_hex(.actual))]
    ChecksumMismatch {
        object_id: ObjectId,
        expected: Hash,
        actual: Hash,
    },

    #[error("Backend unavailable during {context}: {reason}")]
    BackendUnavailable { context: String, reason: String },

    #[error("Storage error during {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: StorageError,
    },

    #[error("External service failed: {0}")]
    Service(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FsError {
    /// Wrap a backend error with the operation context it occurred in.
    pub fn storage(context: impl Into<String>, source: StorageError) -> Self {
        let context = context.into();
        match source {
            StorageError::Conflict => FsError::Conflict(context),
            StorageError::Unavailable(reason) => FsError::BackendUnavailable { context, reason },
            source => FsError::Storage { context, source },
        }
    }

    /// Whether the caller should retry the surrounding operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FsError::Conflict(_) | FsError::BackendUnavailable { .. })
    }
}

impl From<config::ConfigError> for FsError {
    fn from(err: config::ConfigError) -> Self {
        FsError::Config(err.to_string())
    }
}

/// Attach operation context to storage results.
pub trait StorageResultExt<T> {
    fn context<C: Into<String>>(self, context: impl FnOnce() -> C) -> Result<T, FsError>;
}

impl<T> StorageResultExt<T> for Result<T, StorageError> {
    fn context<C: Into<String>>(self, context: impl FnOnce() -> C) -> Result<T, FsError> {
        self.map_err(|e| FsError::storage(context(), e))
    }
}
