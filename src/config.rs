//! Configuration System
//!
//! Layered configuration: built-in defaults, the per-user config file, the
//! workspace `config/` directory, then `TREEFS__*` environment variables.

use crate::error::FsError;
use crate::logging::LoggingConfig;
use crate::revision::RetentionPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

mod loader;
mod merge {
    pub mod merge_policy;
}
mod sources {
    pub mod global_file;
    pub mod workspace_file;
}

pub use loader::ConfigLoader;

/// Everything a [`crate::Filesystem`] needs to open. Every section is
/// optional in the source files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    pub storage: StorageConfig,
    /// Revision retention thresholds
    pub revisions: RetentionPolicy,
    pub filesystem: FilesystemConfig,
    pub quota: QuotaConfig,
    pub transaction: TransactionConfig,
    pub stat_cache: StatCacheConfig,
    pub logging: LoggingConfig,
}

/// Which metadata backend to open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Sled,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// Sled database directory
    pub metadata_path: PathBuf,
    /// Root of the content-addressed blob tree
    pub blob_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = PathBuf::from(".treefs");
        Self {
            backend: BackendKind::Sled,
            metadata_path: base.join("metadata"),
            blob_path: base.join("content"),
        }
    }
}

/// Feature switches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesystemConfig {
    /// Journal every field change (required for undo)
    pub modlog_active: bool,
    /// Feed new content to the indexer right after each write
    pub index_content: bool,
    pub create_previews: bool,
    /// Mail folder subscribers when files below them change
    pub enable_notifications: bool,
    /// Folders directly inside `shared` or `personal/{account}` become ACL roots
    pub container_acl_roots: bool,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            modlog_active: true,
            index_content: false,
            create_previews: false,
            enable_notifications: false,
            container_acl_roots: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Always notified about quota violations
    pub notification_recipients: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Retries after an optimistic conflict before giving up
    pub max_conflict_retries: u32,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self { max_conflict_retries: 8 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatCacheConfig {
    /// Maximum cached paths; 0 disables the cache
    pub capacity: usize,
}

impl Default for StatCacheConfig {
    fn default() -> Self {
        Self { capacity: 4096 }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Storage(String),
    Revisions(String),
    Transaction(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Revisions(msg) => write!(f, "Revisions: {}", msg),
            ValidationError::Transaction(msg) => write!(f, "Transaction: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.backend == BackendKind::Sled {
            if self.metadata_path.as_os_str().is_empty() {
                return Err("Metadata path cannot be empty".to_string());
            }
            if self.blob_path.as_os_str().is_empty() {
                return Err("Blob path cannot be empty".to_string());
            }
        }
        Ok(())
    }
}

impl FsConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.storage.validate() {
            errors.push(ValidationError::Storage(e));
        }
        if self.revisions.keep_num == Some(0) {
            errors.push(ValidationError::Revisions(
                "keep_num must be at least 1 (the current revision is always kept)".to_string(),
            ));
        }
        if self.transaction.max_conflict_retries == 0 {
            errors.push(ValidationError::Transaction(
                "max_conflict_retries must be at least 1".to_string(),
            ));
        }
        if !matches!(
            self.logging.level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error" | "off"
        ) {
            errors.push(ValidationError::Logging(format!(
                "Unknown log level: {}",
                self.logging.level
            )));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold the errors into one `FsError::Config`.
    pub fn ensure_valid(&self) -> Result<(), FsError> {
        self.validate().map_err(|errors| {
            let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            FsError::Config(format!("Configuration validation failed:\n{}", msgs.join("\n")))
        })
    }

    /// In-memory backend, everything else default. Handy for tests and embedding.
    pub fn in_memory() -> Self {
        Self {
            storage: StorageConfig {
                backend: BackendKind::Memory,
                ..StorageConfig::default()
            },
            ..Self::default()
        }
    }
}
