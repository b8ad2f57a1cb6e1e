//! Content-addressed blob storage
//!
//! The core only ever talks to [`BlobStore`]; where bytes physically live is
//! the implementation's business.

use crate::error::StorageError;
use crate::types::{hash_hex, Hash};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Byte storage capability, addressed by content hash.
pub trait BlobStore: Send + Sync {
    /// Store `data` under `hash`. Storing an existing hash is a no-op.
    fn put(&self, hash: &Hash, data: &[u8]) -> Result<(), StorageError>;
    fn get(&self, hash: &Hash) -> Result<Option<Vec<u8>>, StorageError>;
    fn contains(&self, hash: &Hash) -> Result<bool, StorageError>;
    /// Remove a blob. Removing a missing blob is a no-op.
    fn delete(&self, hash: &Hash) -> Result<(), StorageError>;
    fn list(&self) -> Result<Vec<Hash>, StorageError>;
}

/// Filesystem blob store
///
/// Stores blobs at `{root}/blobs/{hex[0..2]}/{hex[2..4]}/{hex}.blob`, which
/// spreads files across subdirectories and makes identical content land on
/// the same path.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create a new FsBlobStore at the given root path
    ///
    /// The directory structure will be created as needed.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StorageError> {
        let blobs_dir = root.as_ref().join("blobs");
        fs::create_dir_all(&blobs_dir).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to create blobs directory at {:?}: {}", blobs_dir, e),
            ))
        })?;
        let root = dunce::canonicalize(root.as_ref())?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, hash: &Hash) -> PathBuf {
        let hex = hash_hex(hash);
        self.root
            .join("blobs")
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(format!("{}.blob", hex))
    }
}

impl BlobStore for FsBlobStore {
    /// Uses atomic writes (write to .tmp, then rename).
    fn put(&self, hash: &Hash, data: &[u8]) -> Result<(), StorageError> {
        let path = self.blob_path(hash);
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = path.with_extension("blob.tmp");
        fs::write(&temp_path, data)?;
        fs::rename(&temp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to rename temp file to {:?}: {}", path, e),
            ))
        })?;
        debug!(blob = %hash_hex(hash), bytes = data.len(), "Stored blob");
        Ok(())
    }

    fn get(&self, hash: &Hash) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.blob_path(hash);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(&path)?))
    }

    fn contains(&self, hash: &Hash) -> Result<bool, StorageError> {
        Ok(self.blob_path(hash).exists())
    }

    fn delete(&self, hash: &Hash) -> Result<(), StorageError> {
        match fs::remove_file(self.blob_path(hash)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<Hash>, StorageError> {
        let mut out = Vec::new();
        for entry in WalkDir::new(self.root.join("blobs")) {
            let entry = entry.map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Failed to walk blob directory: {}", e),
                ))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(stem) = entry.path().file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(hex_part) = stem.strip_suffix(".blob") else {
                continue;
            };
            let mut hash = [0u8; 32];
            if hex::decode_to_slice(hex_part, &mut hash).is_ok() {
                out.push(hash);
            }
        }
        Ok(out)
    }
}

/// In-memory blob store
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<Hash, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a blob's bytes in place, bypassing content addressing.
    pub fn corrupt(&self, hash: &Hash, data: Vec<u8>) {
        self.blobs.write().insert(*hash, data);
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, hash: &Hash, data: &[u8]) -> Result<(), StorageError> {
        self.blobs.write().entry(*hash).or_insert_with(|| data.to_vec());
        Ok(())
    }

    fn get(&self, hash: &Hash) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.blobs.read().get(hash).cloned())
    }

    fn contains(&self, hash: &Hash) -> Result<bool, StorageError> {
        Ok(self.blobs.read().contains_key(hash))
    }

    fn delete(&self, hash: &Hash) -> Result<(), StorageError> {
        self.blobs.write().remove(hash);
        Ok(())
    }

    fn list(&self) -> Result<Vec<Hash>, StorageError> {
        Ok(self.blobs.read().keys().copied().collect())
    }
}
