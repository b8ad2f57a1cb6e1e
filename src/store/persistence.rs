//! Persistence layer for the metadata store

use crate::error::StorageError;
use crate::store::{ChangeSet, KvPair, MetadataBackend};
use parking_lot::Mutex;
use sled;
use std::path::Path;

/// Sled-based implementation of MetadataBackend
///
/// All record kinds share the default tree so a commit is a single
/// `sled::Batch`, which sled applies atomically.
pub struct SledBackend {
    db: sled::Db,
    commit_lock: Mutex<()>,
}

impl SledBackend {
    /// Create a new SledBackend at the given path
    ///
    /// The path can be a directory (sled will create a database there) or
    /// a file path (sled will use it as the database file).
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path.as_ref()).map_err(|e| {
            StorageError::Unavailable(format!(
                "Failed to open sled database at {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;
        Ok(Self {
            db,
            commit_lock: Mutex::new(()),
        })
    }

    /// Temporary database that is removed when dropped.
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self {
            db,
            commit_lock: Mutex::new(()),
        })
    }

    /// Get the underlying sled database (for advanced operations)
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    fn scan(&self, prefix: &[u8]) -> Result<Vec<KvPair>, StorageError> {
        let mut out = Vec::new();
        for item in self.db.scan_prefix(prefix) {
            let (key, value) = item?;
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }
}

impl MetadataBackend for SledBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.db.get(key)?.map(|v| v.to_vec()))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>, StorageError> {
        self.scan(prefix)
    }

    fn commit(&self, changes: ChangeSet) -> Result<(), StorageError> {
        let _guard = self.commit_lock.lock();
        changes.validate(|k| self.get(k), |p| self.scan(p))?;

        let mut batch = sled::Batch::default();
        for (key, value) in changes.writes {
            match value {
                Some(value) => batch.insert(key, value),
                None => batch.remove(key),
            }
        }
        self.db.apply_batch(batch)?;
        Ok(())
    }

    fn generate_id(&self) -> Result<u64, StorageError> {
        // sled starts at 0; keep 0 free so ids are always truthy
        Ok(self.db.generate_id()? + 1)
    }

    /// Flush all pending writes to disk
    fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}
