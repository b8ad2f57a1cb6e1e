//! Optimistic transactions over a [`MetadataBackend`].

use crate::error::StorageError;
use crate::store::{ChangeSet, KvPair, MetadataBackend};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

/// Unit of atomic work.
///
/// Reads go to the backend (or to this transaction's own pending writes) and
/// are remembered; writes are buffered until [`Transaction::commit`].
pub struct Transaction<'a> {
    backend: &'a dyn MetadataBackend,
    changes: ChangeSet,
}

impl<'a> Transaction<'a> {
    pub fn new(backend: &'a dyn MetadataBackend) -> Self {
        Self {
            backend,
            changes: ChangeSet::default(),
        }
    }

    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        if let Some(pending) = self.changes.writes.get(key) {
            return Ok(pending.clone());
        }
        if let Some(observed) = self.changes.reads.get(key) {
            return Ok(observed.clone());
        }
        let value = self.backend.get(key)?;
        self.changes.reads.insert(key.to_vec(), value.clone());
        Ok(value)
    }

    /// Prefix scan merged with this transaction's pending writes.
    pub fn scan_prefix(&mut self, prefix: &[u8]) -> Result<Vec<KvPair>, StorageError> {
        let observed = self.backend.scan_prefix(prefix)?;
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = observed.iter().cloned().collect();
        self.changes.scans.push((prefix.to_vec(), observed));

        for (key, pending) in self.changes.writes.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            match pending {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.changes.writes.insert(key, Some(value));
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.changes.writes.insert(key, None);
    }

    /// Read and decode a bincode record.
    pub fn get_record<T: DeserializeOwned>(&mut self, key: &[u8]) -> Result<Option<T>, StorageError> {
        match self.get(key)? {
            Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn put_record<T: Serialize>(&mut self, key: Vec<u8>, record: &T) -> Result<(), StorageError> {
        let raw = bincode::serialize(record)?;
        self.put(key, raw);
        Ok(())
    }

    pub fn has_writes(&self) -> bool {
        !self.changes.is_read_only()
    }

    pub fn backend(&self) -> &'a dyn MetadataBackend {
        self.backend
    }

    /// Validate and apply. Read-only transactions commit trivially.
    pub fn commit(self) -> Result<(), StorageError> {
        if self.changes.is_read_only() {
            return Ok(());
        }
        self.backend.commit(self.changes)
    }
}
