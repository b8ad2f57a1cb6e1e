//! Metadata Store
//!
//! Narrow capability over the relational backing store. Tree nodes, file
//! objects, revisions and the modification log are rows in a single ordered
//! keyspace, distinguished by key prefix. All mutation goes through a
//! [`Transaction`], which is validated and applied atomically on commit.

pub mod keys;
pub mod memory;
pub mod persistence;
pub mod transaction;

pub use memory::MemoryBackend;
pub use persistence::SledBackend;
pub use transaction::Transaction;

use crate::error::StorageError;
use std::collections::{BTreeMap, HashMap};

/// Raw key/value pair as stored by a backend.
pub type KvPair = (Vec<u8>, Vec<u8>);

/// Backing store interface
///
/// Implementations must make `commit` atomic: either every write in the
/// change set becomes visible or none does.
pub trait MetadataBackend: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// All pairs whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>, StorageError>;

    /// Validate the change set's read set and apply its writes atomically.
    ///
    /// Returns `StorageError::Conflict` if anything the transaction observed
    /// changed since it was read.
    fn commit(&self, changes: ChangeSet) -> Result<(), StorageError>;

    /// Allocate a fresh, never reused identifier.
    fn generate_id(&self) -> Result<u64, StorageError>;

    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Everything a transaction observed and wants to write.
#[derive(Debug, Default)]
pub struct ChangeSet {
    /// Point reads: key -> value observed at first read.
    pub reads: HashMap<Vec<u8>, Option<Vec<u8>>>,
    /// Prefix scans: prefix -> pairs observed.
    pub scans: Vec<(Vec<u8>, Vec<KvPair>)>,
    /// Buffered writes: key -> Some(value) to put, None to delete.
    pub writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl ChangeSet {
    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty()
    }

    /// Re-read everything this change set observed and compare.
    ///
    /// Callers hold the backend's commit lock while validating so that the
    /// check and the subsequent apply are not interleaved with another commit.
    pub fn validate<F, S>(&self, mut get: F, mut scan: S) -> Result<(), StorageError>
    where
        F: FnMut(&[u8]) -> Result<Option<Vec<u8>>, StorageError>,
        S: FnMut(&[u8]) -> Result<Vec<KvPair>, StorageError>,
    {
        for (key, observed) in &self.reads {
            if get(key)? != *observed {
                return Err(StorageError::Conflict);
            }
        }
        for (prefix, observed) in &self.scans {
            if scan(prefix)? != *observed {
                return Err(StorageError::Conflict);
            }
        }
        Ok(())
    }
}
