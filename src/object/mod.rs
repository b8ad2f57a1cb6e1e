//! File Object Store
//!
//! Content-addressed file objects: current content hash and size, the
//! revision chain, and revision size bookkeeping. Bytes go to the
//! [`BlobStore`]; only metadata lives in the transaction.

pub mod blob;

pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore};

use crate::error::{FsError, StorageResultExt};
use crate::store::{keys, Transaction};
use crate::tree::hasher::ContentHasher;
use crate::types::{hash_hex, Hash, NodeId, ObjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const DIGEST_CHUNK: usize = 64 * 1024;

/// FileObject: content metadata owned by exactly one live file node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileObject {
    pub id: ObjectId,
    /// File node holding this object.
    pub owner: NodeId,
    /// Hash of the current revision; zero before the first write.
    pub hash: Hash,
    pub size: u64,
    /// Current revision pointer; 0 before the first write.
    pub revision: u64,
    /// Retained revisions, ascending.
    pub available_revisions: Vec<u64>,
    /// Sum of sizes of the retained revisions.
    pub revision_size: u64,
    /// Last hash successfully handed to the content indexer.
    pub indexed_hash: Option<Hash>,
    pub content_type: String,
    pub preview_count: u32,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl FileObject {
    /// Number the next write will get. Never reuses a number, even after undo
    /// has moved the pointer back.
    pub fn next_revision(&self) -> u64 {
        self.available_revisions
            .last()
            .copied()
            .unwrap_or(0)
            .max(self.revision)
            + 1
    }

    pub fn is_indexed(&self) -> bool {
        self.revision > 0 && self.indexed_hash == Some(self.hash)
    }
}

/// Revision: immutable snapshot of an object's content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub object_id: ObjectId,
    pub revision: u64,
    pub content_hash: Hash,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a content write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevisionChange {
    pub old_revision: u64,
    pub new_revision: u64,
    pub old_size: u64,
    pub new_size: u64,
    pub hash: Hash,
    /// True if the blob already existed and was shared.
    pub deduplicated: bool,
}

/// Apply a signed delta to a size, clamping at zero.
///
/// A negative result means the recorded size was already wrong; it is
/// logged and clamped rather than failing the operation.
pub fn clamp_size(current: u64, delta: i64, subject: impl Display) -> u64 {
    let next = current as i128 + delta as i128;
    if next < 0 {
        warn!(
            subject = %subject,
            recorded = current,
            delta,
            "Size would become negative, clamping to 0"
        );
        0
    } else {
        next.min(u64::MAX as i128) as u64
    }
}

/// Revision-chain operations over file objects.
#[derive(Clone)]
pub struct FileObjectStore {
    hasher: Arc<dyn ContentHasher>,
    blobs: Arc<dyn BlobStore>,
}

impl FileObjectStore {
    pub fn new(hasher: Arc<dyn ContentHasher>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { hasher, blobs }
    }

    pub fn hasher(&self) -> &dyn ContentHasher {
        self.hasher.as_ref()
    }

    pub fn blobs(&self) -> &dyn BlobStore {
        self.blobs.as_ref()
    }

    /// Stream a digest over `content` in fixed-size chunks.
    pub fn digest(&self, content: &[u8]) -> Hash {
        let mut d = self.hasher.begin();
        for chunk in content.chunks(DIGEST_CHUNK) {
            d.update(chunk);
        }
        d.finalize()
    }

    /// Create an empty object (revision 0, no content yet).
    pub fn create(
        &self,
        txn: &mut Transaction<'_>,
        owner: NodeId,
        content_type: Option<&str>,
    ) -> Result<FileObject, FsError> {
        let id = ObjectId(txn.backend().generate_id().context(|| "allocate object id")?);
        let now = Utc::now();
        let object = FileObject {
            id,
            owner,
            hash: [0u8; 32],
            size: 0,
            revision: 0,
            available_revisions: Vec::new(),
            revision_size: 0,
            indexed_hash: None,
            content_type: content_type.unwrap_or(DEFAULT_CONTENT_TYPE).to_string(),
            preview_count: 0,
            created_at: now,
            modified_at: now,
        };
        self.put(txn, &object)?;
        Ok(object)
    }

    pub fn get(&self, txn: &mut Transaction<'_>, id: ObjectId) -> Result<FileObject, FsError> {
        self.find(txn, id)?
            .ok_or_else(|| FsError::NotFound(format!("file object {}", id)))
    }

    pub fn find(&self, txn: &mut Transaction<'_>, id: ObjectId) -> Result<Option<FileObject>, FsError> {
        txn.get_record(&keys::object(id))
            .context(|| format!("load file object {}", id))
    }

    pub fn put(&self, txn: &mut Transaction<'_>, object: &FileObject) -> Result<(), FsError> {
        txn.put_record(keys::object(object.id), object)
            .context(|| format!("store file object {}", object.id))
    }

    /// Every object id in the store.
    pub fn list_ids(&self, txn: &mut Transaction<'_>) -> Result<Vec<ObjectId>, FsError> {
        let pairs = txn
            .scan_prefix(keys::OBJECT_PREFIX.as_bytes())
            .context(|| "scan file objects")?;
        let mut ids = Vec::with_capacity(pairs.len());
        for (_, raw) in pairs {
            let object: FileObject = bincode::deserialize(&raw)
                .map_err(crate::error::StorageError::from)
                .context(|| "decode file object")?;
            ids.push(object.id);
        }
        Ok(ids)
    }

    /// Write new content as the next revision.
    pub fn write(
        &self,
        txn: &mut Transaction<'_>,
        id: ObjectId,
        content: &[u8],
    ) -> Result<RevisionChange, FsError> {
        let digest = self.digest(content);
        self.write_digested(txn, id, digest, content)
    }

    /// Write content whose digest the caller already streamed.
    ///
    /// Identical content still advances the revision; the blob is shared.
    pub fn write_digested(
        &self,
        txn: &mut Transaction<'_>,
        id: ObjectId,
        digest: Hash,
        content: &[u8],
    ) -> Result<RevisionChange, FsError> {
        let mut object = self.get(txn, id)?;

        let exists = self
            .blobs
            .contains(&digest)
            .context(|| format!("check blob for {}", id))?;
        if !exists {
            self.blobs
                .put(&digest, content)
                .context(|| format!("store blob for {}", id))?;
        }

        let size = content.len() as u64;
        let new_revision = object.next_revision();
        let now = Utc::now();
        let revision = Revision {
            object_id: id,
            revision: new_revision,
            content_hash: digest,
            size,
            created_at: now,
        };
        txn.put_record(keys::revision(id, new_revision), &revision)
            .context(|| format!("store revision {} of {}", new_revision, id))?;

        let change = RevisionChange {
            old_revision: object.revision,
            new_revision,
            old_size: object.size,
            new_size: size,
            hash: digest,
            deduplicated: exists,
        };

        object.hash = digest;
        object.size = size;
        object.revision = new_revision;
        object.available_revisions.push(new_revision);
        object.revision_size = object.revision_size.saturating_add(size);
        object.modified_at = now;
        self.put(txn, &object)?;

        debug!(
            object_id = %id,
            revision = new_revision,
            size,
            deduplicated = exists,
            "Wrote file revision"
        );
        Ok(change)
    }

    pub fn get_revision(
        &self,
        txn: &mut Transaction<'_>,
        id: ObjectId,
        revision: u64,
    ) -> Result<Option<Revision>, FsError> {
        txn.get_record(&keys::revision(id, revision))
            .context(|| format!("load revision {} of {}", revision, id))
    }

    /// All revision rows of an object, ascending.
    pub fn revisions(&self, txn: &mut Transaction<'_>, id: ObjectId) -> Result<Vec<Revision>, FsError> {
        let pairs = txn
            .scan_prefix(&keys::revisions_of(id))
            .context(|| format!("scan revisions of {}", id))?;
        pairs
            .into_iter()
            .map(|(_, raw)| {
                bincode::deserialize(&raw)
                    .map_err(crate::error::StorageError::from)
                    .context(|| format!("decode revision of {}", id))
            })
            .collect()
    }

    /// Read the bytes of the current or an explicit revision.
    pub fn read(
        &self,
        txn: &mut Transaction<'_>,
        id: ObjectId,
        revision: Option<u64>,
    ) -> Result<Vec<u8>, FsError> {
        let object = self.get(txn, id)?;
        let wanted = revision.unwrap_or(object.revision);
        if wanted == 0 {
            return Ok(Vec::new());
        }
        if !object.available_revisions.contains(&wanted) {
            return Err(FsError::NotFound(format!("revision {} of {}", wanted, id)));
        }
        let row = self
            .get_revision(txn, id, wanted)?
            .ok_or_else(|| FsError::NotFound(format!("revision {} of {}", wanted, id)))?;
        self.read_blob(id, &row.content_hash)
    }

    /// Fetch a blob and verify it against its address.
    pub fn read_blob(&self, id: ObjectId, expected: &Hash) -> Result<Vec<u8>, FsError> {
        let content = self
            .blobs
            .get(expected)
            .context(|| format!("read blob for {}", id))?
            .ok_or_else(|| FsError::NotFound(format!("content {} of {}", hash_hex(expected), id)))?;
        let actual = self.digest(&content);
        if actual != *expected {
            error!(
                object_id = %id,
                expected = %hash_hex(expected),
                actual = %hash_hex(&actual),
                "Stored content does not match its hash"
            );
            return Err(FsError::ChecksumMismatch {
                object_id: id,
                expected: *expected,
                actual,
            });
        }
        Ok(content)
    }

    /// Point the object at an existing revision (used by undo).
    pub fn set_current_revision(
        &self,
        txn: &mut Transaction<'_>,
        id: ObjectId,
        revision: u64,
    ) -> Result<FileObject, FsError> {
        let mut object = self.get(txn, id)?;
        if revision == 0 {
            object.revision = 0;
            object.hash = [0u8; 32];
            object.size = 0;
        } else {
            if !object.available_revisions.contains(&revision) {
                return Err(FsError::NotFound(format!("revision {} of {}", revision, id)));
            }
            let row = self
                .get_revision(txn, id, revision)?
                .ok_or_else(|| FsError::NotFound(format!("revision {} of {}", revision, id)))?;
            object.revision = revision;
            object.hash = row.content_hash;
            object.size = row.size;
        }
        object.modified_at = Utc::now();
        self.put(txn, &object)?;
        Ok(object)
    }

    /// Fresh object sharing `source`'s current content, with its own history.
    pub fn duplicate(
        &self,
        txn: &mut Transaction<'_>,
        source: ObjectId,
        owner: NodeId,
    ) -> Result<FileObject, FsError> {
        let src = self.get(txn, source)?;
        let mut copy = self.create(txn, owner, Some(&src.content_type))?;
        if src.revision == 0 {
            return Ok(copy);
        }
        let now = Utc::now();
        let revision = Revision {
            object_id: copy.id,
            revision: 1,
            content_hash: src.hash,
            size: src.size,
            created_at: now,
        };
        txn.put_record(keys::revision(copy.id, 1), &revision)
            .context(|| format!("store revision 1 of {}", copy.id))?;
        copy.hash = src.hash;
        copy.size = src.size;
        copy.revision = 1;
        copy.available_revisions = vec![1];
        copy.revision_size = src.size;
        self.put(txn, &copy)?;
        Ok(copy)
    }

    /// Remove an object and all its revision rows. Blobs are left for the sweep.
    pub fn delete(&self, txn: &mut Transaction<'_>, id: ObjectId) -> Result<(), FsError> {
        for row in self.revisions(txn, id)? {
            txn.delete(keys::revision(id, row.revision));
        }
        txn.delete(keys::object(id));
        Ok(())
    }
}
