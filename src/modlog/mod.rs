//! Modification Log
//!
//! Append-only journal of field changes. Each mutating operation appends one
//! entry per changed field, all inside the operation's own transaction, so an
//! operation's entries form a contiguous run of `instance_seq` values.
//!
//! Entries never carry content hashes. File content changes are journaled as
//! revision pointer moves; the hash is looked up from the revision row when
//! replaying.

pub mod undo;

pub use undo::{UndoEngine, UndoFilter, UndoReport};

use crate::error::{FsError, StorageError, StorageResultExt};
use crate::store::{keys, Transaction};
use crate::types::RecordId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

/// Journaled field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// Node lifecycle; `null` before creation.
    Lifecycle,
    ParentId,
    Name,
    AclNode,
    Quota,
    Properties,
    /// File object's current revision pointer.
    Revision,
}

/// One journaled field change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModificationEntry {
    pub instance_seq: u64,
    pub record_id: RecordId,
    pub field: Field,
    pub old_value: Value,
    pub new_value: Value,
    /// Human-readable summary, e.g. `revision (1 -> 2)`.
    pub note: Option<String>,
    pub operation: String,
    pub timestamp: DateTime<Utc>,
}

/// Journal writer/reader.
#[derive(Debug, Clone, Copy)]
pub struct ModificationLog {
    active: bool,
}

pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Value, FsError> {
    serde_json::to_value(value)
        .map_err(StorageError::from)
        .context(|| "encode journal value")
}

impl ModificationLog {
    pub fn new(active: bool) -> Self {
        Self { active }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Append one field change. Returns the assigned sequence number, or
    /// None when journaling is switched off.
    #[allow(clippy::too_many_arguments)]
    pub fn record<O, N>(
        &self,
        txn: &mut Transaction<'_>,
        operation: &str,
        record_id: impl Into<RecordId>,
        field: Field,
        old: &O,
        new: &N,
        note: Option<String>,
    ) -> Result<Option<u64>, FsError>
    where
        O: Serialize + ?Sized,
        N: Serialize + ?Sized,
    {
        if !self.active {
            return Ok(None);
        }
        let record_id = record_id.into();
        let seq = next_seq(txn)?;
        let entry = ModificationEntry {
            instance_seq: seq,
            record_id,
            field,
            old_value: to_json(old)?,
            new_value: to_json(new)?,
            note,
            operation: operation.to_string(),
            timestamp: Utc::now(),
        };
        let raw = serde_json::to_vec(&entry)
            .map_err(StorageError::from)
            .context(|| format!("encode journal entry {}", seq))?;
        txn.put(keys::modlog(seq), raw);
        trace!(seq, record = %record_id, field = ?field, operation, "Journaled change");
        Ok(Some(seq))
    }

    /// Highest sequence number handed out so far (0 if none).
    pub fn last_seq(&self, txn: &mut Transaction<'_>) -> Result<u64, FsError> {
        read_seq(txn)
    }

    /// Entries with `instance_seq > after_seq`, ascending, at most `limit`.
    pub fn entries_after(
        &self,
        txn: &mut Transaction<'_>,
        after_seq: u64,
        limit: Option<usize>,
    ) -> Result<Vec<ModificationEntry>, FsError> {
        let pairs = txn
            .scan_prefix(keys::MODLOG_PREFIX.as_bytes())
            .context(|| "scan modification log")?;
        let mut out = Vec::new();
        for (_, raw) in pairs {
            let entry: ModificationEntry = serde_json::from_slice(&raw)
                .map_err(StorageError::from)
                .context(|| "decode journal entry")?;
            if entry.instance_seq <= after_seq {
                continue;
            }
            out.push(entry);
            if limit.is_some_and(|l| out.len() >= l) {
                break;
            }
        }
        Ok(out)
    }
}

fn read_seq(txn: &mut Transaction<'_>) -> Result<u64, FsError> {
    let raw = txn
        .get(keys::INSTANCE_SEQ_KEY.as_bytes())
        .context(|| "read instance sequence")?;
    match raw {
        Some(raw) => keys::decode_id(&raw).ok_or_else(|| {
            FsError::storage(
                "read instance sequence",
                StorageError::Corrupt("instance sequence is not a u64".into()),
            )
        }),
        None => Ok(0),
    }
}

fn next_seq(txn: &mut Transaction<'_>) -> Result<u64, FsError> {
    let next = read_seq(txn)? + 1;
    txn.put(keys::INSTANCE_SEQ_KEY.as_bytes().to_vec(), keys::encode_id(next));
    Ok(next)
}

/// Note for a revision pointer move, e.g. `revision (1 -> 2)`.
pub fn revision_note(old: u64, new: u64) -> String {
    format!("revision ({} -> {})", old, new)
}
