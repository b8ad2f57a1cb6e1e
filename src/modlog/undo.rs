//! Undo Engine
//!
//! Replays journal entries newest-first, restoring each field's old value.
//! Structural fields (lifecycle, parent, name, revision pointer) go through
//! the tree store so the child index and ancestor hashes/sizes stay
//! consistent. Restores are journaled themselves, so an undo can be undone.

use crate::error::{FsError, StorageError, StorageResultExt};
use crate::modlog::{revision_note, Field, ModificationEntry, ModificationLog};
use crate::store::Transaction;
use crate::tree::node::{Lifecycle, NodeProperties};
use crate::tree::nodes;
use crate::tree::TreeNodeStore;
use crate::types::{NodeId, ObjectId, RecordId};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, info};

const OPERATION: &str = "undo";

/// Which journal entries to replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UndoFilter {
    /// Restrict to these records; None means every record.
    pub record_ids: Option<Vec<RecordId>>,
    /// Only entries with `instance_seq > after_seq`.
    pub after_seq: u64,
}

impl UndoFilter {
    pub fn after(after_seq: u64) -> Self {
        Self {
            record_ids: None,
            after_seq,
        }
    }

    pub fn with_records(mut self, record_ids: impl IntoIterator<Item = RecordId>) -> Self {
        self.record_ids = Some(record_ids.into_iter().collect());
        self
    }

    pub fn matches(&self, entry: &ModificationEntry) -> bool {
        entry.instance_seq > self.after_seq
            && self
                .record_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&entry.record_id))
    }
}

/// What an undo touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UndoReport {
    pub replayed: usize,
    pub nodes: BTreeSet<NodeId>,
}

pub struct UndoEngine {
    tree: TreeNodeStore,
    journal: ModificationLog,
}

fn decode<T: DeserializeOwned>(value: &Value, entry: &ModificationEntry) -> Result<T, FsError> {
    serde_json::from_value(value.clone())
        .map_err(StorageError::from)
        .context(|| format!("decode journal entry {}", entry.instance_seq))
}

fn wrong_record(entry: &ModificationEntry) -> FsError {
    FsError::storage(
        format!("replay journal entry {}", entry.instance_seq),
        StorageError::Corrupt(format!("field {:?} does not apply to {}", entry.field, entry.record_id)),
    )
}

impl UndoEngine {
    pub fn new(tree: TreeNodeStore) -> Self {
        let journal = *tree.journal();
        Self { tree, journal }
    }

    /// Replay every matching entry in reverse order inside `txn`.
    pub fn undo(&self, txn: &mut Transaction<'_>, filter: &UndoFilter) -> Result<UndoReport, FsError> {
        let entries: Vec<ModificationEntry> = self
            .journal
            .entries_after(txn, filter.after_seq, None)?
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect();

        let mut report = UndoReport::default();
        for entry in entries.iter().rev() {
            let node = self.replay(txn, entry)?;
            report.nodes.insert(node);
            report.replayed += 1;
        }
        info!(
            after_seq = filter.after_seq,
            replayed = report.replayed,
            "Undo finished"
        );
        Ok(report)
    }

    /// Restore one entry; returns the node whose state changed.
    fn replay(&self, txn: &mut Transaction<'_>, entry: &ModificationEntry) -> Result<NodeId, FsError> {
        debug!(seq = entry.instance_seq, record = %entry.record_id, field = ?entry.field, "Replaying journal entry");
        match (entry.record_id, entry.field) {
            (RecordId::Object(object_id), Field::Revision) => {
                let revision: u64 = decode(&entry.old_value, entry)?;
                self.restore_revision(txn, object_id, revision, entry)
            }
            (RecordId::Node(node_id), Field::Lifecycle) => {
                let target = match &entry.old_value {
                    Value::Null => Lifecycle::SoftDeleted { at: Utc::now() },
                    value => decode(value, entry)?,
                };
                self.tree.set_lifecycle(txn, node_id, target, OPERATION)?;
                Ok(node_id)
            }
            (RecordId::Node(node_id), Field::ParentId) => {
                let parent: Option<NodeId> = decode(&entry.old_value, entry)?;
                let name = nodes::load(txn, node_id)?.name;
                self.tree.relocate(txn, node_id, parent, &name, OPERATION)?;
                Ok(node_id)
            }
            (RecordId::Node(node_id), Field::Name) => {
                let name: String = decode(&entry.old_value, entry)?;
                let parent = nodes::load(txn, node_id)?.parent_id;
                self.tree.relocate(txn, node_id, parent, &name, OPERATION)?;
                Ok(node_id)
            }
            (RecordId::Node(node_id), Field::AclNode) => {
                let acl_node: Option<NodeId> = decode(&entry.old_value, entry)?;
                let mut node = nodes::load(txn, node_id)?;
                self.journal
                    .record(txn, OPERATION, node_id, Field::AclNode, &node.acl_node, &acl_node, None)?;
                node.acl_node = acl_node;
                nodes::put(txn, &node)?;
                Ok(node_id)
            }
            (RecordId::Node(node_id), Field::Quota) => {
                let quota: Option<u64> = decode(&entry.old_value, entry)?;
                let mut node = nodes::load(txn, node_id)?;
                self.journal
                    .record(txn, OPERATION, node_id, Field::Quota, &node.quota, &quota, None)?;
                node.quota = quota;
                nodes::put(txn, &node)?;
                Ok(node_id)
            }
            (RecordId::Node(node_id), Field::Properties) => {
                let properties: NodeProperties = decode(&entry.old_value, entry)?;
                let node = nodes::load(txn, node_id)?;
                self.tree.replace_properties(txn, node, properties, OPERATION)?;
                Ok(node_id)
            }
            _ => Err(wrong_record(entry)),
        }
    }

    fn restore_revision(
        &self,
        txn: &mut Transaction<'_>,
        object_id: ObjectId,
        revision: u64,
        entry: &ModificationEntry,
    ) -> Result<NodeId, FsError> {
        let objects = self.tree.objects();
        let current = objects.get(txn, object_id)?.revision;
        if current == revision {
            return objects.get(txn, object_id).map(|o| o.owner);
        }
        let object = objects.set_current_revision(txn, object_id, revision)?;
        self.journal.record(
            txn,
            OPERATION,
            object_id,
            Field::Revision,
            &current,
            &revision,
            Some(format!("{} undoing #{}", revision_note(current, revision), entry.instance_seq)),
        )?;
        let node = self.tree.sync_file_node(txn, &object)?;
        Ok(node.id)
    }
}
