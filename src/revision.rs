//! Revision retention
//!
//! Purges old revisions of file objects under a count + age policy, recomputes
//! `revision_size`, and handles explicit administrative purges. The revision
//! a live object currently points at is never removed.

use crate::error::FsError;
use crate::object::{FileObject, FileObjectStore, Revision};
use crate::store::{keys, Transaction};
use crate::types::{hash_hex, Hash, ObjectId};
use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// Retention thresholds. A revision is purged only when it violates every
/// threshold that is set; with none set nothing is purged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Keep at least this many newest revisions.
    pub keep_num: Option<usize>,
    /// Keep revisions younger than this many months.
    pub keep_months: Option<u32>,
}

impl RetentionPolicy {
    pub fn is_disabled(&self) -> bool {
        self.keep_num.is_none() && self.keep_months.is_none()
    }
}

#[derive(Clone)]
pub struct RevisionManager {
    objects: FileObjectStore,
    policy: RetentionPolicy,
}

impl RevisionManager {
    pub fn new(objects: FileObjectStore, policy: RetentionPolicy) -> Self {
        Self { objects, policy }
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Revisions of `object` the policy would purge at `now`, oldest first.
    pub fn expired(&self, object: &FileObject, rows: &[Revision], now: DateTime<Utc>) -> Vec<u64> {
        if self.policy.is_disabled() {
            return Vec::new();
        }
        let newest_kept: HashSet<u64> = match self.policy.keep_num {
            Some(n) => object.available_revisions.iter().rev().take(n).copied().collect(),
            None => HashSet::new(),
        };
        let cutoff = self
            .policy
            .keep_months
            .and_then(|m| now.checked_sub_months(Months::new(m)));

        let mut out = Vec::new();
        for &revision in &object.available_revisions {
            if revision == object.revision || newest_kept.contains(&revision) {
                continue;
            }
            let too_old = match cutoff {
                Some(cutoff) => rows
                    .iter()
                    .find(|r| r.revision == revision)
                    .is_some_and(|r| r.created_at < cutoff),
                None => true,
            };
            if too_old {
                out.push(revision);
            }
        }
        out
    }

    /// Apply the retention policy to one object. Returns the purged numbers.
    pub fn clear_object_revisions(
        &self,
        txn: &mut Transaction<'_>,
        object_id: ObjectId,
        now: DateTime<Utc>,
    ) -> Result<Vec<u64>, FsError> {
        let Some(object) = self.objects.find(txn, object_id)? else {
            return Ok(Vec::new());
        };
        let rows = self.objects.revisions(txn, object_id)?;
        let expired = self.expired(&object, &rows, now);
        if expired.is_empty() {
            return Ok(expired);
        }
        self.remove(txn, object, &expired)
    }

    /// Drop the given revisions of an object; unknown objects are a no-op.
    pub fn delete_object_revisions(
        &self,
        txn: &mut Transaction<'_>,
        object_id: ObjectId,
        revisions: &[u64],
    ) -> Result<Vec<u64>, FsError> {
        match self.objects.find(txn, object_id)? {
            Some(object) => self.remove(txn, object, revisions),
            None => Ok(Vec::new()),
        }
    }

    /// Drop the given revisions from every object whose current content hash
    /// is `content_hash`. Objects with another hash are left alone.
    pub fn delete_revisions(
        &self,
        txn: &mut Transaction<'_>,
        content_hash: &Hash,
        revisions: &[u64],
    ) -> Result<usize, FsError> {
        let mut touched = 0;
        for id in self.objects.list_ids(txn)? {
            let object = self.objects.get(txn, id)?;
            if object.hash != *content_hash {
                continue;
            }
            if !self.remove(txn, object, revisions)?.is_empty() {
                touched += 1;
            }
        }
        debug!(hash = %hash_hex(content_hash), touched, "Deleted revisions by content hash");
        Ok(touched)
    }

    fn remove(
        &self,
        txn: &mut Transaction<'_>,
        mut object: FileObject,
        revisions: &[u64],
    ) -> Result<Vec<u64>, FsError> {
        let removed: Vec<u64> = revisions
            .iter()
            .copied()
            .filter(|r| *r != object.revision && object.available_revisions.contains(r))
            .collect();
        if removed.is_empty() {
            return Ok(removed);
        }
        for revision in &removed {
            txn.delete(keys::revision(object.id, *revision));
        }
        object.available_revisions.retain(|r| !removed.contains(r));
        self.objects.put(txn, &object)?;
        let revision_size = self.recalculate_revision_size(txn, object.id)?;
        info!(
            object_id = %object.id,
            purged = ?removed,
            revision_size,
            "Purged file revisions"
        );
        Ok(removed)
    }

    /// Recompute `revision_size` from the remaining revision rows.
    pub fn recalculate_revision_size(&self, txn: &mut Transaction<'_>, object_id: ObjectId) -> Result<u64, FsError> {
        let mut object = self.objects.get(txn, object_id)?;
        let total = self
            .objects
            .revisions(txn, object_id)?
            .iter()
            .filter(|r| object.available_revisions.contains(&r.revision))
            .map(|r| r.size)
            .sum();
        if object.revision_size != total {
            object.revision_size = total;
            self.objects.put(txn, &object)?;
        }
        Ok(total)
    }
}
