//! Ancestor propagation
//!
//! After a child changes, every ancestor's fingerprint is recomputed from its
//! live children and the child's size delta is folded into the aggregate.
//! Each level reads and rewrites the ancestor row inside the transaction, so
//! two concurrent updates under the same parent conflict on commit instead of
//! losing an update.

use crate::error::FsError;
use crate::object::clamp_size;
use crate::store::Transaction;
use crate::tree::hasher::{compute_directory_hash, ContentHasher};
use crate::tree::nodes;
use crate::types::{Hash, NodeId};
use chrono::Utc;
use tracing::trace;

/// Fingerprint of `dir` from its current live children.
pub fn directory_hash(
    txn: &mut Transaction<'_>,
    hasher: &dyn ContentHasher,
    dir: NodeId,
) -> Result<Hash, FsError> {
    let children: Vec<(String, Hash)> = nodes::children(txn, Some(dir))?
        .into_iter()
        .map(|c| (c.name, c.hash))
        .collect();
    Ok(compute_directory_hash(hasher, &children))
}

/// Rehash and resize from `start` upwards. Returns the number of levels touched.
///
/// Stops after updating a non-live node: a soft-deleted directory keeps its
/// own bookkeeping but its ancestors no longer count it.
pub fn propagate(
    txn: &mut Transaction<'_>,
    hasher: &dyn ContentHasher,
    start: Option<NodeId>,
    size_delta: i64,
) -> Result<usize, FsError> {
    let mut current = start;
    let mut levels = 0;
    let now = Utc::now();
    while let Some(id) = current {
        let mut node = nodes::load(txn, id)?;
        node.hash = directory_hash(txn, hasher, id)?;
        if size_delta != 0 {
            node.size = clamp_size(node.size, size_delta, format_args!("{} ({})", node.name, node.id));
        }
        node.modified_at = now;
        nodes::put(txn, &node)?;
        levels += 1;
        if !node.is_live() {
            break;
        }
        current = node.parent_id;
    }
    trace!(levels, size_delta, "Propagated change to ancestors");
    Ok(levels)
}
