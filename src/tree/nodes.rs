//! Node rows and the live-child index.
//!
//! Primitives shared by every component that reads or rewrites tree nodes.
//! They never propagate hashes or sizes; callers do that.

use crate::error::{FsError, StorageError, StorageResultExt};
use crate::store::{keys, Transaction};
use crate::tree::node::{Lifecycle, TreeNode};
use crate::types::NodeId;

pub fn find(txn: &mut Transaction<'_>, id: NodeId) -> Result<Option<TreeNode>, FsError> {
    txn.get_record(&keys::node(id))
        .context(|| format!("load node {}", id))
}

pub fn load(txn: &mut Transaction<'_>, id: NodeId) -> Result<TreeNode, FsError> {
    find(txn, id)?.ok_or_else(|| FsError::NotFound(format!("node {}", id)))
}

pub fn put(txn: &mut Transaction<'_>, node: &TreeNode) -> Result<(), FsError> {
    txn.put_record(keys::node(node.id), node)
        .context(|| format!("store node {}", node.id))
}

/// Id of the live child called `name`, if any.
pub fn child_id(
    txn: &mut Transaction<'_>,
    parent: Option<NodeId>,
    name: &str,
) -> Result<Option<NodeId>, FsError> {
    indexed_id(txn, &keys::child(parent, name), name)
}

fn indexed_id(txn: &mut Transaction<'_>, key: &[u8], name: &str) -> Result<Option<NodeId>, FsError> {
    let raw = txn
        .get(key)
        .context(|| format!("look up child '{}'", name))?;
    match raw {
        Some(raw) => keys::decode_id(&raw)
            .map(|id| Some(NodeId(id)))
            .ok_or_else(|| {
                FsError::storage(
                    format!("look up child '{}'", name),
                    StorageError::Corrupt("child index entry is not an id".into()),
                )
            }),
        None => Ok(None),
    }
}

pub fn child(
    txn: &mut Transaction<'_>,
    parent: Option<NodeId>,
    name: &str,
) -> Result<Option<TreeNode>, FsError> {
    match child_id(txn, parent, name)? {
        Some(id) => find(txn, id),
        None => Ok(None),
    }
}

/// Live children of `parent`, ordered by name.
pub fn children(txn: &mut Transaction<'_>, parent: Option<NodeId>) -> Result<Vec<TreeNode>, FsError> {
    let context = || match parent {
        Some(id) => format!("list children of {}", id),
        None => "list top-level nodes".to_string(),
    };
    let entries = txn.scan_prefix(&keys::children_of(parent)).context(context)?;
    let mut out = Vec::with_capacity(entries.len());
    for (_, raw) in entries {
        let id = keys::decode_id(&raw).ok_or_else(|| {
            FsError::storage(context(), StorageError::Corrupt("child index entry is not an id".into()))
        })?;
        out.push(load(txn, NodeId(id))?);
    }
    Ok(out)
}

pub fn has_children(txn: &mut Transaction<'_>, parent: NodeId) -> Result<bool, FsError> {
    let entries = txn
        .scan_prefix(&keys::children_of(Some(parent)))
        .context(|| format!("list children of {}", parent))?;
    Ok(!entries.is_empty())
}

/// Add `node` to its parent's live-child index.
///
/// Fails with `AlreadyExists` if another node holds the name.
pub fn link(txn: &mut Transaction<'_>, node: &TreeNode) -> Result<(), FsError> {
    if let Some(existing) = child_id(txn, node.parent_id, &node.name)? {
        if existing != node.id {
            return Err(FsError::AlreadyExists(format!(
                "'{}' under {}",
                node.name,
                node.parent_id.map(|p| p.to_string()).unwrap_or_else(|| "root".into())
            )));
        }
    }
    txn.put(keys::child(node.parent_id, &node.name), keys::encode_id(node.id.0));
    Ok(())
}

/// Remove `node` from its parent's live-child index.
pub fn unlink(txn: &mut Transaction<'_>, node: &TreeNode) {
    txn.delete(keys::child(node.parent_id, &node.name));
}

/// Record `node` as the file most recently soft-deleted at its name.
pub fn bury(txn: &mut Transaction<'_>, node: &TreeNode) {
    txn.put(keys::deleted_child(node.parent_id, &node.name), keys::encode_id(node.id.0));
}

/// Drop the deleted-file entry at `node`'s name if it is `node`'s.
/// Returns whether it was.
pub fn exhume(txn: &mut Transaction<'_>, node: &TreeNode) -> Result<bool, FsError> {
    let key = keys::deleted_child(node.parent_id, &node.name);
    if indexed_id(txn, &key, &node.name)? == Some(node.id) {
        txn.delete(key);
        return Ok(true);
    }
    Ok(false)
}

/// Soft-deleted file last seen under `parent` as `name`.
pub fn deleted_child(
    txn: &mut Transaction<'_>,
    parent: Option<NodeId>,
    name: &str,
) -> Result<Option<TreeNode>, FsError> {
    let id = match indexed_id(txn, &keys::deleted_child(parent, name), name)? {
        Some(id) => id,
        None => return Ok(None),
    };
    Ok(find(txn, id)?.filter(|n| n.is_file() && matches!(n.lifecycle, Lifecycle::SoftDeleted { .. })))
}

/// Every node row, live or not.
pub fn all(txn: &mut Transaction<'_>) -> Result<Vec<TreeNode>, FsError> {
    let pairs = txn
        .scan_prefix(keys::NODE_PREFIX.as_bytes())
        .context(|| "scan nodes")?;
    pairs
        .into_iter()
        .map(|(_, raw)| {
            bincode::deserialize(&raw)
                .map_err(StorageError::from)
                .context(|| "decode node")
        })
        .collect()
}

/// Ancestors of `id` from its parent up to the top-level node.
pub fn ancestors(txn: &mut Transaction<'_>, id: NodeId) -> Result<Vec<TreeNode>, FsError> {
    let mut out = Vec::new();
    let mut current = load(txn, id)?.parent_id;
    while let Some(parent) = current {
        let node = load(txn, parent)?;
        current = node.parent_id;
        out.push(node);
    }
    Ok(out)
}

/// Absolute path of a node, e.g. `/app/folders/shared/docs`.
pub fn path_of(txn: &mut Transaction<'_>, id: NodeId) -> Result<String, FsError> {
    let node = load(txn, id)?;
    let mut names = vec![node.name];
    for ancestor in ancestors(txn, id)? {
        names.push(ancestor.name);
    }
    names.reverse();
    Ok(format!("/{}", names.join("/")))
}

/// Path of a node if it and every ancestor is live.
pub fn live_path_of(txn: &mut Transaction<'_>, id: NodeId) -> Result<Option<String>, FsError> {
    let node = load(txn, id)?;
    if !node.is_live() {
        return Ok(None);
    }
    let ancestors = ancestors(txn, id)?;
    if ancestors.iter().any(|a| !a.is_live()) {
        return Ok(None);
    }
    let mut names: Vec<&str> = ancestors.iter().rev().map(|a| a.name.as_str()).collect();
    names.push(&node.name);
    Ok(Some(format!("/{}", names.join("/"))))
}
