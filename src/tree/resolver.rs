//! Path Resolver
//!
//! Turns a [`VirtualPath`] into node rows by walking the live-child index one
//! segment at a time from the top-level node.

use crate::error::FsError;
use crate::store::Transaction;
use crate::tree::node::TreeNode;
use crate::tree::nodes;
use crate::tree::path::VirtualPath;
use tracing::trace;

/// Target of a create-style operation.
#[derive(Debug)]
pub struct CreateTarget {
    /// Existing live directory the new node goes into.
    pub parent: TreeNode,
    /// Node already sitting at the final segment, if any.
    pub existing: Option<TreeNode>,
}

/// Walk `segments` from the top. None if any segment is absent.
pub fn lookup_segments(
    txn: &mut Transaction<'_>,
    segments: &[String],
) -> Result<Option<TreeNode>, FsError> {
    let mut current: Option<TreeNode> = None;
    for segment in segments {
        if let Some(node) = &current {
            if !node.is_dir() {
                return Ok(None);
            }
        }
        let parent_id = current.as_ref().map(|n| n.id);
        match nodes::child(txn, parent_id, segment)? {
            Some(node) => current = Some(node),
            None => {
                trace!(segment = %segment, "Path segment not found");
                return Ok(None);
            }
        }
    }
    Ok(current)
}

pub fn lookup(txn: &mut Transaction<'_>, path: &VirtualPath) -> Result<Option<TreeNode>, FsError> {
    lookup_segments(txn, path.segments())
}

/// Resolve every segment; NotFound if any is absent.
pub fn resolve(txn: &mut Transaction<'_>, path: &VirtualPath) -> Result<TreeNode, FsError> {
    lookup(txn, path)?.ok_or_else(|| FsError::NotFound(path.to_string()))
}

/// Resolve with creation semantics: only the final segment may be absent.
pub fn resolve_for_create(
    txn: &mut Transaction<'_>,
    path: &VirtualPath,
) -> Result<CreateTarget, FsError> {
    let segments = path.segments();
    let parent_segments = &segments[..segments.len() - 1];
    let parent = lookup_segments(txn, parent_segments)?.ok_or_else(|| {
        FsError::NotFound(format!("/{}", parent_segments.join("/")))
    })?;
    if !parent.is_dir() {
        return Err(FsError::InvalidArgument(format!(
            "parent of {} is not a directory",
            path
        )));
    }
    let existing = nodes::child(txn, Some(parent.id), path.name())?;
    Ok(CreateTarget { parent, existing })
}
