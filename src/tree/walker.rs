//! Breadth-first subtree walker
//!
//! Iterative walk over live descendants with an explicit work queue, so deep
//! trees never grow the call stack.

use crate::error::FsError;
use crate::store::Transaction;
use crate::tree::node::TreeNode;
use crate::tree::nodes;
use crate::types::NodeId;
use std::collections::VecDeque;

/// What to do after visiting a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Queue the node's children.
    Descend,
    /// Skip everything below this node.
    Prune,
}

/// Visit every live descendant of `root` (not `root` itself), level by level.
///
/// The visitor gets the transaction back so it can rewrite what it sees.
/// Returns the number of nodes visited.
pub fn walk_descendants<F>(txn: &mut Transaction<'_>, root: NodeId, mut visit: F) -> Result<usize, FsError>
where
    F: FnMut(&mut Transaction<'_>, TreeNode) -> Result<Visit, FsError>,
{
    let mut queue = VecDeque::from([root]);
    let mut visited = 0;
    while let Some(parent) = queue.pop_front() {
        for child in nodes::children(txn, Some(parent))? {
            let id = child.id;
            let is_dir = child.is_dir();
            visited += 1;
            if visit(txn, child)? == Visit::Descend && is_dir {
                queue.push_back(id);
            }
        }
    }
    Ok(visited)
}

/// Ids of every live descendant of `root`, breadth-first.
pub fn descendant_ids(txn: &mut Transaction<'_>, root: NodeId) -> Result<Vec<NodeId>, FsError> {
    let mut out = Vec::new();
    walk_descendants(txn, root, |_, node| {
        out.push(node.id);
        Ok(Visit::Descend)
    })?;
    Ok(out)
}
