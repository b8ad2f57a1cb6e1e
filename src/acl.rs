//! ACL-node inheritance
//!
//! A node is an ACL root when `acl_node == Some(node.id)`. Every other node
//! carries the id of the nearest ancestor root, or none. Propagation walks
//! breadth-first and stops at nested roots, which keep their own scope.

use crate::error::FsError;
use crate::modlog::{Field, ModificationLog};
use crate::store::Transaction;
use crate::tree::node::TreeNode;
use crate::tree::nodes;
use crate::tree::walker::{self, Visit};
use crate::types::NodeId;
use std::collections::{HashSet, VecDeque};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct AclPropagator {
    journal: ModificationLog,
}

impl AclPropagator {
    pub fn new(journal: ModificationLog) -> Self {
        Self { journal }
    }

    /// Scope a new child of `parent` starts in.
    pub fn inherited(parent: Option<&TreeNode>) -> Option<NodeId> {
        parent.and_then(|p| p.acl_node)
    }

    fn assign(
        &self,
        txn: &mut Transaction<'_>,
        node: &mut TreeNode,
        acl_node: Option<NodeId>,
        operation: &str,
    ) -> Result<bool, FsError> {
        if node.acl_node == acl_node {
            return Ok(false);
        }
        self.journal
            .record(txn, operation, node.id, Field::AclNode, &node.acl_node, &acl_node, None)?;
        node.acl_node = acl_node;
        nodes::put(txn, node)?;
        Ok(true)
    }

    /// Set `acl_node` on every descendant that is not a root itself.
    fn push_down(
        &self,
        txn: &mut Transaction<'_>,
        from: NodeId,
        acl_node: Option<NodeId>,
        operation: &str,
    ) -> Result<usize, FsError> {
        let mut changed = 0;
        walker::walk_descendants(txn, from, |txn, mut child| {
            if child.is_acl_root() {
                return Ok(Visit::Prune);
            }
            if self.assign(txn, &mut child, acl_node, operation)? {
                changed += 1;
            }
            Ok(Visit::Descend)
        })?;
        Ok(changed)
    }

    /// Make `node_id` an ACL root and hand its id to every inheriting descendant.
    pub fn create_acl_node(
        &self,
        txn: &mut Transaction<'_>,
        node_id: NodeId,
        operation: &str,
    ) -> Result<usize, FsError> {
        let mut node = nodes::load(txn, node_id)?;
        let mut changed = usize::from(self.assign(txn, &mut node, Some(node_id), operation)?);
        changed += self.push_down(txn, node_id, Some(node_id), operation)?;
        debug!(node_id = %node_id, changed, "Created ACL root");
        Ok(changed)
    }

    /// Drop `node_id`'s own scope; it and its inheriting descendants fall back
    /// to the parent's scope (or none at the top).
    pub fn remove_acl_from_node(
        &self,
        txn: &mut Transaction<'_>,
        node_id: NodeId,
        operation: &str,
    ) -> Result<usize, FsError> {
        let mut node = nodes::load(txn, node_id)?;
        if !node.is_acl_root() {
            return Ok(0);
        }
        let parent = match node.parent_id {
            Some(p) => Some(nodes::load(txn, p)?),
            None => None,
        };
        let fallback = Self::inherited(parent.as_ref());
        let mut changed = usize::from(self.assign(txn, &mut node, fallback, operation)?);
        changed += self.push_down(txn, node_id, fallback, operation)?;
        debug!(node_id = %node_id, changed, "Removed ACL root");
        Ok(changed)
    }

    /// Re-derive inheritance for a node that just moved under a new parent.
    /// Roots inside the moved subtree keep their own scope.
    pub fn rebase(&self, txn: &mut Transaction<'_>, node_id: NodeId, operation: &str) -> Result<usize, FsError> {
        let mut node = nodes::load(txn, node_id)?;
        if node.is_acl_root() {
            return Ok(0);
        }
        let parent = match node.parent_id {
            Some(p) => Some(nodes::load(txn, p)?),
            None => None,
        };
        let inherited = Self::inherited(parent.as_ref());
        let mut changed = usize::from(self.assign(txn, &mut node, inherited, operation)?);
        if node.is_dir() {
            changed += self.push_down(txn, node_id, inherited, operation)?;
        }
        Ok(changed)
    }

    /// Transitive live descendants of `roots`, breadth-first, roots excluded.
    pub fn get_all_child_ids(&self, txn: &mut Transaction<'_>, roots: &[NodeId]) -> Result<Vec<NodeId>, FsError> {
        let mut seen: HashSet<NodeId> = roots.iter().copied().collect();
        let mut queue: VecDeque<NodeId> = roots.iter().copied().collect();
        let mut out = Vec::new();
        while let Some(parent) = queue.pop_front() {
            for child in nodes::children(txn, Some(parent))? {
                if seen.insert(child.id) {
                    out.push(child.id);
                    if child.is_dir() {
                        queue.push_back(child.id);
                    }
                }
            }
        }
        Ok(out)
    }
}
