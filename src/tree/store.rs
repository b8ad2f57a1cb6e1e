//! Tree Node Store
//!
//! Directory and file node operations. Every method runs inside the caller's
//! transaction and leaves the tree consistent: child index, ancestor hashes
//! and sizes, ACL inheritance and journal entries are all updated before it
//! returns.

use crate::acl::AclPropagator;
use crate::error::{FsError, StorageError, StorageResultExt};
use crate::modlog::{revision_note, Field, ModificationLog};
use crate::object::{FileObject, FileObjectStore, RevisionChange};
use crate::store::Transaction;
use crate::tree::hasher::{empty_directory_hash, ContentHasher};
use crate::tree::node::{Lifecycle, NodeProperties, NodeProperty, NodeType, PropertyKey, TreeNode};
use crate::tree::path::VirtualPath;
use crate::tree::propagate::propagate;
use crate::tree::resolver;
use crate::tree::nodes;
use crate::types::{Hash, NodeId, ObjectId};
use chrono::Utc;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};

/// How a write handle treats an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fail with `AlreadyExists` if the file exists (`x`).
    CreateNew,
    /// Create or replace the content (`w`).
    Truncate,
}

/// Result of committing file content.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub node: TreeNode,
    pub object: FileObject,
    pub change: RevisionChange,
    pub created: bool,
}

pub(crate) fn signed(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}

fn missing_object(node: &TreeNode) -> FsError {
    FsError::storage(
        format!("load file {}", node.id),
        StorageError::Corrupt("file node without object".into()),
    )
}

#[derive(Clone)]
pub struct TreeNodeStore {
    hasher: Arc<dyn ContentHasher>,
    objects: FileObjectStore,
    acl: AclPropagator,
    journal: ModificationLog,
    container_acl_roots: bool,
}

impl TreeNodeStore {
    pub fn new(
        hasher: Arc<dyn ContentHasher>,
        objects: FileObjectStore,
        journal: ModificationLog,
        container_acl_roots: bool,
    ) -> Self {
        Self {
            hasher,
            objects,
            acl: AclPropagator::new(journal),
            journal,
            container_acl_roots,
        }
    }

    pub fn objects(&self) -> &FileObjectStore {
        &self.objects
    }

    pub fn acl(&self) -> &AclPropagator {
        &self.acl
    }

    pub fn journal(&self) -> &ModificationLog {
        &self.journal
    }

    pub fn hasher(&self) -> &dyn ContentHasher {
        self.hasher.as_ref()
    }

    fn propagate(&self, txn: &mut Transaction<'_>, start: Option<NodeId>, delta: i64) -> Result<usize, FsError> {
        propagate(txn, self.hasher.as_ref(), start, delta)
    }

    /// Unsaved node with a fresh id under `parent`.
    fn new_node(
        &self,
        txn: &mut Transaction<'_>,
        parent: Option<&TreeNode>,
        name: &str,
        node_type: NodeType,
    ) -> Result<TreeNode, FsError> {
        let id = NodeId(txn.backend().generate_id().context(|| "allocate node id")?);
        let now = Utc::now();
        Ok(TreeNode {
            id,
            parent_id: parent.map(|p| p.id),
            name: name.to_string(),
            node_type,
            object_id: None,
            acl_node: AclPropagator::inherited(parent),
            hash: [0u8; 32],
            revision: 0,
            size: 0,
            quota: None,
            lifecycle: Lifecycle::Live,
            properties: NodeProperties::new(),
            created_at: now,
            modified_at: now,
        })
    }

    /// Index, store and journal a freshly built node.
    fn insert(&self, txn: &mut Transaction<'_>, node: &TreeNode, operation: &str) -> Result<(), FsError> {
        nodes::link(txn, node)?;
        nodes::put(txn, node)?;
        self.journal
            .record(txn, operation, node.id, Field::Lifecycle, &Value::Null, &node.lifecycle, None)?;
        Ok(())
    }

    fn create_directory(
        &self,
        txn: &mut Transaction<'_>,
        parent: Option<&TreeNode>,
        name: &str,
        path: Option<&VirtualPath>,
        operation: &str,
    ) -> Result<TreeNode, FsError> {
        let mut node = self.new_node(txn, parent, name, NodeType::Directory)?;
        node.hash = empty_directory_hash(self.hasher.as_ref());
        node.revision = 1;
        if self.container_acl_roots && path.is_some_and(VirtualPath::in_scope_container) {
            node.acl_node = Some(node.id);
        }
        self.insert(txn, &node, operation)?;
        self.propagate(txn, parent.map(|p| p.id), 0)?;
        debug!(node_id = %node.id, name, "Created directory");
        Ok(node)
    }

    /// Top-level node for an application, created if missing.
    pub fn ensure_top(&self, txn: &mut Transaction<'_>, name: &str) -> Result<TreeNode, FsError> {
        match nodes::child(txn, None, name)? {
            Some(node) if node.is_dir() => Ok(node),
            Some(_) => Err(FsError::InvalidArgument(format!("/{} is not a directory", name))),
            None => self.create_directory(txn, None, name, None, "initialize_application"),
        }
    }

    /// Create a directory whose parent exists.
    ///
    /// An existing directory is returned as is when `recreate` is set;
    /// otherwise it is `AlreadyExists`.
    pub fn mkdir(&self, txn: &mut Transaction<'_>, path: &VirtualPath, recreate: bool) -> Result<TreeNode, FsError> {
        let target = resolver::resolve_for_create(txn, path)?;
        match target.existing {
            Some(existing) if existing.is_dir() && recreate => Ok(existing),
            Some(_) => Err(FsError::AlreadyExists(path.to_string())),
            None => self.create_directory(txn, Some(&target.parent), path.name(), Some(path), "mkdir"),
        }
    }

    /// Create `path` and any missing ancestors.
    pub fn ensure_dir(&self, txn: &mut Transaction<'_>, path: &VirtualPath) -> Result<TreeNode, FsError> {
        let mut current = self.ensure_top(txn, path.app_id())?;
        for depth in 2..=path.depth() {
            let name = &path.segments()[depth - 1];
            current = match nodes::child(txn, Some(current.id), name)? {
                Some(node) if node.is_dir() => node,
                Some(_) => {
                    return Err(FsError::InvalidArgument(format!(
                        "/{} is not a directory",
                        path.segments()[..depth].join("/")
                    )))
                }
                None => {
                    let prefix = path.prefix(depth);
                    self.create_directory(txn, Some(&current), name, prefix.as_ref(), "mkdir")?
                }
            };
        }
        Ok(current)
    }

    /// Create an empty file node and its object under `parent`.
    fn create_file(&self, txn: &mut Transaction<'_>, parent: &TreeNode, name: &str) -> Result<TreeNode, FsError> {
        let mut node = self.new_node(txn, Some(parent), name, NodeType::File)?;
        let object = self.objects.create(txn, node.id, None)?;
        node.object_id = Some(object.id);
        self.insert(txn, &node, "write")?;
        Ok(node)
    }

    /// Bring a soft-deleted file back at its old name so the new content
    /// continues its revision chain.
    fn revive_file(&self, txn: &mut Transaction<'_>, dead: TreeNode) -> Result<TreeNode, FsError> {
        debug!(node_id = %dead.id, name = %dead.name, "Reviving deleted file");
        let node = self.set_lifecycle(txn, dead.id, Lifecycle::Live, "write")?;
        self.acl.rebase(txn, node.id, "write")?;
        nodes::load(txn, node.id)
    }

    /// Commit streamed content as the next revision of the file at `path`.
    pub fn write_content(
        &self,
        txn: &mut Transaction<'_>,
        path: &VirtualPath,
        mode: WriteMode,
        digest: Hash,
        content: &[u8],
        content_type: Option<&str>,
    ) -> Result<WriteOutcome, FsError> {
        let target = resolver::resolve_for_create(txn, path)?;
        let (node, created) = match target.existing {
            Some(n) if n.is_dir() => return Err(FsError::InvalidArgument(format!("{} is a directory", path))),
            Some(_) if mode == WriteMode::CreateNew => return Err(FsError::AlreadyExists(path.to_string())),
            Some(n) => (n, false),
            None => match nodes::deleted_child(txn, Some(target.parent.id), path.name())? {
                Some(dead) => (self.revive_file(txn, dead)?, true),
                None => (self.create_file(txn, &target.parent, path.name())?, true),
            },
        };
        let object_id = node.object_id.ok_or_else(|| missing_object(&node))?;

        if let Some(content_type) = content_type {
            let mut object = self.objects.get(txn, object_id)?;
            object.content_type = content_type.to_string();
            self.objects.put(txn, &object)?;
        }

        let change = self.objects.write_digested(txn, object_id, digest, content)?;
        self.journal.record(
            txn,
            "write",
            object_id,
            Field::Revision,
            &change.old_revision,
            &change.new_revision,
            Some(revision_note(change.old_revision, change.new_revision)),
        )?;
        let object = self.objects.get(txn, object_id)?;
        let node = self.sync_file_node(txn, &object)?;
        Ok(WriteOutcome {
            node,
            object,
            change,
            created,
        })
    }

    /// Mirror an object's current revision onto its file node and propagate.
    pub fn sync_file_node(&self, txn: &mut Transaction<'_>, object: &FileObject) -> Result<TreeNode, FsError> {
        let mut node = nodes::load(txn, object.owner)?;
        let delta = signed(object.size) - signed(node.size);
        node.hash = object.hash;
        node.size = object.size;
        node.revision = object.revision;
        node.modified_at = Utc::now();
        nodes::put(txn, &node)?;
        if node.is_live() {
            self.propagate(txn, node.parent_id, delta)?;
        }
        Ok(node)
    }

    /// Move a node between Live and SoftDeleted, keeping the index and the
    /// ancestor aggregates in step.
    pub fn set_lifecycle(
        &self,
        txn: &mut Transaction<'_>,
        node_id: NodeId,
        target: Lifecycle,
        operation: &str,
    ) -> Result<TreeNode, FsError> {
        let mut node = nodes::load(txn, node_id)?;
        let old = node.lifecycle;
        if std::mem::discriminant(&old) == std::mem::discriminant(&target) {
            return Ok(node);
        }
        if matches!(old, Lifecycle::Purged { .. }) {
            return Err(FsError::NotFound(format!("node {} was purged", node_id)));
        }
        node.lifecycle = target;
        node.modified_at = Utc::now();
        let delta = match (old.is_live(), target.is_live()) {
            (true, false) => {
                nodes::unlink(txn, &node);
                if node.is_file() {
                    nodes::bury(txn, &node);
                }
                -signed(node.size)
            }
            (false, true) => {
                nodes::link(txn, &node)?;
                nodes::exhume(txn, &node)?;
                signed(node.size)
            }
            _ => 0,
        };
        nodes::put(txn, &node)?;
        self.journal
            .record(txn, operation, node.id, Field::Lifecycle, &old, &target, None)?;
        if old.is_live() != target.is_live() {
            self.propagate(txn, node.parent_id, delta)?;
        }
        Ok(node)
    }

    fn soft_delete(&self, txn: &mut Transaction<'_>, node: TreeNode, operation: &str) -> Result<TreeNode, FsError> {
        self.set_lifecycle(txn, node.id, Lifecycle::SoftDeleted { at: Utc::now() }, operation)
    }

    /// Remove a directory. Without `recursive` it must be empty; with it the
    /// whole subtree goes along, restorable as one unit.
    pub fn rmdir(&self, txn: &mut Transaction<'_>, path: &VirtualPath, recursive: bool) -> Result<TreeNode, FsError> {
        let node = resolver::resolve(txn, path)?;
        if !node.is_dir() {
            return Err(FsError::InvalidArgument(format!("{} is not a directory", path)));
        }
        if !recursive && nodes::has_children(txn, node.id)? {
            return Err(FsError::NotEmpty(path.to_string()));
        }
        let node = self.soft_delete(txn, node, "rmdir")?;
        info!(path = %path, node_id = %node.id, recursive, "Removed directory");
        Ok(node)
    }

    /// Soft-delete a file.
    pub fn unlink(&self, txn: &mut Transaction<'_>, path: &VirtualPath) -> Result<TreeNode, FsError> {
        let node = resolver::resolve(txn, path)?;
        if node.is_dir() {
            return Err(FsError::InvalidArgument(format!("{} is a directory", path)));
        }
        self.soft_delete(txn, node, "unlink")
    }

    /// Give a node a new parent and/or name, re-indexing and propagating both
    /// ancestor chains. Non-live nodes just get their fields rewritten.
    pub fn relocate(
        &self,
        txn: &mut Transaction<'_>,
        node_id: NodeId,
        parent_id: Option<NodeId>,
        name: &str,
        operation: &str,
    ) -> Result<TreeNode, FsError> {
        let mut node = nodes::load(txn, node_id)?;
        let old_parent = node.parent_id;
        let old_name = node.name.clone();
        if old_parent == parent_id && old_name == name {
            return Ok(node);
        }
        let live = node.is_live();
        let buried = if live {
            nodes::unlink(txn, &node);
            self.propagate(txn, old_parent, -signed(node.size))?;
            false
        } else {
            nodes::exhume(txn, &node)?
        };
        node.parent_id = parent_id;
        node.name = name.to_string();
        node.modified_at = Utc::now();
        if live {
            nodes::link(txn, &node)?;
        } else if buried {
            nodes::bury(txn, &node);
        }
        nodes::put(txn, &node)?;
        if old_parent != parent_id {
            self.journal
                .record(txn, operation, node.id, Field::ParentId, &old_parent, &parent_id, None)?;
        }
        if old_name != name {
            self.journal
                .record(txn, operation, node.id, Field::Name, &old_name, name, None)?;
        }
        if live {
            self.propagate(txn, parent_id, signed(node.size))?;
        }
        Ok(node)
    }

    /// Work out where `source` lands for a rename or copy to `dst`.
    ///
    /// An existing directory at `dst` receives the source under its own name.
    fn destination(
        &self,
        txn: &mut Transaction<'_>,
        source: &TreeNode,
        dst: &VirtualPath,
    ) -> Result<(TreeNode, String, VirtualPath), FsError> {
        let (parent, name, path) = match resolver::lookup(txn, dst)? {
            Some(existing) if existing.id == source.id => {
                return Err(FsError::UnexpectedValue(format!(
                    "source and destination are the same: {}",
                    dst
                )))
            }
            Some(existing) if existing.is_dir() => {
                let path = dst.join(&source.name)?;
                (existing, source.name.clone(), path)
            }
            Some(_) => return Err(FsError::AlreadyExists(dst.to_string())),
            None => {
                let target = resolver::resolve_for_create(txn, dst)?;
                (target.parent, dst.name().to_string(), dst.clone())
            }
        };
        match nodes::child(txn, Some(parent.id), &name)? {
            Some(occupant) if occupant.id == source.id => {
                return Err(FsError::UnexpectedValue(format!(
                    "source and destination are the same: {}",
                    path
                )))
            }
            Some(_) => return Err(FsError::AlreadyExists(path.to_string())),
            None => {}
        }
        if source.is_dir()
            && (parent.id == source.id
                || nodes::ancestors(txn, parent.id)?.iter().any(|a| a.id == source.id))
        {
            return Err(FsError::InvalidArgument(format!(
                "cannot place {} inside itself",
                source.name
            )));
        }
        Ok((parent, name, path))
    }

    /// Move a node (and its subtree).
    pub fn rename(&self, txn: &mut Transaction<'_>, src: &VirtualPath, dst: &VirtualPath) -> Result<TreeNode, FsError> {
        let node = resolver::resolve(txn, src)?;
        let (parent, name, path) = self.destination(txn, &node, dst)?;
        let moved = self.relocate(txn, node.id, Some(parent.id), &name, "rename")?;
        if self.container_acl_roots && moved.is_dir() && path.in_scope_container() {
            self.acl.create_acl_node(txn, moved.id, "rename")?;
        } else {
            self.acl.rebase(txn, moved.id, "rename")?;
        }
        debug!(from = %src, to = %path, node_id = %moved.id, "Renamed node");
        nodes::load(txn, moved.id)
    }

    fn copy_one(
        &self,
        txn: &mut Transaction<'_>,
        source: &TreeNode,
        parent: &TreeNode,
        name: &str,
    ) -> Result<TreeNode, FsError> {
        let mut node = self.new_node(txn, Some(parent), name, source.node_type)?;
        if source.is_acl_root() {
            node.acl_node = Some(node.id);
        }
        node.hash = source.hash;
        node.size = source.size;
        node.revision = source.revision;
        node.properties = source.properties.clone();
        if source.is_file() {
            let source_object: ObjectId = source.object_id.ok_or_else(|| missing_object(source))?;
            let object = self.objects.duplicate(txn, source_object, node.id)?;
            node.object_id = Some(object.id);
            node.hash = object.hash;
            node.size = object.size;
            node.revision = object.revision;
            self.insert(txn, &node, "copy")?;
            self.journal.record(
                txn,
                "copy",
                object.id,
                Field::Revision,
                &0u64,
                &object.revision,
                Some(revision_note(0, object.revision)),
            )?;
        } else {
            self.insert(txn, &node, "copy")?;
        }
        Ok(node)
    }

    /// Duplicate a node (and its subtree) under new ids. Files get new
    /// objects sharing content but with a fresh revision history.
    pub fn copy(&self, txn: &mut Transaction<'_>, src: &VirtualPath, dst: &VirtualPath) -> Result<TreeNode, FsError> {
        let source = resolver::resolve(txn, src)?;
        let (parent, name, path) = self.destination(txn, &source, dst)?;

        let mut root = self.copy_one(txn, &source, &parent, &name)?;
        if self.container_acl_roots && root.is_dir() && path.in_scope_container() && !root.is_acl_root() {
            root.acl_node = Some(root.id);
            nodes::put(txn, &root)?;
        }

        let mut queue = VecDeque::from([(source.id, root.clone())]);
        let mut copied = 1;
        while let Some((source_dir, copy_dir)) = queue.pop_front() {
            for child in nodes::children(txn, Some(source_dir))? {
                let copy = self.copy_one(txn, &child, &copy_dir, &child.name)?;
                copied += 1;
                if child.is_dir() {
                    queue.push_back((child.id, copy));
                }
            }
        }
        self.propagate(txn, Some(parent.id), signed(root.size))?;
        debug!(from = %src, to = %path, copied, "Copied node");
        nodes::load(txn, root.id)
    }

    pub fn set_quota(&self, txn: &mut Transaction<'_>, path: &VirtualPath, quota: Option<u64>) -> Result<TreeNode, FsError> {
        let mut node = resolver::resolve(txn, path)?;
        if node.quota == quota {
            return Ok(node);
        }
        self.journal
            .record(txn, "set_quota", node.id, Field::Quota, &node.quota, &quota, None)?;
        node.quota = quota;
        nodes::put(txn, &node)?;
        Ok(node)
    }

    pub fn set_property(
        &self,
        txn: &mut Transaction<'_>,
        path: &VirtualPath,
        property: NodeProperty,
    ) -> Result<TreeNode, FsError> {
        let node = resolver::resolve(txn, path)?;
        let mut properties = node.properties.clone();
        properties.set(property);
        self.replace_properties(txn, node, properties, "set_property")
    }

    pub fn remove_property(
        &self,
        txn: &mut Transaction<'_>,
        path: &VirtualPath,
        key: PropertyKey,
    ) -> Result<TreeNode, FsError> {
        let node = resolver::resolve(txn, path)?;
        let mut properties = node.properties.clone();
        properties.remove(key);
        self.replace_properties(txn, node, properties, "remove_property")
    }

    pub fn replace_properties(
        &self,
        txn: &mut Transaction<'_>,
        mut node: TreeNode,
        properties: NodeProperties,
        operation: &str,
    ) -> Result<TreeNode, FsError> {
        if node.properties == properties {
            return Ok(node);
        }
        self.journal
            .record(txn, operation, node.id, Field::Properties, &node.properties, &properties, None)?;
        node.properties = properties;
        node.modified_at = Utc::now();
        nodes::put(txn, &node)?;
        Ok(node)
    }
}
