//! Filesystem facade
//!
//! Path-based entry point over the tree engine. Each mutating call runs in
//! one optimistic transaction that is retried on conflict; follow-up work
//! with external services (indexing, previews, notifications) happens after
//! the commit and never fails the operation.

pub mod handle;

pub use handle::{FileReader, FileWriter};

use crate::cache::{NodeSnapshot, StatCache};
use crate::config::{BackendKind, FsConfig, StorageConfig};
use crate::error::{FsError, StorageResultExt};
use crate::modlog::{ModificationEntry, UndoEngine, UndoFilter, UndoReport};
use crate::object::{BlobStore, FileObjectStore, FsBlobStore, MemoryBlobStore, Revision};
use crate::quota::{QuotaMonitor, RecountReport};
use crate::revision::RevisionManager;
use crate::services::{ContentIndexer, LogNotifier, NoPreviews, NoopIndexer, Notifier, PreviewKind, PreviewService};
use crate::store::{keys, MemoryBackend, MetadataBackend, SledBackend, Transaction};
use crate::tree::hasher::{Blake3Hasher, ContentHasher};
use crate::tree::node::{Lifecycle, NodeProperty, PropertyKey, TreeNode};
use crate::tree::path::{validate_name, VirtualPath, FOLDERS_SEGMENT, PERSONAL_SCOPE, SHARED_SCOPE};
use crate::tree::walker::{self, Visit};
use crate::tree::{nodes, resolver, TreeNodeStore, WriteMode};
use crate::types::{hash_hex, Hash, NodeId, ObjectId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub const NOTIFICATION_SUBJECT: &str = "filemanager notification";
pub const QUOTA_NOTIFICATION_SUBJECT: &str = "filemanager quota notification";

/// Everything the engine talks to, passed in explicitly.
#[derive(Clone)]
pub struct Services {
    pub backend: Arc<dyn MetadataBackend>,
    pub blobs: Arc<dyn BlobStore>,
    pub hasher: Arc<dyn ContentHasher>,
    pub indexer: Arc<dyn ContentIndexer>,
    pub previews: Arc<dyn PreviewService>,
    pub notifier: Arc<dyn Notifier>,
}

impl Services {
    /// Memory backend and blob store with default collaborators.
    pub fn in_memory() -> Self {
        Self::with_stores(Arc::new(MemoryBackend::new()), Arc::new(MemoryBlobStore::new()))
    }

    pub fn with_stores(backend: Arc<dyn MetadataBackend>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            backend,
            blobs,
            hasher: Arc::new(Blake3Hasher),
            indexer: Arc::new(NoopIndexer),
            previews: Arc::new(NoPreviews),
            notifier: Arc::new(LogNotifier),
        }
    }

    /// Open the stores named by the storage configuration.
    pub fn open(storage: &StorageConfig) -> Result<Self, FsError> {
        match storage.backend {
            BackendKind::Memory => Ok(Self::in_memory()),
            BackendKind::Sled => {
                let backend = SledBackend::new(&storage.metadata_path)
                    .context(|| format!("open metadata store at {}", storage.metadata_path.display()))?;
                let blobs = FsBlobStore::new(&storage.blob_path)
                    .context(|| format!("open blob store at {}", storage.blob_path.display()))?;
                Ok(Self::with_stores(Arc::new(backend), Arc::new(blobs)))
            }
        }
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn ContentHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_indexer(mut self, indexer: Arc<dyn ContentIndexer>) -> Self {
        self.indexer = indexer;
        self
    }

    pub fn with_previews(mut self, previews: Arc<dyn PreviewService>) -> Self {
        self.previews = previews;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}

/// Counts from a purge of soft-deleted nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub nodes: usize,
    pub objects: usize,
    pub blobs: usize,
}

pub struct Filesystem {
    services: Services,
    config: FsConfig,
    tree: TreeNodeStore,
    revisions: RevisionManager,
    quota: QuotaMonitor,
    undo: UndoEngine,
    cache: StatCache,
    /// Held shared by transactions that make revisions point at blobs and
    /// exclusively by the blob sweep, so a sweep never sees a blob that is
    /// stored but not yet referenced by a committed revision.
    blob_gate: RwLock<()>,
}

impl Filesystem {
    pub fn new(services: Services, config: FsConfig) -> Result<Self, FsError> {
        config.ensure_valid()?;
        let objects = FileObjectStore::new(services.hasher.clone(), services.blobs.clone());
        let journal = crate::modlog::ModificationLog::new(config.filesystem.modlog_active);
        let tree = TreeNodeStore::new(
            services.hasher.clone(),
            objects.clone(),
            journal,
            config.filesystem.container_acl_roots,
        );
        Ok(Self {
            revisions: RevisionManager::new(objects, config.revisions),
            quota: QuotaMonitor::new(),
            undo: UndoEngine::new(tree.clone()),
            cache: StatCache::new(config.stat_cache.capacity),
            blob_gate: RwLock::new(()),
            tree,
            services,
            config,
        })
    }

    /// Open the configured stores with default collaborators.
    pub fn open(config: FsConfig) -> Result<Self, FsError> {
        let services = Services::open(&config.storage)?;
        Self::new(services, config)
    }

    /// Memory-backed instance with default configuration.
    pub fn in_memory() -> Result<Self, FsError> {
        Self::new(Services::in_memory(), FsConfig::in_memory())
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn backend(&self) -> &dyn MetadataBackend {
        self.services.backend.as_ref()
    }

    pub fn flush(&self) -> Result<(), FsError> {
        self.backend().flush().context(|| "flush metadata store")
    }

    /// Run `body` in a fresh transaction and commit, retrying on conflict.
    fn transact<T>(
        &self,
        operation: &str,
        mut body: impl FnMut(&mut Transaction<'_>) -> Result<T, FsError>,
    ) -> Result<T, FsError> {
        let max_retries = self.config.transaction.max_conflict_retries;
        let mut attempt = 0;
        loop {
            let mut txn = Transaction::new(self.backend());
            let result = match body(&mut txn) {
                Ok(value) => txn.commit().context(|| operation.to_string()).map(|_| value),
                Err(e) => Err(e),
            };
            match result {
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    attempt += 1;
                    debug!(operation, attempt, error = %e, "Retrying operation");
                }
                Err(FsError::Conflict(_)) => {
                    return Err(FsError::Conflict(format!(
                        "{} (gave up after {} attempts)",
                        operation,
                        attempt + 1
                    )))
                }
                other => return other,
            }
        }
    }

    /// Run `body` against a read-only view.
    fn read<T>(&self, body: impl FnOnce(&mut Transaction<'_>) -> Result<T, FsError>) -> Result<T, FsError> {
        let mut txn = Transaction::new(self.backend());
        body(&mut txn)
    }

    fn snapshot(&self, txn: &mut Transaction<'_>, node: TreeNode, path: String) -> Result<NodeSnapshot, FsError> {
        let object = match node.object_id {
            Some(id) => Some(self.tree.objects().get(txn, id)?),
            None => None,
        };
        Ok(NodeSnapshot { path, node, object })
    }

    fn snapshot_of(&self, txn: &mut Transaction<'_>, node: TreeNode) -> Result<NodeSnapshot, FsError> {
        let path = nodes::path_of(txn, node.id)?;
        self.snapshot(txn, node, path)
    }

    /// Create `/{app}/folders/shared` and `/{app}/folders/personal`.
    #[instrument(skip(self))]
    pub fn initialize_application(&self, app_id: &str) -> Result<NodeSnapshot, FsError> {
        validate_name(app_id)?;
        let folders = format!("/{}/{}", app_id, FOLDERS_SEGMENT);
        let shared = VirtualPath::parse(&format!("{}/{}", folders, SHARED_SCOPE))?;
        let personal = VirtualPath::parse(&format!("{}/{}", folders, PERSONAL_SCOPE))?;
        let top = self.transact("initialize_application", |txn| {
            self.tree.ensure_dir(txn, &shared)?;
            self.tree.ensure_dir(txn, &personal)?;
            self.tree.ensure_top(txn, app_id)
        })?;
        self.cache.invalidate(&format!("/{}", app_id));
        info!(app_id, "Initialized application tree");
        self.read(|txn| self.snapshot(txn, top, format!("/{}", app_id)))
    }

    /// Create a directory; fails with `AlreadyExists` if the path is taken.
    #[instrument(skip(self))]
    pub fn mkdir(&self, path: &str) -> Result<NodeSnapshot, FsError> {
        let path = VirtualPath::parse(path)?;
        let node = self.transact("mkdir", |txn| self.tree.mkdir(txn, &path, false))?;
        self.cache.invalidate(&path.to_string());
        self.read(|txn| self.snapshot(txn, node, path.to_string()))
    }

    /// Create a directory and any missing parents; existing ones are fine.
    #[instrument(skip(self))]
    pub fn ensure_dir(&self, path: &str) -> Result<NodeSnapshot, FsError> {
        let path = VirtualPath::parse(path)?;
        let node = self.transact("ensure_dir", |txn| self.tree.ensure_dir(txn, &path))?;
        self.cache.invalidate(&path.to_string());
        self.read(|txn| self.snapshot(txn, node, path.to_string()))
    }

    #[instrument(skip(self))]
    pub fn rmdir(&self, path: &str, recursive: bool) -> Result<(), FsError> {
        let path = VirtualPath::parse(path)?;
        self.transact("rmdir", |txn| self.tree.rmdir(txn, &path, recursive))?;
        self.cache.invalidate(&path.to_string());
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn unlink(&self, path: &str) -> Result<(), FsError> {
        let path = VirtualPath::parse(path)?;
        self.transact("unlink", |txn| self.tree.unlink(txn, &path))?;
        self.cache.invalidate(&path.to_string());
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn rename(&self, src: &str, dst: &str) -> Result<NodeSnapshot, FsError> {
        let src = VirtualPath::parse(src)?;
        let dst = VirtualPath::parse(dst)?;
        let node = self.transact("rename", |txn| self.tree.rename(txn, &src, &dst))?;
        self.cache.invalidate(&src.to_string());
        self.cache.invalidate(&dst.to_string());
        self.read(|txn| self.snapshot_of(txn, node))
    }

    #[instrument(skip(self))]
    pub fn copy(&self, src: &str, dst: &str) -> Result<NodeSnapshot, FsError> {
        let src = VirtualPath::parse(src)?;
        let dst = VirtualPath::parse(dst)?;
        let node = {
            let _pin = self.blob_gate.read();
            self.transact("copy", |txn| self.tree.copy(txn, &src, &dst))?
        };
        self.cache.invalidate(&dst.to_string());
        self.read(|txn| self.snapshot_of(txn, node))
    }

    /// Snapshot of the node at `path`, served from the stat cache when possible.
    pub fn stat(&self, path: &str) -> Result<NodeSnapshot, FsError> {
        let path = VirtualPath::parse(path)?;
        let key = path.to_string();
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }
        let generation = self.cache.generation();
        let snapshot = self.read(|txn| {
            let node = resolver::resolve(txn, &path)?;
            self.snapshot(txn, node, key.clone())
        })?;
        self.cache.insert(snapshot.clone(), generation);
        Ok(snapshot)
    }

    /// Live children of a directory, ordered by name.
    pub fn scan_dir(&self, path: &str) -> Result<Vec<NodeSnapshot>, FsError> {
        let path = VirtualPath::parse(path)?;
        self.read(|txn| {
            let dir = resolver::resolve(txn, &path)?;
            if !dir.is_dir() {
                return Err(FsError::InvalidArgument(format!("{} is not a directory", path)));
            }
            nodes::children(txn, Some(dir.id))?
                .into_iter()
                .map(|child| {
                    let child_path = format!("{}/{}", path, child.name);
                    self.snapshot(txn, child, child_path)
                })
                .collect()
        })
    }

    fn lookup(&self, path: &str) -> Result<Option<TreeNode>, FsError> {
        let path = VirtualPath::parse(path)?;
        self.read(|txn| resolver::lookup(txn, &path))
    }

    pub fn file_exists(&self, path: &str) -> Result<bool, FsError> {
        Ok(self.lookup(path)?.is_some())
    }

    pub fn is_dir(&self, path: &str) -> Result<bool, FsError> {
        Ok(self.lookup(path)?.is_some_and(|n| n.is_dir()))
    }

    pub fn is_file(&self, path: &str) -> Result<bool, FsError> {
        Ok(self.lookup(path)?.is_some_and(|n| n.is_file()))
    }

    pub fn get_node(&self, id: NodeId) -> Result<TreeNode, FsError> {
        self.read(|txn| nodes::load(txn, id))
    }

    pub fn path_of_node(&self, id: NodeId) -> Result<String, FsError> {
        self.read(|txn| nodes::path_of(txn, id))
    }

    /// Open a write handle. Nothing is stored until the handle is closed.
    #[instrument(skip(self))]
    pub fn open_write(&self, path: &str, mode: WriteMode) -> Result<FileWriter<'_>, FsError> {
        let path = VirtualPath::parse(path)?;
        self.read(|txn| {
            let target = resolver::resolve_for_create(txn, &path)?;
            match target.existing {
                Some(n) if n.is_dir() => Err(FsError::InvalidArgument(format!("{} is a directory", path))),
                Some(_) if mode == WriteMode::CreateNew => Err(FsError::AlreadyExists(path.to_string())),
                _ => Ok(()),
            }
        })?;
        Ok(FileWriter::new(self, path, mode, self.services.hasher.begin()))
    }

    /// Close a write handle, committing its content.
    pub fn fclose(&self, writer: FileWriter<'_>) -> Result<NodeSnapshot, FsError> {
        writer.close()
    }

    /// Open the current (or an explicit) revision for reading.
    #[instrument(skip(self))]
    pub fn open_read(&self, path: &str, revision: Option<u64>) -> Result<FileReader, FsError> {
        let path = VirtualPath::parse(path)?;
        let (node, revision, content) = self.read(|txn| {
            let node = resolver::resolve(txn, &path)?;
            if !node.is_file() {
                return Err(FsError::InvalidArgument(format!("{} is not a file", path)));
            }
            let object_id = node
                .object_id
                .ok_or_else(|| FsError::NotFound(format!("content of {}", path)))?;
            let revision = revision.unwrap_or(node.revision);
            let content = self.tree.objects().read(txn, object_id, Some(revision))?;
            Ok((node, revision, content))
        })?;
        Ok(FileReader::new(path.to_string(), node.id, revision, content))
    }

    /// Write a whole file in one call (create or replace).
    pub fn write_file(&self, path: &str, content: &[u8]) -> Result<NodeSnapshot, FsError> {
        let path = VirtualPath::parse(path)?;
        let digest = self.tree.objects().digest(content);
        self.commit_write(&path, WriteMode::Truncate, digest, content, None)
    }

    pub fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError> {
        Ok(self.open_read(path, None)?.into_inner())
    }

    pub(crate) fn commit_write(
        &self,
        path: &VirtualPath,
        mode: WriteMode,
        digest: Hash,
        content: &[u8],
        content_type: Option<&str>,
    ) -> Result<NodeSnapshot, FsError> {
        let outcome = {
            let _pin = self.blob_gate.read();
            self.transact("write", |txn| {
                self.tree.write_content(txn, path, mode, digest, content, content_type)
            })?
        };
        self.cache.invalidate(&path.to_string());
        info!(
            path = %path,
            node_id = %outcome.node.id,
            revision = outcome.change.new_revision,
            size = outcome.change.new_size,
            "Committed file content"
        );

        if self.config.filesystem.index_content {
            if let Err(e) = self.index_file_object(outcome.object.id) {
                warn!(path = %path, error = %e, "Content indexing failed");
            }
        }
        if self.config.filesystem.create_previews {
            self.record_previews(outcome.object.id, content);
            self.cache.invalidate(&path.to_string());
        }
        if self.config.filesystem.enable_notifications {
            self.notify_subscribers(outcome.node.id, &path.to_string(), outcome.created);
        }
        self.read(|txn| {
            let node = nodes::load(txn, outcome.node.id)?;
            self.snapshot(txn, node, path.to_string())
        })
    }

    fn record_previews(&self, object_id: ObjectId, content: &[u8]) {
        let result = self.read(|txn| self.tree.objects().get(txn, object_id)).and_then(|object| {
            let pages = self
                .services
                .previews
                .generate(&object, content)
                .map_err(|e| FsError::Service(e.to_string()))?;
            self.transact("record_previews", |txn| {
                let mut object = self.tree.objects().get(txn, object_id)?;
                object.preview_count = pages;
                self.tree.objects().put(txn, &object)
            })
        });
        if let Err(e) = result {
            warn!(object_id = %object_id, error = %e, "Preview generation failed");
        }
    }

    fn notify_subscribers(&self, node_id: NodeId, path: &str, created: bool) {
        let recipients = self.read(|txn| {
            let mut accounts = BTreeSet::new();
            for ancestor in nodes::ancestors(txn, node_id)? {
                accounts.extend(ancestor.properties.active_notification_accounts());
            }
            Ok(accounts)
        });
        let recipients: Vec<String> = match recipients {
            Ok(r) if r.is_empty() => return,
            Ok(r) => r.into_iter().collect(),
            Err(e) => {
                warn!(path, error = %e, "Could not collect notification subscribers");
                return;
            }
        };
        let body = format!("{} has been {}", path, if created { "created" } else { "updated" });
        if let Err(e) = self.services.notifier.send(&recipients, NOTIFICATION_SUBJECT, &body) {
            warn!(path, error = %e, "Notification delivery failed");
        }
    }

    pub fn get_etag(&self, path: &str) -> Result<String, FsError> {
        Ok(hash_hex(&self.stat(path)?.hash))
    }

    pub fn get_mtime(&self, path: &str) -> Result<DateTime<Utc>, FsError> {
        Ok(self.stat(path)?.modified_at)
    }

    /// Content type of a file; None for directories.
    pub fn get_content_type(&self, path: &str) -> Result<Option<String>, FsError> {
        Ok(self.stat(path)?.content_type().map(str::to_string))
    }

    pub fn file_size(&self, path: &str) -> Result<u64, FsError> {
        Ok(self.stat(path)?.size)
    }

    pub fn clear_stat_cache(&self) {
        self.cache.clear();
    }

    #[instrument(skip(self))]
    pub fn set_quota(&self, path: &str, quota: Option<u64>) -> Result<NodeSnapshot, FsError> {
        let path = VirtualPath::parse(path)?;
        let node = self.transact("set_quota", |txn| self.tree.set_quota(txn, &path, quota))?;
        self.cache.invalidate(&path.to_string());
        self.read(|txn| self.snapshot(txn, node, path.to_string()))
    }

    pub fn set_node_property(&self, path: &str, property: NodeProperty) -> Result<NodeSnapshot, FsError> {
        let path = VirtualPath::parse(path)?;
        let node = self.transact("set_property", |txn| {
            self.tree.set_property(txn, &path, property.clone())
        })?;
        self.cache.invalidate(&path.to_string());
        self.read(|txn| self.snapshot(txn, node, path.to_string()))
    }

    pub fn remove_node_property(&self, path: &str, key: PropertyKey) -> Result<NodeSnapshot, FsError> {
        let path = VirtualPath::parse(path)?;
        let node = self.transact("remove_property", |txn| self.tree.remove_property(txn, &path, key))?;
        self.cache.invalidate(&path.to_string());
        self.read(|txn| self.snapshot(txn, node, path.to_string()))
    }

    /// Send one notification per node over quota. Returns how many were sent.
    #[instrument(skip(self))]
    pub fn notify_quota(&self) -> Result<usize, FsError> {
        let violations = self.read(|txn| self.quota.violations(txn))?;
        let mut sent = 0;
        for violation in violations {
            let mut recipients = self.config.quota.notification_recipients.clone();
            if let Some(owner) = &violation.owner {
                if !recipients.contains(owner) {
                    recipients.push(owner.clone());
                }
            }
            if recipients.is_empty() {
                warn!(path = %violation.path, "Quota exceeded but nobody to notify");
                continue;
            }
            match self
                .services
                .notifier
                .send(&recipients, QUOTA_NOTIFICATION_SUBJECT, &violation.message())
            {
                Ok(()) => sent += 1,
                Err(e) => warn!(path = %violation.path, error = %e, "Quota notification failed"),
            }
        }
        Ok(sent)
    }

    /// Recount every directory size from its live files.
    #[instrument(skip(self))]
    pub fn recalculate_folder_sizes(&self) -> Result<RecountReport, FsError> {
        let report = self.transact("recalculate_folder_sizes", |txn| self.quota.recalculate_folder_sizes(txn))?;
        self.cache.clear();
        Ok(report)
    }

    #[instrument(skip(self))]
    pub fn create_acl_node(&self, path: &str) -> Result<usize, FsError> {
        let path = VirtualPath::parse(path)?;
        let changed = self.transact("create_acl_node", |txn| {
            let node = resolver::resolve(txn, &path)?;
            self.tree.acl().create_acl_node(txn, node.id, "create_acl_node")
        })?;
        self.cache.invalidate(&path.to_string());
        Ok(changed)
    }

    #[instrument(skip(self))]
    pub fn remove_acl_from_node(&self, path: &str) -> Result<usize, FsError> {
        let path = VirtualPath::parse(path)?;
        let changed = self.transact("remove_acl_from_node", |txn| {
            let node = resolver::resolve(txn, &path)?;
            self.tree.acl().remove_acl_from_node(txn, node.id, "remove_acl_from_node")
        })?;
        self.cache.invalidate(&path.to_string());
        Ok(changed)
    }

    /// Every live descendant of the given nodes.
    pub fn get_all_child_ids(&self, ids: &[NodeId]) -> Result<Vec<NodeId>, FsError> {
        self.read(|txn| self.tree.acl().get_all_child_ids(txn, ids))
    }

    /// Apply revision retention as of now.
    pub fn clear_file_revisions(&self) -> Result<usize, FsError> {
        self.clear_file_revisions_at(Utc::now())
    }

    /// Apply revision retention as of `now`, one object per transaction.
    #[instrument(skip(self))]
    pub fn clear_file_revisions_at(&self, now: DateTime<Utc>) -> Result<usize, FsError> {
        if self.revisions.policy().is_disabled() {
            return Ok(0);
        }
        let ids = self.read(|txn| self.tree.objects().list_ids(txn))?;
        let mut purged = 0;
        for id in ids {
            purged += self
                .transact("clear_file_revisions", |txn| {
                    self.revisions.clear_object_revisions(txn, id, now)
                })?
                .len();
        }
        if purged > 0 {
            self.sweep_blobs()?;
            self.cache.clear();
        }
        info!(purged, "Applied revision retention");
        Ok(purged)
    }

    /// Drop revisions from every object currently holding `content_hash`.
    pub fn delete_revisions(&self, content_hash: &Hash, revisions: &[u64]) -> Result<usize, FsError> {
        let touched = self.transact("delete_revisions", |txn| {
            self.revisions.delete_revisions(txn, content_hash, revisions)
        })?;
        self.cache.clear();
        Ok(touched)
    }

    pub fn delete_object_revisions(&self, object_id: ObjectId, revisions: &[u64]) -> Result<Vec<u64>, FsError> {
        let removed = self.transact("delete_object_revisions", |txn| {
            self.revisions.delete_object_revisions(txn, object_id, revisions)
        })?;
        self.cache.clear();
        Ok(removed)
    }

    pub fn recalculate_revision_size(&self, object_id: ObjectId) -> Result<u64, FsError> {
        let size = self.transact("recalculate_revision_size", |txn| {
            self.revisions.recalculate_revision_size(txn, object_id)
        })?;
        self.cache.clear();
        Ok(size)
    }

    /// Revision rows of the file at `path`, ascending.
    pub fn revisions(&self, path: &str) -> Result<Vec<Revision>, FsError> {
        let path = VirtualPath::parse(path)?;
        self.read(|txn| {
            let node = resolver::resolve(txn, &path)?;
            match node.object_id {
                Some(id) => self.tree.objects().revisions(txn, id),
                None => Err(FsError::InvalidArgument(format!("{} is not a file", path))),
            }
        })
    }

    /// Journal entries after `after_seq`, oldest first.
    pub fn modifications(&self, after_seq: u64, limit: Option<usize>) -> Result<Vec<ModificationEntry>, FsError> {
        self.read(|txn| self.tree.journal().entries_after(txn, after_seq, limit))
    }

    pub fn last_instance_seq(&self) -> Result<u64, FsError> {
        self.read(|txn| self.tree.journal().last_seq(txn))
    }

    /// Replay matching journal entries in reverse.
    #[instrument(skip(self))]
    pub fn undo(&self, filter: &UndoFilter) -> Result<UndoReport, FsError> {
        let report = self.transact("undo", |txn| self.undo.undo(txn, filter))?;
        self.cache.clear();
        Ok(report)
    }

    /// Objects whose current content has not been indexed yet.
    pub fn get_not_indexed_object_ids(&self) -> Result<Vec<ObjectId>, FsError> {
        self.read(|txn| {
            let objects = self.tree.objects();
            let mut out = Vec::new();
            for id in objects.list_ids(txn)? {
                let object = objects.get(txn, id)?;
                if object.revision > 0 && !object.is_indexed() {
                    out.push(id);
                }
            }
            Ok(out)
        })
    }

    /// Feed an object's current content to the indexer. Returns false if the
    /// indexer refused it.
    #[instrument(skip(self))]
    pub fn index_file_object(&self, object_id: ObjectId) -> Result<bool, FsError> {
        let (hash, content) = self.read(|txn| {
            let object = self.tree.objects().get(txn, object_id)?;
            let content = self.tree.objects().read(txn, object_id, None)?;
            Ok((object.hash, content))
        })?;
        if let Err(e) = self.services.indexer.index(object_id, &content) {
            warn!(object_id = %object_id, error = %e, "Indexer rejected content");
            return Ok(false);
        }
        self.transact("index_file_object", |txn| {
            let mut object = self.tree.objects().get(txn, object_id)?;
            if object.hash == hash {
                object.indexed_hash = Some(hash);
                self.tree.objects().put(txn, &object)?;
            }
            Ok(())
        })?;
        Ok(true)
    }

    /// Rendered preview page for the file at `path`.
    pub fn get_preview_for_node(&self, path: &str, kind: PreviewKind, page: u32) -> Result<Vec<u8>, FsError> {
        let snapshot = self.stat(path)?;
        let count = snapshot.object.as_ref().map_or(0, |o| o.preview_count);
        if page >= count {
            return Err(FsError::NotFound(format!("preview page {} of {}", page, path)));
        }
        self.services
            .previews
            .render(&snapshot.node, kind, page)
            .map_err(|e| FsError::Service(e.to_string()))
    }

    /// Purge soft-deleted nodes (and whatever sits below them), drop their
    /// objects and revisions, then sweep unreferenced blobs.
    #[instrument(skip(self))]
    pub fn clear_deleted_files(&self) -> Result<PurgeReport, FsError> {
        let mut report = self.transact("clear_deleted_files", |txn| {
            let mut report = PurgeReport::default();
            let now = Utc::now();
            let deleted: Vec<TreeNode> = nodes::all(txn)?
                .into_iter()
                .filter(|n| matches!(n.lifecycle, Lifecycle::SoftDeleted { .. }))
                .collect();
            for node in deleted {
                let mut doomed = vec![node.clone()];
                walker::walk_descendants(txn, node.id, |_, child| {
                    doomed.push(child);
                    Ok(Visit::Descend)
                })?;
                for mut victim in doomed {
                    if victim.is_live() {
                        nodes::unlink(txn, &victim);
                    } else {
                        nodes::exhume(txn, &victim)?;
                    }
                    if let Some(object_id) = victim.object_id {
                        self.tree.objects().delete(txn, object_id)?;
                        report.objects += 1;
                    }
                    victim.lifecycle = Lifecycle::Purged { at: now };
                    nodes::put(txn, &victim)?;
                    report.nodes += 1;
                }
            }
            Ok(report)
        })?;
        report.blobs = self.sweep_blobs()?;
        self.cache.clear();
        info!(nodes = report.nodes, objects = report.objects, blobs = report.blobs, "Purged deleted files");
        Ok(report)
    }

    /// Delete blobs no revision row refers to.
    ///
    /// Waits for in-flight content writes and copies in this process to
    /// commit, and blocks new ones until the sweep is done.
    pub fn sweep_blobs(&self) -> Result<usize, FsError> {
        let _exclusive = self.blob_gate.write();
        let referenced: HashSet<Hash> = self.read(|txn| {
            let rows = txn
                .scan_prefix(keys::REVISION_PREFIX.as_bytes())
                .context(|| "scan revisions")?;
            rows.into_iter()
                .map(|(_, raw)| {
                    bincode::deserialize::<Revision>(&raw)
                        .map(|r| r.content_hash)
                        .map_err(crate::error::StorageError::from)
                        .context(|| "decode revision")
                })
                .collect()
        })?;
        let blobs = &self.services.blobs;
        let mut removed = 0;
        for hash in blobs.list().context(|| "list blobs")? {
            if !referenced.contains(&hash) {
                blobs.delete(&hash).context(|| format!("delete blob {}", hash_hex(&hash)))?;
                removed += 1;
            }
        }
        debug!(removed, "Swept unreferenced blobs");
        Ok(removed)
    }
}
