//! Shared fixtures for integration tests
//!
//! Builds in-memory filesystems with recording collaborators so tests can
//! assert on what the engine sent to the outside world.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use treefs::config::FsConfig;
use treefs::object::{BlobStore, MemoryBlobStore};
use treefs::services::{ContentIndexer, Notifier, PreviewKind, PreviewService, ServiceError};
use treefs::store::{ChangeSet, KvPair, MemoryBackend, MetadataBackend};
use treefs::{FileObject, Filesystem, Hash, ObjectId, Services, StorageError, TreeNode};

pub const APP: &str = "app";

/// Memory-backed filesystem with `/app/folders/{shared,personal}` created.
pub fn filesystem() -> Filesystem {
    filesystem_with(Services::in_memory(), FsConfig::in_memory())
}

pub fn filesystem_with(services: Services, config: FsConfig) -> Filesystem {
    let fs = Filesystem::new(services, config).unwrap();
    fs.initialize_application(APP).unwrap();
    fs
}

/// One delivered notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<(), ServiceError> {
        self.sent.lock().push(Sent {
            recipients: recipients.to_vec(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Indexer that remembers what it saw and can be told to refuse.
#[derive(Default)]
pub struct RecordingIndexer {
    pub indexed: Mutex<Vec<(ObjectId, Vec<u8>)>>,
    pub refuse: Mutex<bool>,
}

impl ContentIndexer for RecordingIndexer {
    fn index(&self, object_id: ObjectId, content: &[u8]) -> Result<(), ServiceError> {
        if *self.refuse.lock() {
            return Err(ServiceError::new("indexer", "refused"));
        }
        self.indexed.lock().push((object_id, content.to_vec()));
        Ok(())
    }
}

/// One preview page per started kilobyte of content.
pub struct PagedPreviews;

impl PreviewService for PagedPreviews {
    fn generate(&self, _object: &FileObject, content: &[u8]) -> Result<u32, ServiceError> {
        Ok(content.len().div_ceil(1024) as u32)
    }

    fn render(&self, node: &TreeNode, kind: PreviewKind, page: u32) -> Result<Vec<u8>, ServiceError> {
        Ok(format!("{}:{:?}:{}", node.name, kind, page).into_bytes())
    }
}

/// Memory backend that reports a conflict for the next `failures` commits
/// that carry writes.
pub struct FlakyBackend {
    inner: MemoryBackend,
    failures: AtomicUsize,
    pub commits: AtomicUsize,
}

impl FlakyBackend {
    pub fn new() -> Self {
        Self {
            inner: MemoryBackend::new(),
            failures: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
        }
    }

    pub fn fail_next(&self, failures: usize) {
        self.failures.store(failures, Ordering::SeqCst);
    }
}

impl MetadataBackend for FlakyBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.get(key)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>, StorageError> {
        self.inner.scan_prefix(prefix)
    }

    fn commit(&self, changes: ChangeSet) -> Result<(), StorageError> {
        if !changes.is_read_only() {
            let pending = self.failures.load(Ordering::SeqCst);
            if pending > 0 {
                self.failures.store(pending - 1, Ordering::SeqCst);
                return Err(StorageError::Conflict);
            }
            self.commits.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.commit(changes)
    }

    fn generate_id(&self) -> Result<u64, StorageError> {
        self.inner.generate_id()
    }
}

/// Services over a flaky backend; the handle is kept for steering it.
pub fn flaky_services() -> (Services, Arc<FlakyBackend>) {
    let backend = Arc::new(FlakyBackend::new());
    let services = Services::with_stores(backend.clone(), Arc::new(MemoryBlobStore::new()));
    (services, backend)
}

/// One-shot rendezvous. Once armed, the first caller of `pass` parks until
/// the test calls `open`.
#[derive(Default)]
pub struct Gate {
    armed: AtomicBool,
    state: Mutex<(bool, bool)>,
    changed: Condvar,
}

impl Gate {
    pub fn arm(&self) {
        *self.state.lock() = (false, false);
        self.armed.store(true, Ordering::SeqCst);
    }

    fn pass(&self) {
        if !self.armed.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut state = self.state.lock();
        state.0 = true;
        self.changed.notify_all();
        while !state.1 {
            self.changed.wait(&mut state);
        }
    }

    /// Block until a caller is parked at the gate.
    pub fn wait_parked(&self) {
        let mut state = self.state.lock();
        while !state.0 {
            self.changed.wait(&mut state);
        }
    }

    pub fn open(&self) {
        let mut state = self.state.lock();
        state.1 = true;
        self.changed.notify_all();
    }
}

/// Memory backend whose point reads under `prefix` can be held at a gate.
pub struct GatedBackend {
    inner: MemoryBackend,
    prefix: &'static [u8],
    pub gate: Gate,
}

impl MetadataBackend for GatedBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        if key.starts_with(self.prefix) {
            self.gate.pass();
        }
        self.inner.get(key)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>, StorageError> {
        self.inner.scan_prefix(prefix)
    }

    fn commit(&self, changes: ChangeSet) -> Result<(), StorageError> {
        self.inner.commit(changes)
    }

    fn generate_id(&self) -> Result<u64, StorageError> {
        self.inner.generate_id()
    }
}

pub fn gated_backend_services(prefix: &'static str) -> (Services, Arc<GatedBackend>) {
    let backend = Arc::new(GatedBackend {
        inner: MemoryBackend::new(),
        prefix: prefix.as_bytes(),
        gate: Gate::default(),
    });
    let services = Services::with_stores(backend.clone(), Arc::new(MemoryBlobStore::new()));
    (services, backend)
}

/// Memory blob store that can hold a writer at the gate right after its
/// `contains` check answered.
#[derive(Default)]
pub struct GatedBlobs {
    inner: MemoryBlobStore,
    pub gate: Gate,
}

impl BlobStore for GatedBlobs {
    fn put(&self, hash: &Hash, data: &[u8]) -> Result<(), StorageError> {
        self.inner.put(hash, data)
    }

    fn get(&self, hash: &Hash) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.get(hash)
    }

    fn contains(&self, hash: &Hash) -> Result<bool, StorageError> {
        let found = self.inner.contains(hash);
        self.gate.pass();
        found
    }

    fn delete(&self, hash: &Hash) -> Result<(), StorageError> {
        self.inner.delete(hash)
    }

    fn list(&self) -> Result<Vec<Hash>, StorageError> {
        self.inner.list()
    }
}

pub fn gated_blob_services() -> (Services, Arc<GatedBlobs>) {
    let blobs = Arc::new(GatedBlobs::default());
    let services = Services::with_stores(Arc::new(MemoryBackend::new()), blobs.clone());
    (services, blobs)
}
