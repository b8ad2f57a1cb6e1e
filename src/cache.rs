//! Stat cache
//!
//! Process-local path -> snapshot memo. Mutations invalidate the touched
//! path, its ancestors and everything below it. Other processes sharing the
//! backend are not seen until `clear` or a local mutation.

use crate::object::FileObject;
use crate::tree::node::TreeNode;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ops::Deref;
use tracing::trace;

/// Read snapshot of a node plus, for files, its object.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSnapshot {
    pub path: String,
    pub node: TreeNode,
    pub object: Option<FileObject>,
}

impl Deref for NodeSnapshot {
    type Target = TreeNode;

    fn deref(&self) -> &TreeNode {
        &self.node
    }
}

impl NodeSnapshot {
    pub fn content_type(&self) -> Option<&str> {
        self.object.as_ref().map(|o| o.content_type.as_str())
    }

    pub fn available_revisions(&self) -> &[u64] {
        self.object
            .as_ref()
            .map(|o| o.available_revisions.as_slice())
            .unwrap_or(&[])
    }
}

struct Entries {
    by_path: HashMap<String, NodeSnapshot>,
    /// Bumped by every invalidation; snapshots read under an older
    /// generation are not admitted.
    generation: u64,
}

pub struct StatCache {
    entries: Mutex<Entries>,
    capacity: usize,
}

impl StatCache {
    /// A capacity of 0 disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Entries {
                by_path: HashMap::new(),
                generation: 0,
            }),
            capacity,
        }
    }

    pub fn get(&self, path: &str) -> Option<NodeSnapshot> {
        self.entries.lock().by_path.get(path).cloned()
    }

    /// Take this before reading the backend and hand it to [`StatCache::insert`].
    pub fn generation(&self) -> u64 {
        self.entries.lock().generation
    }

    /// Cache `snapshot` unless an invalidation happened since `generation`
    /// was taken. Returns whether it was admitted.
    pub fn insert(&self, snapshot: NodeSnapshot, generation: u64) -> bool {
        if self.capacity == 0 {
            return false;
        }
        let mut entries = self.entries.lock();
        if entries.generation != generation {
            trace!(path = %snapshot.path, "Dropping snapshot read before an invalidation");
            return false;
        }
        if entries.by_path.len() >= self.capacity && !entries.by_path.contains_key(&snapshot.path) {
            trace!(capacity = self.capacity, "Stat cache full, clearing");
            entries.by_path.clear();
        }
        entries.by_path.insert(snapshot.path.clone(), snapshot);
        true
    }

    /// Drop `path`, every ancestor of it and every path below it.
    pub fn invalidate(&self, path: &str) {
        let below = if path == "/" { path.to_string() } else { format!("{}/", path) };
        let mut entries = self.entries.lock();
        entries.generation += 1;
        entries.by_path.retain(|cached, _| {
            let is_ancestor = cached == "/"
                || (path.starts_with(cached.as_str())
                    && path.as_bytes().get(cached.len()) == Some(&b'/'));
            !(cached == path || is_ancestor || cached.starts_with(&below))
        });
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.generation += 1;
        entries.by_path.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
