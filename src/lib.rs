//! treefs: Versioned Hierarchical Virtual Filesystem
//!
//! A path-addressed file tree over a transactional metadata store and a
//! content-addressed blob store. Every write creates a revision, every
//! directory carries a fingerprint of its live subtree, and every field
//! change is journaled so it can be replayed backwards.

pub mod acl;
pub mod cache;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod logging;
pub mod modlog;
pub mod object;
pub mod quota;
pub mod revision;
pub mod services;
pub mod store;
pub mod tree;
pub mod types;

pub use cache::NodeSnapshot;
pub use config::FsConfig;
pub use error::{FsError, StorageError};
pub use filesystem::{FileReader, FileWriter, Filesystem, PurgeReport, Services};
pub use modlog::{ModificationEntry, UndoFilter, UndoReport};
pub use object::{FileObject, Revision};
pub use tree::{NodeProperty, PropertyKey, TreeNode, VirtualPath, WriteMode};
pub use types::{Hash, NodeId, ObjectId, RecordId};
