//! Core identifier and hash types shared across the tree engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte digest produced by the configured content hasher.
pub type Hash = [u8; 32];

/// Identifier of a tree node (file or directory).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Identifier of a file object (content + revision chain).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{:x}", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "o{:x}", self.0)
    }
}

/// Record a modification-log entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RecordId {
    Node(NodeId),
    Object(ObjectId),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Node(id) => id.fmt(f),
            RecordId::Object(id) => id.fmt(f),
        }
    }
}

impl From<NodeId> for RecordId {
    fn from(id: NodeId) -> Self {
        RecordId::Node(id)
    }
}

impl From<ObjectId> for RecordId {
    fn from(id: ObjectId) -> Self {
        RecordId::Object(id)
    }
}

/// Render a hash as lowercase hex.
pub fn hash_hex(hash: &Hash) -> String {
    hex::encode(hash)
}
