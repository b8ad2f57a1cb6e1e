//! Key layout for the metadata keyspace.
//!
//! Fixed-width hex/decimal encodings keep lexicographic key order equal to
//! numeric order, so prefix scans come back sorted.

use crate::types::{NodeId, ObjectId};

pub const NODE_PREFIX: &str = "node/";
pub const CHILD_PREFIX: &str = "child/";
pub const DELETED_PREFIX: &str = "deleted/";
pub const OBJECT_PREFIX: &str = "object/";
pub const REVISION_PREFIX: &str = "revision/";
pub const MODLOG_PREFIX: &str = "modlog/";
pub const INSTANCE_SEQ_KEY: &str = "meta/instance_seq";

pub fn node(id: NodeId) -> Vec<u8> {
    format!("{}{:016x}", NODE_PREFIX, id.0).into_bytes()
}

fn parent_segment(parent: Option<NodeId>) -> String {
    match parent {
        Some(id) => format!("{:016x}", id.0),
        None => "root".to_string(),
    }
}

/// Live-child index entry: (parent, name) -> child node id.
pub fn child(parent: Option<NodeId>, name: &str) -> Vec<u8> {
    format!("{}{}/{}", CHILD_PREFIX, parent_segment(parent), name).into_bytes()
}

/// Prefix covering every live child of `parent`.
pub fn children_of(parent: Option<NodeId>) -> Vec<u8> {
    format!("{}{}/", CHILD_PREFIX, parent_segment(parent)).into_bytes()
}

/// Deleted-file index entry: (parent, name) -> last file soft-deleted there.
pub fn deleted_child(parent: Option<NodeId>, name: &str) -> Vec<u8> {
    format!("{}{}/{}", DELETED_PREFIX, parent_segment(parent), name).into_bytes()
}

pub fn object(id: ObjectId) -> Vec<u8> {
    format!("{}{:016x}", OBJECT_PREFIX, id.0).into_bytes()
}

pub fn revision(object: ObjectId, revision: u64) -> Vec<u8> {
    format!("{}{:016x}/{:020}", REVISION_PREFIX, object.0, revision).into_bytes()
}

pub fn revisions_of(object: ObjectId) -> Vec<u8> {
    format!("{}{:016x}/", REVISION_PREFIX, object.0).into_bytes()
}

pub fn modlog(seq: u64) -> Vec<u8> {
    format!("{}{:020}", MODLOG_PREFIX, seq).into_bytes()
}

/// Encode a node id as a child-index value.
pub fn encode_id(id: u64) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

pub fn decode_id(raw: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = raw.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}
