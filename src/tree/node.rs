//! Tree node record and its typed property map.

use crate::types::{Hash, NodeId, ObjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Node type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Directory,
    File,
}

/// Lifecycle of a node.
///
/// Soft-deleted nodes are out of the live child index but keep their rows
/// (and, for files, their content) until purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Live,
    SoftDeleted { at: DateTime<Utc> },
    Purged { at: DateTime<Utc> },
}

impl Lifecycle {
    pub fn is_live(&self) -> bool {
        matches!(self, Lifecycle::Live)
    }
}

/// Known property keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKey {
    Notification,
    Description,
}

/// Per-account notification subscription on a folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSetting {
    pub account_id: String,
    pub active: bool,
}

/// Typed property value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeProperty {
    Notification(Vec<NotificationSetting>),
    Description(String),
}

impl NodeProperty {
    pub fn key(&self) -> PropertyKey {
        match self {
            NodeProperty::Notification(_) => PropertyKey::Notification,
            NodeProperty::Description(_) => PropertyKey::Description,
        }
    }
}

/// Property map keyed by [`PropertyKey`]; each key holds its own variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeProperties(BTreeMap<PropertyKey, NodeProperty>);

impl NodeProperties {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn set(&mut self, property: NodeProperty) -> Option<NodeProperty> {
        self.0.insert(property.key(), property)
    }

    pub fn remove(&mut self, key: PropertyKey) -> Option<NodeProperty> {
        self.0.remove(&key)
    }

    pub fn get(&self, key: PropertyKey) -> Option<&NodeProperty> {
        self.0.get(&key)
    }

    /// Accounts with an active notification subscription.
    pub fn active_notification_accounts(&self) -> Vec<String> {
        match self.get(PropertyKey::Notification) {
            Some(NodeProperty::Notification(settings)) => settings
                .iter()
                .filter(|s| s.active)
                .map(|s| s.account_id.clone())
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self.get(PropertyKey::Description) {
            Some(NodeProperty::Description(text)) => Some(text),
            _ => None,
        }
    }
}

/// TreeNode: one file or directory in the virtual tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: NodeId,
    /// None for top-level (application) nodes.
    pub parent_id: Option<NodeId>,
    /// Unique among live siblings.
    pub name: String,
    pub node_type: NodeType,
    /// Files only.
    pub object_id: Option<ObjectId>,
    /// Self id for an ACL root, inherited root id, or none.
    pub acl_node: Option<NodeId>,
    /// Content hash for files, children fingerprint for directories.
    pub hash: Hash,
    pub revision: u64,
    /// File size, or aggregate of live descendant file sizes for directories.
    pub size: u64,
    pub quota: Option<u64>,
    pub lifecycle: Lifecycle,
    pub properties: NodeProperties,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl TreeNode {
    pub fn is_dir(&self) -> bool {
        self.node_type == NodeType::Directory
    }

    pub fn is_file(&self) -> bool {
        self.node_type == NodeType::File
    }

    pub fn is_live(&self) -> bool {
        self.lifecycle == Lifecycle::Live
    }

    /// Whether this node defines its own ACL scope.
    pub fn is_acl_root(&self) -> bool {
        self.acl_node == Some(self.id)
    }

    pub fn deleted_time(&self) -> Option<DateTime<Utc>> {
        match self.lifecycle {
            Lifecycle::Live => None,
            Lifecycle::SoftDeleted { at } | Lifecycle::Purged { at } => Some(at),
        }
    }
}
