//! External collaborators
//!
//! Content indexing, preview rendering and notification delivery live
//! outside the tree engine. The engine only sees these narrow traits.

use crate::object::FileObject;
use crate::tree::node::TreeNode;
use crate::types::ObjectId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
#[error("{service} failed: {message}")]
pub struct ServiceError {
    pub service: &'static str,
    pub message: String,
}

impl ServiceError {
    pub fn new(service: &'static str, message: impl Into<String>) -> Self {
        Self {
            service,
            message: message.into(),
        }
    }
}

/// Full-text indexing of file content.
pub trait ContentIndexer: Send + Sync {
    fn index(&self, object_id: ObjectId, content: &[u8]) -> Result<(), ServiceError>;
}

/// Preview image variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewKind {
    Thumbnail,
    Full,
}

/// Preview/thumbnail rendering.
pub trait PreviewService: Send + Sync {
    /// Produce previews for the object's current content; returns the page count.
    fn generate(&self, object: &FileObject, content: &[u8]) -> Result<u32, ServiceError>;

    fn render(&self, node: &TreeNode, kind: PreviewKind, page: u32) -> Result<Vec<u8>, ServiceError>;
}

/// Outbound notification delivery. Fire and forget.
pub trait Notifier: Send + Sync {
    fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<(), ServiceError>;
}

/// Indexer that accepts everything and keeps nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIndexer;

impl ContentIndexer for NoopIndexer {
    fn index(&self, _object_id: ObjectId, _content: &[u8]) -> Result<(), ServiceError> {
        Ok(())
    }
}

/// Preview service for deployments without a renderer.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPreviews;

impl PreviewService for NoPreviews {
    fn generate(&self, _object: &FileObject, _content: &[u8]) -> Result<u32, ServiceError> {
        Ok(0)
    }

    fn render(&self, node: &TreeNode, _kind: PreviewKind, _page: u32) -> Result<Vec<u8>, ServiceError> {
        Err(ServiceError::new("previews", format!("no renderer for {}", node.id)))
    }
}

/// Notifier that writes to the log instead of delivering.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<(), ServiceError> {
        info!(recipients = ?recipients, subject, body, "Notification");
        Ok(())
    }
}
