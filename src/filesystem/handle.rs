//! Streaming file handles
//!
//! A [`FileWriter`] buffers and digests bytes as they arrive; nothing reaches
//! the stores until [`FileWriter::close`]. Dropping an unclosed writer
//! discards its content.

use super::Filesystem;
use crate::cache::NodeSnapshot;
use crate::error::FsError;
use crate::tree::hasher::StreamingDigest;
use crate::tree::path::VirtualPath;
use crate::tree::WriteMode;
use crate::types::NodeId;
use std::io::{self, Cursor, Read, Write};
use tracing::debug;

pub struct FileWriter<'fs> {
    fs: &'fs Filesystem,
    path: VirtualPath,
    mode: WriteMode,
    digest: Option<Box<dyn StreamingDigest>>,
    buffer: Vec<u8>,
    content_type: Option<String>,
    closed: bool,
}

impl<'fs> FileWriter<'fs> {
    pub(crate) fn new(
        fs: &'fs Filesystem,
        path: VirtualPath,
        mode: WriteMode,
        digest: Box<dyn StreamingDigest>,
    ) -> Self {
        Self {
            fs,
            path,
            mode,
            digest: Some(digest),
            buffer: Vec::new(),
            content_type: None,
            closed: false,
        }
    }

    pub fn path(&self) -> &VirtualPath {
        &self.path
    }

    /// Content type stored on the file object at close.
    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }

    pub fn bytes_written(&self) -> usize {
        self.buffer.len()
    }

    /// Commit the buffered content as the file's next revision.
    pub fn close(mut self) -> Result<NodeSnapshot, FsError> {
        self.closed = true;
        let digest = match self.digest.take() {
            Some(d) => d.finalize(),
            None => self.fs.services().hasher.digest(&self.buffer),
        };
        let buffer = std::mem::take(&mut self.buffer);
        let content_type = self.content_type.take();
        self.fs
            .commit_write(&self.path, self.mode, digest, &buffer, content_type.as_deref())
    }
}

impl Write for FileWriter<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if let Some(digest) = self.digest.as_mut() {
            digest.update(data);
        }
        self.buffer.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for FileWriter<'_> {
    fn drop(&mut self) {
        if !self.closed {
            debug!(path = %self.path, bytes = self.buffer.len(), "Discarding unclosed write handle");
        }
    }
}

/// Read handle over one revision of a file.
#[derive(Debug)]
pub struct FileReader {
    path: String,
    node_id: NodeId,
    revision: u64,
    content: Cursor<Vec<u8>>,
}

impl FileReader {
    pub(crate) fn new(path: String, node_id: NodeId, revision: u64, content: Vec<u8>) -> Self {
        Self {
            path,
            node_id,
            revision,
            content: Cursor::new(content),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn size(&self) -> u64 {
        self.content.get_ref().len() as u64
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.content.into_inner()
    }
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.content.read(buf)
    }
}
