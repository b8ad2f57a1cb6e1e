//! Hash computation for content and directories
//!
//! The digest algorithm is pluggable through [`ContentHasher`]; BLAKE3 is the
//! default. Whatever the algorithm, it must be stable across restarts since
//! its output addresses blobs and fingerprints directories.

use crate::types::Hash;
use blake3::Hasher;

/// Incremental digest over a byte stream.
pub trait StreamingDigest: Send {
    fn update(&mut self, data: &[u8]);
    fn finalize(self: Box<Self>) -> Hash;
}

/// Pluggable content hash function.
pub trait ContentHasher: Send + Sync {
    /// Short stable identifier, e.g. "blake3".
    fn algorithm(&self) -> &'static str;

    fn begin(&self) -> Box<dyn StreamingDigest>;

    fn digest(&self, data: &[u8]) -> Hash {
        let mut d = self.begin();
        d.update(data);
        d.finalize()
    }
}

/// BLAKE3 content hasher
#[derive(Debug, Default, Clone, Copy)]
pub struct Blake3Hasher;

struct Blake3Digest(Hasher);

impl StreamingDigest for Blake3Digest {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize(self: Box<Self>) -> Hash {
        *self.0.finalize().as_bytes()
    }
}

impl ContentHasher for Blake3Hasher {
    fn algorithm(&self) -> &'static str {
        "blake3"
    }

    fn begin(&self) -> Box<dyn StreamingDigest> {
        Box::new(Blake3Digest(Hasher::new()))
    }
}

/// Compute the fingerprint of a directory from its live children
///
/// hash = digest("directory" || child_count || (name_len || name || child_hash)*)
///
/// Children are stable-sorted by name here, so callers may pass them in any
/// order. Only live children belong in the slice.
pub fn compute_directory_hash(hasher: &dyn ContentHasher, children: &[(String, Hash)]) -> Hash {
    let mut sorted: Vec<&(String, Hash)> = children.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut d = hasher.begin();

    // Hash type discriminator
    d.update(b"directory");

    // Hash children count (8 bytes, big-endian)
    d.update(&(sorted.len() as u64).to_be_bytes());

    for (name, child_hash) in sorted {
        // Length prefix keeps ("ab","c") and ("a","bc") apart
        d.update(&(name.len() as u64).to_be_bytes());
        d.update(name.as_bytes());
        d.update(child_hash);
    }

    d.finalize()
}

/// Hash of a directory with no live children.
pub fn empty_directory_hash(hasher: &dyn ContentHasher) -> Hash {
    compute_directory_hash(hasher, &[])
}
