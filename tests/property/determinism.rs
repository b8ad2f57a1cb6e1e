//! Property-based tests for hashing and path determinism

use proptest::prelude::*;
use std::collections::BTreeMap;
use treefs::tree::hasher::{compute_directory_hash, Blake3Hasher, ContentHasher};
use treefs::VirtualPath;

fn children() -> impl Strategy<Value = BTreeMap<String, [u8; 32]>> {
    prop::collection::btree_map("[a-z0-9._-]{1,12}", any::<[u8; 32]>(), 0..12)
}

/// Directory hash does not depend on the order children are supplied in
#[test]
fn test_directory_hash_order_independent() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(children(), any::<u64>()), |(children, seed)| {
            let sorted: Vec<(String, [u8; 32])> = children.into_iter().collect();
            let mut shuffled = sorted.clone();
            if !shuffled.is_empty() {
                let len = shuffled.len();
                shuffled.rotate_left((seed as usize) % len);
                shuffled.reverse();
            }

            let a = compute_directory_hash(&Blake3Hasher, &sorted);
            let b = compute_directory_hash(&Blake3Hasher, &shuffled);
            prop_assert_eq!(a, b);
            Ok(())
        })
        .unwrap();
}

/// Changing any child's hash, or dropping a child, changes the directory hash
#[test]
fn test_directory_hash_tracks_children() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(children(), any::<usize>(), any::<u8>()), |(children, pick, flip)| {
            prop_assume!(!children.is_empty());
            let original: Vec<(String, [u8; 32])> = children.into_iter().collect();
            let index = pick % original.len();

            let mut changed = original.clone();
            changed[index].1[0] ^= flip | 1;
            let mut dropped = original.clone();
            dropped.remove(index);

            let base = compute_directory_hash(&Blake3Hasher, &original);
            prop_assert_ne!(base, compute_directory_hash(&Blake3Hasher, &changed));
            prop_assert_ne!(base, compute_directory_hash(&Blake3Hasher, &dropped));
            Ok(())
        })
        .unwrap();
}

/// Streaming digest matches the one-shot digest for any chunking
#[test]
fn test_streaming_digest_chunking_invariant() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(any::<Vec<u8>>(), 1usize..64), |(content, chunk)| {
            let mut streaming = Blake3Hasher.begin();
            for part in content.chunks(chunk) {
                streaming.update(part);
            }
            prop_assert_eq!(streaming.finalize(), Blake3Hasher.digest(&content));
            Ok(())
        })
        .unwrap();
}

proptest! {
    /// Parsing is stable under printing and trailing slashes
    #[test]
    fn test_path_parse_round_trip(segments in prop::collection::vec("[A-Za-z0-9 _.-]{1,10}", 0..5)) {
        prop_assume!(segments.iter().all(|s| s != "." && s != ".."));
        let raw = format!("/app/folders/{}", segments.join("/"));
        let parsed = VirtualPath::parse(&raw).unwrap();
        let reparsed = VirtualPath::parse(&parsed.to_string()).unwrap();
        prop_assert_eq!(&parsed, &reparsed);

        let trailing = VirtualPath::parse(&format!("{}/", raw)).unwrap();
        prop_assert_eq!(&parsed, &trailing);
        prop_assert_eq!(parsed.depth(), segments.len() + 2);
    }
}
