//! Directory structure: mkdir, rmdir, unlink, rename, copy, purge

use crate::integration::test_utils::filesystem;
use treefs::store::Transaction;
use treefs::tree::nodes;
use treefs::FsError;

#[test]
fn test_directory_hash_tracks_file_content() {
    let fs = filesystem();
    let dir = fs.mkdir("/app/folders/shared/D").unwrap();
    assert_eq!(dir.revision, 1);
    let h0 = dir.hash;
    assert_ne!(h0, [0u8; 32]);

    let file = fs.write_file("/app/folders/shared/D/f.txt", b"hello").unwrap();
    assert_eq!(file.revision, 1);
    assert_eq!(file.size, 5);
    let h1 = fs.stat("/app/folders/shared/D").unwrap().hash;
    assert_ne!(h1, h0);

    let file = fs.write_file("/app/folders/shared/D/f.txt", b"hello world").unwrap();
    assert_eq!(file.revision, 2);
    assert_eq!(file.available_revisions(), &[1, 2]);
    assert_eq!(file.object.as_ref().unwrap().revision_size, 16);
    let h2 = fs.stat("/app/folders/shared/D").unwrap().hash;
    assert_ne!(h2, h1);
    assert_eq!(fs.stat("/app/folders/shared/D").unwrap().size, 11);
    assert_eq!(fs.stat("/app/folders").unwrap().size, 11);
}

#[test]
fn test_mkdir_twice_fails_and_leaves_node_unchanged() {
    let fs = filesystem();
    let first = fs.mkdir("/app/folders/shared/D").unwrap();
    let err = fs.mkdir("/app/folders/shared/D").unwrap_err();
    assert!(matches!(err, FsError::AlreadyExists(_)));

    fs.clear_stat_cache();
    let again = fs.stat("/app/folders/shared/D").unwrap();
    assert_eq!(again.id, first.id);
    assert_eq!(again.hash, first.hash);
    assert_eq!(again.modified_at, first.modified_at);
}

#[test]
fn test_paths_outside_app_folders_are_rejected() {
    let fs = filesystem();
    let err = fs.mkdir("/app/documents/x").unwrap_err();
    assert!(matches!(err, FsError::InvalidArgument(_)));
    assert_eq!(err.to_string(), "path needs to start with /appId/folders/...");
    assert!(fs.file_exists("/nope").is_err());
}

#[test]
fn test_ensure_dir_creates_missing_parents() {
    let fs = filesystem();
    let leaf = fs.ensure_dir("/app/folders/shared/a/b/c").unwrap();
    assert!(fs.is_dir("/app/folders/shared/a/b").unwrap());
    assert_eq!(fs.ensure_dir("/app/folders/shared/a/b/c").unwrap().id, leaf.id);
}

#[test]
fn test_scan_dir_lists_live_children_by_name() {
    let fs = filesystem();
    fs.mkdir("/app/folders/shared/D").unwrap();
    fs.write_file("/app/folders/shared/D/b.txt", b"b").unwrap();
    fs.write_file("/app/folders/shared/D/a.txt", b"a").unwrap();
    fs.mkdir("/app/folders/shared/D/c").unwrap();
    fs.unlink("/app/folders/shared/D/b.txt").unwrap();

    let names: Vec<String> = fs
        .scan_dir("/app/folders/shared/D")
        .unwrap()
        .into_iter()
        .map(|s| s.name.clone())
        .collect();
    assert_eq!(names, vec!["a.txt", "c"]);
    assert!(fs.scan_dir("/app/folders/shared/D/a.txt").is_err());
}

#[test]
fn test_unlink_restores_previous_directory_hash() {
    let fs = filesystem();
    let before = fs.mkdir("/app/folders/shared/D").unwrap().hash;
    fs.write_file("/app/folders/shared/D/f.txt", b"hello").unwrap();
    fs.unlink("/app/folders/shared/D/f.txt").unwrap();

    let after = fs.stat("/app/folders/shared/D").unwrap();
    assert_eq!(after.hash, before);
    assert_eq!(after.size, 0);
    assert!(!fs.file_exists("/app/folders/shared/D/f.txt").unwrap());
}

#[test]
fn test_unlink_clamps_corrupted_directory_size() {
    let fs = filesystem();
    let dir = fs.mkdir("/app/folders/shared/D").unwrap();
    fs.write_file("/app/folders/shared/D/f.txt", b"0123456789").unwrap();

    let mut txn = Transaction::new(fs.backend());
    let mut node = nodes::load(&mut txn, dir.id).unwrap();
    node.size = 3;
    nodes::put(&mut txn, &node).unwrap();
    txn.commit().unwrap();
    fs.clear_stat_cache();

    fs.unlink("/app/folders/shared/D/f.txt").unwrap();
    assert_eq!(fs.stat("/app/folders/shared/D").unwrap().size, 0);

    let report = fs.recalculate_folder_sizes().unwrap();
    assert!(report.directories > 0);
}

#[test]
fn test_rmdir_requires_recursive_for_non_empty() {
    let fs = filesystem();
    fs.mkdir("/app/folders/shared/D").unwrap();
    fs.write_file("/app/folders/shared/D/f.txt", b"abc").unwrap();

    assert!(matches!(
        fs.rmdir("/app/folders/shared/D", false).unwrap_err(),
        FsError::NotEmpty(_)
    ));
    fs.rmdir("/app/folders/shared/D", true).unwrap();
    assert!(!fs.file_exists("/app/folders/shared/D").unwrap());
    assert!(!fs.file_exists("/app/folders/shared/D/f.txt").unwrap());
    assert_eq!(fs.stat("/app/folders/shared").unwrap().size, 0);
}

#[test]
fn test_rename_moves_file_and_sizes() {
    let fs = filesystem();
    fs.mkdir("/app/folders/shared/A").unwrap();
    fs.mkdir("/app/folders/shared/B").unwrap();
    fs.write_file("/app/folders/shared/A/f.txt", b"12345").unwrap();

    let moved = fs.rename("/app/folders/shared/A/f.txt", "/app/folders/shared/B/g.txt").unwrap();
    assert_eq!(moved.path, "/app/folders/shared/B/g.txt");
    assert_eq!(fs.read_file("/app/folders/shared/B/g.txt").unwrap(), b"12345");
    assert_eq!(fs.file_size("/app/folders/shared/A").unwrap(), 0);
    assert_eq!(fs.file_size("/app/folders/shared/B").unwrap(), 5);
}

#[test]
fn test_rename_into_existing_directory_keeps_name() {
    let fs = filesystem();
    fs.mkdir("/app/folders/shared/B").unwrap();
    fs.write_file("/app/folders/shared/f.txt", b"x").unwrap();

    fs.rename("/app/folders/shared/f.txt", "/app/folders/shared/B").unwrap();
    assert!(fs.is_file("/app/folders/shared/B/f.txt").unwrap());
}

#[test]
fn test_rename_onto_existing_file_fails() {
    let fs = filesystem();
    fs.write_file("/app/folders/shared/a.txt", b"a").unwrap();
    fs.write_file("/app/folders/shared/b.txt", b"b").unwrap();
    assert!(matches!(
        fs.rename("/app/folders/shared/a.txt", "/app/folders/shared/b.txt").unwrap_err(),
        FsError::AlreadyExists(_)
    ));
}

#[test]
fn test_copy_produces_distinct_objects() {
    let fs = filesystem();
    let src = fs.write_file("/app/folders/shared/a.txt", b"abc").unwrap();
    let copy = fs.copy("/app/folders/shared/a.txt", "/app/folders/shared/b.txt").unwrap();

    assert_ne!(copy.id, src.id);
    assert_ne!(copy.object_id, src.object_id);
    assert_eq!(copy.revision, 1);
    assert_eq!(copy.hash, src.hash);
    assert_eq!(fs.read_file("/app/folders/shared/b.txt").unwrap(), b"abc");
    assert_eq!(fs.file_size("/app/folders/shared").unwrap(), 6);

    fs.write_file("/app/folders/shared/b.txt", b"changed").unwrap();
    assert_eq!(fs.read_file("/app/folders/shared/a.txt").unwrap(), b"abc");
}

#[test]
fn test_copy_onto_itself_is_unexpected_value() {
    let fs = filesystem();
    fs.write_file("/app/folders/shared/a.txt", b"abc").unwrap();
    assert!(matches!(
        fs.copy("/app/folders/shared/a.txt", "/app/folders/shared/a.txt").unwrap_err(),
        FsError::UnexpectedValue(_)
    ));
}

#[test]
fn test_clear_deleted_files_purges_subtrees_and_blobs() {
    let fs = filesystem();
    fs.mkdir("/app/folders/shared/D").unwrap();
    let file = fs.write_file("/app/folders/shared/D/f.txt", b"only here").unwrap();
    fs.write_file("/app/folders/shared/keep.txt", b"kept").unwrap();
    fs.rmdir("/app/folders/shared/D", true).unwrap();

    let report = fs.clear_deleted_files().unwrap();
    assert_eq!(report.nodes, 2);
    assert_eq!(report.objects, 1);
    assert_eq!(report.blobs, 1);

    let purged = fs.get_node(file.id).unwrap();
    assert!(matches!(purged.lifecycle, treefs::tree::Lifecycle::Purged { .. }));
    assert_eq!(fs.read_file("/app/folders/shared/keep.txt").unwrap(), b"kept");
    assert_eq!(fs.clear_deleted_files().unwrap().nodes, 0);
}

#[test]
fn test_path_of_node_round_trips() {
    let fs = filesystem();
    let err = fs.write_file("/app/folders/personal/alice/notes.md", b"").unwrap_err();
    assert!(matches!(err, FsError::InvalidArgument(_) | FsError::NotFound(_)));

    fs.mkdir("/app/folders/personal/alice").unwrap();
    let file = fs.write_file("/app/folders/personal/alice/notes.md", b"").unwrap();
    assert_eq!(fs.path_of_node(file.id).unwrap(), "/app/folders/personal/alice/notes.md");
}

#[test]
fn test_write_after_purge_starts_a_new_file() {
    let fs = filesystem();
    let first = fs.write_file("/app/folders/shared/f.txt", b"old").unwrap();
    fs.unlink("/app/folders/shared/f.txt").unwrap();
    fs.clear_deleted_files().unwrap();

    let fresh = fs.write_file("/app/folders/shared/f.txt", b"new").unwrap();
    assert_ne!(fresh.id, first.id);
    assert_ne!(fresh.object_id, first.object_id);
    assert_eq!(fresh.revision, 1);
}
