//! Revision history and retention through the facade

use crate::integration::test_utils::{filesystem, filesystem_with};
use chrono::{Duration, Utc};
use treefs::config::FsConfig;
use treefs::revision::RetentionPolicy;
use treefs::{FsError, Services};

fn retaining(keep_num: Option<usize>, keep_months: Option<u32>) -> FsConfig {
    let mut config = FsConfig::in_memory();
    config.revisions = RetentionPolicy { keep_num, keep_months };
    config
}

#[test]
fn test_two_writes_accumulate_history() {
    let fs = filesystem();
    fs.write_file("/app/folders/shared/a.bin", b"phpunit").unwrap();
    let snapshot = fs.write_file("/app/folders/shared/a.bin", b"abcde").unwrap();

    assert_eq!(snapshot.size, 5);
    assert_eq!(snapshot.revision, 2);
    assert_eq!(snapshot.available_revisions(), &[1, 2]);
    assert_eq!(snapshot.object.as_ref().unwrap().revision_size, 12);

    let rows = fs.revisions("/app/folders/shared/a.bin").unwrap();
    assert_eq!(rows.iter().map(|r| r.size).collect::<Vec<_>>(), vec![7, 5]);
}

#[test]
fn test_retention_purges_expired_revision() {
    let fs = filesystem_with(Services::in_memory(), retaining(Some(1), Some(1)));
    fs.write_file("/app/folders/shared/a.bin", b"phpunit").unwrap();
    fs.write_file("/app/folders/shared/a.bin", b"abcde").unwrap();

    assert_eq!(fs.clear_file_revisions().unwrap(), 0);
    assert_eq!(fs.clear_file_revisions_at(Utc::now() + Duration::days(400)).unwrap(), 1);

    let snapshot = fs.stat("/app/folders/shared/a.bin").unwrap();
    assert_eq!(snapshot.available_revisions(), &[2]);
    assert_eq!(snapshot.object.as_ref().unwrap().revision_size, 5);
    assert_eq!(snapshot.size, 5);
    assert_eq!(snapshot.revision, 2);
    assert!(matches!(
        fs.open_read("/app/folders/shared/a.bin", Some(1)).unwrap_err(),
        FsError::NotFound(_)
    ));
    assert_eq!(fs.read_file("/app/folders/shared/a.bin").unwrap(), b"abcde");
}

#[test]
fn test_retention_disabled_by_default() {
    let fs = filesystem();
    fs.write_file("/app/folders/shared/a.bin", b"one").unwrap();
    fs.write_file("/app/folders/shared/a.bin", b"two").unwrap();
    assert_eq!(fs.clear_file_revisions_at(Utc::now() + Duration::days(10_000)).unwrap(), 0);
    assert_eq!(fs.stat("/app/folders/shared/a.bin").unwrap().available_revisions(), &[1, 2]);
}

#[test]
fn test_delete_object_revisions_keeps_current() {
    let fs = filesystem();
    fs.write_file("/app/folders/shared/a.bin", b"one").unwrap();
    fs.write_file("/app/folders/shared/a.bin", b"two!").unwrap();
    let object_id = fs.stat("/app/folders/shared/a.bin").unwrap().object_id.unwrap();

    let removed = fs.delete_object_revisions(object_id, &[1, 2]).unwrap();
    assert_eq!(removed, vec![1]);
    assert_eq!(fs.recalculate_revision_size(object_id).unwrap(), 4);
    assert_eq!(fs.sweep_blobs().unwrap(), 1);
}

#[test]
fn test_delete_revisions_by_content_hash() {
    let fs = filesystem();
    fs.write_file("/app/folders/shared/a.bin", b"old").unwrap();
    let current = fs.write_file("/app/folders/shared/a.bin", b"new").unwrap();
    fs.write_file("/app/folders/shared/b.bin", b"other").unwrap();

    assert_eq!(fs.delete_revisions(&current.hash, &[1]).unwrap(), 1);
    assert_eq!(fs.stat("/app/folders/shared/a.bin").unwrap().available_revisions(), &[2]);
    assert_eq!(fs.stat("/app/folders/shared/b.bin").unwrap().available_revisions(), &[1]);
}
