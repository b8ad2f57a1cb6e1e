//! Optimistic transactions: retry on conflict, give up after the budget

use crate::integration::test_utils::{
    filesystem_with, flaky_services, gated_backend_services, gated_blob_services,
};
use std::sync::atomic::Ordering;
use std::time::Duration;
use treefs::config::FsConfig;
use treefs::store::keys;
use treefs::{FsError, Services};

#[test]
fn test_conflicting_commit_is_retried() {
    let (services, backend) = flaky_services();
    let fs = filesystem_with(services, FsConfig::in_memory());
    let commits_before = backend.commits.load(Ordering::SeqCst);

    backend.fail_next(3);
    let file = fs.write_file("/app/folders/shared/a.txt", b"eventually").unwrap();
    assert_eq!(file.revision, 1);
    assert_eq!(backend.commits.load(Ordering::SeqCst), commits_before + 1);
    assert_eq!(fs.read_file("/app/folders/shared/a.txt").unwrap(), b"eventually");
}

#[test]
fn test_conflict_surfaces_after_retry_budget() {
    let (services, backend) = flaky_services();
    let mut config = FsConfig::in_memory();
    config.transaction.max_conflict_retries = 2;
    let fs = filesystem_with(services, config);

    backend.fail_next(10);
    let err = fs.mkdir("/app/folders/shared/D").unwrap_err();
    assert!(matches!(err, FsError::Conflict(_)));
    assert!(err.is_retryable());

    backend.fail_next(0);
    assert!(!fs.file_exists("/app/folders/shared/D").unwrap());
    fs.mkdir("/app/folders/shared/D").unwrap();
}

#[test]
fn test_parallel_writers_keep_aggregates_consistent() {
    let mut config = FsConfig::in_memory();
    config.transaction.max_conflict_retries = 256;
    let fs = filesystem_with(Services::in_memory(), config);
    fs.mkdir("/app/folders/shared/D").unwrap();

    std::thread::scope(|scope| {
        for worker in 0..4 {
            let fs = &fs;
            scope.spawn(move || {
                for i in 0..10 {
                    let path = format!("/app/folders/shared/D/w{}-{}.txt", worker, i);
                    fs.write_file(&path, b"0123456789").unwrap();
                    fs.stat("/app/folders/shared/D").unwrap();
                    fs.stat("/app/folders/shared").unwrap();
                }
            });
        }
    });

    // served from the cache the workers filled
    assert_eq!(fs.stat("/app/folders/shared/D").unwrap().size, 400);
    assert_eq!(fs.stat("/app/folders/shared").unwrap().size, 400);

    fs.clear_stat_cache();
    assert_eq!(fs.scan_dir("/app/folders/shared/D").unwrap().len(), 40);
    assert_eq!(fs.file_size("/app/folders/shared/D").unwrap(), 400);
    assert_eq!(fs.recalculate_folder_sizes().unwrap().corrected, 0);
}

#[test]
fn test_stat_overtaken_by_write_is_not_cached() {
    let (services, backend) = gated_backend_services(keys::OBJECT_PREFIX);
    let fs = filesystem_with(services, FsConfig::in_memory());
    let path = "/app/folders/shared/f.txt";
    fs.write_file(path, b"hello").unwrap();
    fs.clear_stat_cache();

    backend.gate.arm();
    std::thread::scope(|scope| {
        let reader = scope.spawn(|| fs.stat(path).unwrap());
        backend.gate.wait_parked();
        fs.write_file(path, b"hello world").unwrap();
        backend.gate.open();
        reader.join().unwrap();
    });

    let snapshot = fs.stat(path).unwrap();
    assert_eq!(snapshot.size, 11);
    assert_eq!(snapshot.revision, 2);
    assert_eq!(fs.stat("/app/folders/shared").unwrap().size, 11);
}

#[test]
fn test_blob_sweep_waits_for_inflight_write() {
    let (services, blobs) = gated_blob_services();
    let fs = filesystem_with(services, FsConfig::in_memory());
    let first = fs.write_file("/app/folders/shared/a.txt", b"shared bytes").unwrap();
    fs.write_file("/app/folders/shared/a.txt", b"newer").unwrap();
    // the first blob is now stored but referenced by no revision
    fs.delete_object_revisions(first.object_id.unwrap(), &[1]).unwrap();

    blobs.gate.arm();
    std::thread::scope(|scope| {
        let writer = scope.spawn(|| fs.write_file("/app/folders/shared/b.txt", b"shared bytes").unwrap());
        blobs.gate.wait_parked();
        let sweeper = scope.spawn(|| fs.sweep_blobs().unwrap());
        std::thread::sleep(Duration::from_millis(50));
        blobs.gate.open();
        writer.join().unwrap();
        sweeper.join().unwrap();
    });

    assert_eq!(fs.read_file("/app/folders/shared/b.txt").unwrap(), b"shared bytes");
    assert_eq!(fs.read_file("/app/folders/shared/a.txt").unwrap(), b"newer");
}
