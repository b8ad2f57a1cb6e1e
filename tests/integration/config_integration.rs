//! Layered configuration: workspace files, environment overrides, open()

use std::fs;
use std::sync::Mutex;
use tempfile::TempDir;
use treefs::config::{BackendKind, ConfigLoader};
use treefs::Filesystem;

/// Serializes tests that touch process environment variables.
static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn write_workspace_config(root: &std::path::Path, name: &str, body: &str) {
    let dir = root.join("config");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(name), body).unwrap();
}

#[test]
fn test_workspace_files_and_environment_layer() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    write_workspace_config(
        temp_dir.path(),
        "config.toml",
        r#"
[storage]
backend = "memory"

[revisions]
keep_num = 5
"#,
    );
    write_workspace_config(
        temp_dir.path(),
        "staging.toml",
        r#"
[revisions]
keep_num = 2
"#,
    );

    std::env::set_var("TREEFS_ENV", "staging");
    std::env::set_var("TREEFS__TRANSACTION__MAX_CONFLICT_RETRIES", "3");
    std::env::set_var("TREEFS__QUOTA__NOTIFICATION_RECIPIENTS", "ops,billing");
    let loaded = ConfigLoader::load(temp_dir.path());
    std::env::remove_var("TREEFS_ENV");
    std::env::remove_var("TREEFS__TRANSACTION__MAX_CONFLICT_RETRIES");
    std::env::remove_var("TREEFS__QUOTA__NOTIFICATION_RECIPIENTS");

    let config = loaded.unwrap();
    assert_eq!(config.storage.backend, BackendKind::Memory);
    assert_eq!(config.revisions.keep_num, Some(2));
    assert_eq!(config.transaction.max_conflict_retries, 3);
    assert_eq!(config.quota.notification_recipients, vec!["ops", "billing"]);

    let fs = Filesystem::open(config).unwrap();
    fs.initialize_application("app").unwrap();
    assert!(fs.is_dir("/app/folders/shared").unwrap());
}

#[test]
fn test_invalid_configuration_is_rejected_on_open() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bad.toml");
    fs::write(
        &path,
        r#"
[storage]
backend = "memory"

[transaction]
max_conflict_retries = 0
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&path).unwrap();
    let err = Filesystem::open(config).err().unwrap();
    assert!(matches!(err, treefs::FsError::Config(_)));
}
