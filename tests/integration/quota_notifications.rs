//! Quota scanning and directory notifications

use crate::integration::test_utils::{filesystem_with, RecordingNotifier};
use std::sync::Arc;
use treefs::config::FsConfig;
use treefs::filesystem::{NOTIFICATION_SUBJECT, QUOTA_NOTIFICATION_SUBJECT};
use treefs::tree::NotificationSetting;
use treefs::{NodeProperty, Services};

fn with_notifier(config: FsConfig) -> (treefs::Filesystem, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let fs = filesystem_with(Services::in_memory().with_notifier(notifier.clone()), config);
    (fs, notifier)
}

#[test]
fn test_quota_violation_notifies_owner_and_admins() {
    let mut config = FsConfig::in_memory();
    config.quota.notification_recipients = vec!["admin".into()];
    let (fs, notifier) = with_notifier(config);

    fs.ensure_dir("/app/folders/personal/alice/docs").unwrap();
    fs.set_quota("/app/folders/personal/alice", Some(4)).unwrap();
    fs.write_file("/app/folders/personal/alice/docs/big.txt", b"0123456789").unwrap();

    assert_eq!(fs.notify_quota().unwrap(), 1);
    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, QUOTA_NOTIFICATION_SUBJECT);
    assert_eq!(sent[0].body, "/app/folders/personal/alice exceeded quota");
    assert_eq!(sent[0].recipients, vec!["admin".to_string(), "alice".to_string()]);

    // no de-duplication: every scan reports again
    assert_eq!(fs.notify_quota().unwrap(), 1);
}

#[test]
fn test_quota_within_limit_is_silent() {
    let (fs, notifier) = with_notifier(FsConfig::in_memory());
    fs.mkdir("/app/folders/shared/D").unwrap();
    fs.set_quota("/app/folders/shared/D", Some(100)).unwrap();
    fs.write_file("/app/folders/shared/D/f.txt", b"small").unwrap();

    assert_eq!(fs.notify_quota().unwrap(), 0);
    assert!(notifier.sent().is_empty());
}

#[test]
fn test_deleted_directories_are_not_reported() {
    let mut config = FsConfig::in_memory();
    config.quota.notification_recipients = vec!["admin".into()];
    let (fs, _notifier) = with_notifier(config);
    fs.mkdir("/app/folders/shared/D").unwrap();
    fs.set_quota("/app/folders/shared/D", Some(1)).unwrap();
    fs.write_file("/app/folders/shared/D/f.txt", b"too big").unwrap();
    fs.rmdir("/app/folders/shared/D", true).unwrap();

    assert_eq!(fs.notify_quota().unwrap(), 0);
}

#[test]
fn test_folder_subscribers_hear_about_writes() {
    let mut config = FsConfig::in_memory();
    config.filesystem.enable_notifications = true;
    let (fs, notifier) = with_notifier(config);

    fs.ensure_dir("/app/folders/shared/team/reports").unwrap();
    fs.set_node_property(
        "/app/folders/shared/team",
        NodeProperty::Notification(vec![
            NotificationSetting {
                account_id: "carol".into(),
                active: true,
            },
            NotificationSetting {
                account_id: "dave".into(),
                active: false,
            },
        ]),
    )
    .unwrap();

    fs.write_file("/app/folders/shared/team/reports/q1.pdf", b"%PDF").unwrap();
    fs.write_file("/app/folders/shared/elsewhere.txt", b"quiet").unwrap();

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, NOTIFICATION_SUBJECT);
    assert_eq!(sent[0].recipients, vec!["carol".to_string()]);
    assert!(sent[0].body.contains("/app/folders/shared/team/reports/q1.pdf"));
}
