//! ACL root creation, removal and inheritance across moves

use crate::integration::test_utils::{filesystem, filesystem_with};
use treefs::config::FsConfig;
use treefs::Services;

#[test]
fn test_acl_root_covers_descendants_until_removed() {
    let fs = filesystem();
    fs.ensure_dir("/app/folders/shared/X/sub/deeper").unwrap();
    fs.write_file("/app/folders/shared/X/sub/f.txt", b"f").unwrap();
    let x = fs.stat("/app/folders/shared/X").unwrap();

    let changed = fs.create_acl_node("/app/folders/shared/X").unwrap();
    assert_eq!(changed, 4);
    for path in [
        "/app/folders/shared/X",
        "/app/folders/shared/X/sub",
        "/app/folders/shared/X/sub/deeper",
        "/app/folders/shared/X/sub/f.txt",
    ] {
        assert_eq!(fs.stat(path).unwrap().acl_node, Some(x.id), "{}", path);
    }

    fs.remove_acl_from_node("/app/folders/shared/X").unwrap();
    for path in ["/app/folders/shared/X", "/app/folders/shared/X/sub/f.txt"] {
        assert_eq!(fs.stat(path).unwrap().acl_node, None, "{}", path);
    }
}

#[test]
fn test_nested_root_keeps_its_scope() {
    let fs = filesystem();
    fs.ensure_dir("/app/folders/shared/X/Y/Z").unwrap();
    let x = fs.stat("/app/folders/shared/X").unwrap();
    let y = fs.stat("/app/folders/shared/X/Y").unwrap();

    fs.create_acl_node("/app/folders/shared/X/Y").unwrap();
    fs.create_acl_node("/app/folders/shared/X").unwrap();
    assert_eq!(fs.stat("/app/folders/shared/X/Y/Z").unwrap().acl_node, Some(y.id));

    fs.remove_acl_from_node("/app/folders/shared/X/Y").unwrap();
    assert_eq!(fs.stat("/app/folders/shared/X/Y").unwrap().acl_node, Some(x.id));
    assert_eq!(fs.stat("/app/folders/shared/X/Y/Z").unwrap().acl_node, Some(x.id));
}

#[test]
fn test_new_nodes_inherit_and_moves_rebase() {
    let fs = filesystem();
    fs.mkdir("/app/folders/shared/X").unwrap();
    fs.mkdir("/app/folders/shared/Open").unwrap();
    let x = fs.stat("/app/folders/shared/X").unwrap();
    fs.create_acl_node("/app/folders/shared/X").unwrap();

    let file = fs.write_file("/app/folders/shared/X/f.txt", b"f").unwrap();
    assert_eq!(file.acl_node, Some(x.id));

    let moved = fs.rename("/app/folders/shared/X/f.txt", "/app/folders/shared/Open/f.txt").unwrap();
    assert_eq!(moved.acl_node, None);
}

#[test]
fn test_get_all_child_ids_is_transitive() {
    let fs = filesystem();
    fs.ensure_dir("/app/folders/shared/A/B").unwrap();
    fs.write_file("/app/folders/shared/A/B/f.txt", b"f").unwrap();
    fs.write_file("/app/folders/shared/A/g.txt", b"g").unwrap();
    let a = fs.stat("/app/folders/shared/A").unwrap();

    let ids = fs.get_all_child_ids(&[a.id]).unwrap();
    assert_eq!(ids.len(), 3);
    assert!(!ids.contains(&a.id));
    assert!(ids.contains(&fs.stat("/app/folders/shared/A/B/f.txt").unwrap().id));
}

#[test]
fn test_container_directories_become_roots() {
    let mut config = FsConfig::in_memory();
    config.filesystem.container_acl_roots = true;
    let fs = filesystem_with(Services::in_memory(), config);

    let team = fs.mkdir("/app/folders/shared/team").unwrap();
    assert!(team.is_acl_root());
    let nested = fs.mkdir("/app/folders/shared/team/docs").unwrap();
    assert_eq!(nested.acl_node, Some(team.id));

    let moved = fs.rename("/app/folders/shared/team/docs", "/app/folders/shared/docs").unwrap();
    assert!(moved.is_acl_root());
}
