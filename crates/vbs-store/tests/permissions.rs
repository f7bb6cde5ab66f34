//! Permission Integration Tests
//!
//! Owner/group/other authorization through the full store, and the
//! end-to-end ownership scenario.

mod common;

use common::{fresh, ALLOCATORS};
use vbs_store::{AllocatorKind, FileMode, Requirement, StoreError, StoreService};

fn mode(bits: u16) -> FileMode {
    FileMode::new(bits).unwrap()
}

fn denied<T>(result: vbs_store::Result<T>) -> bool {
    matches!(result, Err(StoreError::PermissionDenied(_)))
}

/// Test the owner/group/other matrix on a 0640 file.
#[test]
fn test_permission_matrix() {
    let mut store = fresh(AllocatorKind::Bitmap);
    store.create_user("owner", None).unwrap();
    store.create_user("member", Some("owner")).unwrap();
    store.create_user("stranger", None).unwrap();

    store.login("owner").unwrap();
    store.open("m.txt", true).unwrap();
    store.write(0, b"matrix").unwrap();
    store.chmod("m.txt", mode(0o640)).unwrap();

    // Owner: read and write.
    store.open("m.txt", false).unwrap();
    assert_eq!(store.read(0, 6).unwrap(), b"matrix");
    assert_eq!(store.write(0, b"M").unwrap(), 1);

    // Same group: read only.
    store.login("member").unwrap();
    store.open("m.txt", false).unwrap();
    assert_eq!(store.read(0, 6).unwrap(), b"Matrix");
    assert!(denied(store.write(0, b"x")));
    assert!(denied(store.truncate(0)));

    // Neither owner nor group: nothing.
    store.login("stranger").unwrap();
    assert!(denied(store.open("m.txt", false)));

    // Root ignores the mode entirely.
    store.login("root").unwrap();
    store.chmod("m.txt", mode(0o000)).unwrap();
    store.open("m.txt", false).unwrap();
    assert_eq!(store.write(0, b"R").unwrap(), 1);
    assert_eq!(store.read(0, 6).unwrap(), b"Ratrix");
}

/// Test that a secondary membership grants the group triplet.
#[test]
fn test_secondary_group_grants_access() {
    let mut store = fresh(AllocatorKind::FreeList);
    store.create_user("alice", None).unwrap();
    store.create_user("bob", None).unwrap();

    store.login("alice").unwrap();
    store.open("shared", true).unwrap();
    store.chmod("shared", mode(0o660)).unwrap();

    store.login("bob").unwrap();
    assert!(denied(store.open("shared", false)));

    store.login("root").unwrap();
    store.add_user_to_group("bob", "alice").unwrap();

    store.login("bob").unwrap();
    store.open("shared", false).unwrap();
    assert_eq!(store.write(0, b"hi").unwrap(), 2);
}

/// Test that the open file's permissions are re-checked on every call.
#[test]
fn test_chmod_applies_to_open_file() {
    let mut store = fresh(AllocatorKind::Bitmap);
    store.create_user("alice", None).unwrap();
    store.login("alice").unwrap();
    store.open("a", true).unwrap();
    store.write(0, b"abc").unwrap();

    store.chmod("a", mode(0o400)).unwrap();
    assert!(denied(store.write(0, b"z")));
    assert_eq!(store.read(0, 3).unwrap(), b"abc");
}

/// Test owner-or-root requirements of remove, chmod and chgrp.
#[test]
fn test_owner_only_operations() {
    let mut store = fresh(AllocatorKind::Bitmap);
    store.create_user("alice", None).unwrap();
    store.create_user("bob", None).unwrap();
    store.create_group("staff").unwrap();

    store.login("alice").unwrap();
    store.open("mine", true).unwrap();

    store.login("bob").unwrap();
    match store.remove("mine") {
        Err(StoreError::PermissionDenied(denial)) => {
            assert_eq!(denial.required, Requirement::Owner);
            assert_eq!(denial.target.map(|t| t.mode), Some(FileMode::DEFAULT_FILE));
        }
        other => panic!("Expected PermissionDenied, got {other:?}"),
    }
    assert!(denied(store.chmod("mine", mode(0o777))));
    assert!(denied(store.chgrp("mine", "staff")));

    store.login("alice").unwrap();
    store.chgrp("mine", "staff").unwrap();
    assert_eq!(
        store.get_permissions("mine").unwrap().group.as_deref(),
        Some("staff")
    );
    store.remove("mine").unwrap();
}

/// Test that chown and identity management are root-only.
#[test]
fn test_root_only_operations() {
    let mut store = fresh(AllocatorKind::Bitmap);
    store.create_user("alice", None).unwrap();
    store.login("alice").unwrap();
    store.open("f", true).unwrap();

    assert!(denied(store.chown("f", "alice", "alice")));
    assert!(denied(store.create_user("mallory", None)));
    assert!(denied(store.create_group("wheel")));
    assert!(denied(store.delete_user("root")));
    assert!(denied(store.add_user_to_group("alice", "root")));
}

/// Test that get_permissions needs no rights on the file.
#[test]
fn test_get_permissions_unprivileged() {
    let mut store = fresh(AllocatorKind::Bitmap);
    store.create_user("alice", None).unwrap();
    store.open("secret", true).unwrap();
    store.chmod("secret", mode(0o600)).unwrap();

    store.login("alice").unwrap();
    let info = store.get_permissions("secret").unwrap();
    assert_eq!(info.mode.to_string(), "rw-------");
    assert_eq!(info.owner.as_deref(), Some("root"));
    assert_eq!(info.group.as_deref(), Some("root"));
}

/// Test the create, write, chown, deny scenario from a fresh store.
#[test]
fn test_end_to_end_ownership_scenario() {
    for kind in ALLOCATORS {
        let mut store = fresh(kind);
        store.create_user("alice", None).unwrap();
        store.login("alice").unwrap();
        store.open("a.txt", true).unwrap();
        assert_eq!(store.write(0, b"hello").unwrap(), 5);
        store.close();

        store.login("root").unwrap();
        store.chown("a.txt", "root", "root").unwrap();

        // Default 0644 still lets alice read, but not write.
        store.login("alice").unwrap();
        store.open("a.txt", false).unwrap();
        assert_eq!(store.read(0, 5).unwrap(), b"hello");
        assert!(denied(store.write(0, b"j")));

        store.login("root").unwrap();
        store.chmod("a.txt", mode(0o600)).unwrap();

        store.login("alice").unwrap();
        match store.open("a.txt", false) {
            Err(StoreError::PermissionDenied(denial)) => {
                assert_eq!(denial.required, Requirement::Read);
                let target = denial.target.unwrap();
                assert_eq!((target.uid, target.gid), (0, 0));
            }
            other => panic!("Expected PermissionDenied, got {other:?}"),
        }
        assert!(store.session().open_file().is_none());
    }
}
