//! Integrity Walk Tests
//!
//! `verify()` accepts every state reachable through the service and
//! rejects allocator state that no longer accounts for every byte.

mod common;

use common::{config, fresh, ALLOCATORS};
use vbs_store::testing::MemoryBackingStore;
use vbs_store::{bootstrap_store, AllocatorKind, BackingStore, IndexKind, StoreService};

/// Reopen a store from the bytes it has written so far.
fn reopen(bytes: Vec<u8>, kind: AllocatorKind) -> vbs_store::BlockStore<MemoryBackingStore> {
    bootstrap_store(
        MemoryBackingStore::from_bytes(bytes),
        &config(kind, IndexKind::Scan),
    )
    .unwrap()
}

/// Test that a busy store passes the walk after a reload.
#[test]
fn test_populated_store_verifies() {
    for kind in ALLOCATORS {
        let mut store = fresh(kind);
        store.create_group("staff").unwrap();
        store.create_user("alice", Some("staff")).unwrap();
        store.create_user("bob", None).unwrap();
        for name in ["one", "two", "three"] {
            store.open(name, true).unwrap();
            store.write(0, name.as_bytes()).unwrap();
        }
        store.remove("two").unwrap();
        store.delete_user("bob").unwrap();
        store.verify().unwrap();

        let bytes = store.into_device().snapshot();
        reopen(bytes, kind).verify().unwrap();
    }
}

/// Test that a block marked used with no owning record is reported.
#[test]
fn test_orphaned_bitmap_block_detected() {
    let mut store = fresh(AllocatorKind::Bitmap);
    store.open("f", true).unwrap();
    store.verify().unwrap();

    // Bitmap starts at block 1; mark a block far past any allocation.
    let block = 1000u64;
    let at = 512 + block / 8;
    let mut byte = [0u8; 1];
    store.device().read_exact_at(at, &mut byte).unwrap();
    assert_eq!(byte[0] & (1 << (block % 8)), 0);
    byte[0] |= 1 << (block % 8);
    store.device().write_all_at(at, &byte).unwrap();

    let reopened = reopen(store.into_device().snapshot(), AllocatorKind::Bitmap);
    assert!(reopened.verify().unwrap_err().is_corrupt());
}

/// Test that bytes dropped from the free list are reported.
#[test]
fn test_lost_free_list_bytes_detected() {
    let store = fresh(AllocatorKind::FreeList);
    let head = store.root_record().free_head.unwrap();

    // Shrink the head chunk by one header; the tail is now owned by nobody.
    let mut size = [0u8; 8];
    store.device().read_exact_at(head, &mut size).unwrap();
    let shrunk = u64::from_le_bytes(size) - 16;
    store.device().write_all_at(head, &shrunk.to_le_bytes()).unwrap();

    let reopened = reopen(store.into_device().snapshot(), AllocatorKind::FreeList);
    assert!(reopened.verify().unwrap_err().is_corrupt());
}
