//! Allocator Property Tests
//!
//! Random allocate/free sequences never hand out overlapping ranges, and
//! random store workloads keep every catalog and extent consistent.

mod common;

use proptest::prelude::*;
use vbs_store::layout::RootRecord;
use vbs_store::testing::MemoryBackingStore;
use vbs_store::{AllocatorKind, Allocator, Extent, SpaceAllocator, StoreError, StoreService};

const CAPACITY: u64 = 64 * 1024;

#[derive(Clone, Debug)]
enum AllocOp {
    Allocate(u64),
    Free(usize),
}

fn alloc_op() -> impl Strategy<Value = AllocOp> {
    prop_oneof![
        3 => (1u64..4000).prop_map(AllocOp::Allocate),
        2 => any::<usize>().prop_map(AllocOp::Free),
    ]
}

fn check_exclusive(kind: AllocatorKind, ops: &[AllocOp]) -> Result<(), TestCaseError> {
    let device = MemoryBackingStore::new(CAPACITY as usize);
    let mut root = RootRecord::new(kind, 512, CAPACITY);
    let mut allocator = Allocator::format(&device, &mut root).unwrap();
    let initial = allocator.usage(&device).unwrap();
    let mut live: Vec<Extent> = Vec::new();

    for op in ops {
        match *op {
            AllocOp::Allocate(len) => match allocator.allocate(&device, len) {
                Ok(ext) => {
                    prop_assert!(ext.len >= len);
                    prop_assert!(ext.end() <= CAPACITY);
                    for other in &live {
                        prop_assert!(!ext.overlaps(other), "{ext:?} overlaps {other:?}");
                    }
                    live.push(ext);
                }
                Err(StoreError::OutOfSpace { .. }) => {}
                Err(e) => return Err(TestCaseError::fail(format!("allocate failed: {e}"))),
            },
            AllocOp::Free(i) => {
                if !live.is_empty() {
                    let ext = live.swap_remove(i % live.len());
                    allocator.free(&device, ext).unwrap();
                }
            }
        }

        for free in allocator.free_extents(&device).unwrap() {
            for used in &live {
                prop_assert!(!free.overlaps(used), "free {free:?} overlaps live {used:?}");
            }
        }
    }

    for ext in live.drain(..) {
        allocator.free(&device, ext).unwrap();
    }
    prop_assert_eq!(allocator.usage(&device).unwrap(), initial);
    Ok(())
}

#[derive(Clone, Debug)]
enum StoreOp {
    Create(u8),
    Write(u8, u16, u16),
    Truncate(u8, u16),
    Remove(u8),
}

fn store_op() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        (0u8..8).prop_map(StoreOp::Create),
        (0u8..8, 0u16..2048, 1u16..2048).prop_map(|(f, o, l)| StoreOp::Write(f, o, l)),
        (0u8..8, 0u16..2048).prop_map(|(f, n)| StoreOp::Truncate(f, n)),
        (0u8..8).prop_map(StoreOp::Remove),
    ]
}

proptest! {
    /// Test bitmap exclusivity under random workloads.
    #[test]
    fn test_bitmap_exclusivity(ops in prop::collection::vec(alloc_op(), 1..150)) {
        check_exclusive(AllocatorKind::Bitmap, &ops)?;
    }

    /// Test free-list exclusivity and full coalescing under random workloads.
    #[test]
    fn test_free_list_exclusivity(ops in prop::collection::vec(alloc_op(), 1..150)) {
        check_exclusive(AllocatorKind::FreeList, &ops)?;
    }

    /// Test that random file workloads keep the store consistent.
    #[test]
    fn test_store_workload_consistent(
        free_list in any::<bool>(),
        ops in prop::collection::vec(store_op(), 1..60),
    ) {
        let kind = if free_list { AllocatorKind::FreeList } else { AllocatorKind::Bitmap };
        let mut store = common::fresh(kind);

        for op in ops {
            let outcome = match op {
                StoreOp::Create(f) => store.open(&format!("f{f}"), true).map(|_| ()),
                StoreOp::Write(f, offset, len) => store
                    .open(&format!("f{f}"), false)
                    .and_then(|_| store.write(u64::from(offset), &vec![f; usize::from(len)]))
                    .map(|_| ()),
                StoreOp::Truncate(f, n) => store
                    .open(&format!("f{f}"), false)
                    .and_then(|_| store.truncate(u64::from(n))),
                StoreOp::Remove(f) => store.remove(&format!("f{f}")),
            };
            match outcome {
                Ok(()) | Err(StoreError::NotFound(_)) | Err(StoreError::OutOfSpace { .. }) => {}
                Err(e) => return Err(TestCaseError::fail(format!("{op:?} failed: {e}"))),
            }
            prop_assert!(store.verify().is_ok());
        }
    }
}
