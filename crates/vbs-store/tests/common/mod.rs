//! Shared helpers for store integration tests.

#![allow(dead_code)]

use vbs_store::testing::MemoryBackingStore;
use vbs_store::{bootstrap_store, AllocatorKind, BlockStore, IndexKind, StoreConfig};

/// Both allocator variants, for tests that must hold for either.
pub const ALLOCATORS: [AllocatorKind; 2] = [AllocatorKind::Bitmap, AllocatorKind::FreeList];

pub fn config(allocator: AllocatorKind, index: IndexKind) -> StoreConfig {
    StoreConfig {
        allocator,
        index,
        block_size: 512,
        ..StoreConfig::default()
    }
}

/// A freshly formatted in-memory store acting as root.
pub fn fresh(allocator: AllocatorKind) -> BlockStore<MemoryBackingStore> {
    fresh_with(allocator, IndexKind::Scan)
}

pub fn fresh_with(allocator: AllocatorKind, index: IndexKind) -> BlockStore<MemoryBackingStore> {
    let capacity = match allocator {
        AllocatorKind::Bitmap => 1 << 20,
        AllocatorKind::FreeList => 64 * 1024,
    };
    bootstrap_store(MemoryBackingStore::new(capacity), &config(allocator, index)).unwrap()
}
