//! Store bootstrap.
//!
//! Handles formatting on first use and validation on reopen. A front-end
//! calls one of these exactly once before any other operation.

use tracing::{info, warn};

use crate::alloc::Allocator;
use crate::catalog::CatalogIndex;
use crate::config::{AllocatorKind, StoreConfig};
use crate::core::{Result, StoreError};
use crate::device::{BackingStore, FileBackingStore};
use crate::layout::{read_root, write_root, RootRecord, ROOT_OFFSET};
use crate::store::BlockStore;

/// Format `device` if it was never formatted, otherwise load it.
///
/// This function is idempotent: loading a store never rewrites it.
pub fn bootstrap_store<D: BackingStore>(device: D, config: &StoreConfig) -> Result<BlockStore<D>> {
    match read_root(&device)? {
        None => format_store(device, config),
        Some(root) => load_store(device, root, config),
    }
}

/// Open (creating if needed) the backing file named by `config` and
/// bootstrap it.
pub fn bootstrap_from_config(config: &StoreConfig) -> Result<BlockStore<FileBackingStore>> {
    config.validate()?;
    let device = FileBackingStore::open_or_create(&config.path, config.effective_capacity())?;
    bootstrap_store(device, config)
}

/// Lay down a fresh Root Record, allocator state and root identity.
///
/// Formatting assumes the region is zeroed; catalogs start empty apart
/// from the root user and group.
pub fn format_store<D: BackingStore>(device: D, config: &StoreConfig) -> Result<BlockStore<D>> {
    let capacity = match config.allocator {
        AllocatorKind::Bitmap => device.len() - device.len() % u64::from(config.block_size.max(1)),
        AllocatorKind::FreeList => device.len(),
    };

    let mut geometry = config.clone();
    geometry.capacity = Some(capacity);
    geometry.validate()?;
    if config.capacity.is_some_and(|c| c != capacity) {
        warn!(
            configured = config.effective_capacity(),
            capacity, "backing store length differs from configured capacity"
        );
    }

    let mut root = RootRecord::new(config.allocator, config.block_size, capacity);
    let allocator = Allocator::format(&device, &mut root)?;
    write_root(&device, &root)?;

    let index = CatalogIndex::build(config.index, &device, None)?;
    let mut store = BlockStore::from_parts(device, root, allocator, index, config.sync);
    store.create_root_identity()?;
    store.flush()?;

    info!(
        allocator = ?config.allocator,
        capacity,
        block_size = config.block_size,
        "formatted store"
    );
    Ok(store)
}

/// Attach to an already formatted store. On-disk geometry wins over
/// `config`.
pub fn load_store<D: BackingStore>(
    device: D,
    root: RootRecord,
    config: &StoreConfig,
) -> Result<BlockStore<D>> {
    if root.capacity > device.len() {
        return Err(StoreError::corrupt(
            ROOT_OFFSET,
            format!(
                "recorded capacity {} exceeds backing store length {}",
                root.capacity,
                device.len()
            ),
        ));
    }
    if root.allocator != config.allocator {
        warn!(
            on_disk = ?root.allocator,
            configured = ?config.allocator,
            "allocator differs from configuration, using on-disk"
        );
    }
    if root.allocator == AllocatorKind::Bitmap && root.block_size != config.block_size {
        warn!(
            on_disk = root.block_size,
            configured = config.block_size,
            "block size differs from configuration, using on-disk"
        );
    }

    let allocator = Allocator::load(&device, &root)?;
    if allocator.free_head() != root.free_head {
        return Err(StoreError::corrupt(ROOT_OFFSET, "free-list head mismatch"));
    }
    let index = CatalogIndex::build(config.index, &device, root.first_file)?;

    info!(
        allocator = ?root.allocator,
        capacity = root.capacity,
        files = root.file_count,
        "loaded store"
    );
    Ok(BlockStore::from_parts(device, root, allocator, index, config.sync))
}
