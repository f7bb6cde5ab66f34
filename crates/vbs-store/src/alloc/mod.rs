//! Space allocation within the backing store.
//!
//! Two interchangeable variants:
//!
//! | Variant | State | Policy |
//! |---------|-------|--------|
//! | [`BitmapAllocator`] | one bit per fixed block, mirrored in memory | first-fit contiguous run |
//! | [`FreeListAllocator`] | `{size, next}` headers written inside free chunks | first-fit with splitting, coalescing free |
//!
//! Both persist their own state before returning success. A crash after an
//! allocation but before the caller records the reference leaks space; it
//! never hands the same bytes out twice.

mod bitmap;
mod free_list;

pub use bitmap::BitmapAllocator;
pub use free_list::{FreeListAllocator, CHUNK_HEADER_SIZE};

use serde::Serialize;

use crate::config::AllocatorKind;
use crate::core::{Offset, Result};
use crate::device::BackingStore;
use crate::layout::RootRecord;

/// A granted byte range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Extent {
    pub offset: Offset,
    /// Granted length; may exceed the requested length
    pub len: u64,
}

impl Extent {
    pub const fn new(offset: Offset, len: u64) -> Self {
        Self { offset, len }
    }

    /// One past the last byte.
    pub const fn end(&self) -> Offset {
        self.offset + self.len
    }

    pub const fn overlaps(&self, other: &Extent) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// Allocator occupancy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AllocUsage {
    /// Bytes per unit (block size, or 1 for the free list)
    pub unit: u64,
    /// Allocatable units, including reserved ones
    pub total_units: u64,
    pub free_units: u64,
    /// Runs of free blocks or free chunks
    pub free_extents: u64,
}

impl AllocUsage {
    pub fn used_units(&self) -> u64 {
        self.total_units.saturating_sub(self.free_units)
    }

    pub fn free_bytes(&self) -> u64 {
        self.free_units * self.unit
    }
}

/// Hands out and reclaims byte ranges of a backing store.
pub trait SpaceAllocator {
    /// Reserve at least `len` bytes. Zero is an invalid request.
    fn allocate<D: BackingStore + ?Sized>(&mut self, device: &D, len: u64) -> Result<Extent>;

    /// Return an extent previously granted by `allocate`.
    fn free<D: BackingStore + ?Sized>(&mut self, device: &D, extent: Extent) -> Result<()>;

    /// Current occupancy.
    fn usage<D: BackingStore + ?Sized>(&self, device: &D) -> Result<AllocUsage>;
}

/// The allocator variant a store was formatted with.
#[derive(Debug)]
pub enum Allocator {
    Bitmap(BitmapAllocator),
    FreeList(FreeListAllocator),
}

impl Allocator {
    /// Lay down fresh allocator state for `root`'s geometry.
    pub fn format<D: BackingStore + ?Sized>(device: &D, root: &mut RootRecord) -> Result<Self> {
        match root.allocator {
            AllocatorKind::Bitmap => Ok(Self::Bitmap(BitmapAllocator::format(
                device,
                root.block_size,
                root.capacity,
            )?)),
            AllocatorKind::FreeList => {
                let alloc = FreeListAllocator::format(device, root.capacity)?;
                root.free_head = alloc.head();
                Ok(Self::FreeList(alloc))
            }
        }
    }

    /// Reattach to persisted allocator state.
    pub fn load<D: BackingStore + ?Sized>(device: &D, root: &RootRecord) -> Result<Self> {
        match root.allocator {
            AllocatorKind::Bitmap => Ok(Self::Bitmap(BitmapAllocator::load(
                device,
                root.block_size,
                root.capacity,
            )?)),
            AllocatorKind::FreeList => Ok(Self::FreeList(FreeListAllocator::load(
                root.capacity,
                root.free_head,
            )?)),
        }
    }

    pub fn kind(&self) -> AllocatorKind {
        match self {
            Allocator::Bitmap(_) => AllocatorKind::Bitmap,
            Allocator::FreeList(_) => AllocatorKind::FreeList,
        }
    }

    /// Free-list head to mirror into the Root Record.
    pub fn free_head(&self) -> Option<Offset> {
        match self {
            Allocator::Bitmap(_) => None,
            Allocator::FreeList(alloc) => alloc.head(),
        }
    }

    /// Extent a successful `allocate(len)` grants at `at`. Used to release
    /// fixed-size record slots.
    pub fn slot_extent(&self, at: Offset, len: u64) -> Extent {
        match self {
            Allocator::Bitmap(alloc) => {
                let bs = alloc.block_size();
                Extent::new(at, len.div_ceil(bs) * bs)
            }
            Allocator::FreeList(_) => Extent::new(at, FreeListAllocator::slot_len(len)),
        }
    }

    /// The byte range this allocator hands out from. Live and free extents
    /// together tile it exactly.
    pub fn managed_extent(&self) -> Extent {
        match self {
            Allocator::Bitmap(alloc) => alloc.allocatable(),
            Allocator::FreeList(alloc) => alloc.heap(),
        }
    }

    /// Every free extent, in allocator order.
    pub fn free_extents<D: BackingStore + ?Sized>(&self, device: &D) -> Result<Vec<Extent>> {
        match self {
            Allocator::Bitmap(alloc) => Ok(alloc.free_runs()),
            Allocator::FreeList(alloc) => alloc.chunks(device),
        }
    }
}

impl SpaceAllocator for Allocator {
    fn allocate<D: BackingStore + ?Sized>(&mut self, device: &D, len: u64) -> Result<Extent> {
        match self {
            Allocator::Bitmap(alloc) => alloc.allocate(device, len),
            Allocator::FreeList(alloc) => alloc.allocate(device, len),
        }
    }

    fn free<D: BackingStore + ?Sized>(&mut self, device: &D, extent: Extent) -> Result<()> {
        match self {
            Allocator::Bitmap(alloc) => alloc.free(device, extent),
            Allocator::FreeList(alloc) => alloc.free(device, extent),
        }
    }

    fn usage<D: BackingStore + ?Sized>(&self, device: &D) -> Result<AllocUsage> {
        match self {
            Allocator::Bitmap(alloc) => alloc.usage(device),
            Allocator::FreeList(alloc) => alloc.usage(device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_overlap() {
        let a = Extent::new(100, 50);
        assert!(a.overlaps(&Extent::new(149, 1)));
        assert!(a.overlaps(&Extent::new(50, 51)));
        assert!(!a.overlaps(&Extent::new(150, 10)));
        assert!(!a.overlaps(&Extent::new(0, 100)));
        assert_eq!(a.end(), 150);
    }

    #[test]
    fn test_usage_math() {
        let usage = AllocUsage {
            unit: 4096,
            total_units: 10,
            free_units: 4,
            free_extents: 2,
        };
        assert_eq!(usage.used_units(), 6);
        assert_eq!(usage.free_bytes(), 4 * 4096);
    }
}
