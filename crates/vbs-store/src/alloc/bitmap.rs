//! Fixed-block bitmap allocator.
//!
//! Block 0 holds the Root Record, blocks `1..=k` hold the bitmap itself
//! (one bit per block of the store), the rest are allocatable. A bit is set
//! iff its block belongs to exactly one live record or data region.

use tracing::{debug, trace};

use super::{AllocUsage, Extent, SpaceAllocator};
use crate::core::{Offset, Result, StoreError};
use crate::device::BackingStore;

/// Get bit `idx` from a bitmap byte slice.
fn bit_get(bitmap: &[u8], idx: u64) -> bool {
    let byte = (idx / 8) as usize;
    byte < bitmap.len() && (bitmap[byte] >> (idx % 8)) & 1 == 1
}

fn bit_set(bitmap: &mut [u8], idx: u64) {
    bitmap[(idx / 8) as usize] |= 1 << (idx % 8);
}

fn bit_clear(bitmap: &mut [u8], idx: u64) {
    bitmap[(idx / 8) as usize] &= !(1 << (idx % 8));
}

/// Bitmap-backed first-fit block allocator.
#[derive(Debug)]
pub struct BitmapAllocator {
    block_size: u64,
    total_blocks: u64,
    /// Root block plus bitmap blocks; never allocatable
    reserved_blocks: u64,
    /// In-memory mirror of the persisted bitmap
    bits: Vec<u8>,
}

impl BitmapAllocator {
    fn geometry(block_size: u32, capacity: u64) -> Result<(u64, u64, u64)> {
        let bs = u64::from(block_size);
        if bs == 0 || !bs.is_power_of_two() {
            return Err(StoreError::corrupt(0, format!("invalid block size {block_size}")));
        }
        let total_blocks = capacity / bs;
        let bitmap_blocks = total_blocks.div_ceil(8 * bs);
        let reserved = 1 + bitmap_blocks;
        if total_blocks <= reserved {
            return Err(StoreError::corrupt(
                0,
                format!("{total_blocks} blocks leave nothing allocatable"),
            ));
        }
        Ok((bs, total_blocks, bitmap_blocks))
    }

    /// Write an empty bitmap with the reserved blocks marked used.
    pub fn format<D: BackingStore + ?Sized>(
        device: &D,
        block_size: u32,
        capacity: u64,
    ) -> Result<Self> {
        let (bs, total_blocks, bitmap_blocks) = Self::geometry(block_size, capacity)?;
        let mut alloc = Self {
            block_size: bs,
            total_blocks,
            reserved_blocks: 1 + bitmap_blocks,
            bits: vec![0u8; (bitmap_blocks * bs) as usize],
        };
        for idx in 0..alloc.reserved_blocks {
            bit_set(&mut alloc.bits, idx);
        }
        device.write_all_at(alloc.bitmap_offset(), &alloc.bits)?;
        debug!(
            total_blocks,
            bitmap_blocks, block_size, "formatted block bitmap"
        );
        Ok(alloc)
    }

    /// Load the persisted bitmap into memory.
    pub fn load<D: BackingStore + ?Sized>(
        device: &D,
        block_size: u32,
        capacity: u64,
    ) -> Result<Self> {
        let (bs, total_blocks, bitmap_blocks) = Self::geometry(block_size, capacity)?;
        let mut alloc = Self {
            block_size: bs,
            total_blocks,
            reserved_blocks: 1 + bitmap_blocks,
            bits: vec![0u8; (bitmap_blocks * bs) as usize],
        };
        device.read_exact_at(alloc.bitmap_offset(), &mut alloc.bits)?;

        if let Some(idx) = (0..alloc.reserved_blocks).find(|&i| !bit_get(&alloc.bits, i)) {
            return Err(StoreError::corrupt(
                alloc.bitmap_offset(),
                format!("reserved block {idx} marked free"),
            ));
        }
        Ok(alloc)
    }

    fn bitmap_offset(&self) -> Offset {
        self.block_size
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Blocks past the reserved region, as one byte extent.
    pub fn allocatable(&self) -> Extent {
        let start = self.reserved_blocks * self.block_size;
        Extent::new(start, self.total_blocks * self.block_size - start)
    }

    /// Whether block `idx` is currently in use.
    pub fn is_used(&self, idx: u64) -> bool {
        bit_get(&self.bits, idx)
    }

    /// First run of `n` free blocks above the reserved region.
    fn find_run(&self, n: u64) -> Option<u64> {
        let mut run_start = self.reserved_blocks;
        let mut run_len = 0u64;

        for idx in self.reserved_blocks..self.total_blocks {
            if bit_get(&self.bits, idx) {
                run_start = idx + 1;
                run_len = 0;
            } else {
                run_len += 1;
                if run_len >= n {
                    return Some(run_start);
                }
            }
        }
        None
    }

    /// Persist the bitmap bytes covering blocks `first..=last`.
    fn persist<D: BackingStore + ?Sized>(&self, device: &D, first: u64, last: u64) -> Result<()> {
        let lo = (first / 8) as usize;
        let hi = (last / 8) as usize;
        device.write_all_at(self.bitmap_offset() + lo as u64, &self.bits[lo..=hi])
    }

    /// Runs of free blocks, as byte extents.
    pub fn free_runs(&self) -> Vec<Extent> {
        let mut runs = Vec::new();
        let mut start: Option<u64> = None;
        for idx in self.reserved_blocks..self.total_blocks {
            match (bit_get(&self.bits, idx), start) {
                (false, None) => start = Some(idx),
                (true, Some(s)) => {
                    runs.push(Extent::new(s * self.block_size, (idx - s) * self.block_size));
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            runs.push(Extent::new(
                s * self.block_size,
                (self.total_blocks - s) * self.block_size,
            ));
        }
        runs
    }
}

impl SpaceAllocator for BitmapAllocator {
    fn allocate<D: BackingStore + ?Sized>(&mut self, device: &D, len: u64) -> Result<Extent> {
        if len == 0 {
            return Err(StoreError::invalid_argument("zero-length allocation"));
        }

        let needed = len.div_ceil(self.block_size);
        let start = self
            .find_run(needed)
            .ok_or(StoreError::OutOfSpace { requested: len })?;
        let last = start + needed - 1;

        for idx in start..=last {
            bit_set(&mut self.bits, idx);
        }
        self.persist(device, start, last)?;

        trace!(start, blocks = needed, "bitmap allocate");
        Ok(Extent::new(start * self.block_size, needed * self.block_size))
    }

    fn free<D: BackingStore + ?Sized>(&mut self, device: &D, extent: Extent) -> Result<()> {
        let bs = self.block_size;
        if extent.len == 0 || extent.offset % bs != 0 || extent.len % bs != 0 {
            return Err(StoreError::corrupt(
                extent.offset,
                format!("free of unaligned extent of {} bytes", extent.len),
            ));
        }

        let first = extent.offset / bs;
        let count = extent.len / bs;
        if first < self.reserved_blocks || first + count > self.total_blocks {
            return Err(StoreError::corrupt(
                extent.offset,
                "free outside the allocatable region",
            ));
        }
        let last = first + count - 1;

        if let Some(idx) = (first..=last).find(|&i| !bit_get(&self.bits, i)) {
            return Err(StoreError::corrupt(
                idx * bs,
                "double free: block already clear",
            ));
        }

        for idx in first..=last {
            bit_clear(&mut self.bits, idx);
        }
        self.persist(device, first, last)?;

        trace!(first, blocks = count, "bitmap free");
        Ok(())
    }

    fn usage<D: BackingStore + ?Sized>(&self, _device: &D) -> Result<AllocUsage> {
        let free_units = (0..self.total_blocks)
            .filter(|&idx| !bit_get(&self.bits, idx))
            .count() as u64;
        Ok(AllocUsage {
            unit: self.block_size,
            total_units: self.total_blocks,
            free_units,
            free_extents: self.free_runs().len() as u64,
        })
    }
}
