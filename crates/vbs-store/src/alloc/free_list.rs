//! Variable-chunk free-list allocator.
//!
//! Free chunks carry their own `{size, next}` header in place; the list
//! head lives in the Root Record. Allocation is first-fit: the first chunk
//! large enough is split, or handed out whole when the remainder could not
//! hold a header. Freed chunks are merged with physically adjacent free
//! chunks and pushed at the head.
//!
//! Chunk sizes, and chunk offsets relative to the heap start, are multiples
//! of the header size. A remainder is therefore either zero or large enough
//! for a header, and every grant is exactly the rounded request.

use tracing::trace;

use super::{AllocUsage, Extent, SpaceAllocator};
use crate::core::codec::{align_up, put_link, put_u64, read_link, read_u64};
use crate::core::{Offset, Result, StoreError};
use crate::device::BackingStore;
use crate::layout::{FREE_HEAD_POS, ROOT_OFFSET, ROOT_RECORD_SIZE};

/// Size of a free-chunk header: `size: u64`, `next: u64`.
pub const CHUNK_HEADER_SIZE: u64 = 16;

/// Chunk sizes and heap-relative offsets are multiples of this.
const CHUNK_ALIGN: u64 = CHUNK_HEADER_SIZE;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Chunk {
    size: u64,
    next: Option<Offset>,
}

/// In-place free-list allocator.
#[derive(Debug)]
pub struct FreeListAllocator {
    head: Option<Offset>,
    heap_start: Offset,
    heap_end: Offset,
}

impl FreeListAllocator {
    fn bounds(capacity: u64) -> (Offset, Offset) {
        let heap_start = ROOT_RECORD_SIZE as u64;
        let span = capacity.saturating_sub(heap_start) & !(CHUNK_ALIGN - 1);
        (heap_start, heap_start + span)
    }

    /// Write one chunk spanning everything after the Root Record.
    pub fn format<D: BackingStore + ?Sized>(device: &D, capacity: u64) -> Result<Self> {
        let (heap_start, heap_end) = Self::bounds(capacity);
        if heap_end < heap_start + CHUNK_HEADER_SIZE {
            return Err(StoreError::Config(format!(
                "capacity {capacity} leaves no room for a free chunk"
            )));
        }

        let mut alloc = Self {
            head: None,
            heap_start,
            heap_end,
        };
        alloc.write_chunk(
            device,
            heap_start,
            Chunk {
                size: heap_end - heap_start,
                next: None,
            },
        )?;
        alloc.set_head(device, Some(heap_start))?;
        Ok(alloc)
    }

    /// Reattach to a list whose head was read from the Root Record.
    pub fn load(capacity: u64, head: Option<Offset>) -> Result<Self> {
        let (heap_start, heap_end) = Self::bounds(capacity);
        if let Some(h) = head {
            if h < heap_start || h >= heap_end || (h - heap_start) % CHUNK_ALIGN != 0 {
                return Err(StoreError::corrupt(
                    ROOT_OFFSET + FREE_HEAD_POS as u64,
                    format!("free-list head {h:#x} outside heap"),
                ));
            }
        }
        Ok(Self {
            head,
            heap_start,
            heap_end,
        })
    }

    pub fn head(&self) -> Option<Offset> {
        self.head
    }

    /// Granted size for a request of `len` bytes.
    fn request_size(len: u64) -> Option<u64> {
        align_up(len, CHUNK_ALIGN).map(|n| n.max(CHUNK_HEADER_SIZE))
    }

    /// Length every successful `allocate(len)` grants.
    pub(crate) fn slot_len(len: u64) -> u64 {
        Self::request_size(len).unwrap_or(u64::MAX)
    }

    /// Longest list a healthy store can have.
    fn max_chunks(&self) -> u64 {
        (self.heap_end - self.heap_start) / CHUNK_HEADER_SIZE + 1
    }

    /// The byte range chunks are carved from.
    pub fn heap(&self) -> Extent {
        Extent::new(self.heap_start, self.heap_end - self.heap_start)
    }

    fn aligned(&self, at: Offset) -> bool {
        at >= self.heap_start && (at - self.heap_start) % CHUNK_ALIGN == 0
    }

    fn read_chunk<D: BackingStore + ?Sized>(&self, device: &D, at: Offset) -> Result<Chunk> {
        if !self.aligned(at) || at + CHUNK_HEADER_SIZE > self.heap_end {
            return Err(StoreError::corrupt(at, "free chunk link outside heap"));
        }
        let mut buf = [0u8; CHUNK_HEADER_SIZE as usize];
        device.read_exact_at(at, &mut buf)?;
        let chunk = Chunk {
            size: read_u64(&buf, 0, at)?,
            next: read_link(&buf, 8, at)?,
        };
        if chunk.size < CHUNK_HEADER_SIZE
            || chunk.size % CHUNK_ALIGN != 0
            || at + chunk.size > self.heap_end
        {
            return Err(StoreError::corrupt(
                at,
                format!("free chunk of impossible size {}", chunk.size),
            ));
        }
        Ok(chunk)
    }

    fn write_chunk<D: BackingStore + ?Sized>(
        &self,
        device: &D,
        at: Offset,
        chunk: Chunk,
    ) -> Result<()> {
        let mut buf = [0u8; CHUNK_HEADER_SIZE as usize];
        put_u64(&mut buf, 0, chunk.size);
        put_link(&mut buf, 8, chunk.next);
        device.write_all_at(at, &buf)
    }

    /// Update the head both in memory and in its Root Record slot.
    fn set_head<D: BackingStore + ?Sized>(&mut self, device: &D, head: Option<Offset>) -> Result<()> {
        let mut buf = [0u8; 8];
        put_link(&mut buf, 0, head);
        device.write_all_at(ROOT_OFFSET + FREE_HEAD_POS as u64, &buf)?;
        self.head = head;
        Ok(())
    }

    /// Point `prev` (or the head) at `target`.
    fn relink<D: BackingStore + ?Sized>(
        &mut self,
        device: &D,
        prev: Option<(Offset, Chunk)>,
        target: Option<Offset>,
    ) -> Result<()> {
        match prev {
            None => self.set_head(device, target),
            Some((at, mut chunk)) => {
                chunk.next = target;
                self.write_chunk(device, at, chunk)
            }
        }
    }

    /// The whole list, head first.
    fn collect<D: BackingStore + ?Sized>(&self, device: &D) -> Result<Vec<(Offset, Chunk)>> {
        let mut out = Vec::new();
        let mut cur = self.head;
        while let Some(at) = cur {
            if out.len() as u64 >= self.max_chunks() {
                return Err(StoreError::corrupt(at, "free list does not terminate"));
            }
            let chunk = self.read_chunk(device, at)?;
            out.push((at, chunk));
            cur = chunk.next;
        }
        Ok(out)
    }

    /// Every free chunk as an extent, head first.
    pub fn chunks<D: BackingStore + ?Sized>(&self, device: &D) -> Result<Vec<Extent>> {
        Ok(self
            .collect(device)?
            .into_iter()
            .map(|(at, chunk)| Extent::new(at, chunk.size))
            .collect())
    }
}

impl SpaceAllocator for FreeListAllocator {
    fn allocate<D: BackingStore + ?Sized>(&mut self, device: &D, len: u64) -> Result<Extent> {
        if len == 0 {
            return Err(StoreError::invalid_argument("zero-length allocation"));
        }
        let need = Self::request_size(len).ok_or(StoreError::OutOfSpace { requested: len })?;

        let mut prev: Option<(Offset, Chunk)> = None;
        let mut cur = self.head;
        let mut steps = 0u64;

        while let Some(at) = cur {
            steps += 1;
            if steps > self.max_chunks() {
                return Err(StoreError::corrupt(at, "free list does not terminate"));
            }

            let chunk = self.read_chunk(device, at)?;
            if chunk.size >= need {
                let remainder = chunk.size - need;
                let granted = if remainder < CHUNK_HEADER_SIZE {
                    self.relink(device, prev, chunk.next)?;
                    chunk.size
                } else {
                    let split = at + need;
                    self.write_chunk(
                        device,
                        split,
                        Chunk {
                            size: remainder,
                            next: chunk.next,
                        },
                    )?;
                    self.relink(device, prev, Some(split))?;
                    need
                };

                trace!(at, granted, "free-list allocate");
                return Ok(Extent::new(at, granted));
            }

            prev = Some((at, chunk));
            cur = chunk.next;
        }

        Err(StoreError::OutOfSpace { requested: len })
    }

    fn free<D: BackingStore + ?Sized>(&mut self, device: &D, extent: Extent) -> Result<()> {
        if !self.aligned(extent.offset)
            || extent.len < CHUNK_HEADER_SIZE
            || extent.len % CHUNK_ALIGN != 0
            || extent.end() > self.heap_end
        {
            return Err(StoreError::corrupt(
                extent.offset,
                format!("free of invalid extent of {} bytes", extent.len),
            ));
        }

        let mut chain = self.collect(device)?;
        if let Some((at, _)) = chain
            .iter()
            .find(|(at, chunk)| extent.overlaps(&Extent::new(*at, chunk.size)))
        {
            return Err(StoreError::corrupt(
                *at,
                "double free: range overlaps a free chunk",
            ));
        }

        // No two free chunks are ever adjacent, so at most one neighbor on
        // each side exists.
        let neighbors: Vec<usize> = chain
            .iter()
            .enumerate()
            .filter(|(_, (at, chunk))| at + chunk.size == extent.offset || extent.end() == *at)
            .map(|(i, _)| i)
            .collect();

        let mut merged = extent;
        for &i in neighbors.iter().rev() {
            let (at, chunk) = chain[i];
            if i == 0 {
                self.set_head(device, chunk.next)?;
            } else {
                chain[i - 1].1.next = chunk.next;
                let (prev_at, prev_chunk) = chain[i - 1];
                self.write_chunk(device, prev_at, prev_chunk)?;
            }
            merged = Extent::new(merged.offset.min(at), merged.len + chunk.size);
        }

        self.write_chunk(
            device,
            merged.offset,
            Chunk {
                size: merged.len,
                next: self.head,
            },
        )?;
        self.set_head(device, Some(merged.offset))?;

        trace!(
            at = merged.offset,
            len = merged.len,
            merged = neighbors.len(),
            "free-list free"
        );
        Ok(())
    }

    fn usage<D: BackingStore + ?Sized>(&self, device: &D) -> Result<AllocUsage> {
        let chain = self.collect(device)?;
        Ok(AllocUsage {
            unit: 1,
            total_units: self.heap_end - self.heap_start,
            free_units: chain.iter().map(|(_, c)| c.size).sum(),
            free_extents: chain.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryBackingStore;

    const CAP: u64 = 4096;
    /// Heap span: capacity after the Root Record, rounded down to whole headers.
    const HEAP: u64 = 4016;

    fn fresh() -> (MemoryBackingStore, FreeListAllocator) {
        let store = MemoryBackingStore::new(CAP as usize);
        let alloc = FreeListAllocator::format(&store, CAP).unwrap();
        (store, alloc)
    }

    #[test]
    fn test_format_single_chunk() {
        let (store, alloc) = fresh();
        assert_eq!(alloc.head(), Some(72));
        assert_eq!(alloc.chunks(&store).unwrap(), vec![Extent::new(72, HEAP)]);
        assert_eq!(alloc.heap(), Extent::new(72, HEAP));
    }

    #[test]
    fn test_split_and_round() {
        let (store, mut alloc) = fresh();

        let a = alloc.allocate(&store, 5).unwrap();
        assert_eq!(a, Extent::new(72, 16));

        let b = alloc.allocate(&store, 100).unwrap();
        assert_eq!(b, Extent::new(88, 112));

        assert_eq!(alloc.head(), Some(200));
        assert_eq!(alloc.usage(&store).unwrap().free_units, 72 + HEAP - 200);
    }

    #[test]
    fn test_whole_chunk_on_exact_fit() {
        let (store, mut alloc) = fresh();

        // Rounds up to the whole heap, leaving no remainder.
        let ext = alloc.allocate(&store, HEAP - 8).unwrap();
        assert_eq!(ext.len, HEAP);
        assert_eq!(alloc.head(), None);

        assert!(matches!(
            alloc.allocate(&store, 1),
            Err(StoreError::OutOfSpace { .. })
        ));
    }

    #[test]
    fn test_free_coalesces_neighbors() {
        let (store, mut alloc) = fresh();
        let a = alloc.allocate(&store, 64).unwrap();
        let b = alloc.allocate(&store, 64).unwrap();
        let c = alloc.allocate(&store, 64).unwrap();

        alloc.free(&store, a).unwrap();
        alloc.free(&store, c).unwrap();
        // a alone, c merged with the tail
        assert_eq!(alloc.chunks(&store).unwrap().len(), 2);

        alloc.free(&store, b).unwrap();
        assert_eq!(alloc.chunks(&store).unwrap(), vec![Extent::new(72, HEAP)]);
    }

    #[test]
    fn test_grant_is_rounded_request() {
        let (store, mut alloc) = fresh();
        // Holes of assorted sizes, each pinned by a live neighbor.
        let mut live = Vec::new();
        for len in [24, 88, 40, 96, 8, 120] {
            let hole = alloc.allocate(&store, len).unwrap();
            live.push(alloc.allocate(&store, 16).unwrap());
            alloc.free(&store, hole).unwrap();
        }

        for len in [80, 48, 80, 1, 17, 80, 48] {
            let ext = alloc.allocate(&store, len).unwrap();
            assert_eq!(ext.len, FreeListAllocator::slot_len(len), "request {len}");
            live.push(ext);
        }

        for ext in live {
            alloc.free(&store, ext).unwrap();
        }
        assert_eq!(alloc.chunks(&store).unwrap(), vec![Extent::new(72, HEAP)]);
    }

    #[test]
    fn test_free_is_lifo() {
        let (store, mut alloc) = fresh();
        let a = alloc.allocate(&store, 32).unwrap();
        let _gap1 = alloc.allocate(&store, 32).unwrap();
        let b = alloc.allocate(&store, 32).unwrap();
        let _gap2 = alloc.allocate(&store, 32).unwrap();

        alloc.free(&store, a).unwrap();
        alloc.free(&store, b).unwrap();

        let chunks = alloc.chunks(&store).unwrap();
        assert_eq!(chunks[0], b);
        assert_eq!(chunks[1], a);

        // First fit takes the most recently freed chunk.
        assert_eq!(alloc.allocate(&store, 32).unwrap(), b);
    }

    #[test]
    fn test_double_free_detected() {
        let (store, mut alloc) = fresh();
        let a = alloc.allocate(&store, 32).unwrap();
        let _b = alloc.allocate(&store, 32).unwrap();
        alloc.free(&store, a).unwrap();

        assert!(alloc.free(&store, a).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_head_persisted_in_root_slot() {
        let (store, mut alloc) = fresh();
        alloc.allocate(&store, 40).unwrap();

        let mut buf = [0u8; 8];
        store
            .read_exact_at(FREE_HEAD_POS as u64, &mut buf)
            .unwrap();
        assert_eq!(u64::from_le_bytes(buf), alloc.head().unwrap());

        let reloaded = FreeListAllocator::load(CAP, alloc.head()).unwrap();
        assert_eq!(reloaded.chunks(&store).unwrap(), alloc.chunks(&store).unwrap());
    }

    #[test]
    fn test_cycle_detected() {
        let (store, alloc) = fresh();
        // Point the only chunk at itself.
        store.write_all_at(72 + 8, &72u64.to_le_bytes()).unwrap();
        assert!(alloc.chunks(&store).unwrap_err().is_corrupt());
    }
}
