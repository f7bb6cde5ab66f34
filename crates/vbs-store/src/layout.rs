//! Root Record and fixed layout constants.
//!
//! ```text
//! offset  size  field
//! 0       4     format tag (0xDEADBEEF)
//! 4       4     version
//! 8       1     allocator kind (0 bitmap, 1 free list) + 3 pad
//! 12      4     block size
//! 16      8     capacity
//! 24      4     live-file count
//! 28      4     next uid
//! 32      4     next gid
//! 36      4     pad
//! 40      8     file catalog head
//! 48      8     user catalog head
//! 56      8     group catalog head
//! 64      8     free-list head
//! ```
//!
//! The record is rewritten in full on every mutating operation.

use serde::Serialize;

use crate::config::AllocatorKind;
use crate::core::codec::{put_link, put_u32, put_u64, read_link, read_u32, read_u64};
use crate::core::{Gid, Offset, Result, StoreError, Uid};
use crate::device::BackingStore;

/// Format tag identifying a formatted store.
pub const FORMAT_TAG: u32 = 0xDEAD_BEEF;

/// Current on-disk version.
pub const FORMAT_VERSION: u32 = 3;

/// Fixed location of the Root Record.
pub const ROOT_OFFSET: Offset = 0;

/// Encoded size of the Root Record.
pub const ROOT_RECORD_SIZE: usize = 72;

/// Position of the free-list head inside the Root Record.
pub(crate) const FREE_HEAD_POS: usize = 64;

/// Smallest block the bitmap allocator accepts (must hold any record).
pub const BITMAP_MIN_BLOCK_SIZE: u32 = 512;

/// Smallest region the free-list allocator accepts.
pub const FREE_LIST_MIN_CAPACITY: u64 = 4096;

/// Root metadata record at offset 0.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RootRecord {
    pub version: u32,
    pub allocator: AllocatorKind,
    pub block_size: u32,
    pub capacity: u64,
    /// Live files in the file catalog
    pub file_count: u32,
    pub next_uid: Uid,
    pub next_gid: Gid,
    pub first_file: Option<Offset>,
    pub first_user: Option<Offset>,
    pub first_group: Option<Offset>,
    /// Only used by the free-list allocator
    pub free_head: Option<Offset>,
}

impl RootRecord {
    /// A freshly formatted root with empty catalogs.
    pub fn new(allocator: AllocatorKind, block_size: u32, capacity: u64) -> Self {
        Self {
            version: FORMAT_VERSION,
            allocator,
            block_size,
            capacity,
            file_count: 0,
            next_uid: 1,
            next_gid: 1,
            first_file: None,
            first_user: None,
            first_group: None,
            free_head: None,
        }
    }

    pub fn encode(&self) -> [u8; ROOT_RECORD_SIZE] {
        let mut buf = [0u8; ROOT_RECORD_SIZE];
        put_u32(&mut buf, 0, FORMAT_TAG);
        put_u32(&mut buf, 4, self.version);
        buf[8] = self.allocator.tag();
        put_u32(&mut buf, 12, self.block_size);
        put_u64(&mut buf, 16, self.capacity);
        put_u32(&mut buf, 24, self.file_count);
        put_u32(&mut buf, 28, self.next_uid);
        put_u32(&mut buf, 32, self.next_gid);
        put_link(&mut buf, 40, self.first_file);
        put_link(&mut buf, 48, self.first_user);
        put_link(&mut buf, 56, self.first_group);
        put_link(&mut buf, FREE_HEAD_POS, self.free_head);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let at = ROOT_OFFSET;
        let tag = read_u32(buf, 0, at)?;
        if tag != FORMAT_TAG {
            return Err(StoreError::corrupt(
                at,
                format!("format tag {tag:#010x}, expected {FORMAT_TAG:#010x}"),
            ));
        }

        let version = read_u32(buf, 4, at)?;
        if version != FORMAT_VERSION {
            return Err(StoreError::corrupt(
                at,
                format!("unsupported version {version}"),
            ));
        }

        let kind = buf
            .get(8)
            .copied()
            .ok_or_else(|| StoreError::corrupt(at, "root record truncated"))?;
        let allocator = AllocatorKind::from_tag(kind)
            .ok_or_else(|| StoreError::corrupt(at, format!("unknown allocator kind {kind}")))?;

        Ok(Self {
            version,
            allocator,
            block_size: read_u32(buf, 12, at)?,
            capacity: read_u64(buf, 16, at)?,
            file_count: read_u32(buf, 24, at)?,
            next_uid: read_u32(buf, 28, at)?,
            next_gid: read_u32(buf, 32, at)?,
            first_file: read_link(buf, 40, at)?,
            first_user: read_link(buf, 48, at)?,
            first_group: read_link(buf, 56, at)?,
            free_head: read_link(buf, FREE_HEAD_POS, at)?,
        })
    }
}

/// Read the Root Record, or `None` if the store was never formatted.
pub fn read_root<D: BackingStore + ?Sized>(device: &D) -> Result<Option<RootRecord>> {
    let mut buf = [0u8; ROOT_RECORD_SIZE];
    device.read_exact_at(ROOT_OFFSET, &mut buf)?;
    if buf.iter().all(|b| *b == 0) {
        return Ok(None);
    }
    RootRecord::decode(&buf).map(Some)
}

/// Rewrite the Root Record in full.
pub fn write_root<D: BackingStore + ?Sized>(device: &D, root: &RootRecord) -> Result<()> {
    device.write_all_at(ROOT_OFFSET, &root.encode())
}
