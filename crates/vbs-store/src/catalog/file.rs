//! File catalog records.
//!
//! ```text
//! offset  size  field
//! 0       32    name (NUL-padded)
//! 32      8     logical size
//! 40      2     mode + 2 pad
//! 44      4     owner uid
//! 48      4     owner gid
//! 52      4     pad
//! 56      8     data region offset (NIL = none)
//! 64      8     data region capacity
//! 72      8     next
//! ```

use super::Record;
use crate::alloc::Extent;
use crate::core::codec::{put_link, put_u16, put_u32, put_u64, read_link, read_u16, read_u32, read_u64};
use crate::core::{
    decode_name, encode_name, FileInfo, FileMode, Gid, Offset, Ownership, Result, StoreError, Uid,
    NAME_FIELD_LEN,
};

/// One file: name, ownership and its single data region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRecord {
    pub name: String,
    /// Logical size; never exceeds the data region's capacity
    pub size: u64,
    pub mode: FileMode,
    pub uid: Uid,
    pub gid: Gid,
    /// Granted data region, allocated by the first non-empty write
    pub data: Option<Extent>,
    pub next: Option<Offset>,
}

impl FileRecord {
    /// An empty file owned by `uid:gid` with the default mode.
    pub fn new(name: &str, uid: Uid, gid: Gid) -> Self {
        Self {
            name: name.to_owned(),
            size: 0,
            mode: FileMode::DEFAULT_FILE,
            uid,
            gid,
            data: None,
            next: None,
        }
    }

    pub fn ownership(&self) -> Ownership {
        Ownership {
            uid: self.uid,
            gid: self.gid,
            mode: self.mode,
        }
    }

    /// Bytes the data region can hold.
    pub fn capacity(&self) -> u64 {
        self.data.map_or(0, |d| d.len)
    }

    /// Snapshot with owner and group names left unresolved.
    pub fn info(&self) -> FileInfo {
        FileInfo {
            name: self.name.clone(),
            size: self.size,
            mode: self.mode,
            uid: self.uid,
            gid: self.gid,
            owner: None,
            group: None,
            capacity: self.capacity(),
        }
    }
}

impl Record for FileRecord {
    const SIZE: usize = 80;
    const KIND: &'static str = "file";

    fn name(&self) -> &str {
        &self.name
    }

    fn next(&self) -> Option<Offset> {
        self.next
    }

    fn set_next(&mut self, next: Option<Offset>) {
        self.next = next;
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::SIZE];
        encode_name(&self.name, &mut buf[..NAME_FIELD_LEN]);
        put_u64(&mut buf, 32, self.size);
        put_u16(&mut buf, 40, self.mode.bits());
        put_u32(&mut buf, 44, self.uid);
        put_u32(&mut buf, 48, self.gid);
        put_link(&mut buf, 56, self.data.map(|d| d.offset));
        put_u64(&mut buf, 64, self.capacity());
        put_link(&mut buf, 72, self.next);
        buf
    }

    fn decode(buf: &[u8], at: Offset) -> Result<Self> {
        let name = decode_name(&buf[..NAME_FIELD_LEN], at)?;
        let size = read_u64(buf, 32, at)?;
        let mode = FileMode::new(read_u16(buf, 40, at)?)
            .map_err(|_| StoreError::corrupt(at, format!("file '{name}' has malformed mode")))?;
        let capacity = read_u64(buf, 64, at)?;
        let data = read_link(buf, 56, at)?.map(|offset| Extent::new(offset, capacity));
        if size > data.map_or(0, |d| d.len) {
            return Err(StoreError::corrupt(
                at,
                format!("file '{name}' size {size} exceeds its data region"),
            ));
        }

        Ok(Self {
            name,
            size,
            mode,
            uid: read_u32(buf, 44, at)?,
            gid: read_u32(buf, 48, at)?,
            data,
            next: read_link(buf, 72, at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let mut rec = FileRecord::new("a.txt", 5, 9);
        rec.size = 5;
        rec.data = Some(Extent::new(8192, 4096));
        rec.next = Some(12288);

        let buf = rec.encode();
        assert_eq!(buf.len(), FileRecord::SIZE);
        assert_eq!(&buf[..5], b"a.txt");
        assert_eq!(u16::from_le_bytes([buf[40], buf[41]]), 0o644);
        assert_eq!(FileRecord::decode(&buf, 0).unwrap(), rec);
    }

    #[test]
    fn test_no_region_is_nil() {
        let rec = FileRecord::new("empty", 0, 0);
        let buf = rec.encode();
        assert_eq!(&buf[56..64], &[0xff; 8]);

        let back = FileRecord::decode(&buf, 0).unwrap();
        assert_eq!(back.data, None);
        assert_eq!(back.capacity(), 0);
    }

    #[test]
    fn test_size_beyond_region_is_corrupt() {
        let mut rec = FileRecord::new("x", 0, 0);
        rec.size = 10;
        let buf = rec.encode();
        assert!(FileRecord::decode(&buf, 64).unwrap_err().is_corrupt());
    }
}
