//! In-memory backing store for testing.
//!
//! Provides a `Vec`-backed region that doesn't persist data, so every test
//! can run its own independent store.

use std::cell::{Cell, RefCell};

use crate::core::{Offset, Result};
use crate::device::BackingStore;

/// In-memory backing store for testing.
#[derive(Debug)]
pub struct MemoryBackingStore {
    /// Region contents
    bytes: RefCell<Vec<u8>>,
    /// Number of `flush` calls observed
    flushes: Cell<u64>,
}

impl MemoryBackingStore {
    /// Create a zero-filled region of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: RefCell::new(vec![0u8; capacity]),
            flushes: Cell::new(0),
        }
    }

    /// Wrap existing bytes, e.g. a snapshot taken earlier.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: RefCell::new(bytes),
            flushes: Cell::new(0),
        }
    }

    /// Copy of the whole region.
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.borrow().clone()
    }

    /// How many times the region was flushed.
    pub fn flush_count(&self) -> u64 {
        self.flushes.get()
    }
}

impl BackingStore for MemoryBackingStore {
    fn len(&self) -> u64 {
        self.bytes.borrow().len() as u64
    }

    fn read_exact_at(&self, offset: Offset, buf: &mut [u8]) -> Result<()> {
        self.check_range(offset, buf.len())?;
        let start = offset as usize;
        buf.copy_from_slice(&self.bytes.borrow()[start..start + buf.len()]);
        Ok(())
    }

    fn write_all_at(&self, offset: Offset, buf: &[u8]) -> Result<()> {
        self.check_range(offset, buf.len())?;
        let start = offset as usize;
        self.bytes.borrow_mut()[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.flushes.set(self.flushes.get() + 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write() {
        let store = MemoryBackingStore::new(64);
        store.write_all_at(10, b"hello").unwrap();

        let mut buf = [0u8; 5];
        store.read_exact_at(10, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn test_out_of_range() {
        let store = MemoryBackingStore::new(64);
        assert!(store.write_all_at(60, b"hello").is_err());

        let mut buf = [0u8; 8];
        assert!(store.read_exact_at(57, &mut buf).is_err());
    }

    #[test]
    fn test_zero_range() {
        let store = MemoryBackingStore::from_bytes(vec![0xAB; 128]);
        store.zero_range(16, 32).unwrap();

        let bytes = store.snapshot();
        assert!(bytes[16..48].iter().all(|b| *b == 0));
        assert_eq!(bytes[15], 0xAB);
        assert_eq!(bytes[48], 0xAB);
    }

    #[test]
    fn test_flush_count() {
        let store = MemoryBackingStore::new(8);
        store.flush().unwrap();
        store.flush().unwrap();
        assert_eq!(store.flush_count(), 2);
    }
}
