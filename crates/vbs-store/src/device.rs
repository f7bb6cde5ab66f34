//! Backing store: one fixed-size, random-access byte region.
//!
//! Everything the store knows lives inside this region and is located by
//! byte offset. Implementations must make a completed `write_all_at`
//! visible to every later `read_exact_at`; `flush` pushes it to stable
//! storage.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core::{Offset, Result, StoreError};

/// Byte-addressed persistent region with pread/pwrite semantics.
pub trait BackingStore {
    /// Total length in bytes. Never changes after creation.
    fn len(&self) -> u64;

    /// Read exactly `buf.len()` bytes starting at `offset`.
    fn read_exact_at(&self, offset: Offset, buf: &mut [u8]) -> Result<()>;

    /// Write all of `buf` starting at `offset`.
    fn write_all_at(&self, offset: Offset, buf: &[u8]) -> Result<()>;

    /// Flush completed writes to stable storage.
    fn flush(&self) -> Result<()>;

    /// Check that `[offset, offset + len)` lies inside the region.
    fn check_range(&self, offset: Offset, len: usize) -> Result<()> {
        let end = u64::try_from(len)
            .ok()
            .and_then(|len| offset.checked_add(len))
            .ok_or_else(|| StoreError::invalid_argument("byte range overflows u64"))?;
        if end > self.len() {
            return Err(StoreError::invalid_argument(format!(
                "range {offset:#x}+{len} beyond store end {:#x}",
                self.len()
            )));
        }
        Ok(())
    }

    /// Overwrite `[offset, offset + len)` with zeroes.
    fn zero_range(&self, offset: Offset, len: u64) -> Result<()> {
        const CHUNK: u64 = 64 * 1024;
        let zeros = vec![0u8; CHUNK.min(len) as usize];
        let mut done = 0u64;
        while done < len {
            let step = CHUNK.min(len - done);
            self.write_all_at(offset + done, &zeros[..step as usize])?;
            done += step;
        }
        Ok(())
    }
}

impl<T: BackingStore + ?Sized> BackingStore for &T {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn read_exact_at(&self, offset: Offset, buf: &mut [u8]) -> Result<()> {
        (**self).read_exact_at(offset, buf)
    }

    fn write_all_at(&self, offset: Offset, buf: &[u8]) -> Result<()> {
        (**self).write_all_at(offset, buf)
    }

    fn flush(&self) -> Result<()> {
        (**self).flush()
    }
}

/// File-backed region using positioned reads and writes.
#[derive(Debug)]
pub struct FileBackingStore {
    file: File,
    path: PathBuf,
    len: u64,
}

impl FileBackingStore {
    /// Open `path`, creating and zero-extending it to `capacity` bytes if it
    /// does not exist yet. An existing file keeps its own length.
    pub fn open_or_create(path: impl AsRef<Path>, capacity: u64) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut len = file.metadata()?.len();
        if len == 0 {
            if capacity == 0 {
                return Err(StoreError::Config(String::from("capacity must be non-zero")));
            }
            file.set_len(capacity)?;
            file.sync_all()?;
            len = capacity;
            info!(path = %path.display(), capacity, "created backing store");
        } else {
            debug!(path = %path.display(), len, "opened backing store");
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
            len,
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BackingStore for FileBackingStore {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_exact_at(&self, offset: Offset, buf: &mut [u8]) -> Result<()> {
        self.check_range(offset, buf.len())?;
        self.file.read_exact_at(buf, offset)?;
        Ok(())
    }

    fn write_all_at(&self, offset: Offset, buf: &[u8]) -> Result<()> {
        self.check_range(offset, buf.len())?;
        self.file.write_all_at(buf, offset)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_zero_extended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.img");

        let store = FileBackingStore::open_or_create(&path, 8192).unwrap();
        assert_eq!(store.len(), 8192);

        let mut buf = [0xFFu8; 16];
        store.read_exact_at(8192 - 16, &mut buf).unwrap();
        assert!(buf.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_file_store_reopen_keeps_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.img");

        {
            let store = FileBackingStore::open_or_create(&path, 4096).unwrap();
            store.write_all_at(100, b"persist").unwrap();
            store.flush().unwrap();
        }

        // Capacity argument is ignored for an existing file.
        let store = FileBackingStore::open_or_create(&path, 1 << 20).unwrap();
        assert_eq!(store.len(), 4096);
        let mut buf = [0u8; 7];
        store.read_exact_at(100, &mut buf).unwrap();
        assert_eq!(&buf, b"persist");
    }

    #[test]
    fn test_file_store_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackingStore::open_or_create(dir.path().join("d"), 1024).unwrap();

        assert!(store.write_all_at(1020, b"12345").is_err());
        assert!(store.write_all_at(1019, b"12345").is_ok());
        let mut buf = [0u8; 2];
        assert!(store.read_exact_at(u64::MAX, &mut buf).is_err());
    }
}
