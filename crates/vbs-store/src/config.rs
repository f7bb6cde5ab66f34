//! Store configuration.
//!
//! Loaded from JSON so front-ends can keep it next to the backing file:
//!
//! ```json
//! { "path": "filesys.db", "allocator": "free_list", "capacity": 1048576 }
//! ```
//!
//! Missing fields take their defaults. Geometry only matters when a store is
//! formatted; on reopen the Root Record wins.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::{Result, StoreError};
use crate::layout::{BITMAP_MIN_BLOCK_SIZE, FREE_LIST_MIN_CAPACITY};

/// Default bitmap store size (128 MiB).
pub const DEFAULT_BITMAP_CAPACITY: u64 = 128 * 1024 * 1024;

/// Default free-list store size (1 MiB).
pub const DEFAULT_FREE_LIST_CAPACITY: u64 = 1024 * 1024;

/// Default allocation block size.
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

/// Space allocator variant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocatorKind {
    /// Fixed blocks tracked by a bitmap, first-fit over contiguous runs
    #[default]
    Bitmap,
    /// Variable chunks on an in-place free list, first-fit with splitting
    FreeList,
}

impl AllocatorKind {
    pub(crate) fn tag(self) -> u8 {
        match self {
            AllocatorKind::Bitmap => 0,
            AllocatorKind::FreeList => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(AllocatorKind::Bitmap),
            1 => Some(AllocatorKind::FreeList),
            _ => None,
        }
    }
}

/// How file names are resolved to catalog offsets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Walk the linked catalog on every lookup
    #[default]
    Scan,
    /// Keep a name -> offset map in memory, built at load time
    Memory,
}

/// Configuration for opening or formatting a store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Backing file path
    pub path: PathBuf,

    /// Store size in bytes; `None` picks the allocator's default
    pub capacity: Option<u64>,

    /// Allocation unit for the bitmap allocator
    pub block_size: u32,

    /// Allocator used when formatting
    pub allocator: AllocatorKind,

    /// File-name lookup strategy
    pub index: IndexKind,

    /// Flush the backing store at the end of every mutating operation
    pub sync: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("filesys.db"),
            capacity: None,
            block_size: DEFAULT_BLOCK_SIZE,
            allocator: AllocatorKind::Bitmap,
            index: IndexKind::Scan,
            sync: true,
        }
    }
}

impl StoreConfig {
    /// Parse a JSON configuration.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| StoreError::Config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    /// Store size to format with.
    pub fn effective_capacity(&self) -> u64 {
        self.capacity.unwrap_or(match self.allocator {
            AllocatorKind::Bitmap => DEFAULT_BITMAP_CAPACITY,
            AllocatorKind::FreeList => DEFAULT_FREE_LIST_CAPACITY,
        })
    }

    /// Reject geometry no store could be formatted with.
    pub fn validate(&self) -> Result<()> {
        let capacity = self.effective_capacity();
        match self.allocator {
            AllocatorKind::Bitmap => {
                let bs = u64::from(self.block_size);
                if !self.block_size.is_power_of_two() || self.block_size < BITMAP_MIN_BLOCK_SIZE {
                    return Err(StoreError::Config(format!(
                        "block_size {} must be a power of two >= {BITMAP_MIN_BLOCK_SIZE}",
                        self.block_size
                    )));
                }
                if capacity % bs != 0 {
                    return Err(StoreError::Config(format!(
                        "capacity {capacity} is not a multiple of block_size {bs}"
                    )));
                }
                // Root block, one bitmap block, and room for the root identity.
                if capacity / bs < 8 {
                    return Err(StoreError::Config(format!(
                        "capacity {capacity} holds fewer than 8 blocks"
                    )));
                }
            }
            AllocatorKind::FreeList => {
                if capacity < FREE_LIST_MIN_CAPACITY {
                    return Err(StoreError::Config(format!(
                        "capacity {capacity} is below the free-list minimum {FREE_LIST_MIN_CAPACITY}"
                    )));
                }
            }
        }
        Ok(())
    }
}
