//! Storage statistics for the block store.
//!
//! Plain data; rendering is left to front-ends.

use serde::{Deserialize, Serialize};

use crate::alloc::AllocUsage;
use crate::config::AllocatorKind;
use crate::core::{Gid, Uid};

/// Aggregate space and catalog statistics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Allocator the store was formatted with
    pub allocator: AllocatorKind,

    /// Backing store size in bytes
    pub capacity: u64,

    /// Bytes per allocation unit (block size, or 1 for the free list)
    pub unit_size: u64,

    /// Units managed by the allocator
    pub total_units: u64,

    /// Units in use, including metadata
    pub used_units: u64,

    /// Units available
    pub free_units: u64,

    /// Free bytes
    pub free_bytes: u64,

    /// Runs of free blocks or free chunks
    pub free_extents: u64,

    /// Live files
    pub file_count: u32,

    /// Current identity
    pub uid: Uid,
    pub gid: Gid,
}

impl StoreStats {
    pub(crate) fn new(
        allocator: AllocatorKind,
        capacity: u64,
        usage: AllocUsage,
        file_count: u32,
        uid: Uid,
        gid: Gid,
    ) -> Self {
        Self {
            allocator,
            capacity,
            unit_size: usage.unit,
            total_units: usage.total_units,
            used_units: usage.used_units(),
            free_units: usage.free_units,
            free_bytes: usage.free_bytes(),
            free_extents: usage.free_extents,
            file_count,
            uid,
            gid,
        }
    }

    /// Share of units in use, in percent.
    pub fn used_percent(&self) -> f64 {
        if self.total_units == 0 {
            return 0.0;
        }
        self.used_units as f64 * 100.0 / self.total_units as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_from_usage() {
        let usage = AllocUsage {
            unit: 4096,
            total_units: 100,
            free_units: 75,
            free_extents: 3,
        };
        let stats = StoreStats::new(AllocatorKind::Bitmap, 409_600, usage, 2, 0, 0);
        assert_eq!(stats.used_units, 25);
        assert_eq!(stats.free_bytes, 75 * 4096);
        assert_eq!(stats.used_percent(), 25.0);
    }

    #[test]
    fn test_stats_serialize() {
        let stats = StoreStats::new(AllocatorKind::FreeList, 4096, AllocUsage::default(), 0, 3, 3);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["allocator"], "free_list");
        assert_eq!(json["uid"], 3);
    }
}
