//! Virtual Block Store
//!
//! A single-file, single-session block storage engine. All metadata (the
//! Root Record, allocator state, and the file, user and group catalogs)
//! lives inside one fixed-size backing store:
//!
//! - **Device**: the [`BackingStore`] trait, file-backed and in-memory
//! - **Layout**: the Root Record at offset 0
//! - **Alloc**: bitmap and free-list space allocators
//! - **Catalog**: offset-linked record lists and the file-name index
//! - **Service**: the [`StoreService`] trait and permission evaluator
//! - **Store**: the [`BlockStore`] engine and its [`Session`]
//! - **Bootstrap**: format on first use, validate on reopen
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         BlockStore                           │
//! │   Session (uid, gid, groups, open file)                      │
//! │        │                                                     │
//! │        ▼                                                     │
//! │   Catalog lookup ──► Permission evaluator ──► Mutation       │
//! │                                                 │            │
//! │        ┌────────────────────────────────────────┤            │
//! │        ▼                    ▼                   ▼            │
//! │   Root Record        Space allocator      Catalog records    │
//! │   (offset 0)         (bitmap | free list) (files/users/groups)│
//! └────────────────────────────┬─────────────────────────────────┘
//!                              ▼
//!                        BackingStore
//! ```
//!
//! # Example
//!
//! ```
//! use vbs_store::testing::MemoryBackingStore;
//! use vbs_store::{bootstrap_store, StoreConfig, StoreService};
//!
//! let mut store = bootstrap_store(MemoryBackingStore::new(1 << 20), &StoreConfig::default())?;
//! store.create_user("alice", None)?;
//! store.login("alice")?;
//! store.open("a.txt", true)?;
//! store.write(0, b"hello")?;
//! assert_eq!(store.read(0, 5)?, b"hello");
//! # Ok::<(), vbs_store::StoreError>(())
//! ```

pub mod alloc;
pub mod catalog;
pub mod config;
pub mod core;
pub mod device;
pub mod layout;
pub mod service;
pub mod testing;

pub mod bootstrap;
pub mod session;
pub mod storage;
pub mod store;

// Convenient re-exports at crate root
pub use alloc::{AllocUsage, Allocator, BitmapAllocator, Extent, FreeListAllocator, SpaceAllocator};
pub use bootstrap::{bootstrap_from_config, bootstrap_store, format_store, load_store};
pub use config::{AllocatorKind, IndexKind, StoreConfig};
pub use crate::core::{validate_name, MAX_NAME_LEN};
pub use crate::core::{
    Access, Denial, FileInfo, FileMode, Gid, GroupInfo, Identity, Offset, Ownership, Requirement,
    Result, StoreError, Uid, UserInfo,
};
pub use device::{BackingStore, FileBackingStore};
pub use service::{check_read, check_write, PermissionContext, StoreService};
pub use session::Session;
pub use storage::StoreStats;
pub use store::BlockStore;
