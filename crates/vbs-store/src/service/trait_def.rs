//! StoreService trait definition.

use crate::core::{FileInfo, FileMode, GroupInfo, Identity, Result, UserInfo};
use crate::storage::StoreStats;

/// Block store service interface.
///
/// Every call is synchronous: when a mutating call returns `Ok`, the
/// affected records, the allocator state and the Root Record are on the
/// backing store.
pub trait StoreService {
    // ========== Identity Operations ==========

    /// Create a user (root only). Without `group`, a private group of the
    /// same name is created and becomes the primary group.
    fn create_user(&mut self, name: &str, group: Option<&str>) -> Result<UserInfo>;

    /// Delete a user (root only). The root user cannot be deleted.
    fn delete_user(&mut self, name: &str) -> Result<()>;

    /// Create a group (root only).
    fn create_group(&mut self, name: &str) -> Result<GroupInfo>;

    /// Delete a group (root only). The root group cannot be deleted.
    fn delete_group(&mut self, name: &str) -> Result<()>;

    /// Add a user to a group (root only).
    fn add_user_to_group(&mut self, user: &str, group: &str) -> Result<()>;

    /// Act as `name` from now on. Releases any open file.
    fn login(&mut self, name: &str) -> Result<Identity>;

    /// The identity the session is acting as.
    fn whoami(&self) -> &Identity;

    /// All users, newest first.
    fn list_users(&self) -> Result<Vec<UserInfo>>;

    /// All groups, newest first.
    fn list_groups(&self) -> Result<Vec<GroupInfo>>;

    // ========== File Operations ==========

    /// Bind `name` as the open file, creating it if `create` is set.
    fn open(&mut self, name: &str, create: bool) -> Result<FileInfo>;

    /// Read up to `len` bytes of the open file from `offset`.
    fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>>;

    /// Write `data` at `offset` into the open file, returning the bytes
    /// actually stored. Writes past the data region are cut short.
    fn write(&mut self, offset: u64, data: &[u8]) -> Result<usize>;

    /// Shrink the open file to `new_size`. Never grows it.
    fn truncate(&mut self, new_size: u64) -> Result<()>;

    /// Delete a file and release its storage (owner or root).
    fn remove(&mut self, name: &str) -> Result<()>;

    /// Release the open-file binding, if any.
    fn close(&mut self);

    // ========== Metadata Operations ==========

    /// Change permissions (owner or root).
    fn chmod(&mut self, name: &str, mode: FileMode) -> Result<()>;

    /// Change owner and group (root only).
    fn chown(&mut self, name: &str, user: &str, group: &str) -> Result<()>;

    /// Change group (owner or root).
    fn chgrp(&mut self, name: &str, group: &str) -> Result<()>;

    /// Metadata of a file with owner and group names resolved.
    fn get_permissions(&self, name: &str) -> Result<FileInfo>;

    /// Metadata of every file, newest first.
    fn list_files(&self) -> Result<Vec<FileInfo>>;

    // ========== Statistics ==========

    /// Space and catalog statistics.
    fn stats(&self) -> Result<StoreStats>;
}
