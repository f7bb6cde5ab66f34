//! Permission checking for store records.

use crate::core::{
    Access, Class, Gid, Ownership, Requirement, Result, StoreError, Uid, ROOT_GID, ROOT_UID,
};

/// Permission check context.
#[derive(Clone, Copy, Debug)]
pub struct PermissionContext<'a> {
    /// Requesting user
    pub uid: Uid,
    /// Requesting user's primary group
    pub gid: Gid,
    /// Cached group memberships
    pub groups: &'a [Gid],
}

impl<'a> PermissionContext<'a> {
    /// Create a root context.
    pub fn root() -> Self {
        Self {
            uid: ROOT_UID,
            gid: ROOT_GID,
            groups: &[],
        }
    }

    /// Create a user context.
    pub fn user(uid: Uid, gid: Gid, groups: &'a [Gid]) -> Self {
        Self { uid, gid, groups }
    }

    pub fn is_root(&self) -> bool {
        self.uid == ROOT_UID
    }

    /// Which triplet of `target`'s mode governs this requester.
    pub fn class_for(&self, target: &Ownership) -> Class {
        if self.uid == target.uid {
            Class::Owner
        } else if self.gid == target.gid || self.groups.contains(&target.gid) {
            Class::Group
        } else {
            Class::Other
        }
    }
}

/// Check if a context holds `access` on a record. Root always does.
pub fn check_access(target: &Ownership, ctx: &PermissionContext<'_>, access: Access) -> bool {
    ctx.is_root() || target.mode.allows(ctx.class_for(target), access)
}

/// Check if a context has read permission on a record.
pub fn check_read(target: &Ownership, ctx: &PermissionContext<'_>) -> bool {
    check_access(target, ctx, Access::Read)
}

/// Check if a context has write permission on a record.
pub fn check_write(target: &Ownership, ctx: &PermissionContext<'_>) -> bool {
    check_access(target, ctx, Access::Write)
}

/// Fail with `PermissionDenied` unless `ctx` holds `access` on `target`.
pub fn require_access(target: &Ownership, ctx: &PermissionContext<'_>, access: Access) -> Result<()> {
    if check_access(target, ctx, access) {
        return Ok(());
    }
    let required = match access {
        Access::Read => Requirement::Read,
        Access::Write => Requirement::Write,
        Access::Execute => Requirement::Execute,
    };
    Err(StoreError::denied(ctx.uid, required, Some(*target)))
}

/// Fail unless `ctx` owns `target` or is root.
pub fn require_owner(target: &Ownership, ctx: &PermissionContext<'_>) -> Result<()> {
    if ctx.is_root() || ctx.uid == target.uid {
        return Ok(());
    }
    Err(StoreError::denied(ctx.uid, Requirement::Owner, Some(*target)))
}

/// Fail unless `ctx` is root.
pub fn require_root(ctx: &PermissionContext<'_>) -> Result<()> {
    if ctx.is_root() {
        return Ok(());
    }
    Err(StoreError::denied(ctx.uid, Requirement::Root, None))
}
