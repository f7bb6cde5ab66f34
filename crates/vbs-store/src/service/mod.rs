//! Store service trait and permission checking

mod permissions;
mod trait_def;

pub use permissions::{
    check_access, check_read, check_write, require_access, require_owner, require_root,
    PermissionContext,
};
pub use trait_def::StoreService;
