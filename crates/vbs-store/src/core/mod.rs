//! Core store types and utilities

pub(crate) mod codec;
mod error;
mod name;
mod types;

pub use error::{Denial, Requirement, Result, StoreError};
pub use name::{decode_name, encode_name, validate_name, MAX_NAME_LEN, NAME_FIELD_LEN};
pub use types::{
    Access, Class, FileInfo, FileMode, GroupInfo, Identity, Offset, Ownership, UserInfo, Gid, Uid,
    ROOT_GID, ROOT_NAME, ROOT_UID,
};
