//! Error types for the block store.
//!
//! Every component returns [`StoreError`] to its caller; nothing is retried,
//! since a single actor never meets transient contention. Presenting a
//! failure to a person is the front-end's job.

use core::fmt;

use thiserror::Error;

use super::types::{Offset, Ownership, Uid};

/// What an authorization check demanded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requirement {
    /// Read right through the mode triplets
    Read,
    /// Write right through the mode triplets
    Write,
    /// Execute right through the mode triplets
    Execute,
    /// Must own the record (or be root)
    Owner,
    /// Must be root
    Root,
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Requirement::Read => "read",
            Requirement::Write => "write",
            Requirement::Execute => "execute",
            Requirement::Owner => "ownership",
            Requirement::Root => "root",
        })
    }
}

/// Context of a refused request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Denial {
    /// Who asked
    pub uid: Uid,
    /// What was required
    pub required: Requirement,
    /// The protected record, when one was involved
    pub target: Option<Ownership>,
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uid {} lacks {}", self.uid, self.required)?;
        if let Some(target) = &self.target {
            write!(
                f,
                " on record owned by {}:{} mode {:03o}",
                target.uid,
                target.gid,
                target.mode.bits()
            )?;
        }
        Ok(())
    }
}

/// Errors from block store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Host I/O failure on the backing store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Format tag mismatch or structurally invalid metadata.
    ///
    /// The store cannot be used until it is reformatted.
    #[error("corrupt store at offset {offset:#x}: {detail}")]
    CorruptStore { offset: Offset, detail: String },

    /// The allocator has no run or chunk large enough.
    #[error("out of space: no free region of {requested} bytes")]
    OutOfSpace { requested: u64 },

    /// Name lookup missed.
    #[error("not found: {0}")]
    NotFound(String),

    /// Name collision on create.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The permission evaluator refused the request.
    #[error("permission denied: {0}")]
    PermissionDenied(Denial),

    /// Malformed names, modes, ranges or sizes.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// File I/O attempted without a bound file.
    #[error("no open file")]
    NoOpenFile,

    /// Unusable configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Create a corrupt store error.
    pub fn corrupt(offset: Offset, detail: impl Into<String>) -> Self {
        Self::CorruptStore {
            offset,
            detail: detail.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create an already exists error.
    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists(what.into())
    }

    /// Create a permission denied error.
    pub fn denied(uid: Uid, required: Requirement, target: Option<Ownership>) -> Self {
        Self::PermissionDenied(Denial {
            uid,
            required,
            target,
        })
    }

    /// Check if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// Check if this is a permission error.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, StoreError::PermissionDenied(_))
    }

    /// Check if this error leaves the store unusable.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, StoreError::CorruptStore { .. })
    }
}

/// Result alias using [`StoreError`].
pub type Result<T> = std::result::Result<T, StoreError>;
