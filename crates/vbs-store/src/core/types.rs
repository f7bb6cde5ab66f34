//! Core types for the block store.
//!
//! Defines identities, the permission mask, and the owned snapshots handed
//! back to front-ends.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::StoreError;

/// A numeric user identifier.
pub type Uid = u32;

/// A numeric group identifier.
pub type Gid = u32;

/// Byte offset into the backing store.
pub type Offset = u64;

/// The permanent superuser.
pub const ROOT_UID: Uid = 0;

/// The permanent superuser group.
pub const ROOT_GID: Gid = 0;

/// Name of the identity created at format time.
pub const ROOT_NAME: &str = "root";

/// A single right tested against a permission triplet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Read,
    Write,
    Execute,
}

impl Access {
    /// Bit pattern of this right inside one `rwx` triplet.
    pub const fn bits(self) -> u16 {
        match self {
            Access::Read => 0o4,
            Access::Write => 0o2,
            Access::Execute => 0o1,
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Access::Read => "read",
            Access::Write => "write",
            Access::Execute => "execute",
        })
    }
}

/// Which triplet of a mode applies to a requester.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Class {
    Owner,
    Group,
    Other,
}

impl Class {
    const fn shift(self) -> u16 {
        match self {
            Class::Owner => 6,
            Class::Group => 3,
            Class::Other => 0,
        }
    }
}

/// Unix-like `rwxrwxrwx` permission mask.
///
/// Only the low nine bits are meaningful; construction rejects anything else.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct FileMode(u16);

impl FileMode {
    /// All meaningful bits.
    pub const MASK: u16 = 0o777;

    /// Mode given to files created by `open(.., create = true)`:
    /// owner read/write, group and other read-only.
    pub const DEFAULT_FILE: FileMode = FileMode(0o644);

    /// Build a mode from its numeric (octal) value.
    pub fn new(bits: u16) -> Result<Self, StoreError> {
        if bits & !Self::MASK != 0 {
            return Err(StoreError::invalid_argument(format!(
                "malformed mode bits {bits:#o}"
            )));
        }
        Ok(Self(bits))
    }

    /// Numeric value of the mode.
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// The three bits governing `class`.
    pub const fn triplet(self, class: Class) -> u16 {
        (self.0 >> class.shift()) & 0o7
    }

    /// A triplet passes iff every required bit is present.
    pub const fn allows(self, class: Class, access: Access) -> bool {
        let required = access.bits();
        self.triplet(class) & required == required
    }
}

impl Default for FileMode {
    fn default() -> Self {
        Self::DEFAULT_FILE
    }
}

impl TryFrom<u16> for FileMode {
    type Error = StoreError;

    fn try_from(bits: u16) -> Result<Self, Self::Error> {
        Self::new(bits)
    }
}

impl From<FileMode> for u16 {
    fn from(mode: FileMode) -> Self {
        mode.0
    }
}

/// Accepts octal text such as `640`, `0640` or `0o640`.
impl FromStr for FileMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0o").unwrap_or(s);
        let bits = u16::from_str_radix(digits, 8)
            .map_err(|_| StoreError::invalid_argument(format!("malformed mode '{s}'")))?;
        Self::new(bits)
    }
}

/// Renders as `rw-r--r--`.
impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for class in [Class::Owner, Class::Group, Class::Other] {
            let t = self.triplet(class);
            let r = if t & 0o4 != 0 { 'r' } else { '-' };
            let w = if t & 0o2 != 0 { 'w' } else { '-' };
            let x = if t & 0o1 != 0 { 'x' } else { '-' };
            write!(f, "{r}{w}{x}")?;
        }
        Ok(())
    }
}

/// Owner, group and mode of a protected record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownership {
    pub uid: Uid,
    pub gid: Gid,
    pub mode: FileMode,
}

/// The identity a session is acting as.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: Uid,
    pub gid: Gid,
    pub name: String,
}

/// Metadata snapshot of one file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub mode: FileMode,
    pub uid: Uid,
    pub gid: Gid,
    /// Owner name, if the owning user still exists
    pub owner: Option<String>,
    /// Group name, if the owning group still exists
    pub group: Option<String>,
    /// Bytes reserved for content (0 until the first write)
    pub capacity: u64,
}

/// Snapshot of one user record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub uid: Uid,
    pub name: String,
    /// Group memberships, primary group first
    pub groups: Vec<Gid>,
}

/// Snapshot of one group record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub gid: Gid,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_triplets() {
        let mode = FileMode::new(0o640).unwrap();
        assert_eq!(mode.triplet(Class::Owner), 0o6);
        assert_eq!(mode.triplet(Class::Group), 0o4);
        assert_eq!(mode.triplet(Class::Other), 0o0);

        assert!(mode.allows(Class::Owner, Access::Write));
        assert!(mode.allows(Class::Group, Access::Read));
        assert!(!mode.allows(Class::Group, Access::Write));
        assert!(!mode.allows(Class::Other, Access::Read));
    }

    #[test]
    fn test_mode_rejects_high_bits() {
        assert!(FileMode::new(0o1777).is_err());
        assert!(FileMode::new(0o777).is_ok());
    }

    #[test]
    fn test_mode_parse_and_display() {
        let mode: FileMode = "0640".parse().unwrap();
        assert_eq!(mode.bits(), 0o640);
        assert_eq!(mode.to_string(), "rw-r-----");

        let mode: FileMode = "0o755".parse().unwrap();
        assert_eq!(mode.to_string(), "rwxr-xr-x");

        assert!("9".parse::<FileMode>().is_err());
        assert!("rw-".parse::<FileMode>().is_err());
    }

    #[test]
    fn test_default_file_mode() {
        assert_eq!(FileMode::default().bits(), 0o644);
    }

    #[test]
    fn test_mode_serde_rejects_malformed() {
        let ok: FileMode = serde_json::from_str("416").unwrap();
        assert_eq!(ok.bits(), 0o640);
        assert!(serde_json::from_str::<FileMode>("4096").is_err());
    }
}
