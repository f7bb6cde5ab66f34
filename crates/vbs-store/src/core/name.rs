//! Name utilities for the block store.
//!
//! Names live in fixed 32-byte, NUL-padded fields. Overlong names are
//! rejected, never truncated, so two distinct names can never collide on disk.

use super::error::{Result, StoreError};
use super::types::Offset;

/// Width of an on-disk name field.
pub const NAME_FIELD_LEN: usize = 32;

/// Longest accepted name in bytes (one byte stays NUL).
pub const MAX_NAME_LEN: usize = NAME_FIELD_LEN - 1;

/// Validate that a name can be stored.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StoreError::invalid_argument("empty name"));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(StoreError::invalid_argument(format!(
            "name '{name}' is {} bytes, limit is {MAX_NAME_LEN}",
            name.len()
        )));
    }

    if name.contains('\0') {
        return Err(StoreError::invalid_argument("name contains null character"));
    }

    // Flat namespace: no directories.
    if name.contains('/') {
        return Err(StoreError::invalid_argument(format!(
            "name '{name}' contains '/'"
        )));
    }

    Ok(())
}

/// Encode a validated name into its fixed field.
pub fn encode_name(name: &str, field: &mut [u8]) {
    debug_assert_eq!(field.len(), NAME_FIELD_LEN);
    field.fill(0);
    let len = name.len().min(MAX_NAME_LEN);
    field[..len].copy_from_slice(&name.as_bytes()[..len]);
}

/// Decode a NUL-padded name field read from `at`.
pub fn decode_name(field: &[u8], at: Offset) -> Result<String> {
    let end = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    if end == 0 {
        return Err(StoreError::corrupt(at, "empty name field"));
    }
    let text = core::str::from_utf8(&field[..end])
        .map_err(|_| StoreError::corrupt(at, "name field is not UTF-8"))?;
    Ok(text.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("a.txt").is_ok());
        assert!(validate_name(&"x".repeat(MAX_NAME_LEN)).is_ok());

        assert!(validate_name("").is_err());
        assert!(validate_name(&"x".repeat(MAX_NAME_LEN + 1)).is_err());
        assert!(validate_name("a\0b").is_err());
        assert!(validate_name("dir/file").is_err());
    }

    #[test]
    fn test_name_field() {
        let mut field = [0xAAu8; NAME_FIELD_LEN];
        encode_name("alice", &mut field);
        assert_eq!(&field[..5], b"alice");
        assert!(field[5..].iter().all(|b| *b == 0));
        assert_eq!(decode_name(&field, 0).unwrap(), "alice");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let field = [0u8; NAME_FIELD_LEN];
        assert!(decode_name(&field, 64).unwrap_err().is_corrupt());

        let mut field = [0u8; NAME_FIELD_LEN];
        field[0] = 0xFF;
        assert!(decode_name(&field, 64).unwrap_err().is_corrupt());
    }
}
