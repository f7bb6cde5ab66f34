//! Little-endian field helpers for fixed-layout records.

use super::error::{Result, StoreError};
use super::types::Offset;

/// On-disk encoding of "no offset".
pub const NIL: u64 = u64::MAX;

#[inline]
fn field<const N: usize>(buf: &[u8], pos: usize, at: Offset) -> Result<[u8; N]> {
    let Some(bytes) = pos.checked_add(N).and_then(|end| buf.get(pos..end)) else {
        return Err(StoreError::corrupt(
            at,
            format!("record truncated: need {N} bytes at +{pos}, have {}", buf.len()),
        ));
    };
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

#[inline]
pub fn read_u16(buf: &[u8], pos: usize, at: Offset) -> Result<u16> {
    field::<2>(buf, pos, at).map(u16::from_le_bytes)
}

#[inline]
pub fn read_u32(buf: &[u8], pos: usize, at: Offset) -> Result<u32> {
    field::<4>(buf, pos, at).map(u32::from_le_bytes)
}

#[inline]
pub fn read_u64(buf: &[u8], pos: usize, at: Offset) -> Result<u64> {
    field::<8>(buf, pos, at).map(u64::from_le_bytes)
}

/// Read an offset field, mapping [`NIL`] to `None`.
#[inline]
pub fn read_link(buf: &[u8], pos: usize, at: Offset) -> Result<Option<Offset>> {
    read_u64(buf, pos, at).map(|raw| (raw != NIL).then_some(raw))
}

#[inline]
pub fn put_u16(buf: &mut [u8], pos: usize, value: u16) {
    buf[pos..pos + 2].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub fn put_u32(buf: &mut [u8], pos: usize, value: u32) {
    buf[pos..pos + 4].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub fn put_u64(buf: &mut [u8], pos: usize, value: u64) {
    buf[pos..pos + 8].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub fn put_link(buf: &mut [u8], pos: usize, link: Option<Offset>) {
    put_u64(buf, pos, link.unwrap_or(NIL));
}

/// Round `value` up to a multiple of `align` (a power of two).
#[inline]
pub fn align_up(value: u64, align: u64) -> Option<u64> {
    debug_assert!(align.is_power_of_two());
    value.checked_add(align - 1).map(|v| v & !(align - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_links() {
        let mut buf = [0u8; 16];
        put_link(&mut buf, 0, None);
        put_link(&mut buf, 8, Some(4096));
        assert_eq!(read_link(&buf, 0, 0).unwrap(), None);
        assert_eq!(read_link(&buf, 8, 0).unwrap(), Some(4096));
    }

    #[test]
    fn test_truncated_read_is_corrupt() {
        let buf = [0u8; 6];
        assert_eq!(read_u32(&buf, 2, 0).unwrap(), 0);
        assert!(read_u64(&buf, 0, 0).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 8), Some(0));
        assert_eq!(align_up(1, 8), Some(8));
        assert_eq!(align_up(72, 8), Some(72));
        assert_eq!(align_up(u64::MAX, 8), None);
    }
}
