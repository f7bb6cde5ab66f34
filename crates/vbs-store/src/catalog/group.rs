//! Group catalog records: name (32), gid (4), pad (4), next (8).

use super::Record;
use crate::core::codec::{put_link, put_u32, read_link, read_u32};
use crate::core::{decode_name, encode_name, Gid, GroupInfo, Offset, Result, NAME_FIELD_LEN};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupRecord {
    pub name: String,
    pub gid: Gid,
    pub next: Option<Offset>,
}

impl GroupRecord {
    pub fn new(name: &str, gid: Gid) -> Self {
        Self {
            name: name.to_owned(),
            gid,
            next: None,
        }
    }

    pub fn info(&self) -> GroupInfo {
        GroupInfo {
            gid: self.gid,
            name: self.name.clone(),
        }
    }
}

impl Record for GroupRecord {
    const SIZE: usize = 48;
    const KIND: &'static str = "group";

    fn name(&self) -> &str {
        &self.name
    }

    fn next(&self) -> Option<Offset> {
        self.next
    }

    fn set_next(&mut self, next: Option<Offset>) {
        self.next = next;
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::SIZE];
        encode_name(&self.name, &mut buf[..NAME_FIELD_LEN]);
        put_u32(&mut buf, 32, self.gid);
        put_link(&mut buf, 40, self.next);
        buf
    }

    fn decode(buf: &[u8], at: Offset) -> Result<Self> {
        Ok(Self {
            name: decode_name(&buf[..NAME_FIELD_LEN], at)?,
            gid: read_u32(buf, 32, at)?,
            next: read_link(buf, 40, at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let mut rec = GroupRecord::new("staff", 4);
        rec.next = Some(4096);
        let buf = rec.encode();
        assert_eq!(buf.len(), 48);
        assert_eq!(GroupRecord::decode(&buf, 0).unwrap(), rec);
    }

    #[test]
    fn test_zeroed_record_is_corrupt() {
        assert!(GroupRecord::decode(&[0u8; 48], 512).unwrap_err().is_corrupt());
    }
}
