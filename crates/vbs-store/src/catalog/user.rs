//! User catalog records.
//!
//! ```text
//! offset  size  field
//! 0       32    name (NUL-padded)
//! 32      4     uid
//! 36      32    group slots, 8 x u32 (u32::MAX = empty, slot 0 = primary)
//! 68      4     pad
//! 72      8     next
//! ```

use super::Record;
use crate::core::codec::{put_link, put_u32, read_link, read_u32};
use crate::core::{
    decode_name, encode_name, Gid, Offset, Result, StoreError, Uid, UserInfo, NAME_FIELD_LEN,
};

/// Group memberships a user can hold.
pub const GROUP_SLOTS: usize = 8;

const EMPTY_SLOT: u32 = u32::MAX;
const SLOTS_POS: usize = 36;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserRecord {
    pub name: String,
    pub uid: Uid,
    pub groups: [Option<Gid>; GROUP_SLOTS],
    pub next: Option<Offset>,
}

impl UserRecord {
    pub fn new(name: &str, uid: Uid, primary: Gid) -> Self {
        let mut groups = [None; GROUP_SLOTS];
        groups[0] = Some(primary);
        Self {
            name: name.to_owned(),
            uid,
            groups,
            next: None,
        }
    }

    /// Slot 0.
    pub fn primary_gid(&self) -> Option<Gid> {
        self.groups[0]
    }

    /// Occupied slots in slot order.
    pub fn memberships(&self) -> Vec<Gid> {
        self.groups.iter().flatten().copied().collect()
    }

    pub fn is_member(&self, gid: Gid) -> bool {
        self.groups.contains(&Some(gid))
    }

    /// Put `gid` in the first empty slot. Returns `false` if already a member.
    pub fn add_group(&mut self, gid: Gid) -> Result<bool> {
        if self.is_member(gid) {
            return Ok(false);
        }
        let slot = self.groups.iter_mut().find(|s| s.is_none()).ok_or_else(|| {
            StoreError::invalid_argument(format!(
                "user '{}' already belongs to {GROUP_SLOTS} groups",
                self.name
            ))
        })?;
        *slot = Some(gid);
        Ok(true)
    }

    pub fn info(&self) -> UserInfo {
        UserInfo {
            uid: self.uid,
            name: self.name.clone(),
            groups: self.memberships(),
        }
    }
}

impl Record for UserRecord {
    const SIZE: usize = 80;
    const KIND: &'static str = "user";

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
        put_u32(&mut buf, 32, self.uid);
        for (i, slot) in self.groups.iter().enumerate() {
            put_u32(&mut buf, SLOTS_POS + 4 * i, slot.unwrap_or(EMPTY_SLOT));
        }
        put_link(&mut buf, 72, self.next);
        buf
    }

    fn decode(buf: &[u8], at: Offset) -> Result<Self> {
        let mut groups = [None; GROUP_SLOTS];
        for (i, slot) in groups.iter_mut().enumerate() {
            let raw = read_u32(buf, SLOTS_POS + 4 * i, at)?;
            *slot = (raw != EMPTY_SLOT).then_some(raw);
        }
        if groups[0].is_none() {
            return Err(StoreError::corrupt(at, "user record without a primary group"));
        }
        Ok(Self {
            name: decode_name(&buf[..NAME_FIELD_LEN], at)?,
            uid: read_u32(buf, 32, at)?,
            groups,
            next: read_link(buf, 72, at)?,
        })
    }
}
