//! The acting identity and its single open-file binding.
//!
//! A session is an explicit value owned by its store, so independent stores
//! never share identity state.

use crate::catalog::FileRecord;
use crate::core::{Gid, Identity, Offset, ROOT_GID, ROOT_NAME, ROOT_UID};
use crate::service::PermissionContext;

/// A bound file: its catalog offset and an in-memory copy of its record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenFile {
    pub offset: Offset,
    pub record: FileRecord,
}

#[derive(Debug)]
pub struct Session {
    identity: Identity,
    /// Cached memberships, reloaded on every identity switch
    groups: Vec<Gid>,
    open: Option<OpenFile>,
}

impl Session {
    /// Session acting as the root identity.
    pub fn root() -> Self {
        Self {
            identity: Identity {
                uid: ROOT_UID,
                gid: ROOT_GID,
                name: ROOT_NAME.to_owned(),
            },
            groups: vec![ROOT_GID],
            open: None,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn groups(&self) -> &[Gid] {
        &self.groups
    }

    pub fn permission_context(&self) -> PermissionContext<'_> {
        PermissionContext::user(self.identity.uid, self.identity.gid, &self.groups)
    }

    /// Act as a different identity. Releases any open file.
    pub fn switch_identity(&mut self, identity: Identity, groups: Vec<Gid>) {
        self.open = None;
        self.identity = identity;
        self.groups = groups;
    }

    /// Replace the cached memberships without touching the binding.
    pub fn refresh_groups(&mut self, gid: Gid, groups: Vec<Gid>) {
        self.identity.gid = gid;
        self.groups = groups;
    }

    /// Bind `record` as the open file, replacing any prior binding.
    pub fn bind(&mut self, offset: Offset, record: FileRecord) {
        self.open = Some(OpenFile { offset, record });
    }

    pub fn release(&mut self) -> Option<OpenFile> {
        self.open.take()
    }

    pub fn open_file(&self) -> Option<&OpenFile> {
        self.open.as_ref()
    }

    /// The bound file, if it lives at `offset`.
    pub fn open_at_mut(&mut self, offset: Offset) -> Option<&mut OpenFile> {
        self.open.as_mut().filter(|f| f.offset == offset)
    }

    pub fn is_open_at(&self, offset: Offset) -> bool {
        self.open.as_ref().is_some_and(|f| f.offset == offset)
    }
}
