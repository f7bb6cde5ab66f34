//! The block store engine.
//!
//! [`BlockStore`] ties the backing store, Root Record, allocator, catalogs
//! and session together and implements [`StoreService`]. Every request
//! resolves a catalog entry, passes the permission evaluator, then mutates
//! through the allocator and backing store. Mutations end by rewriting the
//! Root Record.
//!
//! Ordering rule for removals: the catalog is relinked and the Root Record
//! persisted before any storage is freed. A crash can leak space, but no
//! live record ever points at freed space.

use tracing::{debug, info, trace};

use crate::alloc::{Allocator, Extent, SpaceAllocator};
use crate::catalog::{self, CatalogIndex, FileRecord, Found, GroupRecord, Record, UserRecord};
use crate::config::{AllocatorKind, IndexKind};
use crate::core::{
    validate_name, Access, FileInfo, FileMode, Gid, GroupInfo, Identity, Offset, Result,
    StoreError, Uid, UserInfo, ROOT_GID, ROOT_NAME, ROOT_UID,
};
use crate::device::BackingStore;
use crate::layout::{write_root, RootRecord};
use crate::service::{require_access, require_owner, require_root, StoreService};
use crate::session::Session;
use crate::storage::StoreStats;

/// Where a new user's primary group comes from.
enum PrimaryGroup {
    Existing(Gid),
    /// Slot reserved for a group named after the user
    Private(Offset),
}

/// A formatted, loaded store with its session.
#[derive(Debug)]
pub struct BlockStore<D: BackingStore> {
    device: D,
    root: RootRecord,
    allocator: Allocator,
    index: CatalogIndex,
    session: Session,
    /// Flush after every mutation
    sync: bool,
}

impl<D: BackingStore> BlockStore<D> {
    pub(crate) fn from_parts(
        device: D,
        root: RootRecord,
        allocator: Allocator,
        index: CatalogIndex,
        sync: bool,
    ) -> Self {
        Self {
            device,
            root,
            allocator,
            index,
            session: Session::root(),
            sync,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Release the backing store, e.g. to reopen it.
    pub fn into_device(self) -> D {
        self.device
    }

    /// In-memory copy of the Root Record.
    pub fn root_record(&self) -> &RootRecord {
        &self.root
    }

    pub fn allocator_kind(&self) -> AllocatorKind {
        self.allocator.kind()
    }

    pub fn index_kind(&self) -> IndexKind {
        self.index.kind()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    // ========== Persistence ==========

    /// Rewrite the Root Record in full and flush if configured to.
    pub(crate) fn persist_root(&mut self) -> Result<()> {
        self.root.free_head = self.allocator.free_head();
        write_root(&self.device, &self.root)?;
        if self.sync {
            self.device.flush()?;
        }
        Ok(())
    }

    /// Flush the backing store regardless of the sync setting.
    pub fn flush(&self) -> Result<()> {
        self.device.flush()
    }

    fn alloc_slot<R: Record>(&mut self) -> Result<Offset> {
        let extent = self.allocator.allocate(&self.device, R::SIZE as u64)?;
        Ok(extent.offset)
    }

    fn free_slot<R: Record>(&mut self, at: Offset) -> Result<()> {
        let extent = self.allocator.slot_extent(at, R::SIZE as u64);
        self.allocator.free(&self.device, extent)
    }

    /// Unlink a found record, persist the new chain, then free its slot.
    /// The second root write mirrors the allocator's new free head.
    fn release_record<R: Record>(
        &mut self,
        head: fn(&mut RootRecord) -> &mut Option<Offset>,
        found: Found<R>,
    ) -> Result<R> {
        let at = found.at;
        let record = catalog::unlink(&self.device, head(&mut self.root), found)?;
        self.persist_root()?;
        self.free_slot::<R>(at)?;
        self.persist_root()?;
        Ok(record)
    }

    /// Persist a file record and refresh the session's copy if it is open.
    fn update_file(&mut self, at: Offset, record: FileRecord) -> Result<()> {
        catalog::store(&self.device, at, &record)?;
        if let Some(open) = self.session.open_at_mut(at) {
            open.record = record;
        }
        self.persist_root()
    }

    fn next_id(counter: &mut u32, what: &str) -> Result<u32> {
        let id = *counter;
        *counter = id
            .checked_add(1)
            .ok_or_else(|| StoreError::invalid_argument(format!("{what} ids exhausted")))?;
        Ok(id)
    }

    // ========== Format-time identity ==========

    /// Create the root group and root user in a freshly formatted store.
    pub(crate) fn create_root_identity(&mut self) -> Result<()> {
        let group_at = self.alloc_slot::<GroupRecord>()?;
        let mut group = GroupRecord::new(ROOT_NAME, ROOT_GID);
        catalog::insert_head(&self.device, &mut self.root.first_group, group_at, &mut group)?;

        let user_at = self.alloc_slot::<UserRecord>()?;
        let mut user = UserRecord::new(ROOT_NAME, ROOT_UID, ROOT_GID);
        catalog::insert_head(&self.device, &mut self.root.first_user, user_at, &mut user)?;

        self.persist_root()
    }

    // ========== Lookups ==========

    fn find_user(&self, name: &str) -> Result<Option<Found<UserRecord>>> {
        catalog::find_by_name(&self.device, self.root.first_user, name)
    }

    fn find_group(&self, name: &str) -> Result<Option<Found<GroupRecord>>> {
        catalog::find_by_name(&self.device, self.root.first_group, name)
    }

    fn user_by_name(&self, name: &str) -> Result<(Offset, UserRecord)> {
        self.find_user(name)?
            .map(|f| (f.at, f.record))
            .ok_or_else(|| StoreError::not_found(format!("user '{name}'")))
    }

    fn group_by_name(&self, name: &str) -> Result<GroupRecord> {
        self.find_group(name)?
            .map(|f| f.record)
            .ok_or_else(|| StoreError::not_found(format!("group '{name}'")))
    }

    fn file_by_name(&self, name: &str) -> Result<(Offset, FileRecord)> {
        validate_name(name)?;
        self.index
            .lookup(&self.device, self.root.first_file, name)?
            .ok_or_else(|| StoreError::not_found(format!("file '{name}'")))
    }

    fn user_name(&self, uid: Uid) -> Result<Option<String>> {
        Ok(catalog::find(&self.device, self.root.first_user, |_, u: &UserRecord| u.uid == uid)?
            .map(|f| f.record.name))
    }

    fn group_name(&self, gid: Gid) -> Result<Option<String>> {
        Ok(
            catalog::find(&self.device, self.root.first_group, |_, g: &GroupRecord| {
                g.gid == gid
            })?
            .map(|f| f.record.name),
        )
    }

    /// Snapshot of `record` with owner and group names resolved.
    fn resolve(&self, record: &FileRecord) -> Result<FileInfo> {
        let mut info = record.info();
        info.owner = self.user_name(record.uid)?;
        info.group = self.group_name(record.gid)?;
        Ok(info)
    }

    fn ensure_root(&self) -> Result<()> {
        require_root(&self.session.permission_context())
    }

    // ========== Integrity ==========

    /// Walk every catalog and the allocator state. Live and free extents
    /// must tile the allocator's managed range with no overlap and no gap,
    /// and the live-file count must match the file catalog.
    pub fn verify(&self) -> Result<()> {
        let mut extents: Vec<(Extent, &'static str)> = Vec::new();

        let files = catalog::collect::<FileRecord, D>(&self.device, self.root.first_file)?;
        for (at, rec) in &files {
            let slot = self.allocator.slot_extent(*at, FileRecord::SIZE as u64);
            extents.push((slot, "file record"));
            if let Some(data) = rec.data {
                extents.push((data, "data region"));
            }
        }
        for (at, _) in catalog::collect::<UserRecord, D>(&self.device, self.root.first_user)? {
            let slot = self.allocator.slot_extent(at, UserRecord::SIZE as u64);
            extents.push((slot, "user record"));
        }
        for (at, _) in catalog::collect::<GroupRecord, D>(&self.device, self.root.first_group)? {
            let slot = self.allocator.slot_extent(at, GroupRecord::SIZE as u64);
            extents.push((slot, "group record"));
        }
        for free in self.allocator.free_extents(&self.device)? {
            extents.push((free, "free extent"));
        }

        extents.sort_by_key(|(e, _)| e.offset);
        for pair in extents.windows(2) {
            let ((a, a_kind), (b, b_kind)) = (pair[0], pair[1]);
            if a.overlaps(&b) {
                return Err(StoreError::corrupt(
                    b.offset,
                    format!("{b_kind} overlaps {a_kind} at {:#x}", a.offset),
                ));
            }
        }

        let managed = self.allocator.managed_extent();
        if let Some((e, kind)) = extents
            .iter()
            .find(|(e, _)| e.offset < managed.offset || e.end() > managed.end())
        {
            return Err(StoreError::corrupt(
                e.offset,
                format!("{kind} of {} bytes outside the managed range", e.len),
            ));
        }
        let covered: u64 = extents.iter().map(|(e, _)| e.len).sum();
        if covered != managed.len {
            return Err(StoreError::corrupt(
                managed.offset,
                format!(
                    "extents account for {covered} of {} managed bytes",
                    managed.len
                ),
            ));
        }

        if files.len() as u64 != u64::from(self.root.file_count) {
            return Err(StoreError::corrupt(
                0,
                format!(
                    "live-file count {} but catalog holds {}",
                    self.root.file_count,
                    files.len()
                ),
            ));
        }
        Ok(())
    }
}

impl<D: BackingStore> StoreService for BlockStore<D> {
    // ========== Identity Operations ==========

    fn create_user(&mut self, name: &str, group: Option<&str>) -> Result<UserInfo> {
        self.ensure_root()?;
        validate_name(name)?;
        if self.find_user(name)?.is_some() {
            return Err(StoreError::already_exists(format!("user '{name}'")));
        }

        // Every collision is checked before the first allocation.
        let primary = match group {
            Some(group) => {
                validate_name(group)?;
                PrimaryGroup::Existing(self.group_by_name(group)?.gid)
            }
            None => {
                if self.find_group(name)?.is_some() {
                    return Err(StoreError::already_exists(format!("group '{name}'")));
                }
                PrimaryGroup::Private(self.alloc_slot::<GroupRecord>()?)
            }
        };

        let user_at = match self.alloc_slot::<UserRecord>() {
            Ok(at) => at,
            Err(e) => {
                if let PrimaryGroup::Private(at) = primary {
                    self.free_slot::<GroupRecord>(at)?;
                    self.persist_root()?;
                }
                return Err(e);
            }
        };

        let gid = match primary {
            PrimaryGroup::Existing(gid) => gid,
            PrimaryGroup::Private(at) => {
                let gid = Self::next_id(&mut self.root.next_gid, "group")?;
                let mut rec = GroupRecord::new(name, gid);
                catalog::insert_head(&self.device, &mut self.root.first_group, at, &mut rec)?;
                gid
            }
        };

        let uid = Self::next_id(&mut self.root.next_uid, "user")?;
        let mut user = UserRecord::new(name, uid, gid);
        catalog::insert_head(&self.device, &mut self.root.first_user, user_at, &mut user)?;
        self.persist_root()?;

        info!(name, uid, gid, "created user");
        Ok(user.info())
    }

    fn delete_user(&mut self, name: &str) -> Result<()> {
        self.ensure_root()?;
        validate_name(name)?;
        let found = self
            .find_user(name)?
            .ok_or_else(|| StoreError::not_found(format!("user '{name}'")))?;
        if found.record.uid == ROOT_UID {
            return Err(StoreError::invalid_argument("the root user cannot be deleted"));
        }

        let rec = self.release_record(|r| &mut r.first_user, found)?;
        info!(name, uid = rec.uid, "deleted user");
        Ok(())
    }

    fn create_group(&mut self, name: &str) -> Result<GroupInfo> {
        self.ensure_root()?;
        validate_name(name)?;
        if self.find_group(name)?.is_some() {
            return Err(StoreError::already_exists(format!("group '{name}'")));
        }

        let at = self.alloc_slot::<GroupRecord>()?;
        let gid = Self::next_id(&mut self.root.next_gid, "group")?;
        let mut rec = GroupRecord::new(name, gid);
        catalog::insert_head(&self.device, &mut self.root.first_group, at, &mut rec)?;
        self.persist_root()?;

        info!(name, gid, "created group");
        Ok(rec.info())
    }

    fn delete_group(&mut self, name: &str) -> Result<()> {
        self.ensure_root()?;
        validate_name(name)?;
        let found = self
            .find_group(name)?
            .ok_or_else(|| StoreError::not_found(format!("group '{name}'")))?;
        if found.record.gid == ROOT_GID {
            return Err(StoreError::invalid_argument("the root group cannot be deleted"));
        }

        let rec = self.release_record(|r| &mut r.first_group, found)?;
        info!(name, gid = rec.gid, "deleted group");
        Ok(())
    }

    fn add_user_to_group(&mut self, user: &str, group: &str) -> Result<()> {
        self.ensure_root()?;
        validate_name(user)?;
        validate_name(group)?;
        let (at, mut rec) = self.user_by_name(user)?;
        let gid = self.group_by_name(group)?.gid;

        if !rec.add_group(gid)? {
            debug!(user, group, "already a member");
            return Ok(());
        }
        catalog::store(&self.device, at, &rec)?;

        if rec.uid == self.session.identity().uid {
            if let Some(primary) = rec.primary_gid() {
                self.session.refresh_groups(primary, rec.memberships());
            }
        }
        self.persist_root()?;

        debug!(user, group, gid, "added user to group");
        Ok(())
    }

    fn login(&mut self, name: &str) -> Result<Identity> {
        validate_name(name)?;
        let (at, rec) = self.user_by_name(name)?;
        let gid = rec
            .primary_gid()
            .ok_or_else(|| StoreError::corrupt(at, "user record without a primary group"))?;

        let identity = Identity {
            uid: rec.uid,
            gid,
            name: rec.name.clone(),
        };
        self.session.switch_identity(identity.clone(), rec.memberships());

        debug!(name, uid = identity.uid, gid, "logged in");
        Ok(identity)
    }

    fn whoami(&self) -> &Identity {
        self.session.identity()
    }

    fn list_users(&self) -> Result<Vec<UserInfo>> {
        Ok(catalog::collect::<UserRecord, D>(&self.device, self.root.first_user)?
            .iter()
            .map(|(_, rec)| rec.info())
            .collect())
    }

    fn list_groups(&self) -> Result<Vec<GroupInfo>> {
        Ok(catalog::collect::<GroupRecord, D>(&self.device, self.root.first_group)?
            .iter()
            .map(|(_, rec)| rec.info())
            .collect())
    }

    // ========== File Operations ==========

    fn open(&mut self, name: &str, create: bool) -> Result<FileInfo> {
        validate_name(name)?;

        if let Some((at, rec)) = self.index.lookup(&self.device, self.root.first_file, name)? {
            require_access(&rec.ownership(), &self.session.permission_context(), Access::Read)?;
            let info = self.resolve(&rec)?;
            self.session.bind(at, rec);
            trace!(name, at, "opened file");
            return Ok(info);
        }

        if !create {
            return Err(StoreError::not_found(format!("file '{name}'")));
        }

        let at = self.alloc_slot::<FileRecord>()?;
        let identity = self.session.identity();
        let mut rec = FileRecord::new(name, identity.uid, identity.gid);
        catalog::insert_head(&self.device, &mut self.root.first_file, at, &mut rec)?;
        self.root.file_count += 1;
        self.index.insert(name, at);
        self.persist_root()?;

        debug!(name, at, uid = rec.uid, "created file");
        let info = self.resolve(&rec)?;
        self.session.bind(at, rec);
        Ok(info)
    }

    fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let open = self.session.open_file().ok_or(StoreError::NoOpenFile)?;
        let rec = &open.record;
        require_access(&rec.ownership(), &self.session.permission_context(), Access::Read)?;

        let Some(region) = rec.data else {
            return Ok(Vec::new());
        };
        if offset >= rec.size {
            return Ok(Vec::new());
        }

        let n = (len as u64).min(rec.size - offset);
        let mut buf = vec![0u8; n as usize];
        self.device.read_exact_at(region.offset + offset, &mut buf)?;
        Ok(buf)
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> Result<usize> {
        let open = self.session.open_file().ok_or(StoreError::NoOpenFile)?;
        let at = open.offset;
        let mut rec = open.record.clone();
        require_access(&rec.ownership(), &self.session.permission_context(), Access::Write)?;

        if data.is_empty() {
            return Ok(0);
        }
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| StoreError::invalid_argument("write range overflows u64"))?;

        let region = match rec.data {
            Some(region) => region,
            None => {
                let region = self.allocator.allocate(&self.device, end)?;
                self.device.zero_range(region.offset, region.len)?;
                rec.data = Some(region);
                debug!(
                    name = %rec.name,
                    offset = region.offset,
                    len = region.len,
                    "allocated data region"
                );
                region
            }
        };

        if offset >= region.len {
            return Ok(0);
        }
        let n = (data.len() as u64).min(region.len - offset) as usize;
        self.device.write_all_at(region.offset + offset, &data[..n])?;
        rec.size = rec.size.max(offset + n as u64);

        trace!(name = %rec.name, offset, written = n, size = rec.size, "write");
        self.update_file(at, rec)?;
        Ok(n)
    }

    fn truncate(&mut self, new_size: u64) -> Result<()> {
        let open = self.session.open_file().ok_or(StoreError::NoOpenFile)?;
        let at = open.offset;
        let mut rec = open.record.clone();
        require_access(&rec.ownership(), &self.session.permission_context(), Access::Write)?;

        if new_size >= rec.size {
            return Ok(());
        }
        rec.size = new_size;
        self.update_file(at, rec)
    }

    fn remove(&mut self, name: &str) -> Result<()> {
        validate_name(name)?;
        let found = self
            .index
            .lookup_for_unlink(&self.device, self.root.first_file, name)?
            .ok_or_else(|| StoreError::not_found(format!("file '{name}'")))?;
        require_owner(&found.record.ownership(), &self.session.permission_context())?;

        let at = found.at;
        let rec = catalog::unlink(&self.device, &mut self.root.first_file, found)?;
        self.root.file_count = self
            .root
            .file_count
            .checked_sub(1)
            .ok_or_else(|| StoreError::corrupt(0, "live-file count underflow"))?;
        self.index.remove(name);
        if self.session.is_open_at(at) {
            self.session.release();
        }
        self.persist_root()?;

        if let Some(region) = rec.data {
            self.allocator.free(&self.device, region)?;
        }
        self.free_slot::<FileRecord>(at)?;
        self.persist_root()?;

        debug!(name, at, "removed file");
        Ok(())
    }

    fn close(&mut self) {
        self.session.release();
    }

    // ========== Metadata Operations ==========

    fn chmod(&mut self, name: &str, mode: FileMode) -> Result<()> {
        let (at, mut rec) = self.file_by_name(name)?;
        require_owner(&rec.ownership(), &self.session.permission_context())?;
        rec.mode = mode;
        self.update_file(at, rec)
    }

    fn chown(&mut self, name: &str, user: &str, group: &str) -> Result<()> {
        self.ensure_root()?;
        let (at, mut rec) = self.file_by_name(name)?;
        validate_name(user)?;
        validate_name(group)?;
        rec.uid = self.user_by_name(user)?.1.uid;
        rec.gid = self.group_by_name(group)?.gid;
        self.update_file(at, rec)
    }

    fn chgrp(&mut self, name: &str, group: &str) -> Result<()> {
        let (at, mut rec) = self.file_by_name(name)?;
        require_owner(&rec.ownership(), &self.session.permission_context())?;
        validate_name(group)?;
        rec.gid = self.group_by_name(group)?.gid;
        self.update_file(at, rec)
    }

    fn get_permissions(&self, name: &str) -> Result<FileInfo> {
        let (_, rec) = self.file_by_name(name)?;
        self.resolve(&rec)
    }

    fn list_files(&self) -> Result<Vec<FileInfo>> {
        let users = catalog::collect::<UserRecord, D>(&self.device, self.root.first_user)?;
        let groups = catalog::collect::<GroupRecord, D>(&self.device, self.root.first_group)?;

        catalog::collect::<FileRecord, D>(&self.device, self.root.first_file)?
            .into_iter()
            .map(|(_, rec)| {
                let mut info = rec.info();
                info.owner = users
                    .iter()
                    .find(|(_, u)| u.uid == rec.uid)
                    .map(|(_, u)| u.name.clone());
                info.group = groups
                    .iter()
                    .find(|(_, g)| g.gid == rec.gid)
                    .map(|(_, g)| g.name.clone());
                Ok(info)
            })
            .collect()
    }

    // ========== Statistics ==========

    fn stats(&self) -> Result<StoreStats> {
        let usage = self.allocator.usage(&self.device)?;
        let identity = self.session.identity();
        Ok(StoreStats::new(
            self.allocator.kind(),
            self.root.capacity,
            usage,
            self.root.file_count,
            identity.uid,
            identity.gid,
        ))
    }
}
