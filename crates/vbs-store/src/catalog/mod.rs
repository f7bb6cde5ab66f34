//! Offset-linked record catalogs.
//!
//! Files, users and groups each live in a singly linked list anchored in
//! the Root Record. Insertion is at the head; lookup and unlinking walk the
//! list one record at a time.

mod file;
mod group;
mod index;
mod user;

pub use file::FileRecord;
pub use group::GroupRecord;
pub use index::CatalogIndex;
pub use user::{UserRecord, GROUP_SLOTS};

use crate::core::{Offset, Result, StoreError};
use crate::device::BackingStore;

/// A fixed-size record stored in a catalog.
pub trait Record: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Catalog name used in errors and logs.
    const KIND: &'static str;

    fn name(&self) -> &str;

    fn next(&self) -> Option<Offset>;

    fn set_next(&mut self, next: Option<Offset>);

    /// Encode into exactly `SIZE` bytes.
    fn encode(&self) -> Vec<u8>;

    /// Decode a record read from `at`.
    fn decode(buf: &[u8], at: Offset) -> Result<Self>;
}

/// Read the record stored at `at`.
pub fn load<R: Record, D: BackingStore + ?Sized>(device: &D, at: Offset) -> Result<R> {
    device
        .check_range(at, R::SIZE)
        .map_err(|_| StoreError::corrupt(at, format!("{} link outside store", R::KIND)))?;
    let mut buf = vec![0u8; R::SIZE];
    device.read_exact_at(at, &mut buf)?;
    R::decode(&buf, at)
}

/// Write `record` at `at`.
pub fn store<R: Record, D: BackingStore + ?Sized>(device: &D, at: Offset, record: &R) -> Result<()> {
    device.write_all_at(at, &record.encode())
}

/// Longest chain a store of this size could hold.
fn walk_limit<R: Record, D: BackingStore + ?Sized>(device: &D) -> u64 {
    device.len() / R::SIZE as u64 + 1
}

/// Iterator over `(offset, record)` pairs from a catalog head.
///
/// Yields `CorruptStore` and stops if the chain runs longer than the store
/// could hold.
pub struct Cursor<'a, R, D: ?Sized> {
    device: &'a D,
    next: Option<Offset>,
    steps: u64,
    limit: u64,
    _record: std::marker::PhantomData<R>,
}

impl<'a, R: Record, D: BackingStore + ?Sized> Cursor<'a, R, D> {
    pub fn new(device: &'a D, head: Option<Offset>) -> Self {
        Self {
            device,
            next: head,
            steps: 0,
            limit: walk_limit::<R, D>(device),
            _record: std::marker::PhantomData,
        }
    }
}

impl<R: Record, D: BackingStore + ?Sized> Iterator for Cursor<'_, R, D> {
    type Item = Result<(Offset, R)>;

    fn next(&mut self) -> Option<Self::Item> {
        let at = self.next?;
        self.steps += 1;
        if self.steps > self.limit {
            self.next = None;
            return Some(Err(StoreError::corrupt(
                at,
                format!("{} catalog does not terminate", R::KIND),
            )));
        }

        match load::<R, D>(self.device, at) {
            Ok(record) => {
                self.next = record.next();
                Some(Ok((at, record)))
            }
            Err(e) => {
                self.next = None;
                Some(Err(e))
            }
        }
    }
}

/// A located record and its predecessor in the chain.
#[derive(Debug)]
pub struct Found<R> {
    pub at: Offset,
    pub record: R,
    /// `None` when the record is the catalog head
    pub prev: Option<(Offset, R)>,
}

/// Walk from `head` until `pred` matches.
pub fn find<R, D, F>(device: &D, head: Option<Offset>, mut pred: F) -> Result<Option<Found<R>>>
where
    R: Record,
    D: BackingStore + ?Sized,
    F: FnMut(Offset, &R) -> bool,
{
    let mut prev = None;
    for item in Cursor::<R, D>::new(device, head) {
        let (at, record) = item?;
        if pred(at, &record) {
            return Ok(Some(Found { at, record, prev }));
        }
        prev = Some((at, record));
    }
    Ok(None)
}

/// Find a record by name.
pub fn find_by_name<R: Record, D: BackingStore + ?Sized>(
    device: &D,
    head: Option<Offset>,
    name: &str,
) -> Result<Option<Found<R>>> {
    find(device, head, |_, r: &R| r.name() == name)
}

/// Collect every record of a catalog, head first.
pub fn collect<R: Record, D: BackingStore + ?Sized>(
    device: &D,
    head: Option<Offset>,
) -> Result<Vec<(Offset, R)>> {
    Cursor::<R, D>::new(device, head).collect()
}

/// Write `record` at `at` as the new head of the catalog.
pub fn insert_head<R: Record, D: BackingStore + ?Sized>(
    device: &D,
    head: &mut Option<Offset>,
    at: Offset,
    record: &mut R,
) -> Result<()> {
    record.set_next(*head);
    store(device, at, record)?;
    *head = Some(at);
    Ok(())
}

/// Relink around `found`. The head is only updated in memory; the caller
/// persists the Root Record.
pub fn unlink<R: Record, D: BackingStore + ?Sized>(
    device: &D,
    head: &mut Option<Offset>,
    found: Found<R>,
) -> Result<R> {
    match found.prev {
        None => *head = found.record.next(),
        Some((prev_at, mut prev)) => {
            prev.set_next(found.record.next());
            store(device, prev_at, &prev)?;
        }
    }
    Ok(found.record)
}
