//! File-name resolution strategies.

use std::collections::HashMap;

use tracing::debug;

use super::{collect, find_by_name, load, FileRecord, Found};
use crate::config::IndexKind;
use crate::core::{Offset, Result, StoreError};
use crate::device::BackingStore;

/// Resolves file names to catalog offsets.
///
/// `Scan` walks the catalog on every lookup. `Memory` keeps a map built at
/// load time and updated by every insert and removal.
#[derive(Debug)]
pub enum CatalogIndex {
    Scan,
    Memory(HashMap<String, Offset>),
}

impl CatalogIndex {
    /// Build the index for the file catalog rooted at `head`.
    pub fn build<D: BackingStore + ?Sized>(
        kind: IndexKind,
        device: &D,
        head: Option<Offset>,
    ) -> Result<Self> {
        match kind {
            IndexKind::Scan => Ok(CatalogIndex::Scan),
            IndexKind::Memory => {
                let mut map = HashMap::new();
                for (at, rec) in collect::<FileRecord, D>(device, head)? {
                    if map.insert(rec.name.clone(), at).is_some() {
                        return Err(StoreError::corrupt(
                            at,
                            format!("duplicate file name '{}'", rec.name),
                        ));
                    }
                }
                debug!(entries = map.len(), "built in-memory file index");
                Ok(CatalogIndex::Memory(map))
            }
        }
    }

    pub fn kind(&self) -> IndexKind {
        match self {
            CatalogIndex::Scan => IndexKind::Scan,
            CatalogIndex::Memory(_) => IndexKind::Memory,
        }
    }

    /// Locate a file by name.
    pub fn lookup<D: BackingStore + ?Sized>(
        &self,
        device: &D,
        head: Option<Offset>,
        name: &str,
    ) -> Result<Option<(Offset, FileRecord)>> {
        match self {
            CatalogIndex::Scan => {
                Ok(find_by_name::<FileRecord, D>(device, head, name)?.map(|f| (f.at, f.record)))
            }
            CatalogIndex::Memory(map) => {
                let Some(&at) = map.get(name) else {
                    return Ok(None);
                };
                let rec: FileRecord = load(device, at)?;
                if rec.name != name {
                    return Err(StoreError::corrupt(
                        at,
                        format!("index entry '{name}' points at file '{}'", rec.name),
                    ));
                }
                Ok(Some((at, rec)))
            }
        }
    }

    /// Locate a file by name together with its predecessor, for unlinking.
    pub fn lookup_for_unlink<D: BackingStore + ?Sized>(
        &self,
        device: &D,
        head: Option<Offset>,
        name: &str,
    ) -> Result<Option<Found<FileRecord>>> {
        match self {
            CatalogIndex::Scan => find_by_name(device, head, name),
            CatalogIndex::Memory(map) => match map.get(name) {
                None => Ok(None),
                Some(&target) => super::find(device, head, |at, _: &FileRecord| at == target),
            },
        }
    }

    pub fn insert(&mut self, name: &str, at: Offset) {
        if let CatalogIndex::Memory(map) = self {
            map.insert(name.to_owned(), at);
        }
    }

    pub fn remove(&mut self, name: &str) {
        if let CatalogIndex::Memory(map) = self {
            map.remove(name);
        }
    }
}
