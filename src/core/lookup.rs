//! Entry searches shared by the client and the server
//!
//! All searches run over a slice of mapped catalogs and return an
//! [`EntryLoc`]; callers copy the entry out of the mapping themselves.

use crate::core::entry::{CatalogEntry, EntryView};
use crate::core::error::{CatalogError, Result};
use crate::core::header::{CatalogHeader, CatalogType};
use crate::core::media;
use crate::core::status::EntryStatus;
use crate::core::store::MappedStore;
use crate::core::volid::{VolId, VolIdFlags};
use std::ops::Deref;

/// Position of an entry: catalog index and entry index within it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryLoc {
    pub store: usize,
    pub index: usize,
}

/// A catalog that can be searched
pub trait CatalogSource {
    fn header(&self) -> &CatalogHeader;
    fn entry_count(&self) -> usize;
    fn view(&self, index: usize) -> Option<EntryView<'_>>;
}

impl<M: Deref<Target = [u8]>> CatalogSource for MappedStore<M> {
    fn header(&self) -> &CatalogHeader {
        MappedStore::header(self)
    }

    fn entry_count(&self) -> usize {
        self.count()
    }

    fn view(&self, index: usize) -> Option<EntryView<'_>> {
        MappedStore::view(self, index)
    }
}

fn views<S: CatalogSource>(store: &S) -> impl Iterator<Item = (usize, EntryView<'_>)> + '_ {
    (0..store.entry_count()).filter_map(move |i| store.view(i).map(|v| (i, v)))
}

/// Decode the entry at `loc`
pub fn entry_at<S: CatalogSource>(stores: &[S], loc: EntryLoc) -> Result<CatalogEntry> {
    stores
        .get(loc.store)
        .and_then(|s| s.view(loc.index))
        .ok_or_else(|| {
            CatalogError::InvalidArgument(format!("no entry at {}:{}", loc.store, loc.index))
        })?
        .to_entry()
}

pub fn find_catalog<S: CatalogSource>(stores: &[S], eq: u16) -> Result<usize> {
    stores
        .iter()
        .position(|s| s.header().eq == eq)
        .ok_or(CatalogError::CatalogMissing(eq))
}

/// First in-use entry at `slot`, with partition `part` unless `part` is 0
pub fn by_location<S: CatalogSource>(
    stores: &[S],
    eq: u16,
    slot: u32,
    part: u16,
) -> Result<EntryLoc> {
    let nc = find_catalog(stores, eq)?;
    let mut slot_found = false;
    for (ne, view) in views(&stores[nc]) {
        if view.in_use() && view.slot() == slot {
            slot_found = true;
            if part == 0 || view.part() == part {
                return Ok(EntryLoc {
                    store: nc,
                    index: ne,
                });
            }
        }
    }
    if slot_found {
        Err(CatalogError::InvalidPartition { eq, slot, part })
    } else {
        Err(CatalogError::InvalidSlot { eq, slot })
    }
}

/// First in-use entry with this media type and VSN in any catalog
pub fn by_media<S: CatalogSource>(stores: &[S], mtype: &str, vsn: &str) -> Result<EntryLoc> {
    if !mtype.is_empty() && !vsn.is_empty() {
        for (nc, store) in stores.iter().enumerate() {
            let found = views(store)
                .find(|(_, v)| v.in_use() && v.mtype_is(mtype) && v.vsn_is(vsn));
            if let Some((ne, _)) = found {
                return Ok(EntryLoc {
                    store: nc,
                    index: ne,
                });
            }
        }
    }
    if !media::is_valid_code(mtype) {
        Err(CatalogError::InvalidMediaType(mtype.to_string()))
    } else {
        Err(CatalogError::VolumeNotFound {
            mtype: mtype.to_string(),
            vsn: vsn.to_string(),
        })
    }
}

/// First entry with this barcode and media type in one catalog
pub fn by_barcode<S: CatalogSource>(
    stores: &[S],
    eq: u16,
    mtype: &str,
    barcode: &str,
) -> Result<EntryLoc> {
    let not_found = || CatalogError::BarcodeNotFound {
        eq,
        barcode: barcode.to_string(),
    };
    if barcode.is_empty() {
        return Err(not_found());
    }
    let nc = find_catalog(stores, eq)?;
    views(&stores[nc])
        .find(|(_, v)| v.barcode_is(barcode) && v.mtype_is(mtype))
        .map(|(ne, _)| EntryLoc {
            store: nc,
            index: ne,
        })
        .ok_or_else(not_found)
}

pub fn by_mid<S: CatalogSource>(stores: &[S], mid: u32) -> Result<EntryLoc> {
    for (nc, store) in stores.iter().enumerate() {
        if let Some((ne, _)) = views(store).find(|(_, v)| v.mid() == mid) {
            return Ok(EntryLoc {
                store: nc,
                index: ne,
            });
        }
    }
    Err(CatalogError::MidNotFound(mid))
}

/// An occupied cleaning cartridge with cycles left and good media
pub fn cleaning_volume<S: CatalogSource>(stores: &[S], eq: u16) -> Result<EntryLoc> {
    let nc = find_catalog(stores, eq)?;
    for (ne, view) in views(&stores[nc]) {
        let status = view.status();
        if status.contains(EntryStatus::CLEANING | EntryStatus::OCCUPIED)
            && !status.contains(EntryStatus::BAD_MEDIA)
            && view.to_entry()?.access > 0
        {
            return Ok(EntryLoc {
                store: nc,
                index: ne,
            });
        }
    }
    Err(CatalogError::NoCleaningCartridge(eq))
}

fn require_slot<S: CatalogSource>(stores: &[S], vid: &VolId) -> Result<()> {
    if !vid.has(VolIdFlags::SLOT) {
        let nc = find_catalog(stores, vid.eq)?;
        if stores[nc].header().kind != CatalogType::Manual {
            return Err(CatalogError::SlotRequired(vid.eq));
        }
    }
    Ok(())
}

/// Resolve a [`VolId`]
///
/// Logical identifiers search every catalog by media. A cartridge identifier
/// matches any partition; otherwise the given partition is used. A slot must
/// be named unless the catalog belongs to a manual drive.
pub fn resolve<S: CatalogSource>(stores: &[S], vid: &VolId) -> Result<EntryLoc> {
    if vid.is_logical() {
        return by_media(stores, &vid.mtype, &vid.vsn);
    }
    let part = if vid.is_cartridge() { 0 } else { vid.part };
    let loc = by_location(stores, vid.eq, vid.slot, part)?;
    require_slot(stores, vid)?;
    Ok(loc)
}

/// Resolve like [`resolve`], taking the partition only when one was named
pub fn check_slot<S: CatalogSource>(stores: &[S], vid: &VolId) -> Result<EntryLoc> {
    if vid.is_logical() {
        return by_media(stores, &vid.mtype, &vid.vsn);
    }
    let part = if vid.has(VolIdFlags::PART) { vid.part } else { 0 };
    let loc = by_location(stores, vid.eq, vid.slot, part)?;
    require_slot(stores, vid)?;
    Ok(loc)
}

/// [`check_slot`] that also insists on a partition for partitioned media
pub fn check_volid<S: CatalogSource>(stores: &[S], vid: &VolId) -> Result<EntryLoc> {
    let loc = check_slot(stores, vid)?;
    if !vid.is_logical() && !vid.has(VolIdFlags::PART) {
        let part = stores[loc.store]
            .view(loc.index)
            .map(|v| v.part())
            .unwrap_or(0);
        if part != 0 {
            return Err(CatalogError::PartitionRequired(vid.to_string()));
        }
    }
    Ok(loc)
}

/// Next in-use entry sharing `first`'s slot, scanning past index `after`
pub fn next_in_cartridge<S: CatalogSource>(
    stores: &[S],
    first: EntryLoc,
    after: Option<usize>,
) -> Option<EntryLoc> {
    let store = stores.get(first.store)?;
    let slot = store.view(first.index)?.slot();
    let start = after.map_or(0, |i| i + 1);
    (start..store.entry_count())
        .filter(|&ne| ne != first.index)
        .find(|&ne| {
            store
                .view(ne)
                .is_some_and(|v| v.in_use() && v.slot() == slot)
        })
        .map(|ne| EntryLoc {
            store: first.store,
            index: ne,
        })
}

/// `loc` plus every other in-use entry sharing its slot, when partitioned
pub fn cartridge<S: CatalogSource>(stores: &[S], loc: EntryLoc) -> Vec<EntryLoc> {
    let mut out = vec![loc];
    let partitioned = stores
        .get(loc.store)
        .and_then(|s| s.view(loc.index))
        .is_some_and(|v| v.part() != 0);
    if partitioned {
        let mut after = None;
        while let Some(next) = next_in_cartridge(stores, loc, after) {
            out.push(next);
            after = Some(next.index);
        }
    }
    out
}

/// Lowest slot number not held by any in-use entry of `store`
pub fn free_slot<S: CatalogSource>(store: &S) -> u32 {
    let mut used: Vec<u32> = views(store)
        .filter(|(_, v)| v.in_use())
        .map(|(_, v)| v.slot())
        .collect();
    used.sort_unstable();
    used.dedup();
    let mut slot = 0u32;
    for s in used {
        if s != slot {
            break;
        }
        slot += 1;
    }
    slot
}

/// Copies of every in-use entry of one catalog
pub fn in_use_entries<S: CatalogSource>(store: &S) -> Result<Vec<CatalogEntry>> {
    views(store)
        .filter(|(_, v)| v.in_use())
        .map(|(_, v)| v.to_entry())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::WritableStore;
    use tempfile::{tempdir, TempDir};

    fn entry(slot: u32, part: u16, vsn: &str) -> CatalogEntry {
        CatalogEntry {
            status: EntryStatus::IN_USE,
            eq: 10,
            slot,
            part,
            mtype: "mo".into(),
            vsn: vsn.into(),
            barcode: format!("BC{}", vsn),
            ..CatalogEntry::default()
        }
    }

    fn library(kind: CatalogType, entries: &[CatalogEntry]) -> (TempDir, WritableStore) {
        let dir = tempdir().unwrap();
        let mut header = CatalogHeader::new("lib", 6);
        header.eq = 10;
        header.kind = kind;
        let mut store = WritableStore::create(dir.path().join("lib"), &header).unwrap();
        for (i, ce) in entries.iter().enumerate() {
            store.write_entry(i, ce).unwrap();
        }
        (dir, store)
    }

    #[test]
    fn test_location_errors() {
        let (_dir, store) = library(CatalogType::Library, &[entry(3, 1, "A"), entry(3, 2, "B")]);
        let stores = [store];
        assert_eq!(by_location(&stores, 10, 3, 2).unwrap().index, 1);
        assert_eq!(by_location(&stores, 10, 3, 0).unwrap().index, 0);
        assert!(matches!(
            by_location(&stores, 10, 3, 5),
            Err(CatalogError::InvalidPartition { .. })
        ));
        assert!(matches!(
            by_location(&stores, 10, 4, 0),
            Err(CatalogError::InvalidSlot { .. })
        ));
        assert!(matches!(
            by_location(&stores, 11, 3, 0),
            Err(CatalogError::CatalogMissing(11))
        ));
    }

    #[test]
    fn test_media_errors() {
        let (_dir, store) = library(CatalogType::Library, &[entry(0, 0, "A")]);
        let stores = [store];
        assert!(by_media(&stores, "mo", "A").is_ok());
        assert!(matches!(
            by_media(&stores, "mo", "Z"),
            Err(CatalogError::VolumeNotFound { .. })
        ));
        assert!(matches!(
            by_media(&stores, "qq", "A"),
            Err(CatalogError::InvalidMediaType(_))
        ));
    }

    #[test]
    fn test_slot_and_partition_required() {
        let (_dir, store) = library(CatalogType::Library, &[entry(0, 1, "A")]);
        let stores = [store];
        assert!(matches!(
            resolve(&stores, &VolId::equipment(10)),
            Err(CatalogError::SlotRequired(10))
        ));
        assert!(resolve(&stores, &VolId::cartridge(10, 0)).is_ok());
        assert!(matches!(
            check_volid(&stores, &VolId::cartridge(10, 0)),
            Err(CatalogError::PartitionRequired(_))
        ));
        assert!(check_volid(&stores, &VolId::partition(10, 0, 1)).is_ok());

        let (_dir2, manual) = library(CatalogType::Manual, &[entry(0, 0, "M")]);
        let manual = [manual];
        assert!(resolve(&manual, &VolId::equipment(10)).is_ok());
    }

    #[test]
    fn test_cartridge_walk_and_free_slot() {
        let (_dir, store) = library(
            CatalogType::Library,
            &[entry(0, 0, "A"), entry(2, 1, "B"), entry(1, 0, "C"), entry(2, 2, "D")],
        );
        let stores = [store];
        let first = by_location(&stores, 10, 2, 1).unwrap();
        let cart = cartridge(&stores, first);
        assert_eq!(cart.iter().map(|l| l.index).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(free_slot(&stores[0]), 3);
        assert_eq!(in_use_entries(&stores[0]).unwrap().len(), 4);
    }
}
