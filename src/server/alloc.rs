//! Entry allocation, catalog growth and cartridge moves

use super::CatalogServer;
use crate::core::entry::CatalogEntry;
use crate::core::error::{CatalogError, Result};
use crate::core::lookup::{self, EntryLoc};
use crate::core::status::EntryStatus;
use crate::core::store::WritableStore;
use crate::core::volid::NO_SLOT;
use std::path::PathBuf;
use tracing::{debug, info, warn};

impl CatalogServer {
    /// Claim the first entry not in use, growing the catalog when it is full
    ///
    /// The claimed entry is blank apart from its equipment, mid and the
    /// in-use bit.
    pub(crate) fn free_entry(&mut self, nc: usize) -> Result<EntryLoc> {
        loop {
            let store = &self.stores[nc];
            let free = (0..store.count()).find(|&i| store.view(i).is_some_and(|v| !v.in_use()));
            if let Some(index) = free {
                let loc = EntryLoc { store: nc, index };
                self.update(loc, |ce| {
                    ce.clear();
                    ce.status = EntryStatus::IN_USE;
                })?;
                return Ok(loc);
            }
            self.grow(nc, self.config.table_increment)?;
        }
    }

    /// Replace catalog `nc` with a copy holding `increase` more entries
    ///
    /// Existing entries keep their index. New entries take mids following the
    /// table's last mid. The old mapping is marked stale so every process
    /// still holding it remaps.
    pub(crate) fn grow(&mut self, nc: usize, increase: u32) -> Result<()> {
        let old = &self.stores[nc];
        let path = old.path().to_path_buf();
        let entries = (old.count() as u32).saturating_add(increase);

        let grown = self.build_grown(nc, entries).map_err(|e| CatalogError::GrowthFailed {
            path: path.clone(),
            entries,
            reason: e.to_string(),
        })?;

        let mut old = std::mem::replace(&mut self.stores[nc], grown);
        old.mark_stale()?;
        info!("Catalog {:?} increased to {} entries", path, entries);
        Ok(())
    }

    fn build_grown(&mut self, nc: usize, entries: u32) -> Result<WritableStore> {
        let old = &self.stores[nc];
        let path = old.path().to_path_buf();
        let old_count = old.count();
        if entries as usize <= old_count {
            return Err(CatalogError::InvalidArgument(format!(
                "catalog already holds {} entries",
                old_count
            )));
        }
        let mut header = old.header().clone();
        header.count = entries;

        let scratch = PathBuf::from(format!("{}.grow", path.display()));
        let mut grown = WritableStore::create(&scratch, &header)?;
        for index in 0..old_count {
            if let Some(image) = old.entry_bytes(index) {
                grown.write_raw(index, image)?;
            }
        }

        let mut mid = self.table.last_mid();
        for index in old_count..entries as usize {
            mid += 1;
            let blank = CatalogEntry {
                eq: header.eq,
                mid,
                ..CatalogEntry::default()
            };
            grown.write_entry(index, &blank)?;
        }
        grown.persist_as(&path)?;
        self.table.set_last_mid(mid)?;
        Ok(grown)
    }

    /// Free one entry, keeping its equipment and mid
    pub(crate) fn release(&mut self, loc: EntryLoc) -> Result<()> {
        self.update(loc, CatalogEntry::clear).map(|_| ())
    }

    /// Free an entry and the other partitions of its cartridge
    pub(crate) fn release_cartridge(&mut self, loc: EntryLoc) -> Result<()> {
        for part in lookup::cartridge(&self.stores, loc) {
            let ce = self.entry(part)?;
            debug!("Freeing {}:{}:{} {}.{}", ce.eq, ce.slot, ce.part, ce.mtype, ce.vsn);
            self.release(part)?;
        }
        Ok(())
    }

    /// In-use entries of catalog `nc` at `slot`
    pub(crate) fn slot_entries(&self, nc: usize, slot: u32) -> Vec<EntryLoc> {
        self.stores[nc]
            .views()
            .filter(|(_, v)| v.in_use() && v.slot() == slot)
            .map(|(index, _)| EntryLoc { store: nc, index })
            .collect()
    }

    /// Move the cartridge holding `src` into catalog `dest_nc` at `slot`
    ///
    /// `None` or [`NO_SLOT`] picks the lowest free slot. Each partition takes a
    /// fresh destination entry, keeping that entry's equipment and mid; the
    /// source entries are freed. Media moved to the historian is marked
    /// occupied. Returns the destination entries.
    pub(crate) fn move_cartridge(
        &mut self,
        src: EntryLoc,
        dest_nc: usize,
        slot: Option<u32>,
    ) -> Result<Vec<EntryLoc>> {
        let slot = match slot {
            Some(s) if s != NO_SLOT => s,
            _ => lookup::free_slot(&self.stores[dest_nc]),
        };
        let parts = lookup::cartridge(&self.stores, src);
        let dest_eq = self.stores[dest_nc].eq();

        let mut moved = Vec::with_capacity(parts.len());
        for &loc in &parts {
            let ce = self.entry(loc)?;
            if ce.part != 0 {
                if let Ok(existing) = lookup::by_location(&self.stores, dest_eq, slot, ce.part) {
                    if !parts.contains(&existing) {
                        warn!(
                            "Volume {}.{} already cataloged at {}:{}:{}, old entry dropped",
                            ce.mtype, ce.vsn, dest_eq, slot, ce.part
                        );
                        self.release(existing)?;
                    }
                }
            }

            let dest = self.free_entry(dest_nc)?;
            let target = self.entry(dest)?;
            let mut placed = ce.clone();
            placed.eq = target.eq;
            placed.mid = target.mid;
            placed.slot = slot;
            placed.status.insert(EntryStatus::IN_USE);
            if dest_nc == self.historian {
                placed.status.insert(EntryStatus::OCCUPIED);
                info!("Volume {}.{} exported to the historian", ce.mtype, ce.vsn);
            } else {
                info!(
                    "Volume {}.{} moved to {}:{}",
                    ce.mtype, ce.vsn, target.eq, slot
                );
            }
            self.put(dest, placed)?;
            self.release(loc)?;
            moved.push(dest);
        }
        Ok(moved)
    }
}
