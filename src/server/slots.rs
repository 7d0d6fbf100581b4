//! Slot-level verbs: scanning, slot assignment, moves and partitioning

use super::notify::RemoteChange;
use super::policy;
use super::CatalogServer;
use crate::core::entry::CatalogEntry;
use crate::core::error::{CatalogError, Result};
use crate::core::lookup::{self, EntryLoc};
use crate::core::status::EntryStatus;
use crate::core::volid::{VolId, NO_SLOT};
use crate::protocol::Response;
use tracing::{debug, info};

impl CatalogServer {
    pub(crate) fn assign_free_slot(&mut self, eq: u16) -> Result<Response> {
        let nc = self.find(eq)?;
        let slot = lookup::free_slot(&self.stores[nc]);
        let loc = self.free_entry(nc)?;
        self.update(loc, |ce| ce.slot = slot)?;
        debug!("Assigned slot {} in equipment {}", slot, eq);
        Ok(Response::Slot(slot))
    }

    /// Record what a library found while scanning a slot
    pub(crate) fn slot_init(
        &mut self,
        vid: &VolId,
        status: EntryStatus,
        two_sided: bool,
        barcode: &str,
        alt_barcode: &str,
    ) -> Result<Response> {
        let nc = self.find(vid.eq)?;
        let target = if barcode.is_empty() {
            match self.scan_without_barcode(nc, vid, status, two_sided)? {
                Some(loc) => loc,
                None => return Ok(Response::Ok),
            }
        } else {
            match self.scan_barcode(nc, vid, two_sided, barcode, alt_barcode)? {
                Some(loc) => loc,
                None => return Ok(Response::Ok),
            }
        };

        for loc in lookup::cartridge(&self.stores, target) {
            let ce = self.update(loc, |ce| {
                ce.status.remove(
                    EntryStatus::IN_USE
                        | EntryStatus::OCCUPIED
                        | EntryStatus::BAR_CODE
                        | EntryStatus::RECONCILE,
                );
                ce.status.insert(status | EntryStatus::IN_USE);
                if ce.vsn.is_empty() {
                    ce.status.remove(EntryStatus::LABELED);
                    ce.status.insert(EntryStatus::NEEDS_AUDIT);
                } else {
                    ce.status.insert(EntryStatus::LABELED);
                    ce.status.remove(EntryStatus::NEEDS_AUDIT);
                }
            })?;
            if !ce.status.contains(EntryStatus::CLEANING) {
                self.notify_remote(&ce, RemoteChange::Update);
            }
        }
        Ok(Response::Ok)
    }

    /// Barcoded slot scan; `None` when the request is already satisfied
    fn scan_barcode(
        &mut self,
        nc: usize,
        vid: &VolId,
        two_sided: bool,
        barcode: &str,
        alt_barcode: &str,
    ) -> Result<Option<EntryLoc>> {
        let historian_eq = self.historian_eq();
        let slot = (vid.slot != NO_SLOT).then_some(vid.slot);

        // Whatever else the catalog placed in this slot is gone
        if let Some(slot) = slot {
            if let Ok(other) = lookup::by_location(&self.stores, vid.eq, slot, vid.part) {
                let ce = self.entry(other)?;
                if ce.barcode != barcode {
                    debug!(
                        "Slot {}:{} now holds {}, {} goes to the historian",
                        vid.eq, slot, barcode, ce.barcode
                    );
                    self.evict_to_historian(other)?;
                }
            }
        }

        // Media returning from the historian
        if nc != self.historian {
            if let Ok(h) = lookup::by_barcode(&self.stores, historian_eq, &vid.mtype, barcode) {
                let moved = self.move_cartridge(h, nc, slot)?;
                for loc in moved {
                    let ce = self.update(loc, |ce| ce.status.remove(EntryStatus::UNAVAIL))?;
                    if !ce.status.contains(EntryStatus::CLEANING) {
                        self.notify_remote(&ce, RemoteChange::Update);
                    }
                }
                info!("Barcode {} imported from the historian", barcode);
                return Ok(None);
            }
        }

        let mut target = None;
        if let Some(slot) = slot {
            if let Ok(known) = lookup::by_barcode(&self.stores, vid.eq, &vid.mtype, barcode) {
                let ce = self.update(known, |ce| ce.status.remove(EntryStatus::RECONCILE))?;
                if ce.in_use() && ce.slot != slot {
                    self.move_cartridge(known, nc, Some(slot))?;
                    return Ok(None);
                }
                if ce.in_use() {
                    target = Some(known);
                }
            }
        }

        let target = match target {
            Some(loc) => loc,
            None => {
                let slot = slot.unwrap_or_else(|| lookup::free_slot(&self.stores[nc]));
                let first = self.new_scanned(nc, slot, if two_sided { 1 } else { 0 }, &vid.mtype)?;
                self.apply_barcode(first, barcode)?;
                if two_sided {
                    let second = self.new_scanned(nc, slot, 2, &vid.mtype)?;
                    self.apply_barcode(second, alt_barcode)?;
                }
                return Ok(Some(first));
            }
        };
        self.apply_barcode(target, barcode)?;
        Ok(Some(target))
    }

    fn scan_without_barcode(
        &mut self,
        nc: usize,
        vid: &VolId,
        status: EntryStatus,
        two_sided: bool,
    ) -> Result<Option<EntryLoc>> {
        let existing = lookup::by_location(&self.stores, vid.eq, vid.slot, vid.part).ok();
        match existing {
            None if status.contains(EntryStatus::IN_USE) => {
                let slot = if vid.slot == NO_SLOT {
                    lookup::free_slot(&self.stores[nc])
                } else {
                    vid.slot
                };
                let part = if two_sided { 1 } else { vid.part };
                let first = self.new_scanned(nc, slot, part, &vid.mtype)?;
                self.update(first, |ce| ce.vsn = vid.vsn.clone())?;
                if two_sided {
                    self.new_scanned(nc, slot, 2, &vid.mtype)?;
                }
                Ok(Some(first))
            }
            Some(loc) if !status.contains(EntryStatus::IN_USE) => {
                self.update(loc, |ce| ce.status.insert(EntryStatus::RECONCILE))?;
                Ok(None)
            }
            Some(loc) => Ok(Some(loc)),
            None => Ok(None),
        }
    }

    fn new_scanned(&mut self, nc: usize, slot: u32, part: u16, mtype: &str) -> Result<EntryLoc> {
        let loc = self.free_entry(nc)?;
        self.update(loc, |ce| {
            ce.status.insert(EntryStatus::NEEDS_AUDIT);
            ce.slot = slot;
            ce.part = part;
            ce.mtype = mtype.to_string();
        })?;
        Ok(loc)
    }

    /// Store a barcode and derive labeling state from it
    fn apply_barcode(&mut self, loc: EntryLoc, barcode: &str) -> Result<()> {
        let defaults = self.config.defaults;
        self.update(loc, |ce| {
            ce.barcode = barcode.to_string();
            if defaults.label_barcode && ce.vsn.is_empty() {
                policy::vsn_from_barcode(ce, &defaults);
                ce.status.insert(EntryStatus::LABELED);
                ce.status.remove(EntryStatus::NEEDS_AUDIT);
            } else if !ce.vsn.is_empty() {
                ce.status.insert(EntryStatus::LABELED);
                ce.status.remove(EntryStatus::NEEDS_AUDIT);
            } else {
                ce.status.insert(EntryStatus::NEEDS_AUDIT);
            }
            if !ce.status.contains(EntryStatus::CLEANING) {
                policy::check_for_cleaning(ce);
            }
        })?;
        Ok(())
    }

    /// Move a cartridge displaced from its slot to the historian
    fn evict_to_historian(&mut self, loc: EntryLoc) -> Result<()> {
        let moved = self.move_cartridge(loc, self.historian, None)?;
        if self.config.defaults.export_unavail {
            for loc in moved {
                let ce = self.update(loc, |ce| ce.status.insert(EntryStatus::UNAVAIL))?;
                self.notify_remote(&ce, RemoteChange::Export);
            }
        }
        Ok(())
    }

    pub(crate) fn move_slot(&mut self, vid: &VolId, dest_slot: u32) -> Result<Response> {
        let loc = lookup::resolve(&self.stores, vid)?;
        let ce = self.entry(loc)?;

        let occupied = if vid.is_logical() {
            lookup::by_location(&self.stores, ce.eq, dest_slot, 0).is_ok()
        } else {
            let dest = VolId {
                slot: dest_slot,
                ..vid.clone()
            };
            lookup::resolve(&self.stores, &dest).is_ok()
        };
        if occupied {
            return Err(CatalogError::DestinationOccupied {
                eq: ce.eq,
                slot: dest_slot,
            });
        }

        for part in lookup::cartridge(&self.stores, loc) {
            let moved = self.update(part, |ce| ce.slot = dest_slot)?;
            self.notify_remote(&moved, RemoteChange::Update);
        }
        info!("Volume {} moved to slot {}", vid, dest_slot);
        Ok(Response::Ok)
    }

    /// Replace whatever occupies a slot with `partitions` new partitions
    ///
    /// Partition `n` is named `<vsn>:<n-1>`.
    pub(crate) fn format_partitions(
        &mut self,
        vid: &VolId,
        partitions: u16,
        status: EntryStatus,
    ) -> Result<Response> {
        if partitions == 0 {
            return Err(CatalogError::InvalidArgument(
                "partition count must be at least 1".into(),
            ));
        }
        let nc = self.find(vid.eq)?;
        let slot = if vid.slot != NO_SLOT {
            for loc in self.slot_entries(nc, vid.slot) {
                self.release(loc)?;
            }
            vid.slot
        } else {
            lookup::free_slot(&self.stores[nc])
        };

        for np in 1..=partitions {
            let loc = self.free_entry(nc)?;
            let ce = self.update(loc, |ce| {
                *ce = CatalogEntry {
                    eq: ce.eq,
                    mid: ce.mid,
                    status: status | EntryStatus::IN_USE | EntryStatus::PARTITIONED,
                    slot,
                    part: np,
                    mtype: vid.mtype.clone(),
                    vsn: format!("{}:{}", vid.vsn, np - 1),
                    ..CatalogEntry::default()
                };
            })?;
            self.notify_remote(&ce, RemoteChange::Update);
        }
        info!(
            "Formatted {} partitions of {} at {}:{}",
            partitions, vid.vsn, vid.eq, slot
        );
        self.notify_archiver();
        Ok(Response::Ok)
    }
}
