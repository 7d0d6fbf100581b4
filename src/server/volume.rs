//! Drive events and remote updates

use super::notify::RemoteChange;
use super::policy;
use super::CatalogServer;
use crate::core::entry::CatalogEntry;
use crate::core::error::{CatalogError, Result};
use crate::core::lookup::{self, EntryLoc};
use crate::core::status::EntryStatus;
use crate::core::unix_now;
use crate::core::volid::{VolId, VolIdFlags};
use crate::protocol::Response;
use tracing::{debug, info, warn};

impl CatalogServer {
    /// Merge what a drive read from newly mounted media
    ///
    /// Blank media and duplicate VSNs fail the request, but the flags set on
    /// the entry to record them are kept.
    pub(crate) fn volume_loaded(&mut self, cea: &CatalogEntry) -> Result<Response> {
        let mut loc = lookup::by_location(&self.stores, cea.eq, cea.slot, cea.part).ok();
        let outcome = self.merge_loaded(&mut loc, cea);

        if outcome.is_ok() {
            if let Some(first) = loc {
                let now = unix_now();
                self.update(first, |ce| ce.mount_time = now)?;
                for part in lookup::cartridge(&self.stores, first) {
                    let ce = self.update(part, |ce| {
                        ce.status.insert(EntryStatus::IN_USE);
                        ce.status.remove(EntryStatus::OCCUPIED);
                    })?;
                    self.notify_remote(&ce, RemoteChange::Update);
                }
            }
        }

        match outcome {
            Ok(None) => Ok(Response::Ok),
            Ok(Some(e)) => {
                self.keep_changes();
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Returns `Ok(Some(e))` when the request must fail with `e` after
    /// keeping the changes made
    fn merge_loaded(
        &mut self,
        loc: &mut Option<EntryLoc>,
        cea: &CatalogEntry,
    ) -> Result<Option<CatalogError>> {
        let nc = self.find(cea.eq)?;
        let current = match *loc {
            Some(l) => Some(self.entry(l)?),
            None => None,
        };

        if let (Some(l), Some(ce)) = (*loc, &current) {
            if !ce.vsn.is_empty() && cea.vsn.is_empty() {
                self.update(l, |ce| {
                    ce.status.insert(EntryStatus::NEEDS_AUDIT | EntryStatus::BAD_MEDIA)
                })?;
                warn!("Volume {}.{} at {}:{} reads as blank", ce.mtype, ce.vsn, ce.eq, ce.slot);
                return Ok(Some(CatalogError::BlankMedia(format!("{}.{}", ce.mtype, ce.vsn))));
            }
        }

        let unknown = match &current {
            None => true,
            Some(ce) => {
                ce.status.contains(EntryStatus::NEEDS_AUDIT)
                    || ce.vsn.is_empty()
                    || !ce.status.contains(EntryStatus::LABELED)
            }
        };

        if unknown {
            let elsewhere = lookup::by_media(&self.stores, &cea.mtype, &cea.vsn)
                .ok()
                .filter(|h| Some(*h) != *loc);
            match elsewhere {
                Some(ceh) => {
                    if ceh.store != self.historian {
                        warn!(
                            "Volume {}.{} is already cataloged in another library",
                            cea.mtype, cea.vsn
                        );
                        self.sort_and_check(&cea.mtype, &cea.vsn, *loc, false, true)?;
                        if let Some(l) = *loc {
                            self.record_label(l, cea)?;
                        }
                        return Ok(Some(CatalogError::DuplicateVsn {
                            mtype: cea.mtype.clone(),
                            vsn: cea.vsn.clone(),
                        }));
                    }

                    // The historian knew this volume; bring its entry into the library
                    let mut known = self.entry(ceh)?;
                    policy::verify_volume(&mut known, cea, false);
                    if let Some(l) = *loc {
                        self.release_cartridge(l)?;
                    }
                    self.move_cartridge(ceh, nc, Some(cea.slot))?;
                    let l = lookup::by_location(&self.stores, cea.eq, cea.slot, cea.part)?;
                    for part in lookup::cartridge(&self.stores, l) {
                        self.update(part, |ce| ce.status.remove(EntryStatus::UNAVAIL))?;
                    }
                    *loc = Some(l);
                    self.notify_archiver();
                }
                None => {
                    let l = match *loc {
                        Some(l) => l,
                        None => {
                            let l = self.free_entry(nc)?;
                            self.update(l, |ce| {
                                ce.slot = cea.slot;
                                ce.part = cea.part;
                            })?;
                            *loc = Some(l);
                            l
                        }
                    };
                    self.update(l, |ce| {
                        ce.mtype = cea.mtype.clone();
                        ce.vsn = cea.vsn.clone();
                        if !ce.status.contains(EntryStatus::CAPACITY_SET) {
                            ce.capacity = cea.capacity;
                        }
                        ce.space = cea.space;
                        ce.block_size = cea.block_size;
                        ce.label_time = cea.label_time;
                        ce.mode_word = cea.mode_word;
                    })?;
                }
            }
            if let Some(l) = *loc {
                self.update(l, |ce| {
                    if !ce.vsn.is_empty() {
                        ce.status.insert(EntryStatus::LABELED);
                        ce.status.remove(EntryStatus::NEEDS_AUDIT);
                    }
                })?;
            }
        } else if let (Some(l), Some(ce)) = (*loc, &current) {
            if cea.label_time == 0 && ce.label_time != 0 {
                let mut checked = ce.clone();
                policy::verify_volume(&mut checked, cea, false);
            } else {
                self.update(l, |ce| {
                    policy::verify_volume(ce, cea, true);
                    if cea.space <= ce.capacity {
                        ce.space = cea.space;
                    }
                })?;
            }
            self.update(l, |ce| ce.block_size = cea.block_size)?;
        }

        let Some(l) = *loc else {
            return Ok(None);
        };
        let ce = self.entry(l)?;
        if self.sort_and_check(&ce.mtype, &ce.vsn, Some(l), false, true)? != 0 {
            self.record_label(l, cea)?;
            self.update(l, |ce| ce.status.insert(EntryStatus::DUP_VSN))?;
            return Ok(Some(CatalogError::DuplicateVsn {
                mtype: ce.mtype,
                vsn: ce.vsn,
            }));
        }

        let cleaning = ce.status.contains(EntryStatus::CLEANING);
        self.update(l, |ce| {
            ce.status.remove(
                EntryStatus::DUP_VSN
                    | EntryStatus::OCCUPIED
                    | EntryStatus::NEEDS_AUDIT
                    | EntryStatus::WRITE_PROTECT,
            );
            ce.status.insert(
                EntryStatus::IN_USE
                    | (cea.status
                        & (EntryStatus::BAD_MEDIA
                            | EntryStatus::WRITE_PROTECT
                            | EntryStatus::NEEDS_AUDIT
                            | EntryStatus::BAR_CODE)),
            );
            if cleaning {
                ce.access = ce.access.saturating_sub(1);
            } else {
                ce.access = ce.access.saturating_add(1);
            }
        })?;
        debug!("Volume {}.{} loaded at {}:{}", ce.mtype, ce.vsn, ce.eq, ce.slot);
        Ok(None)
    }

    /// Note the label a drive read on an entry about to be flagged
    fn record_label(&mut self, loc: EntryLoc, cea: &CatalogEntry) -> Result<()> {
        let now = unix_now();
        self.update(loc, |ce| {
            ce.vsn = cea.vsn.clone();
            ce.status.insert(EntryStatus::LABELED);
            ce.status.remove(EntryStatus::NEEDS_AUDIT);
            ce.label_time = cea.label_time;
            ce.mount_time = now;
            ce.access = ce.access.saturating_add(1);
        })?;
        Ok(())
    }

    /// Media left the drive and is back in its slot
    pub(crate) fn volume_unloaded(&mut self, vid: &VolId, barcode: &str) -> Result<Response> {
        let loc = if vid.is_logical() {
            lookup::by_media(&self.stores, &vid.mtype, &vid.vsn).ok()
        } else if vid.has(VolIdFlags::CART) {
            match lookup::by_location(&self.stores, vid.eq, vid.slot, vid.part) {
                Ok(l) => Some(l),
                Err(_) => {
                    let l = lookup::by_location(&self.stores, vid.eq, vid.slot, 0).ok();
                    if let Some(l) = l {
                        self.update(l, |ce| ce.part = vid.part)?;
                    }
                    l
                }
            }
        } else {
            None
        };
        let loc = loc
            .or_else(|| lookup::by_barcode(&self.stores, vid.eq, &vid.mtype, barcode).ok())
            .ok_or_else(|| CatalogError::BarcodeNotFound {
                eq: vid.eq,
                barcode: barcode.to_string(),
            })?;

        for part in lookup::cartridge(&self.stores, loc) {
            let ce = self.update(part, |ce| {
                ce.status.insert(EntryStatus::OCCUPIED);
                ce.status.remove(EntryStatus::UNAVAIL);
            })?;
            self.notify_remote(&ce, RemoteChange::Update);
        }
        Ok(Response::Ok)
    }

    /// Record space and position after media was written
    pub(crate) fn media_closed(&mut self, cea: &CatalogEntry) -> Result<Response> {
        let loc = lookup::by_location(&self.stores, cea.eq, cea.slot, cea.part)?;
        let now = unix_now();
        let ce = self.update(loc, |ce| {
            ce.space = cea.space;
            ce.mod_time = now;
            ce.mode_word = cea.mode_word;
            if ce.capacity != cea.capacity && !ce.status.contains(EntryStatus::CAPACITY_SET) {
                ce.capacity = cea.capacity;
            }
        })?;
        self.notify_remote(&ce, RemoteChange::Update);
        Ok(Response::Ok)
    }

    /// Apply an entry image sent by a remote SAM server
    ///
    /// A relabel drops the local entry for the old VSN.
    pub(crate) fn remote_sam_update(
        &mut self,
        cea: &CatalogEntry,
        relabel: bool,
    ) -> Result<Response> {
        let nc = self.find(cea.eq)?;
        let found = lookup::by_media(&self.stores, &cea.mtype, &cea.vsn).ok();

        if relabel {
            if let Some(loc) = found {
                self.release(loc)?;
                info!("Remote relabel dropped {}.{}", cea.mtype, cea.vsn);
            }
            return Ok(Response::Ok);
        }

        let loc = match found {
            Some(loc) => loc,
            None => {
                let slot = lookup::free_slot(&self.stores[nc]);
                let loc = self.free_entry(nc)?;
                self.update(loc, |ce| ce.slot = slot)?;
                loc
            }
        };

        let targets = if loc.store == self.historian && nc != self.historian {
            self.move_cartridge(loc, nc, None)?
        } else {
            self.update(loc, |ce| {
                ce.mtype = cea.mtype.clone();
                ce.vsn = cea.vsn.clone();
                ce.access = cea.access;
                ce.capacity = cea.capacity;
                ce.space = cea.space;
                ce.block_size = cea.block_size;
                ce.label_time = cea.label_time;
                ce.mod_time = cea.mod_time;
                ce.mount_time = cea.mount_time;
                ce.barcode = cea.barcode.clone();
                ce.mode_word = cea.mode_word;
                ce.part = cea.part;
            })?;
            self.notify_archiver();
            lookup::cartridge(&self.stores, loc)
        };

        for part in targets {
            self.update(part, |ce| ce.status = cea.status | EntryStatus::IN_USE)?;
        }
        Ok(Response::Ok)
    }
}
