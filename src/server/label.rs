//! Labeling verbs

use super::notify::RemoteChange;
use super::CatalogServer;
use crate::core::entry::{CatalogEntry, Reservation};
use crate::core::error::{CatalogError, Result};
use crate::core::lookup;
use crate::core::status::EntryStatus;
use crate::core::unix_now;
use crate::core::volid::VolId;
use crate::protocol::Response;
use tracing::{debug, info};

impl CatalogServer {
    /// Reserve `new_vsn` for a volume about to be labeled
    ///
    /// A placeholder entry holds the new VSN until the label completes or
    /// fails, so no other volume can take it meanwhile.
    pub(crate) fn label_volume(&mut self, vid: &VolId, new_vsn: &str) -> Result<Response> {
        let ce = lookup::resolve(&self.stores, vid).ok();
        let taken = lookup::by_media(&self.stores, &vid.mtype, new_vsn).ok();

        match (ce, taken) {
            (Some(ce), Some(cet)) if ce != cet => Err(CatalogError::DuplicateVsn {
                mtype: vid.mtype.clone(),
                vsn: new_vsn.to_string(),
            }),
            (Some(ce), None) => {
                let nc = ce.store;
                let slot = lookup::free_slot(&self.stores[nc]);
                let loc = self.free_entry(nc)?;
                let placeholder = self.update(loc, |p| {
                    p.status = EntryStatus::IN_USE | EntryStatus::LABELED;
                    p.mtype = vid.mtype.clone();
                    p.vsn = new_vsn.to_string();
                    p.slot = slot;
                })?;
                debug!("VSN {}.{} held for labeling", vid.mtype, new_vsn);
                self.notify_remote(&placeholder, RemoteChange::Update);
                Ok(Response::Ok)
            }
            _ => Ok(Response::Ok),
        }
    }

    /// Take the new label into the catalog and drop the placeholder
    pub(crate) fn label_complete(&mut self, cea: &CatalogEntry) -> Result<Response> {
        let loc = lookup::by_location(&self.stores, cea.eq, cea.slot, cea.part)?;
        if let Ok(placeholder) = lookup::by_media(&self.stores, &cea.mtype, &cea.vsn) {
            if placeholder != loc {
                self.release(placeholder)?;
            }
        }

        let now = unix_now();
        let ce = self.update(loc, |ce| {
            if ce.status.contains(EntryStatus::LABELED)
                && ce.label_time != 0
                && ce.reservation.time != 0
            {
                info!(
                    "Relabel of {}.{} drops reservation for {}",
                    ce.mtype, ce.vsn, ce.reservation.asname
                );
                ce.reservation = Reservation::default();
            }
            ce.vsn = cea.vsn.clone();
            ce.mtype = cea.mtype.clone();
            ce.capacity = cea.capacity;
            ce.space = cea.space;
            ce.block_size = cea.block_size;
            ce.label_time = cea.label_time;
            ce.mode_word = cea.mode_word;
            ce.mod_time = now;
            ce.status.remove(
                EntryStatus::NEEDS_AUDIT
                    | EntryStatus::BAD_MEDIA
                    | EntryStatus::RECYCLE
                    | EntryStatus::DUP_VSN
                    | EntryStatus::ARCH_FULL,
            );
            ce.status.insert(
                EntryStatus::LABELED
                    | (cea.status & (EntryStatus::BAD_MEDIA | EntryStatus::RECYCLE)),
            );
        })?;

        for part in lookup::cartridge(&self.stores, loc) {
            let updated = self.update(part, |p| {
                p.status.insert(EntryStatus::IN_USE);
                p.status.remove(EntryStatus::OCCUPIED);
            })?;
            self.notify_remote(&updated, RemoteChange::Update);
        }
        info!("Labeled {}.{} at {}:{}", ce.mtype, ce.vsn, ce.eq, ce.slot);
        self.notify_archiver();
        Ok(Response::Ok)
    }

    /// Drop the placeholder left by [`label_volume`](Self::label_volume)
    pub(crate) fn label_failed(&mut self, vid: &VolId, new_vsn: &str) -> Result<Response> {
        let placeholder = lookup::by_media(&self.stores, &vid.mtype, new_vsn).ok();
        let ce = lookup::by_media(&self.stores, &vid.mtype, &vid.vsn)
            .or_else(|_| lookup::by_location(&self.stores, vid.eq, vid.slot, vid.part))
            .ok();
        if let (Some(cet), Some(ce)) = (placeholder, ce) {
            if cet != ce {
                self.release(cet)?;
                debug!("Label of {}.{} failed, VSN released", vid.mtype, new_vsn);
            }
        }
        Ok(Response::Ok)
    }
}
