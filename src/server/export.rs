//! Export to the historian and catalog reconciliation

use super::notify::RemoteChange;
use super::CatalogServer;
use crate::core::error::{CatalogError, Result};
use crate::core::lookup::{self, EntryLoc};
use crate::core::status::EntryStatus;
use crate::core::volid::{VolId, VolIdFlags};
use crate::protocol::Response;
use tracing::info;

impl CatalogServer {
    /// Move a volume to the historian; a volume already there is forgotten
    pub(crate) fn export(&mut self, vid: &VolId) -> Result<Response> {
        let loc = if vid.is_logical() {
            lookup::by_media(&self.stores, &vid.mtype, &vid.vsn)?
        } else {
            let part = if vid.has(VolIdFlags::PART) { vid.part } else { 0 };
            lookup::by_location(&self.stores, vid.eq, vid.slot, part)?
        };

        if loc.store == self.historian {
            self.release_cartridge(loc)?;
            info!("Volume {} removed from the historian", vid);
        } else {
            self.export_cartridge(loc)?;
        }
        self.notify_archiver();
        Ok(Response::Ok)
    }

    fn export_cartridge(&mut self, loc: EntryLoc) -> Result<()> {
        let ce = self.entry(loc)?;
        self.notify_remote(&ce, RemoteChange::Export);
        let moved = self.move_cartridge(loc, self.historian, None)?;
        if self.config.defaults.export_unavail {
            for loc in moved {
                let ce = self.update(loc, |ce| ce.status.insert(EntryStatus::UNAVAIL))?;
                self.notify_remote(&ce, RemoteChange::Export);
            }
        }
        Ok(())
    }

    /// Export every volume of a library
    pub(crate) fn library_export(&mut self, eq: u16) -> Result<Response> {
        let nc = self.find(eq)?;
        if nc == self.historian {
            return Err(CatalogError::HistorianExport(eq));
        }
        let mut exported = 0;
        for index in 0..self.stores[nc].count() {
            let loc = EntryLoc { store: nc, index };
            // Earlier moves free later partitions of the same cartridge
            let in_use = self.stores[nc].view(index).is_some_and(|v| v.in_use());
            if in_use {
                self.export_cartridge(loc)?;
                exported += 1;
            }
        }
        info!("Exported {} volumes from equipment {}", exported, eq);
        self.notify_archiver();
        Ok(Response::Ok)
    }

    /// Forget volumes not seen since the last scan, then recheck duplicates
    pub(crate) fn reconcile_catalog(&mut self, eq: u16) -> Result<Response> {
        let nc = self.find(eq)?;
        let stale: Vec<EntryLoc> = self.stores[nc]
            .views()
            .filter(|(_, v)| v.in_use() && v.status().contains(EntryStatus::RECONCILE))
            .map(|(index, _)| EntryLoc { store: nc, index })
            .collect();
        for &loc in &stale {
            self.release(loc)?;
        }
        if !stale.is_empty() {
            info!("Reconcile dropped {} entries from equipment {}", stale.len(), eq);
        }
        self.sort_and_check("", "", None, true, true)?;
        Ok(Response::Ok)
    }
}
