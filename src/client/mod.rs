//! Catalog client
//!
//! Maps the catalog table and every catalog read-only. Lookups run against
//! the local mappings; mutations go to the catalog server and are followed
//! by a [`sync`](CatalogClient::sync) so the caller reads its own writes.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use samcat::client::CatalogClient;
//! use samcat::protocol::UnixTransport;
//!
//! let transport = UnixTransport::new("/var/opt/catalog/catserver.sock");
//! let client = CatalogClient::init("stager", Box::new(transport)).unwrap();
//! let ce = client.get_by_media("li", "VOL001").unwrap();
//! println!("{}", ce);
//! ```

mod cache;

pub use cache::CacheStats;

use crate::core::entry::{CatalogEntry, CeField, Reservation};
use crate::core::error::{CatalogError, Result};
use crate::core::header::CatalogHeader;
use crate::core::lookup::{self, EntryLoc};
use crate::core::status::EntryStatus;
use crate::core::store::ReadOnlyStore;
use crate::core::table::ReadOnlyTable;
use crate::core::volid::VolId;
use crate::protocol::{Request, Response, Transport};
use cache::{EntryCache, Query};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

struct Mapped {
    table: ReadOnlyTable,
    stores: Vec<ReadOnlyStore>,
    /// Bumped whenever any catalog is remapped
    generation: u64,
}

impl Mapped {
    fn open(table_path: &Path) -> Result<Self> {
        let table = ReadOnlyTable::open(table_path)?;
        if !table.is_valid() {
            return Err(CatalogError::TableInvalid(table_path.display().to_string()));
        }
        let stores = table
            .files()
            .iter()
            .map(ReadOnlyStore::open_readonly)
            .collect::<Result<Vec<_>>>()?;
        Ok(Mapped {
            table,
            stores,
            generation: 0,
        })
    }

    fn current(&self) -> bool {
        self.table.is_valid() && !self.stores.iter().any(|s| s.is_stale())
    }
}

pub struct CatalogClient {
    name: String,
    transport: Box<dyn Transport>,
    mapped: RwLock<Option<Mapped>>,
    cache: EntryCache,
}

impl CatalogClient {
    /// Ask the server for the catalog table and map it with every catalog
    pub fn init(name: &str, transport: Box<dyn Transport>) -> Result<Self> {
        let client = CatalogClient {
            name: name.to_string(),
            transport,
            mapped: RwLock::new(None),
            cache: EntryCache::default(),
        };
        client.remap()?;
        Ok(client)
    }

    /// Drop every mapping and map the table the server currently publishes
    ///
    /// Needed after the server restarts, when [`sync`](Self::sync) reports
    /// [`CatalogError::TableInvalid`].
    pub fn remap(&self) -> Result<()> {
        let table_path = match self.transport.call(Request::GetInfo)?.into_result()? {
            Response::Info { table_path } => table_path,
            other => {
                return Err(CatalogError::InvalidArgument(format!(
                    "unexpected reply to GetInfo: {:?}",
                    other
                )))
            }
        };
        let fresh = Mapped::open(&table_path)?;
        let mut mapped = self.mapped.write();
        let generation = mapped.as_ref().map_or(0, |m| m.generation + 1);
        *mapped = Some(Mapped { generation, ..fresh });
        self.cache.invalidate();
        info!(
            "Client {} mapped {} catalogs from {:?}",
            self.name,
            mapped.as_ref().map_or(0, |m| m.stores.len()),
            table_path
        );
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remap every catalog whose file was replaced; returns how many were
    ///
    /// An invalidated table unmaps everything and fails with
    /// [`CatalogError::TableInvalid`].
    pub fn sync(&self) -> Result<usize> {
        let mut guard = self.mapped.write();
        let mapped = guard
            .as_mut()
            .ok_or_else(|| CatalogError::TableInvalid("catalogs not mapped".into()))?;

        if !mapped.table.is_valid() {
            let path = mapped.table.path().display().to_string();
            *guard = None;
            self.cache.invalidate();
            info!("Catalog table {} invalidated, catalogs unmapped", path);
            return Err(CatalogError::TableInvalid(path));
        }

        let files: Vec<PathBuf> = mapped.table.files().to_vec();
        let mut changed = 0;
        for (i, path) in files.iter().enumerate() {
            match mapped.stores.get(i).map(|s| s.is_stale()) {
                Some(false) => continue,
                Some(true) => mapped.stores[i] = ReadOnlyStore::open_readonly(path)?,
                None => mapped.stores.push(ReadOnlyStore::open_readonly(path)?),
            }
            debug!("Remapped catalog {:?}", path);
            changed += 1;
        }
        if changed > 0 {
            mapped.generation += 1;
            self.cache.invalidate();
        }
        Ok(changed)
    }

    /// Unmap everything; later lookups fail until [`remap`](Self::remap)
    pub fn unmap(&self) {
        *self.mapped.write() = None;
        self.cache.invalidate();
    }

    /// Run `f` against current mappings, resyncing first when any is stale
    fn with_stores<T, F>(&self, f: F) -> Result<T>
    where
        F: Fn(&[ReadOnlyStore], u64) -> Result<T>,
    {
        loop {
            {
                let guard = self.mapped.read();
                let mapped = guard
                    .as_ref()
                    .ok_or_else(|| CatalogError::TableInvalid("catalogs not mapped".into()))?;
                if mapped.current() {
                    return f(&mapped.stores, mapped.generation);
                }
            }
            self.sync()?;
        }
    }

    fn cached_lookup<F>(&self, query: Query, search: F) -> Result<CatalogEntry>
    where
        F: Fn(&[ReadOnlyStore]) -> Result<EntryLoc>,
    {
        self.with_stores(|stores, generation| {
            let live = |loc: EntryLoc| lookup::entry_at(stores, loc).ok();
            if let Some(ce) = self.cache.lookup(&query, generation, live) {
                return Ok(ce);
            }
            let loc = search(stores)?;
            let ce = lookup::entry_at(stores, loc)?;
            self.cache.store(query.clone(), loc, &ce, generation);
            Ok(ce)
        })
    }

    pub fn get_by_location(&self, eq: u16, slot: u32, part: u16) -> Result<CatalogEntry> {
        self.cached_lookup(Query::Location { eq, slot, part }, |stores| {
            lookup::by_location(stores, eq, slot, part)
        })
    }

    pub fn get_by_media(&self, mtype: &str, vsn: &str) -> Result<CatalogEntry> {
        let query = Query::Media {
            mtype: mtype.to_string(),
            vsn: vsn.to_string(),
        };
        self.cached_lookup(query, |stores| lookup::by_media(stores, mtype, vsn))
    }

    pub fn get_by_barcode(&self, eq: u16, mtype: &str, barcode: &str) -> Result<CatalogEntry> {
        let query = Query::Barcode {
            eq,
            mtype: mtype.to_string(),
            barcode: barcode.to_string(),
        };
        self.cached_lookup(query, |stores| lookup::by_barcode(stores, eq, mtype, barcode))
    }

    pub fn get_by_mid(&self, mid: u32) -> Result<CatalogEntry> {
        self.cached_lookup(Query::Mid(mid), |stores| lookup::by_mid(stores, mid))
    }

    /// Entry named by a [`VolId`], logical or physical
    pub fn get_entry(&self, vid: &VolId) -> Result<CatalogEntry> {
        vid.check()?;
        self.cached_lookup(Query::Vol(vid.clone()), |stores| lookup::resolve(stores, vid))
    }

    /// Like [`get_entry`](Self::get_entry), taking the partition only when named
    pub fn check_slot(&self, vid: &VolId) -> Result<CatalogEntry> {
        vid.check()?;
        self.with_stores(|stores, _| {
            let loc = lookup::check_slot(stores, vid)?;
            lookup::entry_at(stores, loc)
        })
    }

    /// [`check_slot`](Self::check_slot) that also requires a partition for
    /// partitioned media
    pub fn check_volid(&self, vid: &VolId) -> Result<CatalogEntry> {
        vid.check()?;
        self.with_stores(|stores, _| {
            let loc = lookup::check_volid(stores, vid)?;
            lookup::entry_at(stores, loc)
        })
    }

    pub fn cleaning_volume(&self, eq: u16) -> Result<CatalogEntry> {
        self.with_stores(|stores, _| {
            let loc = lookup::cleaning_volume(stores, eq)?;
            lookup::entry_at(stores, loc)
        })
    }

    /// Copies of entries `start..end` of one catalog
    pub fn get_entries(&self, eq: u16, start: usize, end: usize) -> Result<Vec<CatalogEntry>> {
        self.with_stores(|stores, _| {
            let nc = lookup::find_catalog(stores, eq)?;
            stores[nc].entries(start, end)
        })
    }

    pub fn get_header(&self, eq: u16) -> Result<CatalogHeader> {
        self.with_stores(|stores, _| {
            let nc = lookup::find_catalog(stores, eq)?;
            Ok(stores[nc].header().clone())
        })
    }

    pub fn get_header_by_path<P: AsRef<Path>>(&self, path: P) -> Result<CatalogHeader> {
        let path = path.as_ref();
        self.with_stores(|stores, _| {
            stores
                .iter()
                .find(|s| s.path() == path)
                .map(|s| s.header().clone())
                .ok_or_else(|| CatalogError::CatalogPathMissing(path.to_path_buf()))
        })
    }

    /// Copies of every in-use entry of one catalog
    pub fn entries_by_library(&self, eq: u16) -> Result<Vec<CatalogEntry>> {
        self.with_stores(|stores, _| {
            let nc = lookup::find_catalog(stores, eq)?;
            lookup::in_use_entries(&stores[nc])
        })
    }

    /// Headers of every mapped catalog, in table order
    pub fn headers(&self) -> Result<Vec<CatalogHeader>> {
        self.with_stores(|stores, _| Ok(stores.iter().map(|s| s.header().clone()).collect()))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Send one request; on success drop the cached entry and resync
    fn call(&self, request: Request) -> Result<Response> {
        let name = request.name();
        let rsp = self.transport.call(request)?.into_result()?;
        self.cache.invalidate();
        self.sync()?;
        debug!("Client {} {} ok", self.name, name);
        Ok(rsp)
    }

    fn call_ok(&self, request: Request) -> Result<()> {
        self.call(request).map(|_| ())
    }

    /// Allocate an entry at the lowest free slot; returns the slot
    pub fn assign_free_slot(&self, eq: u16) -> Result<u32> {
        match self.call(Request::AssignFreeSlot { eq })? {
            Response::Slot(slot) => Ok(slot),
            other => Err(CatalogError::InvalidArgument(format!(
                "unexpected reply to AssignFreeSlot: {:?}",
                other
            ))),
        }
    }

    pub fn export(&self, vid: &VolId) -> Result<()> {
        self.call_ok(Request::Export { vid: vid.clone() })
    }

    pub fn format_partitions(&self, vid: &VolId, partitions: u16, status: EntryStatus) -> Result<()> {
        self.call_ok(Request::FormatPartitions {
            vid: vid.clone(),
            partitions,
            status,
        })
    }

    pub fn label_volume(&self, vid: &VolId, new_vsn: &str) -> Result<()> {
        self.call_ok(Request::LabelVolume {
            vid: vid.clone(),
            new_vsn: new_vsn.to_string(),
        })
    }

    pub fn label_complete(&self, entry: &CatalogEntry) -> Result<()> {
        self.call_ok(Request::LabelComplete {
            entry: entry.clone(),
        })
    }

    pub fn label_failed(&self, vid: &VolId, new_vsn: &str) -> Result<()> {
        self.call_ok(Request::LabelFailed {
            vid: vid.clone(),
            new_vsn: new_vsn.to_string(),
        })
    }

    pub fn library_export(&self, eq: u16) -> Result<()> {
        self.call_ok(Request::LibraryExport { eq })
    }

    pub fn media_closed(&self, entry: &CatalogEntry) -> Result<()> {
        self.call_ok(Request::MediaClosed {
            entry: entry.clone(),
        })
    }

    pub fn move_slot(&self, vid: &VolId, dest_slot: u32) -> Result<()> {
        self.call_ok(Request::MoveSlot {
            vid: vid.clone(),
            dest_slot,
        })
    }

    pub fn reconcile_catalog(&self, eq: u16) -> Result<()> {
        self.call_ok(Request::ReconcileCatalog { eq })
    }

    pub fn remote_sam_update(&self, entry: &CatalogEntry, relabel: bool) -> Result<()> {
        self.call_ok(Request::RemoteSamUpdate {
            entry: entry.clone(),
            relabel,
        })
    }

    pub fn reserve_volume(&self, vid: &VolId, reservation: &Reservation) -> Result<()> {
        self.call_ok(Request::ReserveVolume {
            vid: vid.clone(),
            reservation: reservation.clone(),
        })
    }

    pub fn unreserve_volume(&self, vid: &VolId) -> Result<()> {
        self.call_ok(Request::UnReserveVolume { vid: vid.clone() })
    }

    pub fn set_audit(&self, eq: u16) -> Result<()> {
        self.call_ok(Request::SetAudit { eq })
    }

    pub fn set_cleaning(&self, eq: u16) -> Result<()> {
        self.call_ok(Request::SetCleaning { eq })
    }

    pub fn set_remote_server(&self) -> Result<()> {
        self.call_ok(Request::SetRemoteServer)
    }

    pub fn slot_init(
        &self,
        vid: &VolId,
        status: EntryStatus,
        two_sided: bool,
        barcode: &str,
        alt_barcode: &str,
    ) -> Result<()> {
        self.call_ok(Request::SlotInit {
            vid: vid.clone(),
            status,
            two_sided,
            barcode: barcode.to_string(),
            alt_barcode: alt_barcode.to_string(),
        })
    }

    /// Set an integer field; for the status field only bits in `mask` change
    pub fn set_field(&self, vid: &VolId, field: CeField, value: u64, mask: u32) -> Result<()> {
        self.call_ok(Request::SetField {
            vid: vid.clone(),
            field,
            value,
            mask,
        })
    }

    pub fn set_string(&self, vid: &VolId, field: CeField, value: &str) -> Result<()> {
        self.call_ok(Request::SetString {
            vid: vid.clone(),
            field,
            value: value.to_string(),
        })
    }

    /// [`set_field`](Self::set_field) addressed by location
    pub fn set_field_by_loc(
        &self,
        eq: u16,
        slot: u32,
        part: u16,
        field: CeField,
        value: u64,
        mask: u32,
    ) -> Result<()> {
        self.set_field(&VolId::partition(eq, slot, part), field, value, mask)
    }

    pub fn set_string_by_loc(
        &self,
        eq: u16,
        slot: u32,
        part: u16,
        field: CeField,
        value: &str,
    ) -> Result<()> {
        self.set_string(&VolId::partition(eq, slot, part), field, value)
    }

    pub fn volume_loaded(&self, entry: &CatalogEntry) -> Result<()> {
        self.call_ok(Request::VolumeLoaded {
            entry: entry.clone(),
        })
    }

    pub fn volume_unloaded(&self, vid: &VolId, barcode: &str) -> Result<()> {
        self.call_ok(Request::VolumeUnloaded {
            vid: vid.clone(),
            barcode: barcode.to_string(),
        })
    }

    /// Ask the server to stop; the mappings stay until the next sync
    pub fn shutdown_server(&self) -> Result<()> {
        self.transport.call(Request::Shutdown)?.into_result()?;
        self.cache.invalidate();
        Ok(())
    }
}
