//! Catalog server
//!
//! The only process that maps catalogs read-write. Requests are applied one
//! at a time by a single loop; that ordering is the sole concurrency control,
//! so allocation and duplicate checks need no locks.
//!
//! Each request runs against an undo [`Journal`]: on failure every entry it
//! touched is restored and queued notices are dropped.

mod alloc;
mod dupcheck;
mod export;
mod fields;
mod label;
pub mod notify;
pub mod policy;
mod slots;
mod startup;
mod txn;
mod volume;

use crate::config::ServerConfig;
use crate::core::entry::CatalogEntry;
use crate::core::error::{CatalogError, Result};
use crate::core::lookup::{self, EntryLoc};
use crate::core::store::WritableStore;
use crate::core::table::WritableTable;
use crate::protocol::{read_frame, write_frame, Envelope, Request, Response};
use crossbeam::channel::Receiver;
use notify::{ArchiverNotifier, Notice, RemoteChange, RemoteNotifier, TraceNotifier};
use std::os::unix::net::UnixListener;
use std::path::Path;
use tracing::{debug, error, info, warn};
use txn::Journal;

pub struct CatalogServer {
    config: ServerConfig,
    stores: Vec<WritableStore>,
    historian: usize,
    table: WritableTable,
    remote_server: bool,
    journal: Journal,
    notices: Vec<Notice>,
    remote: Box<dyn RemoteNotifier>,
    archiver: Box<dyn ArchiverNotifier>,
}

impl CatalogServer {
    /// Replace the trace-only notification hooks
    pub fn with_notifiers(
        mut self,
        remote: Box<dyn RemoteNotifier>,
        archiver: Box<dyn ArchiverNotifier>,
    ) -> Self {
        self.remote = remote;
        self.archiver = archiver;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn table_path(&self) -> &Path {
        self.table.path()
    }

    pub fn stores(&self) -> &[WritableStore] {
        &self.stores
    }

    pub fn historian_eq(&self) -> u16 {
        self.stores[self.historian].eq()
    }

    pub fn is_remote_server(&self) -> bool {
        self.remote_server
    }

    /// Apply one request and build its reply
    pub fn handle(&mut self, request: &Request) -> Response {
        let result = self.apply(request);
        match &result {
            Ok(_) => {
                self.journal.commit();
                self.deliver_notices();
                debug!("{} = ok", request);
            }
            Err(e) => {
                self.rollback();
                error!("{} failed: {}", request, e);
            }
        }
        Response::from(result)
    }

    fn apply(&mut self, request: &Request) -> Result<Response> {
        match request {
            Request::GetInfo => Ok(Response::Info {
                table_path: self.table.path().to_path_buf(),
            }),
            Request::AssignFreeSlot { eq } => self.assign_free_slot(*eq),
            Request::Export { vid } => self.export(vid),
            Request::FormatPartitions {
                vid,
                partitions,
                status,
            } => self.format_partitions(vid, *partitions, *status),
            Request::LabelVolume { vid, new_vsn } => self.label_volume(vid, new_vsn),
            Request::LabelComplete { entry } => self.label_complete(entry),
            Request::LabelFailed { vid, new_vsn } => self.label_failed(vid, new_vsn),
            Request::LibraryExport { eq } => self.library_export(*eq),
            Request::MediaClosed { entry } => self.media_closed(entry),
            Request::MoveSlot { vid, dest_slot } => self.move_slot(vid, *dest_slot),
            Request::ReconcileCatalog { eq } => self.reconcile_catalog(*eq),
            Request::RemoteSamUpdate { entry, relabel } => {
                self.remote_sam_update(entry, *relabel)
            }
            Request::ReserveVolume { vid, reservation } => {
                self.reserve_volume(vid, reservation)
            }
            Request::UnReserveVolume { vid } => self.unreserve_volume(vid),
            Request::SetAudit { eq } => self.set_audit(*eq),
            Request::SetCleaning { eq } => self.set_cleaning(*eq),
            Request::SetRemoteServer => {
                self.remote_server = true;
                info!("Acting as a remote SAM server");
                Ok(Response::Ok)
            }
            Request::SlotInit {
                vid,
                status,
                two_sided,
                barcode,
                alt_barcode,
            } => self.slot_init(vid, *status, *two_sided, barcode, alt_barcode),
            Request::SetField {
                vid,
                field,
                value,
                mask,
            } => self.set_field(vid, *field, fields::FieldValue::Int(*value, *mask)),
            Request::SetString { vid, field, value } => {
                self.set_field(vid, *field, fields::FieldValue::Str(value.clone()))
            }
            Request::VolumeLoaded { entry } => self.volume_loaded(entry),
            Request::VolumeUnloaded { vid, barcode } => self.volume_unloaded(vid, barcode),
            Request::Shutdown => Ok(Response::Ok),
        }
    }

    /// Serve an in-process channel until it closes or a shutdown arrives
    pub fn serve(&mut self, rx: &Receiver<Envelope>) {
        while let Ok(Envelope { request, reply }) = rx.recv() {
            let rsp = self.handle(&request);
            if reply.send(rsp).is_err() {
                warn!("Client went away before the reply to {}", request.name());
            }
            if request == Request::Shutdown {
                break;
            }
        }
    }

    /// Serve a Unix socket, one request per connection
    pub fn serve_unix(&mut self, listener: &UnixListener) -> Result<()> {
        for stream in listener.incoming() {
            let mut stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    continue;
                }
            };
            let request: Request = match read_frame(&mut stream) {
                Ok(r) => r,
                Err(e) => {
                    warn!("Dropping malformed request: {}", e);
                    continue;
                }
            };
            let rsp = self.handle(&request);
            if let Err(e) = write_frame(&mut stream, &rsp) {
                warn!("Reply to {} not delivered: {}", request.name(), e);
            }
            if request == Request::Shutdown {
                break;
            }
        }
        Ok(())
    }

    /// Invalidate the catalog table and flush every catalog
    ///
    /// Clients see the table go invalid on their next sync and unmap.
    pub fn shutdown(&mut self) -> Result<()> {
        self.table.invalidate()?;
        for store in &self.stores {
            store.flush()?;
        }
        info!("Catalog server stopped, table {:?} invalidated", self.table.path());
        Ok(())
    }

    pub(crate) fn find(&self, eq: u16) -> Result<usize> {
        lookup::find_catalog(&self.stores, eq)
    }

    pub(crate) fn entry(&self, loc: EntryLoc) -> Result<CatalogEntry> {
        lookup::entry_at(&self.stores, loc)
    }

    /// Write an entry, journaling its previous image
    ///
    /// Space never exceeds capacity in a stored entry.
    pub(crate) fn put(&mut self, loc: EntryLoc, mut ce: CatalogEntry) -> Result<()> {
        if ce.space > ce.capacity {
            ce.space = ce.capacity;
        }
        let store = self.stores.get(loc.store).ok_or_else(|| {
            CatalogError::InvalidArgument(format!("no catalog {}", loc.store))
        })?;
        let before = store.entry_bytes(loc.index).ok_or_else(|| {
            CatalogError::InvalidArgument(format!("no entry {}:{}", loc.store, loc.index))
        })?;
        self.journal.record(loc, before);
        self.stores[loc.store].write_entry(loc.index, &ce)
    }

    pub(crate) fn update<F>(&mut self, loc: EntryLoc, f: F) -> Result<CatalogEntry>
    where
        F: FnOnce(&mut CatalogEntry),
    {
        let mut ce = self.entry(loc)?;
        f(&mut ce);
        self.put(loc, ce.clone())?;
        Ok(ce)
    }

    pub(crate) fn notify_remote(&mut self, ce: &CatalogEntry, change: RemoteChange) {
        if self.remote_server {
            self.notices.push(Notice::Remote(Box::new(ce.clone()), change));
        }
    }

    pub(crate) fn notify_archiver(&mut self) {
        self.notices.push(Notice::Archiver);
    }

    /// Keep the changes made so far even though the request will fail
    pub(crate) fn keep_changes(&mut self) {
        self.journal.commit();
        self.deliver_notices();
    }

    fn deliver_notices(&mut self) {
        let mut archiver = false;
        for notice in self.notices.drain(..) {
            match notice {
                Notice::Remote(ce, change) => self.remote.entry_changed(&ce, change),
                Notice::Archiver => archiver = true,
            }
        }
        if archiver {
            self.archiver.catalog_changed();
        }
    }

    fn rollback(&mut self) {
        self.notices.clear();
        let undo = self.journal.take_undo();
        if !undo.is_empty() {
            debug!("Rolling back {} entries", undo.len());
        }
        for (loc, bytes) in undo {
            let restored = match self.stores.get_mut(loc.store) {
                Some(store) => store.write_raw(loc.index, &bytes),
                None => Err(CatalogError::InvalidArgument(format!("no catalog {}", loc.store))),
            };
            if let Err(e) = restored {
                error!("Rollback of {}:{} failed: {}", loc.store, loc.index, e);
            }
        }
    }

    fn default_notifiers() -> (Box<dyn RemoteNotifier>, Box<dyn ArchiverNotifier>) {
        (Box::new(TraceNotifier), Box::new(TraceNotifier))
    }
}
