//! Hooks for collaborators told about catalog changes
//!
//! Notices are queued while a request is applied and delivered only once it
//! succeeds, so a rolled-back request never reaches them.

use crate::core::entry::CatalogEntry;
use tracing::debug;

/// Why a remote SAM client is told about an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteChange {
    Update,
    /// The volume was exported to the historian
    Export,
}

/// Pushes changed entries to remote SAM clients
pub trait RemoteNotifier: Send {
    fn entry_changed(&mut self, ce: &CatalogEntry, change: RemoteChange);
}

/// Tells the archiver to rescan the catalogs
pub trait ArchiverNotifier: Send {
    fn catalog_changed(&mut self);
}

/// Default hook that only traces
#[derive(Debug, Default, Clone, Copy)]
pub struct TraceNotifier;

impl RemoteNotifier for TraceNotifier {
    fn entry_changed(&mut self, ce: &CatalogEntry, change: RemoteChange) {
        debug!(
            "Remote update {:?} for {}:{}:{} {}.{}",
            change, ce.eq, ce.slot, ce.part, ce.mtype, ce.vsn
        );
    }
}

impl ArchiverNotifier for TraceNotifier {
    fn catalog_changed(&mut self) {
        debug!("Archiver notified of catalog change");
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Notice {
    Remote(Box<CatalogEntry>, RemoteChange),
    Archiver,
}
