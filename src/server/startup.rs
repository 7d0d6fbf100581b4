//! Building the catalog set at server start

use super::{CatalogServer, Journal};
use crate::config::{DeviceConfig, DeviceKind, ServerConfig};
use crate::core::error::{CatalogError, Result};
use crate::core::header::{CatalogHeader, CatalogType};
use crate::core::migrate;
use crate::core::store::{self, FileFormat, WritableStore};
use crate::core::table::{self, WritableTable};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

impl CatalogServer {
    /// Open or create every configured catalog and publish the catalog table
    ///
    /// Any table left by a previous server is invalidated first. Legacy files
    /// are converted. A catalog that cannot be opened is renamed to
    /// `<name>.bad` and replaced by an empty one. Entry mids are renumbered
    /// from 1 and a full duplicate VSN check is run.
    pub fn start(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.catalog_dir)?;

        let table_path = config.table_path();
        table::invalidate_existing(&table_path)?;

        let mut stores = Vec::with_capacity(config.devices.len());
        let mut paths = Vec::with_capacity(config.devices.len());
        let mut historian = None;
        for device in &config.devices {
            let path = config.catalog_path(device);
            let store = open_catalog(&config, device, &path)?;
            if device.kind == DeviceKind::Historian {
                historian = Some(stores.len());
            }
            stores.push(store);
            paths.push(path);
        }
        let historian = historian.ok_or(CatalogError::NoHistorian)?;

        let last_mid = renumber_mids(&mut stores)?;
        let table = WritableTable::create(&table_path, &paths, last_mid)?;

        let (remote, archiver) = Self::default_notifiers();
        let mut server = CatalogServer {
            config,
            stores,
            historian,
            table,
            remote_server: false,
            journal: Journal::default(),
            notices: Vec::new(),
            remote,
            archiver,
        };

        let dups = server.sort_and_check("", "", None, true, true)?;
        server.journal.commit();
        if dups > 0 {
            warn!("{} entries carry duplicate VSNs", dups);
        }
        info!(
            "Catalog server started with {} catalogs, table {:?}",
            server.stores.len(),
            server.table.path()
        );
        Ok(server)
    }
}

fn empty_header(config: &ServerConfig, device: &DeviceConfig, path: &Path) -> CatalogHeader {
    let mut header = CatalogHeader::new(&path.to_string_lossy(), config.initial_entries(device.kind));
    header.eq = device.eq;
    header.kind = device.kind.into();
    if let Some(media) = &device.media {
        header.media = media.clone();
    }
    header
}

fn open_existing(config: &ServerConfig, device: &DeviceConfig, path: &Path) -> Result<WritableStore> {
    match store::probe(path) {
        Ok(FileFormat::Current) => WritableStore::open_readwrite(path),
        Ok(FileFormat::Legacy(version)) => migrate::convert(path, version),
        Err(CatalogError::CatalogPathMissing(_)) => {
            WritableStore::create(path, &empty_header(config, device, path))
        }
        Err(e) => Err(e),
    }
}

fn open_catalog(config: &ServerConfig, device: &DeviceConfig, path: &Path) -> Result<WritableStore> {
    let mut store = match open_existing(config, device, path) {
        Ok(store) => store,
        Err(e) => {
            let bad = PathBuf::from(format!("{}.bad", path.display()));
            warn!("Catalog {:?} unusable ({}), moved to {:?}", path, e, bad);
            match fs::rename(path, &bad) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
            WritableStore::create(path, &empty_header(config, device, path)).map_err(|err| {
                CatalogError::Unusable {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                }
            })?
        }
    };

    let kind = CatalogType::from(device.kind);
    if store.eq() != device.eq || store.header().kind != kind {
        info!(
            "Catalog {:?} assigned to equipment {} ({:?})",
            path, device.eq, kind
        );
        let mut header = store.header().clone();
        header.eq = device.eq;
        header.kind = kind;
        store.write_header(&header)?;
        for index in 0..store.count() {
            let mut ce = store.entry(index)?;
            ce.eq = device.eq;
            store.write_entry(index, &ce)?;
        }
    }
    Ok(store)
}

/// Number every entry from 1 in catalog order; returns the last mid used
fn renumber_mids(stores: &mut [WritableStore]) -> Result<u32> {
    let mut mid = 0u32;
    for store in stores.iter_mut() {
        for index in 0..store.count() {
            let mut ce = store.entry(index)?;
            mid += 1;
            if ce.mid != mid {
                ce.mid = mid;
                store.write_entry(index, &ce)?;
            }
        }
        store.flush()?;
    }
    Ok(mid)
}
