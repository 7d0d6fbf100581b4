//! Client mappings and the one-entry cache
//!
//! Each test runs a server loop on its own thread and talks to it through a
//! client, as a separate process would.

use samcat::protocol::{self, UnixTransport};
use samcat::{
    CatalogClient, CatalogServer, CeField, DeviceConfig, DeviceKind, EntryStatus, ErrorKind,
    ServerConfig, VolId,
};
use std::fs;
use std::os::unix::net::UnixListener;
use std::path::Path;
use std::thread::{self, JoinHandle};
use tempfile::tempdir;

fn config(dir: &Path) -> ServerConfig {
    let mut lib = DeviceConfig::new(20, DeviceKind::Library);
    lib.family_set = Some("lib20".into());
    lib.media = Some("li".into());
    let mut config = ServerConfig::new(dir)
        .with_device(lib)
        .with_device(DeviceConfig::new(30, DeviceKind::Historian));
    config.table_increment = 4;
    config.defaults.label_barcode = true;
    config
}

fn spawn(config: ServerConfig) -> (CatalogClient, JoinHandle<()>) {
    let mut server = CatalogServer::start(config).unwrap();
    let (transport, rx) = protocol::channel();
    let worker = thread::spawn(move || {
        server.serve(&rx);
        server.shutdown().unwrap();
    });
    let client = CatalogClient::init("test", Box::new(transport)).unwrap();
    (client, worker)
}

fn spawn_unix(config: ServerConfig) -> JoinHandle<()> {
    let socket = config.socket_path();
    let mut server = CatalogServer::start(config).unwrap();
    fs::remove_file(&socket).ok();
    let listener = UnixListener::bind(&socket).unwrap();
    thread::spawn(move || {
        server.serve_unix(&listener).unwrap();
        server.shutdown().unwrap();
    })
}

fn lto(slot: u32) -> VolId {
    let mut vid = VolId::cartridge(20, slot);
    vid.mtype = "li".into();
    vid
}

fn scanned() -> EntryStatus {
    EntryStatus::IN_USE | EntryStatus::OCCUPIED | EntryStatus::BAR_CODE
}

#[test]
fn test_reads_own_writes() {
    let dir = tempdir().unwrap();
    let (client, worker) = spawn(config(dir.path()));

    client.slot_init(&lto(1), scanned(), false, "CLI001", "").unwrap();
    let ce = client.get_by_location(20, 1, 0).unwrap();
    assert_eq!(ce.vsn, "CLI001");
    assert_eq!(client.get_by_media("li", "CLI001").unwrap().slot, 1);
    assert_eq!(client.get_by_barcode(20, "li", "CLI001").unwrap().mid, ce.mid);
    assert_eq!(client.get_by_mid(ce.mid).unwrap().vsn, "CLI001");

    client
        .set_string(&VolId::cartridge(20, 1), CeField::VolInfo, "offsite")
        .unwrap();
    assert_eq!(client.get_entry(&VolId::logical("li", "CLI001")).unwrap().vol_info, "offsite");

    client
        .set_field_by_loc(20, 1, 0, CeField::Access, 3, 0)
        .unwrap();
    client
        .set_string_by_loc(20, 1, 0, CeField::VolInfo, "vault")
        .unwrap();
    let ce = client.get_by_location(20, 1, 0).unwrap();
    assert_eq!((ce.access, ce.vol_info.as_str()), (3, "vault"));

    client.shutdown_server().unwrap();
    worker.join().unwrap();
}

#[test]
fn test_repeated_lookup_hits_cache() {
    let dir = tempdir().unwrap();
    let (client, worker) = spawn(config(dir.path()));
    client.slot_init(&lto(2), scanned(), false, "HIT001", "").unwrap();

    let first = client.get_by_media("li", "HIT001").unwrap();
    let second = client.get_by_media("li", "HIT001").unwrap();
    assert_eq!(first, second);
    let stats = client.cache_stats();
    assert_eq!((stats.hits, stats.misses), (1, 1));

    // A mutation drops the cached entry and the next read sees the change
    client
        .set_field(&VolId::cartridge(20, 2), CeField::Access, 7, 0)
        .unwrap();
    let third = client.get_by_media("li", "HIT001").unwrap();
    assert_eq!(third.access, 7);
    assert_eq!(client.cache_stats().misses, 2);

    // A different query is a miss even for the same entry
    client.get_by_location(20, 2, 0).unwrap();
    assert_eq!(client.cache_stats().misses, 3);

    client.shutdown_server().unwrap();
    worker.join().unwrap();
}

#[test]
fn test_remaps_after_growth() {
    let dir = tempdir().unwrap();
    let (client, worker) = spawn(config(dir.path()));
    assert_eq!(client.get_header(20).unwrap().count, 4);

    let slots: Vec<u32> = (0..6).map(|_| client.assign_free_slot(20).unwrap()).collect();
    assert_eq!(slots, vec![0, 1, 2, 3, 4, 5]);

    assert_eq!(client.get_header(20).unwrap().count, 8);
    assert_eq!(client.get_entries(20, 0, 8).unwrap().len(), 8);
    assert!(client.get_by_location(20, 5, 0).is_ok());
    assert_eq!(client.entries_by_library(20).unwrap().len(), 6);
    assert_eq!(client.headers().unwrap().len(), 2);

    client.shutdown_server().unwrap();
    worker.join().unwrap();
}

#[test]
fn test_server_errors_reach_client() {
    let dir = tempdir().unwrap();
    let (client, worker) = spawn(config(dir.path()));
    client.slot_init(&lto(0), scanned(), false, "ERR000", "").unwrap();
    client.slot_init(&lto(1), scanned(), false, "ERR001", "").unwrap();

    let err = client.move_slot(&VolId::cartridge(20, 0), 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    let err = client.assign_free_slot(77).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = client.get_by_media("li", "NOSUCH").unwrap_err();
    assert!(err.is_not_found());

    // Nothing changed on the failed move
    assert_eq!(client.get_by_location(20, 0, 0).unwrap().vsn, "ERR000");

    client.shutdown_server().unwrap();
    worker.join().unwrap();
}

#[test]
fn test_cleaning_volume_lookup() {
    let dir = tempdir().unwrap();
    let (client, worker) = spawn(config(dir.path()));
    assert!(client.cleaning_volume(20).is_err());

    client.slot_init(&lto(3), scanned(), false, "CLNU01", "").unwrap();
    let cleaner = client.cleaning_volume(20).unwrap();
    assert_eq!(cleaner.slot, 3);
    assert!(cleaner.status.contains(EntryStatus::CLEANING));

    client.shutdown_server().unwrap();
    worker.join().unwrap();
}

#[test]
fn test_shutdown_invalidates_mappings() {
    let dir = tempdir().unwrap();
    let (client, worker) = spawn(config(dir.path()));
    client.slot_init(&lto(0), scanned(), false, "BYE000", "").unwrap();
    client.get_by_media("li", "BYE000").unwrap();

    client.shutdown_server().unwrap();
    worker.join().unwrap();

    let err = client.get_by_media("li", "BYE000").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corruption);
    // Still unmapped on the next call
    let err = client.get_by_location(20, 0, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corruption);
}

#[test]
fn test_unix_socket_and_restart() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let socket = config.socket_path();

    let worker = spawn_unix(config.clone());
    let client = CatalogClient::init("sock", Box::new(UnixTransport::new(&socket))).unwrap();
    client.slot_init(&lto(4), scanned(), false, "SCK004", "").unwrap();
    assert_eq!(client.get_by_location(20, 4, 0).unwrap().vsn, "SCK004");
    client.shutdown_server().unwrap();
    worker.join().unwrap();
    assert!(client.get_by_media("li", "SCK004").is_err());

    // A restarted server publishes a new table; remapping picks it up
    let worker = spawn_unix(config);
    client.remap().unwrap();
    assert_eq!(client.get_by_media("li", "SCK004").unwrap().slot, 4);
    client.shutdown_server().unwrap();
    worker.join().unwrap();
}
