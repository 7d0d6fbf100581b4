//! Legacy catalog conversion at server start

use samcat::core::codec::ByteWriter;
use samcat::core::header::MAGIC;
use samcat::core::lookup;
use samcat::core::store::{self, FileFormat};
use samcat::{CatalogEntry, CatalogServer, DeviceConfig, DeviceKind, EntryStatus, ServerConfig};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const HEADER_SIZE: usize = 64;
const ENTRY_SIZE: usize = 256;

fn config(dir: &Path) -> ServerConfig {
    let mut lib = DeviceConfig::new(20, DeviceKind::Library);
    lib.name = Some("lib20".into());
    let mut config = ServerConfig::new(dir)
        .with_device(lib)
        .with_device(DeviceConfig::new(30, DeviceKind::Historian));
    config.table_increment = 4;
    config
}

fn lib_path(dir: &Path) -> PathBuf {
    dir.join("lib20")
}

/// A version 353 catalog as older servers wrote it
fn image_353(eq: u16, entries: &[CatalogEntry]) -> Vec<u8> {
    let mut w = ByteWriter::with_capacity(HEADER_SIZE + entries.len() * ENTRY_SIZE);
    w.u32(MAGIC)
        .u32(353)
        .u16(eq)
        .u8(0)
        .pad_to(12)
        .fixed_str("lt", 4)
        .i32(0)
        .u32(entries.len() as u32)
        .fixed_str("lib20", 40)
        .pad_to(HEADER_SIZE);
    for (i, ce) in entries.iter().enumerate() {
        w.u32(ce.status.bits())
            .u16(eq)
            .u16(ce.part)
            .u32(ce.slot)
            .u32(ce.mid)
            .u64(ce.capacity)
            .u64(ce.space)
            .u32(ce.block_size)
            .u32(ce.access)
            .i64(ce.label_time)
            .i64(ce.mod_time)
            .i64(ce.mount_time)
            .u64(ce.mode_word)
            .fixed_str(&ce.mtype, 4)
            .fixed_str(&ce.vsn, 32)
            .fixed_str(&ce.barcode, 36)
            .fixed_str(&ce.vol_info, 32)
            .i64(ce.reservation.time)
            .fixed_str(&ce.reservation.asname, 32)
            .fixed_str(&ce.reservation.owner, 16)
            .fixed_str(&ce.reservation.fsname, 16)
            .pad_to(HEADER_SIZE + (i + 1) * ENTRY_SIZE);
    }
    w.finish(HEADER_SIZE + entries.len() * ENTRY_SIZE)
}

fn sample() -> Vec<CatalogEntry> {
    let mut labeled = CatalogEntry {
        status: EntryStatus::IN_USE | EntryStatus::LABELED | EntryStatus::BAR_CODE,
        slot: 0,
        mid: 77,
        capacity: 400,
        space: 900,
        block_size: 65536,
        access: 12,
        label_time: 1_600_000_000,
        mtype: "lt".into(),
        vsn: "OLD001".into(),
        barcode: "OLD001".into(),
        vol_info: "vault".into(),
        ..CatalogEntry::default()
    };
    labeled.reservation.time = 1_650_000_000;
    labeled.reservation.asname = "arset.1".into();
    labeled.reservation.owner = "root".into();
    labeled.reservation.fsname = "samfs1".into();

    let unused = CatalogEntry::default();
    let second = CatalogEntry {
        status: EntryStatus::IN_USE | EntryStatus::LABELED | EntryStatus::PARTITIONED,
        slot: 2,
        part: 1,
        mid: 5,
        capacity: 100,
        space: 50,
        mtype: "lt".into(),
        vsn: "OLD002".into(),
        ..CatalogEntry::default()
    };
    vec![labeled, unused, second]
}

#[test]
fn test_version_353_converted_at_start() {
    let dir = tempdir().unwrap();
    let image = image_353(15, &sample());
    fs::write(lib_path(dir.path()), &image).unwrap();
    assert_eq!(
        store::probe(&lib_path(dir.path())).unwrap(),
        FileFormat::Legacy(353)
    );

    let server = CatalogServer::start(config(dir.path())).unwrap();
    let lib = &server.stores()[0];
    assert_eq!(lib.count(), 3);
    // The catalog now belongs to the configured equipment
    assert_eq!(lib.eq(), 20);

    let first = lib.entry(0).unwrap();
    assert_eq!(first.eq, 20);
    assert_eq!(first.vsn, "OLD001");
    assert_eq!(first.barcode, "OLD001");
    assert_eq!(first.vol_info, "vault");
    assert_eq!(first.capacity, 400);
    assert_eq!(first.space, 400);
    assert_eq!(first.access, 12);
    assert_eq!(first.label_time, 1_600_000_000);
    assert_eq!(first.reservation.asname, "arset.1");
    assert_eq!(
        first.status,
        EntryStatus::IN_USE | EntryStatus::LABELED | EntryStatus::BAR_CODE
    );
    assert!(!lib.entry(1).unwrap().in_use());
    let third = lib.entry(2).unwrap();
    assert_eq!((third.slot, third.part), (2, 1));
    assert!(third.status.contains(EntryStatus::PARTITIONED));

    // Mids are renumbered, not carried over
    let mids: Vec<u32> = lib.entries(0, 3).unwrap().iter().map(|e| e.mid).collect();
    assert_eq!(mids, vec![1, 2, 3]);

    assert!(lookup::by_media(server.stores(), "lt", "OLD002").is_ok());
    assert_eq!(fs::read(dir.path().join("lib20.353")).unwrap(), image);
    assert_eq!(
        store::probe(&lib_path(dir.path())).unwrap(),
        FileFormat::Current
    );
}

#[test]
fn test_existing_backup_not_overwritten() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("lib20.353"), b"earlier backup").unwrap();
    let image = image_353(20, &sample());
    fs::write(lib_path(dir.path()), &image).unwrap();

    CatalogServer::start(config(dir.path())).unwrap();

    assert_eq!(
        fs::read(dir.path().join("lib20.353")).unwrap(),
        b"earlier backup"
    );
    assert_eq!(fs::read(dir.path().join("lib20.353.1")).unwrap(), image);
}

#[test]
fn test_damaged_catalog_replaced() {
    let dir = tempdir().unwrap();
    let mut image = image_353(20, &sample());
    image.truncate(image.len() - 10);
    fs::write(lib_path(dir.path()), &image).unwrap();

    let server = CatalogServer::start(config(dir.path())).unwrap();
    let lib = &server.stores()[0];
    assert_eq!(lib.count(), 4);
    assert!(lookup::in_use_entries(lib).unwrap().is_empty());
    assert_eq!(fs::read(dir.path().join("lib20.bad")).unwrap(), image);
    assert!(!dir.path().join("lib20.353").exists());
}

#[test]
fn test_current_catalog_opened_as_is() {
    let dir = tempdir().unwrap();
    {
        let mut server = CatalogServer::start(config(dir.path())).unwrap();
        server.handle(&samcat::protocol::Request::AssignFreeSlot { eq: 20 });
        server.shutdown().unwrap();
    }
    let before = fs::read(lib_path(dir.path())).unwrap();

    let server = CatalogServer::start(config(dir.path())).unwrap();
    assert_eq!(lookup::in_use_entries(&server.stores()[0]).unwrap().len(), 1);
    assert_eq!(before.len(), fs::read(lib_path(dir.path())).unwrap().len());
    assert!(!dir.path().join("lib20.bad").exists());
}
