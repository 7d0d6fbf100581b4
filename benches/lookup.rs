//! Benchmarks for catalog searches and the client entry cache

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use samcat::core::header::CatalogHeader;
use samcat::core::lookup;
use samcat::core::store::{ReadOnlyStore, WritableStore};
use samcat::protocol::{self, Request};
use samcat::{
    CatalogClient, CatalogEntry, CatalogServer, DeviceConfig, DeviceKind, EntryStatus,
    ServerConfig, VolId,
};
use std::thread;
use tempfile::tempdir;

fn filled_store(dir: &std::path::Path, count: u32) -> ReadOnlyStore {
    let path = dir.join(format!("lib{}", count));
    let mut header = CatalogHeader::new(&path.to_string_lossy(), count);
    header.eq = 20;
    let mut store = WritableStore::create(&path, &header).unwrap();
    for i in 0..count {
        let ce = CatalogEntry {
            status: EntryStatus::IN_USE | EntryStatus::LABELED,
            eq: 20,
            slot: i,
            mid: i + 1,
            mtype: "li".into(),
            vsn: format!("V{:05}", i),
            ..CatalogEntry::default()
        };
        store.write_entry(i as usize, &ce).unwrap();
    }
    store.flush().unwrap();
    ReadOnlyStore::open_readonly(&path).unwrap()
}

fn benchmark_searches(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let mut group = c.benchmark_group("catalog_search");

    for size in [100u32, 1000, 10000].iter() {
        let stores = [filled_store(dir.path(), *size)];
        let last = format!("V{:05}", size - 1);

        group.bench_with_input(BenchmarkId::new("by_media", size), size, |b, _| {
            b.iter(|| black_box(lookup::by_media(&stores, "li", &last).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("by_location", size), size, |b, &size| {
            b.iter(|| black_box(lookup::by_location(&stores, 20, size - 1, 0).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("free_slot", size), size, |b, _| {
            b.iter(|| black_box(lookup::free_slot(&stores[0])));
        });
    }

    group.finish();
}

fn benchmark_client_cache(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let mut lib = DeviceConfig::new(20, DeviceKind::Library);
    lib.family_set = Some("lib20".into());
    let mut config = ServerConfig::new(dir.path())
        .with_device(lib)
        .with_device(DeviceConfig::new(30, DeviceKind::Historian));
    config.table_increment = 1000;
    config.defaults.label_barcode = true;

    let mut server = CatalogServer::start(config).unwrap();
    for slot in 0..1000u32 {
        let mut vid = VolId::cartridge(20, slot);
        vid.mtype = "li".into();
        server.handle(&Request::SlotInit {
            vid,
            status: EntryStatus::IN_USE | EntryStatus::OCCUPIED | EntryStatus::BAR_CODE,
            two_sided: false,
            barcode: format!("B{:05}", slot),
            alt_barcode: String::new(),
        });
    }
    let (transport, rx) = protocol::channel();
    let worker = thread::spawn(move || {
        server.serve(&rx);
        server.shutdown()
    });
    let client = CatalogClient::init("bench", Box::new(transport)).unwrap();

    let mut group = c.benchmark_group("client_lookup");
    group.bench_function("cached", |b| {
        b.iter(|| black_box(client.get_by_media("li", "B00999").unwrap()));
    });
    group.bench_function("uncached", |b| {
        let mut flip = false;
        b.iter(|| {
            // Alternating queries always miss the one-entry cache
            flip = !flip;
            let vsn = if flip { "B00998" } else { "B00999" };
            black_box(client.get_by_media("li", vsn).unwrap())
        });
    });
    group.finish();

    client.shutdown_server().unwrap();
    worker.join().ok();
}

criterion_group!(benches, benchmark_searches, benchmark_client_cache);
criterion_main!(benches);
