//! One-entry lookup cache
//!
//! Holds an owned copy of the last entry found, the query that found it and
//! the mapping generation it came from. A hit re-reads the live entry at the
//! cached position and only counts if it still answers the same query, so a
//! caller never sees data from a mapping that has since been replaced.

use crate::core::entry::CatalogEntry;
use crate::core::lookup::EntryLoc;
use crate::core::volid::{VolId, VolIdFlags};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// A cacheable lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Query {
    Location { eq: u16, slot: u32, part: u16 },
    Media { mtype: String, vsn: String },
    Barcode { eq: u16, mtype: String, barcode: String },
    Mid(u32),
    Vol(VolId),
}

impl Query {
    /// Whether `ce` still answers this query
    pub(crate) fn accepts(&self, ce: &CatalogEntry) -> bool {
        match self {
            Query::Location { eq, slot, part } => {
                ce.in_use() && ce.eq == *eq && ce.slot == *slot && (*part == 0 || ce.part == *part)
            }
            Query::Media { mtype, vsn } => ce.in_use() && ce.mtype == *mtype && ce.vsn == *vsn,
            Query::Barcode { eq, mtype, barcode } => {
                ce.eq == *eq && ce.mtype == *mtype && ce.barcode == *barcode
            }
            Query::Mid(mid) => ce.mid == *mid,
            Query::Vol(vid) if vid.is_logical() => {
                ce.in_use() && ce.mtype == vid.mtype && ce.vsn == vid.vsn
            }
            Query::Vol(vid) => {
                let part_ok = vid.is_cartridge()
                    || !vid.has(VolIdFlags::PART)
                    || ce.part == vid.part;
                ce.in_use() && ce.eq == vid.eq && ce.slot == vid.slot && part_ok
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Cached {
    query: Query,
    loc: EntryLoc,
    entry: CatalogEntry,
    generation: u64,
}

/// Hit and miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Default)]
pub(crate) struct EntryCache {
    last: Mutex<Option<Cached>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EntryCache {
    /// Answer `query` from the cache
    ///
    /// `read_live` copies the entry currently at a position. The lock is held
    /// across that copy so an invalidation cannot interleave with it.
    pub(crate) fn lookup<F>(&self, query: &Query, generation: u64, read_live: F) -> Option<CatalogEntry>
    where
        F: FnOnce(EntryLoc) -> Option<CatalogEntry>,
    {
        let mut last = self.last.lock();
        let hit = match last.as_mut() {
            Some(cached) if cached.generation == generation && cached.query == *query => {
                match read_live(cached.loc) {
                    Some(live) if query.accepts(&live) => {
                        cached.entry = live.clone();
                        Some(live)
                    }
                    _ => None,
                }
            }
            _ => None,
        };
        match hit {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => {
                *last = None;
                self.misses.fetch_add(1, Ordering::Relaxed)
            }
        };
        hit
    }

    pub(crate) fn store(&self, query: Query, loc: EntryLoc, entry: &CatalogEntry, generation: u64) {
        *self.last.lock() = Some(Cached {
            query,
            loc,
            entry: entry.clone(),
            generation,
        });
    }

    pub(crate) fn invalidate(&self) {
        *self.last.lock() = None;
    }

    /// Entry held by the cache, if any
    pub(crate) fn peek(&self) -> Option<CatalogEntry> {
        self.last.lock().as_ref().map(|c| c.entry.clone())
    }

    pub(crate) fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::status::EntryStatus;

    fn entry(slot: u32, vsn: &str) -> CatalogEntry {
        CatalogEntry {
            status: EntryStatus::IN_USE,
            eq: 10,
            slot,
            mtype: "li".into(),
            vsn: vsn.into(),
            ..CatalogEntry::default()
        }
    }

    const LOC: EntryLoc = EntryLoc { store: 0, index: 3 };

    #[test]
    fn test_hit_requires_same_query_and_generation() {
        let cache = EntryCache::default();
        let q = Query::Media {
            mtype: "li".into(),
            vsn: "A1".into(),
        };
        let ce = entry(4, "A1");
        cache.store(q.clone(), LOC, &ce, 1);

        assert_eq!(cache.lookup(&q, 1, |_| Some(ce.clone())), Some(ce.clone()));
        assert_eq!(cache.lookup(&q, 2, |_| Some(ce.clone())), None);
        // The miss dropped the entry
        assert_eq!(cache.lookup(&q, 1, |_| Some(ce.clone())), None);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 2 });
    }

    #[test]
    fn test_live_entry_rechecked() {
        let cache = EntryCache::default();
        let q = Query::Location {
            eq: 10,
            slot: 4,
            part: 0,
        };
        cache.store(q.clone(), LOC, &entry(4, "A1"), 1);

        // Someone moved the volume out of the slot
        let moved = entry(9, "A1");
        assert_eq!(cache.lookup(&q, 1, |_| Some(moved.clone())), None);
        assert!(cache.peek().is_none());
    }

    #[test]
    fn test_hit_returns_fresh_copy() {
        let cache = EntryCache::default();
        let q = Query::Mid(7);
        let mut ce = entry(1, "B2");
        ce.mid = 7;
        cache.store(q.clone(), LOC, &ce, 1);

        ce.space = 99;
        let got = cache.lookup(&q, 1, |_| Some(ce.clone())).unwrap();
        assert_eq!(got.space, 99);
        assert_eq!(cache.peek().unwrap().space, 99);
    }

    #[test]
    fn test_vol_query_partition_rules() {
        let mut ce = entry(2, "P");
        ce.part = 2;
        assert!(Query::Vol(VolId::cartridge(10, 2)).accepts(&ce));
        assert!(Query::Vol(VolId::partition(10, 2, 2)).accepts(&ce));
        assert!(!Query::Vol(VolId::partition(10, 2, 1)).accepts(&ce));
        assert!(Query::Vol(VolId::logical("li", "P")).accepts(&ce));
    }
}
