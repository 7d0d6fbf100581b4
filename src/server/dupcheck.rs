//! Duplicate VSN detection across every catalog

use super::CatalogServer;
use crate::core::error::Result;
use crate::core::lookup::EntryLoc;
use crate::core::status::EntryStatus;
use tracing::warn;

impl CatalogServer {
    /// Count entries sharing a media type and VSN
    ///
    /// With `check_all` every in-use entry is compared with every other;
    /// otherwise only entries matching `mtype`/`vsn` are counted, skipping
    /// `cea` itself. Each duplicate pair adds two. With `mark`, both members
    /// of a pair get [`EntryStatus::DUP_VSN`]; a full marking check first
    /// clears stale flags. Empty VSNs never match.
    pub(crate) fn sort_and_check(
        &mut self,
        mtype: &str,
        vsn: &str,
        cea: Option<EntryLoc>,
        check_all: bool,
        mark: bool,
    ) -> Result<usize> {
        let mut keys: Vec<(String, String, EntryLoc)> = Vec::new();
        for (nc, store) in self.stores.iter().enumerate() {
            for (index, view) in store.views() {
                if view.in_use() {
                    keys.push((view.mtype(), view.vsn(), EntryLoc { store: nc, index }));
                }
            }
        }
        keys.sort();

        if check_all && mark {
            for (_, _, loc) in &keys {
                if self.entry(*loc)?.status.contains(EntryStatus::DUP_VSN) {
                    self.update(*loc, |ce| ce.status.remove(EntryStatus::DUP_VSN))?;
                }
            }
        }

        let mut dups = 0;
        let mut flagged: Vec<EntryLoc> = Vec::new();
        if check_all {
            for pair in keys.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                if !a.1.is_empty() && a.0 == b.0 && a.1 == b.1 {
                    dups += 2;
                    flagged.extend([a.2, b.2]);
                }
            }
        } else if !vsn.is_empty() {
            for (m, v, loc) in &keys {
                if Some(*loc) == cea || m != mtype || v != vsn {
                    continue;
                }
                dups += 2;
                flagged.push(*loc);
                flagged.extend(cea);
            }
        }

        if mark {
            flagged.sort();
            flagged.dedup();
            for loc in flagged {
                self.update(loc, |ce| ce.status.insert(EntryStatus::DUP_VSN))?;
            }
        }
        if dups > 0 {
            warn!("Duplicate VSNs found: {} entries", dups);
        }
        Ok(dups)
    }
}
