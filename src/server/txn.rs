//! Per-request undo journal
//!
//! Every entry write made while applying a request first records the entry's
//! previous bytes. A failed request replays the journal backwards, leaving the
//! catalogs as they were before the request arrived.

use crate::core::lookup::EntryLoc;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct Journal {
    saved: Vec<(EntryLoc, Vec<u8>)>,
    seen: HashSet<EntryLoc>,
}

impl Journal {
    /// Remember `before` as the pre-request image of `loc`; later writes to
    /// the same entry keep the first image.
    pub fn record(&mut self, loc: EntryLoc, before: &[u8]) {
        if self.seen.insert(loc) {
            self.saved.push((loc, before.to_vec()));
        }
    }

    /// Drain the journal, newest image first
    pub fn take_undo(&mut self) -> Vec<(EntryLoc, Vec<u8>)> {
        self.seen.clear();
        let mut saved = std::mem::take(&mut self.saved);
        saved.reverse();
        saved
    }

    pub fn commit(&mut self) {
        self.saved.clear();
        self.seen.clear();
    }

    pub fn len(&self) -> usize {
        self.saved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(index: usize) -> EntryLoc {
        EntryLoc { store: 0, index }
    }

    #[test]
    fn test_first_image_wins() {
        let mut j = Journal::default();
        j.record(loc(1), b"old");
        j.record(loc(1), b"newer");
        j.record(loc(2), b"other");
        assert_eq!(j.len(), 2);

        let undo = j.take_undo();
        assert_eq!(undo[0], (loc(2), b"other".to_vec()));
        assert_eq!(undo[1], (loc(1), b"old".to_vec()));
        assert!(j.is_empty());
    }

    #[test]
    fn test_commit_forgets() {
        let mut j = Journal::default();
        j.record(loc(3), b"x");
        j.commit();
        assert!(j.is_empty());
        j.record(loc(3), b"y");
        assert_eq!(j.take_undo(), vec![(loc(3), b"y".to_vec())]);
    }
}
