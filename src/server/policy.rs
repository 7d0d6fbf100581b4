//! Site policy applied to scanned and loaded media

use crate::config::Defaults;
use crate::core::entry::CatalogEntry;
use crate::core::media::{self, MediaType};
use crate::core::status::EntryStatus;
use tracing::{debug, warn};

const CLEANING_PREFIXES: [&str; 2] = ["CLN", "CLEAN"];

/// VSN characters taken from a barcode for tape media
const TAPE_VSN_LEN: usize = 6;
const OTHER_VSN_LEN: usize = 31;

/// Flag or unflag `ce` as a cleaning cartridge based on its barcode
///
/// Cleaning media has no capacity. The first time a cartridge is seen as
/// cleaning its access count is set to the cycles its media type allows.
pub fn check_for_cleaning(ce: &mut CatalogEntry) {
    let matched = CLEANING_PREFIXES
        .iter()
        .any(|prefix| ce.barcode.starts_with(prefix));
    if !matched {
        ce.status.remove(EntryStatus::CLEANING);
        return;
    }

    ce.capacity = 0;
    ce.space = 0;
    if !ce.status.contains(EntryStatus::CLEANING) {
        ce.access = MediaType::from_code(&ce.mtype)
            .map(MediaType::cleaning_cycles)
            .unwrap_or(30);
        ce.status.insert(EntryStatus::CLEANING);
        debug!("Cleaning cartridge {} with {} cycles", ce.barcode, ce.access);
    }
}

/// Derive the VSN from the barcode
///
/// Tape takes six characters, the low-order ones when `barcode_low` is set,
/// with blanks turned into underscores and letters uppercased. Other media
/// take up to 31 characters unchanged.
pub fn vsn_from_barcode(ce: &mut CatalogEntry, defaults: &Defaults) {
    let tape = media::is_tape_code(&ce.mtype);
    let len = if tape { TAPE_VSN_LEN } else { OTHER_VSN_LEN };
    let chars: Vec<char> = ce.barcode.chars().collect();

    let start = if defaults.barcode_low && chars.len() > len {
        chars.len() - len
    } else {
        0
    };
    let taken = chars.iter().skip(start).take(len);
    ce.vsn = if tape {
        taken
            .map(|&c| if c == ' ' { '_' } else { c.to_ascii_uppercase() })
            .collect()
    } else {
        taken.collect()
    };
}

/// Compare what a drive read from the media with the catalog entry
///
/// Each mismatch is logged. With `replace` the media type, VSN, label time,
/// capacity and block size are taken from the drive. Returns the number of
/// mismatches; write-protect differences are logged but not counted.
pub fn verify_volume(ce: &mut CatalogEntry, vol: &CatalogEntry, replace: bool) -> usize {
    let mut errors = 0;
    let name = format!("{}:{}:{} {}.{}", ce.eq, ce.slot, ce.part, ce.mtype, ce.vsn);

    if !vol.vsn.is_empty() && ce.mtype != vol.mtype {
        errors += 1;
        warn!("Volume {} media type mismatch, drive reports {}", name, vol.mtype);
        if replace {
            ce.mtype = vol.mtype.clone();
        }
    }
    if !vol.vsn.is_empty() && ce.vsn != vol.vsn {
        errors += 1;
        warn!("Volume {} VSN mismatch, drive reports {}", name, vol.vsn);
        if replace {
            ce.vsn = vol.vsn.clone();
        }
    }
    if ce.label_time != 0 && ce.label_time != vol.label_time {
        errors += 1;
        warn!("Volume {} label time mismatch, drive reports {}", name, vol.label_time);
        if replace {
            ce.label_time = vol.label_time;
        }
    }
    if !vol.barcode.is_empty() && ce.barcode != vol.barcode {
        errors += 1;
        warn!("Volume {} barcode mismatch, drive reports {}", name, vol.barcode);
    }
    if ce.capacity != vol.capacity && !ce.status.contains(EntryStatus::CAPACITY_SET) {
        errors += 1;
        warn!("Volume {} capacity mismatch, drive reports {}", name, vol.capacity);
        if replace {
            ce.capacity = vol.capacity;
        }
    }
    if ce.block_size != 0 && ce.block_size != vol.block_size {
        errors += 1;
        warn!("Volume {} block size mismatch, drive reports {}", name, vol.block_size);
        if replace {
            ce.block_size = vol.block_size;
        }
    }
    let wp = EntryStatus::WRITE_PROTECT;
    if ce.status.contains(wp) != vol.status.contains(wp) {
        warn!(
            "Volume {} write protect {} in catalog, {} on media",
            name,
            if ce.status.contains(wp) { 'W' } else { '-' },
            if vol.status.contains(wp) { 'W' } else { '-' }
        );
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tape(barcode: &str) -> CatalogEntry {
        CatalogEntry {
            mtype: "li".into(),
            barcode: barcode.into(),
            ..CatalogEntry::default()
        }
    }

    #[test]
    fn test_cleaning_detection() {
        let mut ce = tape("CLN042");
        ce.capacity = 100;
        ce.space = 50;
        check_for_cleaning(&mut ce);
        assert!(ce.status.contains(EntryStatus::CLEANING));
        assert_eq!((ce.capacity, ce.space), (0, 0));
        assert_eq!(ce.access, 50);

        // Already known; the remaining cycle count is kept
        ce.access = 7;
        check_for_cleaning(&mut ce);
        assert_eq!(ce.access, 7);

        ce.barcode = "VOL001".into();
        check_for_cleaning(&mut ce);
        assert!(!ce.status.contains(EntryStatus::CLEANING));
    }

    #[test]
    fn test_cleaning_cycles_by_media() {
        let mut ce = tape("CLEAN1");
        ce.mtype = "sg".into();
        check_for_cleaning(&mut ce);
        assert_eq!(ce.access, 100);

        let mut ce = tape("CLN1");
        ce.mtype = "mo".into();
        check_for_cleaning(&mut ce);
        assert_eq!(ce.access, 30);
    }

    #[test]
    fn test_tape_vsn_from_barcode() {
        let mut ce = tape("ab 1234L4");
        vsn_from_barcode(&mut ce, &Defaults::default());
        assert_eq!(ce.vsn, "AB_123");

        let low = Defaults {
            barcode_low: true,
            ..Defaults::default()
        };
        vsn_from_barcode(&mut ce, &low);
        assert_eq!(ce.vsn, "1234L4");

        let mut short = tape("x1");
        vsn_from_barcode(&mut short, &low);
        assert_eq!(short.vsn, "X1");
    }

    #[test]
    fn test_optical_vsn_keeps_case() {
        let mut ce = CatalogEntry {
            mtype: "mo".into(),
            barcode: "Disk a".into(),
            ..CatalogEntry::default()
        };
        vsn_from_barcode(&mut ce, &Defaults::default());
        assert_eq!(ce.vsn, "Disk a");
    }

    #[test]
    fn test_verify_volume_replaces() {
        let mut ce = tape("B1");
        ce.vsn = "OLD".into();
        ce.capacity = 10;
        ce.block_size = 512;
        let vol = CatalogEntry {
            mtype: "li".into(),
            vsn: "NEW".into(),
            capacity: 20,
            block_size: 1024,
            ..CatalogEntry::default()
        };

        assert_eq!(verify_volume(&mut ce.clone(), &vol, false), 3);
        assert_eq!(verify_volume(&mut ce, &vol, true), 3);
        assert_eq!((ce.vsn.as_str(), ce.capacity, ce.block_size), ("NEW", 20, 1024));
    }
}
