//! Catalog entry status bits

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// Status bitmask of one catalog entry
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct EntryStatus: u32 {
        const IN_USE = 1 << 0;
        const OCCUPIED = 1 << 1;
        const LABELED = 1 << 2;
        const NEEDS_AUDIT = 1 << 3;
        const BAD_MEDIA = 1 << 4;
        const CLEANING = 1 << 5;
        const BAR_CODE = 1 << 6;
        const WRITE_PROTECT = 1 << 7;
        const READ_ONLY = 1 << 8;
        const RECYCLE = 1 << 9;
        const UNAVAIL = 1 << 10;
        const EXPORT_SLOT = 1 << 11;
        /// Foreign media not written by this system
        const NON_SAM = 1 << 12;
        /// Capacity was set by an operator and must not be overwritten
        const CAPACITY_SET = 1 << 13;
        const DUP_VSN = 1 << 14;
        const PRIORITY = 1 << 15;
        const PARTITIONED = 1 << 16;
        const ARCH_FULL = 1 << 17;
        const RECONCILE = 1 << 18;
    }
}

impl EntryStatus {
    pub const fn in_use(self) -> bool {
        self.contains(Self::IN_USE)
    }

    /// Replace the bits selected by `mask` with those of `value`
    pub fn assign(&mut self, value: EntryStatus, mask: EntryStatus) {
        *self = (*self - mask) | (value & mask);
    }

    /// Twelve-character `A i l E o C b W R c d X` display form
    pub fn to_status_string(self) -> String {
        let flag = |bit: EntryStatus, c: char, alt: Option<(EntryStatus, char)>| {
            if self.contains(bit) {
                c
            } else {
                match alt {
                    Some((alt_bit, alt_c)) if self.contains(alt_bit) => alt_c,
                    _ => '-',
                }
            }
        };
        [
            flag(Self::NEEDS_AUDIT, 'A', None),
            flag(Self::IN_USE, 'i', None),
            flag(Self::LABELED, 'l', Some((Self::NON_SAM, 'N'))),
            flag(Self::BAD_MEDIA, 'E', None),
            flag(Self::OCCUPIED, 'o', None),
            flag(Self::CLEANING, 'C', Some((Self::PRIORITY, 'p'))),
            flag(Self::BAR_CODE, 'b', None),
            flag(Self::WRITE_PROTECT, 'W', None),
            flag(Self::READ_ONLY, 'R', None),
            flag(Self::RECYCLE, 'c', None),
            flag(Self::DUP_VSN, 'd', Some((Self::UNAVAIL, 'U'))),
            flag(Self::EXPORT_SLOT, 'X', Some((Self::ARCH_FULL, 'f'))),
        ]
        .iter()
        .collect()
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_status_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_string() {
        assert_eq!(EntryStatus::empty().to_status_string(), "------------");

        let s = EntryStatus::IN_USE | EntryStatus::LABELED | EntryStatus::OCCUPIED;
        assert_eq!(s.to_status_string(), "-il-o-------");

        let s = EntryStatus::NON_SAM | EntryStatus::PRIORITY | EntryStatus::UNAVAIL;
        assert_eq!(s.to_status_string(), "--N--p----U-");

        // Primary flag wins over its alternate
        let s = EntryStatus::DUP_VSN | EntryStatus::UNAVAIL | EntryStatus::ARCH_FULL;
        assert_eq!(s.to_status_string(), "----------df");
    }

    #[test]
    fn test_assign_masked() {
        let mut s = EntryStatus::IN_USE | EntryStatus::LABELED;
        s.assign(EntryStatus::RECYCLE, EntryStatus::RECYCLE | EntryStatus::LABELED);
        assert!(s.contains(EntryStatus::IN_USE | EntryStatus::RECYCLE));
        assert!(!s.contains(EntryStatus::LABELED));
    }

    #[test]
    fn test_wire_form_is_raw_bits() {
        let s = EntryStatus::IN_USE | EntryStatus::DUP_VSN | EntryStatus::RECONCILE;
        let bytes = bincode::serialize(&s).unwrap();
        assert_eq!(bytes, bincode::serialize(&s.bits()).unwrap());
        assert_eq!(bincode::deserialize::<EntryStatus>(&bytes).unwrap(), s);
    }

    #[test]
    fn test_not_stays_in_defined_bits() {
        let s = !EntryStatus::IN_USE;
        assert!(!s.in_use());
        assert_eq!(EntryStatus::from_bits_truncate(s.bits()), s);
    }
}
