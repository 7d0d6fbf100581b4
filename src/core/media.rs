//! Two-character media type codes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Media family, decides VSN-from-barcode width and two-sided handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaFamily {
    Tape,
    Optical,
}

/// Known removable media types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    /// DLT linear tape
    Dlt,
    /// IBM 3580 (LTO)
    Lto,
    /// IBM 3590
    Ibm3590,
    /// IBM 3592
    Ibm3592,
    /// STK 3480
    Stk3480,
    /// Exabyte 8mm
    Exabyte,
    /// Sony AIT
    SonyAit,
    /// Sony SAIT
    SonySait,
    /// STK 9840
    Stk9840,
    /// STK 9940
    Stk9940,
    /// STK Titan
    Titan,
    /// Generic tape
    Tape,
    /// 5.25" erasable magneto-optical
    MagnetoOptical,
    /// 12" WORM
    Worm12,
    /// 5.25" WORM
    Worm,
}

const TABLE: &[(MediaType, &str, u16)] = &[
    (MediaType::Dlt, "lt", 0x0201),
    (MediaType::Lto, "li", 0x0202),
    (MediaType::Ibm3590, "ib", 0x0203),
    (MediaType::Ibm3592, "m2", 0x0204),
    (MediaType::Stk3480, "st", 0x0205),
    (MediaType::Exabyte, "xt", 0x0206),
    (MediaType::SonyAit, "at", 0x0207),
    (MediaType::SonySait, "sa", 0x0208),
    (MediaType::Stk9840, "sg", 0x0209),
    (MediaType::Stk9940, "sf", 0x020a),
    (MediaType::Titan, "ti", 0x020b),
    (MediaType::Tape, "tp", 0x0200),
    (MediaType::MagnetoOptical, "mo", 0x0101),
    (MediaType::Worm12, "o2", 0x0102),
    (MediaType::Worm, "wo", 0x0103),
];

/// Placeholder stored in a header whose media type is unknown
pub const UNKNOWN_MEDIA: &str = "??";

impl MediaType {
    pub fn from_code(code: &str) -> Option<MediaType> {
        TABLE.iter().find(|(_, c, _)| *c == code).map(|(m, _, _)| *m)
    }

    pub fn code(self) -> &'static str {
        TABLE
            .iter()
            .find(|(m, _, _)| *m == self)
            .map(|(_, c, _)| *c)
            .unwrap_or(UNKNOWN_MEDIA)
    }

    /// Media type from the numeric code used by pre-500 catalog headers
    pub fn from_legacy(code: u16) -> Option<MediaType> {
        TABLE.iter().find(|(_, _, n)| *n == code).map(|(m, _, _)| *m)
    }

    pub fn legacy_code(self) -> u16 {
        TABLE
            .iter()
            .find(|(m, _, _)| *m == self)
            .map(|(_, _, n)| *n)
            .unwrap_or(0)
    }

    pub fn family(self) -> MediaFamily {
        match self {
            MediaType::MagnetoOptical | MediaType::Worm12 | MediaType::Worm => {
                MediaFamily::Optical
            }
            _ => MediaFamily::Tape,
        }
    }

    pub fn is_tape(self) -> bool {
        self.family() == MediaFamily::Tape
    }

    /// Optical platters carry one partition per side
    pub fn is_two_sided(self) -> bool {
        self.family() == MediaFamily::Optical
    }

    /// Initial access count for a newly detected cleaning cartridge
    pub fn cleaning_cycles(self) -> u32 {
        match self {
            MediaType::Ibm3592 | MediaType::Lto => 50,
            MediaType::Dlt => 20,
            MediaType::Exabyte => 12,
            MediaType::SonyAit | MediaType::SonySait => 50,
            MediaType::Stk9840 | MediaType::Stk9940 => 100,
            MediaType::Titan => 50,
            _ => 30,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// True if `code` names a known media type
pub fn is_valid_code(code: &str) -> bool {
    MediaType::from_code(code).is_some()
}

/// Tape test used by string-keyed callers; unknown codes count as tape
pub fn is_tape_code(code: &str) -> bool {
    MediaType::from_code(code).map_or(true, MediaType::is_tape)
}
