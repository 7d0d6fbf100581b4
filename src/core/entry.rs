//! Catalog entry record
//!
//! Each entry describes one slot and partition of one catalog. On disk an entry
//! is a fixed 256-byte little-endian record:
//!
//! ```text
//! 0   status u32        4   eq u16          6   part u16
//! 8   slot u32          12  mid u32         16  access u32
//! 20  block_size u32    24  capacity u64    32  space u64
//! 40  label_time i64    48  mod_time i64    56  mount_time i64
//! 64  mode word u64     72  mtype [8]       80  vsn [32]
//! 112 barcode [40]      152 vol_info [32]   184 reservation time i64
//! 192 asname [32]       224 owner [16]      240 fsname [16]
//! ```

use crate::core::codec::{field_eq, str_from_field, ByteReader, ByteWriter};
use crate::core::error::Result;
use crate::core::status::EntryStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const ENTRY_SIZE: usize = 256;

pub const MTYPE_LEN: usize = 8;
pub const VSN_LEN: usize = 32;
pub const BARCODE_LEN: usize = 40;
pub const VOL_INFO_LEN: usize = 32;
pub const ASNAME_LEN: usize = 32;
pub const OWNER_LEN: usize = 16;
pub const FSNAME_LEN: usize = 16;

const OFF_STATUS: usize = 0;
const OFF_EQ: usize = 4;
const OFF_PART: usize = 6;
const OFF_SLOT: usize = 8;
const OFF_MID: usize = 12;
const OFF_MTYPE: usize = 72;
const OFF_VSN: usize = 80;
const OFF_BARCODE: usize = 112;
const OFF_VOL_INFO: usize = 152;
const OFF_RTIME: usize = 184;

/// Volume reservation held by an archive set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Zero when not reserved
    pub time: i64,
    pub asname: String,
    pub owner: String,
    pub fsname: String,
}

impl Reservation {
    pub fn is_reserved(&self) -> bool {
        self.time != 0
    }

    /// Same archive set, owner and filesystem
    pub fn same_holder(&self, other: &Reservation) -> bool {
        self.asname == other.asname && self.owner == other.owner && self.fsname == other.fsname
    }
}

/// Owned copy of one catalog entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub status: EntryStatus,
    pub eq: u16,
    pub part: u16,
    pub slot: u32,
    pub mid: u32,
    pub access: u32,
    pub block_size: u32,
    pub capacity: u64,
    pub space: u64,
    pub label_time: i64,
    pub mod_time: i64,
    pub mount_time: i64,
    /// PTOC first-word address on optical media, last position on tape
    pub mode_word: u64,
    pub mtype: String,
    pub vsn: String,
    pub barcode: String,
    pub vol_info: String,
    pub reservation: Reservation,
}

impl CatalogEntry {
    pub fn in_use(&self) -> bool {
        self.status.in_use()
    }

    pub fn ptoc_fwa(&self) -> u64 {
        self.mode_word
    }

    pub fn last_pos(&self) -> u64 {
        self.mode_word
    }

    /// Blank the entry, keeping its equipment and mid
    pub fn clear(&mut self) {
        let (eq, mid) = (self.eq, self.mid);
        *self = CatalogEntry {
            eq,
            mid,
            ..CatalogEntry::default()
        };
    }

    /// Copy the media description fields from `src`, leaving location and identity alone
    pub fn copy_media_from(&mut self, src: &CatalogEntry) {
        let (eq, slot, part, mid) = (self.eq, self.slot, self.part, self.mid);
        *self = src.clone();
        self.eq = eq;
        self.slot = slot;
        self.part = part;
        self.mid = mid;
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(ENTRY_SIZE);
        w.u32(self.status.bits())
            .u16(self.eq)
            .u16(self.part)
            .u32(self.slot)
            .u32(self.mid)
            .u32(self.access)
            .u32(self.block_size)
            .u64(self.capacity)
            .u64(self.space)
            .i64(self.label_time)
            .i64(self.mod_time)
            .i64(self.mount_time)
            .u64(self.mode_word)
            .fixed_str(&self.mtype, MTYPE_LEN)
            .fixed_str(&self.vsn, VSN_LEN)
            .fixed_str(&self.barcode, BARCODE_LEN)
            .fixed_str(&self.vol_info, VOL_INFO_LEN)
            .i64(self.reservation.time)
            .fixed_str(&self.reservation.asname, ASNAME_LEN)
            .fixed_str(&self.reservation.owner, OWNER_LEN)
            .fixed_str(&self.reservation.fsname, FSNAME_LEN);
        w.finish(ENTRY_SIZE)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);
        Ok(CatalogEntry {
            status: EntryStatus::from_bits_truncate(r.u32()?),
            eq: r.u16()?,
            part: r.u16()?,
            slot: r.u32()?,
            mid: r.u32()?,
            access: r.u32()?,
            block_size: r.u32()?,
            capacity: r.u64()?,
            space: r.u64()?,
            label_time: r.i64()?,
            mod_time: r.i64()?,
            mount_time: r.i64()?,
            mode_word: r.u64()?,
            mtype: r.fixed_str(MTYPE_LEN)?,
            vsn: r.fixed_str(VSN_LEN)?,
            barcode: r.fixed_str(BARCODE_LEN)?,
            vol_info: r.fixed_str(VOL_INFO_LEN)?,
            reservation: Reservation {
                time: r.i64()?,
                asname: r.fixed_str(ASNAME_LEN)?,
                owner: r.fixed_str(OWNER_LEN)?,
                fsname: r.fixed_str(FSNAME_LEN)?,
            },
        })
    }
}

/// Human-readable size from a count of kilobytes
pub fn size_string(kbytes: u64) -> String {
    const UNITS: [&str; 6] = ["k", "M", "G", "T", "P", "E"];
    let mut value = kbytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1}{}", value, UNITS[unit])
}

impl fmt::Display for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let block = if self.block_size > 1000 {
            format!("{:4}k", self.block_size / 1024)
        } else {
            format!("{:4} ", self.block_size)
        };
        let vsn = if self.vsn.is_empty() { "?" } else { &self.vsn };
        write!(
            f,
            "{:4}:{} {:>2} {:<24} {} {} {} {} {:9} {} {}  {} {}/{}/{}",
            self.slot,
            self.part,
            self.mtype,
            vsn,
            self.status,
            size_string(self.capacity),
            size_string(self.space),
            block,
            self.label_time,
            self.eq,
            self.mid,
            self.reservation.time,
            self.reservation.asname,
            self.reservation.owner,
            self.reservation.fsname
        )
    }
}

/// Borrowed view of an encoded entry inside a mapping
///
/// Scans read the handful of key fields through the view and only decode a
/// full [`CatalogEntry`] for the match.
#[derive(Clone, Copy)]
pub struct EntryView<'a> {
    bytes: &'a [u8],
}

impl<'a> EntryView<'a> {
    /// `bytes` must be exactly one encoded entry
    pub fn new(bytes: &'a [u8]) -> Option<Self> {
        (bytes.len() == ENTRY_SIZE).then_some(EntryView { bytes })
    }

    fn u16_at(&self, off: usize) -> u16 {
        let mut b = [0u8; 2];
        b.copy_from_slice(&self.bytes[off..off + 2]);
        u16::from_le_bytes(b)
    }

    fn u32_at(&self, off: usize) -> u32 {
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.bytes[off..off + 4]);
        u32::from_le_bytes(b)
    }

    fn i64_at(&self, off: usize) -> i64 {
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.bytes[off..off + 8]);
        i64::from_le_bytes(b)
    }

    pub fn status(&self) -> EntryStatus {
        EntryStatus::from_bits_truncate(self.u32_at(OFF_STATUS))
    }

    pub fn in_use(&self) -> bool {
        self.status().in_use()
    }

    pub fn eq(&self) -> u16 {
        self.u16_at(OFF_EQ)
    }

    pub fn part(&self) -> u16 {
        self.u16_at(OFF_PART)
    }

    pub fn slot(&self) -> u32 {
        self.u32_at(OFF_SLOT)
    }

    pub fn mid(&self) -> u32 {
        self.u32_at(OFF_MID)
    }

    pub fn reservation_time(&self) -> i64 {
        self.i64_at(OFF_RTIME)
    }

    pub fn mtype_is(&self, mtype: &str) -> bool {
        field_eq(&self.bytes[OFF_MTYPE..OFF_MTYPE + MTYPE_LEN], mtype)
    }

    pub fn vsn_is(&self, vsn: &str) -> bool {
        field_eq(&self.bytes[OFF_VSN..OFF_VSN + VSN_LEN], vsn)
    }

    pub fn barcode_is(&self, barcode: &str) -> bool {
        field_eq(&self.bytes[OFF_BARCODE..OFF_BARCODE + BARCODE_LEN], barcode)
    }

    pub fn mtype(&self) -> String {
        str_from_field(&self.bytes[OFF_MTYPE..OFF_MTYPE + MTYPE_LEN])
    }

    pub fn vsn(&self) -> String {
        str_from_field(&self.bytes[OFF_VSN..OFF_VSN + VSN_LEN])
    }

    pub fn vol_info(&self) -> String {
        str_from_field(&self.bytes[OFF_VOL_INFO..OFF_VOL_INFO + VOL_INFO_LEN])
    }

    pub fn raw(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn to_entry(&self) -> Result<CatalogEntry> {
        CatalogEntry::from_bytes(self.bytes)
    }
}

/// Field selector for the generic set-field verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CeField {
    Status,
    MediaType,
    Vsn,
    VolInfo,
    Slot,
    Partition,
    Access,
    Capacity,
    Space,
    BlockSize,
    LabelTime,
    ModTime,
    MountTime,
    BarCode,
    PtocFwa,
    LastPos,
}

impl CeField {
    /// Fields carried as strings rather than integers
    pub fn is_string(self) -> bool {
        matches!(
            self,
            CeField::MediaType | CeField::Vsn | CeField::VolInfo | CeField::BarCode
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CatalogEntry {
        CatalogEntry {
            status: EntryStatus::IN_USE | EntryStatus::LABELED,
            eq: 10,
            part: 2,
            slot: 17,
            mid: 99,
            access: 4,
            block_size: 262144,
            capacity: 800_000_000,
            space: 10_000,
            label_time: 1_600_000_000,
            mod_time: 1_600_000_100,
            mount_time: 1_600_000_200,
            mode_word: 12345,
            mtype: "li".into(),
            vsn: "VSN017".into(),
            barcode: "VSN017L4".into(),
            vol_info: "pool a".into(),
            reservation: Reservation {
                time: 5,
                asname: "arset.1".into(),
                owner: "root".into(),
                fsname: "samfs1".into(),
            },
        }
    }

    #[test]
    fn test_entry_layout() {
        let ce = sample();
        let bytes = ce.to_bytes();
        assert_eq!(bytes.len(), ENTRY_SIZE);
        assert_eq!(CatalogEntry::from_bytes(&bytes).unwrap(), ce);
    }

    #[test]
    fn test_view_reads_key_fields() {
        let ce = sample();
        let bytes = ce.to_bytes();
        let view = EntryView::new(&bytes).unwrap();
        assert!(view.in_use());
        assert_eq!(view.eq(), 10);
        assert_eq!(view.slot(), 17);
        assert_eq!(view.part(), 2);
        assert_eq!(view.mid(), 99);
        assert_eq!(view.reservation_time(), 5);
        assert!(view.mtype_is("li"));
        assert!(view.vsn_is("VSN017"));
        assert!(view.barcode_is("VSN017L4"));
        assert!(!view.vsn_is("VSN01"));
        assert!(EntryView::new(&bytes[1..]).is_none());
    }

    #[test]
    fn test_clear_keeps_identity() {
        let mut ce = sample();
        ce.clear();
        assert_eq!(ce.eq, 10);
        assert_eq!(ce.mid, 99);
        assert_eq!(ce.slot, 0);
        assert!(ce.vsn.is_empty());
        assert!(ce.status.is_empty());
    }

    #[test]
    fn test_display_shape() {
        let s = sample().to_string();
        assert!(s.starts_with("  17:2 li VSN017"));
        assert!(s.contains("-il---------"));
        assert!(s.ends_with("arset.1/root/samfs1"));
    }
}
