//! Version 331 layout
//!
//! The oldest layout has no magic number and no per-entry location: slot and
//! partition are implied by table position.
//!
//! ```text
//! header (32 bytes): version i32, count i32, audit_time i32, media u16, eq u16
//! entry (96 bytes):  status u32, capacity u32, space u32, block_size u32,
//!                    label_time i32, mod_time i32, mount_time i32, access u32,
//!                    vsn [32], barcode [32]
//! ```

use super::{LegacyCatalog, StatusMap};
use crate::core::codec::ByteReader;
use crate::core::entry::CatalogEntry;
use crate::core::error::Result;
use crate::core::header::CatalogType;
use crate::core::media::MediaType;
use crate::core::status::EntryStatus;

pub const VERSION: u32 = 331;
pub const HEADER_SIZE: usize = 32;
pub const ENTRY_SIZE: usize = 96;
const VSN_LEN: usize = 32;
const BARCODE_LEN: usize = 32;

const STATUS: StatusMap = &[
    (0x8000_0000, EntryStatus::IN_USE),
    (0x4000_0000, EntryStatus::OCCUPIED),
    (0x2000_0000, EntryStatus::LABELED),
    (0x1000_0000, EntryStatus::NEEDS_AUDIT),
    (0x0800_0000, EntryStatus::BAD_MEDIA),
    (0x0400_0000, EntryStatus::CLEANING),
    (0x0200_0000, EntryStatus::BAR_CODE),
    (0x0100_0000, EntryStatus::WRITE_PROTECT),
    (0x0080_0000, EntryStatus::READ_ONLY),
    (0x0040_0000, EntryStatus::RECYCLE),
    (0x0020_0000, EntryStatus::UNAVAIL),
    (0x0010_0000, EntryStatus::EXPORT_SLOT),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header331 {
    pub version: i32,
    pub count: i32,
    pub audit_time: i32,
    pub media: u16,
    pub eq: u16,
}

impl Header331 {
    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let header = Header331 {
            version: r.i32()?,
            count: r.i32()?,
            audit_time: r.i32()?,
            media: r.u16()?,
            eq: r.u16()?,
        };
        r.seek(HEADER_SIZE);
        Ok(header)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry331 {
    pub status: u32,
    pub capacity: u32,
    pub space: u32,
    pub block_size: u32,
    pub label_time: i32,
    pub mod_time: i32,
    pub mount_time: i32,
    pub access: u32,
    pub vsn: String,
    pub barcode: String,
}

impl Entry331 {
    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Entry331 {
            status: r.u32()?,
            capacity: r.u32()?,
            space: r.u32()?,
            block_size: r.u32()?,
            label_time: r.i32()?,
            mod_time: r.i32()?,
            mount_time: r.i32()?,
            access: r.u32()?,
            vsn: r.fixed_str(VSN_LEN)?,
            barcode: r.fixed_str(BARCODE_LEN)?,
        })
    }

    fn into_current(self, mtype: &str, slot: u32, part: u16) -> CatalogEntry {
        CatalogEntry {
            status: super::map_status(self.status, STATUS),
            slot,
            part,
            access: self.access,
            block_size: self.block_size,
            capacity: self.capacity as u64,
            space: (self.space as u64).min(self.capacity as u64),
            label_time: self.label_time as i64,
            mod_time: self.mod_time as i64,
            mount_time: self.mount_time as i64,
            mtype: mtype.to_string(),
            vsn: self.vsn,
            barcode: self.barcode,
            ..CatalogEntry::default()
        }
    }
}

/// Slot and partition implied by table position
///
/// Optical platters occupy two consecutive entries per slot, one per side.
pub fn location(index: usize, two_sided: bool) -> (u32, u16) {
    if two_sided {
        ((index / 2) as u32, (index % 2) as u16 + 1)
    } else {
        (index as u32, 0)
    }
}

/// True if `bytes` (a file of `len` bytes) is a plausible 331 catalog
pub fn detect(bytes: &[u8], len: u64) -> bool {
    let mut r = ByteReader::new(bytes);
    let header = match Header331::decode(&mut r) {
        Ok(h) => h,
        Err(_) => return false,
    };
    header.version == VERSION as i32
        && header.count >= 0
        && len == (HEADER_SIZE + header.count as usize * ENTRY_SIZE) as u64
}

pub fn decode_v331(bytes: &[u8]) -> Result<LegacyCatalog> {
    let mut r = ByteReader::new(bytes);
    let header = Header331::decode(&mut r)?;
    let media = MediaType::from_legacy(header.media);
    let mtype = media.map(MediaType::code).unwrap_or_default();
    let two_sided = media.is_some_and(MediaType::is_two_sided);

    let mut entries = Vec::with_capacity(header.count.max(0) as usize);
    for index in 0..header.count.max(0) as usize {
        r.seek(HEADER_SIZE + index * ENTRY_SIZE);
        let (slot, part) = location(index, two_sided);
        entries.push(Entry331::decode(&mut r)?.into_current(mtype, slot, part));
    }

    Ok(LegacyCatalog {
        version: VERSION,
        eq: header.eq,
        kind: CatalogType::Library,
        media: mtype.to_string(),
        audit_time: header.audit_time as i64,
        entries,
    })
}

#[cfg(test)]
pub(crate) mod encode {
    use super::*;
    use crate::core::codec::ByteWriter;

    /// Build a 331 image; used to exercise the decoder
    pub fn encode_v331(media: MediaType, eq: u16, entries: &[CatalogEntry]) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(HEADER_SIZE + entries.len() * ENTRY_SIZE);
        w.i32(VERSION as i32)
            .i32(entries.len() as i32)
            .i32(0)
            .u16(media.legacy_code())
            .u16(eq)
            .pad_to(HEADER_SIZE);
        for (i, ce) in entries.iter().enumerate() {
            w.u32(super::super::unmap_status(ce.status, STATUS))
                .u32(ce.capacity as u32)
                .u32(ce.space as u32)
                .u32(ce.block_size)
                .i32(ce.label_time as i32)
                .i32(ce.mod_time as i32)
                .i32(ce.mount_time as i32)
                .u32(ce.access)
                .fixed_str(&ce.vsn, VSN_LEN)
                .fixed_str(&ce.barcode, BARCODE_LEN)
                .pad_to(HEADER_SIZE + (i + 1) * ENTRY_SIZE);
        }
        let len = w.len();
        w.finish(len)
    }
}

#[cfg(test)]
mod tests {
    use super::encode::encode_v331;
    use super::*;

    #[test]
    fn test_optical_positions() {
        assert_eq!(location(0, true), (0, 1));
        assert_eq!(location(1, true), (0, 2));
        assert_eq!(location(5, true), (2, 2));
        assert_eq!(location(5, false), (5, 0));
    }

    #[test]
    fn test_decode_optical() {
        let side = |vsn: &str| CatalogEntry {
            status: EntryStatus::IN_USE | EntryStatus::LABELED,
            capacity: 600,
            space: 100,
            block_size: 1024,
            vsn: vsn.into(),
            ..CatalogEntry::default()
        };
        let bytes = encode_v331(MediaType::MagnetoOptical, 40, &[side("A"), side("B"), side("C")]);
        assert!(detect(&bytes, bytes.len() as u64));
        assert!(!detect(&bytes, bytes.len() as u64 + 1));

        let cat = decode_v331(&bytes).unwrap();
        assert_eq!(cat.eq, 40);
        assert_eq!(cat.media, "mo");
        assert_eq!(cat.entries.len(), 3);
        assert_eq!((cat.entries[1].slot, cat.entries[1].part), (0, 2));
        assert_eq!((cat.entries[2].slot, cat.entries[2].part), (1, 1));
        assert_eq!(cat.entries[2].vsn, "C");
        assert_eq!(cat.entries[0].mtype, "mo");
        assert!(cat.entries[0].status.contains(EntryStatus::LABELED));
    }
}
