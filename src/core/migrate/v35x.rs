//! Version 349, 350, 351 and 353 layouts
//!
//! These share the current magic and a 64-byte header; each has its own entry
//! record and status bit assignment.
//!
//! ```text
//! header: magic u32, version u32, eq u16, type u8, pad, media [4] @12,
//!         audit_time i32 @16, count u32 @20, fname [40] @24
//! ```

use super::{map_status, LegacyCatalog, StatusMap};
use crate::core::codec::ByteReader;
use crate::core::entry::{CatalogEntry, Reservation};
use crate::core::error::{CatalogError, Result};
use crate::core::header::CatalogType;
use crate::core::status::EntryStatus;
use std::path::PathBuf;

pub const HEADER_SIZE: usize = 64;
const MEDIA_LEN: usize = 4;
const FNAME_LEN: usize = 40;

/// 349 and 350: a state byte followed by an attribute byte
const STATUS_349: StatusMap = &[
    (0x0001, EntryStatus::IN_USE),
    (0x0002, EntryStatus::OCCUPIED),
    (0x0004, EntryStatus::LABELED),
    (0x0008, EntryStatus::NEEDS_AUDIT),
    (0x0010, EntryStatus::BAD_MEDIA),
    (0x0020, EntryStatus::CLEANING),
    (0x0040, EntryStatus::UNAVAIL),
    (0x0080, EntryStatus::EXPORT_SLOT),
    (0x0100, EntryStatus::BAR_CODE),
    (0x0200, EntryStatus::WRITE_PROTECT),
    (0x0400, EntryStatus::READ_ONLY),
    (0x0800, EntryStatus::RECYCLE),
];

const STATUS_350: StatusMap = &[
    (0x0001, EntryStatus::IN_USE),
    (0x0002, EntryStatus::OCCUPIED),
    (0x0004, EntryStatus::LABELED),
    (0x0008, EntryStatus::NEEDS_AUDIT),
    (0x0010, EntryStatus::BAD_MEDIA),
    (0x0020, EntryStatus::CLEANING),
    (0x0040, EntryStatus::UNAVAIL),
    (0x0080, EntryStatus::EXPORT_SLOT),
    (0x0100, EntryStatus::BAR_CODE),
    (0x0200, EntryStatus::WRITE_PROTECT),
    (0x0400, EntryStatus::READ_ONLY),
    (0x0800, EntryStatus::RECYCLE),
    (0x1000, EntryStatus::NON_SAM),
    (0x2000, EntryStatus::CAPACITY_SET),
];

/// 351 introduced the current ordering for the first sixteen bits
const STATUS_351: StatusMap = &[
    (1 << 0, EntryStatus::IN_USE),
    (1 << 1, EntryStatus::OCCUPIED),
    (1 << 2, EntryStatus::LABELED),
    (1 << 3, EntryStatus::NEEDS_AUDIT),
    (1 << 4, EntryStatus::BAD_MEDIA),
    (1 << 5, EntryStatus::CLEANING),
    (1 << 6, EntryStatus::BAR_CODE),
    (1 << 7, EntryStatus::WRITE_PROTECT),
    (1 << 8, EntryStatus::READ_ONLY),
    (1 << 9, EntryStatus::RECYCLE),
    (1 << 10, EntryStatus::UNAVAIL),
    (1 << 11, EntryStatus::EXPORT_SLOT),
    (1 << 12, EntryStatus::NON_SAM),
    (1 << 13, EntryStatus::CAPACITY_SET),
    (1 << 14, EntryStatus::DUP_VSN),
    (1 << 15, EntryStatus::PRIORITY),
];

const STATUS_353: StatusMap = &[
    (1 << 0, EntryStatus::IN_USE),
    (1 << 1, EntryStatus::OCCUPIED),
    (1 << 2, EntryStatus::LABELED),
    (1 << 3, EntryStatus::NEEDS_AUDIT),
    (1 << 4, EntryStatus::BAD_MEDIA),
    (1 << 5, EntryStatus::CLEANING),
    (1 << 6, EntryStatus::BAR_CODE),
    (1 << 7, EntryStatus::WRITE_PROTECT),
    (1 << 8, EntryStatus::READ_ONLY),
    (1 << 9, EntryStatus::RECYCLE),
    (1 << 10, EntryStatus::UNAVAIL),
    (1 << 11, EntryStatus::EXPORT_SLOT),
    (1 << 12, EntryStatus::NON_SAM),
    (1 << 13, EntryStatus::CAPACITY_SET),
    (1 << 14, EntryStatus::DUP_VSN),
    (1 << 15, EntryStatus::PRIORITY),
    (1 << 16, EntryStatus::PARTITIONED),
    (1 << 17, EntryStatus::ARCH_FULL),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header35x {
    pub magic: u32,
    pub version: u32,
    pub eq: u16,
    pub kind: u8,
    pub media: String,
    pub audit_time: i32,
    pub count: u32,
    pub fname: String,
}

impl Header35x {
    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let magic = r.u32()?;
        let version = r.u32()?;
        let eq = r.u16()?;
        let kind = r.u8()?;
        r.seek(12);
        let media = r.fixed_str(MEDIA_LEN)?;
        let audit_time = r.i32()?;
        let count = r.u32()?;
        let fname = r.fixed_str(FNAME_LEN)?;
        Ok(Header35x {
            magic,
            version,
            eq,
            kind,
            media,
            audit_time,
            count,
            fname,
        })
    }

    fn check_size(&self, len: usize, entry_size: usize) -> Result<()> {
        let expected = (HEADER_SIZE + self.count as usize * entry_size) as u64;
        if len as u64 != expected {
            return Err(CatalogError::SizeMismatch {
                path: PathBuf::from(&self.fname),
                entries: self.count,
                expected,
                actual: len as u64,
            });
        }
        Ok(())
    }

    fn catalog(&self, entries: Vec<CatalogEntry>) -> LegacyCatalog {
        LegacyCatalog {
            version: self.version,
            eq: self.eq,
            kind: CatalogType::from_u8(self.kind),
            media: self.media.clone(),
            audit_time: self.audit_time as i64,
            entries,
        }
    }
}

/// 349: 16-bit slots, 32-bit sizes, no mid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry349 {
    pub status: u32,
    pub eq: u16,
    pub slot: u16,
    pub part: u16,
    pub capacity: u32,
    pub space: u32,
    pub block_size: u32,
    pub access: u32,
    pub label_time: i32,
    pub mod_time: i32,
    pub mount_time: i32,
    pub mtype: String,
    pub vsn: String,
    pub barcode: String,
}

impl Entry349 {
    pub const SIZE: usize = 128;

    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let status = r.u32()?;
        let eq = r.u16()?;
        let slot = r.u16()?;
        let part = r.u16()?;
        r.skip(2)?;
        Ok(Entry349 {
            status,
            eq,
            slot,
            part,
            capacity: r.u32()?,
            space: r.u32()?,
            block_size: r.u32()?,
            access: r.u32()?,
            label_time: r.i32()?,
            mod_time: r.i32()?,
            mount_time: r.i32()?,
            mtype: r.fixed_str(4)?,
            vsn: r.fixed_str(32)?,
            barcode: r.fixed_str(32)?,
        })
    }

    fn into_current(self, status: StatusMap) -> CatalogEntry {
        CatalogEntry {
            status: map_status(self.status, status),
            eq: self.eq,
            slot: self.slot as u32,
            part: self.part,
            access: self.access,
            block_size: self.block_size,
            capacity: self.capacity as u64,
            space: (self.space as u64).min(self.capacity as u64),
            label_time: self.label_time as i64,
            mod_time: self.mod_time as i64,
            mount_time: self.mount_time as i64,
            mtype: self.mtype,
            vsn: self.vsn,
            barcode: self.barcode,
            ..CatalogEntry::default()
        }
    }
}

/// 350: the 349 record plus mid and a 32-bit mode word
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry350 {
    pub base: Entry349,
    pub mid: u32,
    pub mode_word: u32,
}

impl Entry350 {
    pub const SIZE: usize = 128;

    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let base = Entry349::decode(r)?;
        Ok(Entry350 {
            base,
            mid: r.u32()?,
            mode_word: r.u32()?,
        })
    }

    fn into_current(self) -> CatalogEntry {
        let mut ce = self.base.into_current(STATUS_350);
        ce.mid = self.mid;
        ce.mode_word = self.mode_word as u64;
        ce
    }
}

/// 351: 64-bit sizes and the reservation record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry351 {
    pub status: u32,
    pub eq: u16,
    pub slot: u16,
    pub part: u16,
    pub mid: u32,
    pub capacity: u64,
    pub space: u64,
    pub block_size: u32,
    pub access: u32,
    pub label_time: i32,
    pub mod_time: i32,
    pub mount_time: i32,
    pub mode_word: u32,
    pub mtype: String,
    pub vsn: String,
    pub barcode: String,
    pub rtime: i32,
    pub asname: String,
    pub owner: String,
    pub fsname: String,
}

impl Entry351 {
    pub const SIZE: usize = 192;

    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let status = r.u32()?;
        let eq = r.u16()?;
        let slot = r.u16()?;
        let part = r.u16()?;
        r.skip(2)?;
        Ok(Entry351 {
            status,
            eq,
            slot,
            part,
            mid: r.u32()?,
            capacity: r.u64()?,
            space: r.u64()?,
            block_size: r.u32()?,
            access: r.u32()?,
            label_time: r.i32()?,
            mod_time: r.i32()?,
            mount_time: r.i32()?,
            mode_word: r.u32()?,
            mtype: r.fixed_str(4)?,
            vsn: r.fixed_str(32)?,
            barcode: r.fixed_str(32)?,
            rtime: r.i32()?,
            asname: r.fixed_str(32)?,
            owner: r.fixed_str(16)?,
            fsname: r.fixed_str(16)?,
        })
    }

    fn into_current(self) -> CatalogEntry {
        CatalogEntry {
            status: map_status(self.status, STATUS_351),
            eq: self.eq,
            slot: self.slot as u32,
            part: self.part,
            mid: self.mid,
            access: self.access,
            block_size: self.block_size,
            capacity: self.capacity,
            space: self.space.min(self.capacity),
            label_time: self.label_time as i64,
            mod_time: self.mod_time as i64,
            mount_time: self.mount_time as i64,
            mode_word: self.mode_word as u64,
            mtype: self.mtype,
            vsn: self.vsn,
            barcode: self.barcode,
            vol_info: String::new(),
            reservation: Reservation {
                time: self.rtime as i64,
                asname: self.asname,
                owner: self.owner,
                fsname: self.fsname,
            },
        }
    }
}

/// 353: 32-bit slots, 64-bit times, volume info
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry353 {
    pub status: u32,
    pub eq: u16,
    pub part: u16,
    pub slot: u32,
    pub mid: u32,
    pub capacity: u64,
    pub space: u64,
    pub block_size: u32,
    pub access: u32,
    pub label_time: i64,
    pub mod_time: i64,
    pub mount_time: i64,
    pub mode_word: u64,
    pub mtype: String,
    pub vsn: String,
    pub barcode: String,
    pub vol_info: String,
    pub rtime: i64,
    pub asname: String,
    pub owner: String,
    pub fsname: String,
}

impl Entry353 {
    pub const SIZE: usize = 256;

    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Entry353 {
            status: r.u32()?,
            eq: r.u16()?,
            part: r.u16()?,
            slot: r.u32()?,
            mid: r.u32()?,
            capacity: r.u64()?,
            space: r.u64()?,
            block_size: r.u32()?,
            access: r.u32()?,
            label_time: r.i64()?,
            mod_time: r.i64()?,
            mount_time: r.i64()?,
            mode_word: r.u64()?,
            mtype: r.fixed_str(4)?,
            vsn: r.fixed_str(32)?,
            barcode: r.fixed_str(36)?,
            vol_info: r.fixed_str(32)?,
            rtime: r.i64()?,
            asname: r.fixed_str(32)?,
            owner: r.fixed_str(16)?,
            fsname: r.fixed_str(16)?,
        })
    }

    fn into_current(self) -> CatalogEntry {
        CatalogEntry {
            status: map_status(self.status, STATUS_353),
            eq: self.eq,
            slot: self.slot,
            part: self.part,
            mid: self.mid,
            access: self.access,
            block_size: self.block_size,
            capacity: self.capacity,
            space: self.space.min(self.capacity),
            label_time: self.label_time,
            mod_time: self.mod_time,
            mount_time: self.mount_time,
            mode_word: self.mode_word,
            mtype: self.mtype,
            vsn: self.vsn,
            barcode: self.barcode,
            vol_info: self.vol_info,
            reservation: Reservation {
                time: self.rtime,
                asname: self.asname,
                owner: self.owner,
                fsname: self.fsname,
            },
        }
    }
}

fn decode_with<T>(
    bytes: &[u8],
    entry_size: usize,
    decode: impl Fn(&mut ByteReader<'_>) -> Result<T>,
    convert: impl Fn(T) -> CatalogEntry,
) -> Result<LegacyCatalog> {
    let mut r = ByteReader::new(bytes);
    let header = Header35x::decode(&mut r)?;
    header.check_size(bytes.len(), entry_size)?;
    let mut entries = Vec::with_capacity(header.count as usize);
    for index in 0..header.count as usize {
        r.seek(HEADER_SIZE + index * entry_size);
        entries.push(convert(decode(&mut r)?));
    }
    Ok(header.catalog(entries))
}

pub fn decode_v349(bytes: &[u8]) -> Result<LegacyCatalog> {
    decode_with(bytes, Entry349::SIZE, Entry349::decode, |e| {
        e.into_current(STATUS_349)
    })
}

pub fn decode_v350(bytes: &[u8]) -> Result<LegacyCatalog> {
    decode_with(bytes, Entry350::SIZE, Entry350::decode, Entry350::into_current)
}

pub fn decode_v351(bytes: &[u8]) -> Result<LegacyCatalog> {
    decode_with(bytes, Entry351::SIZE, Entry351::decode, Entry351::into_current)
}

pub fn decode_v353(bytes: &[u8]) -> Result<LegacyCatalog> {
    decode_with(bytes, Entry353::SIZE, Entry353::decode, Entry353::into_current)
}

/// Version stored in a 35x header, if `bytes` starts with one
pub fn header_version(bytes: &[u8]) -> Option<u32> {
    Header35x::decode(&mut ByteReader::new(bytes))
        .ok()
        .map(|h| h.version)
}


#[cfg(test)]
mod tests {
    use super::encode::encode_v35x;
    use super::*;

    fn sample() -> CatalogEntry {
        CatalogEntry {
            status: EntryStatus::IN_USE | EntryStatus::LABELED | EntryStatus::RECYCLE,
            eq: 20,
            slot: 7,
            part: 0,
            mid: 3,
            capacity: 40_000_000,
            space: 1_000,
            block_size: 65536,
            label_time: 1_000_000,
            mtype: "lt".into(),
            vsn: "DLT007".into(),
            barcode: "DLT007".into(),
            ..CatalogEntry::default()
        }
    }

    #[test]
    fn test_status_layouts_differ() {
        let s = EntryStatus::UNAVAIL;
        assert_ne!(
            super::super::unmap_status(s, STATUS_349),
            super::super::unmap_status(s, STATUS_351)
        );
    }

    #[test]
    fn test_decode_each_version() {
        for version in [349u32, 350, 351, 353] {
            let bytes = encode_v35x(version, 20, "lt", &[sample(), CatalogEntry::default()]);
            assert_eq!(header_version(&bytes), Some(version));
            let cat = match version {
                349 => decode_v349(&bytes),
                350 => decode_v350(&bytes),
                351 => decode_v351(&bytes),
                _ => decode_v353(&bytes),
            }
            .unwrap();
            assert_eq!(cat.version, version);
            assert_eq!(cat.eq, 20);
            assert_eq!(cat.entries.len(), 2);
            let ce = &cat.entries[0];
            assert_eq!(ce.vsn, "DLT007");
            assert_eq!(ce.mtype, "lt");
            assert_eq!(ce.capacity, 40_000_000);
            assert_eq!(ce.space, 1_000);
            assert_eq!(ce.block_size, 65536);
            assert_eq!(ce.slot, 7);
            assert_eq!(ce.status, sample().status);
        }
    }

    #[test]
    fn test_truncated_image_rejected() {
        let bytes = encode_v35x(351, 20, "lt", &[sample()]);
        assert!(matches!(
            decode_v351(&bytes[..bytes.len() - 1]),
            Err(CatalogError::SizeMismatch { .. })
        ));
    }
}
