use crate::core::codec::{ByteReader, ByteWriter};
use crate::core::entry::ENTRY_SIZE;
use crate::core::error::{CatalogError, Result};
use crate::core::media::UNKNOWN_MEDIA;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Magic number of a current-generation catalog file: "CATF"
pub const MAGIC: u32 = u32::from_le_bytes(*b"CATF");
pub const FORMAT_VERSION: u32 = 500;
pub const HEADER_SIZE: usize = 256;
pub const FNAME_LEN: usize = 128;
pub const MEDIA_LEN: usize = 8;

/// Largest file accepted as a catalog
pub const MAX_CATALOG_FILE: u64 = 1 << 30;

/// Kind of equipment that owns a catalog
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogType {
    Library = 0,
    Historian = 1,
    Manual = 2,
}

impl CatalogType {
    /// Unknown values read as a library
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Historian,
            2 => Self::Manual,
            _ => Self::Library,
        }
    }
}

/// Catalog file header
///
/// The header occupies the first 256 bytes of a catalog file and is followed
/// directly by `count` entries of [`ENTRY_SIZE`] bytes.
///
/// ```text
/// 0  magic u32        4  version u32      8  eq u16
/// 10 type u8          12 media [8]        24 audit_time i64
/// 32 count u32        40 fname [128]      168.. reserved
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogHeader {
    pub magic: u32,
    pub version: u32,
    pub eq: u16,
    pub kind: CatalogType,
    /// Default media type for the library
    pub media: String,
    /// Time of the last full audit, zero if never
    pub audit_time: i64,
    pub count: u32,
    /// Path the file was created under
    pub fname: String,
}

impl CatalogHeader {
    pub fn new(fname: &str, count: u32) -> Self {
        CatalogHeader {
            magic: MAGIC,
            version: FORMAT_VERSION,
            eq: 0,
            kind: CatalogType::Library,
            media: String::new(),
            audit_time: 0,
            count,
            fname: fname.to_string(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(HEADER_SIZE);
        w.u32(self.magic)
            .u32(self.version)
            .u16(self.eq)
            .u8(self.kind as u8)
            .pad_to(12)
            .fixed_str(&self.media, MEDIA_LEN)
            .pad_to(24)
            .i64(self.audit_time)
            .u32(self.count)
            .pad_to(40)
            .fixed_str(&self.fname, FNAME_LEN);
        w.finish(HEADER_SIZE)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);
        let magic = r.u32()?;
        let version = r.u32()?;
        let eq = r.u16()?;
        let kind = CatalogType::from_u8(r.u8()?);
        r.seek(12);
        let media = r.fixed_str(MEDIA_LEN)?;
        r.seek(24);
        let audit_time = r.i64()?;
        let count = r.u32()?;
        r.seek(40);
        let fname = r.fixed_str(FNAME_LEN)?;
        // Require the reserved tail so a short buffer is never accepted
        r.seek(HEADER_SIZE - 1);
        r.u8()?;
        Ok(CatalogHeader {
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

    /// Byte size a file with `count` entries must have
    pub fn file_size_for(count: u32) -> u64 {
        HEADER_SIZE as u64 + count as u64 * ENTRY_SIZE as u64
    }

    /// Validate a current-version header against the file holding it
    pub fn validate(&self, path: &Path, file_len: u64, now: i64) -> Result<()> {
        if self.magic != MAGIC {
            return Err(CatalogError::InvalidMagic {
                path: path.to_path_buf(),
                found: self.magic,
            });
        }

        if self.version != FORMAT_VERSION {
            return Err(CatalogError::UnsupportedVersion {
                path: path.to_path_buf(),
                version: self.version,
            });
        }

        if self.audit_time < 0 || self.audit_time > now {
            return Err(CatalogError::FutureAuditTime {
                path: path.to_path_buf(),
                audit_time: self.audit_time,
            });
        }

        if self.media == UNKNOWN_MEDIA {
            return Err(CatalogError::BadMediaType {
                path: path.to_path_buf(),
                media: self.media.clone(),
            });
        }

        let expected = Self::file_size_for(self.count);
        if file_len != expected {
            return Err(CatalogError::SizeMismatch {
                path: path.to_path_buf(),
                entries: self.count,
                expected,
                actual: file_len,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_header_layout() {
        let mut header = CatalogHeader::new("/var/opt/catalog/lib20", 100);
        header.eq = 20;
        header.kind = CatalogType::Historian;
        header.media = "li".into();
        header.audit_time = 1_700_000_000;

        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[0..4], b"CATF");
        assert_eq!(CatalogHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn test_short_header_rejected() {
        let bytes = CatalogHeader::new("x", 1).to_bytes();
        assert!(matches!(
            CatalogHeader::from_bytes(&bytes[..HEADER_SIZE - 1]),
            Err(CatalogError::Truncated { .. })
        ));
    }

    #[test]
    fn test_validate() {
        let path = PathBuf::from("/tmp/cat");
        let header = CatalogHeader::new("cat", 4);
        let size = CatalogHeader::file_size_for(4);
        assert!(header.validate(&path, size, 0).is_ok());

        assert!(matches!(
            header.validate(&path, size + 1, 0),
            Err(CatalogError::SizeMismatch { entries: 4, .. })
        ));

        let mut future = header.clone();
        future.audit_time = 100;
        assert!(matches!(
            future.validate(&path, size, 50),
            Err(CatalogError::FutureAuditTime { .. })
        ));

        let mut unknown = header.clone();
        unknown.media = UNKNOWN_MEDIA.into();
        assert!(matches!(
            unknown.validate(&path, size, 0),
            Err(CatalogError::BadMediaType { .. })
        ));

        let mut old = header;
        old.version = 353;
        assert!(matches!(
            old.validate(&path, size, 0),
            Err(CatalogError::UnsupportedVersion { version: 353, .. })
        ));
    }
}
