//! Conversion of legacy catalog files
//!
//! Five older layouts are recognized: 331 (no magic number) and 349, 350, 351
//! and 353 (current magic, older version). Each is decoded by its own typed
//! record into current [`CatalogEntry`] values. Conversion renames the legacy
//! file to a backup before the new file is written, so the original is never
//! destroyed.

pub mod v331;
pub mod v35x;

use crate::core::entry::CatalogEntry;
use crate::core::error::{CatalogError, Result};
use crate::core::header::{CatalogHeader, CatalogType, MAGIC};
use crate::core::status::EntryStatus;
use crate::core::store::WritableStore;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub use v331::decode_v331;
pub use v35x::{decode_v349, decode_v350, decode_v351, decode_v353};

pub const LEGACY_VERSIONS: [u32; 5] = [331, 349, 350, 351, 353];

/// How many `.n` suffixes are tried before giving up on a backup name
pub const MAX_BACKUP_PROBES: u32 = 10;

/// Legacy status bit and the current bit it maps to
pub type StatusMap = &'static [(u32, EntryStatus)];

/// A decoded legacy catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyCatalog {
    pub version: u32,
    pub eq: u16,
    pub kind: CatalogType,
    pub media: String,
    pub audit_time: i64,
    pub entries: Vec<CatalogEntry>,
}

pub(crate) fn map_status(old: u32, map: StatusMap) -> EntryStatus {
    map.iter()
        .filter(|(bit, _)| old & bit != 0)
        .fold(EntryStatus::empty(), |acc, (_, new)| acc | *new)
}

#[cfg(test)]
pub(crate) fn unmap_status(status: EntryStatus, map: StatusMap) -> u32 {
    map.iter()
        .filter(|(_, new)| status.contains(*new))
        .fold(0, |acc, (bit, _)| acc | bit)
}

/// Legacy version of a file given its first bytes and total length
pub fn detect(prefix: &[u8], len: u64) -> Option<u32> {
    let magic = prefix
        .get(0..4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]));
    if magic == Some(MAGIC) {
        return v35x::header_version(prefix).filter(|v| *v != 331 && LEGACY_VERSIONS.contains(v));
    }
    v331::detect(prefix, len).then_some(v331::VERSION)
}

pub fn decode(version: u32, bytes: &[u8]) -> Result<LegacyCatalog> {
    match version {
        331 => decode_v331(bytes),
        349 => decode_v349(bytes),
        350 => decode_v350(bytes),
        351 => decode_v351(bytes),
        353 => decode_v353(bytes),
        _ => Err(CatalogError::UnsupportedVersion {
            path: PathBuf::new(),
            version,
        }),
    }
}

/// First unused `<name>.<version>[.<n>]` beside `path`
pub fn backup_name(path: &Path, version: u32) -> Result<PathBuf> {
    let base = format!("{}.{}", path.display(), version);
    let first = PathBuf::from(&base);
    if !first.exists() {
        return Ok(first);
    }
    for n in 1..=MAX_BACKUP_PROBES {
        let candidate = PathBuf::from(format!("{}.{}", base, n));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(CatalogError::BackupExhausted(path.to_path_buf()))
}

/// Convert the legacy file at `path` in place
///
/// The legacy file is renamed to its backup name, then a current-format file
/// holding the decoded entries is created at `path`.
pub fn convert(path: &Path, version: u32) -> Result<WritableStore> {
    let bytes = fs::read(path)?;
    let legacy = decode(version, &bytes).map_err(|e| match e {
        CatalogError::SizeMismatch {
            entries,
            expected,
            actual,
            ..
        } => CatalogError::SizeMismatch {
            path: path.to_path_buf(),
            entries,
            expected,
            actual,
        },
        other => other,
    })?;

    let backup = backup_name(path, version)?;
    fs::rename(path, &backup)?;
    debug!("Legacy catalog {:?} saved as {:?}", path, backup);

    let count = legacy.entries.len().max(1) as u32;
    let mut header = CatalogHeader::new(&path.to_string_lossy(), count);
    header.eq = legacy.eq;
    header.kind = legacy.kind;
    header.media = legacy.media.clone();
    header.audit_time = legacy.audit_time;

    let mut store = WritableStore::create(path, &header)?;
    for (index, ce) in legacy.entries.iter().enumerate() {
        let mut ce = ce.clone();
        ce.eq = legacy.eq;
        store.write_entry(index, &ce)?;
    }
    store.flush()?;

    info!(
        "Converted catalog {:?} from version {} ({} entries), original kept as {:?}",
        path,
        version,
        legacy.entries.len(),
        backup
    );
    Ok(store)
}
