//! Catalog table file
//!
//! Lists every catalog file on the host. Written by the server at startup,
//! mapped read-only by clients to find the catalogs.
//!
//! ```text
//! 0  magic u32   4  valid u32   8  created i64   16 last_mid u32
//! 20 num_files u32   24 reserved   32.. num_files paths of 256 bytes
//! ```

use crate::core::codec::{ByteReader, ByteWriter};
use crate::core::error::{CatalogError, Result};
use crate::core::store::check_file;
use crate::core::unix_now;
use memmap2::{Mmap, MmapMut};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const TABLE_MAGIC: u32 = u32::from_le_bytes(*b"CATT");
pub const TABLE_HEADER_SIZE: usize = 32;
pub const PATH_LEN: usize = 256;

const OFF_VALID: usize = 4;
const OFF_LAST_MID: usize = 16;

/// Mapped catalog table
pub struct CatalogTable<M> {
    path: PathBuf,
    map: M,
    created: i64,
    files: Vec<PathBuf>,
}

pub type ReadOnlyTable = CatalogTable<Mmap>;
pub type WritableTable = CatalogTable<MmapMut>;

fn encode(valid: bool, created: i64, last_mid: u32, files: &[PathBuf]) -> Result<Vec<u8>> {
    let size = TABLE_HEADER_SIZE + files.len() * PATH_LEN;
    let mut w = ByteWriter::with_capacity(size);
    w.u32(TABLE_MAGIC)
        .u32(valid as u32)
        .i64(created)
        .u32(last_mid)
        .u32(files.len() as u32)
        .pad_to(TABLE_HEADER_SIZE);
    for file in files {
        let name = file.to_string_lossy();
        if name.len() >= PATH_LEN {
            return Err(CatalogError::Config(format!(
                "catalog path {:?} longer than {} bytes",
                file,
                PATH_LEN - 1
            )));
        }
        w.fixed_str(&name, PATH_LEN);
    }
    Ok(w.finish(size))
}

impl<M: Deref<Target = [u8]>> CatalogTable<M> {
    fn decode(path: &Path, map: M) -> Result<Self> {
        let mut r = ByteReader::new(&map);
        let magic = r.u32()?;
        if magic != TABLE_MAGIC {
            return Err(CatalogError::InvalidMagic {
                path: path.to_path_buf(),
                found: magic,
            });
        }
        let _valid = r.u32()?;
        let created = r.i64()?;
        let _last_mid = r.u32()?;
        let num_files = r.u32()?;

        let expected = (TABLE_HEADER_SIZE + num_files as usize * PATH_LEN) as u64;
        if map.len() as u64 != expected {
            return Err(CatalogError::SizeMismatch {
                path: path.to_path_buf(),
                entries: num_files,
                expected,
                actual: map.len() as u64,
            });
        }

        r.seek(TABLE_HEADER_SIZE);
        let mut files = Vec::with_capacity(num_files as usize);
        for _ in 0..num_files {
            files.push(PathBuf::from(r.fixed_str(PATH_LEN)?));
        }
        drop(r);

        Ok(CatalogTable {
            path: path.to_path_buf(),
            map,
            created,
            files,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Live validity flag; cleared when the server shuts down or restarts
    pub fn is_valid(&self) -> bool {
        let b = &self.map[OFF_VALID..OFF_VALID + 4];
        u32::from_le_bytes([b[0], b[1], b[2], b[3]]) != 0
    }

    pub fn created(&self) -> i64 {
        self.created
    }

    pub fn last_mid(&self) -> u32 {
        let b = &self.map[OFF_LAST_MID..OFF_LAST_MID + 4];
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

impl CatalogTable<Mmap> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        check_file(path)?;
        let file = File::open(path)?;
        // SAFETY: the table is only rewritten by replacing the file.
        let map = unsafe { Mmap::map(&file)? };
        let table = Self::decode(path, map)?;
        if !table.is_valid() {
            return Err(CatalogError::TableInvalid(format!("{:?}", path)));
        }
        debug!("Mapped catalog table {:?}, {} files", path, table.files.len());
        Ok(table)
    }
}

impl CatalogTable<MmapMut> {
    /// Write a new valid table listing `files`, replacing any existing one
    pub fn create<P: AsRef<Path>>(path: P, files: &[PathBuf], last_mid: u32) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let bytes = encode(true, unix_now(), last_mid, files)?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        file.write_all(&bytes)?;
        file.flush()?;

        // SAFETY: freshly created file owned by the server.
        let map = unsafe { MmapMut::map_mut(&file)? };
        info!("Catalog table {:?} written with {} files", path, files.len());
        Self::decode(path, map)
    }

    pub fn set_last_mid(&mut self, mid: u32) -> Result<()> {
        self.map[OFF_LAST_MID..OFF_LAST_MID + 4].copy_from_slice(&mid.to_le_bytes());
        Ok(())
    }

    /// Clear the validity flag so clients drop their mappings
    pub fn invalidate(&mut self) -> Result<()> {
        self.map[OFF_VALID..OFF_VALID + 4].copy_from_slice(&0u32.to_le_bytes());
        self.map.flush()?;
        Ok(())
    }
}

/// Invalidate a table file left by a previous server, if one exists
pub fn invalidate_existing(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    if file.metadata()?.len() < TABLE_HEADER_SIZE as u64 {
        return Ok(());
    }
    // SAFETY: the previous server is gone; nobody else writes the table.
    let map = unsafe { MmapMut::map_mut(&file)? };
    match CatalogTable::decode(path, map) {
        Ok(mut table) => table.invalidate(),
        Err(e) => {
            debug!("Ignoring unreadable old catalog table {:?}: {}", path, e);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_and_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("CatalogTable");
        let files = vec![dir.path().join("lib10"), dir.path().join("hist30")];

        let mut table = WritableTable::create(&path, &files, 7).unwrap();
        assert!(table.is_valid());
        table.set_last_mid(42).unwrap();

        let reader = ReadOnlyTable::open(&path).unwrap();
        assert_eq!(reader.files(), &files[..]);
        assert_eq!(reader.last_mid(), 42);
        assert!(reader.created() > 0);

        table.invalidate().unwrap();
        assert!(!reader.is_valid());
        assert!(matches!(
            ReadOnlyTable::open(&path),
            Err(CatalogError::TableInvalid(_))
        ));
    }

    #[test]
    fn test_invalidate_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("CatalogTable");
        invalidate_existing(&path).unwrap();

        let files = vec![dir.path().join("lib10")];
        let _table = WritableTable::create(&path, &files, 1).unwrap();
        let reader = ReadOnlyTable::open(&path).unwrap();
        invalidate_existing(&path).unwrap();
        assert!(!reader.is_valid());
    }

    #[test]
    fn test_overlong_path_rejected() {
        let dir = tempdir().unwrap();
        let long = PathBuf::from("/".to_string() + &"x".repeat(PATH_LEN));
        assert!(WritableTable::create(dir.path().join("t"), &[long], 0).is_err());
    }
}
