//! Memory-mapped catalog files
//!
//! A catalog file is a [`CatalogHeader`] followed by `count` fixed-size entries.
//! Clients map files read-only; only the catalog server maps them read-write.
//! Growth replaces the file wholesale, so every holder of a mapping checks the
//! live header version before trusting it (see [`MappedStore::is_stale`]).

use crate::core::entry::{CatalogEntry, EntryView, ENTRY_SIZE};
use crate::core::error::{CatalogError, Result};
use crate::core::header::{CatalogHeader, FORMAT_VERSION, HEADER_SIZE, MAGIC, MAX_CATALOG_FILE};
use crate::core::migrate;
use crate::core::unix_now;
use memmap2::{Mmap, MmapMut};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Result of probing a catalog file's format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Current,
    /// A recognized legacy layout that must be migrated
    Legacy(u32),
}

/// Check that `path` can hold a catalog and return its size
pub fn check_file(path: &Path) -> Result<u64> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CatalogError::CatalogPathMissing(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    if !meta.is_file() {
        return Err(CatalogError::NotRegularFile(path.to_path_buf()));
    }
    let len = meta.len();
    if len == 0 {
        return Err(CatalogError::EmptyFile(path.to_path_buf()));
    }
    if len > MAX_CATALOG_FILE {
        return Err(CatalogError::FileTooLarge(path.to_path_buf()));
    }
    Ok(len)
}

/// Determine whether `path` is a current or recognized legacy catalog
pub fn probe(path: &Path) -> Result<FileFormat> {
    let len = check_file(path)?;
    let mut prefix = Vec::with_capacity(HEADER_SIZE);
    File::open(path)?
        .take(HEADER_SIZE as u64)
        .read_to_end(&mut prefix)?;

    let magic = prefix
        .get(0..4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]));
    let version = prefix
        .get(4..8)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]));
    if magic == Some(MAGIC) && version == Some(FORMAT_VERSION) {
        if prefix.len() < HEADER_SIZE {
            return Err(CatalogError::FileTooSmall(path.to_path_buf()));
        }
        return Ok(FileFormat::Current);
    }

    match migrate::detect(&prefix, len) {
        Some(version) => Ok(FileFormat::Legacy(version)),
        None if magic == Some(MAGIC) => Err(CatalogError::UnsupportedVersion {
            path: path.to_path_buf(),
            version: version.unwrap_or(0),
        }),
        None => Err(CatalogError::InvalidMagic {
            path: path.to_path_buf(),
            found: magic.unwrap_or(0),
        }),
    }
}

/// One mapped catalog file
///
/// `M` is [`Mmap`] for readers and [`MmapMut`] for the server.
pub struct MappedStore<M> {
    path: PathBuf,
    map: M,
    header: CatalogHeader,
}

pub type ReadOnlyStore = MappedStore<Mmap>;
pub type WritableStore = MappedStore<MmapMut>;

impl<M: Deref<Target = [u8]>> MappedStore<M> {
    fn validated(path: &Path, map: M) -> Result<Self> {
        let len = map.len() as u64;
        if len < HEADER_SIZE as u64 {
            return Err(CatalogError::FileTooSmall(path.to_path_buf()));
        }
        let header = CatalogHeader::from_bytes(&map[..HEADER_SIZE])?;
        header.validate(path, len, unix_now())?;
        Ok(MappedStore {
            path: path.to_path_buf(),
            map,
            header,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Header as decoded when the file was mapped
    pub fn header(&self) -> &CatalogHeader {
        &self.header
    }

    pub fn eq(&self) -> u16 {
        self.header.eq
    }

    pub fn count(&self) -> usize {
        self.header.count as usize
    }

    /// Version currently stored in the mapped header
    pub fn live_version(&self) -> u32 {
        let b = &self.map[4..8];
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    /// True once the file behind this mapping has been replaced
    pub fn is_stale(&self) -> bool {
        self.live_version() != FORMAT_VERSION
    }

    pub fn entry_bytes(&self, index: usize) -> Option<&[u8]> {
        if index >= self.count() {
            return None;
        }
        let start = HEADER_SIZE + index * ENTRY_SIZE;
        self.map.get(start..start + ENTRY_SIZE)
    }

    pub fn view(&self, index: usize) -> Option<EntryView<'_>> {
        self.entry_bytes(index).and_then(EntryView::new)
    }

    pub fn views(&self) -> impl Iterator<Item = (usize, EntryView<'_>)> + '_ {
        (0..self.count()).filter_map(move |i| self.view(i).map(|v| (i, v)))
    }

    pub fn entry(&self, index: usize) -> Result<CatalogEntry> {
        let bytes = self.entry_bytes(index).ok_or(CatalogError::Truncated {
            offset: HEADER_SIZE + index * ENTRY_SIZE,
            needed: ENTRY_SIZE,
            len: self.map.len(),
        })?;
        CatalogEntry::from_bytes(bytes)
    }

    /// Copies of entries `start..end`, clamped to the table size
    pub fn entries(&self, start: usize, end: usize) -> Result<Vec<CatalogEntry>> {
        let end = end.min(self.count());
        (start.min(end)..end).map(|i| self.entry(i)).collect()
    }
}

impl MappedStore<Mmap> {
    pub fn open_readonly<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        check_file(path)?;
        let file = File::open(path)?;
        // SAFETY: the catalog server is the only writer and never truncates a
        // mapped file in place; growth replaces it under a new inode.
        let map = unsafe { Mmap::map(&file)? };
        let store = Self::validated(path, map)?;
        debug!("Mapped catalog {:?} read-only, {} entries", path, store.count());
        Ok(store)
    }
}

impl MappedStore<MmapMut> {
    pub fn open_readwrite<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        check_file(path)?;
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        // SAFETY: see open_readonly; this process is the single writer.
        let map = unsafe { MmapMut::map_mut(&file)? };
        Self::validated(path, map)
    }

    /// Create a catalog of `header.count` zeroed entries, replacing any file at `path`
    ///
    /// An existing file is unlinked rather than truncated so processes still
    /// mapping it keep a consistent view until they resync.
    pub fn create<P: AsRef<Path>>(path: P, header: &CatalogHeader) -> Result<Self> {
        let path = path.as_ref();
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut header = header.clone();
        header.magic = MAGIC;
        header.version = FORMAT_VERSION;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        file.write_all(&header.to_bytes())?;
        file.set_len(CatalogHeader::file_size_for(header.count))?;
        file.flush()?;

        // SAFETY: freshly created file owned by this process.
        let map = unsafe { MmapMut::map_mut(&file)? };
        info!("Created catalog {:?} with {} entries", path, header.count);
        Ok(MappedStore {
            path: path.to_path_buf(),
            map,
            header,
        })
    }

    pub fn write_header(&mut self, header: &CatalogHeader) -> Result<()> {
        if header.count != self.header.count {
            return Err(CatalogError::InvalidArgument(format!(
                "header count {} does not match mapped table of {}",
                header.count, self.header.count
            )));
        }
        self.map[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        self.header = header.clone();
        Ok(())
    }

    pub fn write_raw(&mut self, index: usize, bytes: &[u8]) -> Result<()> {
        if index >= self.count() || bytes.len() != ENTRY_SIZE {
            return Err(CatalogError::Truncated {
                offset: HEADER_SIZE + index * ENTRY_SIZE,
                needed: ENTRY_SIZE,
                len: bytes.len(),
            });
        }
        let start = HEADER_SIZE + index * ENTRY_SIZE;
        self.map[start..start + ENTRY_SIZE].copy_from_slice(bytes);
        Ok(())
    }

    pub fn write_entry(&mut self, index: usize, ce: &CatalogEntry) -> Result<()> {
        self.write_raw(index, &ce.to_bytes())
    }

    /// Mark this mapping's file as replaced
    ///
    /// The version is multiplied by ten, which never equals a real version,
    /// so every process sharing the mapping sees it as stale.
    pub fn mark_stale(&mut self) -> Result<()> {
        let stale = self.live_version().saturating_mul(10);
        self.map[4..8].copy_from_slice(&stale.to_le_bytes());
        self.map.flush()?;
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.map.flush()?;
        Ok(())
    }

    /// Rename the mapped file over `path`
    ///
    /// The mapping stays valid; readers of the file previously at `path` keep
    /// the old inode until they resync.
    pub fn persist_as<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.flush()?;
        fs::rename(&self.path, path)?;
        self.path = path.to_path_buf();
        Ok(())
    }
}
