use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Invalid magic number {found:#010x} in {path}")]
    InvalidMagic { path: PathBuf, found: u32 },

    #[error("Unsupported catalog format version {version} in {path}")]
    UnsupportedVersion { path: PathBuf, version: u32 },

    #[error("Catalog {path} size mismatch: header says {entries} entries, file holds {expected} bytes of entries ({actual} bytes total)")]
    SizeMismatch {
        path: PathBuf,
        entries: u32,
        expected: u64,
        actual: u64,
    },

    #[error("Catalog {path} audit time {audit_time} is in the future")]
    FutureAuditTime { path: PathBuf, audit_time: i64 },

    #[error("Catalog {path} has unknown default media type {media:?}")]
    BadMediaType { path: PathBuf, media: String },

    #[error("{0} is not a regular file")]
    NotRegularFile(PathBuf),

    #[error("{0} is empty")]
    EmptyFile(PathBuf),

    #[error("{0} is too small to hold a catalog header")]
    FileTooSmall(PathBuf),

    #[error("{0} is larger than 1 GiB and is not a plausible catalog")]
    FileTooLarge(PathBuf),

    #[error("Catalog table is not valid: {0}")]
    TableInvalid(String),

    #[error("Record truncated: needed {needed} bytes at offset {offset}, have {len}")]
    Truncated {
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("No catalog for equipment {0}")]
    CatalogMissing(u16),

    #[error("No catalog file {0}")]
    CatalogPathMissing(PathBuf),

    #[error("No entry for slot {slot} in equipment {eq}")]
    InvalidSlot { eq: u16, slot: u32 },

    #[error("No partition {part} for slot {slot} in equipment {eq}")]
    InvalidPartition { eq: u16, slot: u32, part: u16 },

    #[error("Volume {mtype}.{vsn} not found")]
    VolumeNotFound { mtype: String, vsn: String },

    #[error("Invalid media type {0:?}")]
    InvalidMediaType(String),

    #[error("Barcode {barcode:?} not found in equipment {eq}")]
    BarcodeNotFound { eq: u16, barcode: String },

    #[error("No entry with mid {0}")]
    MidNotFound(u32),

    #[error("No usable cleaning cartridge in equipment {0}")]
    NoCleaningCartridge(u16),

    #[error("Slot number required for equipment {0}")]
    SlotRequired(u16),

    #[error("Partition required for {0}")]
    PartitionRequired(String),

    #[error("Malformed volume id: {0}")]
    InvalidVolId(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Duplicate VSN {mtype}.{vsn}")]
    DuplicateVsn { mtype: String, vsn: String },

    #[error("Destination slot {slot} in equipment {eq} is occupied")]
    DestinationOccupied { eq: u16, slot: u32 },

    #[error("Volume {volume} already reserved to {asname}/{owner}/{fsname}")]
    AlreadyReserved {
        volume: String,
        asname: String,
        owner: String,
        fsname: String,
    },

    #[error("Volume {0} is not reserved")]
    NotReserved(String),

    #[error("Cannot export the historian's own equipment {0}")]
    HistorianExport(u16),

    #[error("Catalog {path} could not grow to {entries} entries: {reason}")]
    GrowthFailed {
        path: PathBuf,
        entries: u32,
        reason: String,
    },

    #[error("No free name to back up legacy catalog {0}")]
    BackupExhausted(PathBuf),

    #[error("No historian catalog configured")]
    NoHistorian,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Wire encoding error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Volume {0} read as blank; flagged for audit")]
    BlankMedia(String),

    #[error("Catalog {path} cannot be used: {reason}")]
    Unusable { path: PathBuf, reason: String },

    #[error("Catalog server disconnected")]
    Disconnected,

    #[error("Catalog server error ({kind:?}): {message}")]
    Remote { kind: ErrorKind, message: String },
}

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Broad error classes shared by the server, the client and the exit-code convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed request or file; never retried automatically.
    Validation,
    /// Named catalog or entry does not exist.
    NotFound,
    /// Request collides with existing state.
    Conflict,
    /// A store cannot be trusted; fatal to the detecting process.
    Corruption,
    /// May succeed if retried.
    Transient,
}

impl CatalogError {
    pub fn kind(&self) -> ErrorKind {
        use CatalogError::*;
        match self {
            InvalidVolId(_) | InvalidArgument(_) | SlotRequired(_) | PartitionRequired(_)
            | NotRegularFile(_) | EmptyFile(_) | FileTooSmall(_) | FileTooLarge(_)
            | BadMediaType { .. } | FutureAuditTime { .. } | InvalidMediaType(_)
            | HistorianExport(_) | Config(_) | NoHistorian | UnsupportedVersion { .. }
            | BlankMedia(_) => {
                ErrorKind::Validation
            }
            CatalogMissing(_) | CatalogPathMissing(_) | InvalidSlot { .. }
            | InvalidPartition { .. } | VolumeNotFound { .. } | BarcodeNotFound { .. }
            | MidNotFound(_) | NoCleaningCartridge(_) => ErrorKind::NotFound,
            DuplicateVsn { .. } | DestinationOccupied { .. } | AlreadyReserved { .. }
            | NotReserved(_) => ErrorKind::Conflict,
            InvalidMagic { .. } | SizeMismatch { .. } | Truncated { .. } | TableInvalid(_)
            | BackupExhausted(_) | Unusable { .. } => ErrorKind::Corruption,
            GrowthFailed { .. } | Io(_) | Codec(_) | Disconnected => ErrorKind::Transient,
            Remote { kind, .. } => *kind,
        }
    }

    /// Exit code a process should use when this error ends it.
    pub fn exit_code(&self) -> ExitCode {
        match self.kind() {
            ErrorKind::Corruption => ExitCode::NoRestart,
            ErrorKind::Transient => ExitCode::Retry,
            _ => ExitCode::Failure,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Process exit codes understood by the daemon supervisor.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    Failure = 1,
    /// Do not restart; operator action required.
    NoRestart = 2,
    NoMemory = 3,
    /// Restart after a delay.
    Retry = 4,
    /// No filesystem or equipment configured.
    NoFilesystem = 5,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Serialisable form of an error sent back in a reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&CatalogError> for WireError {
    fn from(err: &CatalogError) -> Self {
        WireError {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<WireError> for CatalogError {
    fn from(err: WireError) -> Self {
        CatalogError::Remote {
            kind: err.kind,
            message: err.message,
        }
    }
}
