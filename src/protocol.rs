//! Catalog server request/response protocol
//!
//! Every mutation is a [`Request`] answered by exactly one [`Response`].
//! Two transports are provided: an in-process channel pair used by tests and
//! embedded servers, and a Unix socket carrying length-prefixed bincode frames.

use crate::core::entry::{CatalogEntry, CeField, Reservation};
use crate::core::error::{CatalogError, Result, WireError};
use crate::core::status::EntryStatus;
use crate::core::volid::VolId;
use crossbeam::channel::{self, Receiver, Sender};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

/// Largest frame body accepted from the socket
pub const MAX_FRAME: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Location of the catalog table
    GetInfo,
    /// Allocate an entry at the lowest free slot of a catalog
    AssignFreeSlot { eq: u16 },
    /// Move a volume to the historian, or drop it if already there
    Export { vid: VolId },
    /// Replace a cartridge with `partitions` fresh partition entries
    FormatPartitions {
        vid: VolId,
        partitions: u16,
        status: EntryStatus,
    },
    LabelVolume { vid: VolId, new_vsn: String },
    /// Label written; `entry` carries the new media description
    LabelComplete { entry: CatalogEntry },
    LabelFailed { vid: VolId, new_vsn: String },
    /// Export every volume of a library
    LibraryExport { eq: u16 },
    /// Media closed after writing; `entry` carries space and position
    MediaClosed { entry: CatalogEntry },
    MoveSlot { vid: VolId, dest_slot: u32 },
    ReconcileCatalog { eq: u16 },
    /// Entry image sent by a remote SAM server
    RemoteSamUpdate { entry: CatalogEntry, relabel: bool },
    ReserveVolume {
        vid: VolId,
        reservation: Reservation,
    },
    UnReserveVolume { vid: VolId },
    SetAudit { eq: u16 },
    SetCleaning { eq: u16 },
    SetRemoteServer,
    /// Library scanned a slot
    SlotInit {
        vid: VolId,
        status: EntryStatus,
        two_sided: bool,
        barcode: String,
        alt_barcode: String,
    },
    /// Set an integer field; for [`CeField::Status`] only bits in `mask` change
    SetField {
        vid: VolId,
        field: CeField,
        value: u64,
        mask: u32,
    },
    SetString {
        vid: VolId,
        field: CeField,
        value: String,
    },
    /// Drive reported the media it mounted
    VolumeLoaded { entry: CatalogEntry },
    VolumeUnloaded { vid: VolId, barcode: String },
    /// Stop the request loop after replying
    Shutdown,
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::GetInfo => "GetInfo",
            Request::AssignFreeSlot { .. } => "AssignFreeSlot",
            Request::Export { .. } => "Export",
            Request::FormatPartitions { .. } => "FormatPartitions",
            Request::LabelVolume { .. } => "LabelVolume",
            Request::LabelComplete { .. } => "LabelComplete",
            Request::LabelFailed { .. } => "LabelFailed",
            Request::LibraryExport { .. } => "LibraryExport",
            Request::MediaClosed { .. } => "MediaClosed",
            Request::MoveSlot { .. } => "MoveSlot",
            Request::ReconcileCatalog { .. } => "ReconcileCatalog",
            Request::RemoteSamUpdate { .. } => "RemoteSamUpdate",
            Request::ReserveVolume { .. } => "ReserveVolume",
            Request::UnReserveVolume { .. } => "UnReserveVolume",
            Request::SetAudit { .. } => "SetAudit",
            Request::SetCleaning { .. } => "SetCleaning",
            Request::SetRemoteServer => "SetRemoteServer",
            Request::SlotInit { .. } => "SlotInit",
            Request::SetField { .. } => "SetField",
            Request::SetString { .. } => "SetString",
            Request::VolumeLoaded { .. } => "VolumeLoaded",
            Request::VolumeUnloaded { .. } => "VolumeUnloaded",
            Request::Shutdown => "Shutdown",
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name();
        match self {
            Request::AssignFreeSlot { eq }
            | Request::LibraryExport { eq }
            | Request::ReconcileCatalog { eq }
            | Request::SetAudit { eq }
            | Request::SetCleaning { eq } => write!(f, "{}({})", name, eq),
            Request::Export { vid } | Request::UnReserveVolume { vid } => {
                write!(f, "{}({})", name, vid)
            }
            Request::FormatPartitions {
                vid, partitions, ..
            } => write!(f, "{}({}, {})", name, vid, partitions),
            Request::LabelVolume { vid, new_vsn } | Request::LabelFailed { vid, new_vsn } => {
                write!(f, "{}({}, {})", name, vid, new_vsn)
            }
            Request::LabelComplete { entry }
            | Request::MediaClosed { entry }
            | Request::RemoteSamUpdate { entry, .. }
            | Request::VolumeLoaded { entry } => write!(
                f,
                "{}({}:{}:{} {}.{})",
                name, entry.eq, entry.slot, entry.part, entry.mtype, entry.vsn
            ),
            Request::MoveSlot { vid, dest_slot } => {
                write!(f, "{}({}, {})", name, vid, dest_slot)
            }
            Request::ReserveVolume { vid, reservation } => write!(
                f,
                "{}({}, {}/{}/{})",
                name, vid, reservation.asname, reservation.owner, reservation.fsname
            ),
            Request::SlotInit {
                vid,
                status,
                two_sided,
                barcode,
                alt_barcode,
            } => write!(
                f,
                "{}({}, {:08x}, {}, {}, {})",
                name,
                vid,
                status.bits(),
                two_sided,
                barcode,
                alt_barcode
            ),
            Request::SetField {
                vid,
                field: CeField::Status,
                value,
                mask,
            } => write!(f, "{}({}, status, {:08x}, {:08x})", name, vid, value, mask),
            Request::SetField {
                vid, field, value, ..
            } => write!(f, "{}({}, {:?}, {})", name, vid, field, value),
            Request::SetString { vid, field, value } => {
                write!(f, "{}({}, {:?}, {})", name, vid, field, value)
            }
            Request::VolumeUnloaded { vid, barcode } => {
                write!(f, "{}({}, {})", name, vid, barcode)
            }
            Request::GetInfo | Request::SetRemoteServer | Request::Shutdown => {
                write!(f, "{}()", name)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Slot(u32),
    Info { table_path: PathBuf },
    Err(WireError),
}

impl Response {
    /// Turn an error reply into `Err`
    pub fn into_result(self) -> Result<Response> {
        match self {
            Response::Err(e) => Err(e.into()),
            other => Ok(other),
        }
    }
}

impl From<Result<Response>> for Response {
    fn from(result: Result<Response>) -> Self {
        match result {
            Ok(rsp) => rsp,
            Err(e) => Response::Err(WireError::from(&e)),
        }
    }
}

/// Synchronous request/reply to a catalog server
pub trait Transport: Send + Sync {
    fn call(&self, request: Request) -> Result<Response>;
}

/// A request paired with the channel its reply goes back on
pub struct Envelope {
    pub request: Request,
    pub reply: Sender<Response>,
}

/// Client half of an in-process connection
#[derive(Clone)]
pub struct ChannelTransport {
    tx: Sender<Envelope>,
}

/// Create a connected transport and the receiver a server loop reads from
pub fn channel() -> (ChannelTransport, Receiver<Envelope>) {
    let (tx, rx) = channel::unbounded();
    (ChannelTransport { tx }, rx)
}

impl Transport for ChannelTransport {
    fn call(&self, request: Request) -> Result<Response> {
        let (reply, rx) = channel::bounded(1);
        self.tx
            .send(Envelope { request, reply })
            .map_err(|_| CatalogError::Disconnected)?;
        rx.recv().map_err(|_| CatalogError::Disconnected)
    }
}

/// Write one `u32` little-endian length prefixed bincode frame
pub fn write_frame<W: Write, T: Serialize>(w: &mut W, msg: &T) -> Result<()> {
    let body = bincode::serialize(msg)?;
    if body.len() > MAX_FRAME {
        return Err(CatalogError::InvalidArgument(format!(
            "frame of {} bytes exceeds {}",
            body.len(),
            MAX_FRAME
        )));
    }
    w.write_all(&(body.len() as u32).to_le_bytes())?;
    w.write_all(&body)?;
    w.flush()?;
    Ok(())
}

pub fn read_frame<R: Read, T: DeserializeOwned>(r: &mut R) -> Result<T> {
    let mut len = [0u8; 4];
    r.read_exact(&mut len).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => CatalogError::Disconnected,
        _ => e.into(),
    })?;
    let len = u32::from_le_bytes(len) as usize;
    if len > MAX_FRAME {
        return Err(CatalogError::InvalidArgument(format!(
            "frame of {} bytes exceeds {}",
            len, MAX_FRAME
        )));
    }
    let mut body = vec![0u8; len];
    r.read_exact(&mut body)?;
    Ok(bincode::deserialize(&body)?)
}

/// Connects to the server socket once per request
pub struct UnixTransport {
    path: PathBuf,
}

impl UnixTransport {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        UnixTransport {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl Transport for UnixTransport {
    fn call(&self, request: Request) -> Result<Response> {
        let mut stream = UnixStream::connect(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused => {
                CatalogError::Disconnected
            }
            _ => e.into(),
        })?;
        write_frame(&mut stream, &request)?;
        read_frame(&mut stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use std::io::Cursor;

    #[test]
    fn test_frame_roundtrip() {
        let req = Request::MoveSlot {
            vid: VolId::cartridge(20, 4),
            dest_slot: 9,
        };
        let mut buf = Vec::new();
        write_frame(&mut buf, &req).unwrap();
        assert_eq!(&buf[..4], &((buf.len() - 4) as u32).to_le_bytes());

        let back: Request = read_frame(&mut Cursor::new(buf)).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buf = ((MAX_FRAME + 1) as u32).to_le_bytes().to_vec();
        buf.extend_from_slice(&[0u8; 16]);
        let res: Result<Request> = read_frame(&mut Cursor::new(buf));
        assert!(matches!(res, Err(CatalogError::InvalidArgument(_))));
    }

    #[test]
    fn test_eof_is_disconnect() {
        let res: Result<Request> = read_frame(&mut Cursor::new(Vec::new()));
        assert!(matches!(res, Err(CatalogError::Disconnected)));
    }

    #[test]
    fn test_error_reply_keeps_kind() {
        let err = CatalogError::DestinationOccupied { eq: 20, slot: 3 };
        let rsp = Response::from(Err::<Response, _>(err));
        let back = rsp.into_result().unwrap_err();
        assert_eq!(back.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_channel_call() {
        let (transport, rx) = channel();
        let handle = std::thread::spawn(move || {
            let env = rx.recv().unwrap();
            assert_eq!(env.request, Request::AssignFreeSlot { eq: 5 });
            env.reply.send(Response::Slot(7)).unwrap();
        });
        let rsp = transport.call(Request::AssignFreeSlot { eq: 5 }).unwrap();
        assert_eq!(rsp, Response::Slot(7));
        handle.join().unwrap();
    }

    #[test]
    fn test_channel_disconnected() {
        let (transport, rx) = channel();
        drop(rx);
        assert!(matches!(
            transport.call(Request::GetInfo),
            Err(CatalogError::Disconnected)
        ));
    }
}
