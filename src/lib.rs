//! # samcat - Removable Media Catalog
//!
//! `samcat` keeps the inventory of removable media held by tape and optical
//! libraries, manual drives and the historian (media outside any library).
//!
//! - **Memory-mapped catalogs**: one fixed-layout file per library, shared
//!   read-only by every client process
//! - **Single-writer server**: all mutations are applied one request at a time
//!   by [`server::CatalogServer`], which owns slot allocation, growth and
//!   duplicate VSN detection
//! - **Optimistic readers**: [`client::CatalogClient`] detects replaced files
//!   by their header version and remaps on demand
//! - **Legacy conversion**: catalogs in the five older layouts are converted
//!   at server start, keeping the original as a backup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use samcat::{CatalogClient, CatalogServer, Result, ServerConfig, VolId};
//! use samcat::protocol;
//! use std::thread;
//!
//! # fn main() -> Result<()> {
//! let config = ServerConfig::load("/etc/opt/samcat/catalog.toml")?;
//! let mut server = CatalogServer::start(config)?;
//! let (transport, rx) = protocol::channel();
//! let worker = thread::spawn(move || {
//!     server.serve(&rx);
//!     server.shutdown()
//! });
//!
//! let client = CatalogClient::init("operator", Box::new(transport))?;
//! let slot = client.assign_free_slot(20)?;
//! let ce = client.get_entry(&VolId::cartridge(20, slot))?;
//! println!("{}", ce);
//!
//! client.shutdown_server()?;
//! worker.join().ok();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod core;
pub mod protocol;
pub mod server;

pub use crate::client::CatalogClient;
pub use crate::config::{DeviceConfig, DeviceKind, ServerConfig};
pub use crate::core::entry::{CatalogEntry, CeField, Reservation};
pub use crate::core::error::{CatalogError, ErrorKind, ExitCode, Result};
pub use crate::core::header::{CatalogHeader, CatalogType};
pub use crate::core::status::EntryStatus;
pub use crate::core::volid::{VolId, VolIdFlags, NO_SLOT};
pub use crate::server::CatalogServer;
