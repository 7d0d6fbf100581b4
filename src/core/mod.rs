//! Catalog storage layer
//!
//! - [`error`] - Error types and the exit-code convention
//! - [`codec`] - Checked little-endian record encoding
//! - [`status`] - Entry status bits
//! - [`media`] - Media type codes
//! - [`entry`] - Catalog entry record and zero-copy view
//! - [`header`] - Catalog file header and format constants
//! - [`volid`] - Volume identifiers used in requests
//! - [`store`] - Mapped catalog files
//! - [`table`] - The host-wide catalog table
//! - [`lookup`] - Searches shared by client and server
//! - [`migrate`] - Legacy format conversion
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use samcat::core::header::CatalogHeader;
//! use samcat::core::lookup;
//! use samcat::core::store::{ReadOnlyStore, WritableStore};
//!
//! let mut header = CatalogHeader::new("/var/opt/catalog/lib10", 100);
//! header.eq = 10;
//! WritableStore::create("/var/opt/catalog/lib10", &header).unwrap();
//!
//! let stores = [ReadOnlyStore::open_readonly("/var/opt/catalog/lib10").unwrap()];
//! let slot = lookup::free_slot(&stores[0]);
//! assert_eq!(slot, 0);
//! ```

pub mod codec;
pub mod entry;
pub mod error;
pub mod header;
pub mod lookup;
pub mod media;
pub mod migrate;
pub mod status;
pub mod store;
pub mod table;
pub mod volid;

/// Seconds since the Unix epoch
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
