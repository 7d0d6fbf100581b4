//! Request-side volume identifiers

use crate::core::entry::CatalogEntry;
use crate::core::error::{CatalogError, Result};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Slot number asking the server to pick a free slot
pub const NO_SLOT: u32 = u32::MAX;

bitflags! {
    /// Which [`VolId`] fields the caller supplied
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct VolIdFlags: u8 {
        const EQ = 1 << 0;
        const SLOT = 1 << 1;
        const PART = 1 << 2;
        const MTYPE = 1 << 3;
        const VSN = 1 << 4;

        /// Media type and VSN, any location
        const LOGICAL = Self::MTYPE.bits() | Self::VSN.bits();
        /// Equipment and slot, all partitions
        const CART = Self::EQ.bits() | Self::SLOT.bits();
        /// Equipment, slot and one partition
        const ONEPART = Self::CART.bits() | Self::PART.bits();
        const ALL = Self::ONEPART.bits() | Self::LOGICAL.bits();
    }
}

/// Names a volume either logically (media type and VSN) or physically
/// (equipment, slot and optional partition)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolId {
    pub flags: VolIdFlags,
    pub eq: u16,
    pub slot: u32,
    pub part: u16,
    pub mtype: String,
    pub vsn: String,
}

impl VolId {
    pub fn logical(mtype: &str, vsn: &str) -> Self {
        VolId {
            flags: VolIdFlags::LOGICAL,
            mtype: mtype.to_string(),
            vsn: vsn.to_string(),
            ..VolId::default()
        }
    }

    /// Whole cartridge at a slot
    pub fn cartridge(eq: u16, slot: u32) -> Self {
        VolId {
            flags: VolIdFlags::CART,
            eq,
            slot,
            ..VolId::default()
        }
    }

    pub fn partition(eq: u16, slot: u32, part: u16) -> Self {
        VolId {
            flags: VolIdFlags::ONEPART,
            eq,
            slot,
            part,
            ..VolId::default()
        }
    }

    /// Equipment only, as used for manual drives
    pub fn equipment(eq: u16) -> Self {
        VolId {
            flags: VolIdFlags::EQ,
            eq,
            ..VolId::default()
        }
    }

    /// Fully populated identifier for an existing entry
    pub fn from_entry(ce: &CatalogEntry) -> Self {
        let mut flags = VolIdFlags::ONEPART;
        if !ce.vsn.is_empty() {
            flags.insert(VolIdFlags::LOGICAL);
        }
        VolId {
            flags,
            eq: ce.eq,
            slot: ce.slot,
            part: ce.part,
            mtype: ce.mtype.clone(),
            vsn: ce.vsn.clone(),
        }
    }

    pub fn is_logical(&self) -> bool {
        self.flags == VolIdFlags::LOGICAL
    }

    pub fn is_cartridge(&self) -> bool {
        self.flags == VolIdFlags::CART
    }

    pub fn has(&self, flag: VolIdFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Reject identifiers that name neither a location nor a volume
    pub fn check(&self) -> Result<()> {
        if self.is_logical() {
            if self.mtype.is_empty() || self.vsn.is_empty() {
                return Err(CatalogError::InvalidVolId(self.to_string()));
            }
            return Ok(());
        }
        if !self.has(VolIdFlags::EQ) {
            return Err(CatalogError::InvalidVolId(self.to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for VolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has(VolIdFlags::EQ) {
            write!(f, "{}", self.eq)?;
        }
        if self.has(VolIdFlags::SLOT) {
            write!(f, ":{}", self.slot)?;
        }
        if self.has(VolIdFlags::PART) {
            write!(f, ":{}", self.part)?;
        }
        if self.has(VolIdFlags::ONEPART) {
            f.write_str(" ")?;
        }
        if self.flags.intersects(VolIdFlags::LOGICAL) {
            if self.has(VolIdFlags::MTYPE) {
                if self.mtype.is_empty() {
                    f.write_str("_.")?;
                } else {
                    write!(f, "{}.", self.mtype)?;
                }
            } else {
                f.write_str("??.")?;
            }
            if self.has(VolIdFlags::VSN) {
                f.write_str(&self.vsn)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendering() {
        assert_eq!(VolId::logical("li", "VSN001").to_string(), "li.VSN001");
        assert_eq!(VolId::cartridge(10, 3).to_string(), "10:3");
        assert_eq!(VolId::partition(10, 3, 1).to_string(), "10:3:1 ");
        assert_eq!(VolId::equipment(5).to_string(), "5");
    }

    #[test]
    fn test_from_entry() {
        let ce = CatalogEntry {
            eq: 10,
            slot: 4,
            part: 2,
            mtype: "mo".into(),
            vsn: "OPT1".into(),
            ..CatalogEntry::default()
        };
        let vid = VolId::from_entry(&ce);
        assert_eq!(vid.flags, VolIdFlags::ALL);
        assert!(!vid.is_logical());
        assert_eq!(vid.to_string(), "10:4:2 mo.OPT1");
    }

    #[test]
    fn test_flag_groups() {
        assert!(VolIdFlags::ONEPART.contains(VolIdFlags::CART));
        assert!(!VolIdFlags::CART.intersects(VolIdFlags::LOGICAL));
        assert_eq!(VolIdFlags::ALL, VolIdFlags::all());

        let mut vid = VolId::cartridge(10, 3);
        vid.mtype = "li".into();
        assert!(vid.is_cartridge());
        vid.flags.insert(VolIdFlags::PART);
        assert!(!vid.is_cartridge());
    }

    #[test]
    fn test_check() {
        assert!(VolId::logical("li", "").check().is_err());
        assert!(VolId::default().check().is_err());
        assert!(VolId::equipment(1).check().is_ok());
    }
}
