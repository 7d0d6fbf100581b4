//! Field updates, reservations and catalog-wide flags

use super::notify::RemoteChange;
use super::policy;
use super::CatalogServer;
use crate::core::entry::{CatalogEntry, CeField, Reservation};
use crate::core::error::{CatalogError, Result};
use crate::core::lookup::{self, EntryLoc};
use crate::core::status::EntryStatus;
use crate::core::unix_now;
use crate::core::volid::VolId;
use crate::protocol::Response;
use tracing::{debug, info};

/// Status bits whose change the archiver must hear about
const ARCHIVER_BITS: EntryStatus = EntryStatus::from_bits_retain(
    EntryStatus::READ_ONLY.bits()
        | EntryStatus::UNAVAIL.bits()
        | EntryStatus::RECYCLE.bits()
        | EntryStatus::NON_SAM.bits()
        | EntryStatus::BAD_MEDIA.bits(),
);

/// New value for one entry field
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FieldValue {
    /// Integer value; the mask selects the status bits to change
    Int(u64, u32),
    Str(String),
}

fn narrow<T: TryFrom<u64>>(field: CeField, value: u64) -> Result<T> {
    T::try_from(value).map_err(|_| {
        CatalogError::InvalidArgument(format!("{} out of range for {:?}", value, field))
    })
}

fn time_value(field: CeField, value: u64) -> Result<i64> {
    narrow::<i64>(field, value)
}

/// Apply an integer field to `ce`
fn set_int(ce: &mut CatalogEntry, field: CeField, value: u64, mask: u32) -> Result<()> {
    match field {
        CeField::Status => {
            let value = EntryStatus::from_bits_truncate(value as u32);
            ce.status.assign(value, EntryStatus::from_bits_truncate(mask));
        }
        CeField::Slot => ce.slot = narrow(field, value)?,
        CeField::Partition => ce.part = narrow(field, value)?,
        CeField::Access => ce.access = narrow(field, value)?,
        CeField::BlockSize => ce.block_size = narrow(field, value)?,
        CeField::Capacity => ce.capacity = value,
        CeField::Space => ce.space = value,
        CeField::LabelTime => ce.label_time = time_value(field, value)?,
        CeField::ModTime => ce.mod_time = time_value(field, value)?,
        CeField::MountTime => ce.mount_time = time_value(field, value)?,
        CeField::PtocFwa | CeField::LastPos => ce.mode_word = value,
        CeField::MediaType | CeField::Vsn | CeField::VolInfo | CeField::BarCode => {
            return Err(CatalogError::InvalidArgument(format!(
                "{:?} takes a string",
                field
            )))
        }
    }
    Ok(())
}

fn set_str(ce: &mut CatalogEntry, field: CeField, value: &str) -> Result<()> {
    match field {
        CeField::MediaType => ce.mtype = value.to_string(),
        CeField::Vsn => ce.vsn = value.to_string(),
        CeField::VolInfo => ce.vol_info = value.to_string(),
        CeField::BarCode => ce.barcode = value.to_string(),
        _ => {
            return Err(CatalogError::InvalidArgument(format!(
                "{:?} takes an integer",
                field
            )))
        }
    }
    Ok(())
}

impl CatalogServer {
    /// Set one field of a volume, or of every partition of a cartridge
    ///
    /// The VSN is always set on the single entry named. Changing the media
    /// type or VSN to one already cataloged fails.
    pub(crate) fn set_field(
        &mut self,
        vid: &VolId,
        field: CeField,
        value: FieldValue,
    ) -> Result<Response> {
        match (&value, field.is_string()) {
            (FieldValue::Int(..), true) | (FieldValue::Str(_), false) => {
                return Err(CatalogError::InvalidArgument(format!(
                    "wrong value type for {:?}",
                    field
                )))
            }
            _ => {}
        }

        let loc = lookup::resolve(&self.stores, vid)?;
        let locs: Vec<EntryLoc> = if vid.is_cartridge() && field != CeField::Vsn {
            lookup::cartridge(&self.stores, loc)
        } else {
            vec![loc]
        };

        if let FieldValue::Str(s) = &value {
            if matches!(field, CeField::MediaType | CeField::Vsn) {
                for &l in &locs {
                    let ce = self.entry(l)?;
                    let (mtype, vsn) = match field {
                        CeField::MediaType => (s.as_str(), ce.vsn.as_str()),
                        _ => (ce.mtype.as_str(), s.as_str()),
                    };
                    if self.sort_and_check(mtype, vsn, Some(l), false, false)? > 0 {
                        return Err(CatalogError::DuplicateVsn {
                            mtype: mtype.to_string(),
                            vsn: vsn.to_string(),
                        });
                    }
                }
            }
        }

        for &l in &locs {
            let mut ce = self.entry(l)?;
            match &value {
                FieldValue::Int(v, mask) => set_int(&mut ce, field, *v, *mask)?,
                FieldValue::Str(s) => set_str(&mut ce, field, s)?,
            }
            self.put(l, ce.clone())?;
            if field == CeField::Status && !ce.in_use() {
                debug!("Entry {}:{} cleared by status change", ce.eq, ce.slot);
                self.release(l)?;
            }
            self.notify_remote(&ce, RemoteChange::Update);
        }

        if let FieldValue::Int(_, mask) = value {
            if field == CeField::Status
                && EntryStatus::from_bits_truncate(mask).intersects(ARCHIVER_BITS)
            {
                self.notify_archiver();
            }
        }
        Ok(Response::Ok)
    }

    pub(crate) fn reserve_volume(
        &mut self,
        vid: &VolId,
        reservation: &Reservation,
    ) -> Result<Response> {
        let loc = lookup::resolve(&self.stores, vid)?;
        let ce = self.entry(loc)?;
        if ce.reservation.is_reserved() {
            if ce.reservation.same_holder(reservation) {
                return Ok(Response::Ok);
            }
            return Err(CatalogError::AlreadyReserved {
                volume: vid.to_string(),
                asname: ce.reservation.asname,
                owner: ce.reservation.owner,
                fsname: ce.reservation.fsname,
            });
        }

        let mut held = reservation.clone();
        if held.time == 0 {
            held.time = unix_now();
        }
        info!(
            "Reserved {} for {}/{}/{}",
            vid, held.asname, held.owner, held.fsname
        );
        let ce = self.update(loc, |ce| ce.reservation = held)?;
        self.notify_remote(&ce, RemoteChange::Update);
        Ok(Response::Ok)
    }

    pub(crate) fn unreserve_volume(&mut self, vid: &VolId) -> Result<Response> {
        let loc = lookup::resolve(&self.stores, vid)?;
        let ce = self.entry(loc)?;
        if !ce.reservation.is_reserved() {
            return Err(CatalogError::NotReserved(vid.to_string()));
        }
        info!("Reservation of {} by {} released", vid, ce.reservation.asname);
        let ce = self.update(loc, |ce| ce.reservation = Reservation::default())?;
        self.notify_remote(&ce, RemoteChange::Update);
        Ok(Response::Ok)
    }

    /// Flag every volume of a library for audit
    pub(crate) fn set_audit(&mut self, eq: u16) -> Result<Response> {
        let nc = self.find(eq)?;
        let skip = EntryStatus::CLEANING | EntryStatus::NON_SAM;
        let targets: Vec<EntryLoc> = self.stores[nc]
            .views()
            .filter(|(_, v)| v.in_use() && !v.status().intersects(skip))
            .map(|(index, _)| EntryLoc { store: nc, index })
            .collect();
        for &loc in &targets {
            let ce = self.update(loc, |ce| ce.status.insert(EntryStatus::NEEDS_AUDIT))?;
            self.notify_remote(&ce, RemoteChange::Update);
        }
        info!("Audit requested for {} volumes in equipment {}", targets.len(), eq);
        Ok(Response::Ok)
    }

    /// Re-evaluate which volumes of a library are cleaning cartridges
    pub(crate) fn set_cleaning(&mut self, eq: u16) -> Result<Response> {
        let nc = self.find(eq)?;
        let targets: Vec<EntryLoc> = self.stores[nc]
            .views()
            .filter(|(_, v)| v.in_use())
            .map(|(index, _)| EntryLoc { store: nc, index })
            .collect();
        for loc in targets {
            self.update(loc, policy::check_for_cleaning)?;
        }
        Ok(Response::Ok)
    }
}
