//! engine::partner
//!
//! Partner operations: the vendor-sync upsert and monitoring-group
//! edits.
//!
//! Partners enter the system through the vendor master: the add
//! operation looks the vendor number up and creates or refreshes the
//! local record. Group-membership edits rewrite the partner's monitoring
//! groups and re-run the assurance aggregate.

use tracing::info;

use super::{hact, Context, EngineError, ValidationErrors};
use crate::core::partner::{Partner, PartnerType};
use crate::core::types::{MonitoringActivityId, PartnerId, VendorNumber};
use crate::store::Store;

/// Create or refresh a partner from a vendor-master record.
///
/// Matching is by vendor number. An existing partner keeps its id and
/// local state (rating, aggregates, staff); the vendor-owned fields are
/// refreshed.
pub fn upsert_partner_from_vendor(
    store: &Store,
    _ctx: &Context,
    vendor_number: VendorNumber,
    name: impl Into<String>,
    partner_type: PartnerType,
) -> Result<Partner, EngineError> {
    let name = name.into();
    let existing = store
        .list::<Partner>()?
        .into_iter()
        .find(|p| p.vendor_number == vendor_number);

    // `(name, vendor_number)` is unique; a different partner already
    // carrying the name is a data problem, not an upsert.
    let name_clash = store
        .list::<Partner>()?
        .into_iter()
        .any(|p| p.name == name && p.vendor_number != vendor_number);
    if name_clash {
        return Err(EngineError::Validation(ValidationErrors::field(
            "name",
            "another partner with this name already exists",
        )));
    }

    let partner = match existing {
        Some(mut partner) => {
            partner.name = name;
            partner.partner_type = partner_type;
            partner.deleted_flag = false;
            partner
        }
        None => Partner::new(vendor_number, name, partner_type),
    };

    if let Err(errors) = partner.validate() {
        let mut validation = ValidationErrors::new();
        for e in errors {
            validation.add_field(e.field, e.message);
        }
        return Err(EngineError::Validation(validation));
    }

    let mut tx = store.begin("partner.upsert");
    tx.put(&partner)?;
    tx.commit()?;
    info!(vendor = %partner.vendor_number, "upserted partner from vendor sync");
    Ok(partner)
}

/// Replace the partner's monitoring-group membership and recompute the
/// assurance aggregate.
pub fn set_monitoring_groups(
    store: &Store,
    ctx: &Context,
    partner_id: PartnerId,
    groups: Vec<Vec<MonitoringActivityId>>,
) -> Result<Partner, EngineError> {
    {
        let _row = store.lock_row::<Partner>(&partner_id.to_string())?;
        let mut partner: Partner = store.get_required(&partner_id.to_string())?;
        partner.set_monitoring_groups(groups);

        let mut tx = store.begin("partner.monitoring_groups");
        tx.put(&partner)?;
        tx.commit()?;
    }

    // The aggregate reads the committed membership; run it after the
    // row lock is released.
    hact::recompute_partner_hact(store, ctx, partner_id)?;
    store.get_required(&partner_id.to_string()).map_err(Into::into)
}
