//! engine::agreement
//!
//! The agreement state machine.
//!
//! # Transitions
//!
//! ```text
//! draft -> signed -> (suspended <-> signed) -> ended
//! draft -> cancelled
//! signed, suspended -> terminated
//! ```
//!
//! Suspend and terminate cascade to every PD/SPD intervention under the
//! agreement whose status permits it, inside the same transaction.
//!
//! # Invariants
//!
//! - The reference number never changes once the status leaves draft
//! - Cascaded interventions change status in the same commit as the
//!   agreement, or not at all

use tracing::{info, warn};

use super::guards;
use super::{Context, EngineError, ValidationErrors};
use crate::core::agreement::{Agreement, AgreementStatus, AgreementType};
use crate::core::country::CountryProgramme;
use crate::core::intervention::{Intervention, InterventionStatus};
use crate::core::partner::Partner;
use crate::core::refnum;
use crate::core::types::{AgreementId, FiscalYear, PartnerId};
use crate::store::Store;

/// Events accepted by the agreement FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgreementEvent {
    /// draft -> signed, or suspended -> signed.
    Activate,
    /// signed -> suspended.
    Suspend,
    /// signed -> ended.
    End,
    /// signed/suspended -> terminated.
    Terminate,
    /// draft -> cancelled.
    Cancel,
}

impl std::fmt::Display for AgreementEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgreementEvent::Activate => "activate",
            AgreementEvent::Suspend => "suspend",
            AgreementEvent::End => "end",
            AgreementEvent::Terminate => "terminate",
            AgreementEvent::Cancel => "cancel",
        };
        write!(f, "{}", s)
    }
}

/// Resolve the target status for `(current, event)`.
fn target_status(
    current: AgreementStatus,
    event: AgreementEvent,
) -> Result<AgreementStatus, EngineError> {
    use AgreementEvent::*;
    use AgreementStatus::*;
    let to = match (current, event) {
        (Draft, Activate) => Signed,
        (Suspended, Activate) => Signed,
        (Signed, Suspend) => Suspended,
        (Signed, End) => Ended,
        (Signed, Terminate) | (Suspended, Terminate) => Terminated,
        (Draft, Cancel) => Cancelled,
        _ => {
            return Err(EngineError::Validation(ValidationErrors::message(format!(
                "illegal transition: cannot {} an agreement in status {}",
                event, current
            ))))
        }
    };
    Ok(to)
}

/// Create a draft agreement with an allocated reference number.
pub fn create_agreement(
    store: &Store,
    ctx: &Context,
    partner_id: PartnerId,
    agreement_type: AgreementType,
) -> Result<Agreement, EngineError> {
    let _partner: Partner = store.get_required(&partner_id.to_string())?;

    let year = FiscalYear::of(ctx.today);
    let mut tx = store.begin("agreement.create");
    let sequence = tx.next_sequence(&format!("agreement-{}", year))?;
    let reference = refnum::agreement_reference(&ctx.tenant, agreement_type, year, sequence);

    let mut agreement = Agreement::new(partner_id, agreement_type, reference);
    auto_link_country_programme(store, &mut agreement)?;

    tx.put(&agreement)?;
    tx.commit()?;
    info!(agreement = %agreement.reference_number, "created draft agreement");
    Ok(agreement)
}

/// Persist edits to an agreement, enforcing structural invariants.
///
/// # Errors
///
/// Validation failure if the structural checks fail or the reference
/// number changed after leaving draft.
pub fn save_agreement(
    store: &Store,
    ctx: &Context,
    mut agreement: Agreement,
) -> Result<Agreement, EngineError> {
    let existing: Agreement = store.get_required(&agreement.id.to_string())?;
    if existing.status != AgreementStatus::Draft
        && existing.reference_number != agreement.reference_number
    {
        return Err(EngineError::Validation(ValidationErrors::field(
            "reference_number",
            "the reference number is immutable once the agreement leaves draft",
        )));
    }

    let mut errors = ValidationErrors::new();
    if let Err(field_errors) = agreement.validate(ctx.today) {
        for e in field_errors {
            errors.add_field(e.field, e.message);
        }
    }
    errors.into_result()?;

    auto_link_country_programme(store, &mut agreement)?;

    let mut tx = store.begin("agreement.save");
    tx.put(&agreement)?;
    tx.commit()?;
    Ok(agreement)
}

/// When both dates are set and no country programme is linked, resolve
/// the unique programme covering the agreement's range. Ambiguity and
/// absence leave the field unset.
fn auto_link_country_programme(
    store: &Store,
    agreement: &mut Agreement,
) -> Result<(), EngineError> {
    let (Some(start), Some(end)) = (agreement.start, agreement.end) else {
        return Ok(());
    };
    if agreement.country_programme.is_some() {
        return Ok(());
    }

    let programmes: Vec<CountryProgramme> = store.list()?;
    let covering: Vec<_> = programmes.iter().filter(|cp| cp.covers(start, end)).collect();
    match covering.as_slice() {
        [only] => agreement.country_programme = Some(only.id),
        [] => warn!(
            agreement = %agreement.reference_number,
            "no country programme covers the agreement dates"
        ),
        _ => warn!(
            agreement = %agreement.reference_number,
            candidates = covering.len(),
            "ambiguous country programme coverage; leaving unlinked"
        ),
    }
    Ok(())
}

/// Dispatch a state transition.
///
/// Runs the role predicate and the guard, applies the cascade where the
/// event requires one, and commits everything in one transaction.
pub fn transition_agreement(
    store: &Store,
    ctx: &Context,
    id: AgreementId,
    event: AgreementEvent,
) -> Result<Agreement, EngineError> {
    let _row = store.lock_row::<Agreement>(&id.to_string())?;
    let mut agreement: Agreement = store.get_required(&id.to_string())?;

    if !ctx.actor.is_partnership_manager() {
        return Err(EngineError::Permission(
            "only Partnership Managers can execute agreement transitions".into(),
        ));
    }

    let to = target_status(agreement.status, event)?;

    let mut errors = ValidationErrors::new();
    match event {
        AgreementEvent::Activate if agreement.status == AgreementStatus::Draft => {
            let partner: Partner = store.get_required(&agreement.partner_id.to_string())?;
            let partner_agreements: Vec<Agreement> = store
                .list::<Agreement>()?
                .into_iter()
                .filter(|a| a.partner_id == agreement.partner_id)
                .collect();
            guards::agreement_activate(
                &agreement,
                &partner,
                &partner_agreements,
                ctx.today,
                &mut errors,
            );
        }
        AgreementEvent::End => guards::agreement_end(&agreement, ctx.today, &mut errors),
        AgreementEvent::Terminate => guards::agreement_terminate(&agreement, &mut errors),
        _ => {}
    }
    errors.into_result()?;

    let mut tx = store.begin("agreement.transition");
    let from = agreement.status;
    agreement.status = to;

    let mut cascaded = 0usize;
    if matches!(to, AgreementStatus::Suspended | AgreementStatus::Terminated) {
        for mut intervention in store
            .list::<Intervention>()?
            .into_iter()
            .filter(|i| i.agreement_id == agreement.id)
        {
            if intervention.document_type.is_programme_document()
                && intervention.status.cascade_applies()
            {
                intervention.status = match to {
                    AgreementStatus::Suspended => InterventionStatus::Suspended,
                    _ => InterventionStatus::Terminated,
                };
                tx.put(&intervention)?;
                cascaded += 1;
            }
        }
    }

    tx.put(&agreement)?;
    tx.commit()?;
    info!(
        agreement = %agreement.reference_number,
        %from,
        to = %agreement.status,
        cascaded,
        "agreement transition"
    );
    Ok(agreement)
}
