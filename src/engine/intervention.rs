//! engine::intervention
//!
//! The intervention state machine and its document-level operations.
//!
//! # Transitions
//!
//! ```text
//! draft -> review -> signature -> signed --+--> active --+--> ended -> closed
//!                                          |             +--> suspended -> active
//!                                          |             +--> terminated
//!                                          +--> suspended
//!                                          +--> terminated
//! draft, review, signature -> cancelled
//! signed -> expired            (sweeper only)
//! ```
//!
//! # Side effects
//!
//! - The reference number is promoted from its `TempRef` placeholder when
//!   the document first reaches signed; the sequence counts documents of
//!   that (type, year) that ever signed.
//! - Entering signed or active enqueues a downstream upload; nothing else
//!   does.
//! - The planned budget recomputes inside the same transaction as any
//!   child write.

use tracing::{debug, info};

use super::guards;
use super::{Context, EngineError, ValidationErrors};
use crate::core::agreement::{Agreement, AgreementType};
use crate::core::budget;
use crate::core::country::CountryProgramme;
use crate::core::intervention::{
    DocumentType, Intervention, InterventionStatus, PlannedVisit,
};
use crate::core::partner::Partner;
use crate::core::permissions::Role;
use crate::core::refnum;
use crate::core::reporting::{self, ReportType, ReportingRequirement};
use crate::core::types::{AgreementId, FiscalYear, InterventionId};
use crate::store::Store;
use crate::sync::outbox;

/// Events accepted by the intervention FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterventionEvent {
    SendToReview,
    SendToSignature,
    Sign,
    Activate,
    Suspend,
    Unsuspend,
    Terminate,
    End,
    Close,
    Cancel,
    /// Sweeper-only: contingency documents whose country programmes ended.
    Expire,
}

impl std::fmt::Display for InterventionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InterventionEvent::SendToReview => "send_to_review",
            InterventionEvent::SendToSignature => "send_to_signature",
            InterventionEvent::Sign => "sign",
            InterventionEvent::Activate => "activate",
            InterventionEvent::Suspend => "suspend",
            InterventionEvent::Unsuspend => "unsuspend",
            InterventionEvent::Terminate => "terminate",
            InterventionEvent::End => "end",
            InterventionEvent::Close => "close",
            InterventionEvent::Cancel => "cancel",
            InterventionEvent::Expire => "expire",
        };
        write!(f, "{}", s)
    }
}

/// Resolve the target status for `(current, event)`.
fn target_status(
    current: InterventionStatus,
    event: InterventionEvent,
) -> Result<InterventionStatus, EngineError> {
    use InterventionEvent::*;
    use InterventionStatus::*;
    let to = match (current, event) {
        (Draft, SendToReview) => Review,
        (Review, SendToSignature) => Signature,
        (Signature, Sign) => Signed,
        (Signed, Activate) => Active,
        (Signed, Suspend) | (Active, Suspend) => Suspended,
        (Suspended, Unsuspend) => Active,
        (Signed, Terminate) | (Active, Terminate) | (Suspended, Terminate) => Terminated,
        (Active, End) => Ended,
        (Ended, Close) => Closed,
        (Draft, Cancel) | (Review, Cancel) | (Signature, Cancel) => Cancelled,
        (Signed, Expire) => Expired,
        _ => {
            return Err(EngineError::Validation(ValidationErrors::message(format!(
                "illegal transition: cannot {} a document in status {}",
                event, current
            ))))
        }
    };
    Ok(to)
}

/// Role predicate per event.
fn check_permission(ctx: &Context, event: InterventionEvent) -> Result<(), EngineError> {
    let allowed = match event {
        // Focal points may submit their own drafts for review.
        InterventionEvent::SendToReview => {
            ctx.actor.is_partnership_manager() || ctx.actor.has_role(Role::UnicefFocalPoint)
        }
        _ => ctx.actor.is_partnership_manager(),
    };
    if allowed {
        Ok(())
    } else {
        Err(EngineError::Permission(format!(
            "the {} transition requires the Partnership Manager role",
            event
        )))
    }
}

/// Create a draft intervention with a placeholder reference.
pub fn create_intervention(
    store: &Store,
    ctx: &Context,
    agreement_id: AgreementId,
    document_type: DocumentType,
    title: impl Into<String>,
) -> Result<Intervention, EngineError> {
    let agreement: Agreement = store.get_required(&agreement_id.to_string())?;

    let mut errors = ValidationErrors::new();
    match document_type {
        DocumentType::Pd | DocumentType::Spd => {
            if agreement.agreement_type != AgreementType::Pca {
                errors.add_field(
                    "document_type",
                    "PD and SPD documents can only execute under a PCA agreement",
                );
            }
        }
        DocumentType::Ssfa => {
            if agreement.agreement_type != AgreementType::Ssfa {
                errors.add_field(
                    "document_type",
                    "SSFA documents can only execute under an SSFA agreement",
                );
            }
            let sibling_count = store
                .list::<Intervention>()?
                .iter()
                .filter(|i| i.agreement_id == agreement_id)
                .count();
            if sibling_count > 0 {
                errors.add("an SSFA agreement can hold only one document");
            }
        }
    }
    errors.into_result()?;

    let mut tx = store.begin("intervention.create");
    let temp_id = tx.next_sequence("tempref")?;
    let number = refnum::temp_reference(agreement.base_reference(), temp_id);
    let intervention = Intervention::new(
        agreement_id,
        document_type,
        title,
        number,
        ctx.currency.clone(),
    );
    tx.put(&intervention)?;
    tx.commit()?;
    info!(number = %intervention.number, "created draft intervention");
    Ok(intervention)
}

/// Refresh every derived piece of the aggregate: item roll-ups, quarter
/// frames, and the planned budget.
pub(crate) fn refresh_derived(intervention: &mut Intervention) {
    for link in &mut intervention.result_links {
        for lower in &mut link.lower_results {
            for activity in &mut lower.activities {
                activity.roll_up_items();
            }
        }
    }
    intervention.regenerate_quarters();
    budget::recompute(
        &mut intervention.planned_budget,
        &intervention.result_links,
        &intervention.supply_items,
    );
}

/// Persist edits to an intervention.
///
/// Recomputes the budget in the same transaction, enforces reference
/// immutability after draft, and validates signature consistency.
pub fn save_intervention(
    store: &Store,
    ctx: &Context,
    mut intervention: Intervention,
) -> Result<Intervention, EngineError> {
    let existing: Intervention = store.get_required(&intervention.id.to_string())?;

    let mut errors = ValidationErrors::new();
    let number_mutable = matches!(
        existing.status,
        InterventionStatus::Draft | InterventionStatus::Cancelled
    );
    if !number_mutable && existing.number != intervention.number {
        errors.add_field(
            "number",
            "the reference number is immutable once the document leaves draft",
        );
    }
    if !intervention.signatures_consistent(ctx.today) {
        errors.add(
            "signature dates require their signatories and cannot be in the future",
        );
    }
    if let (Some(start), Some(end)) = (intervention.start, intervention.end) {
        if end < start {
            errors.add_field("end", "the end date cannot precede the start date");
        }
    }
    errors.into_result()?;

    refresh_derived(&mut intervention);

    let mut tx = store.begin("intervention.save");
    tx.put(&intervention)?;
    tx.commit()?;
    Ok(intervention)
}

/// Dispatch a state transition.
pub fn transition_intervention(
    store: &Store,
    ctx: &Context,
    id: InterventionId,
    event: InterventionEvent,
) -> Result<Intervention, EngineError> {
    let _row = store.lock_row::<Intervention>(&id.to_string())?;
    let mut intervention: Intervention = store.get_required(&id.to_string())?;

    check_permission(ctx, event)?;
    let to = target_status(intervention.status, event)?;
    let agreement: Agreement = store.get_required(&intervention.agreement_id.to_string())?;

    let mut errors = ValidationErrors::new();
    match event {
        InterventionEvent::SendToReview => {
            guards::document_type_compatible(&intervention, &agreement, &mut errors);
            guards::intervention_to_review(&intervention, &mut errors);
        }
        InterventionEvent::SendToSignature => {
            guards::intervention_to_signature(&intervention, &mut errors)
        }
        InterventionEvent::Sign => {
            guards::intervention_to_signed(&intervention, &agreement, ctx.today, &mut errors)
        }
        InterventionEvent::Activate | InterventionEvent::Unsuspend => {
            guards::intervention_to_active(&intervention, &agreement, ctx.today, &mut errors)
        }
        InterventionEvent::End => {
            guards::intervention_to_ended(&intervention, ctx.today, &mut errors)
        }
        InterventionEvent::Close => guards::intervention_to_closed(&intervention, &mut errors),
        InterventionEvent::Cancel => {
            guards::intervention_to_cancelled(&intervention, &mut errors)
        }
        InterventionEvent::Terminate => {
            guards::intervention_to_terminated(&intervention, &mut errors)
        }
        InterventionEvent::Expire => {
            let programmes: Vec<CountryProgramme> = store.list()?;
            guards::intervention_to_expired(&intervention, &programmes, ctx.today, &mut errors);
        }
        InterventionEvent::Suspend => {}
    }
    if !errors.is_empty() {
        debug!(number = %intervention.number, %event, "transition refused: {}", errors);
    }
    errors.into_result()?;

    let mut tx = store.begin("intervention.transition");
    let from = intervention.status;

    // Promote the placeholder reference when first reaching signed.
    if to == InterventionStatus::Signed && refnum::is_temp(&intervention.number) {
        let year = FiscalYear::of(ctx.today);
        let sequence = tx.next_sequence(&format!(
            "intervention-{}-{}",
            intervention.document_type.code().to_lowercase(),
            year
        ))?;
        intervention.number = refnum::intervention_reference(
            agreement.base_reference(),
            intervention.document_type,
            year,
            sequence,
        );
    }

    intervention.status = to;

    // Entering signed or active triggers the downstream upload.
    if matches!(to, InterventionStatus::Signed | InterventionStatus::Active) {
        outbox::enqueue(store, &mut tx, intervention.id)?;
    }

    tx.put(&intervention)?;
    tx.commit()?;
    info!(number = %intervention.number, %from, to = %intervention.status, "intervention transition");
    Ok(intervention)
}

/// UNICEF sends the document to the partner: the pen changes side.
pub fn send_to_partner(
    store: &Store,
    ctx: &Context,
    id: InterventionId,
) -> Result<Intervention, EngineError> {
    if !ctx.actor.roles.iter().any(Role::is_unicef) {
        return Err(EngineError::Permission(
            "only UNICEF users can send the document to the partner".into(),
        ));
    }
    let _row = store.lock_row::<Intervention>(&id.to_string())?;
    let mut intervention: Intervention = store.get_required(&id.to_string())?;

    intervention.unicef_court = false;
    intervention.unicef_accepted = true;
    intervention.partner_accepted = false;
    if intervention.date_sent_to_partner.is_none() {
        intervention.date_sent_to_partner = Some(ctx.today);
    }

    let mut tx = store.begin("intervention.send_to_partner");
    tx.put(&intervention)?;
    tx.commit()?;
    Ok(intervention)
}

/// The partner sends the document back to UNICEF.
pub fn send_to_unicef(
    store: &Store,
    ctx: &Context,
    id: InterventionId,
) -> Result<Intervention, EngineError> {
    if !ctx.actor.roles.iter().any(Role::is_partner) {
        return Err(EngineError::Permission(
            "only partner users can send the document back".into(),
        ));
    }
    let _row = store.lock_row::<Intervention>(&id.to_string())?;
    let mut intervention: Intervention = store.get_required(&id.to_string())?;

    intervention.unicef_court = true;
    intervention.partner_accepted = true;
    intervention.unicef_accepted = false;

    let mut tx = store.begin("intervention.send_to_unicef");
    tx.put(&intervention)?;
    tx.commit()?;
    Ok(intervention)
}

/// Replace the reporting windows of one type atomically.
///
/// # Errors
///
/// Validation failure on malformed/overlapping windows or when the
/// document's status forbids planner writes.
pub fn replace_reporting_requirements(
    store: &Store,
    ctx: &Context,
    id: InterventionId,
    report_type: ReportType,
    windows: Vec<ReportingRequirement>,
) -> Result<Intervention, EngineError> {
    let _row = store.lock_row::<Intervention>(&id.to_string())?;
    let mut intervention: Intervention = store.get_required(&id.to_string())?;

    let mut errors = ValidationErrors::new();
    if let Err(messages) = reporting::validate_windows(report_type, &windows) {
        for message in messages {
            errors.add(message);
        }
    }

    let has_existing_of_type = !intervention.reporting_windows(report_type).is_empty();
    let first_contingency_write = intervention.status == InterventionStatus::Signed
        && intervention.contingency_pd
        && !has_existing_of_type;
    let mutable = intervention.status == InterventionStatus::Draft
        || intervention.in_amendment
        || first_contingency_write;
    if !mutable {
        errors.add(
            "reporting requirements can only change in draft or through an amendment",
        );
    }
    if intervention.status == InterventionStatus::Terminated
        && intervention.end.map(|end| end < ctx.today).unwrap_or(false)
    {
        errors.add("a terminated document past its end date cannot change");
    }
    if report_type == ReportType::Hr && !intervention.has_high_frequency_indicator() {
        errors.add("humanitarian windows require a high-frequency indicator on the document");
    }
    errors.into_result()?;

    intervention
        .reporting_requirements
        .retain(|r| r.report_type != report_type);
    intervention.reporting_requirements.extend(windows);

    let mut tx = store.begin("intervention.reporting_requirements");
    tx.put(&intervention)?;
    tx.commit()?;
    Ok(intervention)
}

/// Replace the planned visits.
///
/// Planned visits only exist for Government partners; years must be
/// unique.
pub fn set_planned_visits(
    store: &Store,
    _ctx: &Context,
    id: InterventionId,
    visits: Vec<PlannedVisit>,
) -> Result<Intervention, EngineError> {
    let _row = store.lock_row::<Intervention>(&id.to_string())?;
    let mut intervention: Intervention = store.get_required(&id.to_string())?;
    let agreement: Agreement = store.get_required(&intervention.agreement_id.to_string())?;
    let partner: Partner = store.get_required(&agreement.partner_id.to_string())?;

    let mut errors = ValidationErrors::new();
    if !partner.partner_type.supports_planned_visits() {
        errors.add_field(
            "planned_visits",
            "planned visits can only be set for Government partners",
        );
    }
    let mut years: Vec<FiscalYear> = visits.iter().map(|v| v.year).collect();
    years.sort();
    years.dedup();
    if years.len() != visits.len() {
        errors.add_field("planned_visits", "one planned-visit row per year");
    }
    errors.into_result()?;

    intervention.planned_visits = visits;
    let mut tx = store.begin("intervention.planned_visits");
    tx.put(&intervention)?;
    tx.commit()?;
    Ok(intervention)
}
