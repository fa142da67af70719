//! engine::amendment
//!
//! The shadow-copy amendment engine.
//!
//! Starting an amendment deep-clones the intervention aggregate into an
//! editable shadow, recording every (original, shadow) identity pair in
//! the amendment's related-objects map. Merging partitions the shadow's
//! children into survivors (restored to their original identity), new
//! rows (fresh identity), and deletions, then renumbers codes,
//! reconciles signatures, recomputes the budget, and retires the shadow,
//! all in one transaction.
//!
//! # Invariants
//!
//! - At most one active amendment per intervention
//! - Survivors keep their original ids across the merge
//! - A failed merge leaves both documents untouched
//! - The difference view never mutates either side

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::Value;
use tracing::info;

use super::{Context, EngineError, ValidationErrors};
use crate::core::amendment::{
    AmendmentKind, DifferenceView, EntityKind, FieldChange, InterventionAmendment,
    InterventionAmendmentType, KindDiff, RelatedObjectsMap,
};
use crate::core::budget;
use crate::core::intervention::{Intervention, InterventionKind, InterventionStatus};
use crate::core::refnum;
use crate::core::results;
use crate::core::types::{
    ActivityId, ActivityItemId, AmendmentId, IndicatorId, InterventionId, LowerResultId,
    PlannedVisitId, ReportingRequirementId, ResultLinkId, ReviewId, SupplyItemId, TimeFrameId,
};
use crate::store::Store;
use crate::sync::outbox;

/// Title prefix carried by shadow documents.
const AMENDED_PREFIX: &str = "[Amended] ";

/// Statuses that accept a new amendment.
fn amendable(status: InterventionStatus) -> bool {
    matches!(
        status,
        InterventionStatus::Signed | InterventionStatus::Active | InterventionStatus::Ended
    )
}

/// Begin an amendment: clone the document into an editable shadow.
pub fn start_amendment(
    store: &Store,
    ctx: &Context,
    intervention_id: InterventionId,
    kind: AmendmentKind,
    types: Vec<InterventionAmendmentType>,
) -> Result<(InterventionAmendment, Intervention), EngineError> {
    if !ctx.actor.is_partnership_manager() {
        return Err(EngineError::Permission(
            "only Partnership Managers can start amendments".into(),
        ));
    }

    let _row = store.lock_row::<Intervention>(&intervention_id.to_string())?;
    let mut original: Intervention = store.get_required(&intervention_id.to_string())?;

    if original.in_amendment {
        return Err(EngineError::Conflict(
            "an amendment is already in progress for this document".into(),
        ));
    }
    if !amendable(original.status) {
        return Err(EngineError::Validation(ValidationErrors::message(format!(
            "documents in status {} cannot be amended",
            original.status
        ))));
    }

    let same_kind = store
        .list::<InterventionAmendment>()?
        .into_iter()
        .filter(|a| a.intervention_id == intervention_id && a.kind == kind)
        .count() as u64;
    let number = refnum::amendment_number(kind == AmendmentKind::Contingency, same_kind + 1);

    let (shadow, map) = clone_shadow(&original, &number, ctx.today);

    let mut amendment = InterventionAmendment::new(intervention_id, kind, types, number);
    amendment.amended_intervention = Some(shadow.id);
    amendment.related_objects_map = map;

    original.in_amendment = true;

    let mut tx = store.begin("amendment.start");
    tx.put(&original)?;
    tx.put(&shadow)?;
    tx.put(&amendment)?;
    tx.commit()?;
    info!(
        number = %original.number,
        amendment = %amendment.amendment_number,
        "started amendment"
    );
    Ok((amendment, shadow))
}

/// Deep-clone the aggregate, assigning fresh identity everywhere and
/// recording the correspondence. Sequence codes are preserved exactly;
/// renumbering happens at merge.
fn clone_shadow(
    original: &Intervention,
    amendment_number: &str,
    today: NaiveDate,
) -> (Intervention, RelatedObjectsMap) {
    let mut map = RelatedObjectsMap::new();
    let mut shadow = original.clone();

    shadow.id = InterventionId::new();
    map.record(EntityKind::Intervention, original.id, shadow.id);
    // The budget rides 1:1 with the document.
    map.record(EntityKind::Budget, original.id, shadow.id);

    // Time frames first: activities reference them by id.
    let mut frame_ids: BTreeMap<String, TimeFrameId> = BTreeMap::new();
    for frame in &mut shadow.quarters {
        let fresh = TimeFrameId::new();
        map.record(EntityKind::TimeFrame, frame.id, fresh);
        frame_ids.insert(frame.id.to_string(), fresh);
        frame.id = fresh;
    }

    for link in &mut shadow.result_links {
        let fresh = ResultLinkId::new();
        map.record(EntityKind::ResultLink, link.id, fresh);
        link.id = fresh;
        for lower in &mut link.lower_results {
            let fresh = LowerResultId::new();
            map.record(EntityKind::LowerResult, lower.id, fresh);
            lower.id = fresh;
            for indicator in &mut lower.indicators {
                let fresh = IndicatorId::new();
                map.record(EntityKind::Indicator, indicator.id, fresh);
                indicator.id = fresh;
            }
            for activity in &mut lower.activities {
                let fresh = ActivityId::new();
                map.record(EntityKind::Activity, activity.id, fresh);
                activity.id = fresh;
                activity.time_frames = activity
                    .time_frames
                    .iter()
                    .filter_map(|tf| frame_ids.get(&tf.to_string()).copied())
                    .collect();
                for item in &mut activity.items {
                    let fresh = ActivityItemId::new();
                    map.record(EntityKind::ActivityItem, item.id, fresh);
                    item.id = fresh;
                }
            }
        }
    }

    for item in &mut shadow.supply_items {
        let fresh = SupplyItemId::new();
        map.record(EntityKind::SupplyItem, item.id, fresh);
        item.id = fresh;
    }
    for visit in &mut shadow.planned_visits {
        let fresh = PlannedVisitId::new();
        map.record(EntityKind::PlannedVisit, visit.id, fresh);
        visit.id = fresh;
    }
    for window in &mut shadow.reporting_requirements {
        let fresh = ReportingRequirementId::new();
        map.record(EntityKind::ReportingRequirement, window.id, fresh);
        window.id = fresh;
    }
    for review in &mut shadow.reviews {
        let fresh = ReviewId::new();
        map.record(EntityKind::Review, review.id, fresh);
        review.id = fresh;
    }

    shadow.title = format!("{}{}", AMENDED_PREFIX, original.title);
    shadow.number = format!(
        "{}-{}",
        refnum::base_reference(&original.number),
        amendment_number.replace('/', "")
    );
    shadow.status = InterventionStatus::Draft;
    shadow.in_amendment = true;
    shadow.submission_date = Some(today);
    shadow.unicef_court = true;
    shadow.unicef_accepted = false;
    shadow.partner_accepted = false;

    (shadow, map)
}

/// Merge the shadow back into the original.
///
/// # Errors
///
/// Validation failure when the shadow's signatures or the amendment's
/// signed document are missing; the caller can fetch the difference view
/// to see what the shadow would change.
pub fn merge_amendment(
    store: &Store,
    ctx: &Context,
    amendment_id: AmendmentId,
) -> Result<Intervention, EngineError> {
    if !ctx.actor.is_partnership_manager() {
        return Err(EngineError::Permission(
            "only Partnership Managers can merge amendments".into(),
        ));
    }

    let mut amendment: InterventionAmendment =
        store.get_required(&amendment_id.to_string())?;
    if !amendment.is_active {
        return Err(EngineError::Conflict("the amendment is already merged".into()));
    }
    let Some(shadow_id) = amendment.amended_intervention else {
        return Err(EngineError::Integrity(
            "active amendment has no shadow document".into(),
        ));
    };

    let _original_row = store.lock_row::<Intervention>(&amendment.intervention_id.to_string())?;
    let _shadow_row = store.lock_row::<Intervention>(&shadow_id.to_string())?;

    let original: Intervention = store.get_required(&amendment.intervention_id.to_string())?;
    let shadow: Intervention = store.get_required(&shadow_id.to_string())?;

    let mut errors = ValidationErrors::new();
    if shadow.signed_by_unicef_date.is_none() || shadow.unicef_signatory.is_none() {
        errors.add_field(
            "signed_by_unicef_date",
            "the amended document must carry the UNICEF signature",
        );
    }
    if shadow.kind == InterventionKind::Programme
        && (shadow.signed_by_partner_date.is_none()
            || shadow.partner_authorized_officer_signatory.is_none())
    {
        errors.add_field(
            "signed_by_partner_date",
            "the amended document must carry the partner signature",
        );
    }
    if amendment.signed_amendment.is_none() {
        errors.add_field(
            "signed_amendment",
            "the signed amendment document must be attached",
        );
    }
    errors.into_result()?;

    let map = amendment.related_objects_map.clone();
    let diff = difference(&original, &shadow, &map);

    // Assemble the merged document from the shadow, restoring stable
    // identity for survivors.
    let mut merged = shadow.clone();
    merged.id = original.id;
    merged.number = original.number.clone();
    merged.status = original.status;
    merged.in_amendment = false;
    merged.created = original.created.clone();
    merged.stale = original.stale;
    // Copy-time defaults and the acceptance journey belong to the shadow,
    // not the merged document.
    merged.submission_date = original.submission_date;
    merged.unicef_court = original.unicef_court;
    merged.unicef_accepted = original.unicef_accepted;
    merged.partner_accepted = original.partner_accepted;
    merged.date_sent_to_partner = original.date_sent_to_partner;
    // Funds reservations track the original in the financial system and
    // are not part of the editable subtree.
    merged.frs = original.frs.clone();
    merged.title = shadow
        .title
        .strip_prefix(AMENDED_PREFIX)
        .unwrap_or(&shadow.title)
        .to_string();

    restore_identities(&mut merged, &map);
    results::renumber(&mut merged.result_links);
    for link in &mut merged.result_links {
        for lower in &mut link.lower_results {
            for activity in &mut lower.activities {
                activity.roll_up_items();
            }
        }
    }
    budget::recompute(
        &mut merged.planned_budget,
        &merged.result_links,
        &merged.supply_items,
    );

    // Resurrect a document that ended while its amendment extended it.
    if merged.status == InterventionStatus::Ended {
        if let (Some(start), Some(end)) = (merged.start, merged.end) {
            if start <= ctx.today && ctx.today <= end {
                merged.status = InterventionStatus::Active;
            }
        }
    }

    let merged_before = store
        .list::<InterventionAmendment>()?
        .into_iter()
        .filter(|a| a.intervention_id == original.id && !a.is_active)
        .count() as u64;
    merged.number = refnum::with_amendment_suffix(&merged.number, merged_before + 1);

    amendment.is_active = false;
    amendment.amended_intervention = None;
    amendment.difference = Some(diff);
    amendment.signed_date = amendment
        .signed_date
        .or(shadow.signed_by_unicef_date.max(shadow.signed_by_partner_date));

    let mut tx = store.begin("amendment.merge");
    if merged.status == InterventionStatus::Active && original.status != InterventionStatus::Active
    {
        outbox::enqueue(store, &mut tx, merged.id)?;
    }
    tx.put(&merged)?;
    tx.put(&amendment)?;
    tx.delete::<Intervention>(&shadow_id.to_string())?;
    tx.commit()?;
    info!(
        number = %merged.number,
        amendment = %amendment.amendment_number,
        "merged amendment"
    );
    Ok(merged)
}

/// Restore original ids for survivors; allocate fresh identity for rows
/// added on the shadow. Children deleted on the shadow are simply absent.
fn restore_identities(merged: &mut Intervention, map: &RelatedObjectsMap) {
    fn restore<I: std::fmt::Display>(
        map: &RelatedObjectsMap,
        kind: EntityKind,
        shadow_id: &I,
        fresh: impl FnOnce() -> String,
    ) -> String {
        map.original_of(kind, &shadow_id.to_string())
            .map(str::to_string)
            .unwrap_or_else(fresh)
    }

    let mut frame_ids: BTreeMap<String, TimeFrameId> = BTreeMap::new();
    for frame in &mut merged.quarters {
        let resolved = restore(map, EntityKind::TimeFrame, &frame.id, || {
            TimeFrameId::new().to_string()
        });
        let resolved = TimeFrameId::parse(&resolved).unwrap_or_else(|_| TimeFrameId::new());
        frame_ids.insert(frame.id.to_string(), resolved);
        frame.id = resolved;
    }

    for link in &mut merged.result_links {
        let resolved = restore(map, EntityKind::ResultLink, &link.id, || {
            ResultLinkId::new().to_string()
        });
        link.id = ResultLinkId::parse(&resolved).unwrap_or_else(|_| ResultLinkId::new());
        for lower in &mut link.lower_results {
            let resolved = restore(map, EntityKind::LowerResult, &lower.id, || {
                LowerResultId::new().to_string()
            });
            lower.id = LowerResultId::parse(&resolved).unwrap_or_else(|_| LowerResultId::new());
            for indicator in &mut lower.indicators {
                let resolved = restore(map, EntityKind::Indicator, &indicator.id, || {
                    IndicatorId::new().to_string()
                });
                indicator.id =
                    IndicatorId::parse(&resolved).unwrap_or_else(|_| IndicatorId::new());
            }
            for activity in &mut lower.activities {
                let resolved = restore(map, EntityKind::Activity, &activity.id, || {
                    ActivityId::new().to_string()
                });
                activity.id = ActivityId::parse(&resolved).unwrap_or_else(|_| ActivityId::new());
                activity.time_frames = activity
                    .time_frames
                    .iter()
                    .map(|tf| {
                        frame_ids
                            .get(&tf.to_string())
                            .copied()
                            .unwrap_or(*tf)
                    })
                    .collect();
                for item in &mut activity.items {
                    let resolved = restore(map, EntityKind::ActivityItem, &item.id, || {
                        ActivityItemId::new().to_string()
                    });
                    item.id =
                        ActivityItemId::parse(&resolved).unwrap_or_else(|_| ActivityItemId::new());
                }
            }
        }
    }

    for item in &mut merged.supply_items {
        let resolved = restore(map, EntityKind::SupplyItem, &item.id, || {
            SupplyItemId::new().to_string()
        });
        item.id = SupplyItemId::parse(&resolved).unwrap_or_else(|_| SupplyItemId::new());
    }
    for visit in &mut merged.planned_visits {
        let resolved = restore(map, EntityKind::PlannedVisit, &visit.id, || {
            PlannedVisitId::new().to_string()
        });
        visit.id = PlannedVisitId::parse(&resolved).unwrap_or_else(|_| PlannedVisitId::new());
    }
    for window in &mut merged.reporting_requirements {
        let resolved = restore(map, EntityKind::ReportingRequirement, &window.id, || {
            ReportingRequirementId::new().to_string()
        });
        window.id = ReportingRequirementId::parse(&resolved)
            .unwrap_or_else(|_| ReportingRequirementId::new());
    }
    for review in &mut merged.reviews {
        let resolved = restore(map, EntityKind::Review, &review.id, || {
            ReviewId::new().to_string()
        });
        review.id = ReviewId::parse(&resolved).unwrap_or_else(|_| ReviewId::new());
    }
}

/// The read-only difference view for an active amendment.
pub fn amendment_difference(
    store: &Store,
    amendment_id: AmendmentId,
) -> Result<DifferenceView, EngineError> {
    let amendment: InterventionAmendment = store.get_required(&amendment_id.to_string())?;
    if let Some(diff) = &amendment.difference {
        // Merged amendments keep their merge-time snapshot.
        return Ok(diff.clone());
    }
    let Some(shadow_id) = amendment.amended_intervention else {
        return Err(EngineError::Integrity(
            "active amendment has no shadow document".into(),
        ));
    };
    let original: Intervention = store.get_required(&amendment.intervention_id.to_string())?;
    let shadow: Intervention = store.get_required(&shadow_id.to_string())?;
    Ok(difference(&original, &shadow, &amendment.related_objects_map))
}

/// Fields never reported in diffs: identity, lifecycle bookkeeping, and
/// child collections handled per kind.
const INTERVENTION_SKIP: &[&str] = &[
    "id",
    "number",
    "status",
    "in_amendment",
    "created",
    "stale",
    "title",
    "submission_date",
    "unicef_court",
    "unicef_accepted",
    "partner_accepted",
    "date_sent_to_partner",
    "planned_budget",
    "result_links",
    "quarters",
    "supply_items",
    "planned_visits",
    "reporting_requirements",
    "frs",
    "reviews",
];

/// Compute the structured diff between original and shadow.
fn difference(
    original: &Intervention,
    shadow: &Intervention,
    map: &RelatedObjectsMap,
) -> DifferenceView {
    let mut view = DifferenceView::new();

    // Document-level scalar changes, titles compared without the prefix.
    let mut doc_diff = KindDiff::default();
    let before = serde_json::to_value(original).unwrap_or(Value::Null);
    let after = serde_json::to_value(shadow).unwrap_or(Value::Null);
    doc_diff.changed = diff_objects(
        &original.id.to_string(),
        &before,
        &after,
        INTERVENTION_SKIP,
    );
    let shadow_title = shadow
        .title
        .strip_prefix(AMENDED_PREFIX)
        .unwrap_or(&shadow.title);
    if shadow_title != original.title {
        doc_diff.changed.push(FieldChange {
            id: original.id.to_string(),
            field: "title".into(),
            before: Value::String(original.title.clone()),
            after: Value::String(shadow_title.to_string()),
        });
    }
    if !doc_diff.is_empty() {
        view.insert(EntityKind::Intervention, doc_diff);
    }

    let budget_changes = diff_objects(
        &original.id.to_string(),
        &serde_json::to_value(&original.planned_budget).unwrap_or(Value::Null),
        &serde_json::to_value(&shadow.planned_budget).unwrap_or(Value::Null),
        &[],
    );
    if !budget_changes.is_empty() {
        view.insert(
            EntityKind::Budget,
            KindDiff {
                changed: budget_changes,
                ..Default::default()
            },
        );
    }

    for (kind, originals, shadows, skip) in [
        (
            EntityKind::Activity,
            collect_activities(original),
            collect_activities(shadow),
            &["id", "items", "time_frames", "created"][..],
        ),
        (
            EntityKind::SupplyItem,
            collect_serialized(&original.supply_items, |s| s.id.to_string()),
            collect_serialized(&shadow.supply_items, |s| s.id.to_string()),
            &["id", "created"][..],
        ),
        (
            EntityKind::ReportingRequirement,
            collect_serialized(&original.reporting_requirements, |r| r.id.to_string()),
            collect_serialized(&shadow.reporting_requirements, |r| r.id.to_string()),
            &["id"][..],
        ),
        (
            EntityKind::PlannedVisit,
            collect_serialized(&original.planned_visits, |v| v.id.to_string()),
            collect_serialized(&shadow.planned_visits, |v| v.id.to_string()),
            &["id"][..],
        ),
    ] {
        let kind_diff = diff_kind(kind, &originals, &shadows, map, skip);
        if !kind_diff.is_empty() {
            view.insert(kind, kind_diff);
        }
    }

    view
}

fn collect_serialized<T: serde::Serialize>(
    items: &[T],
    id_of: impl Fn(&T) -> String,
) -> Vec<(String, Value)> {
    items
        .iter()
        .map(|item| {
            (
                id_of(item),
                serde_json::to_value(item).unwrap_or(Value::Null),
            )
        })
        .collect()
}

fn collect_activities(intervention: &Intervention) -> Vec<(String, Value)> {
    intervention
        .result_links
        .iter()
        .flat_map(|l| l.lower_results.iter())
        .flat_map(|lr| lr.activities.iter())
        .map(|a| {
            (
                a.id.to_string(),
                serde_json::to_value(a).unwrap_or(Value::Null),
            )
        })
        .collect()
}

/// Partition one kind into changed survivors, additions, and removals.
fn diff_kind(
    kind: EntityKind,
    originals: &[(String, Value)],
    shadows: &[(String, Value)],
    map: &RelatedObjectsMap,
    skip: &[&str],
) -> KindDiff {
    let mut diff = KindDiff::default();

    for (shadow_id, shadow_value) in shadows {
        match map.original_of(kind, shadow_id) {
            Some(original_id) => {
                if let Some((_, original_value)) =
                    originals.iter().find(|(id, _)| id == original_id)
                {
                    diff.changed
                        .extend(diff_objects(original_id, original_value, shadow_value, skip));
                }
            }
            None => diff.added.push(shadow_id.clone()),
        }
    }

    for (original_id, _) in originals {
        let survives = map
            .shadow_of(kind, original_id)
            .map(|shadow_id| shadows.iter().any(|(id, _)| id == shadow_id))
            .unwrap_or(false);
        if !survives {
            diff.removed.push(original_id.clone());
        }
    }

    diff
}

/// Field-by-field comparison of two serialized objects.
fn diff_objects(id: &str, before: &Value, after: &Value, skip: &[&str]) -> Vec<FieldChange> {
    let (Some(before_map), Some(after_map)) = (before.as_object(), after.as_object()) else {
        return Vec::new();
    };

    let mut changes = Vec::new();
    for (field, after_value) in after_map {
        if skip.contains(&field.as_str()) {
            continue;
        }
        let before_value = before_map.get(field).unwrap_or(&Value::Null);
        if before_value != after_value {
            changes.push(FieldChange {
                id: id.to_string(),
                field: field.clone(),
                before: before_value.clone(),
                after: after_value.clone(),
            });
        }
    }
    changes
}
