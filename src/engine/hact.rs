//! engine::hact
//!
//! Per-partner assurance aggregate recompute.
//!
//! The aggregator reads live inputs (completed monitoring activities,
//! assessments, the partner's cash totals) and rewrites the partner's
//! `hact_values` and micro-assessment answer in one transaction under the
//! partner row lock. It is idempotent: the same inputs always produce the
//! same aggregate, so re-running after any trigger is safe.
//!
//! # Triggers
//!
//! Assessment save, funds-reservation save, monitoring-activity
//! completion, group membership edits, and the nightly sweep all call
//! [`recompute_partner_hact`]. It never raises into the request path;
//! callers log failures and move on.

use std::collections::HashSet;

use chrono::Datelike;
use tracing::info;

use super::{Context, EngineError};
use crate::core::hact::{
    min_audits, min_programmatic_visits, min_spot_checks, HactValues, QuarterlyCounts,
    VisitCounters, ASSESSMENT_EXPIRY_DAYS,
};
use crate::core::partner::{
    Assessment, AssessmentType, MonitoringActivity, Partner,
};
use crate::core::types::{Money, PartnerId, Quarter};
use crate::store::Store;

/// Recompute and persist the assurance aggregate for one partner.
pub fn recompute_partner_hact(
    store: &Store,
    ctx: &Context,
    partner_id: PartnerId,
) -> Result<HactValues, EngineError> {
    let _row = store.lock_row::<Partner>(&partner_id.to_string())?;
    let mut partner: Partner = store.get_required(&partner_id.to_string())?;

    let activities: Vec<MonitoringActivity> = store.list()?;
    let assessments: Vec<Assessment> = store
        .list::<Assessment>()?
        .into_iter()
        .filter(|a| a.partner_id == partner_id)
        .collect();

    let values = compute(&partner, &activities, &assessments, ctx);
    let basis = micro_assessment_basis(&partner, &assessments, ctx);

    partner.hact_values = values.clone();
    partner.basis_for_risk_rating = basis;

    let mut tx = store.begin("partner.hact_recompute");
    tx.put(&partner)?;
    tx.commit()?;
    info!(partner = %partner.vendor_number, "recomputed assurance aggregate");
    Ok(values)
}

/// Pure aggregate computation over the partner's inputs.
fn compute(
    partner: &Partner,
    activities: &[MonitoringActivity],
    assessments: &[Assessment],
    ctx: &Context,
) -> HactValues {
    let current_year = ctx.today.year();

    let mut values = HactValues {
        programmatic_visits: VisitCounters {
            completed: count_programmatic_visits(partner, activities, current_year),
            minimum_requirements: min_programmatic_visits(partner.total_ct_cy, partner.rating),
        },
        spot_checks: VisitCounters {
            completed: count_spot_checks(assessments, current_year),
            minimum_requirements: min_spot_checks(partner.total_ct_cy, partner.rating),
        },
        ..Default::default()
    };

    let audits_completed = assessments
        .iter()
        .filter(|a| {
            a.assessment_type == AssessmentType::ScheduledAuditReport
                && a.completed_date.map(|d| d.year()) == Some(current_year)
        })
        .count() as u32;
    values.audits.completed = audits_completed;
    values.audits.minimum_requirements = min_audits(partner.total_ct_cp);

    // A completed scheduled audit stands in for one spot check.
    if audits_completed > 0 {
        values.spot_checks.minimum_requirements =
            values.spot_checks.minimum_requirements.saturating_sub(1);
    }

    values.outstanding_findings = assessments
        .iter()
        .map(|a| a.pending_findings)
        .sum();

    values.derive_coverage();
    values
}

/// Count completed programmatic visits, collapsing explicit groups.
///
/// A grouped set of countable activities contributes one visit in the
/// earliest member quarter; ungrouped countable activities contribute one
/// visit each. Activities that do not count for this partner are ignored
/// even when listed in a group.
fn count_programmatic_visits(
    partner: &Partner,
    activities: &[MonitoringActivity],
    current_year: i32,
) -> QuarterlyCounts {
    let mut counts = QuarterlyCounts::default();

    let countable = |activity: &MonitoringActivity| {
        activity.counts_for(partner.id)
            && activity.end_date.map(|d| d.year()) == Some(current_year)
    };

    let mut grouped: HashSet<_> = HashSet::new();
    for group in &partner.monitoring_groups {
        let mut quarters: Vec<Quarter> = Vec::new();
        for member_id in &group.members {
            let Some(activity) = activities.iter().find(|a| a.id == *member_id) else {
                continue;
            };
            if let (true, Some(end)) = (countable(activity), activity.end_date) {
                grouped.insert(activity.id);
                quarters.push(Quarter::of(end));
            }
        }
        if let Some(earliest) = quarters.into_iter().min() {
            counts.record(earliest);
        }
    }

    for activity in activities {
        if let (true, Some(end)) = (countable(activity), activity.end_date) {
            if !grouped.contains(&activity.id) {
                counts.record(Quarter::of(end));
            }
        }
    }

    counts
}

/// Count completed spot checks by quarter.
fn count_spot_checks(assessments: &[Assessment], current_year: i32) -> QuarterlyCounts {
    let mut counts = QuarterlyCounts::default();
    for assessment in assessments {
        if assessment.assessment_type != AssessmentType::SpotCheck {
            continue;
        }
        let Some(date) = assessment.completed_date else {
            continue;
        };
        if date.year() == current_year {
            counts.record(Quarter::of(date));
        }
    }
    counts
}

/// The micro-assessment answer written to the partner.
///
/// "Yes" when a fresh assessment is needed, "Missing" when none was ever
/// done, "No" otherwise.
fn micro_assessment_basis(
    partner: &Partner,
    assessments: &[Assessment],
    ctx: &Context,
) -> String {
    let threshold = Money::from_major(100_000);

    if partner.type_of_assessment == Some(AssessmentType::HighRiskAssumed) {
        return "Yes".to_string();
    }
    if partner.planned_cash_cy > threshold
        && partner.type_of_assessment == Some(AssessmentType::SimplifiedChecklist)
    {
        return "Yes".to_string();
    }

    let last_micro = assessments
        .iter()
        .filter(|a| a.assessment_type == AssessmentType::MicroAssessment)
        .filter_map(|a| a.completed_date)
        .max();

    if partner.rating.is_assessed()
        && matches!(
            partner.type_of_assessment,
            Some(AssessmentType::MicroAssessment) | Some(AssessmentType::NegativeAuditResults)
        )
    {
        let expired = last_micro
            .map(|d| (ctx.today - d).num_days() > ASSESSMENT_EXPIRY_DAYS)
            .unwrap_or(true);
        if expired {
            return "Yes".to_string();
        }
    }

    if last_micro.is_none() {
        return "Missing".to_string();
    }

    "No".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::partner::{
        CsoType, MonitoringActivityGroup, MonitoringStatus, PartnerType, RiskRating,
    };
    use crate::core::permissions::Role;
    use crate::core::types::{TenantCode, VendorNumber};
    use crate::engine::Actor;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ctx() -> Context {
        Context::new(
            Actor::new("pm@example.org", vec![Role::PartnershipManager]),
            TenantCode::new("LEB").unwrap(),
            "USD",
        )
        .with_today(date(2024, 6, 1))
    }

    fn seeded_partner(store: &Store) -> Partner {
        let mut partner = Partner::new(
            VendorNumber::new("123456").unwrap(),
            "Relief Works",
            PartnerType::CivilSocietyOrganization,
        );
        partner.cso_type = Some(CsoType::National);
        partner.rating = RiskRating::Moderate;
        partner.total_ct_cy = Money::from_major(120_000);
        partner.total_ct_cp = Money::from_major(600_000);
        let mut tx = store.begin("seed");
        tx.put(&partner).unwrap();
        tx.commit().unwrap();
        partner
    }

    fn completed_activity(store: &Store, partner: &Partner, end: NaiveDate) -> MonitoringActivity {
        let mut activity = MonitoringActivity::new(partner.id);
        activity.status = MonitoringStatus::Completed;
        activity.end_date = Some(end);
        activity.hact_for.push(partner.id);
        let mut tx = store.begin("seed");
        tx.put(&activity).unwrap();
        tx.commit().unwrap();
        activity
    }

    #[test]
    fn counts_ungrouped_visits_per_activity() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let partner = seeded_partner(&store);
        completed_activity(&store, &partner, date(2024, 5, 1));
        completed_activity(&store, &partner, date(2024, 5, 15));
        completed_activity(&store, &partner, date(2024, 6, 1));

        let values = recompute_partner_hact(&store, &ctx(), partner.id).unwrap();
        assert_eq!(values.programmatic_visits.completed.q2, 3);
        assert_eq!(values.programmatic_visits.completed.total, 3);
    }

    #[test]
    fn group_collapses_to_one_visit_in_earliest_quarter() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let mut partner = seeded_partner(&store);
        let m1 = completed_activity(&store, &partner, date(2024, 2, 1));
        let m2 = completed_activity(&store, &partner, date(2024, 5, 1));
        // A third activity stays outside the group.
        completed_activity(&store, &partner, date(2024, 5, 20));

        partner
            .monitoring_groups
            .push(MonitoringActivityGroup::new(vec![m1.id, m2.id]));
        let mut tx = store.begin("seed");
        tx.put(&partner).unwrap();
        tx.commit().unwrap();

        let values = recompute_partner_hact(&store, &ctx(), partner.id).unwrap();
        // Group counts once in Q1 (earliest member), m3 separately in Q2.
        assert_eq!(values.programmatic_visits.completed.q1, 1);
        assert_eq!(values.programmatic_visits.completed.q2, 1);
        assert_eq!(values.programmatic_visits.completed.total, 2);
    }

    #[test]
    fn non_hact_activities_excluded_even_in_groups() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let mut partner = seeded_partner(&store);

        let mut plain = MonitoringActivity::new(partner.id);
        plain.status = MonitoringStatus::Completed;
        plain.end_date = Some(date(2024, 5, 1));
        // No hact_for entry.
        let mut tx = store.begin("seed");
        tx.put(&plain).unwrap();
        tx.commit().unwrap();

        partner
            .monitoring_groups
            .push(MonitoringActivityGroup::new(vec![plain.id]));
        let mut tx = store.begin("seed");
        tx.put(&partner).unwrap();
        tx.commit().unwrap();

        let values = recompute_partner_hact(&store, &ctx(), partner.id).unwrap();
        assert_eq!(values.programmatic_visits.completed.total, 0);
    }

    #[test]
    fn prior_year_activities_excluded() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let partner = seeded_partner(&store);
        completed_activity(&store, &partner, date(2023, 5, 1));

        let values = recompute_partner_hact(&store, &ctx(), partner.id).unwrap();
        assert_eq!(values.programmatic_visits.completed.total, 0);
    }

    #[test]
    fn minimums_follow_the_table() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let partner = seeded_partner(&store);
        let values = recompute_partner_hact(&store, &ctx(), partner.id).unwrap();
        // 120k at moderate rating: 1 visit, 1 spot check; 600k CP cash: 1 audit.
        assert_eq!(values.programmatic_visits.minimum_requirements, 1);
        assert_eq!(values.spot_checks.minimum_requirements, 1);
        assert_eq!(values.audits.minimum_requirements, 1);
    }

    #[test]
    fn audit_counts_and_substitutes_a_spot_check() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let partner = seeded_partner(&store);
        let mut audit = Assessment::new(partner.id, AssessmentType::ScheduledAuditReport);
        audit.completed_date = Some(date(2024, 3, 1));
        let mut tx = store.begin("seed");
        tx.put(&audit).unwrap();
        tx.commit().unwrap();

        let values = recompute_partner_hact(&store, &ctx(), partner.id).unwrap();
        assert_eq!(values.audits.completed, 1);
        assert_eq!(values.spot_checks.minimum_requirements, 0);
    }

    #[test]
    fn spot_checks_bucket_by_quarter() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let partner = seeded_partner(&store);
        let mut check = Assessment::new(partner.id, AssessmentType::SpotCheck);
        check.completed_date = Some(date(2024, 8, 1));
        let mut tx = store.begin("seed");
        tx.put(&check).unwrap();
        tx.commit().unwrap();

        let values = recompute_partner_hact(&store, &ctx(), partner.id).unwrap();
        assert_eq!(values.spot_checks.completed.q3, 1);
    }

    #[test]
    fn recompute_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let partner = seeded_partner(&store);
        completed_activity(&store, &partner, date(2024, 5, 1));

        let first = recompute_partner_hact(&store, &ctx(), partner.id).unwrap();
        let second = recompute_partner_hact(&store, &ctx(), partner.id).unwrap();
        assert_eq!(first, second);
    }

    mod micro_assessment {
        use super::*;

        fn basis_of(store: &Store, partner: &Partner) -> String {
            recompute_partner_hact(store, &ctx(), partner.id).unwrap();
            let reloaded: Partner = store.get_required(&partner.id.to_string()).unwrap();
            reloaded.basis_for_risk_rating
        }

        #[test]
        fn high_risk_assumed_is_yes() {
            let dir = TempDir::new().unwrap();
            let store = Store::open(dir.path()).unwrap();
            let mut partner = seeded_partner(&store);
            partner.type_of_assessment = Some(AssessmentType::HighRiskAssumed);
            let mut tx = store.begin("seed");
            tx.put(&partner).unwrap();
            tx.commit().unwrap();
            assert_eq!(basis_of(&store, &partner), "Yes");
        }

        #[test]
        fn large_planned_cash_on_checklist_is_yes() {
            let dir = TempDir::new().unwrap();
            let store = Store::open(dir.path()).unwrap();
            let mut partner = seeded_partner(&store);
            partner.type_of_assessment = Some(AssessmentType::SimplifiedChecklist);
            partner.planned_cash_cy = Money::from_major(150_000);
            let mut tx = store.begin("seed");
            tx.put(&partner).unwrap();
            tx.commit().unwrap();
            assert_eq!(basis_of(&store, &partner), "Yes");
        }

        #[test]
        fn stale_micro_assessment_is_yes() {
            let dir = TempDir::new().unwrap();
            let store = Store::open(dir.path()).unwrap();
            let mut partner = seeded_partner(&store);
            partner.type_of_assessment = Some(AssessmentType::MicroAssessment);
            let mut tx = store.begin("seed");
            tx.put(&partner).unwrap();
            tx.commit().unwrap();

            let mut old = Assessment::new(partner.id, AssessmentType::MicroAssessment);
            old.completed_date = Some(date(2019, 1, 1));
            let mut tx = store.begin("seed");
            tx.put(&old).unwrap();
            tx.commit().unwrap();

            assert_eq!(basis_of(&store, &partner), "Yes");
        }

        #[test]
        fn fresh_micro_assessment_is_no() {
            let dir = TempDir::new().unwrap();
            let store = Store::open(dir.path()).unwrap();
            let mut partner = seeded_partner(&store);
            partner.type_of_assessment = Some(AssessmentType::MicroAssessment);
            let mut tx = store.begin("seed");
            tx.put(&partner).unwrap();
            tx.commit().unwrap();

            let mut fresh = Assessment::new(partner.id, AssessmentType::MicroAssessment);
            fresh.completed_date = Some(date(2023, 1, 1));
            let mut tx = store.begin("seed");
            tx.put(&fresh).unwrap();
            tx.commit().unwrap();

            assert_eq!(basis_of(&store, &partner), "No");
        }

        #[test]
        fn no_micro_assessment_is_missing() {
            let dir = TempDir::new().unwrap();
            let store = Store::open(dir.path()).unwrap();
            let partner = seeded_partner(&store);
            assert_eq!(basis_of(&store, &partner), "Missing");
        }
    }
}
