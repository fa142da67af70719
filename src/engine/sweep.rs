//! engine::sweep
//!
//! Periodic maintenance jobs.
//!
//! The sweeper evaluates auto-transition candidates under the same guard
//! set as manual transitions, so a swept document can never reach a state
//! a user could not have driven it to. Guard refusals skip the candidate;
//! the sweep is idempotent and safe to re-run at any cadence.
//!
//! The nightly HACT job recomputes every partner's aggregate; per-partner
//! failures are logged and do not stop the sweep.

use tracing::{debug, info, warn};

use super::intervention::{transition_intervention, InterventionEvent};
use super::{hact, Context, EngineError};
use crate::core::agreement::{Agreement, AgreementStatus};
use crate::core::country::CountryProgramme;
use crate::core::intervention::{Intervention, InterventionStatus};
use crate::core::partner::Partner;
use crate::store::Store;

/// What one sweep pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub stale_flagged: usize,
    pub expired: usize,
    pub ended: usize,
    pub closed: usize,
    pub skipped: usize,
}

/// Run the auto-transition sweep over all interventions.
pub fn run_auto_transitions(store: &Store, ctx: &Context) -> Result<SweepReport, EngineError> {
    let mut report = SweepReport::default();
    let programmes: Vec<CountryProgramme> = store.list()?;

    for intervention in store.list::<Intervention>()? {
        let agreement: Option<Agreement> =
            store.get(&intervention.agreement_id.to_string())?;

        // Development documents under a dead agreement are flagged, not
        // transitioned.
        if intervention.status.is_development() && !intervention.stale {
            let agreement_dead = agreement
                .as_ref()
                .map(|a| {
                    matches!(
                        a.status,
                        AgreementStatus::Cancelled | AgreementStatus::Terminated
                    )
                })
                .unwrap_or(false);
            if agreement_dead {
                let mut flagged = intervention.clone();
                flagged.stale = true;
                let mut tx = store.begin("sweep.flag_stale");
                tx.put(&flagged)?;
                tx.commit()?;
                report.stale_flagged += 1;
                continue;
            }
        }

        let event = match intervention.status {
            InterventionStatus::Signed
                if intervention.contingency_pd
                    && all_programmes_past(&intervention, &programmes, ctx) =>
            {
                Some(InterventionEvent::Expire)
            }
            InterventionStatus::Active
                if intervention.end.map(|end| end < ctx.today).unwrap_or(false) =>
            {
                Some(InterventionEvent::End)
            }
            InterventionStatus::Ended if intervention.final_review_approved => {
                Some(InterventionEvent::Close)
            }
            _ => None,
        };

        let Some(event) = event else { continue };
        match transition_intervention(store, ctx, intervention.id, event) {
            Ok(_) => match event {
                InterventionEvent::Expire => report.expired += 1,
                InterventionEvent::End => report.ended += 1,
                InterventionEvent::Close => report.closed += 1,
                _ => {}
            },
            Err(EngineError::Validation(errors)) => {
                debug!(number = %intervention.number, %event, "sweep candidate refused: {}", errors);
                report.skipped += 1;
            }
            Err(EngineError::Conflict(reason)) => {
                debug!(number = %intervention.number, %event, %reason, "sweep candidate busy");
                report.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    info!(?report, "auto-transition sweep finished");
    Ok(report)
}

fn all_programmes_past(
    intervention: &Intervention,
    programmes: &[CountryProgramme],
    ctx: &Context,
) -> bool {
    !intervention.country_programmes.is_empty()
        && intervention.country_programmes.iter().all(|cp_id| {
            programmes
                .iter()
                .find(|cp| cp.id == *cp_id)
                .map(|cp| cp.is_past(ctx.today))
                .unwrap_or(false)
        })
}

/// Recompute every partner's assurance aggregate.
///
/// Returns the number of partners successfully recomputed; failures are
/// logged and skipped.
pub fn run_nightly_hact(store: &Store, ctx: &Context) -> Result<usize, EngineError> {
    let mut recomputed = 0;
    for partner in store.list::<Partner>()? {
        match hact::recompute_partner_hact(store, ctx, partner.id) {
            Ok(_) => recomputed += 1,
            Err(e) => warn!(partner = %partner.vendor_number, error = %e, "hact recompute failed"),
        }
    }
    info!(recomputed, "nightly assurance sweep finished");
    Ok(recomputed)
}
