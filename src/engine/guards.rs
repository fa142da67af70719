//! engine::guards
//!
//! Guard predicates for both state machines.
//!
//! Guards are pure: they read entities and the operation date and
//! accumulate per-field failures into a [`ValidationErrors`]. The FSM
//! dispatchers evaluate them inside the transaction, so a refused guard
//! aborts with nothing persisted. Every refusal lists all failed guards,
//! not just the first.

use chrono::NaiveDate;

use super::ValidationErrors;
use crate::core::agreement::{Agreement, AgreementStatus, AgreementType};
use crate::core::attachment::codes;
use crate::core::country::CountryProgramme;
use crate::core::intervention::{
    DocumentType, Intervention, InterventionKind, ReviewType,
};
use crate::core::partner::{Partner, PartnerType};
use crate::core::types::Money;

/// Final-partnership-review threshold: actual transfers at or above this
/// require the review attachment to close.
const FINAL_REVIEW_THRESHOLD: Money = Money::from_minor(100_000 * 100);

// ---------------------------------------------------------------------------
// Agreement guards
// ---------------------------------------------------------------------------

/// Guard for draft -> signed.
pub fn agreement_activate(
    agreement: &Agreement,
    partner: &Partner,
    partner_agreements: &[Agreement],
    today: NaiveDate,
    errors: &mut ValidationErrors,
) {
    if let Err(field_errors) = agreement.validate(today) {
        for e in field_errors {
            errors.add_field(e.field, e.message);
        }
    }

    if agreement.agreement_type == AgreementType::Pca {
        if partner.partner_type != PartnerType::CivilSocietyOrganization {
            errors.add_field("partner", "PCA agreements require a CSO partner");
        }
        if agreement.country_programme.is_none() {
            errors.add_field("country_programme", "PCA agreements require a country programme");
        }
        one_active_pca(agreement, partner_agreements, errors);
    }

    if agreement.agreement_type != AgreementType::Ssfa {
        if agreement.signed_by_unicef_date.is_none() {
            errors.add_field("signed_by_unicef_date", "UNICEF signature date is required");
        }
        if agreement.signed_by_partner_date.is_none() {
            errors.add_field("signed_by_partner_date", "partner signature date is required");
        }
    }

    if agreement.authorized_officers.is_empty() {
        errors.add_field(
            "authorized_officers",
            "at least one authorized officer is required",
        );
    }

    if agreement.attached_agreement.is_none() {
        errors.add_field("attached_agreement", "the signed agreement must be attached");
    }

    if !agreement.amendments_complete(today) {
        errors.add_field(
            "amendments",
            "every amendment needs its signed document and a non-future date",
        );
    }
}

/// At most one active PCA per partner per country programme.
fn one_active_pca(
    agreement: &Agreement,
    partner_agreements: &[Agreement],
    errors: &mut ValidationErrors,
) {
    let clash = partner_agreements.iter().any(|other| {
        other.id != agreement.id
            && other.agreement_type == AgreementType::Pca
            && other.status == AgreementStatus::Signed
            && other.country_programme == agreement.country_programme
    });
    if clash {
        errors.add(
            "a signed PCA already exists for this partner and country programme",
        );
    }
}

/// Guard for signed -> ended.
pub fn agreement_end(agreement: &Agreement, today: NaiveDate, errors: &mut ValidationErrors) {
    match agreement.end {
        Some(end) if end < today => {}
        _ => errors.add_field("end", "the agreement end date must be in the past"),
    }
}

/// Guard for signed/suspended -> terminated.
pub fn agreement_terminate(agreement: &Agreement, errors: &mut ValidationErrors) {
    let doc_present = agreement
        .termination_doc
        .as_ref()
        .map(|a| a.has_code(codes::AGREEMENT_TERMINATION))
        .unwrap_or(false);
    if !doc_present {
        errors.add_field(
            "termination_doc",
            "a signed termination notice must be attached",
        );
    }
}

// ---------------------------------------------------------------------------
// Intervention guards
// ---------------------------------------------------------------------------

/// Document type must match the agreement type.
pub fn document_type_compatible(
    intervention: &Intervention,
    agreement: &Agreement,
    errors: &mut ValidationErrors,
) {
    match intervention.document_type {
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
        }
    }
}

/// Guard for draft -> review: all required planning data in place.
pub fn intervention_to_review(intervention: &Intervention, errors: &mut ValidationErrors) {
    if intervention.title.trim().is_empty() {
        errors.add_field("title", "a title is required");
    }
    if intervention.start.is_none() {
        errors.add_field("start", "a start date is required");
    }
    if intervention.end.is_none() {
        errors.add_field("end", "an end date is required");
    }
    if let (Some(start), Some(end)) = (intervention.start, intervention.end) {
        if end < start {
            errors.add_field("end", "the end date cannot precede the start date");
        }
    }
    if intervention.sections.is_empty() {
        errors.add_field("sections", "at least one section is required");
    }
    if intervention.offices.is_empty() {
        errors.add_field("offices", "at least one office is required");
    }

    match intervention.kind {
        InterventionKind::Programme => {
            let has_planned_output = intervention
                .result_links
                .iter()
                .any(|l| l.cp_output.is_some() && !l.lower_results.is_empty());
            if !has_planned_output {
                errors.add_field(
                    "result_links",
                    "at least one cp-output result link with a programme output is required",
                );
            }
        }
        InterventionKind::Government => {
            if intervention.workplans.is_empty() {
                errors.add_field("workplans", "at least one workplan is required");
            }
        }
    }
}

/// Guard for review -> signature: the review concluded favourably.
pub fn intervention_to_signature(intervention: &Intervention, errors: &mut ValidationErrors) {
    match intervention.final_review() {
        Some(review) if review.review_type == ReviewType::NoReview => {
            if !intervention.in_amendment {
                errors.add(
                    "skipping review is only allowed for amendment documents",
                );
            }
        }
        Some(review) => {
            if review.overall_approval != Some(true) {
                errors.add("the review must be concluded and recommended for approval");
            }
        }
        None => errors.add("a concluded review is required before signature"),
    }
}

/// Guard for signature -> signed.
pub fn intervention_to_signed(
    intervention: &Intervention,
    agreement: &Agreement,
    today: NaiveDate,
    errors: &mut ValidationErrors,
) {
    if intervention.signed_by_unicef_date.is_none() || intervention.unicef_signatory.is_none() {
        errors.add_field(
            "signed_by_unicef_date",
            "the UNICEF signature date and signatory are required",
        );
    }
    if intervention.kind == InterventionKind::Programme
        && (intervention.signed_by_partner_date.is_none()
            || intervention.partner_authorized_officer_signatory.is_none())
    {
        errors.add_field(
            "signed_by_partner_date",
            "the partner signature date and authorized officer are required",
        );
    }
    if !intervention.signatures_consistent(today) {
        errors.add("signature dates cannot be in the future");
    }
    if intervention.signed_pd_attachment().is_none() {
        errors.add_field("signed_pd_attachment", "the signed document must be attached");
    }
    if intervention.document_type.is_programme_document() && agreement.status.is_blocking() {
        errors.add(
            "the related agreement is suspended or terminated; the document cannot move until it is signed again",
        );
    }
}

/// Guard for signed -> active.
pub fn intervention_to_active(
    intervention: &Intervention,
    agreement: &Agreement,
    today: NaiveDate,
    errors: &mut ValidationErrors,
) {
    match intervention.start {
        Some(start) if start <= today => {}
        _ => errors.add_field("start", "the start date must be today or earlier"),
    }
    if intervention.frs.is_empty() {
        errors.add_field("frs", "at least one funds reservation must be linked");
    }
    if intervention.document_type.is_programme_document()
        && agreement.status != AgreementStatus::Signed
    {
        errors.add("the related agreement must be signed for the document to activate");
    }
}

/// Guard for active -> ended.
pub fn intervention_to_ended(
    intervention: &Intervention,
    today: NaiveDate,
    errors: &mut ValidationErrors,
) {
    match intervention.end {
        Some(end) if end < today => {}
        _ => errors.add_field("end", "the end date must be in the past"),
    }
    if !funds_settled(intervention) {
        errors.add("outstanding direct cash transfers must be zero or covered by a reservation ending with the document");
    }
}

/// Outstanding funds are settled when nothing is outstanding or the latest
/// reservation runs to the document's end date.
fn funds_settled(intervention: &Intervention) -> bool {
    let totals = intervention.frs_totals();
    totals.total_outstanding_amt.is_zero()
        || (intervention.end.is_some() && intervention.frs_latest_end_date() == intervention.end)
}

/// Guard for ended -> closed.
pub fn intervention_to_closed(intervention: &Intervention, errors: &mut ValidationErrors) {
    let totals = intervention.frs_totals();
    if totals.total_intervention_amt != totals.total_actual_amt
        || !totals.total_outstanding_amt.is_zero()
    {
        errors.add(
            "reservation amounts must equal actuals and outstanding transfers must be zero",
        );
    }

    let review_attached = intervention
        .attachment(codes::FINAL_PARTNERSHIP_REVIEW)
        .is_some();
    if totals.total_actual_amt >= FINAL_REVIEW_THRESHOLD && !review_attached {
        errors.add_field(
            "attachments",
            "a final partnership review is required for transfers of 100,000 or more",
        );
    }
    if !intervention.final_review_approved {
        errors.add("the final partnership review must be approved");
    }
    if !review_attached {
        errors.add_field("attachments", "the final partnership review must be attached");
    }
}

/// Guard for development statuses -> cancelled.
pub fn intervention_to_cancelled(intervention: &Intervention, errors: &mut ValidationErrors) {
    if intervention
        .cancel_justification
        .as_deref()
        .map(str::trim)
        .map(str::is_empty)
        .unwrap_or(true)
    {
        errors.add_field("cancel_justification", "a cancellation justification is required");
    }
}

/// Guard for signed/active/suspended -> terminated.
pub fn intervention_to_terminated(intervention: &Intervention, errors: &mut ValidationErrors) {
    if intervention
        .attachment(codes::INTERVENTION_TERMINATION)
        .is_none()
    {
        errors.add_field("attachments", "a signed termination notice must be attached");
    }
}

/// Guard for signed -> expired: contingency documents whose country
/// programmes have all ended.
pub fn intervention_to_expired(
    intervention: &Intervention,
    country_programmes: &[CountryProgramme],
    today: NaiveDate,
    errors: &mut ValidationErrors,
) {
    if !intervention.contingency_pd {
        errors.add("only contingency documents expire automatically");
    }
    let all_past = !intervention.country_programmes.is_empty()
        && intervention.country_programmes.iter().all(|cp_id| {
            country_programmes
                .iter()
                .find(|cp| cp.id == *cp_id)
                .map(|cp| cp.is_past(today))
                .unwrap_or(false)
        });
    if !all_past {
        errors.add("every linked country programme must be past its end date");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::attachment::AttachmentRef;
    use crate::core::intervention::FundsReservation;
    use crate::core::partner::CsoType;
    use crate::core::types::{AgreementId, FrsId, StaffMemberId, VendorNumber};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        date(2024, 6, 1)
    }

    fn cso() -> Partner {
        let mut p = Partner::new(
            VendorNumber::new("123").unwrap(),
            "Relief Works",
            PartnerType::CivilSocietyOrganization,
        );
        p.cso_type = Some(CsoType::National);
        p
    }

    fn ready_pca(partner: &Partner) -> Agreement {
        let mut a = Agreement::new(partner.id, AgreementType::Pca, "LEB/PCA202401".into());
        a.country_programme = Some(crate::core::types::CountryProgrammeId::new());
        a.start = Some(date(2024, 3, 1));
        a.end = Some(date(2026, 12, 31));
        a.signed_by_unicef_date = Some(date(2024, 2, 28));
        a.signed_by = Some(crate::core::types::UserId::new());
        a.signed_by_partner_date = Some(date(2024, 2, 27));
        a.partner_manager = Some(StaffMemberId::new());
        a.authorized_officers.push(StaffMemberId::new());
        a.attached_agreement = Some(AttachmentRef::new(codes::SIGNED_AGREEMENT, "pca.pdf"));
        a
    }

    fn fr(outstanding: i64, actual: i64, intervention_amt: i64) -> FundsReservation {
        FundsReservation {
            id: FrsId::new(),
            fr_number: "FR".into(),
            currency: "USD".into(),
            total_amt: Money::from_major(intervention_amt),
            intervention_amt: Money::from_major(intervention_amt),
            outstanding_amt: Money::from_major(outstanding),
            actual_amt: Money::from_major(actual),
            start_date: None,
            end_date: None,
        }
    }

    mod agreement_guards {
        use super::*;

        #[test]
        fn ready_pca_activates() {
            let partner = cso();
            let agreement = ready_pca(&partner);
            let mut errors = ValidationErrors::new();
            agreement_activate(&agreement, &partner, &[], today(), &mut errors);
            assert!(errors.is_empty(), "{}", errors);
        }

        #[test]
        fn non_cso_partner_blocks_pca() {
            let mut partner = cso();
            partner.partner_type = PartnerType::Government;
            partner.cso_type = None;
            let agreement = ready_pca(&partner);
            let mut errors = ValidationErrors::new();
            agreement_activate(&agreement, &partner, &[], today(), &mut errors);
            assert!(errors.field_errors.contains_key("partner"));
        }

        #[test]
        fn missing_officers_blocks() {
            let partner = cso();
            let mut agreement = ready_pca(&partner);
            agreement.authorized_officers.clear();
            let mut errors = ValidationErrors::new();
            agreement_activate(&agreement, &partner, &[], today(), &mut errors);
            assert!(errors.field_errors.contains_key("authorized_officers"));
        }

        #[test]
        fn second_active_pca_blocks() {
            let partner = cso();
            let agreement = ready_pca(&partner);
            let mut existing = ready_pca(&partner);
            existing.status = AgreementStatus::Signed;
            let mut errors = ValidationErrors::new();
            agreement_activate(&agreement, &partner, &[existing], today(), &mut errors);
            assert!(!errors.non_field_errors.is_empty());
        }

        #[test]
        fn end_requires_past_end_date() {
            let partner = cso();
            let mut agreement = ready_pca(&partner);
            agreement.end = Some(date(2024, 5, 1));
            let mut errors = ValidationErrors::new();
            agreement_end(&agreement, today(), &mut errors);
            assert!(errors.is_empty());

            agreement.end = Some(date(2024, 7, 1));
            let mut errors = ValidationErrors::new();
            agreement_end(&agreement, today(), &mut errors);
            assert!(!errors.is_empty());
        }

        #[test]
        fn terminate_requires_notice() {
            let partner = cso();
            let mut agreement = ready_pca(&partner);
            let mut errors = ValidationErrors::new();
            agreement_terminate(&agreement, &mut errors);
            assert!(!errors.is_empty());

            agreement.termination_doc =
                Some(AttachmentRef::new(codes::AGREEMENT_TERMINATION, "term.pdf"));
            let mut errors = ValidationErrors::new();
            agreement_terminate(&agreement, &mut errors);
            assert!(errors.is_empty());
        }
    }

    mod intervention_guards {
        use super::*;
        use crate::core::intervention::InterventionReview;
        use crate::core::results::{LowerResult, ResultLink};
        use crate::core::types::{OfficeId, SectionId};

        fn draft_pd() -> Intervention {
            let mut i = Intervention::new(
                AgreementId::new(),
                DocumentType::Pd,
                "Emergency WASH",
                "LEB/PCA202401/TempRef:1".into(),
                "USD",
            );
            i.start = Some(date(2024, 3, 1));
            i.end = Some(date(2025, 3, 1));
            i.sections.push(SectionId::new());
            i.offices.push(OfficeId::new());
            let mut link = ResultLink::new(Some("CP-1".into()));
            link.lower_results.push(LowerResult::new("output"));
            i.result_links.push(link);
            i
        }

        #[test]
        fn complete_draft_passes_review_guard() {
            let mut errors = ValidationErrors::new();
            intervention_to_review(&draft_pd(), &mut errors);
            assert!(errors.is_empty(), "{}", errors);
        }

        #[test]
        fn missing_sections_fails_review_guard() {
            let mut i = draft_pd();
            i.sections.clear();
            let mut errors = ValidationErrors::new();
            intervention_to_review(&i, &mut errors);
            assert!(errors.field_errors.contains_key("sections"));
        }

        #[test]
        fn missing_result_links_fails_review_guard() {
            let mut i = draft_pd();
            i.result_links.clear();
            let mut errors = ValidationErrors::new();
            intervention_to_review(&i, &mut errors);
            assert!(errors.field_errors.contains_key("result_links"));
        }

        #[test]
        fn government_documents_need_workplans_not_links() {
            let mut i = draft_pd();
            i.kind = InterventionKind::Government;
            i.result_links.clear();
            let mut errors = ValidationErrors::new();
            intervention_to_review(&i, &mut errors);
            assert!(errors.field_errors.contains_key("workplans"));

            i.workplans.push(crate::core::intervention::Workplan {
                wbs: "0060/A0/07".into(),
                title: "workplan".into(),
            });
            let mut errors = ValidationErrors::new();
            intervention_to_review(&i, &mut errors);
            assert!(errors.is_empty());
        }

        #[test]
        fn signature_guard_requires_approved_review() {
            let mut i = draft_pd();
            let mut errors = ValidationErrors::new();
            intervention_to_signature(&i, &mut errors);
            assert!(!errors.is_empty());

            let mut review = InterventionReview::new(ReviewType::Prc);
            review.overall_approval = Some(true);
            i.reviews.push(review);
            let mut errors = ValidationErrors::new();
            intervention_to_signature(&i, &mut errors);
            assert!(errors.is_empty());
        }

        #[test]
        fn no_review_only_in_amendment() {
            let mut i = draft_pd();
            i.reviews.push(InterventionReview::new(ReviewType::NoReview));
            let mut errors = ValidationErrors::new();
            intervention_to_signature(&i, &mut errors);
            assert!(!errors.is_empty());

            i.in_amendment = true;
            let mut errors = ValidationErrors::new();
            intervention_to_signature(&i, &mut errors);
            assert!(errors.is_empty());
        }

        #[test]
        fn signed_guard_checks_blocking_agreement() {
            let partner = cso();
            let mut agreement = ready_pca(&partner);
            agreement.status = AgreementStatus::Suspended;

            let mut i = draft_pd();
            i.signed_by_unicef_date = Some(date(2024, 5, 1));
            i.unicef_signatory = Some(crate::core::types::UserId::new());
            i.signed_by_partner_date = Some(date(2024, 5, 2));
            i.partner_authorized_officer_signatory = Some(StaffMemberId::new());
            i.attachments
                .push(AttachmentRef::new(codes::SIGNED_PD, "pd.pdf"));

            let mut errors = ValidationErrors::new();
            intervention_to_signed(&i, &agreement, today(), &mut errors);
            assert!(!errors.is_empty());

            agreement.status = AgreementStatus::Signed;
            let mut errors = ValidationErrors::new();
            intervention_to_signed(&i, &agreement, today(), &mut errors);
            assert!(errors.is_empty(), "{}", errors);
        }

        #[test]
        fn active_guard_requires_frs_and_start() {
            let partner = cso();
            let mut agreement = ready_pca(&partner);
            agreement.status = AgreementStatus::Signed;
            let mut i = draft_pd();

            let mut errors = ValidationErrors::new();
            intervention_to_active(&i, &agreement, today(), &mut errors);
            assert!(errors.field_errors.contains_key("frs"));

            i.frs.push(fr(0, 0, 100));
            let mut errors = ValidationErrors::new();
            intervention_to_active(&i, &agreement, today(), &mut errors);
            assert!(errors.is_empty(), "{}", errors);
        }

        #[test]
        fn ended_guard_requires_past_end_and_settled_funds() {
            let mut i = draft_pd();
            i.end = Some(date(2024, 5, 1));
            i.frs.push(fr(10, 90, 100));
            let mut errors = ValidationErrors::new();
            intervention_to_ended(&i, today(), &mut errors);
            assert!(!errors.is_empty());

            i.frs.clear();
            i.frs.push(fr(0, 100, 100));
            let mut errors = ValidationErrors::new();
            intervention_to_ended(&i, today(), &mut errors);
            assert!(errors.is_empty(), "{}", errors);
        }

        #[test]
        fn closed_guard_requires_review_and_settled_totals() {
            let mut i = draft_pd();
            i.frs.push(fr(0, 100, 100));
            i.final_review_approved = true;
            let mut errors = ValidationErrors::new();
            intervention_to_closed(&i, &mut errors);
            // Review attachment missing.
            assert!(!errors.is_empty());

            i.attachments.push(AttachmentRef::new(
                codes::FINAL_PARTNERSHIP_REVIEW,
                "review.pdf",
            ));
            let mut errors = ValidationErrors::new();
            intervention_to_closed(&i, &mut errors);
            assert!(errors.is_empty(), "{}", errors);
        }

        #[test]
        fn closed_guard_rejects_unequal_actuals() {
            let mut i = draft_pd();
            i.frs.push(fr(0, 50, 100));
            i.final_review_approved = true;
            i.attachments.push(AttachmentRef::new(
                codes::FINAL_PARTNERSHIP_REVIEW,
                "review.pdf",
            ));
            let mut errors = ValidationErrors::new();
            intervention_to_closed(&i, &mut errors);
            assert!(!errors.is_empty());
        }

        #[test]
        fn cancel_guard_requires_justification() {
            let mut i = draft_pd();
            let mut errors = ValidationErrors::new();
            intervention_to_cancelled(&i, &mut errors);
            assert!(!errors.is_empty());

            i.cancel_justification = Some("duplicate entry".into());
            let mut errors = ValidationErrors::new();
            intervention_to_cancelled(&i, &mut errors);
            assert!(errors.is_empty());
        }

        #[test]
        fn expired_guard_needs_contingency_and_past_programmes() {
            let cp = CountryProgramme::new("CP", "wbs", date(2020, 1, 1), date(2023, 12, 31));
            let mut i = draft_pd();
            i.country_programmes.push(cp.id);

            let mut errors = ValidationErrors::new();
            intervention_to_expired(&i, &[cp.clone()], today(), &mut errors);
            // Not contingency.
            assert!(!errors.is_empty());

            i.contingency_pd = true;
            let mut errors = ValidationErrors::new();
            intervention_to_expired(&i, &[cp], today(), &mut errors);
            assert!(errors.is_empty(), "{}", errors);
        }

        #[test]
        fn type_compatibility() {
            let partner = cso();
            let mut agreement = ready_pca(&partner);
            let i = draft_pd();
            let mut errors = ValidationErrors::new();
            document_type_compatible(&i, &agreement, &mut errors);
            assert!(errors.is_empty());

            agreement.agreement_type = AgreementType::Mou;
            let mut errors = ValidationErrors::new();
            document_type_compatible(&i, &agreement, &mut errors);
            assert!(errors.field_errors.contains_key("document_type"));
        }
    }
}
