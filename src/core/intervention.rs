//! core::intervention
//!
//! Interventions: the programme documents that execute under agreements.
//!
//! An intervention is a large aggregate: the result tree, planned budget,
//! time frames, supply items, planned visits, reporting windows, and funds
//! reservations are all owned by the document and persist with it. The
//! amendment engine clones this aggregate wholesale.
//!
//! # Invariants
//!
//! - PD/SPD documents execute under PCA agreements; SSFA under SSFA
//! - An SSFA agreement holds at most one intervention
//! - While `in_amendment` is set, exactly one active shadow copy exists
//! - The reference number derives from the agreement reference and is a
//!   `TempRef` placeholder until the first transition out of draft

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::attachment::{codes, find_by_code, AttachmentRef};
use crate::core::budget::Budget;
use crate::core::reporting::{ReportType, ReportingRequirement};
use crate::core::results::ResultLink;
use crate::core::types::{
    AgreementId, CountryProgrammeId, FiscalYear, FrsId, InterventionId, LocationId, Money,
    OfficeId, PlannedVisitId, Quarter, ReviewId, SectionId, SiteId, StaffMemberId, TimeFrameId,
    UserId, UtcTimestamp,
};

/// Intervention document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Programme document.
    Pd,
    /// Simplified programme document.
    Spd,
    /// Small-scale funding agreement document.
    Ssfa,
}

impl DocumentType {
    /// The code used in reference numbers.
    pub fn code(&self) -> &'static str {
        match self {
            DocumentType::Pd => "PD",
            DocumentType::Spd => "SPD",
            DocumentType::Ssfa => "SSFA",
        }
    }

    /// PD and SPD documents are the ones agreement cascades reach.
    pub fn is_programme_document(&self) -> bool {
        matches!(self, DocumentType::Pd | DocumentType::Spd)
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// The eleven intervention lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionStatus {
    Draft,
    Review,
    Signature,
    Signed,
    Active,
    Suspended,
    Terminated,
    Ended,
    Closed,
    Cancelled,
    Expired,
}

impl InterventionStatus {
    /// Pre-signature statuses, where the document is still being drafted.
    pub fn is_development(&self) -> bool {
        matches!(
            self,
            InterventionStatus::Draft | InterventionStatus::Review | InterventionStatus::Signature
        )
    }

    /// Statuses an agreement suspend/terminate cascade applies to.
    pub fn cascade_applies(&self) -> bool {
        !matches!(
            self,
            InterventionStatus::Draft
                | InterventionStatus::Cancelled
                | InterventionStatus::Closed
                | InterventionStatus::Ended
                | InterventionStatus::Terminated
        )
    }
}

impl std::fmt::Display for InterventionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InterventionStatus::Draft => "draft",
            InterventionStatus::Review => "review",
            InterventionStatus::Signature => "signature",
            InterventionStatus::Signed => "signed",
            InterventionStatus::Active => "active",
            InterventionStatus::Suspended => "suspended",
            InterventionStatus::Terminated => "terminated",
            InterventionStatus::Ended => "ended",
            InterventionStatus::Closed => "closed",
            InterventionStatus::Cancelled => "cancelled",
            InterventionStatus::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

/// Review path for the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewType {
    Prc,
    NonPrc,
    NoReview,
}

/// Cash transfer modalities available to the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CashTransferModality {
    Payment,
    Reimbursement,
    Direct,
}

/// Who provides a supply item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplyProvider {
    Unicef,
    Partner,
}

/// A supply line on the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplyItem {
    pub id: crate::core::types::SupplyItemId,
    pub title: String,
    pub unit_number: u32,
    pub unit_price: Money,
    pub provided_by: SupplyProvider,
    pub created: UtcTimestamp,
}

impl SupplyItem {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: crate::core::types::SupplyItemId::new(),
            title: title.into(),
            unit_number: 0,
            unit_price: Money::zero(),
            provided_by: SupplyProvider::Unicef,
            created: UtcTimestamp::now(),
        }
    }

    /// Total price of the line.
    pub fn total_price(&self) -> Money {
        Money::from_minor(self.unit_price.minor_units() * self.unit_number as i64)
    }
}

/// A quarter-sized time frame of the document's duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeFrame {
    pub id: TimeFrameId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// A funds reservation header synced from the financial system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundsReservation {
    pub id: FrsId,
    pub fr_number: String,
    pub currency: String,
    pub total_amt: Money,
    pub intervention_amt: Money,
    pub outstanding_amt: Money,
    pub actual_amt: Money,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Aggregates over an intervention's funds reservations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrsTotals {
    pub total_frs_amt: Money,
    pub total_intervention_amt: Money,
    pub total_outstanding_amt: Money,
    pub total_actual_amt: Money,
}

/// A UNICEF-side user reference carried on the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: UserId,
    pub email: String,
}

impl UserRef {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            email: email.into(),
        }
    }
}

/// A PRC (or equivalent) review of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionReview {
    pub id: ReviewId,
    pub review_type: ReviewType,
    pub created: UtcTimestamp,
    pub submitted_by: Option<UserId>,
    /// Set when the review concludes; true means recommended for approval.
    pub overall_approval: Option<bool>,
}

impl InterventionReview {
    pub fn new(review_type: ReviewType) -> Self {
        Self {
            id: ReviewId::new(),
            review_type,
            created: UtcTimestamp::now(),
            submitted_by: None,
            overall_approval: None,
        }
    }
}

/// Planned programmatic visits for one year.
///
/// Only editable for Government partners; the per-quarter site lists name
/// where the visits will happen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedVisit {
    pub id: PlannedVisitId,
    pub year: FiscalYear,
    pub programmatic_q1: u32,
    pub programmatic_q2: u32,
    pub programmatic_q3: u32,
    pub programmatic_q4: u32,
    pub sites_q1: Vec<SiteId>,
    pub sites_q2: Vec<SiteId>,
    pub sites_q3: Vec<SiteId>,
    pub sites_q4: Vec<SiteId>,
}

impl PlannedVisit {
    pub fn new(year: FiscalYear) -> Self {
        Self {
            id: PlannedVisitId::new(),
            year,
            programmatic_q1: 0,
            programmatic_q2: 0,
            programmatic_q3: 0,
            programmatic_q4: 0,
            sites_q1: Vec::new(),
            sites_q2: Vec::new(),
            sites_q3: Vec::new(),
            sites_q4: Vec::new(),
        }
    }

    /// Planned count for a quarter.
    pub fn programmatic(&self, quarter: Quarter) -> u32 {
        match quarter {
            Quarter::Q1 => self.programmatic_q1,
            Quarter::Q2 => self.programmatic_q2,
            Quarter::Q3 => self.programmatic_q3,
            Quarter::Q4 => self.programmatic_q4,
        }
    }
}

/// A government workplan line (Government variant only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workplan {
    pub wbs: String,
    pub title: String,
}

/// Which flavor of intervention this document is.
///
/// The Government variant runs the same lifecycle but needs no
/// partner-side signatory and plans with workplans instead of the result
/// tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionKind {
    Programme,
    Government,
}

/// An intervention (programme document) under an agreement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    pub id: InterventionId,
    pub agreement_id: AgreementId,
    pub kind: InterventionKind,
    pub document_type: DocumentType,
    pub title: String,
    pub status: InterventionStatus,
    /// Reference number; a `TempRef` placeholder until first leaving draft.
    pub number: String,
    pub country_programmes: Vec<CountryProgrammeId>,
    pub contingency_pd: bool,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub submission_date: Option<NaiveDate>,
    pub submission_date_prc: Option<NaiveDate>,
    pub review_date_prc: Option<NaiveDate>,
    pub signed_by_unicef_date: Option<NaiveDate>,
    pub signed_by_partner_date: Option<NaiveDate>,
    pub unicef_signatory: Option<UserId>,
    pub partner_authorized_officer_signatory: Option<StaffMemberId>,
    pub unicef_focal_points: Vec<UserRef>,
    pub partner_focal_points: Vec<StaffMemberId>,
    pub sections: Vec<SectionId>,
    pub offices: Vec<OfficeId>,
    pub flat_locations: Vec<LocationId>,
    pub cash_transfer_modalities: Vec<CashTransferModality>,
    /// Set while an amendment shadow of this document exists.
    pub in_amendment: bool,
    /// Side currently allowed to edit; true means UNICEF holds the pen.
    pub unicef_court: bool,
    pub unicef_accepted: bool,
    pub partner_accepted: bool,
    pub date_sent_to_partner: Option<NaiveDate>,
    pub planned_budget: Budget,
    pub result_links: Vec<ResultLink>,
    pub workplans: Vec<Workplan>,
    pub quarters: Vec<TimeFrame>,
    pub supply_items: Vec<SupplyItem>,
    pub planned_visits: Vec<PlannedVisit>,
    pub reporting_requirements: Vec<ReportingRequirement>,
    pub frs: Vec<FundsReservation>,
    pub reviews: Vec<InterventionReview>,
    pub attachments: Vec<AttachmentRef>,
    pub final_review_approved: bool,
    pub cancel_justification: Option<String>,
    /// Set by the sweeper when the parent agreement was cancelled or
    /// terminated while this document was still in development.
    pub stale: bool,
    pub created: UtcTimestamp,
}

impl Intervention {
    /// Create a draft document. The placeholder number is assigned by the
    /// caller (engine) via the allocator.
    pub fn new(
        agreement_id: AgreementId,
        document_type: DocumentType,
        title: impl Into<String>,
        number: String,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            id: InterventionId::new(),
            agreement_id,
            kind: InterventionKind::Programme,
            document_type,
            title: title.into(),
            status: InterventionStatus::Draft,
            number,
            country_programmes: Vec::new(),
            contingency_pd: false,
            start: None,
            end: None,
            submission_date: None,
            submission_date_prc: None,
            review_date_prc: None,
            signed_by_unicef_date: None,
            signed_by_partner_date: None,
            unicef_signatory: None,
            partner_authorized_officer_signatory: None,
            unicef_focal_points: Vec::new(),
            partner_focal_points: Vec::new(),
            sections: Vec::new(),
            offices: Vec::new(),
            flat_locations: Vec::new(),
            cash_transfer_modalities: Vec::new(),
            in_amendment: false,
            unicef_court: true,
            unicef_accepted: false,
            partner_accepted: false,
            date_sent_to_partner: None,
            planned_budget: Budget::new(currency),
            result_links: Vec::new(),
            workplans: Vec::new(),
            quarters: Vec::new(),
            supply_items: Vec::new(),
            planned_visits: Vec::new(),
            reporting_requirements: Vec::new(),
            frs: Vec::new(),
            reviews: Vec::new(),
            attachments: Vec::new(),
            final_review_approved: false,
            cancel_justification: None,
            stale: false,
            created: UtcTimestamp::now(),
        }
    }

    /// Once either side accepts, the structural fields freeze.
    pub fn locked(&self) -> bool {
        self.unicef_accepted || self.partner_accepted
    }

    /// Aggregate the funds reservation headers.
    pub fn frs_totals(&self) -> FrsTotals {
        let mut totals = FrsTotals::default();
        for fr in &self.frs {
            totals.total_frs_amt = totals.total_frs_amt + fr.total_amt;
            totals.total_intervention_amt = totals.total_intervention_amt + fr.intervention_amt;
            totals.total_outstanding_amt = totals.total_outstanding_amt + fr.outstanding_amt;
            totals.total_actual_amt = totals.total_actual_amt + fr.actual_amt;
        }
        totals
    }

    /// Latest FRS end date, if any reservation carries one.
    pub fn frs_latest_end_date(&self) -> Option<NaiveDate> {
        self.frs.iter().filter_map(|fr| fr.end_date).max()
    }

    /// Find an attachment by code.
    pub fn attachment(&self, code: &str) -> Option<&AttachmentRef> {
        find_by_code(&self.attachments, code)
    }

    /// The signed programme document, if attached.
    pub fn signed_pd_attachment(&self) -> Option<&AttachmentRef> {
        self.attachment(codes::SIGNED_PD)
    }

    /// The most recent review, by creation time.
    pub fn final_review(&self) -> Option<&InterventionReview> {
        self.reviews.iter().max_by_key(|r| r.created.clone())
    }

    /// Any active high-frequency indicator applied to the document.
    pub fn has_high_frequency_indicator(&self) -> bool {
        self.result_links
            .iter()
            .flat_map(|l| l.lower_results.iter())
            .flat_map(|lr| lr.indicators.iter())
            .any(|i| i.is_active && i.is_high_frequency)
    }

    /// Reporting windows of one type.
    pub fn reporting_windows(&self, report_type: ReportType) -> Vec<&ReportingRequirement> {
        self.reporting_requirements
            .iter()
            .filter(|r| r.report_type == report_type)
            .collect()
    }

    /// Regenerate the quarter time frames to tile [start, end].
    ///
    /// Existing frames keep their identity positionally so activity
    /// time-frame references survive date nudges; extra frames are
    /// dropped, missing ones appended.
    pub fn regenerate_quarters(&mut self) {
        let (Some(start), Some(end)) = (self.start, self.end) else {
            return;
        };
        if end < start {
            return;
        }

        let mut frames: Vec<(NaiveDate, NaiveDate)> = Vec::new();
        let mut cursor = start;
        while cursor <= end {
            let frame_end = (cursor + chrono::Duration::days(90)).min(end);
            frames.push((cursor, frame_end));
            cursor = frame_end + chrono::Duration::days(1);
        }

        self.quarters.truncate(frames.len());
        for (i, (frame_start, frame_end)) in frames.into_iter().enumerate() {
            if let Some(existing) = self.quarters.get_mut(i) {
                existing.start_date = frame_start;
                existing.end_date = frame_end;
            } else {
                self.quarters.push(TimeFrame {
                    id: TimeFrameId::new(),
                    start_date: frame_start,
                    end_date: frame_end,
                });
            }
        }

        // Drop dangling time-frame references from activities.
        let valid: Vec<TimeFrameId> = self.quarters.iter().map(|q| q.id).collect();
        for link in &mut self.result_links {
            for lower in &mut link.lower_results {
                for activity in &mut lower.activities {
                    activity.time_frames.retain(|tf| valid.contains(tf));
                }
            }
        }
    }

    /// Signature consistency, mirroring the agreement-side rule.
    ///
    /// A signature date requires its signatory (partner side skipped for
    /// Government documents), and no date may be in the future.
    pub fn signatures_consistent(&self, today: NaiveDate) -> bool {
        let unicef_partial = self.signed_by_unicef_date.is_some() != self.unicef_signatory.is_some();
        let partner_partial = self.kind == InterventionKind::Programme
            && self.signed_by_partner_date.is_some()
                != self.partner_authorized_officer_signatory.is_some();
        let future = [self.signed_by_unicef_date, self.signed_by_partner_date]
            .iter()
            .flatten()
            .any(|d| *d > today);
        !(unicef_partial || partner_partial || future)
    }
}
