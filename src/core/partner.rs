//! core::partner
//!
//! Partner organizations and their assurance inputs.
//!
//! # Entities
//!
//! - [`Partner`] - an implementing partner synced from the vendor master
//! - [`StaffMember`] - partner-side staff (authorized officers, focal points)
//! - [`Assessment`] - completed assurance assessments (micro assessments,
//!   scheduled audits, ...)
//! - [`MonitoringActivity`] - field monitoring records counted as
//!   programmatic visits
//! - [`MonitoringActivityGroup`] - explicit grouping that collapses several
//!   completed activities into a single counted visit
//!
//! # Invariants
//!
//! - `(name, vendor_number)` is unique per tenant
//! - A CSO subtype is present iff the partner type is CSO
//! - Planned visits may only be attached to Government partners
//! - A partner with a signed agreement or any cash movement is never deleted

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::hact::HactValues;
use crate::core::types::{
    ActivityGroupId, AssessmentId, MonitoringActivityId, PartnerId, SectionId, StaffMemberId,
    UtcTimestamp, Money, VendorNumber,
};

/// Partner organization type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartnerType {
    Bilateral,
    CivilSocietyOrganization,
    Government,
    UnAgency,
}

impl PartnerType {
    /// Whether planned visits may be edited for this partner type.
    pub fn supports_planned_visits(&self) -> bool {
        matches!(self, PartnerType::Government)
    }
}

impl std::fmt::Display for PartnerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PartnerType::Bilateral => "bilateral",
            PartnerType::CivilSocietyOrganization => "civil_society_organization",
            PartnerType::Government => "government",
            PartnerType::UnAgency => "un_agency",
        };
        write!(f, "{}", s)
    }
}

/// CSO subtype, required iff the partner type is CSO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CsoType {
    International,
    National,
    CommunityBased,
    AcademicInstitution,
}

/// HACT risk rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskRating {
    NotAssessed,
    Low,
    Moderate,
    Significant,
    High,
}

impl RiskRating {
    /// The four assessed ratings (everything but NotAssessed).
    pub fn is_assessed(&self) -> bool {
        !matches!(self, RiskRating::NotAssessed)
    }

    /// Ratings in the elevated band of the minimum-requirements table.
    pub fn is_elevated(&self) -> bool {
        matches!(self, RiskRating::Significant | RiskRating::High)
    }
}

/// Assessment types feeding the HACT aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentType {
    MicroAssessment,
    SimplifiedChecklist,
    ScheduledAuditReport,
    SpecialAudit,
    SpotCheck,
    HighRiskAssumed,
    NegativeAuditResults,
    Other,
}

/// A completed assurance assessment against a partner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub id: AssessmentId,
    pub partner_id: PartnerId,
    pub assessment_type: AssessmentType,
    /// Date the assessment was completed, if it has been.
    pub completed_date: Option<NaiveDate>,
    pub report_reference: Option<String>,
    /// Findings still awaiting follow-up.
    pub pending_findings: u32,
}

impl Assessment {
    pub fn new(partner_id: PartnerId, assessment_type: AssessmentType) -> Self {
        Self {
            id: AssessmentId::new(),
            partner_id,
            assessment_type,
            completed_date: None,
            report_reference: None,
            pending_findings: 0,
        }
    }
}

/// A partner staff member.
///
/// Authorized officers on agreements and partner focal points on
/// interventions reference these by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: StaffMemberId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub title: Option<String>,
    pub active: bool,
}

impl StaffMember {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: StaffMemberId::new(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            title: None,
            active: true,
        }
    }
}

/// Monitoring activity status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringStatus {
    Draft,
    Review,
    Assigned,
    DataCollection,
    ReportFinalization,
    Completed,
    Cancelled,
}

/// A field monitoring activity.
///
/// A completed activity counts as one programmatic visit for a partner iff
/// it carries a HACT-flagged finding against that partner; see the
/// aggregator for the grouping rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringActivity {
    pub id: MonitoringActivityId,
    pub status: MonitoringStatus,
    pub end_date: Option<NaiveDate>,
    /// Partners this activity visited.
    pub partners: Vec<PartnerId>,
    /// Partners with at least one HACT-flagged finding on this activity.
    pub hact_for: Vec<PartnerId>,
}

impl MonitoringActivity {
    pub fn new(partner_id: PartnerId) -> Self {
        Self {
            id: MonitoringActivityId::new(),
            status: MonitoringStatus::Draft,
            end_date: None,
            partners: vec![partner_id],
            hact_for: Vec::new(),
        }
    }

    /// Whether this activity is countable as a programmatic visit for the
    /// given partner.
    pub fn counts_for(&self, partner_id: PartnerId) -> bool {
        self.status == MonitoringStatus::Completed
            && self.end_date.is_some()
            && self.hact_for.contains(&partner_id)
    }
}

/// A named grouping of monitoring activities against one partner.
///
/// The whole group counts as a single programmatic visit, bucketed in the
/// earliest quarter among its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringActivityGroup {
    pub id: ActivityGroupId,
    pub members: Vec<MonitoringActivityId>,
}

impl MonitoringActivityGroup {
    pub fn new(members: Vec<MonitoringActivityId>) -> Self {
        Self {
            id: ActivityGroupId::new(),
            members,
        }
    }
}

/// Validation failures from partner structural checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnerValidationError {
    pub field: &'static str,
    pub message: String,
}

/// A partner organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partner {
    pub id: PartnerId,
    pub vendor_number: VendorNumber,
    pub name: String,
    pub short_name: Option<String>,
    pub partner_type: PartnerType,
    pub cso_type: Option<CsoType>,
    pub rating: RiskRating,
    /// The assessment type that produced the current rating.
    pub type_of_assessment: Option<AssessmentType>,
    pub last_assessment_date: Option<NaiveDate>,
    pub core_values_assessment_date: Option<NaiveDate>,
    pub psea_assessment_date: Option<NaiveDate>,
    pub sea_risk_rating: Option<RiskRating>,
    pub lead_section: Option<SectionId>,
    pub hidden: bool,
    pub blocked: bool,
    pub deleted_flag: bool,
    /// Cash transferred in the current country programme.
    pub total_ct_cp: Money,
    /// Cash transferred in the current calendar year.
    pub total_ct_cy: Money,
    /// Planned cash for the current year (drives the micro-assessment rule).
    pub planned_cash_cy: Money,
    /// Derived assurance aggregate; written only by the HACT aggregator.
    pub hact_values: HactValues,
    /// Derived micro-assessment answer ("Yes" / "No" / "Missing").
    pub basis_for_risk_rating: String,
    pub staff_members: Vec<StaffMember>,
    pub monitoring_groups: Vec<MonitoringActivityGroup>,
    pub created: UtcTimestamp,
}

impl Partner {
    /// Create a partner as the vendor sync would: minimal fields, everything
    /// else defaulted.
    pub fn new(vendor_number: VendorNumber, name: impl Into<String>, partner_type: PartnerType) -> Self {
        Self {
            id: PartnerId::new(),
            vendor_number,
            name: name.into(),
            short_name: None,
            partner_type,
            cso_type: None,
            rating: RiskRating::NotAssessed,
            type_of_assessment: None,
            last_assessment_date: None,
            core_values_assessment_date: None,
            psea_assessment_date: None,
            sea_risk_rating: None,
            lead_section: None,
            hidden: false,
            blocked: false,
            deleted_flag: false,
            total_ct_cp: Money::zero(),
            total_ct_cy: Money::zero(),
            planned_cash_cy: Money::zero(),
            hact_values: HactValues::default(),
            basis_for_risk_rating: String::new(),
            staff_members: Vec::new(),
            monitoring_groups: Vec::new(),
            created: UtcTimestamp::now(),
        }
    }

    /// Structural validation.
    ///
    /// # Errors
    ///
    /// Returns per-field failures for subtype mismatches.
    pub fn validate(&self) -> Result<(), Vec<PartnerValidationError>> {
        let mut errors = Vec::new();

        let is_cso = self.partner_type == PartnerType::CivilSocietyOrganization;
        if is_cso && self.cso_type.is_none() {
            errors.push(PartnerValidationError {
                field: "cso_type",
                message: "CSO partners require a CSO subtype".into(),
            });
        }
        if !is_cso && self.cso_type.is_some() {
            errors.push(PartnerValidationError {
                field: "cso_type",
                message: "only CSO partners carry a CSO subtype".into(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Look up a staff member by id.
    pub fn staff_member(&self, id: StaffMemberId) -> Option<&StaffMember> {
        self.staff_members.iter().find(|s| s.id == id)
    }

    /// Replace the monitoring group membership wholesale.
    ///
    /// This mirrors the partner-edit surface: the caller sends the complete
    /// new list of groups; the HACT aggregator is re-run afterwards.
    pub fn set_monitoring_groups(&mut self, groups: Vec<Vec<MonitoringActivityId>>) {
        self.monitoring_groups = groups
            .into_iter()
            .filter(|members| !members.is_empty())
            .map(MonitoringActivityGroup::new)
            .collect();
    }
}
