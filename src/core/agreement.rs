//! core::agreement
//!
//! Agreements: the legal instruments interventions execute under.
//!
//! # Invariants
//!
//! - The reference number is immutable once the status leaves draft
//! - `start >= max(signed_by_unicef_date, signed_by_partner_date)` when both
//!   signature dates are present
//! - SSFA agreements run at most 365 days
//! - PCA agreements require a CSO partner and a country programme
//! - A partner holds at most one active PCA per country programme at a time
//!   (cross-entity; enforced by the engine guard)
//!
//! Structural validation here covers everything decidable from the
//! agreement alone; cross-entity rules live with the FSM guards.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::attachment::AttachmentRef;
use crate::core::types::{
    AgreementId, AmendmentId, CountryProgrammeId, PartnerId, StaffMemberId, UserId, UtcTimestamp,
};

/// Agreement type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementType {
    Pca,
    Mou,
    Ssfa,
}

impl AgreementType {
    /// The code used in reference numbers.
    pub fn code(&self) -> &'static str {
        match self {
            AgreementType::Pca => "PCA",
            AgreementType::Mou => "MOU",
            AgreementType::Ssfa => "SSFA",
        }
    }
}

impl std::fmt::Display for AgreementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Agreement lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementStatus {
    Draft,
    Signed,
    Suspended,
    Terminated,
    Ended,
    Cancelled,
}

impl AgreementStatus {
    /// Whether the agreement is in a state that blocks its interventions
    /// from progressing.
    pub fn is_blocking(&self) -> bool {
        matches!(self, AgreementStatus::Suspended | AgreementStatus::Terminated)
    }
}

impl std::fmt::Display for AgreementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgreementStatus::Draft => "draft",
            AgreementStatus::Signed => "signed",
            AgreementStatus::Suspended => "suspended",
            AgreementStatus::Terminated => "terminated",
            AgreementStatus::Ended => "ended",
            AgreementStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// What an agreement amendment changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementAmendmentType {
    AuthorizedOfficers,
    BankingInfo,
    ClauseChanges,
    CpExtension,
}

/// An amendment to an agreement.
///
/// Agreement amendments are flat records (no shadow copy): the amendment
/// document itself carries the changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgreementAmendment {
    pub id: AmendmentId,
    /// Per-agreement sequence, `amd/N`.
    pub number: String,
    pub types: Vec<AgreementAmendmentType>,
    pub signed_amendment: Option<AttachmentRef>,
    pub signed_date: Option<NaiveDate>,
}

impl AgreementAmendment {
    /// An amendment is complete once its signed document and date are in
    /// and the date is not in the future.
    pub fn is_complete(&self, today: NaiveDate) -> bool {
        self.signed_amendment.is_some()
            && self.signed_date.map(|d| d <= today).unwrap_or(false)
    }
}

/// Maximum SSFA duration in days.
pub const SSFA_MAX_DAYS: i64 = 365;

/// A per-field validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// An agreement with a partner organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agreement {
    pub id: AgreementId,
    pub partner_id: PartnerId,
    pub agreement_type: AgreementType,
    pub country_programme: Option<CountryProgrammeId>,
    /// Reference number; immutable once the status leaves draft.
    pub reference_number: String,
    pub status: AgreementStatus,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub signed_by_unicef_date: Option<NaiveDate>,
    pub signed_by_partner_date: Option<NaiveDate>,
    /// UNICEF signatory.
    pub signed_by: Option<UserId>,
    /// Partner-side manager who signs.
    pub partner_manager: Option<StaffMemberId>,
    pub authorized_officers: Vec<StaffMemberId>,
    pub attached_agreement: Option<AttachmentRef>,
    pub termination_doc: Option<AttachmentRef>,
    pub special_conditions_pca: bool,
    pub amendments: Vec<AgreementAmendment>,
    pub created: UtcTimestamp,
}

impl Agreement {
    /// Create a draft agreement. The reference number is assigned by the
    /// caller (engine) via the allocator.
    pub fn new(
        partner_id: PartnerId,
        agreement_type: AgreementType,
        reference_number: String,
    ) -> Self {
        Self {
            id: AgreementId::new(),
            partner_id,
            agreement_type,
            country_programme: None,
            reference_number,
            status: AgreementStatus::Draft,
            start: None,
            end: None,
            signed_by_unicef_date: None,
            signed_by_partner_date: None,
            signed_by: None,
            partner_manager: None,
            authorized_officers: Vec::new(),
            attached_agreement: None,
            termination_doc: None,
            special_conditions_pca: false,
            amendments: Vec::new(),
            created: UtcTimestamp::now(),
        }
    }

    /// The stable base reference (no amendment suffix).
    pub fn base_reference(&self) -> &str {
        crate::core::refnum::base_reference(&self.reference_number)
    }

    /// Structural validation decidable from the agreement alone.
    ///
    /// # Errors
    ///
    /// Returns the complete list of per-field failures.
    pub fn validate(&self, today: NaiveDate) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();

        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                errors.push(FieldError::new(
                    "start",
                    "start date must be on or before the end date",
                ));
            }
            if self.agreement_type == AgreementType::Ssfa
                && (end - start).num_days() > SSFA_MAX_DAYS
            {
                errors.push(FieldError::new(
                    "end",
                    "SSFA agreements cannot run longer than 365 days",
                ));
            }
        }

        self.validate_signatures(today, &mut errors);

        if let (Some(start), Some(unicef), Some(partner)) = (
            self.start,
            self.signed_by_unicef_date,
            self.signed_by_partner_date,
        ) {
            if start < unicef.max(partner) {
                errors.push(FieldError::new(
                    "start",
                    "start date cannot precede the later signature date",
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Signature consistency.
    ///
    /// SSFA agreements carry no agreement-level signatures (they are
    /// captured on the document). For other types, a signature date
    /// requires its signatory and vice versa, and no date may lie in the
    /// future.
    fn validate_signatures(&self, today: NaiveDate, errors: &mut Vec<FieldError>) {
        if self.agreement_type == AgreementType::Ssfa {
            if self.signed_by_unicef_date.is_some()
                || self.signed_by_partner_date.is_some()
                || self.signed_by.is_some()
                || self.partner_manager.is_some()
            {
                errors.push(FieldError::new(
                    "signed_by_unicef_date",
                    "SSFA signatures are captured on the document, not the agreement",
                ));
            }
            return;
        }

        let unicef_partial =
            self.signed_by_unicef_date.is_some() != self.signed_by.is_some();
        let partner_partial =
            self.signed_by_partner_date.is_some() != self.partner_manager.is_some();
        if unicef_partial || partner_partial {
            errors.push(FieldError::new(
                "signed_by",
                "signature dates and signatories must be provided together",
            ));
        }

        for (field, date) in [
            ("signed_by_unicef_date", self.signed_by_unicef_date),
            ("signed_by_partner_date", self.signed_by_partner_date),
        ] {
            if let Some(date) = date {
                if date > today {
                    errors.push(FieldError::new(field, "signature dates cannot be in the future"));
                }
            }
        }
    }

    /// All amendments complete (signed document attached, dated, not in
    /// the future).
    pub fn amendments_complete(&self, today: NaiveDate) -> bool {
        self.amendments.iter().all(|a| a.is_complete(today))
    }

    /// Count of signed amendments, used for `amd/N` numbering.
    pub fn next_amendment_sequence(&self) -> u64 {
        self.amendments.len() as u64 + 1
    }
}
