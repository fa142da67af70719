//! api
//!
//! Framework-neutral REST contracts.
//!
//! This module defines the shapes an HTTP layer mounts: list filters,
//! error bodies with their status codes, deletion rules, and the
//! per-field permissions block on detail responses. No HTTP server lives
//! here; handlers call the engine and translate [`EngineError`] through
//! [`ApiError`].
//!
//! # Error bodies
//!
//! Validation failures serialize as `{field: [messages]}` maps, with
//! cross-field messages under `non_field_errors`. Everything else is a
//! `{detail}` object.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::agreement::{Agreement, AgreementStatus, AgreementType};
use crate::core::intervention::{DocumentType, Intervention, InterventionStatus};
use crate::core::partner::{CsoType, Partner, PartnerType, RiskRating};
use crate::core::permissions::{permissions_block, FieldPermission, Role};
use crate::core::types::{CountryProgrammeId, PartnerId, SectionId};
use crate::engine::EngineError;

/// HTTP status codes used by the surface.
pub mod status {
    pub const OK: u16 = 200;
    pub const CREATED: u16 = 201;
    pub const NO_CONTENT: u16 = 204;
    pub const BAD_REQUEST: u16 = 400;
    pub const FORBIDDEN: u16 = 403;
    pub const NOT_FOUND: u16 = 404;
    pub const METHOD_NOT_ALLOWED: u16 = 405;
    pub const CONFLICT: u16 = 409;
    pub const INTERNAL: u16 = 500;
    pub const BAD_GATEWAY: u16 = 502;
}

/// An error ready for the wire: status code plus JSON body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: u16,
    #[serde(flatten)]
    pub body: ErrorBody,
}

/// Serialized error body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ErrorBody {
    /// Per-field messages, with cross-field messages under
    /// `non_field_errors`.
    Fields(BTreeMap<String, Vec<String>>),
    /// A single detail message.
    Detail { detail: String },
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::Validation(errors) => {
                let mut fields = errors.field_errors;
                if !errors.non_field_errors.is_empty() {
                    fields.insert("non_field_errors".to_string(), errors.non_field_errors);
                }
                ApiError {
                    status: status::BAD_REQUEST,
                    body: ErrorBody::Fields(fields),
                }
            }
            EngineError::Permission(detail) => ApiError {
                status: status::FORBIDDEN,
                body: ErrorBody::Detail { detail },
            },
            EngineError::NotFound { kind, id } => ApiError {
                status: status::NOT_FOUND,
                body: ErrorBody::Detail {
                    detail: format!("{} not found: {}", kind, id),
                },
            },
            EngineError::Conflict(detail) => ApiError {
                status: status::CONFLICT,
                body: ErrorBody::Detail { detail },
            },
            EngineError::DownstreamUnavailable(detail) => ApiError {
                status: status::BAD_GATEWAY,
                body: ErrorBody::Detail { detail },
            },
            EngineError::Integrity(detail) => ApiError {
                status: status::INTERNAL,
                body: ErrorBody::Detail { detail },
            },
        }
    }
}

/// Response verbosity for list endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    #[default]
    Full,
    Minimal,
}

/// Partner list filters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PartnerFilters {
    pub partner_type: Option<PartnerType>,
    pub cso_type: Option<CsoType>,
    pub hidden: Option<bool>,
    pub lead_section: Option<SectionId>,
    pub sea_risk_rating: Option<RiskRating>,
    pub psea_assessment_date_before: Option<NaiveDate>,
    pub psea_assessment_date_after: Option<NaiveDate>,
    /// Matches name and short name, case-insensitive.
    pub search: Option<String>,
}

impl PartnerFilters {
    pub fn matches(&self, partner: &Partner) -> bool {
        if let Some(t) = self.partner_type {
            if partner.partner_type != t {
                return false;
            }
        }
        if let Some(t) = self.cso_type {
            if partner.cso_type != Some(t) {
                return false;
            }
        }
        if let Some(hidden) = self.hidden {
            if partner.hidden != hidden {
                return false;
            }
        }
        if let Some(section) = self.lead_section {
            if partner.lead_section != Some(section) {
                return false;
            }
        }
        if let Some(rating) = self.sea_risk_rating {
            if partner.sea_risk_rating != Some(rating) {
                return false;
            }
        }
        if let Some(before) = self.psea_assessment_date_before {
            match partner.psea_assessment_date {
                Some(date) if date < before => {}
                _ => return false,
            }
        }
        if let Some(after) = self.psea_assessment_date_after {
            match partner.psea_assessment_date {
                Some(date) if date > after => {}
                _ => return false,
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let name_hit = partner.name.to_lowercase().contains(&needle);
            let short_hit = partner
                .short_name
                .as_ref()
                .map(|s| s.to_lowercase().contains(&needle))
                .unwrap_or(false);
            if !name_hit && !short_hit {
                return false;
            }
        }
        true
    }

    /// Apply to a list.
    pub fn apply<'a>(&self, partners: &'a [Partner]) -> Vec<&'a Partner> {
        partners.iter().filter(|p| self.matches(p)).collect()
    }
}

/// Agreement list filters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgreementFilters {
    pub agreement_type: Option<AgreementType>,
    pub status: Option<AgreementStatus>,
    pub partner_name: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub special_conditions_pca: Option<bool>,
    /// Matches the reference number, case-insensitive.
    pub search: Option<String>,
}

impl AgreementFilters {
    pub fn matches(&self, agreement: &Agreement, partner: &Partner) -> bool {
        if let Some(t) = self.agreement_type {
            if agreement.agreement_type != t {
                return false;
            }
        }
        if let Some(s) = self.status {
            if agreement.status != s {
                return false;
            }
        }
        if let Some(name) = &self.partner_name {
            if !partner
                .name
                .to_lowercase()
                .contains(&name.to_lowercase())
            {
                return false;
            }
        }
        if let Some(start) = self.start {
            match agreement.start {
                Some(date) if date >= start => {}
                _ => return false,
            }
        }
        if let Some(end) = self.end {
            match agreement.end {
                Some(date) if date <= end => {}
                _ => return false,
            }
        }
        if let Some(special) = self.special_conditions_pca {
            if agreement.special_conditions_pca != special {
                return false;
            }
        }
        if let Some(search) = &self.search {
            if !agreement
                .reference_number
                .to_lowercase()
                .contains(&search.to_lowercase())
            {
                return false;
            }
        }
        true
    }
}

/// Intervention list filters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InterventionFilters {
    pub document_type: Option<DocumentType>,
    pub status: Option<InterventionStatus>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub sections: Vec<SectionId>,
    pub country_programmes: Vec<CountryProgrammeId>,
    pub partners: Vec<PartnerId>,
    pub contingency_pd: Option<bool>,
    /// Matches title and reference number, case-insensitive.
    pub search: Option<String>,
}

impl InterventionFilters {
    pub fn matches(&self, intervention: &Intervention, agreement: &Agreement) -> bool {
        if let Some(t) = self.document_type {
            if intervention.document_type != t {
                return false;
            }
        }
        if let Some(s) = self.status {
            if intervention.status != s {
                return false;
            }
        }
        if let Some(start) = self.start {
            match intervention.start {
                Some(date) if date >= start => {}
                _ => return false,
            }
        }
        if let Some(end) = self.end {
            match intervention.end {
                Some(date) if date <= end => {}
                _ => return false,
            }
        }
        if !self.sections.is_empty()
            && !self
                .sections
                .iter()
                .any(|s| intervention.sections.contains(s))
        {
            return false;
        }
        if !self.country_programmes.is_empty()
            && !self
                .country_programmes
                .iter()
                .any(|cp| intervention.country_programmes.contains(cp))
        {
            return false;
        }
        if !self.partners.is_empty() && !self.partners.contains(&agreement.partner_id) {
            return false;
        }
        if let Some(contingency) = self.contingency_pd {
            if intervention.contingency_pd != contingency {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !intervention.title.to_lowercase().contains(&needle)
                && !intervention.number.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

/// Intervention detail response: the document plus the caller's
/// per-field permissions.
#[derive(Debug, Clone, Serialize)]
pub struct InterventionDetail {
    #[serde(flatten)]
    pub intervention: Intervention,
    pub permissions: BTreeMap<&'static str, FieldPermission>,
}

/// Build the detail response for one caller.
pub fn intervention_detail(intervention: Intervention, roles: &[Role]) -> InterventionDetail {
    let permissions = permissions_block(&intervention, roles);
    InterventionDetail {
        intervention,
        permissions,
    }
}

/// Deletion rule: partners with any signed agreement, completed visit, or
/// cash movement are permanent.
pub fn partner_delete_allowed(
    partner: &Partner,
    agreements: &[Agreement],
    completed_visits: usize,
) -> Result<(), ApiError> {
    let mut reasons = Vec::new();
    if agreements
        .iter()
        .any(|a| a.partner_id == partner.id && a.status != AgreementStatus::Draft)
    {
        reasons.push("the partner has a signed agreement".to_string());
    }
    if completed_visits > 0 {
        reasons.push("the partner has completed monitoring activity".to_string());
    }
    if !partner.total_ct_cp.is_zero() {
        reasons.push("the partner has cash transfers in the current programme".to_string());
    }

    if reasons.is_empty() {
        Ok(())
    } else {
        let mut fields = BTreeMap::new();
        fields.insert("non_field_errors".to_string(), reasons);
        Err(ApiError {
            status: status::BAD_REQUEST,
            body: ErrorBody::Fields(fields),
        })
    }
}

/// Deletion rule: only draft agreements can be deleted.
pub fn agreement_delete_allowed(agreement: &Agreement) -> Result<(), ApiError> {
    if agreement.status == AgreementStatus::Draft {
        Ok(())
    } else {
        Err(ApiError {
            status: status::BAD_REQUEST,
            body: ErrorBody::Detail {
                detail: "only draft agreements can be deleted".into(),
            },
        })
    }
}

/// Deletion rule: only draft interventions can be deleted.
pub fn intervention_delete_allowed(intervention: &Intervention) -> Result<(), ApiError> {
    if intervention.status == InterventionStatus::Draft {
        Ok(())
    } else {
        Err(ApiError {
            status: status::BAD_REQUEST,
            body: ErrorBody::Detail {
                detail: "only draft documents can be deleted".into(),
            },
        })
    }
}
