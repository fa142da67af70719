//! sync::document
//!
//! The wire format uploaded to the downstream planning/reporting system.
//!
//! The document is a flattened, self-contained view of an intervention:
//! reference numbers, vendor number, dates, signatories, the result tree
//! with codes (activity names carry their code prefix), budget totals,
//! reporting windows, and focal-point emails. A SHA-256 fingerprint over
//! the serialized form lets the outbox skip re-uploads of identical
//! content.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::agreement::Agreement;
use crate::core::intervention::Intervention;
use crate::core::partner::Partner;

use super::SyncError;

/// One activity line on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireActivity {
    /// Activity name prefixed with its code (`"1.1.2 Distribute kits"`).
    pub name: String,
    pub unicef_cash: i64,
    pub cso_cash: i64,
    pub is_active: bool,
}

/// One programme output on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireLowerResult {
    pub code: Option<String>,
    pub name: String,
    pub activities: Vec<WireActivity>,
}

/// One result link on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireResultLink {
    pub code: Option<String>,
    pub cp_output: Option<String>,
    pub lower_results: Vec<WireLowerResult>,
}

/// Budget totals on the wire, in minor units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireBudget {
    pub currency: String,
    pub unicef_cash_local: i64,
    pub in_kind_amount_local: i64,
    pub partner_contribution_local: i64,
    pub total_local: i64,
}

/// One reporting window on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireReportingWindow {
    pub report_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub due_date: NaiveDate,
}

/// The uploaded document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionDocument {
    pub business_area_code: String,
    pub number: String,
    pub title: String,
    pub status: String,
    pub document_type: String,
    pub agreement_reference: String,
    pub partner_vendor_number: String,
    pub partner_name: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub signed_by_unicef_date: Option<NaiveDate>,
    pub signed_by_partner_date: Option<NaiveDate>,
    pub unicef_focal_points: Vec<String>,
    pub partner_focal_points: Vec<String>,
    pub result_links: Vec<WireResultLink>,
    pub budget: WireBudget,
    pub reporting_windows: Vec<WireReportingWindow>,
}

impl InterventionDocument {
    /// Content fingerprint over the canonical JSON serialization.
    pub fn fingerprint(&self) -> Result<String, SyncError> {
        let json =
            serde_json::to_vec(self).map_err(|e| SyncError::Serialize(e.to_string()))?;
        let mut hasher = Sha256::new();
        hasher.update(&json);
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Flatten an intervention and its related entities into the wire shape.
pub fn build_document(
    intervention: &Intervention,
    agreement: &Agreement,
    partner: &Partner,
    business_area_code: &str,
) -> InterventionDocument {
    let result_links = intervention
        .result_links
        .iter()
        .map(|link| WireResultLink {
            code: link.code.clone(),
            cp_output: link.cp_output.clone(),
            lower_results: link
                .lower_results
                .iter()
                .map(|lower| WireLowerResult {
                    code: lower.code.clone(),
                    name: lower.name.clone(),
                    activities: lower
                        .activities
                        .iter()
                        .map(|activity| WireActivity {
                            name: match &activity.code {
                                Some(code) => format!("{} {}", code, activity.name),
                                None => activity.name.clone(),
                            },
                            unicef_cash: activity.unicef_cash.minor_units(),
                            cso_cash: activity.cso_cash.minor_units(),
                            is_active: activity.is_active,
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();

    let partner_focal_points = intervention
        .partner_focal_points
        .iter()
        .filter_map(|staff_id| partner.staff_member(*staff_id))
        .map(|staff| staff.email.clone())
        .collect();

    InterventionDocument {
        business_area_code: business_area_code.to_string(),
        number: intervention.number.clone(),
        title: intervention.title.clone(),
        status: intervention.status.to_string(),
        document_type: intervention.document_type.to_string(),
        agreement_reference: agreement.reference_number.clone(),
        partner_vendor_number: partner.vendor_number.to_string(),
        partner_name: partner.name.clone(),
        start_date: intervention.start,
        end_date: intervention.end,
        signed_by_unicef_date: intervention.signed_by_unicef_date,
        signed_by_partner_date: intervention.signed_by_partner_date,
        unicef_focal_points: intervention
            .unicef_focal_points
            .iter()
            .map(|u| u.email.clone())
            .collect(),
        partner_focal_points,
        result_links,
        budget: WireBudget {
            currency: intervention.planned_budget.currency.clone(),
            unicef_cash_local: intervention.planned_budget.unicef_cash_local.minor_units(),
            in_kind_amount_local: intervention
                .planned_budget
                .in_kind_amount_local
                .minor_units(),
            partner_contribution_local: intervention
                .planned_budget
                .total_partner_contribution_local
                .minor_units(),
            total_local: intervention.planned_budget.total_local.minor_units(),
        },
        reporting_windows: intervention
            .reporting_requirements
            .iter()
            .map(|window| WireReportingWindow {
                report_type: window.report_type.to_string(),
                start_date: window.start_date,
                end_date: window.end_date,
                due_date: window.due_date,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::agreement::AgreementType;
    use crate::core::intervention::{DocumentType, UserRef};
    use crate::core::partner::{PartnerType, StaffMember};
    use crate::core::results::{Activity, LowerResult, ResultLink};
    use crate::core::types::{Money, VendorNumber};

    fn entities() -> (Intervention, Agreement, Partner) {
        let mut partner = Partner::new(
            VendorNumber::new("2500212391").unwrap(),
            "Relief Works",
            PartnerType::CivilSocietyOrganization,
        );
        let staff = StaffMember::new("Amal", "Haddad", "amal@reliefworks.org");
        let staff_id = staff.id;
        partner.staff_members.push(staff);

        let agreement =
            Agreement::new(partner.id, AgreementType::Pca, "LEB/PCA202401".into());

        let mut intervention = Intervention::new(
            agreement.id,
            DocumentType::Pd,
            "Emergency WASH",
            "LEB/PCA202401/PD202401".into(),
            "USD",
        );
        intervention
            .unicef_focal_points
            .push(UserRef::new("focal@unicef.org"));
        intervention.partner_focal_points.push(staff_id);

        let mut link = ResultLink::new(Some("CP-1".into()));
        let mut lower = LowerResult::new("Improved access");
        let mut activity = Activity::new("Distribute kits");
        activity.unicef_cash = Money::from_major(1000);
        lower.activities.push(activity);
        link.lower_results.push(lower);
        intervention.result_links.push(link);
        crate::core::results::renumber(&mut intervention.result_links);

        (intervention, agreement, partner)
    }

    #[test]
    fn activity_names_carry_code_prefix() {
        let (intervention, agreement, partner) = entities();
        let document = build_document(&intervention, &agreement, &partner, "0060");
        assert_eq!(
            document.result_links[0].lower_results[0].activities[0].name,
            "1.1.1 Distribute kits"
        );
    }

    #[test]
    fn focal_point_emails_resolved() {
        let (intervention, agreement, partner) = entities();
        let document = build_document(&intervention, &agreement, &partner, "0060");
        assert_eq!(document.unicef_focal_points, vec!["focal@unicef.org"]);
        assert_eq!(document.partner_focal_points, vec!["amal@reliefworks.org"]);
    }

    #[test]
    fn carries_references_and_vendor_number() {
        let (intervention, agreement, partner) = entities();
        let document = build_document(&intervention, &agreement, &partner, "0060");
        assert_eq!(document.number, "LEB/PCA202401/PD202401");
        assert_eq!(document.agreement_reference, "LEB/PCA202401");
        assert_eq!(document.partner_vendor_number, "2500212391");
        assert_eq!(document.business_area_code, "0060");
    }

    #[test]
    fn fingerprint_is_stable_and_content_sensitive() {
        let (intervention, agreement, partner) = entities();
        let a = build_document(&intervention, &agreement, &partner, "0060");
        let b = build_document(&intervention, &agreement, &partner, "0060");
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());

        let mut changed = intervention.clone();
        changed.title = "Renamed".into();
        let c = build_document(&changed, &agreement, &partner, "0060");
        assert_ne!(a.fingerprint().unwrap(), c.fingerprint().unwrap());
    }
}
