//! core::permissions
//!
//! The per-field, per-status, per-role permission matrix.
//!
//! Permission resolution is a pure function of `(status, roles, field,
//! action)` plus the document's court/lock flags. The field registry is a
//! static table; callers either ask about one field ([`permitted`]) or
//! materialize the whole block for an API response
//! ([`permissions_block`]).
//!
//! # Rules
//!
//! - While `unicef_court` is set, partner-side roles cannot edit; when the
//!   document is with the partner, UNICEF-side edits are off except for
//!   Partnership Managers, who can always move the document itself.
//! - Once either side has accepted (`locked`), the frozen fields
//!   (document type, currency, cash transfer modalities) cannot change.
//! - In development statuses the document is broadly editable by its
//!   side; after signature only the operational fields (funds
//!   reservations, attachments, planned visits) stay open.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::intervention::{Intervention, InterventionStatus};

/// Caller roles recognized by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    PartnershipManager,
    UnicefUser,
    UnicefFocalPoint,
    PartnerFocalPoint,
    PartnerAuthorizedOfficer,
}

impl Role {
    pub fn is_unicef(&self) -> bool {
        matches!(
            self,
            Role::PartnershipManager | Role::UnicefUser | Role::UnicefFocalPoint
        )
    }

    pub fn is_partner(&self) -> bool {
        !self.is_unicef()
    }
}

/// What the caller wants to do with a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Edit,
    View,
    Required,
}

/// Field names used by the matrix and the API permissions block.
pub mod fields {
    pub const TITLE: &str = "title";
    pub const DOCUMENT_TYPE: &str = "document_type";
    pub const START: &str = "start";
    pub const END: &str = "end";
    pub const AGREEMENT: &str = "agreement";
    pub const COUNTRY_PROGRAMMES: &str = "country_programmes";
    pub const SECTIONS: &str = "sections";
    pub const OFFICES: &str = "offices";
    pub const FLAT_LOCATIONS: &str = "flat_locations";
    pub const UNICEF_FOCAL_POINTS: &str = "unicef_focal_points";
    pub const PARTNER_FOCAL_POINTS: &str = "partner_focal_points";
    pub const RESULT_LINKS: &str = "result_links";
    pub const PLANNED_BUDGET: &str = "planned_budget";
    pub const SUPPLY_ITEMS: &str = "supply_items";
    pub const PLANNED_VISITS: &str = "planned_visits";
    pub const REPORTING_REQUIREMENTS: &str = "reporting_requirements";
    pub const CASH_TRANSFER_MODALITIES: &str = "cash_transfer_modalities";
    pub const DOCUMENT_CURRENCY: &str = "document_currency";
    pub const RISK_ITEMS: &str = "risk_items";
    pub const SUBMISSION_DATE: &str = "submission_date";
    pub const SUBMISSION_DATE_PRC: &str = "submission_date_prc";
    pub const REVIEW_DATE_PRC: &str = "review_date_prc";
    pub const PRC_REVIEW_ATTACHMENT: &str = "prc_review_attachment";
    pub const SIGNED_BY_UNICEF_DATE: &str = "signed_by_unicef_date";
    pub const SIGNED_BY_PARTNER_DATE: &str = "signed_by_partner_date";
    pub const UNICEF_SIGNATORY: &str = "unicef_signatory";
    pub const PARTNER_AUTHORIZED_OFFICER_SIGNATORY: &str =
        "partner_authorized_officer_signatory";
    pub const SIGNED_PD_ATTACHMENT: &str = "signed_pd_attachment";
    pub const FRS: &str = "frs";
    pub const ATTACHMENTS: &str = "attachments";
    pub const CANCEL_JUSTIFICATION: &str = "cancel_justification";
}

/// Which side of the document a field belongs to, for court resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldSide {
    /// UNICEF-entered planning data.
    Unicef,
    /// Partner-entered data.
    Partner,
    /// Either side edits while it holds the pen.
    Shared,
    /// Post-signature operational data (UNICEF only, stays open).
    Operational,
}

/// One field registry row.
struct FieldSpec {
    name: &'static str,
    side: FieldSide,
    /// Frozen once either side accepts.
    frozen_when_locked: bool,
    /// Hidden from partner-side roles entirely.
    unicef_internal: bool,
    /// Required before the document can leave draft.
    required_for_review: bool,
}

const fn spec(
    name: &'static str,
    side: FieldSide,
    frozen_when_locked: bool,
    unicef_internal: bool,
    required_for_review: bool,
) -> FieldSpec {
    FieldSpec {
        name,
        side,
        frozen_when_locked,
        unicef_internal,
        required_for_review,
    }
}

/// The static field registry, loaded once per process.
static FIELDS: &[FieldSpec] = &[
    spec(fields::TITLE, FieldSide::Shared, false, false, true),
    spec(fields::DOCUMENT_TYPE, FieldSide::Unicef, true, false, true),
    spec(fields::START, FieldSide::Shared, false, false, true),
    spec(fields::END, FieldSide::Shared, false, false, true),
    spec(fields::AGREEMENT, FieldSide::Unicef, false, false, true),
    spec(fields::COUNTRY_PROGRAMMES, FieldSide::Unicef, false, false, false),
    spec(fields::SECTIONS, FieldSide::Unicef, false, false, true),
    spec(fields::OFFICES, FieldSide::Unicef, false, false, true),
    spec(fields::FLAT_LOCATIONS, FieldSide::Unicef, false, false, false),
    spec(fields::UNICEF_FOCAL_POINTS, FieldSide::Operational, false, false, true),
    spec(fields::PARTNER_FOCAL_POINTS, FieldSide::Operational, false, false, true),
    spec(fields::RESULT_LINKS, FieldSide::Shared, false, false, true),
    spec(fields::PLANNED_BUDGET, FieldSide::Shared, false, false, true),
    spec(fields::SUPPLY_ITEMS, FieldSide::Shared, false, false, false),
    spec(fields::PLANNED_VISITS, FieldSide::Operational, false, false, false),
    spec(fields::REPORTING_REQUIREMENTS, FieldSide::Unicef, false, false, false),
    spec(fields::CASH_TRANSFER_MODALITIES, FieldSide::Unicef, true, false, false),
    spec(fields::DOCUMENT_CURRENCY, FieldSide::Unicef, true, false, false),
    spec(fields::RISK_ITEMS, FieldSide::Shared, false, false, false),
    spec(fields::SUBMISSION_DATE, FieldSide::Unicef, false, false, false),
    spec(fields::SUBMISSION_DATE_PRC, FieldSide::Unicef, false, true, false),
    spec(fields::REVIEW_DATE_PRC, FieldSide::Unicef, false, true, false),
    spec(fields::PRC_REVIEW_ATTACHMENT, FieldSide::Unicef, false, true, false),
    spec(fields::SIGNED_BY_UNICEF_DATE, FieldSide::Unicef, false, false, false),
    spec(fields::SIGNED_BY_PARTNER_DATE, FieldSide::Unicef, false, false, false),
    spec(fields::UNICEF_SIGNATORY, FieldSide::Unicef, false, false, false),
    spec(
        fields::PARTNER_AUTHORIZED_OFFICER_SIGNATORY,
        FieldSide::Unicef,
        false,
        false,
        false,
    ),
    spec(fields::SIGNED_PD_ATTACHMENT, FieldSide::Unicef, false, false, false),
    spec(fields::FRS, FieldSide::Operational, false, false, false),
    spec(fields::ATTACHMENTS, FieldSide::Operational, false, false, false),
    spec(fields::CANCEL_JUSTIFICATION, FieldSide::Unicef, false, false, false),
];

fn field_spec(field: &str) -> Option<&'static FieldSpec> {
    FIELDS.iter().find(|f| f.name == field)
}

/// Per-field booleans for one caller, as exposed by the API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPermission {
    pub edit: bool,
    pub view: bool,
    pub required: bool,
}

fn any_unicef(roles: &[Role]) -> bool {
    roles.iter().any(Role::is_unicef)
}

fn any_partner(roles: &[Role]) -> bool {
    roles.iter().any(Role::is_partner)
}

fn is_partnership_manager(roles: &[Role]) -> bool {
    roles.contains(&Role::PartnershipManager)
}

/// Resolve one field permission.
///
/// The document's own flags (status, court, lock, in-amendment) are read
/// from the intervention; the caller supplies their role set.
pub fn permitted(
    intervention: &Intervention,
    roles: &[Role],
    field: &str,
    action: Action,
) -> bool {
    let Some(spec) = field_spec(field) else {
        return false;
    };

    match action {
        Action::View => {
            if spec.unicef_internal {
                any_unicef(roles)
            } else {
                !roles.is_empty()
            }
        }
        Action::Required => spec.required_for_review,
        Action::Edit => edit_permitted(intervention, roles, spec),
    }
}

fn edit_permitted(intervention: &Intervention, roles: &[Role], spec: &FieldSpec) -> bool {
    if spec.frozen_when_locked && intervention.locked() {
        return false;
    }

    // Amendments reopen a draft shadow; the original never regains its
    // planning fields in place.
    let editable_in_status = match intervention.status {
        status if status.is_development() => true,
        // Operational fields stay open on live documents.
        InterventionStatus::Signed | InterventionStatus::Active => {
            spec.side == FieldSide::Operational
        }
        // Suspended and terminal documents are read-only.
        _ => false,
    };
    if !editable_in_status {
        return false;
    }

    match spec.side {
        FieldSide::Operational => any_unicef(roles),
        FieldSide::Unicef => any_unicef(roles) && intervention.unicef_court,
        FieldSide::Partner => any_partner(roles) && !intervention.unicef_court,
        FieldSide::Shared => {
            if intervention.unicef_court {
                any_unicef(roles)
            } else {
                any_partner(roles) || is_partnership_manager(roles)
            }
        }
    }
}

/// Materialize the whole permission block for one caller.
///
/// The API includes this on intervention detail responses so clients can
/// drive form state without re-deriving the matrix.
pub fn permissions_block(
    intervention: &Intervention,
    roles: &[Role],
) -> BTreeMap<&'static str, FieldPermission> {
    FIELDS
        .iter()
        .map(|spec| {
            (
                spec.name,
                FieldPermission {
                    edit: permitted(intervention, roles, spec.name, Action::Edit),
                    view: permitted(intervention, roles, spec.name, Action::View),
                    required: permitted(intervention, roles, spec.name, Action::Required),
                },
            )
        })
        .collect()
}

/// Fields required before a draft can move to review.
pub fn required_for_review() -> impl Iterator<Item = &'static str> {
    FIELDS
        .iter()
        .filter(|f| f.required_for_review)
        .map(|f| f.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::intervention::DocumentType;
    use crate::core::types::AgreementId;

    fn draft() -> Intervention {
        Intervention::new(
            AgreementId::new(),
            DocumentType::Pd,
            "Emergency WASH",
            "LEB/PCA202401/TempRef:1".to_string(),
            "USD",
        )
    }

    const PM: &[Role] = &[Role::PartnershipManager];
    const FOCAL: &[Role] = &[Role::UnicefFocalPoint];
    const PARTNER: &[Role] = &[Role::PartnerFocalPoint];

    mod edit {
        use super::*;

        #[test]
        fn draft_editable_by_unicef_while_in_court() {
            let i = draft();
            assert!(permitted(&i, PM, fields::TITLE, Action::Edit));
            assert!(permitted(&i, FOCAL, fields::RESULT_LINKS, Action::Edit));
        }

        #[test]
        fn partner_cannot_edit_while_unicef_court() {
            let i = draft();
            assert!(!permitted(&i, PARTNER, fields::TITLE, Action::Edit));
        }

        #[test]
        fn partner_edits_after_send() {
            let mut i = draft();
            i.unicef_court = false;
            assert!(permitted(&i, PARTNER, fields::TITLE, Action::Edit));
            assert!(!permitted(&i, FOCAL, fields::TITLE, Action::Edit));
        }

        #[test]
        fn locked_fields_frozen() {
            let mut i = draft();
            i.unicef_accepted = true;
            assert!(!permitted(&i, PM, fields::DOCUMENT_TYPE, Action::Edit));
            assert!(!permitted(&i, PM, fields::DOCUMENT_CURRENCY, Action::Edit));
            assert!(!permitted(
                &i,
                PM,
                fields::CASH_TRANSFER_MODALITIES,
                Action::Edit
            ));
            // Non-frozen fields remain editable.
            assert!(permitted(&i, PM, fields::TITLE, Action::Edit));
        }

        #[test]
        fn active_document_is_mostly_frozen() {
            let mut i = draft();
            i.status = InterventionStatus::Active;
            assert!(!permitted(&i, PM, fields::TITLE, Action::Edit));
            assert!(!permitted(&i, PM, fields::RESULT_LINKS, Action::Edit));
            // Operational fields stay open.
            assert!(permitted(&i, PM, fields::FRS, Action::Edit));
            assert!(permitted(&i, PM, fields::ATTACHMENTS, Action::Edit));
        }

        #[test]
        fn suspended_document_read_only() {
            let mut i = draft();
            i.status = InterventionStatus::Suspended;
            assert!(!permitted(&i, PM, fields::FRS, Action::Edit));
            assert!(!permitted(&i, PM, fields::TITLE, Action::Edit));
        }

        #[test]
        fn amendment_shadow_is_editable() {
            let mut i = draft();
            i.status = InterventionStatus::Draft;
            i.in_amendment = true;
            assert!(permitted(&i, PM, fields::RESULT_LINKS, Action::Edit));
        }

        #[test]
        fn unknown_field_denied() {
            let i = draft();
            assert!(!permitted(&i, PM, "no_such_field", Action::Edit));
        }
    }

    mod view {
        use super::*;

        #[test]
        fn partner_sees_regular_fields() {
            let i = draft();
            assert!(permitted(&i, PARTNER, fields::TITLE, Action::View));
            assert!(permitted(&i, PARTNER, fields::PLANNED_BUDGET, Action::View));
        }

        #[test]
        fn partner_cannot_see_prc_internals() {
            let i = draft();
            assert!(!permitted(&i, PARTNER, fields::REVIEW_DATE_PRC, Action::View));
            assert!(!permitted(
                &i,
                PARTNER,
                fields::PRC_REVIEW_ATTACHMENT,
                Action::View
            ));
            assert!(permitted(&i, FOCAL, fields::REVIEW_DATE_PRC, Action::View));
        }
    }

    mod block {
        use super::*;

        #[test]
        fn block_covers_all_fields() {
            let i = draft();
            let block = permissions_block(&i, PM);
            assert_eq!(block.len(), FIELDS.len());
            assert!(block[fields::TITLE].edit);
            assert!(block[fields::TITLE].view);
            assert!(block[fields::TITLE].required);
        }

        #[test]
        fn required_set_matches_registry() {
            let required: Vec<_> = required_for_review().collect();
            assert!(required.contains(&fields::TITLE));
            assert!(required.contains(&fields::SECTIONS));
            assert!(!required.contains(&fields::FRS));
        }
    }
}
