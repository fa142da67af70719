//! core::refnum
//!
//! Deterministic reference-number construction.
//!
//! # Formats
//!
//! - Agreement: `<tenant>/<type><year><NN>` (e.g. `LEB/PCA202401`)
//! - Intervention: `<agreement-ref>/<doc-type><year><NN>` (e.g.
//!   `LEB/PCA202401/PD202403`)
//! - Draft interventions carry a placeholder `<agreement-ref>/TempRef:<n>`
//!   until their first transition out of draft/cancelled.
//! - A merged amendment appends `-<NN>` to the base reference.
//!
//! # Invariants
//!
//! - Sequence parts are two digits, one-based, and grow past 99 naturally.
//! - The base reference (everything before the amendment suffix) never
//!   changes once the document has left draft.
//! - Sequence allocation itself is serialized by the store's sequence
//!   locks; this module only formats the allocated values.

use crate::core::agreement::AgreementType;
use crate::core::intervention::DocumentType;
use crate::core::types::{FiscalYear, TenantCode};

/// Marker embedded in placeholder references.
const TEMP_REF_MARKER: &str = "TempRef:";

/// Build an agreement reference number.
///
/// # Example
///
/// ```
/// use pactwork::core::refnum;
/// use pactwork::core::agreement::AgreementType;
/// use pactwork::core::types::{FiscalYear, TenantCode};
///
/// let tenant = TenantCode::new("LEB").unwrap();
/// let year = FiscalYear::new(2024).unwrap();
/// let reference = refnum::agreement_reference(&tenant, AgreementType::Pca, year, 1);
/// assert_eq!(reference, "LEB/PCA202401");
/// ```
pub fn agreement_reference(
    tenant: &TenantCode,
    agreement_type: AgreementType,
    year: FiscalYear,
    sequence: u64,
) -> String {
    format!("{}/{}{}{:02}", tenant, agreement_type.code(), year, sequence)
}

/// Build an intervention reference number from its agreement's base
/// reference.
///
/// # Example
///
/// ```
/// use pactwork::core::refnum;
/// use pactwork::core::intervention::DocumentType;
/// use pactwork::core::types::FiscalYear;
///
/// let year = FiscalYear::new(2024).unwrap();
/// let reference = refnum::intervention_reference("LEB/PCA202401", DocumentType::Pd, year, 3);
/// assert_eq!(reference, "LEB/PCA202401/PD202403");
/// ```
pub fn intervention_reference(
    agreement_reference: &str,
    document_type: DocumentType,
    year: FiscalYear,
    sequence: u64,
) -> String {
    format!(
        "{}/{}{}{:02}",
        base_reference(agreement_reference),
        document_type.code(),
        year,
        sequence
    )
}

/// Build a placeholder reference for a draft intervention.
pub fn temp_reference(agreement_reference: &str, temp_id: u64) -> String {
    format!(
        "{}/{}{}",
        base_reference(agreement_reference),
        TEMP_REF_MARKER,
        temp_id
    )
}

/// Check whether a reference is still a draft placeholder.
pub fn is_temp(reference: &str) -> bool {
    reference.contains(TEMP_REF_MARKER)
}

/// Append the amendment suffix for the Nth merged amendment.
///
/// Any existing suffix is replaced, so re-suffixing after each merge is
/// safe.
///
/// # Example
///
/// ```
/// use pactwork::core::refnum;
///
/// assert_eq!(
///     refnum::with_amendment_suffix("LEB/PCA202401/PD202403", 1),
///     "LEB/PCA202401/PD202403-01"
/// );
/// assert_eq!(
///     refnum::with_amendment_suffix("LEB/PCA202401/PD202403-01", 2),
///     "LEB/PCA202401/PD202403-02"
/// );
/// ```
pub fn with_amendment_suffix(reference: &str, merged_count: u64) -> String {
    format!("{}-{:02}", base_reference(reference), merged_count)
}

/// Strip the amendment suffix, returning the stable base reference.
pub fn base_reference(reference: &str) -> &str {
    // The suffix is "-NN" on the last path segment; segments themselves
    // never contain '-' in any generated format.
    match reference.rsplit_once('-') {
        Some((base, suffix)) if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) => {
            base
        }
        _ => reference,
    }
}

/// Format an amendment number for its kind and per-parent sequence.
///
/// Normal amendments are numbered `amd/N`, contingency amendments
/// `camd/N`; the two sequences advance independently.
pub fn amendment_number(contingency: bool, sequence: u64) -> String {
    if contingency {
        format!("camd/{}", sequence)
    } else {
        format!("amd/{}", sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantCode {
        TenantCode::new("LEB").unwrap()
    }

    fn year() -> FiscalYear {
        FiscalYear::new(2024).unwrap()
    }

    mod agreement_numbers {
        use super::*;

        #[test]
        fn format_matches_contract() {
            assert_eq!(
                agreement_reference(&tenant(), AgreementType::Pca, year(), 1),
                "LEB/PCA202401"
            );
            assert_eq!(
                agreement_reference(&tenant(), AgreementType::Ssfa, year(), 12),
                "LEB/SSFA202412"
            );
        }

        #[test]
        fn sequence_grows_past_two_digits() {
            assert_eq!(
                agreement_reference(&tenant(), AgreementType::Mou, year(), 103),
                "LEB/MOU2024103"
            );
        }
    }

    mod intervention_numbers {
        use super::*;

        #[test]
        fn derives_from_agreement_base() {
            assert_eq!(
                intervention_reference("LEB/PCA202401", DocumentType::Pd, year(), 1),
                "LEB/PCA202401/PD202401"
            );
        }

        #[test]
        fn strips_agreement_amendment_suffix() {
            assert_eq!(
                intervention_reference("LEB/PCA202401-02", DocumentType::Spd, year(), 4),
                "LEB/PCA202401/SPD202404"
            );
        }
    }

    mod temp_refs {
        use super::*;

        #[test]
        fn placeholder_format() {
            let reference = temp_reference("LEB/PCA202401", 42);
            assert_eq!(reference, "LEB/PCA202401/TempRef:42");
            assert!(is_temp(&reference));
        }

        #[test]
        fn canonical_is_not_temp() {
            assert!(!is_temp("LEB/PCA202401/PD202401"));
        }
    }

    mod amendment_suffixes {
        use super::*;

        #[test]
        fn appends_two_digit_suffix() {
            assert_eq!(
                with_amendment_suffix("LEB/PCA202401/PD202403", 1),
                "LEB/PCA202401/PD202403-01"
            );
        }

        #[test]
        fn replaces_existing_suffix() {
            assert_eq!(
                with_amendment_suffix("LEB/PCA202401/PD202403-01", 3),
                "LEB/PCA202401/PD202403-03"
            );
        }

        #[test]
        fn base_reference_without_suffix_is_identity() {
            assert_eq!(base_reference("LEB/PCA202401"), "LEB/PCA202401");
        }
    }

    mod amendment_numbers {
        use super::*;

        #[test]
        fn normal_and_contingency_prefixes() {
            assert_eq!(amendment_number(false, 1), "amd/1");
            assert_eq!(amendment_number(true, 2), "camd/2");
        }
    }
}
