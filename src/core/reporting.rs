//! core::reporting
//!
//! Reporting requirement windows.
//!
//! Each intervention carries sets of report windows keyed by report type.
//! The planner replaces the whole set for one type atomically; validation
//! rejects malformed or overlapping windows. Status-dependent mutation
//! rules (draft-or-amendment only, contingency first write) are enforced
//! by the engine, which owns the intervention status.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::types::ReportingRequirementId;

/// Report types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportType {
    /// Quarterly progress report.
    Qpr,
    /// High-frequency/humanitarian report.
    Hr,
    /// Special report.
    Spr,
    /// Survey report.
    Sr,
}

impl std::fmt::Display for ReportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReportType::Qpr => "QPR",
            ReportType::Hr => "HR",
            ReportType::Spr => "SPR",
            ReportType::Sr => "SR",
        };
        write!(f, "{}", s)
    }
}

/// One reporting window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportingRequirement {
    pub id: ReportingRequirementId,
    pub report_type: ReportType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub due_date: NaiveDate,
}

impl ReportingRequirement {
    pub fn new(
        report_type: ReportType,
        start_date: NaiveDate,
        end_date: NaiveDate,
        due_date: NaiveDate,
    ) -> Self {
        Self {
            id: ReportingRequirementId::new(),
            report_type,
            start_date,
            end_date,
            due_date,
        }
    }

    /// Closed-interval overlap on `[start_date, end_date]`.
    pub fn overlaps(&self, other: &ReportingRequirement) -> bool {
        self.start_date <= other.end_date && other.start_date <= self.end_date
    }
}

/// Validate a replacement window set for one report type.
///
/// # Errors
///
/// Returns all violations: window ordering (`start <= end <= due`),
/// type mismatches against `report_type`, and pairwise overlaps.
pub fn validate_windows(
    report_type: ReportType,
    windows: &[ReportingRequirement],
) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    for window in windows {
        if window.report_type != report_type {
            errors.push(format!(
                "window {} has type {}, expected {}",
                window.id, window.report_type, report_type
            ));
        }
        if window.start_date > window.end_date {
            errors.push(format!(
                "window {}: start date is after end date",
                window.id
            ));
        }
        if window.end_date > window.due_date {
            errors.push(format!("window {}: due date precedes end date", window.id));
        }
    }

    for (i, a) in windows.iter().enumerate() {
        for b in windows.iter().skip(i + 1) {
            if a.overlaps(b) {
                errors.push("Reporting windows overlap".to_string());
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        errors.dedup();
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn qpr(start: NaiveDate, end: NaiveDate, due: NaiveDate) -> ReportingRequirement {
        ReportingRequirement::new(ReportType::Qpr, start, end, due)
    }

    #[test]
    fn ordered_disjoint_windows_pass() {
        let windows = vec![
            qpr(date(2024, 1, 1), date(2024, 3, 31), date(2024, 4, 15)),
            qpr(date(2024, 4, 1), date(2024, 6, 30), date(2024, 7, 15)),
        ];
        assert!(validate_windows(ReportType::Qpr, &windows).is_ok());
    }

    #[test]
    fn start_after_end_rejected() {
        let windows = vec![qpr(date(2024, 4, 1), date(2024, 3, 1), date(2024, 5, 1))];
        let errors = validate_windows(ReportType::Qpr, &windows).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("start date is after")));
    }

    #[test]
    fn due_before_end_rejected() {
        let windows = vec![qpr(date(2024, 1, 1), date(2024, 3, 31), date(2024, 3, 1))];
        let errors = validate_windows(ReportType::Qpr, &windows).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("due date precedes")));
    }

    #[test]
    fn overlapping_windows_rejected() {
        let windows = vec![
            qpr(date(2024, 1, 1), date(2024, 3, 31), date(2024, 4, 15)),
            qpr(date(2024, 3, 15), date(2024, 4, 30), date(2024, 5, 15)),
        ];
        let errors = validate_windows(ReportType::Qpr, &windows).unwrap_err();
        assert_eq!(errors, vec!["Reporting windows overlap".to_string()]);
    }

    #[test]
    fn touching_endpoints_overlap() {
        // Closed intervals: a shared boundary day is an overlap.
        let windows = vec![
            qpr(date(2024, 1, 1), date(2024, 3, 31), date(2024, 4, 15)),
            qpr(date(2024, 3, 31), date(2024, 6, 30), date(2024, 7, 15)),
        ];
        assert!(validate_windows(ReportType::Qpr, &windows).is_err());
    }

    #[test]
    fn type_mismatch_rejected() {
        let windows = vec![ReportingRequirement::new(
            ReportType::Hr,
            date(2024, 1, 1),
            date(2024, 1, 31),
            date(2024, 2, 15),
        )];
        let errors = validate_windows(ReportType::Qpr, &windows).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("expected QPR")));
    }

    #[test]
    fn single_day_windows_are_fine() {
        let windows = vec![
            qpr(date(2024, 1, 1), date(2024, 1, 1), date(2024, 1, 2)),
            qpr(date(2024, 1, 2), date(2024, 1, 2), date(2024, 1, 3)),
        ];
        assert!(validate_windows(ReportType::Qpr, &windows).is_ok());
    }
}
