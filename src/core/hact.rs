//! core::hact
//!
//! Typed schema for the per-partner assurance aggregate.
//!
//! The aggregate used to be a schemaless JSON bag on the partner row; here
//! it is a fixed nested structure written only through the aggregator. The
//! minimum-requirements table lives next to the schema so the aggregator
//! and its tests share one source of truth.
//!
//! # Shape
//!
//! ```json
//! {
//!   "assurance_coverage": "partial",
//!   "programmatic_visits": { "completed": { "q1": 0, ... , "total": 0 },
//!                            "minimum_requirements": 1 },
//!   "spot_checks": { "completed": { ... }, "minimum_requirements": 1 },
//!   "audits": { "completed": 0, "minimum_requirements": 0 },
//!   "outstanding_findings": 0
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::core::partner::RiskRating;
use crate::core::types::{Money, Quarter};

/// Cash-transfer thresholds of the minimum-requirements table.
pub const CT_LEVEL_1: i64 = 50_000;
pub const CT_LEVEL_2: i64 = 100_000;
pub const CT_LEVEL_3: i64 = 350_000;
/// Current-programme cash above which one audit is required.
pub const AUDIT_THRESHOLD: i64 = 500_000;
/// Age in days after which a micro assessment is considered expired.
pub const ASSESSMENT_EXPIRY_DAYS: i64 = 1642;

/// Per-quarter completed counts with a derived total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarterlyCounts {
    pub q1: u32,
    pub q2: u32,
    pub q3: u32,
    pub q4: u32,
    pub total: u32,
}

impl QuarterlyCounts {
    /// Increment a quarter bucket and the total.
    pub fn record(&mut self, quarter: Quarter) {
        match quarter {
            Quarter::Q1 => self.q1 += 1,
            Quarter::Q2 => self.q2 += 1,
            Quarter::Q3 => self.q3 += 1,
            Quarter::Q4 => self.q4 += 1,
        }
        self.total += 1;
    }

    /// Read a quarter bucket.
    pub fn get(&self, quarter: Quarter) -> u32 {
        match quarter {
            Quarter::Q1 => self.q1,
            Quarter::Q2 => self.q2,
            Quarter::Q3 => self.q3,
            Quarter::Q4 => self.q4,
        }
    }
}

/// Completed-versus-required counters for one assurance activity type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitCounters {
    pub completed: QuarterlyCounts,
    pub minimum_requirements: u32,
}

/// Audit counters (not bucketed by quarter).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditCounters {
    pub completed: u32,
    pub minimum_requirements: u32,
}

/// How much of the required assurance work has been completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssuranceCoverage {
    #[default]
    #[serde(rename = "none")]
    CoverageNone,
    #[serde(rename = "partial")]
    CoveragePartial,
    #[serde(rename = "complete")]
    CoverageComplete,
}

/// The per-partner assurance aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HactValues {
    pub assurance_coverage: AssuranceCoverage,
    pub programmatic_visits: VisitCounters,
    pub spot_checks: VisitCounters,
    pub audits: AuditCounters,
    pub outstanding_findings: u32,
}

impl HactValues {
    /// Derive the coverage banner from the counters.
    pub fn derive_coverage(&mut self) {
        let required = self.programmatic_visits.minimum_requirements
            + self.spot_checks.minimum_requirements
            + self.audits.minimum_requirements;
        let completed = self
            .programmatic_visits
            .completed
            .total
            .min(self.programmatic_visits.minimum_requirements)
            + self
                .spot_checks
                .completed
                .total
                .min(self.spot_checks.minimum_requirements)
            + self.audits.completed.min(self.audits.minimum_requirements);

        self.assurance_coverage = if required == 0 || completed == required {
            AssuranceCoverage::CoverageComplete
        } else if completed == 0 {
            AssuranceCoverage::CoverageNone
        } else {
            AssuranceCoverage::CoveragePartial
        };
    }
}

/// Minimum programmatic visits for a year's cash transfers and rating.
pub fn min_programmatic_visits(cash_cy: Money, rating: RiskRating) -> u32 {
    let ct = cash_cy.minor_units() / 100;
    if ct <= 0 {
        0
    } else if ct <= CT_LEVEL_1 {
        1
    } else if ct <= CT_LEVEL_2 {
        1
    } else if ct <= CT_LEVEL_3 {
        if rating.is_elevated() {
            2
        } else {
            1
        }
    } else if rating.is_elevated() {
        4
    } else {
        2
    }
}

/// Minimum spot checks for a year's cash transfers and rating.
pub fn min_spot_checks(cash_cy: Money, rating: RiskRating) -> u32 {
    let ct = cash_cy.minor_units() / 100;
    if ct <= CT_LEVEL_1 {
        0
    } else if ct <= CT_LEVEL_2 {
        1
    } else if ct <= CT_LEVEL_3 {
        if rating.is_elevated() {
            2
        } else {
            1
        }
    } else if rating.is_elevated() {
        3
    } else {
        1
    }
}

/// Minimum audits for total current-programme cash.
pub fn min_audits(cash_cp: Money) -> u32 {
    if cash_cp.minor_units() / 100 > AUDIT_THRESHOLD {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn money(major: i64) -> Money {
        Money::from_major(major)
    }

    mod minimum_requirements {
        use super::*;

        #[test]
        fn zero_cash_requires_nothing() {
            for rating in [RiskRating::Low, RiskRating::High] {
                assert_eq!(min_programmatic_visits(Money::zero(), rating), 0);
                assert_eq!(min_spot_checks(Money::zero(), rating), 0);
            }
        }

        #[test]
        fn first_band_one_visit_no_spot_check() {
            assert_eq!(min_programmatic_visits(money(50_000), RiskRating::Low), 1);
            assert_eq!(min_programmatic_visits(money(50_000), RiskRating::High), 1);
            assert_eq!(min_spot_checks(money(50_000), RiskRating::High), 0);
        }

        #[test]
        fn second_band_one_of_each() {
            assert_eq!(min_programmatic_visits(money(100_000), RiskRating::Low), 1);
            assert_eq!(min_spot_checks(money(100_000), RiskRating::Low), 1);
            assert_eq!(min_spot_checks(money(100_000), RiskRating::High), 1);
        }

        #[test]
        fn third_band_splits_on_rating() {
            assert_eq!(min_programmatic_visits(money(350_000), RiskRating::Moderate), 1);
            assert_eq!(min_spot_checks(money(350_000), RiskRating::Moderate), 1);
            assert_eq!(
                min_programmatic_visits(money(350_000), RiskRating::Significant),
                2
            );
            assert_eq!(min_spot_checks(money(350_000), RiskRating::Significant), 2);
        }

        #[test]
        fn top_band_splits_on_rating() {
            assert_eq!(min_programmatic_visits(money(350_001), RiskRating::Low), 2);
            assert_eq!(min_spot_checks(money(350_001), RiskRating::Low), 1);
            assert_eq!(min_programmatic_visits(money(500_000), RiskRating::High), 4);
            assert_eq!(min_spot_checks(money(500_000), RiskRating::High), 3);
        }

        #[test]
        fn audit_required_above_threshold() {
            assert_eq!(min_audits(money(500_000)), 0);
            assert_eq!(min_audits(money(500_001)), 1);
        }
    }

    mod counters {
        use super::*;

        #[test]
        fn record_updates_bucket_and_total() {
            let mut counts = QuarterlyCounts::default();
            counts.record(Quarter::Q2);
            counts.record(Quarter::Q2);
            counts.record(Quarter::Q4);
            assert_eq!(counts.q2, 2);
            assert_eq!(counts.q4, 1);
            assert_eq!(counts.total, 3);
        }

        #[test]
        fn coverage_complete_when_nothing_required() {
            let mut values = HactValues::default();
            values.derive_coverage();
            assert_eq!(values.assurance_coverage, AssuranceCoverage::CoverageComplete);
        }

        #[test]
        fn coverage_none_when_nothing_done() {
            let mut values = HactValues {
                programmatic_visits: VisitCounters {
                    minimum_requirements: 2,
                    ..Default::default()
                },
                ..Default::default()
            };
            values.derive_coverage();
            assert_eq!(values.assurance_coverage, AssuranceCoverage::CoverageNone);
        }

        #[test]
        fn coverage_partial_when_some_done() {
            let mut values = HactValues {
                programmatic_visits: VisitCounters {
                    minimum_requirements: 2,
                    ..Default::default()
                },
                ..Default::default()
            };
            values.programmatic_visits.completed.record(Quarter::Q1);
            values.derive_coverage();
            assert_eq!(values.assurance_coverage, AssuranceCoverage::CoveragePartial);
        }

        #[test]
        fn overcompletion_still_complete() {
            let mut values = HactValues {
                spot_checks: VisitCounters {
                    minimum_requirements: 1,
                    ..Default::default()
                },
                ..Default::default()
            };
            values.spot_checks.completed.record(Quarter::Q1);
            values.spot_checks.completed.record(Quarter::Q2);
            values.derive_coverage();
            assert_eq!(values.assurance_coverage, AssuranceCoverage::CoverageComplete);
        }
    }

    #[test]
    fn serde_shape_is_stable() {
        let values = HactValues::default();
        let json = serde_json::to_value(&values).unwrap();
        assert!(json.get("programmatic_visits").is_some());
        assert!(json["programmatic_visits"].get("completed").is_some());
        assert!(json["programmatic_visits"]["completed"].get("q1").is_some());
        assert!(json["audits"].get("minimum_requirements").is_some());
    }
}
