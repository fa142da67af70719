//! core::country
//!
//! Country programmes: the multi-year policy envelopes that bound
//! agreements and interventions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::types::CountryProgrammeId;

/// A country programme cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryProgramme {
    pub id: CountryProgrammeId,
    pub name: String,
    pub wbs: String,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
}

impl CountryProgramme {
    pub fn new(
        name: impl Into<String>,
        wbs: impl Into<String>,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> Self {
        Self {
            id: CountryProgrammeId::new(),
            name: name.into(),
            wbs: wbs.into(),
            from_date,
            to_date,
        }
    }

    /// Whether the programme's range covers `[start, end]` entirely.
    pub fn covers(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.from_date <= start && end <= self.to_date
    }

    /// Whether the programme is over as of `today`.
    pub fn is_past(&self, today: NaiveDate) -> bool {
        self.to_date < today
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn cp() -> CountryProgramme {
        CountryProgramme::new("CP 2024-2026", "0060/A0/07", date(2024, 1, 1), date(2026, 12, 31))
    }

    #[test]
    fn covers_contained_range() {
        assert!(cp().covers(date(2024, 3, 1), date(2026, 12, 31)));
    }

    #[test]
    fn does_not_cover_overhang() {
        assert!(!cp().covers(date(2023, 12, 1), date(2024, 6, 1)));
        assert!(!cp().covers(date(2026, 1, 1), date(2027, 1, 1)));
    }

    #[test]
    fn past_check() {
        assert!(cp().is_past(date(2027, 1, 1)));
        assert!(!cp().is_past(date(2026, 12, 31)));
    }
}
