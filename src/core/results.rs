//! core::results
//!
//! The four-level result tree owned by an intervention:
//! ResultLink -> LowerResult -> Activity -> ActivityItem.
//!
//! # Codes
//!
//! Every node carries a dotted sequence code derived from its position:
//! result links with a cp-output are coded `1..N`, lower results
//! `<parent>.1..M`, activities and items one level deeper. Links without a
//! cp-output (programme-effectiveness links) carry no code and are skipped
//! by the numbering.
//!
//! # Invariants
//!
//! - Codes of cp-output links are contiguous and unique per intervention
//! - Renumbering is deterministic: nodes sort by (created, id)
//! - If an activity has items, its cash amounts equal the item sums

use serde::{Deserialize, Serialize};

use crate::core::types::{
    ActivityId, ActivityItemId, IndicatorId, LowerResultId, Money, ResultLinkId, TimeFrameId,
    UtcTimestamp,
};

/// An indicator applied to a lower result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedIndicator {
    pub id: IndicatorId,
    pub title: String,
    pub is_high_frequency: bool,
    pub is_active: bool,
}

impl AppliedIndicator {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: IndicatorId::new(),
            title: title.into(),
            is_high_frequency: false,
            is_active: true,
        }
    }
}

/// A budget line under an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityItem {
    pub id: ActivityItemId,
    pub name: String,
    pub code: Option<String>,
    pub unit: String,
    pub no_units: u32,
    pub unit_price: Money,
    pub unicef_cash: Money,
    pub cso_cash: Money,
    pub created: UtcTimestamp,
}

impl ActivityItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ActivityItemId::new(),
            name: name.into(),
            code: None,
            unit: "each".to_string(),
            no_units: 1,
            unit_price: Money::zero(),
            unicef_cash: Money::zero(),
            cso_cash: Money::zero(),
            created: UtcTimestamp::now(),
        }
    }
}

/// A workplan activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub name: String,
    pub code: Option<String>,
    pub context_details: Option<String>,
    pub unicef_cash: Money,
    pub cso_cash: Money,
    pub is_active: bool,
    /// References to the intervention's time frames this activity spans.
    pub time_frames: Vec<TimeFrameId>,
    pub items: Vec<ActivityItem>,
    pub created: UtcTimestamp,
}

impl Activity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ActivityId::new(),
            name: name.into(),
            code: None,
            context_details: None,
            unicef_cash: Money::zero(),
            cso_cash: Money::zero(),
            is_active: true,
            time_frames: Vec::new(),
            items: Vec::new(),
            created: UtcTimestamp::now(),
        }
    }

    /// Re-derive activity cash from its items, when items exist.
    ///
    /// Activities without items keep their directly entered amounts.
    pub fn roll_up_items(&mut self) {
        if self.items.is_empty() {
            return;
        }
        self.unicef_cash = Money::sum(self.items.iter().map(|i| i.unicef_cash));
        self.cso_cash = Money::sum(self.items.iter().map(|i| i.cso_cash));
    }

    /// Total cash (both sides) for this activity.
    pub fn total_cash(&self) -> Money {
        self.unicef_cash + self.cso_cash
    }
}

/// A programme output under a result link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowerResult {
    pub id: LowerResultId,
    pub name: String,
    pub code: Option<String>,
    pub activities: Vec<Activity>,
    pub indicators: Vec<AppliedIndicator>,
    pub created: UtcTimestamp,
}

impl LowerResult {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: LowerResultId::new(),
            name: name.into(),
            code: None,
            activities: Vec::new(),
            indicators: Vec::new(),
            created: UtcTimestamp::now(),
        }
    }
}

/// A link from the intervention to a country-programme output.
///
/// Links without a cp-output hold programme-effectiveness (management)
/// activities; they are excluded from code numbering and their UNICEF cash
/// feeds the effectiveness percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultLink {
    pub id: ResultLinkId,
    /// Country-programme output reference (WBS or name); None for the
    /// programme-effectiveness link.
    pub cp_output: Option<String>,
    pub code: Option<String>,
    pub lower_results: Vec<LowerResult>,
    pub created: UtcTimestamp,
}

impl ResultLink {
    pub fn new(cp_output: Option<String>) -> Self {
        Self {
            id: ResultLinkId::new(),
            cp_output,
            code: None,
            lower_results: Vec::new(),
            created: UtcTimestamp::now(),
        }
    }

    /// All activities under this link.
    pub fn activities(&self) -> impl Iterator<Item = &Activity> {
        self.lower_results.iter().flat_map(|lr| lr.activities.iter())
    }
}

/// Deterministically renumber the whole tree in place.
///
/// Result links with a cp-output get codes `1..N` in (created, id) order.
/// Links without one, and everything beneath them, stay uncoded.
pub fn renumber(links: &mut [ResultLink]) {
    let mut order: Vec<usize> = (0..links.len()).collect();
    order.sort_by(|&a, &b| {
        links[a]
            .created
            .cmp(&links[b].created)
            .then_with(|| links[a].id.cmp(&links[b].id))
    });

    let mut next = 1usize;
    for idx in order {
        let link = &mut links[idx];
        if link.cp_output.is_none() {
            link.code = None;
            clear_codes(link);
            continue;
        }
        let code = next.to_string();
        next += 1;
        renumber_children(link, &code);
        link.code = Some(code);
    }
}

fn clear_codes(link: &mut ResultLink) {
    for lower in &mut link.lower_results {
        lower.code = None;
        for activity in &mut lower.activities {
            activity.code = None;
            for item in &mut activity.items {
                item.code = None;
            }
        }
    }
}

fn renumber_children(link: &mut ResultLink, prefix: &str) {
    link.lower_results
        .sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
    for (li, lower) in link.lower_results.iter_mut().enumerate() {
        let lower_code = format!("{}.{}", prefix, li + 1);
        lower
            .activities
            .sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        for (ai, activity) in lower.activities.iter_mut().enumerate() {
            let activity_code = format!("{}.{}", lower_code, ai + 1);
            activity
                .items
                .sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
            for (ii, item) in activity.items.iter_mut().enumerate() {
                item.code = Some(format!("{}.{}", activity_code, ii + 1));
            }
            activity.code = Some(activity_code);
        }
        lower.code = Some(lower_code);
    }
}
