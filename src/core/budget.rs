//! core::budget
//!
//! The derived budget attached 1:1 to an intervention.
//!
//! Every field except the currency and the HQ cash rate is derived from
//! activity and supply-item leaves; the recomputer is the only writer. It
//! runs inside the same transaction as any child write, so a committed
//! intervention always satisfies:
//!
//! `total_local = unicef_cash_local + in_kind_amount_local
//!              + total_partner_contribution_local`

use serde::{Deserialize, Serialize};

use crate::core::intervention::{SupplyItem, SupplyProvider};
use crate::core::results::ResultLink;
use crate::core::types::Money;

/// The planned budget of an intervention. All amounts are in the document
/// currency ("local" amounts in the source system's terms).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    /// Document currency; defaults to the tenant's local currency and is
    /// never empty after first save.
    pub currency: String,
    /// CSO cash over active activities.
    pub partner_contribution_local: Money,
    /// UNICEF cash over active activities, before HQ cash.
    pub total_unicef_cash_local_wo_hq: Money,
    /// Headquarters cash rate; entered, not derived.
    pub total_hq_cash_local: Money,
    /// UNICEF cash including HQ cash.
    pub unicef_cash_local: Money,
    /// Supply totals provided by UNICEF.
    pub in_kind_amount_local: Money,
    /// Supply totals provided by the partner.
    pub partner_supply_local: Money,
    /// Partner cash plus partner supplies.
    pub total_partner_contribution_local: Money,
    /// Grand total.
    pub total_local: Money,
    /// Share of UNICEF contribution spent on programme effectiveness,
    /// as a percentage rounded to two decimals.
    pub programme_effectiveness: f64,
}

impl Budget {
    /// An empty budget in the given currency.
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            partner_contribution_local: Money::zero(),
            total_unicef_cash_local_wo_hq: Money::zero(),
            total_hq_cash_local: Money::zero(),
            unicef_cash_local: Money::zero(),
            in_kind_amount_local: Money::zero(),
            partner_supply_local: Money::zero(),
            total_partner_contribution_local: Money::zero(),
            total_local: Money::zero(),
            programme_effectiveness: 0.0,
        }
    }

    /// Total UNICEF contribution (cash plus supplies).
    pub fn total_unicef_contribution(&self) -> Money {
        self.unicef_cash_local + self.in_kind_amount_local
    }
}

/// Recompute all derived budget fields from the intervention's leaves.
///
/// `links` supplies the activity cash; `supplies` the supply-item totals.
/// Inactive activities are excluded. Management cash (UNICEF cash under
/// result links with no cp-output) feeds the effectiveness percentage.
pub fn recompute(budget: &mut Budget, links: &[ResultLink], supplies: &[SupplyItem]) {
    let active = |links: &[ResultLink]| {
        links
            .iter()
            .flat_map(|l| l.activities())
            .filter(|a| a.is_active)
            .map(|a| (a.unicef_cash, a.cso_cash))
            .collect::<Vec<_>>()
    };

    let amounts = active(links);
    budget.partner_contribution_local = Money::sum(amounts.iter().map(|(_, cso)| *cso));
    budget.total_unicef_cash_local_wo_hq = Money::sum(amounts.iter().map(|(unicef, _)| *unicef));
    budget.unicef_cash_local = budget.total_unicef_cash_local_wo_hq + budget.total_hq_cash_local;

    budget.in_kind_amount_local = Money::sum(
        supplies
            .iter()
            .filter(|s| s.provided_by == SupplyProvider::Unicef)
            .map(|s| s.total_price()),
    );
    budget.partner_supply_local = Money::sum(
        supplies
            .iter()
            .filter(|s| s.provided_by == SupplyProvider::Partner)
            .map(|s| s.total_price()),
    );

    budget.total_partner_contribution_local =
        budget.partner_contribution_local + budget.partner_supply_local;
    budget.total_local = budget.unicef_cash_local
        + budget.in_kind_amount_local
        + budget.total_partner_contribution_local;

    let management_cash = Money::sum(
        links
            .iter()
            .filter(|l| l.cp_output.is_none())
            .flat_map(|l| l.activities())
            .filter(|a| a.is_active)
            .map(|a| a.unicef_cash),
    );
    budget.programme_effectiveness =
        Money::percentage_of(management_cash, budget.total_unicef_contribution());
}
