//! Budget reallocation, taxation and borrowing.

use serde::{Deserialize, Serialize};
use sim_core::{ActionError, CountryState};
use std::collections::BTreeMap;
use tracing::{info, warn};

const EPS: f64 = 1e-9;

/// Rating tiers, best first, with the highest debt-to-GDP ratio they cover.
pub const RATING_TABLE: [(&str, f64); 8] = [
    ("AAA", 30.0),
    ("AA", 45.0),
    ("A", 60.0),
    ("BBB", 75.0),
    ("BB", 90.0),
    ("B", 105.0),
    ("CCC", 120.0),
    ("D", f64::INFINITY),
];

/// Borrowing ceiling (percent of GDP) per rating tier.
const BORROWING_LIMITS: [(&str, f64); 8] = [
    ("AAA", 120.0),
    ("AA", 100.0),
    ("A", 80.0),
    ("BBB", 60.0),
    ("BB", 40.0),
    ("B", 30.0),
    ("CCC", 20.0),
    ("D", 0.0),
];

/// How an allocation increase is paid for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundingSource {
    Rebalance,
    Debt,
    Taxes,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AllocationChange {
    pub category: String,
    pub old_percent: f64,
    pub new_percent: f64,
    pub source: FundingSource,
    /// Percentage point change of every other category.
    pub other_changes: BTreeMap<String, f64>,
    pub expenditure_delta: f64,
    pub revenue_delta: f64,
    pub happiness_delta: f64,
    pub trust_delta: f64,
    pub growth_potential_delta: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DebtChange {
    pub amount_billions: f64,
    pub total_billions: f64,
    pub debt_to_gdp_percent: f64,
    /// `(old, new)` when the rating tier moved.
    pub rating_change: Option<(String, String)>,
}

impl DebtChange {
    pub fn upgraded(&self) -> Option<bool> {
        self.rating_change
            .as_ref()
            .map(|(old, new)| rating_index(new) < rating_index(old))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaxChange {
    pub old_rate: f64,
    pub new_rate: f64,
    pub revenue_billions: f64,
    pub happiness_delta: f64,
    pub growth_potential_delta: f64,
}

/// Strip `+`/`-` modifiers: "BBB-" becomes "BBB".
pub fn base_rating(rating: &str) -> &str {
    rating.trim().trim_end_matches(['+', '-'])
}

/// Position in [`RATING_TABLE`]; unknown ratings sort last.
pub fn rating_index(rating: &str) -> usize {
    let base = base_rating(rating);
    RATING_TABLE
        .iter()
        .position(|(r, _)| r.eq_ignore_ascii_case(base))
        .unwrap_or(RATING_TABLE.len())
}

/// Rating tier implied by a debt-to-GDP ratio.
pub fn rating_for_ratio(debt_to_gdp: f64) -> &'static str {
    RATING_TABLE
        .iter()
        .find(|(_, max)| debt_to_gdp <= *max)
        .map_or("D", |(r, _)| *r)
}

/// Maximum debt-to-GDP a rating may borrow up to.
pub fn borrowing_limit_percent(rating: &str) -> f64 {
    let base = base_rating(rating);
    BORROWING_LIMITS
        .iter()
        .find(|(r, _)| r.eq_ignore_ascii_case(base))
        .map_or(60.0, |(_, l)| *l)
}

/// Re-rate after a debt change. Returns `(old, new)` if the tier changed.
fn rerate(state: &mut CountryState) -> Option<(String, String)> {
    let debt = &mut state.economy.debt;
    let target = rating_for_ratio(debt.debt_to_gdp_percent);
    if rating_index(target) == rating_index(&debt.credit_rating) {
        return None;
    }
    let old = std::mem::replace(&mut debt.credit_rating, target.to_string());
    info!(from = %old, to = %target, "credit rating changed");
    Some((old, target.to_string()))
}

fn recompute_deficit(state: &mut CountryState) {
    let b = &mut state.budget;
    b.deficit_billions = b.total_expenditure_billions - b.total_revenue_billions;
    let gdp = state.economy.gdp_billions_usd;
    if gdp > 0.0 {
        b.deficit_to_gdp_percent = b.deficit_billions / gdp * 100.0;
    }
}

/// Rescale each category's amount (and earmarks) after percentages or the
/// expenditure total changed. Spent money stays spent: amounts scale by the
/// ratio of new to old funding instead of being reset.
fn rescale_amounts(state: &mut CountryState, old_percents: &BTreeMap<String, f64>, old_total: f64) {
    let new_total = state.budget.total_expenditure_billions;
    for (name, cat) in state.budget.allocation.iter_mut() {
        let old_pct = old_percents.get(name).copied().unwrap_or(0.0);
        let old_funding = old_total * old_pct / 100.0;
        let new_funding = new_total * cat.percent_of_budget / 100.0;
        if old_funding > EPS {
            let factor = new_funding / old_funding;
            cat.amount_billions *= factor;
            for v in cat.breakdown.values_mut() {
                *v *= factor;
            }
        } else {
            cat.amount_billions = new_funding;
        }
    }
}

/// Shrink `categories` by `delta` points in proportion to their current
/// share, never below their minimum. Caller guarantees enough headroom.
fn shrink_by_share(
    alloc: &mut BTreeMap<String, sim_core::state::BudgetCategory>,
    categories: &[String],
    delta: f64,
) -> BTreeMap<String, f64> {
    let mut changes: BTreeMap<String, f64> = BTreeMap::new();
    let mut remaining = delta;
    let mut active: Vec<&String> = categories.iter().collect();
    while remaining > EPS && !active.is_empty() {
        let share_total: f64 = active.iter().map(|k| alloc[k.as_str()].percent_of_budget).sum();
        if share_total <= EPS {
            break;
        }
        let mut taken = 0.0;
        let mut saturated = Vec::new();
        for k in &active {
            let Some(cat) = alloc.get_mut(k.as_str()) else { continue };
            let headroom = (cat.percent_of_budget - cat.minimum_percent).max(0.0);
            let want = remaining * cat.percent_of_budget / share_total;
            let cut = want.min(headroom);
            cat.percent_of_budget -= cut;
            taken += cut;
            *changes.entry((*k).clone()).or_insert(0.0) -= cut;
            if headroom - cut <= EPS {
                saturated.push((*k).clone());
            }
        }
        remaining -= taken;
        active.retain(|k| !saturated.contains(*k));
    }
    changes
}

/// Change a category's share of expenditure, funding the change from
/// `source`. Fails without side effects on any rejection.
pub fn adjust_allocation(
    state: &mut CountryState,
    category: &str,
    new_percent: f64,
    source: FundingSource,
) -> Result<AllocationChange, ActionError> {
    let Some(target) = state.budget.allocation.get(category) else {
        return Err(ActionError::unknown("budget category", category));
    };
    if !new_percent.is_finite() || !(0.0..=100.0).contains(&new_percent) {
        return Err(ActionError::Rejected(format!("{new_percent}% is not a valid share")));
    }
    if target.frozen {
        return Err(ActionError::Rejected(format!("{category} is frozen")));
    }
    if new_percent < target.minimum_percent {
        return Err(ActionError::Rejected(format!(
            "{category} cannot go below {}%",
            target.minimum_percent
        )));
    }
    let old_percent = target.percent_of_budget;
    let delta = new_percent - old_percent;
    if delta.abs() < 0.01 {
        return Err(ActionError::Rejected("no significant change".into()));
    }
    if source != FundingSource::Rebalance && delta < 0.0 {
        return Err(ActionError::Rejected(format!(
            "{:?} funding only applies to increases",
            source
        )));
    }

    let others: Vec<String> = state
        .budget
        .allocation
        .iter()
        .filter(|(k, c)| k.as_str() != category && !c.frozen)
        .map(|(k, _)| k.clone())
        .collect();
    let old_percents: BTreeMap<String, f64> = state
        .budget
        .allocation
        .iter()
        .map(|(k, c)| (k.clone(), c.percent_of_budget))
        .collect();
    let old_total = state.budget.total_expenditure_billions;
    let mut change = AllocationChange {
        category: category.to_string(),
        old_percent,
        new_percent,
        source,
        other_changes: BTreeMap::new(),
        expenditure_delta: 0.0,
        revenue_delta: 0.0,
        happiness_delta: 0.0,
        trust_delta: 0.0,
        growth_potential_delta: 0.0,
    };

    match source {
        FundingSource::Rebalance if delta > 0.0 => {
            let alloc = &state.budget.allocation;
            let reducible: f64 = others
                .iter()
                .map(|k| (alloc[k.as_str()].percent_of_budget - alloc[k.as_str()].minimum_percent).max(0.0))
                .sum();
            if reducible + EPS < delta {
                warn!(category, delta, reducible, "rebalance rejected");
                return Err(ActionError::Rejected(format!(
                    "cannot free {delta:.1}% from other categories, only {reducible:.1}% available"
                )));
            }
            change.other_changes = shrink_by_share(&mut state.budget.allocation, &others, delta);
        }
        FundingSource::Rebalance => {
            let freed = -delta;
            let alloc = &mut state.budget.allocation;
            let share_total: f64 = others.iter().map(|k| alloc[k.as_str()].percent_of_budget).sum();
            if others.is_empty() {
                return Err(ActionError::Rejected("no category can absorb the freed share".into()));
            }
            for k in &others {
                let Some(cat) = alloc.get_mut(k.as_str()) else { continue };
                let gain = if share_total > EPS {
                    freed * cat.percent_of_budget / share_total
                } else {
                    freed / others.len() as f64
                };
                cat.percent_of_budget += gain;
                change.other_changes.insert(k.clone(), gain);
            }
        }
        FundingSource::Debt | FundingSource::Taxes => {
            // Frozen shares stay put; the other shares absorb the change pro rata.
            let frozen: f64 = state
                .budget
                .allocation
                .iter()
                .filter(|(k, c)| k.as_str() != category && c.frozen)
                .map(|(_, c)| c.percent_of_budget)
                .sum();
            let rest_old = 100.0 - old_percent - frozen;
            let rest_new = 100.0 - new_percent - frozen;
            if rest_old <= EPS || rest_new < -EPS {
                return Err(ActionError::Rejected(format!(
                    "{new_percent}% leaves no room beside {frozen:.1}% of frozen spending"
                )));
            }
            let factor = rest_new.max(0.0) / rest_old;
            let alloc = &state.budget.allocation;
            if let Some(k) = others.iter().find(|k| {
                let cat = &alloc[k.as_str()];
                cat.percent_of_budget * factor + EPS < cat.minimum_percent
            }) {
                warn!(category, delta, squeezed = %k, "allocation rejected");
                return Err(ActionError::Rejected(format!(
                    "{k} would fall below its minimum of {}%",
                    alloc[k.as_str()].minimum_percent
                )));
            }

            if source == FundingSource::Debt {
                let extra_spending = old_total * delta / 100.0;
                state.budget.total_expenditure_billions += extra_spending;
                change.expenditure_delta = extra_spending;
            } else {
                let extra_revenue = state.budget.total_revenue_billions * delta / 100.0;
                state.budget.total_revenue_billions += extra_revenue;
                change.revenue_delta = extra_revenue;
                change.happiness_delta = -0.5 * delta;
                change.trust_delta = -0.5 * delta;
                state.adjust_index("happiness", change.happiness_delta, 70.0);
                state.adjust_index("public_trust", change.trust_delta, 60.0);
                let potential = &mut state.economy.gdp_growth_potential;
                let lowered = (*potential - 0.1 * delta).max(0.0);
                change.growth_potential_delta = lowered - *potential;
                *potential = lowered;
            }

            for k in &others {
                let Some(cat) = state.budget.allocation.get_mut(k.as_str()) else { continue };
                let before = cat.percent_of_budget;
                cat.percent_of_budget *= factor;
                change.other_changes.insert(k.clone(), cat.percent_of_budget - before);
            }
        }
    }

    if let Some(cat) = state.budget.allocation.get_mut(category) {
        cat.percent_of_budget = new_percent;
    }
    rescale_amounts(state, &old_percents, old_total);
    recompute_deficit(state);
    info!(category, old_percent, new_percent, ?source, "allocation adjusted");
    Ok(change)
}

/// Borrow `amount` billions. A recorded surplus (negative debt) is treated
/// as zero debt before borrowing.
pub fn take_debt(state: &mut CountryState, amount: f64) -> Result<DebtChange, ActionError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ActionError::Rejected("amount must be positive".into()));
    }
    let gdp = state.economy.gdp_billions_usd;
    if gdp <= 0.0 {
        return Err(ActionError::InvalidState("GDP is not positive".into()));
    }
    let current = state.economy.debt.total_billions.max(0.0);
    let new_total = current + amount;
    let new_ratio = new_total / gdp * 100.0;
    let limit = borrowing_limit_percent(&state.economy.debt.credit_rating);
    if new_ratio > limit {
        warn!(rating = %state.economy.debt.credit_rating, limit, new_ratio, "borrowing rejected");
        return Err(ActionError::Rejected(format!(
            "credit rating {} limits debt to {limit}% of GDP",
            state.economy.debt.credit_rating
        )));
    }
    state.economy.debt.total_billions = new_total;
    state.economy.reserves.foreign_reserves_billions += amount;
    state.refresh_derived();
    let rating_change = rerate(state);
    Ok(DebtChange {
        amount_billions: amount,
        total_billions: new_total,
        debt_to_gdp_percent: state.economy.debt.debt_to_gdp_percent,
        rating_change,
    })
}

/// Repay `amount` billions out of reserves.
pub fn repay_debt(state: &mut CountryState, amount: f64) -> Result<DebtChange, ActionError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ActionError::Rejected("amount must be positive".into()));
    }
    let owed = state.economy.debt.total_billions.max(0.0);
    if amount > owed {
        return Err(ActionError::Rejected(format!("cannot repay more than owed (${owed:.1}B)")));
    }
    let reserves = state.economy.reserves.foreign_reserves_billions;
    if amount > reserves {
        return Err(ActionError::Rejected(format!("insufficient reserves (${reserves:.1}B)")));
    }
    state.economy.debt.total_billions = owed - amount;
    state.economy.reserves.foreign_reserves_billions -= amount;
    state.refresh_derived();
    let rating_change = rerate(state);
    Ok(DebtChange {
        amount_billions: amount,
        total_billions: state.economy.debt.total_billions,
        debt_to_gdp_percent: state.economy.debt.debt_to_gdp_percent,
        rating_change,
    })
}

/// Set the overall tax rate within the configured bounds.
pub fn adjust_tax(state: &mut CountryState, new_rate: f64) -> Result<TaxChange, ActionError> {
    let (lo, hi) = (state.budget.min_tax_rate, state.budget.max_tax_rate);
    if !new_rate.is_finite() || new_rate < lo || new_rate > hi {
        return Err(ActionError::Rejected(format!("tax rate must be within {lo}%..{hi}%")));
    }
    let old_rate = state.budget.tax_rate;
    let delta = new_rate - old_rate;
    if old_rate > EPS {
        state.budget.total_revenue_billions *= new_rate / old_rate;
    }
    state.budget.tax_rate = new_rate;
    let (happiness_delta, growth_delta) = if delta > 0.0 {
        (-0.8 * delta, -0.2 * delta)
    } else {
        (0.5 * -delta, 0.1 * -delta)
    };
    state.adjust_index("happiness", happiness_delta, 70.0);
    let potential = &mut state.economy.gdp_growth_potential;
    *potential = (*potential + growth_delta).clamp(0.0, 10.0);
    recompute_deficit(state);
    info!(old_rate, new_rate, "tax rate changed");
    Ok(TaxChange {
        old_rate,
        new_rate,
        revenue_billions: state.budget.total_revenue_billions,
        happiness_delta,
        growth_potential_delta: growth_delta,
    })
}
