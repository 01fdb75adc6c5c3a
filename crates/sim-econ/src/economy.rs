//! Monthly macro-economic recomputation.
//!
//! Every figure of a month is computed from the pre-tick snapshot by
//! [`compute_month`]; [`apply_month`] then writes them in one step so a
//! half-updated economy is never observable.

use serde::{Deserialize, Serialize};
use sim_core::{CountryState, SimError};
use tracing::{debug, instrument};

/// Unemployment stays within this band.
pub const UNEMPLOYMENT_BOUNDS: (f64, f64) = (0.0, 30.0);

/// Figures of one simulated month.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonthlyReport {
    /// Annualised growth in percent driving this month.
    pub annual_growth_percent: f64,
    pub gdp_growth_monthly_percent: f64,
    pub revenue_monthly: f64,
    pub expenditure_monthly: f64,
    /// Positive when debt grew.
    pub debt_delta: f64,
    pub inflation_rate: f64,
    pub trade_balance_monthly: f64,
    pub reserves_delta: f64,
    pub unemployment_delta: f64,
}

/// One point of a projection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectionPoint {
    pub month: u32,
    pub gdp_billions_usd: f64,
    pub debt_to_gdp_percent: f64,
    pub inflation_rate: f64,
    pub unemployment_rate: f64,
    pub foreign_reserves_billions: f64,
}

fn mean_sector_level(state: &CountryState) -> Option<f64> {
    if state.sectors.is_empty() {
        return None;
    }
    let sum: f64 = state.sectors.values().map(|s| s.level).sum();
    Some(sum / state.sectors.len() as f64)
}

/// Annual growth: potential plus sector bonus minus unemployment penalty.
pub fn annual_growth(state: &CountryState) -> f64 {
    let sector_bonus = mean_sector_level(state).map_or(0.0, |m| (m - 50.0) * 0.02);
    let penalty = ((state.workforce.unemployment_rate - 5.0) * 0.1).max(0.0);
    state.economy.gdp_growth_potential + sector_bonus - penalty
}

/// Inflation from the structural floor plus debt and growth pressure.
pub fn inflation(state: &CountryState) -> f64 {
    let e = &state.economy;
    e.base_inflation
        + ((e.debt.debt_to_gdp_percent - 60.0) * 0.05).max(0.0)
        + ((e.gdp_growth_rate - 3.0) * 0.2).max(0.0)
}

/// Annual revenue scaled by GDP relative to the baseline.
pub fn effective_annual_revenue(state: &CountryState, baseline_override: Option<f64>) -> f64 {
    let baseline = baseline_override.unwrap_or(state.economy.baseline_gdp_billions);
    if baseline > 0.0 {
        state.budget.total_revenue_billions * state.economy.gdp_billions_usd / baseline
    } else {
        state.budget.total_revenue_billions
    }
}

/// Compute a month from the current snapshot without touching it.
pub fn compute_month(state: &CountryState, baseline_override: Option<f64>) -> MonthlyReport {
    let annual_growth_percent = annual_growth(state);
    let revenue_monthly = effective_annual_revenue(state, baseline_override) / 12.0;
    let expenditure_monthly = state.budget.total_expenditure_billions / 12.0;
    let trade_balance_monthly: f64 = state
        .relations
        .values()
        .map(|r| r.trade.balance_billions)
        .sum::<f64>()
        / 12.0;
    let investment: f64 = state.sectors.values().map(|s| s.recent_investment_billions).sum();
    let unemployment = state.workforce.unemployment_rate;
    let unemployment_delta = (-0.3 * state.economy.gdp_growth_rate - 0.01 * investment
        + 0.1 * (5.0 - unemployment))
        / 12.0;
    MonthlyReport {
        annual_growth_percent,
        gdp_growth_monthly_percent: annual_growth_percent / 12.0,
        revenue_monthly,
        expenditure_monthly,
        debt_delta: expenditure_monthly - revenue_monthly,
        inflation_rate: inflation(state),
        trade_balance_monthly,
        reserves_delta: trade_balance_monthly,
        unemployment_delta,
    }
}

/// Write a computed month into the snapshot and recompute derived ratios.
pub fn apply_month(
    state: &mut CountryState,
    report: &MonthlyReport,
    baseline_override: Option<f64>,
) -> Result<(), SimError> {
    let e = &mut state.economy;
    e.gdp_billions_usd *= 1.0 + report.gdp_growth_monthly_percent / 100.0;
    e.gdp_growth_rate = report.annual_growth_percent;
    e.debt.total_billions += report.debt_delta;
    e.inflation_rate = report.inflation_rate;
    e.reserves.foreign_reserves_billions += report.reserves_delta;
    let (lo, hi) = UNEMPLOYMENT_BOUNDS;
    state.workforce.unemployment_rate =
        (state.workforce.unemployment_rate + report.unemployment_delta).clamp(lo, hi);
    for sector in state.sectors.values_mut() {
        sector.recent_investment_billions = 0.0;
    }
    state.budget.deficit_billions =
        state.budget.total_expenditure_billions - effective_annual_revenue(state, baseline_override);
    state.refresh_derived();
    for (field, v) in [
        ("economy.gdp_billions_usd", state.economy.gdp_billions_usd),
        ("economy.debt.total_billions", state.economy.debt.total_billions),
        ("economy.inflation_rate", state.economy.inflation_rate),
        ("economy.reserves.foreign_reserves_billions", state.economy.reserves.foreign_reserves_billions),
    ] {
        if !v.is_finite() {
            return Err(SimError::NonFinite(field.to_string()));
        }
    }
    Ok(())
}

/// The monthly economic step.
#[instrument(level = "debug", skip_all, fields(country = %state.meta.country_code))]
pub fn monthly_update(
    state: &mut CountryState,
    baseline_override: Option<f64>,
) -> Result<MonthlyReport, SimError> {
    let report = compute_month(state, baseline_override);
    apply_month(state, &report, baseline_override)?;
    debug!(
        gdp = state.economy.gdp_billions_usd,
        debt_delta = report.debt_delta,
        inflation = report.inflation_rate,
        "economy updated"
    );
    Ok(report)
}

/// Run `months` monthly steps on a copy of the snapshot.
pub fn project(
    state: &CountryState,
    months: u32,
    baseline_override: Option<f64>,
) -> Result<Vec<ProjectionPoint>, SimError> {
    let mut working = state.clone();
    let mut out = Vec::with_capacity(months as usize);
    for month in 1..=months {
        monthly_update(&mut working, baseline_override)?;
        out.push(ProjectionPoint {
            month,
            gdp_billions_usd: working.economy.gdp_billions_usd,
            debt_to_gdp_percent: working.economy.debt.debt_to_gdp_percent,
            inflation_rate: working.economy.inflation_rate,
            unemployment_rate: working.workforce.unemployment_rate,
            foreign_reserves_billions: working.economy.reserves.foreign_reserves_billions,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sim_core::testing::sample_country;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn month_follows_formulas() {
        let state = sample_country();
        let r = compute_month(&state, None);
        // Mean sector level (60+55+50+45+65+40)/6 = 52.5 -> bonus 0.05;
        // unemployment 6% -> penalty 0.1.
        assert!(close(r.annual_growth_percent, 2.5 + 0.05 - 0.1));
        assert!(close(r.revenue_monthly, 420.0 / 12.0));
        assert!(close(r.expenditure_monthly, 450.0 / 12.0));
        assert!(close(r.debt_delta, 2.5));
        // Debt ratio 60 and growth 2 exert no pressure.
        assert!(close(r.inflation_rate, 2.0));
        // Trade balances 5 - 2 + 3 - 25 - 6 = -25.
        assert!(close(r.trade_balance_monthly, -25.0 / 12.0));
        assert!(close(r.reserves_delta, r.trade_balance_monthly));
    }

    #[test]
    fn derived_ratios_follow_absolutes() {
        let mut state = sample_country();
        monthly_update(&mut state, None).unwrap();
        let e = &state.economy;
        assert!(close(e.debt.debt_to_gdp_percent, e.debt.total_billions / e.gdp_billions_usd * 100.0));
        assert!(close(
            e.gdp_per_capita_usd,
            e.gdp_billions_usd * 1e9 / state.demographics.total_population as f64
        ));
    }

    #[test]
    fn surplus_reduces_debt_below_zero() {
        let mut state = sample_country();
        state.economy.debt.total_billions = 1.0;
        state.budget.total_revenue_billions = 600.0;
        monthly_update(&mut state, None).unwrap();
        assert!(state.economy.debt.total_billions < 0.0);
    }

    #[test]
    fn projection_leaves_snapshot_untouched() {
        let state = sample_country();
        let before = state.clone();
        let path = project(&state, 12, None).unwrap();
        assert_eq!(path.len(), 12);
        assert_eq!(state, before);
        assert!(path[11].gdp_billions_usd > before.economy.gdp_billions_usd);
    }

    #[test]
    fn investment_lowers_unemployment() {
        let mut a = sample_country();
        let mut b = sample_country();
        b.sectors.get_mut("technology").unwrap().recent_investment_billions = 50.0;
        monthly_update(&mut a, None).unwrap();
        monthly_update(&mut b, None).unwrap();
        assert!(b.workforce.unemployment_rate < a.workforce.unemployment_rate);
        assert_eq!(b.sectors["technology"].recent_investment_billions, 0.0);
    }

    proptest! {
        #[test]
        fn unemployment_stays_bounded(u in 0.0f64..30.0, g in -10.0f64..10.0, inv in 0.0f64..1000.0) {
            let mut state = sample_country();
            state.workforce.unemployment_rate = u;
            state.economy.gdp_growth_rate = g;
            state.sectors.get_mut("services").unwrap().recent_investment_billions = inv;
            monthly_update(&mut state, None).unwrap();
            prop_assert!((0.0..=30.0).contains(&state.workforce.unemployment_rate));
        }
    }
}
