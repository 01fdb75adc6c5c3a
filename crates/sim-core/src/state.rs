//! The country snapshot: one aggregate root per nation.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::catalog::Severity;
use crate::commitments::{Commitment, CommitmentId};
use crate::military::Military;

/// Infrastructure metrics grouped by domain, e.g. `digital.internet_penetration`.
pub type Infrastructure = BTreeMap<String, BTreeMap<String, f64>>;

/// Identity and calendar bookkeeping for a snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    /// ISO-like country code, e.g. "TST".
    pub country_code: String,
    /// Display name.
    pub country_name: String,
    /// Current simulated date.
    pub current_date: NaiveDate,
    /// Simulated days elapsed since the scenario started.
    pub elapsed_days: u64,
    /// Last date each cooldown-gated action was used.
    #[serde(default)]
    pub cooldowns: BTreeMap<String, NaiveDate>,
    /// Monotonic counter used to mint commitment and event identifiers.
    #[serde(default)]
    pub next_id: u64,
}

/// Immigration stance set by the player.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPolicy {
    Open,
    #[default]
    Moderate,
    Closed,
}

/// Population stock and vital rates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
    /// Total population (persons).
    pub total_population: u64,
    /// Population aged 15-64.
    pub working_age_population: u64,
    /// Share of working-age population in the labor force, in [0,1].
    pub labor_force_participation: f64,
    /// Working-age population times participation.
    pub active_labor_force: u64,
    /// Median age in years.
    pub median_age: f64,
    /// Births per 1000 inhabitants per year.
    pub birth_rate_per_1000: f64,
    /// Deaths per 1000 inhabitants per year.
    pub death_rate_per_1000: f64,
    /// Net migration per 1000 inhabitants per year.
    pub net_migration_per_1000: f64,
    /// Share of the working-age population by cohort, keys like "15_24".
    #[serde(default)]
    pub age_distribution: BTreeMap<String, f64>,
    #[serde(default)]
    pub migration_policy: MigrationPolicy,
}

/// A pool of specialised labor, e.g. software engineers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpertisePool {
    /// Qualified people in the country.
    pub available: u64,
    /// Of those, currently employed.
    pub employed: u64,
    /// Relative quality in [0,100].
    #[serde(default)]
    pub quality_index: f64,
}

impl ExpertisePool {
    /// People that can still be hired: `available - employed`, never negative.
    pub fn free(&self) -> u64 {
        self.available.saturating_sub(self.employed)
    }
}

/// Labor market state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Workforce {
    /// Unemployment rate in percent.
    pub unemployment_rate: f64,
    pub expertise_pools: BTreeMap<String, ExpertisePool>,
    /// Yearly graduates by education level, feeding the expertise pools.
    #[serde(default)]
    pub annual_graduates: BTreeMap<String, u64>,
}

/// Outstanding public debt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Debt {
    /// Absolute debt in billions USD; negative values record a surplus.
    pub total_billions: f64,
    /// Derived from `total_billions` and GDP, never set independently.
    pub debt_to_gdp_percent: f64,
    /// Rating such as "AA+" or "BBB-".
    pub credit_rating: String,
    /// Average coupon in percent.
    #[serde(default)]
    pub average_interest_rate: f64,
}

/// Foreign currency reserves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reserves {
    pub foreign_reserves_billions: f64,
    pub months_of_imports_covered: f64,
}

/// Macro-economic aggregates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Economy {
    /// Nominal GDP in billions USD.
    pub gdp_billions_usd: f64,
    /// GDP level at which revenue equals the nominal annual revenue.
    pub baseline_gdp_billions: f64,
    /// Annual potential growth in percent.
    pub gdp_growth_potential: f64,
    /// Last realised growth, annualised percent.
    pub gdp_growth_rate: f64,
    /// Derived from GDP and population.
    pub gdp_per_capita_usd: f64,
    /// Structural inflation floor in percent.
    pub base_inflation: f64,
    /// Current inflation in percent.
    pub inflation_rate: f64,
    pub debt: Debt,
    pub reserves: Reserves,
}

/// One line of the budget allocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BudgetCategory {
    /// Share of total expenditure in percent.
    pub percent_of_budget: f64,
    /// Amount in billions USD.
    pub amount_billions: f64,
    /// Floor that rebalancing may not cut below.
    #[serde(default)]
    pub minimum_percent: f64,
    /// Frozen categories are never shrunk to fund others.
    #[serde(default)]
    pub frozen: bool,
    /// Earmarked sub-amounts, e.g. defense `procurement`.
    #[serde(default)]
    pub breakdown: BTreeMap<String, f64>,
}

/// Government finances.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub total_revenue_billions: f64,
    pub total_expenditure_billions: f64,
    pub deficit_billions: f64,
    pub deficit_to_gdp_percent: f64,
    /// Overall tax rate in percent.
    pub tax_rate: f64,
    pub min_tax_rate: f64,
    pub max_tax_rate: f64,
    pub allocation: BTreeMap<String, BudgetCategory>,
}

impl Budget {
    /// Sum of allocation percentages; 100 after any rebalance.
    pub fn allocation_sum(&self) -> f64 {
        self.allocation.values().map(|c| c.percent_of_budget).sum()
    }
}

/// An economic sector such as technology or agriculture.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    /// Development level in [0,100].
    pub level: f64,
    pub gdp_contribution_billions: f64,
    pub employment: u64,
    #[serde(default)]
    pub growth_rate: f64,
    /// Investment started during the current period.
    #[serde(default)]
    pub recent_investment_billions: f64,
    /// Free workers needed per expertise pool before investing.
    #[serde(default)]
    pub workforce_required: BTreeMap<String, u64>,
    /// Infrastructure dot-paths and their minimum values.
    #[serde(default)]
    pub infrastructure_required: BTreeMap<String, f64>,
}

/// Bilateral trade flows with a partner, annual figures.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    #[serde(default)]
    pub exports_billions: f64,
    #[serde(default)]
    pub imports_billions: f64,
    /// Exports minus imports.
    #[serde(default)]
    pub balance_billions: f64,
}

/// Relation with another country.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// Score in [-100,100].
    pub score: f64,
    #[serde(default)]
    pub trade: Trade,
    #[serde(default)]
    pub treaties: Vec<String>,
}

/// Equipment in service, merged by model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Model name, e.g. "F-35 Lightning II".
    pub model: String,
    /// Catalog identifier when the item was procured through the catalog.
    #[serde(default)]
    pub weapon_id: Option<String>,
    pub category: String,
    #[serde(default)]
    pub subcategory: String,
    pub quantity: u32,
    #[serde(default)]
    pub source_country: Option<String>,
    #[serde(with = "rust_decimal::serde::str")]
    pub unit_cost_millions: Decimal,
    #[serde(default)]
    pub avg_age_years: f64,
}

/// An event instance that is currently in effect.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActiveEvent {
    pub instance_id: String,
    /// Catalog key of the definition it was instantiated from.
    pub definition_id: String,
    pub name: String,
    pub category: String,
    pub severity: Severity,
    /// Deltas applied once when the event fired.
    pub effects: BTreeMap<String, f64>,
    pub duration_months: u32,
    pub months_remaining: u32,
    pub triggered_on: NaiveDate,
    #[serde(default)]
    pub responses: Vec<String>,
    #[serde(default)]
    pub response_given: Option<String>,
}

/// Complete state of one country at a point in simulated time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CountryState {
    pub meta: Meta,
    pub demographics: Demographics,
    pub workforce: Workforce,
    pub infrastructure: Infrastructure,
    pub economy: Economy,
    pub budget: Budget,
    pub sectors: BTreeMap<String, Sector>,
    pub military: Military,
    pub inventory: Vec<InventoryItem>,
    pub relations: BTreeMap<String, Relation>,
    /// Composite indices in [0,100]: happiness, stability, public_trust, ...
    pub indices: BTreeMap<String, f64>,
    /// In-flight multi-tick commitments.
    #[serde(default)]
    pub commitments: Vec<Commitment>,
    #[serde(default)]
    pub active_events: Vec<ActiveEvent>,
}

impl CountryState {
    /// Current simulated year.
    pub fn year(&self) -> i32 {
        self.meta.current_date.year()
    }

    /// Mint a fresh identifier, e.g. `order-TST-12`.
    pub fn mint_id(&mut self, prefix: &str) -> String {
        self.meta.next_id += 1;
        format!("{}-{}-{}", prefix, self.meta.country_code, self.meta.next_id)
    }

    /// Index value or `default` when the index is not tracked yet.
    pub fn index(&self, name: &str, default: f64) -> f64 {
        self.indices.get(name).copied().unwrap_or(default)
    }

    /// Shift an index by `delta`, clamped to [0,100]. Returns the new value.
    pub fn adjust_index(&mut self, name: &str, delta: f64, default: f64) -> f64 {
        let entry = self.indices.entry(name.to_string()).or_insert(default);
        *entry = (*entry + delta).clamp(0.0, 100.0);
        *entry
    }

    /// Shift the relation score with `country`, clamped to [-100,100].
    pub fn adjust_relation(&mut self, country: &str, delta: f64) {
        if let Some(rel) = self.relations.get_mut(country) {
            rel.score = (rel.score + delta).clamp(-100.0, 100.0);
        }
    }

    /// Recompute ratios derived from absolute figures.
    pub fn refresh_derived(&mut self) {
        let gdp = self.economy.gdp_billions_usd;
        let population = self.demographics.total_population.max(1) as f64;
        self.economy.gdp_per_capita_usd = gdp * 1e9 / population;
        if gdp > 0.0 {
            self.economy.debt.debt_to_gdp_percent = self.economy.debt.total_billions / gdp * 100.0;
            self.budget.deficit_to_gdp_percent = self.budget.deficit_billions / gdp * 100.0;
        }
        let monthly_imports = self.budget.total_expenditure_billions * 0.25 / 12.0;
        if monthly_imports > 0.0 {
            self.economy.reserves.months_of_imports_covered =
                self.economy.reserves.foreign_reserves_billions / monthly_imports;
        }
    }

    /// Clamp every bounded score back into its domain.
    pub fn normalize(&mut self) {
        for v in self.indices.values_mut() {
            *v = v.clamp(0.0, 100.0);
        }
        for rel in self.relations.values_mut() {
            rel.score = rel.score.clamp(-100.0, 100.0);
        }
        for sector in self.sectors.values_mut() {
            sector.level = sector.level.clamp(0.0, 100.0);
        }
        for pool in self.workforce.expertise_pools.values_mut() {
            pool.employed = pool.employed.min(pool.available);
        }
        self.workforce.unemployment_rate = self.workforce.unemployment_rate.clamp(0.0, 100.0);
        self.military.readiness = self.military.readiness.clamp(0.0, 100.0);
        for unit in self.military.units.values_mut() {
            unit.clamp_stats();
        }
    }

    pub fn commitment(&self, id: &CommitmentId) -> Option<&Commitment> {
        self.commitments.iter().find(|c| &c.id == id)
    }

    pub fn commitment_mut(&mut self, id: &CommitmentId) -> Option<&mut Commitment> {
        self.commitments.iter_mut().find(|c| &c.id == id)
    }

    /// Remove a commitment from the ledger.
    pub fn take_commitment(&mut self, id: &CommitmentId) -> Option<Commitment> {
        let pos = self.commitments.iter().position(|c| &c.id == id)?;
        Some(self.commitments.remove(pos))
    }

    /// Model names and catalog ids of all equipment in service.
    pub fn owned_models(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for item in self.inventory.iter().filter(|i| i.quantity > 0) {
            out.push(item.model.as_str());
            if let Some(id) = &item.weapon_id {
                out.push(id.as_str());
            }
        }
        for unit in self.military.units.values() {
            out.push(unit.unit_type.as_str());
        }
        out
    }
}
