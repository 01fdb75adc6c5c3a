#![deny(warnings)]

//! Core domain model and invariants for the nation simulation.
//!
//! This crate defines the serializable country snapshot, the read-only
//! catalogs, the dot-path resolver, the constraint engine every mutating
//! action passes through, and the error types shared by all engines.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod catalog;
pub mod commitments;
pub mod constraints;
pub mod military;
pub mod notify;
pub mod path;
pub mod state;
pub mod testing;

pub use catalog::{Catalogs, ConstraintTemplate, Severity, WeaponDefinition};
pub use commitments::{Cadence, Commitment, CommitmentId, CommitmentKind};
pub use constraints::{check_all, failed_only, Constraint, ConstraintKind, ConstraintResult};
pub use notify::Notification;
pub use state::CountryState;

/// How an event definition behaves while an instance of it is active.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetriggerPolicy {
    /// No new instance while one is active.
    #[default]
    Block,
    /// Instances may stack.
    Stack,
}

/// Runtime configuration of a simulation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed for every random draw.
    pub rng_seed: u64,
    /// Wall-clock milliseconds per simulated day at speed 1.0.
    pub realtime_base_interval_ms: u64,
    /// Operation/movement sub-steps per simulated day.
    pub operation_substeps_per_day: u32,
    /// Policy for event definitions that do not set one.
    pub default_retrigger: RetriggerPolicy,
    /// Overrides the snapshot's baseline GDP for revenue scaling.
    pub baseline_gdp_billions: Option<f64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            rng_seed: 42,
            realtime_base_interval_ms: 1000,
            operation_substeps_per_day: 24,
            default_retrigger: RetriggerPolicy::Block,
            baseline_gdp_billions: None,
        }
    }
}

impl SimConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self, SimError> {
        serde_yaml::from_str(s).map_err(|e| SimError::Catalog(format!("config: {}", e)))
    }
}

/// Integrity problems in snapshots and catalogs.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("non-finite value at {0}")]
    NonFinite(String),
    #[error("{field} = {value} outside its domain")]
    OutOfRange { field: String, value: f64 },
    #[error("pool {0} employs more than are available")]
    EmployedExceedsAvailable(String),
    #[error("budget allocation sums to {0}, expected 100")]
    AllocationSum(f64),
    #[error("unit {unit} references unknown base {base}")]
    UnknownBase { unit: String, base: String },
    #[error("catalog entry {0} has a negative or zero cost")]
    NonPositiveCost(String),
    #[error("catalog entry {0} has an invalid duration")]
    InvalidDuration(String),
}

/// Fatal faults. Any of these aborts the current tick.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("non-finite value produced at {0}")]
    NonFinite(String),
    #[error("integrity violation: {0}")]
    Integrity(String),
    #[error("cannot apply effect at {path}: {reason}")]
    Path { path: String, reason: String },
    #[error("snapshot conversion failed: {0}")]
    Serde(String),
    #[error("catalog error: {0}")]
    Catalog(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// A player action that could not be carried out. The snapshot is unchanged.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ActionError {
    #[error("unknown {kind} '{id}'")]
    Unknown { kind: &'static str, id: String },
    #[error("{} constraint(s) not met", failed_count(.0))]
    ConstraintsNotMet(Vec<ConstraintResult>),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
}

fn failed_count(results: &[ConstraintResult]) -> usize {
    results.iter().filter(|r| !r.satisfied).count()
}

impl ActionError {
    pub fn unknown(kind: &'static str, id: impl Into<String>) -> Self {
        ActionError::Unknown { kind, id: id.into() }
    }

    /// Constraint results explaining the failure, if any.
    pub fn breakdown(&self) -> &[ConstraintResult] {
        match self {
            ActionError::ConstraintsNotMet(results) => results,
            _ => &[],
        }
    }
}

fn finite(field: &str, v: f64) -> Result<(), ValidationError> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::NonFinite(field.to_string()))
    }
}

fn bounded(field: &str, v: f64, lo: f64, hi: f64) -> Result<(), ValidationError> {
    finite(field, v)?;
    if v < lo - 1e-9 || v > hi + 1e-9 {
        return Err(ValidationError::OutOfRange { field: field.to_string(), value: v });
    }
    Ok(())
}

/// Validate a snapshot: finite KPIs, bounded scores, pools and references.
pub fn validate_state(state: &CountryState) -> Result<(), ValidationError> {
    let e = &state.economy;
    for (field, v) in [
        ("economy.gdp_billions_usd", e.gdp_billions_usd),
        ("economy.gdp_growth_rate", e.gdp_growth_rate),
        ("economy.inflation_rate", e.inflation_rate),
        ("economy.debt.total_billions", e.debt.total_billions),
        ("economy.debt.debt_to_gdp_percent", e.debt.debt_to_gdp_percent),
        ("economy.reserves.foreign_reserves_billions", e.reserves.foreign_reserves_billions),
        ("budget.total_revenue_billions", state.budget.total_revenue_billions),
        ("budget.total_expenditure_billions", state.budget.total_expenditure_billions),
        ("budget.deficit_billions", state.budget.deficit_billions),
    ] {
        finite(field, v)?;
    }
    bounded("workforce.unemployment_rate", state.workforce.unemployment_rate, 0.0, 100.0)?;
    bounded("military.readiness", state.military.readiness, 0.0, 100.0)?;
    for (name, v) in &state.indices {
        bounded(&format!("indices.{}", name), *v, 0.0, 100.0)?;
    }
    for (code, rel) in &state.relations {
        bounded(&format!("relations.{}.score", code), rel.score, -100.0, 100.0)?;
    }
    for (name, s) in &state.sectors {
        bounded(&format!("sectors.{}.level", name), s.level, 0.0, 100.0)?;
        finite(&format!("sectors.{}.gdp_contribution_billions", name), s.gdp_contribution_billions)?;
    }
    for (name, p) in &state.workforce.expertise_pools {
        if p.employed > p.available {
            return Err(ValidationError::EmployedExceedsAvailable(name.clone()));
        }
    }
    for (name, c) in &state.budget.allocation {
        bounded(&format!("budget.allocation.{}", name), c.percent_of_budget, 0.0, 100.0)?;
    }
    if !state.budget.allocation.is_empty() {
        let sum = state.budget.allocation_sum();
        if (sum - 100.0).abs() > 0.01 {
            return Err(ValidationError::AllocationSum(sum));
        }
    }
    for unit in state.military.units.values() {
        if !state.military.bases.contains_key(&unit.home_base) {
            return Err(ValidationError::UnknownBase {
                unit: unit.id.clone(),
                base: unit.home_base.clone(),
            });
        }
        bounded(&format!("units.{}.health", unit.id), unit.health, 0.0, 100.0)?;
        bounded(&format!("units.{}.fuel", unit.id), unit.fuel, 0.0, 100.0)?;
    }
    Ok(())
}

/// Validate catalogs: positive costs and usable durations.
pub fn validate_catalogs(catalogs: &Catalogs) -> Result<(), ValidationError> {
    for (id, w) in &catalogs.weapons {
        if w.unit_cost_millions <= rust_decimal::Decimal::ZERO {
            return Err(ValidationError::NonPositiveCost(id.clone()));
        }
        if w.delivery.min_years > w.delivery.max_years || w.production_rate_per_year == 0 {
            return Err(ValidationError::InvalidDuration(id.clone()));
        }
    }
    for (id, p) in &catalogs.infrastructure_projects {
        if !(p.cost_billions.is_finite() && p.cost_billions > 0.0) {
            return Err(ValidationError::NonPositiveCost(id.clone()));
        }
        if p.duration_quarters == 0 {
            return Err(ValidationError::InvalidDuration(id.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_catalogs, sample_country};
    use proptest::prelude::*;

    #[test]
    fn sample_fixtures_are_valid() {
        validate_state(&sample_country()).unwrap();
        validate_catalogs(&sample_catalogs()).unwrap();
    }

    #[test]
    fn snapshot_roundtrips_through_json() {
        let state = sample_country();
        let s = serde_json::to_string_pretty(&state).unwrap();
        let back: CountryState = serde_json::from_str(&s).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn detects_overemployed_pool_and_bad_sum() {
        let mut state = sample_country();
        state.workforce.expertise_pools.get_mut("doctors").unwrap().employed = 1_000_000;
        assert_eq!(
            validate_state(&state),
            Err(ValidationError::EmployedExceedsAvailable("doctors".into()))
        );
        let mut state = sample_country();
        state.budget.allocation.get_mut("defense").unwrap().percent_of_budget += 5.0;
        assert!(matches!(validate_state(&state), Err(ValidationError::AllocationSum(_))));
    }

    #[test]
    fn nan_gdp_is_rejected() {
        let mut state = sample_country();
        state.economy.gdp_billions_usd = f64::NAN;
        assert!(matches!(validate_state(&state), Err(ValidationError::NonFinite(_))));
    }

    #[test]
    fn config_defaults_fill_missing_keys() {
        let cfg = SimConfig::from_yaml_str("rng_seed: 7\n").unwrap();
        assert_eq!(cfg.rng_seed, 7);
        assert_eq!(cfg.operation_substeps_per_day, 24);
        assert_eq!(cfg.default_retrigger, RetriggerPolicy::Block);
    }

    #[test]
    fn action_error_exposes_breakdown() {
        let state = sample_country();
        let cs = vec![Constraint::Relations { country: "RUS".into(), min_score: 0.0 }];
        let err = ActionError::ConstraintsNotMet(failed_only(&state, &cs));
        assert_eq!(err.breakdown().len(), 1);
        assert_eq!(err.to_string(), "1 constraint(s) not met");
        assert!(ActionError::unknown("weapon", "x").breakdown().is_empty());
    }

    proptest! {
        #[test]
        fn normalize_restores_score_bounds(h in -1e4f64..1e4, r in -1e4f64..1e4) {
            let mut state = sample_country();
            state.indices.insert("happiness".into(), h);
            state.relations.get_mut("USA").unwrap().score = r;
            state.normalize();
            prop_assert!(validate_state(&state).is_ok());
        }
    }
}
