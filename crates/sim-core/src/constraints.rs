//! Pure validation of proposed actions against a snapshot.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::path::StateView;
use crate::state::CountryState;

/// Political capital assumed when the index is not tracked.
pub const DEFAULT_POLITICAL_CAPITAL: f64 = 50.0;

/// A precondition an action must satisfy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    /// `available(category) >= amount_billions`.
    Budget { category: String, amount_billions: f64 },
    /// Free workers per expertise pool.
    Workforce { requirements: BTreeMap<String, u64> },
    /// Minimum values at dot-paths of the state.
    Infrastructure { requirements: BTreeMap<String, f64> },
    Relations { country: String, min_score: f64 },
    SectorLevel { sector: String, min_level: f64 },
    /// None of these models or weapon ids may be in service.
    Exclusion { forbidden: Vec<String> },
    Political { min_capital: f64 },
    /// At least `months` since `action` was last used.
    Cooldown { action: String, months: u32 },
}

impl Constraint {
    pub fn kind(&self) -> ConstraintKind {
        match self {
            Constraint::Budget { .. } => ConstraintKind::Budget,
            Constraint::Workforce { .. } => ConstraintKind::Workforce,
            Constraint::Infrastructure { .. } => ConstraintKind::Infrastructure,
            Constraint::Relations { .. } => ConstraintKind::Relations,
            Constraint::SectorLevel { .. } => ConstraintKind::SectorLevel,
            Constraint::Exclusion { .. } => ConstraintKind::Exclusion,
            Constraint::Political { .. } => ConstraintKind::Political,
            Constraint::Cooldown { .. } => ConstraintKind::Cooldown,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Budget,
    Workforce,
    Infrastructure,
    Relations,
    SectorLevel,
    Exclusion,
    Political,
    Cooldown,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConstraintKind::Budget => "budget",
            ConstraintKind::Workforce => "workforce",
            ConstraintKind::Infrastructure => "infrastructure",
            ConstraintKind::Relations => "relations",
            ConstraintKind::SectorLevel => "sector_level",
            ConstraintKind::Exclusion => "exclusion",
            ConstraintKind::Political => "political",
            ConstraintKind::Cooldown => "cooldown",
        };
        f.write_str(s)
    }
}

/// Outcome of a single check. Never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstraintResult {
    pub satisfied: bool,
    pub kind: ConstraintKind,
    pub message: String,
    pub current_value: Option<f64>,
    pub required_value: Option<f64>,
    pub missing_items: Vec<String>,
}

impl ConstraintResult {
    fn new(kind: ConstraintKind, satisfied: bool, message: impl Into<String>) -> Self {
        Self {
            satisfied,
            kind,
            message: message.into(),
            current_value: None,
            required_value: None,
            missing_items: Vec::new(),
        }
    }

    fn values(mut self, current: f64, required: f64) -> Self {
        self.current_value = Some(current);
        self.required_value = Some(required);
        self
    }

    fn missing(mut self, items: Vec<String>) -> Self {
        self.missing_items = items;
        self
    }
}

/// Money available for a budget category in billions.
///
/// Some categories are views of others: `procurement` is the defense
/// procurement earmark, `development` half of infrastructure and `aid`
/// 30% of foreign affairs. Unknown categories have nothing available.
pub fn available_budget(state: &CountryState, category: &str) -> Option<f64> {
    let alloc = &state.budget.allocation;
    match category {
        "procurement" => alloc
            .get("defense")
            .map(|d| d.breakdown.get("procurement").copied().unwrap_or(0.0)),
        "development" => alloc.get("infrastructure").map(|c| c.amount_billions * 0.5),
        "aid" => alloc.get("foreign_affairs").map(|c| c.amount_billions * 0.3),
        other => alloc.get(other).map(|c| c.amount_billions),
    }
}

/// Whole calendar months from `from` to `to`, never negative.
pub fn months_between(from: NaiveDate, to: NaiveDate) -> u32 {
    let months = (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32;
    let months = if to.day() < from.day() { months - 1 } else { months };
    months.max(0) as u32
}

/// Evaluate one constraint.
pub fn check(state: &CountryState, constraint: &Constraint) -> ConstraintResult {
    check_with(state, &mut LazyView::new(state), constraint)
}

/// Evaluate every constraint, never stopping at the first failure.
pub fn check_all(state: &CountryState, constraints: &[Constraint]) -> (bool, Vec<ConstraintResult>) {
    let mut view = LazyView::new(state);
    let results: Vec<ConstraintResult> = constraints
        .iter()
        .map(|c| check_with(state, &mut view, c))
        .collect();
    (results.iter().all(|r| r.satisfied), results)
}

/// Only the failed results of [`check_all`].
pub fn failed_only(state: &CountryState, constraints: &[Constraint]) -> Vec<ConstraintResult> {
    let (_, results) = check_all(state, constraints);
    results.into_iter().filter(|r| !r.satisfied).collect()
}

struct LazyView<'a> {
    state: &'a CountryState,
    view: Option<Option<StateView>>,
}

impl<'a> LazyView<'a> {
    fn new(state: &'a CountryState) -> Self {
        Self { state, view: None }
    }

    fn get(&mut self) -> Option<&StateView> {
        let state = self.state;
        self.view
            .get_or_insert_with(|| StateView::capture(state).ok())
            .as_ref()
    }
}

fn check_with(state: &CountryState, view: &mut LazyView<'_>, constraint: &Constraint) -> ConstraintResult {
    match constraint {
        Constraint::Budget { category, amount_billions } => check_budget(state, category, *amount_billions),
        Constraint::Workforce { requirements } => check_workforce(state, requirements),
        Constraint::Infrastructure { requirements } => check_infrastructure(view, requirements),
        Constraint::Relations { country, min_score } => check_relations(state, country, *min_score),
        Constraint::SectorLevel { sector, min_level } => check_sector(state, sector, *min_level),
        Constraint::Exclusion { forbidden } => check_exclusion(state, forbidden),
        Constraint::Political { min_capital } => {
            let current = state.index("political_capital", DEFAULT_POLITICAL_CAPITAL);
            let ok = current >= *min_capital;
            let msg = if ok {
                "Sufficient political capital".to_string()
            } else {
                format!("Political capital {:.1} below required {:.1}", current, min_capital)
            };
            ConstraintResult::new(ConstraintKind::Political, ok, msg).values(current, *min_capital)
        }
        Constraint::Cooldown { action, months } => check_cooldown(state, action, *months),
    }
}

fn check_budget(state: &CountryState, category: &str, requested: f64) -> ConstraintResult {
    let Some(available) = available_budget(state, category) else {
        return ConstraintResult::new(
            ConstraintKind::Budget,
            false,
            format!("Unknown budget category '{}'", category),
        )
        .values(0.0, requested)
        .missing(vec![category.to_string()]);
    };
    let ok = available >= requested;
    let msg = if ok {
        format!("Budget '{}' covers ${:.2}B", category, requested)
    } else {
        format!(
            "Budget '{}' has ${:.2}B, ${:.2}B required",
            category, available, requested
        )
    };
    ConstraintResult::new(ConstraintKind::Budget, ok, msg).values(available, requested)
}

fn check_workforce(state: &CountryState, requirements: &BTreeMap<String, u64>) -> ConstraintResult {
    let mut missing = Vec::new();
    let mut shortfall_total: u64 = 0;
    for (pool, required) in requirements {
        match state.workforce.expertise_pools.get(pool) {
            None => missing.push(format!("{}: not found", pool)),
            Some(p) => {
                let free = p.free();
                if free < *required {
                    missing.push(format!("{}: need {}, {} free", pool, required, free));
                    shortfall_total += required - free;
                }
            }
        }
    }
    let ok = missing.is_empty();
    let msg = if ok {
        "Workforce available".to_string()
    } else {
        format!("Workforce short in {} pool(s)", missing.len())
    };
    let required: u64 = requirements.values().sum();
    ConstraintResult::new(ConstraintKind::Workforce, ok, msg)
        .values(required.saturating_sub(shortfall_total) as f64, required as f64)
        .missing(missing)
}

fn check_infrastructure(view: &mut LazyView<'_>, requirements: &BTreeMap<String, f64>) -> ConstraintResult {
    let Some(view) = view.get() else {
        return ConstraintResult::new(
            ConstraintKind::Infrastructure,
            false,
            "State could not be inspected",
        );
    };
    let mut missing = Vec::new();
    for (path, required) in requirements {
        match view.number(path) {
            None => missing.push(format!("{}: not present", path)),
            Some(v) if v < *required => missing.push(format!("{}: {:.1} < {:.1}", path, v, required)),
            Some(_) => {}
        }
    }
    let ok = missing.is_empty();
    let msg = if ok {
        "Infrastructure requirements met".to_string()
    } else {
        format!("{} infrastructure requirement(s) unmet", missing.len())
    };
    ConstraintResult::new(ConstraintKind::Infrastructure, ok, msg).missing(missing)
}

fn check_relations(state: &CountryState, country: &str, min_score: f64) -> ConstraintResult {
    let current = state.relations.get(country).map(|r| r.score).unwrap_or(0.0);
    let ok = current >= min_score;
    let msg = if ok {
        format!("Relations with {} sufficient", country)
    } else {
        format!("Relations with {} are {:.0}, {:.0} required", country, current, min_score)
    };
    ConstraintResult::new(ConstraintKind::Relations, ok, msg).values(current, min_score)
}

fn check_sector(state: &CountryState, sector: &str, min_level: f64) -> ConstraintResult {
    match state.sectors.get(sector) {
        None => ConstraintResult::new(
            ConstraintKind::SectorLevel,
            false,
            format!("Unknown sector '{}'", sector),
        )
        .values(0.0, min_level)
        .missing(vec![sector.to_string()]),
        Some(s) => {
            let ok = s.level >= min_level;
            let msg = if ok {
                format!("Sector {} at level {:.1}", sector, s.level)
            } else {
                format!("Sector {} level {:.1} below {:.1}", sector, s.level, min_level)
            };
            ConstraintResult::new(ConstraintKind::SectorLevel, ok, msg).values(s.level, min_level)
        }
    }
}

fn check_exclusion(state: &CountryState, forbidden: &[String]) -> ConstraintResult {
    let owned = state.owned_models();
    let mut conflicts: Vec<String> = forbidden
        .iter()
        .filter(|f| owned.iter().any(|o| o.eq_ignore_ascii_case(f)))
        .cloned()
        .collect();
    conflicts.dedup();
    let ok = conflicts.is_empty();
    let msg = if ok {
        "No conflicting equipment".to_string()
    } else {
        format!("Operating conflicting equipment: {}", conflicts.join(", "))
    };
    ConstraintResult::new(ConstraintKind::Exclusion, ok, msg).missing(conflicts)
}

fn check_cooldown(state: &CountryState, action: &str, months: u32) -> ConstraintResult {
    match state.meta.cooldowns.get(action) {
        None => ConstraintResult::new(
            ConstraintKind::Cooldown,
            true,
            format!("'{}' has not been used", action),
        ),
        Some(last) => {
            let elapsed = months_between(*last, state.meta.current_date);
            let ok = elapsed >= months;
            let msg = if ok {
                format!("'{}' is off cooldown", action)
            } else {
                format!("'{}' available in {} month(s)", action, months - elapsed)
            };
            ConstraintResult::new(ConstraintKind::Cooldown, ok, msg).values(elapsed as f64, months as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_country;
    use proptest::prelude::*;

    fn workforce(pool: &str, n: u64) -> Constraint {
        let mut requirements = BTreeMap::new();
        requirements.insert(pool.to_string(), n);
        Constraint::Workforce { requirements }
    }

    #[test]
    fn workforce_boundary_is_available_minus_employed() {
        let state = sample_country();
        let pool = &state.workforce.expertise_pools["software_engineers"];
        let free = pool.available - pool.employed;
        assert!(check(&state, &workforce("software_engineers", free)).satisfied);
        let over = check(&state, &workforce("software_engineers", free + 1));
        assert!(!over.satisfied);
        assert_eq!(over.missing_items.len(), 1);
    }

    #[test]
    fn unknown_pool_is_reported_not_found() {
        let state = sample_country();
        let r = check(&state, &workforce("astronauts", 1));
        assert!(!r.satisfied);
        assert!(r.missing_items[0].contains("not found"));
    }

    #[test]
    fn check_all_reports_every_failure() {
        let state = sample_country();
        let constraints = vec![
            Constraint::Budget { category: "procurement".into(), amount_billions: 1e6 },
            Constraint::Relations { country: "RUS".into(), min_score: 10.0 },
            Constraint::SectorLevel { sector: "technology".into(), min_level: 0.0 },
        ];
        let (ok, results) = check_all(&state, &constraints);
        assert!(!ok);
        assert_eq!(results.len(), 3);
        assert_eq!(results.iter().filter(|r| !r.satisfied).count(), 2);
        assert_eq!(results[0].kind, ConstraintKind::Budget);
        assert_eq!(results[1].kind, ConstraintKind::Relations);
        assert_eq!(failed_only(&state, &constraints).len(), 2);
    }

    #[test]
    fn unknown_country_scores_zero() {
        let state = sample_country();
        let r = check(&state, &Constraint::Relations { country: "ZZZ".into(), min_score: 0.0 });
        assert!(r.satisfied);
        assert_eq!(r.current_value, Some(0.0));
        let r = check(&state, &Constraint::Relations { country: "ZZZ".into(), min_score: 1.0 });
        assert!(!r.satisfied);
    }

    #[test]
    fn procurement_budget_reads_defense_breakdown() {
        let state = sample_country();
        assert_eq!(available_budget(&state, "procurement"), Some(4.0));
        let infra = state.budget.allocation["infrastructure"].amount_billions;
        assert_eq!(available_budget(&state, "development"), Some(infra * 0.5));
        assert_eq!(available_budget(&state, "space_program"), None);
    }

    #[test]
    fn infrastructure_paths_resolve_against_state() {
        let state = sample_country();
        let mut requirements = BTreeMap::new();
        requirements.insert("infrastructure.digital.internet_penetration".to_string(), 10.0);
        let ok = check(&state, &Constraint::Infrastructure { requirements: requirements.clone() });
        assert!(ok.satisfied, "{}", ok.message);
        requirements.insert("infrastructure.space.launch_sites".to_string(), 1.0);
        let r = check(&state, &Constraint::Infrastructure { requirements });
        assert!(!r.satisfied);
        assert_eq!(r.missing_items.len(), 1);
    }

    #[test]
    fn exclusion_matches_models_in_service() {
        let state = sample_country();
        let owned = state.inventory[0].model.clone();
        let r = check(&state, &Constraint::Exclusion { forbidden: vec![owned, "Nothing".into()] });
        assert!(!r.satisfied);
        assert_eq!(r.missing_items.len(), 1);
        assert!(check(&state, &Constraint::Exclusion { forbidden: vec!["Nothing".into()] }).satisfied);
    }

    #[test]
    fn cooldown_and_political_defaults() {
        let mut state = sample_country();
        let cd = Constraint::Cooldown { action: "emergency_loan".into(), months: 6 };
        assert!(check(&state, &cd).satisfied);
        state.meta.cooldowns.insert(
            "emergency_loan".into(),
            NaiveDate::from_ymd_opt(2023, 10, 1).unwrap(),
        );
        assert!(!check(&state, &cd).satisfied);
        state.indices.remove("political_capital");
        assert!(check(&state, &Constraint::Political { min_capital: 50.0 }).satisfied);
        assert!(!check(&state, &Constraint::Political { min_capital: 51.0 }).satisfied);
    }

    #[test]
    fn months_between_counts_whole_months() {
        let d = |y, m, dd| NaiveDate::from_ymd_opt(y, m, dd).unwrap();
        assert_eq!(months_between(d(2024, 1, 15), d(2024, 3, 14)), 1);
        assert_eq!(months_between(d(2024, 1, 15), d(2024, 3, 15)), 2);
        assert_eq!(months_between(d(2024, 5, 1), d(2024, 1, 1)), 0);
    }

    #[test]
    fn constraint_yaml_uses_kind_tag() {
        let yaml = "kind: relations\ncountry: USA\nmin_score: 70\n";
        let c: Constraint = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(c, Constraint::Relations { country: "USA".into(), min_score: 70.0 });
    }

    proptest! {
        #[test]
        fn validation_is_idempotent(amount in 0.0f64..20.0, score in -100.0f64..100.0, n in 0u64..2_000_000) {
            let state = sample_country();
            let before = state.clone();
            let cs = vec![
                Constraint::Budget { category: "procurement".into(), amount_billions: amount },
                Constraint::Relations { country: "USA".into(), min_score: score },
                workforce("software_engineers", n),
            ];
            let first = check_all(&state, &cs);
            let second = check_all(&state, &cs);
            prop_assert_eq!(first, second);
            prop_assert_eq!(state, before);
        }
    }
}
