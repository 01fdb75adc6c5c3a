//! Yearly population, labor force and expertise pool updates.

use serde::{Deserialize, Serialize};
use sim_core::state::MigrationPolicy;
use sim_core::{CountryState, Notification};
use std::collections::BTreeMap;
use tracing::{info, instrument};

/// Share of each cohort that ages into the next one per year.
const AGING_RATE: f64 = 0.067;
/// Yearly loss of qualified people to retirement and emigration.
const POOL_ATTRITION: f64 = 0.03;

/// Expertise pools fed by each education level.
const GRADUATE_POOLS: [(&str, &[&str]); 4] = [
    ("bachelors", &["software_engineers", "engineers"]),
    ("masters", &["software_engineers", "engineers", "doctors"]),
    ("phd", &["doctors"]),
    ("vocational", &["skilled_trades"]),
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PopulationChange {
    pub births: u64,
    pub deaths: u64,
    pub migration: i64,
    pub net_change: i64,
    pub new_total: u64,
}

/// Pool changes: graduates added and attrition removed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolChange {
    pub added: u64,
    pub attrition: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct YearlyDemographics {
    pub population: PopulationChange,
    pub working_age_population: u64,
    pub active_labor_force: u64,
    pub pools: BTreeMap<String, PoolChange>,
    pub median_age: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyChange {
    pub policy: MigrationPolicy,
    pub net_migration_per_1000: f64,
    pub stability_delta: f64,
}

fn policy_effects(policy: MigrationPolicy) -> (f64, f64) {
    match policy {
        MigrationPolicy::Open => (5.0, -3.0),
        MigrationPolicy::Moderate => (2.0, 0.0),
        MigrationPolicy::Closed => (-1.0, 2.0),
    }
}

fn update_population(state: &mut CountryState) -> PopulationChange {
    let d = &mut state.demographics;
    let pop = d.total_population as f64;
    let births = (pop * d.birth_rate_per_1000 / 1000.0).max(0.0) as u64;
    let deaths = (pop * d.death_rate_per_1000 / 1000.0).max(0.0) as u64;
    let migration = (pop * d.net_migration_per_1000 / 1000.0) as i64;
    let net_change = births as i64 - deaths as i64 + migration;
    let new_total = (d.total_population as i64 + net_change).max(0) as u64;
    d.total_population = new_total;
    PopulationChange { births, deaths, migration, net_change, new_total }
}

fn cohort(dist: &BTreeMap<String, f64>, key: &str, default: f64) -> f64 {
    dist.get(key).copied().unwrap_or(default)
}

fn update_age_distribution(state: &mut CountryState, births: u64, old_population: u64) {
    let d = &mut state.demographics;
    let dist = &d.age_distribution;
    let c0 = cohort(dist, "0_14", 0.20);
    let c1 = cohort(dist, "15_24", 0.15);
    let c2 = cohort(dist, "25_54", 0.40);
    let c3 = cohort(dist, "55_64", 0.12);
    let c4 = cohort(dist, "65_plus", 0.13);
    let born = births as f64 / old_population.max(1) as f64;
    let next = [
        ("0_14", c0 * (1.0 - AGING_RATE) + born),
        ("15_24", c1 * (1.0 - AGING_RATE) + c0 * AGING_RATE * 0.7),
        ("25_54", c2 * (1.0 - AGING_RATE * 0.5) + c1 * AGING_RATE),
        ("55_64", c3 * (1.0 - AGING_RATE) + c2 * AGING_RATE * 0.3),
        ("65_plus", c4 * 0.97 + c3 * AGING_RATE),
    ];
    let total: f64 = next.iter().map(|(_, v)| v).sum();
    if total > 0.0 {
        for (k, v) in next {
            d.age_distribution.insert(k.to_string(), v / total);
        }
    }
}

fn update_labor_force(state: &mut CountryState) {
    let d = &mut state.demographics;
    let dist = &d.age_distribution;
    let share = cohort(dist, "15_24", 0.15) + cohort(dist, "25_54", 0.40) + cohort(dist, "55_64", 0.12);
    d.working_age_population = (d.total_population as f64 * share) as u64;
    d.active_labor_force = (d.working_age_population as f64 * d.labor_force_participation) as u64;
}

fn update_pools(state: &mut CountryState) -> BTreeMap<String, PoolChange> {
    let grads = &state.workforce.annual_graduates;
    let mut added: BTreeMap<&str, u64> = BTreeMap::new();
    for (level, pools) in GRADUATE_POOLS {
        let count = grads.get(level).copied().unwrap_or(0);
        let per_pool = count / pools.len().max(1) as u64;
        for pool in pools {
            *added.entry(*pool).or_insert(0) += per_pool;
        }
    }
    let mut changes = BTreeMap::new();
    for (name, pool) in state.workforce.expertise_pools.iter_mut() {
        let add = added.get(name.as_str()).copied().unwrap_or(0);
        let attrition = (pool.available as f64 * POOL_ATTRITION) as u64;
        let next = (pool.available + add).saturating_sub(attrition);
        // Attrition never takes people out of jobs.
        pool.available = next.max(pool.employed);
        changes.insert(name.clone(), PoolChange { added: add, attrition });
    }
    changes
}

fn update_median_age(state: &mut CountryState) {
    let d = &mut state.demographics;
    let m = if d.birth_rate_per_1000 > d.death_rate_per_1000 * 1.5 {
        (d.median_age - 0.1).max(20.0)
    } else if d.birth_rate_per_1000 < d.death_rate_per_1000 {
        (d.median_age + 0.2).min(55.0)
    } else {
        (d.median_age + 0.1).min(55.0)
    };
    d.median_age = (m * 10.0).round() / 10.0;
}

/// The yearly demographic step.
#[instrument(level = "debug", skip_all, fields(country = %state.meta.country_code))]
pub fn yearly_update(state: &mut CountryState) -> (YearlyDemographics, Vec<Notification>) {
    let old_population = state.demographics.total_population;
    let population = update_population(state);
    update_age_distribution(state, population.births, old_population);
    update_labor_force(state);
    let pools = update_pools(state);
    update_median_age(state);
    state.refresh_derived();
    info!(
        total = population.new_total,
        change = population.net_change,
        "population updated"
    );
    let note = Notification::PopulationUpdated {
        total: population.new_total,
        change: population.net_change,
    };
    let d = &state.demographics;
    let report = YearlyDemographics {
        working_age_population: d.working_age_population,
        active_labor_force: d.active_labor_force,
        median_age: d.median_age,
        population,
        pools,
    };
    (report, vec![note])
}

/// Change immigration policy; sets the migration rate and shifts stability.
pub fn set_migration_policy(state: &mut CountryState, policy: MigrationPolicy) -> PolicyChange {
    let (rate, stability) = policy_effects(policy);
    state.demographics.net_migration_per_1000 = rate;
    state.demographics.migration_policy = policy;
    state.adjust_index("stability", stability, 70.0);
    info!(?policy, "migration policy set");
    PolicyChange { policy, net_migration_per_1000: rate, stability_delta: stability }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_core::testing::sample_country;

    #[test]
    fn population_follows_vital_rates() {
        let mut state = sample_country();
        let (report, notes) = yearly_update(&mut state);
        // 50M at 11 births, 9 deaths and 2 migrants per 1000.
        assert_eq!(report.population.births, 550_000);
        assert_eq!(report.population.deaths, 450_000);
        assert_eq!(report.population.migration, 100_000);
        assert_eq!(state.demographics.total_population, 50_200_000);
        assert_eq!(notes.len(), 1);
    }

    #[test]
    fn age_distribution_stays_normalized() {
        let mut state = sample_country();
        for _ in 0..10 {
            yearly_update(&mut state);
        }
        let sum: f64 = state.demographics.age_distribution.values().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(state.demographics.working_age_population < state.demographics.total_population);
    }

    #[test]
    fn graduates_flow_into_pools_with_attrition() {
        let mut state = sample_country();
        let (report, _) = yearly_update(&mut state);
        // Doctors: 60k/3 masters + 8k phd, minus 3% of 150k.
        let doctors = &report.pools["doctors"];
        assert_eq!(doctors.added, 28_000);
        assert_eq!(doctors.attrition, 4_500);
        assert_eq!(state.workforce.expertise_pools["doctors"].available, 173_500);
        // Pilots get no graduates but never drop below employment.
        let pilots = &state.workforce.expertise_pools["pilots"];
        assert!(pilots.available >= pilots.employed);
    }

    #[test]
    fn attrition_never_undercuts_employment() {
        let mut state = sample_country();
        let pool = state.workforce.expertise_pools.get_mut("pilots").unwrap();
        pool.employed = pool.available;
        yearly_update(&mut state);
        let pool = &state.workforce.expertise_pools["pilots"];
        assert_eq!(pool.available, pool.employed);
    }

    #[test]
    fn median_age_drifts_with_rates() {
        let mut state = sample_country();
        yearly_update(&mut state);
        assert_eq!(state.demographics.median_age, 38.6);
        state.demographics.birth_rate_per_1000 = 30.0;
        yearly_update(&mut state);
        assert_eq!(state.demographics.median_age, 38.5);
    }

    #[test]
    fn migration_policy_sets_rate_and_stability() {
        let mut state = sample_country();
        let change = set_migration_policy(&mut state, MigrationPolicy::Open);
        assert_eq!(change.net_migration_per_1000, 5.0);
        assert_eq!(state.indices["stability"], 62.0);
        set_migration_policy(&mut state, MigrationPolicy::Closed);
        assert_eq!(state.demographics.net_migration_per_1000, -1.0);
        assert_eq!(state.indices["stability"], 64.0);
    }
}
