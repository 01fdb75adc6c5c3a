#![deny(warnings)]

//! Headless CLI: load a scenario and catalogs, simulate a number of days and
//! print the resulting KPIs.

use anyhow::{Context, Result};
use serde::Serialize;
use sim_core::{Catalogs, CountryState, Notification, SimConfig};
use sim_events::EventCatalog;
use sim_runtime::Simulation;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Args {
    scenario: Option<PathBuf>,
    catalogs: Option<PathBuf>,
    config: Option<PathBuf>,
    days: Option<u32>,
    seed: Option<u64>,
    save: Option<String>,
    export: Option<PathBuf>,
    json: bool,
    /// Flags and values that were not understood.
    ignored: Vec<String>,
}

fn parse_args(argv: impl IntoIterator<Item = String>) -> Args {
    let mut args = Args::default();
    let mut it = argv.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--scenario" => args.scenario = it.next().map(PathBuf::from),
            "--catalogs" => args.catalogs = it.next().map(PathBuf::from),
            "--config" => args.config = it.next().map(PathBuf::from),
            "--days" => args.days = number(&arg, it.next(), &mut args.ignored),
            "--seed" => args.seed = number(&arg, it.next(), &mut args.ignored),
            "--save" => args.save = it.next(),
            "--export" => args.export = it.next().map(PathBuf::from),
            "--json" => args.json = true,
            _ => {
                warn!(flag = %arg, "ignoring unknown argument");
                args.ignored.push(arg);
            }
        }
    }
    args
}

fn number<T: FromStr>(flag: &str, value: Option<String>, ignored: &mut Vec<String>) -> Option<T> {
    let Some(value) = value else {
        warn!(flag, "missing value");
        ignored.push(flag.to_string());
        return None;
    };
    match value.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(flag, %value, "ignoring value that is not a number");
            ignored.push(format!("{flag} {value}"));
            None
        }
    }
}

#[derive(Debug, Serialize)]
struct Kpis {
    date: String,
    elapsed_days: u64,
    gdp_billions: f64,
    growth_percent: f64,
    inflation_percent: f64,
    debt_to_gdp_percent: f64,
    credit_rating: String,
    unemployment_percent: f64,
    reserves_billions: f64,
    population: u64,
    happiness: f64,
    commitments: usize,
    active_events: usize,
}

impl Kpis {
    fn of(state: &CountryState) -> Self {
        let e = &state.economy;
        Self {
            date: state.meta.current_date.to_string(),
            elapsed_days: state.meta.elapsed_days,
            gdp_billions: e.gdp_billions_usd,
            growth_percent: e.gdp_growth_rate,
            inflation_percent: e.inflation_rate,
            debt_to_gdp_percent: e.debt.debt_to_gdp_percent,
            credit_rating: e.debt.credit_rating.clone(),
            unemployment_percent: state.workforce.unemployment_rate,
            reserves_billions: e.reserves.foreign_reserves_billions,
            population: state.demographics.total_population,
            happiness: state.index("happiness", 50.0),
            commitments: state.commitments.len(),
            active_events: state.active_events.len(),
        }
    }
}

fn notification_kind(n: &Notification) -> &'static str {
    match n {
        Notification::DayAdvanced { .. } => "day_advanced",
        Notification::DeliveryArrived { .. } => "delivery_arrived",
        Notification::OrderCompleted { .. } => "order_completed",
        Notification::ProjectCompleted { .. } => "project_completed",
        Notification::EventTriggered { .. } => "event_triggered",
        Notification::EventExpired { .. } => "event_expired",
        Notification::OperationProgress { .. } => "operation_progress",
        Notification::OperationResolved { .. } => "operation_resolved",
        Notification::UnitMoved { .. } => "unit_moved",
        Notification::MissionResolved { .. } => "mission_resolved",
        Notification::CreditRatingChanged { .. } => "credit_rating_changed",
        Notification::PopulationUpdated { .. } => "population_updated",
    }
}

async fn load_state(scenario: Option<&Path>) -> Result<CountryState> {
    match scenario {
        Some(path) => persistence::load_scenario(path).await,
        None => {
            info!("no scenario given, using the built-in sample country");
            Ok(sim_core::testing::sample_country())
        }
    }
}

fn load_config(args: &Args) -> Result<SimConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text =
                std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            SimConfig::from_yaml_str(&text)?
        }
        None => SimConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.rng_seed = seed;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();

    let args = parse_args(std::env::args().skip(1));
    info!(?args, "starting CLI");

    let config = load_config(&args)?;
    let state = load_state(args.scenario.as_deref()).await?;
    let catalog_dir = args.catalogs.clone().unwrap_or_else(|| PathBuf::from("assets/catalogs"));
    let catalogs = Catalogs::load_dir(&catalog_dir)?;
    let events = EventCatalog::load_dir(&catalog_dir)?;
    println!(
        "Scenario OK | country: {} | weapons: {} | infrastructure types: {} | events: {}",
        state.meta.country_code,
        catalogs.weapons.len(),
        catalogs.infrastructure_projects.len(),
        events.definitions.len()
    );

    let mut sim = Simulation::new(state, catalogs, events, config)?;
    let days = args.days.unwrap_or(30);
    let notes = sim.run_days(days)?;

    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for n in &notes {
        *counts.entry(notification_kind(n)).or_default() += 1;
        match n {
            Notification::DayAdvanced { .. } | Notification::OperationProgress { .. } => {}
            other => info!(?other, "notification"),
        }
    }

    let kpis = Kpis::of(sim.state());
    if args.json {
        println!("{}", serde_json::to_string_pretty(&kpis)?);
    } else {
        println!(
            "KPI | date: {} | days: {} | GDP: ${:.1}B | growth: {:.2}% | inflation: {:.2}% | debt/GDP: {:.1}% ({}) | unemployment: {:.1}% | reserves: ${:.1}B | population: {} | happiness: {:.1}",
            kpis.date,
            kpis.elapsed_days,
            kpis.gdp_billions,
            kpis.growth_percent,
            kpis.inflation_percent,
            kpis.debt_to_gdp_percent,
            kpis.credit_rating,
            kpis.unemployment_percent,
            kpis.reserves_billions,
            kpis.population,
            kpis.happiness
        );
        let summary: Vec<String> = counts.iter().map(|(k, v)| format!("{k}: {v}")).collect();
        println!("Notifications | {}", summary.join(" | "));
    }

    if let Some(path) = &args.export {
        persistence::save_json(path, sim.state()).await?;
    }
    if let Some(url) = &args.save {
        let pool = persistence::init_db(url).await?;
        let save_id = persistence::create_save(&pool, &sim.state().meta.country_code, Some("cli run")).await?;
        let snapshot = persistence::save_snapshot(&pool, save_id, sim.state()).await?;
        println!("Saved | save: {} | snapshot: {} | {}", save_id, snapshot, url);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn known_flags_are_parsed() {
        let args = parse_args(argv("--days 90 --seed 7 --json --catalogs assets/catalogs"));
        assert_eq!(args.days, Some(90));
        assert_eq!(args.seed, Some(7));
        assert!(args.json);
        assert_eq!(args.catalogs, Some(PathBuf::from("assets/catalogs")));
        assert!(args.ignored.is_empty());
    }

    #[test]
    fn bad_numbers_and_unknown_flags_are_reported() {
        let args = parse_args(argv("--days abc --verbose --seed"));
        assert_eq!(args.days, None);
        assert_eq!(args.seed, None);
        assert_eq!(args.ignored, vec!["--days abc", "--verbose", "--seed"]);
    }
}
