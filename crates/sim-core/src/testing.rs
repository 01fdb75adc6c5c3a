//! Fully populated fixtures shared by the tests of every crate and the CLI
//! demo scenario.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::catalog::{
    Catalogs, ConstraintTemplate, DeliveryRange, InfrastructureProjectType, Prerequisites,
    WeaponDefinition,
};
use crate::constraints::Constraint;
use crate::military::{Base, GeoPoint, Military, Personnel, ReadinessLevel, Unit, UnitCategory, UnitStatus};
use crate::state::*;

fn map<K: Into<String>, V>(items: impl IntoIterator<Item = (K, V)>) -> BTreeMap<String, V> {
    items.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Start date of the sample scenario.
pub fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default()
}

fn category(percent: f64, minimum: f64, total: f64) -> BudgetCategory {
    BudgetCategory {
        percent_of_budget: percent,
        amount_billions: total * percent / 100.0,
        minimum_percent: minimum,
        frozen: false,
        breakdown: BTreeMap::new(),
    }
}

fn pool(available: u64, employed: u64, quality: f64) -> ExpertisePool {
    ExpertisePool { available, employed, quality_index: quality }
}

fn sector(level: f64, contrib: f64, employment: u64, growth: f64) -> Sector {
    Sector {
        level,
        gdp_contribution_billions: contrib,
        employment,
        growth_rate: growth,
        recent_investment_billions: 0.0,
        workforce_required: BTreeMap::new(),
        infrastructure_required: BTreeMap::new(),
    }
}

fn relation(score: f64, exports: f64, imports: f64) -> Relation {
    Relation {
        score,
        trade: Trade {
            exports_billions: exports,
            imports_billions: imports,
            balance_billions: exports - imports,
        },
        treaties: Vec::new(),
    }
}

/// Build a unit parked at `base`.
pub fn unit(id: &str, name: &str, model: &str, cat: UnitCategory, base: &Base, radius: f64) -> Unit {
    Unit {
        id: id.to_string(),
        name: name.to_string(),
        unit_type: model.to_string(),
        category: cat,
        status: UnitStatus::Idle,
        home_base: base_key(&base.name),
        location: base.location,
        destination: None,
        travel_hours_remaining: 0.0,
        health: 90.0,
        experience: 60.0,
        morale: 70.0,
        fuel: 100.0,
        ammunition: 100.0,
        combat_radius_km: radius,
        speed_kmh: None,
        assigned_operation: None,
    }
}

fn base_key(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

fn sample_military() -> Military {
    let air = Base {
        name: "North Air Base".into(),
        location: GeoPoint::new(52.0, 13.0),
        can_repair: true,
    };
    let port = Base {
        name: "Naval Port".into(),
        location: GeoPoint::new(54.3, 10.1),
        can_repair: true,
    };
    let garrison = Base {
        name: "Central Garrison".into(),
        location: GeoPoint::new(50.5, 11.0),
        can_repair: false,
    };
    let units = vec![
        unit("af-1", "1st Fighter Squadron", "F-16", UnitCategory::Aircraft, &air, 850.0),
        unit("af-2", "2nd Fighter Squadron", "F-16", UnitCategory::Aircraft, &air, 850.0),
        unit("hc-1", "1st Aviation Regiment", "AH-64", UnitCategory::Helicopter, &air, 480.0),
        unit("gr-1", "1st Armored Brigade", "Leopard 2A4", UnitCategory::Ground, &garrison, 400.0),
        unit("gr-2", "2nd Mechanized Brigade", "Leopard 2A4", UnitCategory::Ground, &garrison, 400.0),
        unit("nv-1", "1st Frigate Squadron", "F125 Frigate", UnitCategory::Naval, &port, 5000.0),
        unit("nv-2", "2nd Frigate Squadron", "F125 Frigate", UnitCategory::Naval, &port, 5000.0),
        unit("nv-3", "Corvette Flotilla", "K130 Corvette", UnitCategory::Naval, &port, 3000.0),
        unit("sf-1", "Special Forces Group", "KSK", UnitCategory::SpecialOps, &garrison, 300.0),
        unit("ms-1", "Missile Battalion", "Taurus", UnitCategory::Missile, &air, 500.0),
    ];
    Military {
        readiness: 70.0,
        readiness_level: ReadinessLevel::Normal,
        personnel: Personnel {
            active_duty: 180_000,
            reserves: 30_000,
            special_forces: 1_500,
        },
        munitions: map([("bombs", 400u32), ("missiles", 300), ("shells", 5_000), ("fuel", 2_000)]),
        bases: [air, port, garrison]
            .into_iter()
            .map(|b| (base_key(&b.name), b))
            .collect(),
        units: units.into_iter().map(|u| (u.id.clone(), u)).collect(),
        operation_history: Vec::new(),
    }
}

/// A mid-sized country, "TST", on 2024-01-01.
///
/// Procurement budget is $4B, relations are 80 with USA and -30 with RUS,
/// and the allocation sums to 100 with a frozen `debt_service` line.
pub fn sample_country() -> CountryState {
    let total_exp = 450.0;
    let mut defense = category(12.0, 5.0, total_exp);
    defense.breakdown = map([("procurement", 4.0), ("personnel", 30.0), ("operations", 20.0)]);
    let mut debt_service = category(7.0, 7.0, total_exp);
    debt_service.frozen = true;

    let mut technology = sector(60.0, 180.0, 2_000_000, 4.0);
    technology.workforce_required = map([("software_engineers", 10_000u64)]);
    technology.infrastructure_required =
        map([("infrastructure.digital.internet_penetration", 70.0)]);
    let mut manufacturing = sector(55.0, 240.0, 4_000_000, 2.0);
    manufacturing.workforce_required = map([("engineers", 20_000u64)]);
    manufacturing.infrastructure_required = map([("infrastructure.energy.capacity_gw", 60.0)]);
    let mut energy = sector(50.0, 100.0, 600_000, 1.5);
    energy.workforce_required = map([("engineers", 5_000u64)]);

    let mut state = CountryState {
        meta: Meta {
            country_code: "TST".into(),
            country_name: "Testland".into(),
            current_date: start_date(),
            elapsed_days: 0,
            cooldowns: BTreeMap::new(),
            next_id: 0,
        },
        demographics: Demographics {
            total_population: 50_000_000,
            working_age_population: 33_000_000,
            labor_force_participation: 0.65,
            active_labor_force: 21_450_000,
            median_age: 38.5,
            birth_rate_per_1000: 11.0,
            death_rate_per_1000: 9.0,
            net_migration_per_1000: 2.0,
            age_distribution: map([
                ("0_14", 0.16),
                ("15_24", 0.11),
                ("25_54", 0.40),
                ("55_64", 0.15),
                ("65_plus", 0.18),
            ]),
            migration_policy: MigrationPolicy::Moderate,
        },
        workforce: Workforce {
            unemployment_rate: 6.0,
            expertise_pools: map([
                ("software_engineers", pool(400_000, 350_000, 70.0)),
                ("engineers", pool(600_000, 540_000, 65.0)),
                ("doctors", pool(150_000, 145_000, 75.0)),
                ("skilled_trades", pool(2_000_000, 1_800_000, 60.0)),
                ("pilots", pool(5_000, 4_200, 80.0)),
            ]),
            annual_graduates: map([
                ("bachelors", 200_000u64),
                ("masters", 60_000),
                ("phd", 8_000),
                ("vocational", 150_000),
            ]),
        },
        infrastructure: map([
            ("digital", map([("internet_penetration", 85.0), ("data_centers", 40.0)])),
            ("energy", map([("capacity_gw", 90.0), ("renewable_share", 25.0)])),
            ("transport", map([("highway_km", 12_000.0), ("rail_km", 8_000.0)])),
            ("health", map([("hospital_beds_per_1000", 4.5)])),
        ]),
        economy: Economy {
            gdp_billions_usd: 1200.0,
            baseline_gdp_billions: 1200.0,
            gdp_growth_potential: 2.5,
            gdp_growth_rate: 2.0,
            gdp_per_capita_usd: 0.0,
            base_inflation: 2.0,
            inflation_rate: 2.5,
            debt: Debt {
                total_billions: 720.0,
                debt_to_gdp_percent: 60.0,
                credit_rating: "AA".into(),
                average_interest_rate: 3.0,
            },
            reserves: Reserves {
                foreign_reserves_billions: 150.0,
                months_of_imports_covered: 0.0,
            },
        },
        budget: Budget {
            total_revenue_billions: 420.0,
            total_expenditure_billions: total_exp,
            deficit_billions: 30.0,
            deficit_to_gdp_percent: 2.5,
            tax_rate: 35.0,
            min_tax_rate: 15.0,
            max_tax_rate: 50.0,
            allocation: map([
                ("defense", defense),
                ("education", category(15.0, 8.0, total_exp)),
                ("healthcare", category(18.0, 10.0, total_exp)),
                ("infrastructure", category(10.0, 3.0, total_exp)),
                ("social_welfare", category(25.0, 15.0, total_exp)),
                ("foreign_affairs", category(3.0, 1.0, total_exp)),
                ("research", category(5.0, 1.0, total_exp)),
                ("debt_service", debt_service),
                ("administration", category(5.0, 2.0, total_exp)),
            ]),
        },
        sectors: map([
            ("technology", technology),
            ("manufacturing", manufacturing),
            ("energy", energy),
            ("agriculture", sector(45.0, 60.0, 1_200_000, 0.5)),
            ("services", sector(65.0, 550.0, 12_000_000, 2.5)),
            ("defense_industry", sector(40.0, 30.0, 300_000, 1.0)),
        ]),
        military: sample_military(),
        inventory: vec![
            InventoryItem {
                model: "F-16".into(),
                weapon_id: None,
                category: "aircraft".into(),
                subcategory: "fighter".into(),
                quantity: 40,
                source_country: Some("USA".into()),
                unit_cost_millions: Decimal::new(30, 0),
                avg_age_years: 22.0,
            },
            InventoryItem {
                model: "Leopard 2A4".into(),
                weapon_id: None,
                category: "ground".into(),
                subcategory: "tank".into(),
                quantity: 150,
                source_country: Some("DEU".into()),
                unit_cost_millions: Decimal::new(6, 0),
                avg_age_years: 30.0,
            },
            InventoryItem {
                model: "PzH 2000".into(),
                weapon_id: None,
                category: "ground".into(),
                subcategory: "artillery".into(),
                quantity: 60,
                source_country: Some("DEU".into()),
                unit_cost_millions: Decimal::new(17, 0),
                avg_age_years: 15.0,
            },
            InventoryItem {
                model: "F125 Frigate".into(),
                weapon_id: None,
                category: "naval".into(),
                subcategory: "frigate".into(),
                quantity: 4,
                source_country: Some("DEU".into()),
                unit_cost_millions: Decimal::new(800, 0),
                avg_age_years: 5.0,
            },
            InventoryItem {
                model: "Heron TP".into(),
                weapon_id: None,
                category: "aircraft".into(),
                subcategory: "uav".into(),
                quantity: 6,
                source_country: Some("ISR".into()),
                unit_cost_millions: Decimal::new(10, 0),
                avg_age_years: 4.0,
            },
        ],
        relations: map([
            ("USA", relation(80.0, 40.0, 35.0)),
            ("DEU", relation(70.0, 30.0, 32.0)),
            ("FRA", relation(65.0, 18.0, 15.0)),
            ("CHN", relation(20.0, 20.0, 45.0)),
            ("RUS", relation(-30.0, 2.0, 8.0)),
        ]),
        indices: map([
            ("happiness", 60.0),
            ("stability", 65.0),
            ("public_trust", 55.0),
            ("political_capital", 55.0),
            ("military_strength", 50.0),
        ]),
        commitments: Vec::new(),
        active_events: Vec::new(),
    };
    state.refresh_derived();
    state
}

fn weapon(
    name: &str,
    category: &str,
    subcategory: &str,
    manufacturer: (&str, &str),
    cost_millions: Decimal,
    delivery: (u32, u32),
    rate: u32,
    prerequisites: Prerequisites,
) -> WeaponDefinition {
    WeaponDefinition {
        name: name.into(),
        category: category.into(),
        subcategory: subcategory.into(),
        manufacturer: manufacturer.0.into(),
        manufacturer_name: manufacturer.1.into(),
        unit_cost_millions: cost_millions,
        delivery: DeliveryRange { min_years: delivery.0, max_years: delivery.1 },
        production_rate_per_year: rate,
        prerequisites,
    }
}

/// Catalogs matching [`sample_country`]: an F-35A (`f35a`, $120M, relations
/// 70, delivery 3-5 years, closed buyer list, excludes the S-400) and a few
/// other systems and project types.
pub fn sample_catalogs() -> Catalogs {
    let weapons = map([
        (
            "f35a",
            weapon(
                "F-35A Lightning II",
                "aircraft",
                "fighter",
                ("USA", "Lockheed Martin"),
                Decimal::new(120, 0),
                (3, 5),
                150,
                Prerequisites {
                    min_relations: 70.0,
                    not_operating: vec!["S-400 Triumf".into(), "s400".into()],
                    allowed_buyers: Some(vec!["TST".into(), "DEU".into(), "GBR".into(), "JPN".into()]),
                },
            ),
        ),
        (
            "f16v",
            weapon(
                "F-16 Block 70",
                "aircraft",
                "fighter",
                ("USA", "Lockheed Martin"),
                Decimal::new(64, 0),
                (2, 4),
                48,
                Prerequisites { min_relations: 60.0, ..Prerequisites::default() },
            ),
        ),
        (
            "s400",
            weapon(
                "S-400 Triumf",
                "air_defense",
                "long_range_sam",
                ("RUS", "Almaz-Antey"),
                Decimal::new(500, 0),
                (2, 3),
                12,
                Prerequisites {
                    min_relations: 60.0,
                    not_operating: vec!["F-35A Lightning II".into(), "f35a".into()],
                    allowed_buyers: None,
                },
            ),
        ),
        (
            "leopard2a7",
            weapon(
                "Leopard 2A7",
                "ground",
                "tank",
                ("DEU", "KNDS"),
                Decimal::new(115, 1),
                (2, 3),
                50,
                Prerequisites::default(),
            ),
        ),
    ]);
    let infrastructure_projects = map([
        (
            "power_plant",
            InfrastructureProjectType {
                name: "Power Plant".into(),
                cost_billions: 5.0,
                duration_quarters: 12,
                effects: map([("infrastructure.energy.capacity_gw", 2.0)]),
            },
        ),
        (
            "highway",
            InfrastructureProjectType {
                name: "Highway".into(),
                cost_billions: 2.0,
                duration_quarters: 8,
                effects: map([("infrastructure.transport.highway_km", 500.0)]),
            },
        ),
        (
            "hospital",
            InfrastructureProjectType {
                name: "Hospital".into(),
                cost_billions: 0.5,
                duration_quarters: 4,
                effects: map([("infrastructure.health.hospital_beds_per_1000", 0.1)]),
            },
        ),
    ]);
    let constraint_templates = map([(
        "major_reform",
        ConstraintTemplate {
            description: "Large structural reform".into(),
            constraints: vec![
                Constraint::Political { min_capital: 60.0 },
                Constraint::Cooldown { action: "major_reform".into(), months: 12 },
            ],
        },
    )]);
    Catalogs {
        weapons,
        infrastructure_projects,
        constraint_templates,
    }
}
