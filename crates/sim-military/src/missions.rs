//! Missions fought from the equipment inventory and manpower pools rather
//! than positioned roster units, plus the readiness posture and a force
//! summary.
//!
//! A mission resolves immediately: one roll against the readiness-scaled
//! success rate, then losses, munitions, political cost and relations are
//! applied to the snapshot.

use rand::Rng;
use serde::{Deserialize, Serialize};
use sim_core::military::{Personnel, ReadinessLevel, UnitStatus};
use sim_core::state::InventoryItem;
use sim_core::{ActionError, CountryState};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::operations::active_operations;

/// Relation score above which a country counts as an ally.
const ALLY_THRESHOLD: f64 = 50.0;
/// Missions with a harsher relations penalty are major offensives.
const MAJOR_OFFENSIVE_PENALTY: f64 = -10.0;
const LOW_READINESS: f64 = 0.7;
const LOW_READINESS_LOSS_FACTOR: f64 = 1.3;
const FAILURE_LOSS_FACTOR: f64 = 1.5;
const MAX_ASSET_BONUS: f64 = 1.2;
/// Stock assumed for a munition type the stockpile does not track yet.
const DEFAULT_MUNITION_STOCK: u32 = 1_000;

/// Abstract force components a mission draws on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    Fighters,
    Tanks,
    Artillery,
    Ships,
    Submarines,
    Uavs,
    AirDefense,
    CyberUnits,
    Infantry,
    SpecialForces,
}

impl Asset {
    pub fn as_str(self) -> &'static str {
        match self {
            Asset::Fighters => "fighters",
            Asset::Tanks => "tanks",
            Asset::Artillery => "artillery",
            Asset::Ships => "ships",
            Asset::Submarines => "submarines",
            Asset::Uavs => "uavs",
            Asset::AirDefense => "air_defense",
            Asset::CyberUnits => "cyber_units",
            Asset::Infantry => "infantry",
            Asset::SpecialForces => "special_forces",
        }
    }

    fn matches(self, item: &InventoryItem) -> bool {
        let (cat, sub) = (item.category.as_str(), item.subcategory.as_str());
        match self {
            Asset::Fighters => cat == "aircraft" && sub == "fighter",
            Asset::Uavs => cat == "aircraft" && sub == "uav",
            Asset::Tanks => cat == "ground" && sub == "tank",
            Asset::Artillery => cat == "ground" && sub == "artillery",
            Asset::Submarines => cat == "naval" && sub == "submarine",
            Asset::Ships => cat == "naval" && sub != "submarine",
            Asset::AirDefense => cat == "air_defense",
            Asset::CyberUnits => cat == "cyber",
            Asset::Infantry | Asset::SpecialForces => false,
        }
    }
}

/// How many of `asset` the country can field.
pub fn available(state: &CountryState, asset: Asset) -> u64 {
    match asset {
        Asset::Infantry => state.military.personnel.active_duty,
        Asset::SpecialForces => state.military.personnel.special_forces,
        _ => state
            .inventory
            .iter()
            .filter(|i| asset.matches(i))
            .map(|i| u64::from(i.quantity))
            .sum(),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionType {
    AirStrike,
    AirIntercept,
    GroundAssault,
    GroundDefense,
    NavalPatrol,
    NavalBlockade,
    CyberAttack,
    SpecialOps,
    Reconnaissance,
}

impl MissionType {
    pub const ALL: [MissionType; 9] = [
        MissionType::AirStrike,
        MissionType::AirIntercept,
        MissionType::GroundAssault,
        MissionType::GroundDefense,
        MissionType::NavalPatrol,
        MissionType::NavalBlockade,
        MissionType::CyberAttack,
        MissionType::SpecialOps,
        MissionType::Reconnaissance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MissionType::AirStrike => "air_strike",
            MissionType::AirIntercept => "air_intercept",
            MissionType::GroundAssault => "ground_assault",
            MissionType::GroundDefense => "ground_defense",
            MissionType::NavalPatrol => "naval_patrol",
            MissionType::NavalBlockade => "naval_blockade",
            MissionType::CyberAttack => "cyber_attack",
            MissionType::SpecialOps => "special_ops",
            MissionType::Reconnaissance => "reconnaissance",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MissionProfile {
    /// Minimum commitment per asset.
    pub required: &'static [(Asset, u32)],
    pub base_success: f64,
    pub base_loss: f64,
    /// Political capital spent; doubled when the objective is missed.
    pub political_cost: f64,
    pub relations_penalty: f64,
    pub munitions: &'static [&'static str],
}

const fn p(
    required: &'static [(Asset, u32)],
    base_success: f64,
    base_loss: f64,
    political_cost: f64,
    relations_penalty: f64,
    munitions: &'static [&'static str],
) -> MissionProfile {
    MissionProfile {
        required,
        base_success,
        base_loss,
        political_cost,
        relations_penalty,
        munitions,
    }
}

pub fn profile(mission: MissionType) -> MissionProfile {
    use Asset::*;
    match mission {
        MissionType::AirStrike => p(&[(Fighters, 4)], 0.75, 0.05, 10.0, -15.0, &["bombs", "missiles"]),
        MissionType::AirIntercept => p(&[(Fighters, 2), (AirDefense, 1)], 0.80, 0.02, 2.0, -5.0, &["interceptors"]),
        MissionType::GroundAssault => p(
            &[(Tanks, 10), (Infantry, 500), (Artillery, 5)],
            0.60,
            0.15,
            20.0,
            -25.0,
            &["shells", "fuel"],
        ),
        MissionType::GroundDefense => p(&[(Infantry, 200), (Artillery, 3)], 0.85, 0.08, 5.0, 0.0, &["shells"]),
        MissionType::NavalPatrol => p(&[(Ships, 2)], 0.95, 0.01, 1.0, 0.0, &["fuel"]),
        MissionType::NavalBlockade => {
            p(&[(Ships, 5), (Submarines, 1)], 0.70, 0.03, 15.0, -20.0, &["fuel", "torpedoes"])
        }
        MissionType::CyberAttack => p(&[(CyberUnits, 1)], 0.65, 0.0, 5.0, -10.0, &[]),
        MissionType::SpecialOps => p(&[(SpecialForces, 20)], 0.55, 0.10, 8.0, -12.0, &["small_arms"]),
        MissionType::Reconnaissance => p(&[(Uavs, 2)], 0.90, 0.05, 2.0, -3.0, &[]),
    }
}

/// Estimate returned by [`plan`]. `missing` lists shortfalls against the
/// country's forces; a plan with shortfalls cannot be executed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MissionPlan {
    pub mission: MissionType,
    pub target_country: String,
    pub assets: BTreeMap<Asset, u32>,
    pub missing: BTreeMap<Asset, u64>,
    pub success_probability: f64,
    pub loss_rate: f64,
    pub political_cost: f64,
    pub relations_penalty: f64,
    pub munitions: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MissionReport {
    pub mission: MissionType,
    pub target_country: String,
    pub objective_achieved: bool,
    pub roll: f64,
    pub friendly_losses: BTreeMap<Asset, u32>,
    /// Estimated enemy losses; zero when the objective was missed.
    pub enemy_personnel: u32,
    pub enemy_equipment: u32,
    pub munitions_used: BTreeMap<String, u32>,
    pub political_cost: f64,
    pub relations_penalty: f64,
}

/// Validate a mission and estimate its outcome without touching the state.
/// `committed` defaults to the minimum the mission requires.
pub fn plan(
    state: &CountryState,
    mission: MissionType,
    target_country: &str,
    committed: Option<&BTreeMap<Asset, u32>>,
) -> Result<MissionPlan, ActionError> {
    let prof = profile(mission);
    let assets: BTreeMap<Asset, u32> = match committed {
        Some(c) => c.clone(),
        None => prof.required.iter().copied().collect(),
    };
    for (asset, need) in prof.required {
        let given = assets.get(asset).copied().unwrap_or(0);
        if given < *need {
            return Err(ActionError::Rejected(format!(
                "{} needs at least {need} {}, {given} committed",
                mission.as_str(),
                asset.as_str()
            )));
        }
    }

    let score = state.relations.get(target_country).map_or(0.0, |r| r.score);
    if score > ALLY_THRESHOLD && prof.relations_penalty < MAJOR_OFFENSIVE_PENALTY {
        return Err(ActionError::Rejected(format!(
            "{target_country} is an ally (relations {score:.0}); major offensives need relations below {ALLY_THRESHOLD:.0}"
        )));
    }

    let missing: BTreeMap<Asset, u64> = assets
        .iter()
        .filter_map(|(asset, count)| {
            let have = available(state, *asset);
            (have < u64::from(*count)).then(|| (*asset, u64::from(*count) - have))
        })
        .collect();

    let readiness = (state.military.readiness / 100.0).clamp(0.0, 1.0);
    let required_total: u32 = prof.required.iter().map(|(_, n)| n).sum();
    let committed_total: u32 = assets.values().sum();
    let bonus = (f64::from(committed_total) / f64::from(required_total.max(1))).clamp(1.0, MAX_ASSET_BONUS);
    let mut loss_rate = prof.base_loss;
    if readiness < LOW_READINESS {
        loss_rate *= LOW_READINESS_LOSS_FACTOR;
    }

    Ok(MissionPlan {
        mission,
        target_country: target_country.to_string(),
        assets,
        missing,
        success_probability: (prof.base_success * readiness * bonus).clamp(0.0, 1.0),
        loss_rate,
        political_cost: prof.political_cost,
        relations_penalty: prof.relations_penalty,
        munitions: prof.munitions.iter().map(|m| m.to_string()).collect(),
    })
}

fn apply_losses(state: &mut CountryState, losses: &BTreeMap<Asset, u32>) {
    for (asset, count) in losses {
        let count = *count;
        match asset {
            Asset::Infantry => {
                let p = &mut state.military.personnel;
                p.active_duty = p.active_duty.saturating_sub(u64::from(count));
            }
            Asset::SpecialForces => {
                let p = &mut state.military.personnel;
                p.special_forces = p.special_forces.saturating_sub(u64::from(count));
            }
            _ => {
                let mut remaining = count;
                for item in state.inventory.iter_mut().filter(|i| asset.matches(i)) {
                    if remaining == 0 {
                        break;
                    }
                    let cut = item.quantity.min(remaining);
                    item.quantity -= cut;
                    remaining -= cut;
                }
            }
        }
    }
    state.inventory.retain(|i| i.quantity > 0);
}

/// Fly a mission now and apply its consequences.
pub fn execute<R: Rng + ?Sized>(
    state: &mut CountryState,
    rng: &mut R,
    mission: MissionType,
    target_country: &str,
    committed: Option<&BTreeMap<Asset, u32>>,
) -> Result<MissionReport, ActionError> {
    let plan = plan(state, mission, target_country, committed)?;
    if !plan.missing.is_empty() {
        let short: Vec<String> = plan
            .missing
            .iter()
            .map(|(a, n)| format!("{n} {}", a.as_str()))
            .collect();
        warn!(mission = mission.as_str(), missing = %short.join(", "), "mission rejected");
        return Err(ActionError::Rejected(format!("insufficient assets: {}", short.join(", "))));
    }

    let roll: f64 = rng.gen();
    let achieved = roll < plan.success_probability;
    let loss_rate = if achieved { plan.loss_rate } else { plan.loss_rate * FAILURE_LOSS_FACTOR };
    let mut friendly_losses = BTreeMap::new();
    for (asset, count) in &plan.assets {
        let spread: f64 = rng.gen_range(0.5..1.5);
        let lost = (f64::from(*count) * loss_rate * spread).floor().min(f64::from(*count)) as u32;
        if lost > 0 {
            friendly_losses.insert(*asset, lost);
        }
    }
    let (enemy_personnel, enemy_equipment) = if achieved {
        (rng.gen_range(10..=100), rng.gen_range(1..=10))
    } else {
        (0, 0)
    };
    let munitions_used: BTreeMap<String, u32> = plan
        .munitions
        .iter()
        .map(|m| (m.clone(), rng.gen_range(5..=20)))
        .collect();
    let political_cost = if achieved { plan.political_cost } else { plan.political_cost * 2.0 };

    apply_losses(state, &friendly_losses);
    state.adjust_index("political_capital", -political_cost, 50.0);
    state.adjust_index("public_trust", -political_cost * 0.5, 60.0);
    state.adjust_relation(target_country, plan.relations_penalty);
    for (m, used) in &munitions_used {
        let stock = state
            .military
            .munitions
            .entry(m.clone())
            .or_insert(DEFAULT_MUNITION_STOCK);
        *stock = stock.saturating_sub(*used);
    }

    info!(
        mission = mission.as_str(),
        target = target_country,
        achieved,
        roll,
        "mission resolved"
    );
    Ok(MissionReport {
        mission,
        target_country: target_country.to_string(),
        objective_achieved: achieved,
        roll,
        friendly_losses,
        enemy_personnel,
        enemy_equipment,
        munitions_used,
        political_cost,
        relations_penalty: plan.relations_penalty,
    })
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReadinessChange {
    pub old_level: ReadinessLevel,
    pub new_level: ReadinessLevel,
    pub old_readiness: f64,
    pub new_readiness: f64,
    pub cost_multiplier: f64,
    pub response_time: String,
    /// Change in the defense operations line, billions per year.
    pub operations_cost_delta: f64,
}

/// Move the armed forces to a new posture. The defense operations line
/// scales with the posture's cost multiplier and the difference is booked
/// as expenditure.
pub fn set_readiness_level(state: &mut CountryState, level: ReadinessLevel) -> ReadinessChange {
    let old_level = state.military.readiness_level;
    let old_readiness = state.military.readiness;
    let mut delta = 0.0;
    if let Some(ops) = state
        .budget
        .allocation
        .get_mut("defense")
        .and_then(|d| d.breakdown.get_mut("operations"))
    {
        let scaled = *ops * level.cost_multiplier() / old_level.cost_multiplier();
        delta = scaled - *ops;
        *ops = scaled;
    }
    if let Some(defense) = state.budget.allocation.get_mut("defense") {
        defense.amount_billions += delta;
    }
    state.budget.total_expenditure_billions += delta;
    state.budget.deficit_billions = state.budget.total_expenditure_billions - state.budget.total_revenue_billions;
    state.refresh_derived();

    state.military.readiness_level = level;
    state.military.readiness = level.readiness();
    info!(from = ?old_level, to = ?level, cost_delta = delta, "readiness changed");
    ReadinessChange {
        old_level,
        new_level: level,
        old_readiness,
        new_readiness: level.readiness(),
        cost_multiplier: level.cost_multiplier(),
        response_time: level.response_time().to_string(),
        operations_cost_delta: delta,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MilitarySummary {
    pub personnel: Personnel,
    pub readiness: f64,
    pub readiness_level: ReadinessLevel,
    pub response_time: String,
    /// Equipment in service per inventory category.
    pub equipment: BTreeMap<String, u64>,
    pub units_by_status: BTreeMap<UnitStatus, usize>,
    pub active_operations: usize,
    pub munitions: BTreeMap<String, u32>,
    pub available_missions: Vec<MissionType>,
}

pub fn summary(state: &CountryState) -> MilitarySummary {
    let mut equipment: BTreeMap<String, u64> = BTreeMap::new();
    for item in &state.inventory {
        *equipment.entry(item.category.clone()).or_default() += u64::from(item.quantity);
    }
    let mut units_by_status: BTreeMap<UnitStatus, usize> = BTreeMap::new();
    for unit in state.military.units.values() {
        *units_by_status.entry(unit.status).or_default() += 1;
    }
    let m = &state.military;
    MilitarySummary {
        personnel: m.personnel.clone(),
        readiness: m.readiness,
        readiness_level: m.readiness_level,
        response_time: m.readiness_level.response_time().to_string(),
        equipment,
        units_by_status,
        active_operations: active_operations(state).len(),
        munitions: m.munitions.clone(),
        available_missions: MissionType::ALL
            .into_iter()
            .filter(|t| profile(*t).required.iter().all(|(a, n)| available(state, *a) >= u64::from(*n)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use sim_core::testing::sample_country;

    #[test]
    fn assets_are_counted_from_inventory_and_personnel() {
        let state = sample_country();
        assert_eq!(available(&state, Asset::Fighters), 40);
        assert_eq!(available(&state, Asset::Tanks), 150);
        assert_eq!(available(&state, Asset::Ships), 4);
        assert_eq!(available(&state, Asset::Uavs), 6);
        assert_eq!(available(&state, Asset::Submarines), 0);
        assert_eq!(available(&state, Asset::Infantry), 180_000);
        assert_eq!(available(&state, Asset::SpecialForces), 1_500);
    }

    #[test]
    fn plan_scales_with_readiness_and_reports_shortfalls() {
        let state = sample_country();
        let recon = plan(&state, MissionType::Reconnaissance, "RUS", None).unwrap();
        assert!(recon.missing.is_empty());
        assert!((recon.success_probability - 0.9 * 0.7).abs() < 1e-9);
        assert_eq!(recon.loss_rate, 0.05);

        let blockade = plan(&state, MissionType::NavalBlockade, "RUS", None).unwrap();
        assert_eq!(blockade.missing.get(&Asset::Ships), Some(&1));
        assert_eq!(blockade.missing.get(&Asset::Submarines), Some(&1));

        let under = BTreeMap::from([(Asset::Fighters, 2)]);
        assert!(plan(&state, MissionType::AirStrike, "RUS", Some(&under)).is_err());
    }

    #[test]
    fn extra_assets_raise_the_odds_up_to_a_cap() {
        let mut state = sample_country();
        state.military.readiness = 100.0;
        let heavy = BTreeMap::from([(Asset::Fighters, 20)]);
        let p = plan(&state, MissionType::AirStrike, "RUS", Some(&heavy)).unwrap();
        assert!((p.success_probability - 0.75 * 1.2).abs() < 1e-9);
        let low = plan(&state, MissionType::AirStrike, "RUS", None).unwrap();
        assert!((low.success_probability - 0.75).abs() < 1e-9);
    }

    #[test]
    fn allies_cannot_be_attacked() {
        let state = sample_country();
        let err = plan(&state, MissionType::AirStrike, "USA", None).unwrap_err();
        assert!(matches!(err, ActionError::Rejected(_)));
        // Minor missions against allies are allowed.
        assert!(plan(&state, MissionType::Reconnaissance, "USA", None).is_ok());
    }

    #[test]
    fn execution_applies_costs_losses_and_munitions() {
        let mut state = sample_country();
        state.military.readiness = 60.0;
        let capital = state.indices["political_capital"];
        let trust = state.indices["public_trust"];
        let relation = state.relations["RUS"].score;
        let committed = BTreeMap::from([(Asset::Fighters, 40)]);
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let report = execute(&mut state, &mut rng, MissionType::AirStrike, "RUS", Some(&committed)).unwrap();

        let cost = if report.objective_achieved { 10.0 } else { 20.0 };
        assert_eq!(report.political_cost, cost);
        assert!((state.indices["political_capital"] - (capital - cost)).abs() < 1e-9);
        assert!((state.indices["public_trust"] - (trust - cost * 0.5)).abs() < 1e-9);
        assert_eq!(state.relations["RUS"].score, relation - 15.0);

        let lost = report.friendly_losses.get(&Asset::Fighters).copied().unwrap_or(0);
        assert_eq!(available(&state, Asset::Fighters), 40 - u64::from(lost));
        for (m, used) in &report.munitions_used {
            assert!((5..=20).contains(used));
            let before = sample_country().military.munitions[m.as_str()];
            assert_eq!(state.military.munitions[m.as_str()], before - used);
        }
        assert_eq!(report.munitions_used.len(), 2);
    }

    #[test]
    fn missing_assets_block_execution() {
        let mut state = sample_country();
        let before = state.clone();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(execute(&mut state, &mut rng, MissionType::NavalBlockade, "RUS", None).is_err());
        assert_eq!(state, before);
    }

    #[test]
    fn untracked_munitions_start_from_default_stock() {
        let mut state = sample_country();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let report = execute(&mut state, &mut rng, MissionType::SpecialOps, "RUS", None).unwrap();
        let used = report.munitions_used["small_arms"];
        assert_eq!(state.military.munitions["small_arms"], DEFAULT_MUNITION_STOCK - used);
    }

    #[test]
    fn readiness_posture_rescales_operations_budget() {
        let mut state = sample_country();
        let expenditure = state.budget.total_expenditure_billions;
        let change = set_readiness_level(&mut state, ReadinessLevel::High);
        assert_eq!(change.old_level, ReadinessLevel::Normal);
        assert_eq!(change.old_readiness, 70.0);
        assert_eq!(state.military.readiness, 90.0);
        assert_eq!(change.response_time, "minutes");
        assert!((change.operations_cost_delta - 10.0).abs() < 1e-9);
        assert!((state.budget.allocation["defense"].breakdown["operations"] - 30.0).abs() < 1e-9);
        assert!((state.budget.total_expenditure_billions - (expenditure + 10.0)).abs() < 1e-9);

        set_readiness_level(&mut state, ReadinessLevel::Normal);
        assert!((state.budget.allocation["defense"].breakdown["operations"] - 20.0).abs() < 1e-9);
        assert!((state.budget.total_expenditure_billions - expenditure).abs() < 1e-9);
        assert_eq!(state.military.readiness, 75.0);
    }

    #[test]
    fn summary_counts_forces() {
        let state = sample_country();
        let s = summary(&state);
        assert_eq!(s.equipment["aircraft"], 46);
        assert_eq!(s.equipment["ground"], 210);
        assert_eq!(s.units_by_status[&UnitStatus::Idle], state.military.units.len());
        assert_eq!(s.active_operations, 0);
        assert!(s.available_missions.contains(&MissionType::Reconnaissance));
        assert!(!s.available_missions.contains(&MissionType::NavalBlockade));
        assert!(!s.available_missions.contains(&MissionType::CyberAttack));
    }

    proptest! {
        #[test]
        fn losses_never_exceed_the_commitment(seed in 0u64..500, tanks in 10u32..150) {
            let mut state = sample_country();
            let committed = BTreeMap::from([(Asset::Tanks, tanks), (Asset::Infantry, 500), (Asset::Artillery, 5)]);
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let report = execute(&mut state, &mut rng, MissionType::GroundAssault, "RUS", Some(&committed)).unwrap();
            for (asset, lost) in &report.friendly_losses {
                prop_assert!(*lost <= committed[asset]);
            }
            prop_assert!((0.0..=100.0).contains(&state.indices["political_capital"]));
            prop_assert!(state.relations["RUS"].score >= -100.0);
        }
    }
}
