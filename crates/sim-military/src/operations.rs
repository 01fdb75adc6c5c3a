//! Location-based operations: planning, execution and resolution.
//!
//! An operation is created in `Planning` with its units reserved, becomes
//! `Active` when the units are sent, makes progress every hour once they
//! have all arrived, and resolves at 100%.

use rand::Rng;
use serde::{Deserialize, Serialize};
use sim_core::military::{
    GeoPoint, Operation, OperationOutcome, OperationStatus, OperationType, Unit, UnitCategory, UnitStatus,
};
use sim_core::{ActionError, Commitment, CommitmentId, CommitmentKind, CountryState, Notification};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, instrument, warn};

use crate::units::{self, StatDelta};

pub const MIN_SUCCESS: f64 = 0.05;
pub const MAX_SUCCESS: f64 = 0.95;
/// Random spread applied to the success probability at resolution.
pub const SUCCESS_VARIANCE: f64 = 0.05;
const MAX_DISTANCE_PENALTY: f64 = 0.3;
const DISTANCE_PENALTY_KM: f64 = 5000.0;
const FAILURE_LOSS_FACTOR: f64 = 1.5;

/// Fixed characteristics of an operation type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OperationProfile {
    pub allowed: &'static [UnitCategory],
    pub min_units: usize,
    pub base_success: f64,
    pub base_loss: f64,
    pub duration_hours: f64,
    /// Applied to the target country's relation score on resolution.
    pub relations_penalty: f64,
    pub fuel_cost: f64,
    pub ammo_cost: f64,
}

pub fn profile(op_type: OperationType) -> OperationProfile {
    use UnitCategory::*;
    #[allow(clippy::too_many_arguments)]
    fn p(
        allowed: &'static [UnitCategory],
        min_units: usize,
        base_success: f64,
        base_loss: f64,
        duration_hours: f64,
        relations_penalty: f64,
        fuel_cost: f64,
        ammo_cost: f64,
    ) -> OperationProfile {
        OperationProfile {
            allowed,
            min_units,
            base_success,
            base_loss,
            duration_hours,
            relations_penalty,
            fuel_cost,
            ammo_cost,
        }
    }
    match op_type {
        OperationType::AirStrike => p(&[Aircraft], 1, 0.75, 0.05, 2.0, -15.0, 30.0, 50.0),
        OperationType::AirPatrol => p(&[Aircraft], 2, 0.95, 0.01, 8.0, 0.0, 40.0, 0.0),
        OperationType::GroundAssault => p(&[Ground], 2, 0.60, 0.15, 24.0, -25.0, 50.0, 60.0),
        OperationType::GroundPatrol => p(&[Ground], 1, 0.90, 0.02, 12.0, 0.0, 20.0, 5.0),
        OperationType::NavalPatrol => p(&[Naval], 2, 0.95, 0.01, 48.0, 0.0, 25.0, 0.0),
        OperationType::NavalBlockade => p(&[Naval], 3, 0.70, 0.03, 168.0, -20.0, 40.0, 10.0),
        OperationType::Reconnaissance => p(&[Aircraft], 1, 0.90, 0.05, 4.0, -3.0, 20.0, 0.0),
        OperationType::MissileStrike => p(&[Missile, AirDefense], 1, 0.85, 0.0, 1.0, -20.0, 0.0, 100.0),
        OperationType::SpecialOps => p(&[SpecialOps, Helicopter], 1, 0.55, 0.10, 6.0, -12.0, 30.0, 30.0),
    }
}

/// Estimate returned by [`plan`]. Nothing is reserved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationPlan {
    pub op_type: OperationType,
    pub unit_ids: Vec<String>,
    /// From the farthest assigned unit to the target.
    pub distance_km: f64,
    pub success_probability: f64,
    pub loss_probability: f64,
    /// One-way travel of the slowest unit.
    pub travel_hours: f64,
    pub duration_hours: f64,
    /// Travel out, the operation itself, travel back.
    pub estimated_total_hours: f64,
    pub relations_penalty: f64,
}

/// Success probability before the resolution variance.
pub fn success_estimate(base: f64, units: &[&Unit], distance_km: f64) -> f64 {
    let n = units.len().max(1) as f64;
    let quality = units.iter().map(|u| (u.health + u.experience + u.morale) / 3.0).sum::<f64>() / n;
    let distance_penalty = (distance_km / DISTANCE_PENALTY_KM).min(MAX_DISTANCE_PENALTY);
    let p = base + (quality - 50.0) / 250.0 - distance_penalty;
    if p.is_finite() {
        p.clamp(MIN_SUCCESS, MAX_SUCCESS)
    } else {
        MIN_SUCCESS
    }
}

fn eligible_units<'a>(
    state: &'a CountryState,
    op_type: OperationType,
    unit_ids: &[String],
) -> Result<Vec<&'a Unit>, ActionError> {
    let prof = profile(op_type);
    if unit_ids.len() < prof.min_units {
        return Err(ActionError::Rejected(format!(
            "{} needs at least {} unit(s)",
            op_type.as_str(),
            prof.min_units
        )));
    }
    let distinct: BTreeSet<&String> = unit_ids.iter().collect();
    if distinct.len() != unit_ids.len() {
        return Err(ActionError::Rejected("a unit is listed twice".into()));
    }
    unit_ids
        .iter()
        .map(|id| {
            let unit = state.military.units.get(id).ok_or_else(|| ActionError::unknown("unit", id.clone()))?;
            if !prof.allowed.contains(&unit.category) {
                return Err(ActionError::Rejected(format!(
                    "{id} ({:?}) cannot perform {}",
                    unit.category,
                    op_type.as_str()
                )));
            }
            if !unit.is_available() {
                return Err(ActionError::Rejected(format!("{id} is not available")));
            }
            if let Some(reason) = units::movement_blocker(unit) {
                return Err(ActionError::Rejected(format!("{id}: {reason}")));
            }
            Ok(unit)
        })
        .collect()
}

/// Validate an operation and estimate its outcome.
pub fn plan(
    state: &CountryState,
    op_type: OperationType,
    target: GeoPoint,
    unit_ids: &[String],
) -> Result<OperationPlan, ActionError> {
    let units = eligible_units(state, op_type, unit_ids)?;
    let mut distance_km = 0.0f64;
    let mut travel = 0.0f64;
    for u in &units {
        let d = u.location.distance_km(&target);
        if u.combat_radius_km > 0.0 && d > u.max_range_km() {
            return Err(ActionError::Rejected(format!(
                "{} out of range ({d:.0} km > {:.0} km)",
                u.id,
                u.max_range_km()
            )));
        }
        distance_km = distance_km.max(d);
        travel = travel.max(units::travel_hours(u, d).unwrap_or(0.0));
    }
    let prof = profile(op_type);
    Ok(OperationPlan {
        op_type,
        unit_ids: unit_ids.to_vec(),
        distance_km,
        success_probability: success_estimate(prof.base_success, &units, distance_km),
        loss_probability: prof.base_loss,
        travel_hours: travel,
        duration_hours: prof.duration_hours,
        estimated_total_hours: prof.duration_hours + 2.0 * travel,
        relations_penalty: prof.relations_penalty,
    })
}

/// Create an operation in `Planning` and reserve its units.
pub fn create(
    state: &mut CountryState,
    name: &str,
    op_type: OperationType,
    target: GeoPoint,
    target_country: Option<&str>,
    unit_ids: &[String],
) -> Result<CommitmentId, ActionError> {
    let plan = plan(state, op_type, target, unit_ids)?;
    let id = CommitmentId(state.mint_id("op"));
    for uid in unit_ids {
        if let Some(unit) = state.military.units.get_mut(uid) {
            unit.assigned_operation = Some(id.clone());
        }
    }
    state.commitments.push(Commitment {
        id: id.clone(),
        started_on: state.meta.current_date,
        kind: CommitmentKind::ActiveOperation(Operation {
            name: name.to_string(),
            op_type,
            target,
            target_country: target_country.map(str::to_string),
            unit_ids: unit_ids.to_vec(),
            status: OperationStatus::Planning,
            progress_percent: 0.0,
            duration_hours: plan.duration_hours,
            units_arrived: false,
            success_probability: plan.success_probability,
            outcome: None,
        }),
    });
    info!(%id, op = op_type.as_str(), p = plan.success_probability, "operation planned");
    Ok(id)
}

fn operation<'a>(state: &'a CountryState, id: &CommitmentId) -> Result<&'a Operation, ActionError> {
    match state.commitment(id).map(|c| &c.kind) {
        Some(CommitmentKind::ActiveOperation(op)) => Ok(op),
        _ => Err(ActionError::unknown("operation", id.0.clone())),
    }
}

/// Send the units of a planned operation. All of them leave or none do.
pub fn start(state: &mut CountryState, id: &CommitmentId) -> Result<(), ActionError> {
    let op = operation(state, id)?;
    if op.status != OperationStatus::Planning {
        return Err(ActionError::Rejected(format!("operation {id} is not in planning")));
    }
    let (target, unit_ids) = (op.target, op.unit_ids.clone());
    let mut work = state.clone();
    for uid in &unit_ids {
        units::deploy(&mut work, uid, target)?;
    }
    if let Some(Commitment { kind: CommitmentKind::ActiveOperation(op), .. }) = work.commitment_mut(id) {
        op.status = OperationStatus::Active;
    }
    *state = work;
    info!(%id, "operation started");
    Ok(())
}

/// Advance active operations by `hours`. Progress starts once every
/// assigned unit has stopped moving; operations at 100% are resolved.
#[instrument(level = "debug", skip(state, rng), fields(country = %state.meta.country_code))]
pub fn advance<R: Rng + ?Sized>(state: &mut CountryState, rng: &mut R, hours: f64) -> Vec<Notification> {
    let active: Vec<(CommitmentId, Vec<String>)> = state
        .commitments
        .iter()
        .filter_map(|c| match &c.kind {
            CommitmentKind::ActiveOperation(op) if op.status == OperationStatus::Active => {
                Some((c.id.clone(), op.unit_ids.clone()))
            }
            _ => None,
        })
        .collect();

    let mut out = Vec::new();
    for (id, unit_ids) in active {
        let arrived = unit_ids.iter().all(|uid| {
            state
                .military
                .units
                .get(uid)
                .map_or(true, |u| u.status != UnitStatus::InTransit)
        });
        let mut finished = false;
        if let Some(Commitment { kind: CommitmentKind::ActiveOperation(op), .. }) = state.commitment_mut(&id) {
            if !op.units_arrived && !arrived {
                continue;
            }
            op.units_arrived = true;
            let step = if op.duration_hours > 0.0 { hours / op.duration_hours * 100.0 } else { 100.0 };
            op.progress_percent = (op.progress_percent + step).min(100.0);
            out.push(Notification::OperationProgress {
                operation_id: id.clone(),
                progress_percent: op.progress_percent,
            });
            finished = op.progress_percent >= 100.0;
        }
        if finished {
            out.extend(resolve(state, &id, rng));
        }
    }
    out
}

/// Send surviving units home and free the destroyed ones.
fn release_units(state: &mut CountryState, unit_ids: &[String]) {
    for uid in unit_ids {
        let Some(unit) = state.military.units.get_mut(uid) else {
            continue;
        };
        match unit.status {
            UnitStatus::Destroyed | UnitStatus::Idle => unit.assigned_operation = None,
            UnitStatus::Returning => {}
            UnitStatus::InTransit | UnitStatus::Deployed => {
                if let Err(e) = units::return_to_base(state, uid) {
                    warn!(unit = %uid, error = %e, "unit could not return to base");
                }
            }
        }
    }
}

fn resolve<R: Rng + ?Sized>(state: &mut CountryState, id: &CommitmentId, rng: &mut R) -> Vec<Notification> {
    let Some(Commitment { kind: CommitmentKind::ActiveOperation(mut op), .. }) = state.take_commitment(id) else {
        return Vec::new();
    };
    let prof = profile(op.op_type);
    let roll: f64 = rng.gen();
    let variance = rng.gen_range(-SUCCESS_VARIANCE..=SUCCESS_VARIANCE);
    let success = roll < (op.success_probability + variance).clamp(MIN_SUCCESS, MAX_SUCCESS);
    let (loss_factor, exp_hit, exp_safe, morale) = if success {
        (1.0, 5.0, 3.0, 10.0)
    } else {
        (FAILURE_LOSS_FACTOR, 2.0, 1.0, -10.0)
    };

    let mut damage = BTreeMap::new();
    for uid in &op.unit_ids {
        if !state.military.units.get(uid).is_some_and(|u| u.status != UnitStatus::Destroyed) {
            continue;
        }
        let hit: f64 = rng.gen();
        let delta = if hit < prof.base_loss * loss_factor {
            let dmg = rng.gen_range(10.0..40.0) * loss_factor;
            damage.insert(uid.clone(), dmg);
            StatDelta {
                health: -dmg,
                fuel: -prof.fuel_cost,
                ammunition: -prof.ammo_cost,
                morale,
                experience: exp_hit,
            }
        } else {
            StatDelta {
                fuel: -prof.fuel_cost * 0.5,
                ammunition: -prof.ammo_cost * 0.5,
                experience: exp_safe,
                ..StatDelta::default()
            }
        };
        if let Err(e) = units::update_unit_status(state, uid, None, delta) {
            warn!(unit = %uid, error = %e, "could not apply operation result");
        }
    }

    if let Some(country) = &op.target_country {
        state.adjust_relation(country, prof.relations_penalty);
    }
    release_units(state, &op.unit_ids);

    op.status = if success { OperationStatus::Completed } else { OperationStatus::Failed };
    op.progress_percent = 100.0;
    op.outcome = Some(OperationOutcome {
        success,
        roll,
        damage,
        relations_penalty: prof.relations_penalty,
    });
    info!(%id, success, roll, "operation resolved");
    let status = op.status;
    state.military.operation_history.push(op);
    vec![Notification::OperationResolved { operation_id: id.clone(), status }]
}

/// Abort a planned or active operation. Units head home or are released.
pub fn cancel(state: &mut CountryState, id: &CommitmentId) -> Result<Notification, ActionError> {
    operation(state, id)?;
    let Some(Commitment { kind: CommitmentKind::ActiveOperation(mut op), .. }) = state.take_commitment(id) else {
        return Err(ActionError::unknown("operation", id.0.clone()));
    };
    release_units(state, &op.unit_ids);
    op.status = OperationStatus::Cancelled;
    info!(%id, "operation cancelled");
    state.military.operation_history.push(op);
    Ok(Notification::OperationResolved {
        operation_id: id.clone(),
        status: OperationStatus::Cancelled,
    })
}

/// Operations still on the ledger.
pub fn active_operations(state: &CountryState) -> Vec<(&CommitmentId, &Operation)> {
    state
        .commitments
        .iter()
        .filter_map(|c| match &c.kind {
            CommitmentKind::ActiveOperation(op) => Some((&c.id, op)),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use sim_core::testing::sample_country;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn east_of(state: &CountryState, unit_id: &str, km: f64) -> GeoPoint {
        let from = state.military.units[unit_id].location;
        let per_degree = from.distance_km(&GeoPoint::new(from.lat, from.lon + 1.0));
        GeoPoint::new(from.lat, from.lon + km / per_degree)
    }

    fn run_hours(state: &mut CountryState, rng: &mut ChaCha8Rng, hours: u32) -> Vec<Notification> {
        let mut out = Vec::new();
        for _ in 0..hours {
            out.extend(units::advance_movements(state, 1.0));
            out.extend(advance(state, rng, 1.0));
        }
        out
    }

    fn resolved(notes: &[Notification]) -> Option<OperationStatus> {
        notes.iter().find_map(|n| match n {
            Notification::OperationResolved { status, .. } => Some(*status),
            _ => None,
        })
    }

    #[test]
    fn plan_estimates_without_mutation() {
        let state = sample_country();
        let target = east_of(&state, "af-1", 300.0);
        let before = state.clone();
        let plan = plan(&state, OperationType::AirStrike, target, &ids(&["af-1", "af-2"])).unwrap();
        let quality = (90.0 + 60.0 + 70.0) / 3.0;
        let expected = 0.75 + (quality - 50.0) / 250.0 - plan.distance_km / 5000.0;
        assert!((plan.success_probability - expected).abs() < 1e-9);
        assert!((plan.estimated_total_hours - (2.0 + 2.0 * plan.travel_hours)).abs() < 1e-9);
        assert_eq!(state, before);
    }

    #[test]
    fn plan_rejects_bad_assignments() {
        let state = sample_country();
        let t = east_of(&state, "gr-1", 100.0);
        assert!(plan(&state, OperationType::AirPatrol, t, &ids(&["af-1"])).is_err());
        assert!(plan(&state, OperationType::AirStrike, t, &ids(&["gr-1"])).is_err());
        assert!(plan(&state, OperationType::AirPatrol, t, &ids(&["af-1", "af-1"])).is_err());
        let far = east_of(&state, "gr-1", 900.0);
        assert!(plan(&state, OperationType::GroundPatrol, far, &ids(&["gr-1"])).is_err());
        assert!(matches!(
            plan(&state, OperationType::GroundPatrol, t, &ids(&["gr-9"])),
            Err(ActionError::Unknown { .. })
        ));
    }

    #[test]
    fn reserved_units_cannot_be_reused() {
        let mut state = sample_country();
        let t = east_of(&state, "af-1", 300.0);
        create(&mut state, "Alpha", OperationType::AirStrike, t, None, &ids(&["af-1"])).unwrap();
        assert!(create(&mut state, "Bravo", OperationType::Reconnaissance, t, None, &ids(&["af-1"])).is_err());
        assert!(create(&mut state, "Bravo", OperationType::Reconnaissance, t, None, &ids(&["af-2"])).is_ok());
    }

    #[test]
    fn air_strike_runs_to_resolution() {
        let mut state = sample_country();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let t = east_of(&state, "af-1", 300.0);
        let id = create(&mut state, "Thunder", OperationType::AirStrike, t, Some("RUS"), &ids(&["af-1", "af-2"]))
            .unwrap();
        assert_eq!(operation(&state, &id).unwrap().status, OperationStatus::Planning);
        start(&mut state, &id).unwrap();
        assert_eq!(state.military.units["af-1"].status, UnitStatus::InTransit);

        let notes = run_hours(&mut state, &mut rng, 2);
        let status = resolved(&notes).unwrap();
        assert!(matches!(status, OperationStatus::Completed | OperationStatus::Failed));
        assert!(state.commitment(&id).is_none());
        let record = state.military.operation_history.last().unwrap();
        assert_eq!(record.progress_percent, 100.0);
        assert!(record.outcome.is_some());
        assert_eq!(state.relations["RUS"].score, -45.0);

        run_hours(&mut state, &mut rng, 2);
        for uid in ["af-1", "af-2"] {
            let unit = &state.military.units[uid];
            assert!(unit.status == UnitStatus::Idle || unit.status == UnitStatus::Destroyed);
            assert!(unit.assigned_operation.is_none());
        }
    }

    #[test]
    fn missile_strike_fires_from_position() {
        let mut state = sample_country();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let t = east_of(&state, "ms-1", 400.0);
        let id = create(&mut state, "Lance", OperationType::MissileStrike, t, None, &ids(&["ms-1"])).unwrap();
        start(&mut state, &id).unwrap();
        assert_eq!(state.military.units["ms-1"].status, UnitStatus::Deployed);
        let notes = advance(&mut state, &mut rng, 1.0);
        assert!(resolved(&notes).is_some());
        let unit = &state.military.units["ms-1"];
        assert_eq!(unit.status, UnitStatus::Idle);
        assert_eq!(unit.ammunition, 50.0);
    }

    #[test]
    fn failed_start_leaves_state_untouched() {
        let mut state = sample_country();
        let t = east_of(&state, "gr-1", 300.0);
        let id = create(&mut state, "Anvil", OperationType::GroundAssault, t, None, &ids(&["gr-1", "gr-2"])).unwrap();
        state.military.units.get_mut("gr-2").unwrap().fuel = 11.0;
        let before = state.clone();
        assert!(start(&mut state, &id).is_err());
        assert_eq!(state, before);
    }

    #[test]
    fn cancel_sends_units_home() {
        let mut state = sample_country();
        let t = east_of(&state, "nv-1", 200.0);
        let id = create(&mut state, "Shield", OperationType::NavalPatrol, t, None, &ids(&["nv-1", "nv-2"])).unwrap();
        start(&mut state, &id).unwrap();
        units::advance_movements(&mut state, 2.0);
        cancel(&mut state, &id).unwrap();
        assert_eq!(state.military.units["nv-1"].status, UnitStatus::Returning);
        assert_eq!(state.military.operation_history.last().unwrap().status, OperationStatus::Cancelled);
        assert!(matches!(cancel(&mut state, &id), Err(ActionError::Unknown { .. })));

        let planned = create(&mut state, "Watch", OperationType::GroundPatrol, t, None, &ids(&["gr-1"])).unwrap();
        cancel(&mut state, &planned).unwrap();
        assert!(state.military.units["gr-1"].is_available());
    }

    #[test]
    fn same_seed_same_outcome() {
        let run = || {
            let mut state = sample_country();
            let mut rng = ChaCha8Rng::seed_from_u64(21);
            let t = east_of(&state, "sf-1", 100.0);
            let id = create(&mut state, "Night", OperationType::SpecialOps, t, Some("CHN"), &ids(&["sf-1", "hc-1"]))
                .unwrap();
            start(&mut state, &id).unwrap();
            run_hours(&mut state, &mut rng, 24);
            state
        };
        assert_eq!(run(), run());
    }

    proptest! {
        #[test]
        fn success_estimate_is_bounded(
            health in 0.0f64..100.0,
            experience in 0.0f64..100.0,
            morale in 0.0f64..100.0,
            distance in 0.0f64..20_000.0,
            base in 0.0f64..1.0,
        ) {
            let mut unit = sample_country().military.units["af-1"].clone();
            unit.health = health;
            unit.experience = experience;
            unit.morale = morale;
            let p = success_estimate(base, &[&unit], distance);
            prop_assert!((MIN_SUCCESS..=MAX_SUCCESS).contains(&p));
        }
    }
}
