//! Unit movement, resupply, repair and stat updates.
//!
//! Movement is simulated in hour steps. Fuel for a leg is paid when the
//! unit departs; positions are interpolated along the leg.

use serde::{Deserialize, Serialize};
use sim_core::military::{GeoPoint, Unit, UnitStatus};
use sim_core::{ActionError, CountryState, Notification};
use tracing::{debug, info};

pub const MIN_HEALTH_TO_MOVE: f64 = 20.0;
pub const MIN_FUEL_TO_MOVE: f64 = 10.0;
/// Health restored by one repair.
pub const DEFAULT_REPAIR: f64 = 20.0;
/// Distance under which a unit counts as being at a location.
const AT_LOCATION_KM: f64 = 1.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub unit_id: String,
    pub distance_km: f64,
    pub travel_hours: f64,
    pub fuel_consumed: f64,
    pub status: UnitStatus,
}

/// Stat changes applied by combat, supply or scripted effects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatDelta {
    pub health: f64,
    pub fuel: f64,
    pub ammunition: f64,
    pub morale: f64,
    pub experience: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitStats {
    pub unit_id: String,
    pub status: UnitStatus,
    pub health: f64,
    pub fuel: f64,
    pub ammunition: f64,
    pub morale: f64,
    pub experience: f64,
}

impl From<&Unit> for UnitStats {
    fn from(u: &Unit) -> Self {
        Self {
            unit_id: u.id.clone(),
            status: u.status,
            health: u.health,
            fuel: u.fuel,
            ammunition: u.ammunition,
            morale: u.morale,
            experience: u.experience,
        }
    }
}

/// Why a unit may not start moving, if anything.
pub fn movement_blocker(unit: &Unit) -> Option<&'static str> {
    match unit.status {
        UnitStatus::Destroyed => Some("unit is destroyed"),
        UnitStatus::InTransit | UnitStatus::Returning => Some("unit is already moving"),
        _ if unit.health < MIN_HEALTH_TO_MOVE => Some("unit health too low"),
        _ if unit.fuel < MIN_FUEL_TO_MOVE => Some("insufficient fuel"),
        _ => None,
    }
}

/// Hours a unit needs to cover `distance_km`. Stationary units never move.
pub fn travel_hours(unit: &Unit, distance_km: f64) -> Option<f64> {
    let speed = unit.speed();
    if distance_km < AT_LOCATION_KM {
        Some(0.0)
    } else if speed > 0.0 {
        Some(distance_km / speed)
    } else {
        None
    }
}

fn step_towards(from: GeoPoint, to: GeoPoint, fraction: f64) -> GeoPoint {
    GeoPoint::new(
        from.lat + (to.lat - from.lat) * fraction,
        from.lon + (to.lon - from.lon) * fraction,
    )
}

fn unit_mut<'a>(state: &'a mut CountryState, unit_id: &str) -> Result<&'a mut Unit, ActionError> {
    state
        .military
        .units
        .get_mut(unit_id)
        .ok_or_else(|| ActionError::unknown("unit", unit_id))
}

/// Key of the base the unit is idle at, if any.
pub fn stationed_at<'a>(state: &'a CountryState, unit: &Unit) -> Option<&'a str> {
    if unit.status != UnitStatus::Idle {
        return None;
    }
    state
        .military
        .bases
        .iter()
        .find(|(_, b)| b.location.distance_km(&unit.location) < AT_LOCATION_KM)
        .map(|(k, _)| k.as_str())
}

/// Send a unit towards `destination`.
///
/// Units without speed (missile batteries) engage from where they stand:
/// they deploy in place when the destination is within range.
pub fn deploy(state: &mut CountryState, unit_id: &str, destination: GeoPoint) -> Result<Movement, ActionError> {
    let unit = unit_mut(state, unit_id)?;
    if let Some(reason) = movement_blocker(unit) {
        return Err(ActionError::Rejected(format!("{unit_id}: {reason}")));
    }
    let distance_km = unit.location.distance_km(&destination);
    if unit.combat_radius_km > 0.0 && distance_km > unit.max_range_km() {
        return Err(ActionError::Rejected(format!(
            "{unit_id}: destination out of range ({distance_km:.0} km > {:.0} km)",
            unit.max_range_km()
        )));
    }
    let (hours, fuel_needed) = if unit.speed() > 0.0 {
        let hours = travel_hours(unit, distance_km).unwrap_or(0.0);
        (hours, hours * unit.category.fuel_rate_per_hour())
    } else {
        (0.0, 0.0)
    };
    if fuel_needed > unit.fuel {
        return Err(ActionError::Rejected(format!(
            "{unit_id}: needs {fuel_needed:.1}% fuel, has {:.1}%",
            unit.fuel
        )));
    }

    unit.fuel -= fuel_needed;
    if hours > 0.0 {
        unit.status = UnitStatus::InTransit;
        unit.destination = Some(destination);
        unit.travel_hours_remaining = hours;
    } else {
        unit.status = UnitStatus::Deployed;
        if unit.speed() > 0.0 {
            unit.location = destination;
        }
        unit.destination = None;
        unit.travel_hours_remaining = 0.0;
    }
    info!(unit_id, distance_km, hours, "unit deployed");
    Ok(Movement {
        unit_id: unit_id.to_string(),
        distance_km,
        travel_hours: hours,
        fuel_consumed: fuel_needed,
        status: unit.status,
    })
}

/// Head back to the home base. Fuel is burned as far as the tank allows.
pub fn return_to_base(state: &mut CountryState, unit_id: &str) -> Result<Movement, ActionError> {
    let home = {
        let unit = state
            .military
            .units
            .get(unit_id)
            .ok_or_else(|| ActionError::unknown("unit", unit_id))?;
        state
            .military
            .bases
            .get(&unit.home_base)
            .map(|b| b.location)
            .ok_or_else(|| ActionError::unknown("base", unit.home_base.clone()))?
    };
    let unit = unit_mut(state, unit_id)?;
    if unit.status == UnitStatus::Destroyed {
        return Err(ActionError::Rejected(format!("{unit_id}: unit is destroyed")));
    }
    let distance_km = unit.location.distance_km(&home);
    let hours = travel_hours(unit, distance_km).unwrap_or(0.0);
    let fuel_consumed = (hours * unit.category.fuel_rate_per_hour()).min(unit.fuel);
    unit.fuel -= fuel_consumed;
    if hours > 0.0 {
        unit.status = UnitStatus::Returning;
        unit.destination = Some(home);
        unit.travel_hours_remaining = hours;
    } else {
        unit.status = UnitStatus::Idle;
        unit.location = home;
        unit.destination = None;
        unit.travel_hours_remaining = 0.0;
        unit.assigned_operation = None;
    }
    info!(unit_id, hours, "unit returning to base");
    Ok(Movement {
        unit_id: unit_id.to_string(),
        distance_km,
        travel_hours: hours,
        fuel_consumed,
        status: unit.status,
    })
}

/// Advance every moving unit by `hours`. Arrivals are reported.
pub fn advance_movements(state: &mut CountryState, hours: f64) -> Vec<Notification> {
    let mut out = Vec::new();
    for unit in state.military.units.values_mut() {
        if !matches!(unit.status, UnitStatus::InTransit | UnitStatus::Returning) {
            continue;
        }
        if let Some(dest) = unit.destination {
            let fraction = (hours / unit.travel_hours_remaining.max(f64::EPSILON)).min(1.0);
            unit.location = step_towards(unit.location, dest, fraction);
        }
        unit.travel_hours_remaining -= hours;
        if unit.travel_hours_remaining > 1e-9 {
            continue;
        }
        unit.travel_hours_remaining = 0.0;
        if let Some(dest) = unit.destination.take() {
            unit.location = dest;
        }
        unit.status = if unit.status == UnitStatus::Returning {
            unit.assigned_operation = None;
            UnitStatus::Idle
        } else {
            UnitStatus::Deployed
        };
        debug!(unit = %unit.id, status = ?unit.status, "unit arrived");
        out.push(Notification::UnitMoved { unit_id: unit.id.clone(), status: unit.status });
    }
    out
}

/// Refill fuel and ammunition. The unit must be idle at a base.
pub fn resupply(state: &mut CountryState, unit_id: &str) -> Result<UnitStats, ActionError> {
    let unit = state
        .military
        .units
        .get(unit_id)
        .ok_or_else(|| ActionError::unknown("unit", unit_id))?;
    if stationed_at(state, unit).is_none() {
        return Err(ActionError::Rejected(format!("{unit_id} must be idle at a base to resupply")));
    }
    let unit = unit_mut(state, unit_id)?;
    unit.fuel = 100.0;
    unit.ammunition = 100.0;
    info!(unit_id, "unit resupplied");
    Ok(UnitStats::from(&*unit))
}

/// Restore up to `amount` health at a base with repair facilities.
pub fn repair(state: &mut CountryState, unit_id: &str, amount: f64) -> Result<UnitStats, ActionError> {
    let unit = state
        .military
        .units
        .get(unit_id)
        .ok_or_else(|| ActionError::unknown("unit", unit_id))?;
    let Some(base) = stationed_at(state, unit) else {
        return Err(ActionError::Rejected(format!("{unit_id} must be idle at a base to repair")));
    };
    if !state.military.bases.get(base).is_some_and(|b| b.can_repair) {
        return Err(ActionError::Rejected(format!("{base} has no repair facilities")));
    }
    if !(amount.is_finite() && amount > 0.0) {
        return Err(ActionError::Rejected("repair amount must be positive".into()));
    }
    let unit = unit_mut(state, unit_id)?;
    unit.health = (unit.health + amount).min(100.0);
    info!(unit_id, health = unit.health, "unit repaired");
    Ok(UnitStats::from(&*unit))
}

/// Apply stat deltas, clamped to [0,100]. Zero health destroys the unit.
pub fn update_unit_status(
    state: &mut CountryState,
    unit_id: &str,
    status: Option<UnitStatus>,
    delta: StatDelta,
) -> Result<UnitStats, ActionError> {
    let unit = unit_mut(state, unit_id)?;
    if let Some(status) = status {
        unit.status = status;
    }
    unit.health += delta.health;
    unit.fuel += delta.fuel;
    unit.ammunition += delta.ammunition;
    unit.morale += delta.morale;
    unit.experience += delta.experience;
    unit.clamp_stats();
    if unit.status == UnitStatus::Destroyed {
        info!(unit_id, "unit destroyed");
    }
    Ok(UnitStats::from(&*unit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_core::testing::sample_country;

    fn target_km_east(state: &CountryState, unit_id: &str, km: f64) -> GeoPoint {
        let from = state.military.units[unit_id].location;
        // One degree of longitude at this latitude.
        let per_degree = from.distance_km(&GeoPoint::new(from.lat, from.lon + 1.0));
        GeoPoint::new(from.lat, from.lon + km / per_degree)
    }

    #[test]
    fn deploy_burns_fuel_and_arrives() {
        let mut state = sample_country();
        let dest = target_km_east(&state, "af-1", 400.0);
        let m = deploy(&mut state, "af-1", dest).unwrap();
        assert_eq!(m.status, UnitStatus::InTransit);
        assert!((m.travel_hours - 0.5).abs() < 0.01);
        assert!((state.military.units["af-1"].fuel - (100.0 - m.fuel_consumed)).abs() < 1e-9);
        assert!(advance_movements(&mut state, 0.3).is_empty());
        let notes = advance_movements(&mut state, 0.3);
        assert_eq!(notes.len(), 1);
        let unit = &state.military.units["af-1"];
        assert_eq!(unit.status, UnitStatus::Deployed);
        assert!(unit.location.distance_km(&dest) < 1e-6);
    }

    #[test]
    fn deploy_rejects_out_of_range_and_weak_units() {
        let mut state = sample_country();
        let far = target_km_east(&state, "gr-1", 900.0);
        assert!(matches!(deploy(&mut state, "gr-1", far), Err(ActionError::Rejected(_))));
        state.military.units.get_mut("gr-2").unwrap().health = 15.0;
        let near = target_km_east(&state, "gr-2", 10.0);
        assert!(deploy(&mut state, "gr-2", near).is_err());
        state.military.units.get_mut("sf-1").unwrap().fuel = 5.0;
        assert!(deploy(&mut state, "sf-1", near).is_err());
        assert!(matches!(deploy(&mut state, "zz-9", near), Err(ActionError::Unknown { .. })));
    }

    #[test]
    fn fuel_must_cover_the_leg() {
        let mut state = sample_country();
        // 300 km by ground at 50 km/h burns 12% fuel.
        let dest = target_km_east(&state, "gr-1", 300.0);
        state.military.units.get_mut("gr-1").unwrap().fuel = 11.0;
        assert!(deploy(&mut state, "gr-1", dest).is_err());
        state.military.units.get_mut("gr-1").unwrap().fuel = 13.0;
        assert!(deploy(&mut state, "gr-1", dest).is_ok());
    }

    #[test]
    fn stationary_units_deploy_in_place() {
        let mut state = sample_country();
        let origin = state.military.units["ms-1"].location;
        let dest = target_km_east(&state, "ms-1", 600.0);
        let m = deploy(&mut state, "ms-1", dest).unwrap();
        assert_eq!(m.status, UnitStatus::Deployed);
        assert_eq!(state.military.units["ms-1"].location, origin);
        return_to_base(&mut state, "ms-1").unwrap();
        assert_eq!(state.military.units["ms-1"].status, UnitStatus::Idle);
    }

    #[test]
    fn round_trip_ends_idle_at_home() {
        let mut state = sample_country();
        let dest = target_km_east(&state, "hc-1", 250.0);
        deploy(&mut state, "hc-1", dest).unwrap();
        advance_movements(&mut state, 2.0);
        let m = return_to_base(&mut state, "hc-1").unwrap();
        assert_eq!(m.status, UnitStatus::Returning);
        advance_movements(&mut state, 2.0);
        let unit = &state.military.units["hc-1"];
        assert_eq!(unit.status, UnitStatus::Idle);
        assert_eq!(stationed_at(&state, unit), Some("north_air_base"));
    }

    #[test]
    fn supply_and_repair_need_a_base() {
        let mut state = sample_country();
        state.military.units.get_mut("gr-1").unwrap().fuel = 40.0;
        resupply(&mut state, "gr-1").unwrap();
        assert_eq!(state.military.units["gr-1"].fuel, 100.0);
        // Central Garrison has no repair facilities.
        assert!(repair(&mut state, "gr-1", DEFAULT_REPAIR).is_err());
        let stats = repair(&mut state, "af-1", DEFAULT_REPAIR).unwrap();
        assert_eq!(stats.health, 100.0);

        let dest = target_km_east(&state, "af-2", 100.0);
        deploy(&mut state, "af-2", dest).unwrap();
        assert!(resupply(&mut state, "af-2").is_err());
        assert!(repair(&mut state, "af-2", DEFAULT_REPAIR).is_err());
    }

    #[test]
    fn stat_updates_clamp_and_destroy() {
        let mut state = sample_country();
        let delta = StatDelta { health: -200.0, morale: 50.0, ..StatDelta::default() };
        let stats = update_unit_status(&mut state, "nv-1", None, delta).unwrap();
        assert_eq!(stats.health, 0.0);
        assert_eq!(stats.morale, 100.0);
        assert_eq!(stats.status, UnitStatus::Destroyed);
        let near = target_km_east(&state, "nv-1", 10.0);
        assert!(deploy(&mut state, "nv-1", near).is_err());
        assert!(return_to_base(&mut state, "nv-1").is_err());
    }
}
