//! Military forces: bases, units and operations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::commitments::CommitmentId;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// A point on the globe in decimal degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance in kilometres (haversine).
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = (other.lat - self.lat).to_radians();
        let dlon = (other.lon - self.lon).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

/// Broad class of a unit; drives speed, fuel burn and eligible operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitCategory {
    Aircraft,
    Helicopter,
    Ground,
    Naval,
    AirDefense,
    Missile,
    SpecialOps,
}

impl UnitCategory {
    /// Cruise speed in km/h.
    pub fn default_speed_kmh(self) -> f64 {
        match self {
            UnitCategory::Aircraft => 800.0,
            UnitCategory::Helicopter => 250.0,
            UnitCategory::Ground => 50.0,
            UnitCategory::Naval => 45.0,
            UnitCategory::AirDefense => 30.0,
            UnitCategory::Missile => 0.0,
            UnitCategory::SpecialOps => 40.0,
        }
    }

    /// Fuel percentage points burned per hour of movement.
    pub fn fuel_rate_per_hour(self) -> f64 {
        match self {
            UnitCategory::Aircraft => 5.0,
            UnitCategory::Helicopter => 4.0,
            UnitCategory::Ground => 2.0,
            UnitCategory::Naval => 1.5,
            UnitCategory::AirDefense => 1.0,
            UnitCategory::Missile => 0.0,
            UnitCategory::SpecialOps => 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Idle,
    InTransit,
    Deployed,
    Returning,
    Destroyed,
}

/// A military installation units deploy from and return to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Base {
    pub name: String,
    pub location: GeoPoint,
    #[serde(default)]
    pub can_repair: bool,
}

/// A deployable formation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: String,
    pub name: String,
    /// Equipment model, e.g. "F-16".
    pub unit_type: String,
    pub category: UnitCategory,
    pub status: UnitStatus,
    /// Key into `Military::bases`.
    pub home_base: String,
    pub location: GeoPoint,
    #[serde(default)]
    pub destination: Option<GeoPoint>,
    /// Hours left on the current movement leg.
    #[serde(default)]
    pub travel_hours_remaining: f64,
    /// All stats below are in [0,100].
    pub health: f64,
    pub experience: f64,
    pub morale: f64,
    pub fuel: f64,
    pub ammunition: f64,
    /// Operational radius; round trips may not exceed twice this.
    pub combat_radius_km: f64,
    /// Overrides the category default when set.
    #[serde(default)]
    pub speed_kmh: Option<f64>,
    #[serde(default)]
    pub assigned_operation: Option<CommitmentId>,
}

impl Unit {
    pub fn speed(&self) -> f64 {
        self.speed_kmh.unwrap_or_else(|| self.category.default_speed_kmh())
    }

    pub fn max_range_km(&self) -> f64 {
        self.combat_radius_km * 2.0
    }

    pub fn is_available(&self) -> bool {
        self.status == UnitStatus::Idle && self.assigned_operation.is_none()
    }

    pub fn clamp_stats(&mut self) {
        for v in [
            &mut self.health,
            &mut self.experience,
            &mut self.morale,
            &mut self.fuel,
            &mut self.ammunition,
        ] {
            *v = v.clamp(0.0, 100.0);
        }
        if self.health <= 0.0 {
            self.status = UnitStatus::Destroyed;
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    AirStrike,
    AirPatrol,
    GroundAssault,
    GroundPatrol,
    NavalPatrol,
    NavalBlockade,
    Reconnaissance,
    MissileStrike,
    SpecialOps,
}

impl OperationType {
    pub const ALL: [OperationType; 9] = [
        OperationType::AirStrike,
        OperationType::AirPatrol,
        OperationType::GroundAssault,
        OperationType::GroundPatrol,
        OperationType::NavalPatrol,
        OperationType::NavalBlockade,
        OperationType::Reconnaissance,
        OperationType::MissileStrike,
        OperationType::SpecialOps,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationType::AirStrike => "air_strike",
            OperationType::AirPatrol => "air_patrol",
            OperationType::GroundAssault => "ground_assault",
            OperationType::GroundPatrol => "ground_patrol",
            OperationType::NavalPatrol => "naval_patrol",
            OperationType::NavalBlockade => "naval_blockade",
            OperationType::Reconnaissance => "reconnaissance",
            OperationType::MissileStrike => "missile_strike",
            OperationType::SpecialOps => "special_ops",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Planning,
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Cancelled
        )
    }
}

/// Outcome recorded when an operation resolves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcome {
    pub success: bool,
    /// The roll compared against `success_probability`.
    pub roll: f64,
    /// Health lost per unit id.
    pub damage: BTreeMap<String, f64>,
    pub relations_penalty: f64,
}

/// A military operation against a location.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    pub op_type: OperationType,
    pub target: GeoPoint,
    #[serde(default)]
    pub target_country: Option<String>,
    pub unit_ids: Vec<String>,
    pub status: OperationStatus,
    /// In [0,100]; resolution happens at 100.
    pub progress_percent: f64,
    pub duration_hours: f64,
    /// Set once every assigned unit has reached the target.
    pub units_arrived: bool,
    pub success_probability: f64,
    #[serde(default)]
    pub outcome: Option<OperationOutcome>,
}

impl Operation {
    pub fn remaining_hours(&self) -> f64 {
        self.duration_hours * (100.0 - self.progress_percent).max(0.0) / 100.0
    }
}

/// Manpower that is not organised into roster units.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Personnel {
    pub active_duty: u64,
    pub reserves: u64,
    pub special_forces: u64,
}

/// Standing alert posture of the armed forces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessLevel {
    Low,
    #[default]
    Normal,
    High,
    Maximum,
}

impl ReadinessLevel {
    pub const ALL: [ReadinessLevel; 4] = [Self::Low, Self::Normal, Self::High, Self::Maximum];

    /// Overall readiness the posture settles at.
    pub fn readiness(self) -> f64 {
        match self {
            Self::Low => 50.0,
            Self::Normal => 75.0,
            Self::High => 90.0,
            Self::Maximum => 100.0,
        }
    }

    /// Factor on the defense operations budget relative to `Normal`.
    pub fn cost_multiplier(self) -> f64 {
        match self {
            Self::Low => 0.7,
            Self::Normal => 1.0,
            Self::High => 1.5,
            Self::Maximum => 2.0,
        }
    }

    pub fn response_time(self) -> &'static str {
        match self {
            Self::Low => "days",
            Self::Normal => "hours",
            Self::High => "minutes",
            Self::Maximum => "immediate",
        }
    }
}

/// The armed forces of a country.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Military {
    /// Overall readiness in [0,100].
    pub readiness: f64,
    #[serde(default)]
    pub readiness_level: ReadinessLevel,
    #[serde(default)]
    pub personnel: Personnel,
    /// Munitions stockpile by type.
    #[serde(default)]
    pub munitions: BTreeMap<String, u32>,
    pub bases: BTreeMap<String, Base>,
    pub units: BTreeMap<String, Unit>,
    /// Resolved or cancelled operations, newest last.
    #[serde(default)]
    pub operation_history: Vec<Operation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_matches_known_distance() {
        // Paris to London is roughly 344 km.
        let paris = GeoPoint::new(48.8566, 2.3522);
        let london = GeoPoint::new(51.5074, -0.1278);
        let d = paris.distance_km(&london);
        assert!((d - 344.0).abs() < 5.0, "got {d}");
        assert!(paris.distance_km(&paris).abs() < 1e-9);
    }

    #[test]
    fn zero_health_destroys_unit() {
        let mut u = Unit {
            id: "u1".into(),
            name: "1st".into(),
            unit_type: "F-16".into(),
            category: UnitCategory::Aircraft,
            status: UnitStatus::Idle,
            home_base: "north".into(),
            location: GeoPoint::new(0.0, 0.0),
            destination: None,
            travel_hours_remaining: 0.0,
            health: -5.0,
            experience: 120.0,
            morale: 50.0,
            fuel: 100.0,
            ammunition: 100.0,
            combat_radius_km: 800.0,
            speed_kmh: None,
            assigned_operation: None,
        };
        u.clamp_stats();
        assert_eq!(u.health, 0.0);
        assert_eq!(u.experience, 100.0);
        assert_eq!(u.status, UnitStatus::Destroyed);
        assert_eq!(u.speed(), 800.0);
    }
}
