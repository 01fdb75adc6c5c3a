#![deny(warnings)]

//! Procurement, unit movement, location-based operations and
//! inventory-backed missions.

pub mod missions;
pub mod operations;
pub mod procurement;
pub mod units;

pub use missions::{Asset, MilitarySummary, MissionPlan, MissionReport, MissionType, ReadinessChange};
pub use operations::{OperationPlan, OperationProfile};
pub use procurement::{EligibilityReport, OrderCancelled, OrderPlaced, OrderSummary, Sale};
pub use units::{Movement, StatDelta, UnitStats};
