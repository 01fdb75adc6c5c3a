//! Multi-tick commitments: projects, weapon orders and operations in flight.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::military::Operation;

/// Identifier of a commitment in the ledger.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommitmentId(pub String);

impl fmt::Display for CommitmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scheduler cadence at which a commitment advances.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Cadence {
    pub const ALL: [Cadence; 5] = [
        Cadence::Daily,
        Cadence::Weekly,
        Cadence::Monthly,
        Cadence::Quarterly,
        Cadence::Yearly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Cadence::Daily => "daily",
            Cadence::Weekly => "weekly",
            Cadence::Monthly => "monthly",
            Cadence::Quarterly => "quarterly",
            Cadence::Yearly => "yearly",
        }
    }
}

/// Investment raising a sector's development level on completion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SectorProject {
    pub sector: String,
    pub amount_billions: f64,
    /// Level points added when the project completes.
    pub target_gain: f64,
    pub total_quarters: u32,
    pub remaining_quarters: u32,
}

/// Construction adding deltas to infrastructure metrics on completion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InfrastructureProject {
    pub project_type: String,
    pub name: String,
    pub cost_billions: f64,
    pub total_quarters: u32,
    pub remaining_quarters: u32,
    /// Dot-path deltas applied through the path resolver.
    pub effects: BTreeMap<String, f64>,
}

/// A weapon order awaiting delivery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcurementOrder {
    pub weapon_id: String,
    pub model: String,
    /// Country code of the supplier.
    pub manufacturer: String,
    pub category: String,
    pub subcategory: String,
    pub quantity: u32,
    pub delivered: u32,
    #[serde(with = "rust_decimal::serde::str")]
    pub unit_cost_millions: Decimal,
    pub total_cost_billions: f64,
    pub order_year: i32,
    /// No delivery happens before this year.
    pub delivery_start_year: i32,
    pub per_year_rate: u32,
}

impl ProcurementOrder {
    pub fn undelivered(&self) -> u32 {
        self.quantity.saturating_sub(self.delivered)
    }

    pub fn is_complete(&self) -> bool {
        self.delivered >= self.quantity
    }
}

/// Payload of a commitment, dispatched by tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CommitmentKind {
    SectorProject(SectorProject),
    InfrastructureProject(InfrastructureProject),
    ProcurementOrder(ProcurementOrder),
    ActiveOperation(Operation),
}

/// An entry in the commitment ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Commitment {
    pub id: CommitmentId,
    pub started_on: NaiveDate,
    pub kind: CommitmentKind,
}

impl Commitment {
    /// Remaining duration in the unit of the commitment's cadence:
    /// quarters for projects, undelivered units for orders, hours for operations.
    pub fn remaining(&self) -> f64 {
        match &self.kind {
            CommitmentKind::SectorProject(p) => p.remaining_quarters as f64,
            CommitmentKind::InfrastructureProject(p) => p.remaining_quarters as f64,
            CommitmentKind::ProcurementOrder(o) => o.undelivered() as f64,
            CommitmentKind::ActiveOperation(op) => op.remaining_hours(),
        }
    }

    pub fn cadence(&self) -> Cadence {
        match &self.kind {
            CommitmentKind::SectorProject(_) | CommitmentKind::InfrastructureProject(_) => {
                Cadence::Quarterly
            }
            CommitmentKind::ProcurementOrder(_) => Cadence::Yearly,
            CommitmentKind::ActiveOperation(_) => Cadence::Daily,
        }
    }

    pub fn label(&self) -> &'static str {
        match &self.kind {
            CommitmentKind::SectorProject(_) => "sector_project",
            CommitmentKind::InfrastructureProject(_) => "infrastructure_project",
            CommitmentKind::ProcurementOrder(_) => "procurement_order",
            CommitmentKind::ActiveOperation(_) => "operation",
        }
    }
}
