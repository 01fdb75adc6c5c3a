//! Typed notifications produced by ticks and actions for presentation layers.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::catalog::Severity;
use crate::commitments::CommitmentId;
use crate::military::{OperationStatus, UnitStatus};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    DayAdvanced {
        date: NaiveDate,
        elapsed_days: u64,
    },
    DeliveryArrived {
        order_id: CommitmentId,
        model: String,
        quantity: u32,
        remaining: u32,
    },
    OrderCompleted {
        order_id: CommitmentId,
        model: String,
    },
    ProjectCompleted {
        project_id: CommitmentId,
        /// Sector name or infrastructure project name.
        target: String,
    },
    EventTriggered {
        instance_id: String,
        definition_id: String,
        name: String,
        severity: Severity,
    },
    EventExpired {
        instance_id: String,
        name: String,
    },
    OperationProgress {
        operation_id: CommitmentId,
        progress_percent: f64,
    },
    OperationResolved {
        operation_id: CommitmentId,
        status: OperationStatus,
    },
    UnitMoved {
        unit_id: String,
        status: UnitStatus,
    },
    MissionResolved {
        mission: String,
        target_country: String,
        objective_achieved: bool,
    },
    CreditRatingChanged {
        from: String,
        to: String,
        upgrade: bool,
    },
    PopulationUpdated {
        total: u64,
        change: i64,
    },
}
