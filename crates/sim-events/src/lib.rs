#![deny(warnings)]

//! Random and forced events.
//!
//! Definitions are loaded from YAML and their trigger conditions are parsed
//! once. Each month the engine ages active events, rolls every definition
//! against a single view of the snapshot and applies the effects of the ones
//! that fire.

use sim_core::SimError;
use thiserror::Error;

pub mod catalog;
pub mod condition;
pub mod engine;

pub use catalog::{EventCatalog, EventDefinition, RawEventDefinition, ResponseDefinition};
pub use condition::{CompareOp, Condition};
pub use engine::{force_event, monthly_update, probability, process_active_events, respond, ResponseApplied};

#[derive(Debug, Error)]
pub enum EventError {
    #[error("invalid condition '{text}': {reason}")]
    InvalidCondition { text: String, reason: String },
    #[error("event '{0}' has a base probability outside [0, 1]")]
    InvalidProbability(String),
    #[error("event catalog parse error: {0}")]
    Parse(String),
    #[error("event catalog io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<EventError> for SimError {
    fn from(e: EventError) -> Self {
        SimError::Catalog(e.to_string())
    }
}
