#![deny(warnings)]

//! Runtime for the nation simulation: the calendar, the cadence scheduler,
//! the [`Simulation`] façade players act through, and a real-time driver.

pub mod clock;
pub mod handlers;
pub mod realtime;
pub mod scheduler;
pub mod simulation;

pub use clock::{cadences_for, Clock};
pub use realtime::{run_realtime, shared, SharedSimulation, StopReason};
pub use scheduler::{Scheduler, TickContext, TickHandler, TickInputs, TickOutcome};
pub use simulation::Simulation;
