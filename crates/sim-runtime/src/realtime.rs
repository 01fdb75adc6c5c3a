//! Real-time driver.
//!
//! All mutation of a country goes through one [`SharedSimulation`] lock, so a
//! player action issued while a day is being simulated waits for the day to
//! finish. The driver holds the lock for exactly one tick and sleeps without
//! it; ticks are never run concurrently or skipped.

use sim_core::{Notification, SimError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::simulation::Simulation;

/// The single mutation lock around one country's simulation.
pub type SharedSimulation = Arc<Mutex<Simulation>>;

pub fn shared(sim: Simulation) -> SharedSimulation {
    Arc::new(Mutex::new(sim))
}

/// How long a paused driver waits before looking again.
const PAUSE_POLL: Duration = Duration::from_millis(50);

/// Why the driver returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The requested number of days was simulated.
    DayLimit,
    /// Nobody is listening for notifications any more.
    ReceiverClosed,
}

/// Drive `sim` one day per `base_interval / speed` until `max_days` have been
/// simulated or the receiver is dropped. Notifications from each tick and
/// from player actions in between are forwarded in order.
pub async fn run_realtime(
    sim: SharedSimulation,
    tx: mpsc::Sender<Notification>,
    max_days: Option<u64>,
) -> Result<(u64, StopReason), SimError> {
    let mut simulated = 0u64;
    loop {
        if max_days.is_some_and(|m| simulated >= m) {
            info!(days = simulated, "real-time run finished");
            return Ok((simulated, StopReason::DayLimit));
        }
        let (notes, delay) = {
            let mut guard = sim.lock().await;
            if guard.is_paused() {
                let pending = guard.take_notifications();
                (pending, None)
            } else {
                let mut notes = guard.take_notifications();
                notes.extend(guard.advance_day()?);
                simulated += 1;
                (notes, Some(guard.tick_interval()))
            }
        };
        for note in notes {
            if tx.send(note).await.is_err() {
                debug!("notification receiver dropped");
                return Ok((simulated, StopReason::ReceiverClosed));
            }
        }
        match delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => {
                if tx.is_closed() {
                    return Ok((simulated, StopReason::ReceiverClosed));
                }
                tokio::time::sleep(PAUSE_POLL).await;
            }
        }
    }
}
