//! Cadence handler chains and the transactional day tick.

use chrono::NaiveDate;
use rand_chacha::ChaCha8Rng;
use sim_core::{validate_state, Cadence, Catalogs, CountryState, Notification, SimConfig, SimError};
use sim_events::EventCatalog;
use std::collections::BTreeMap;
use tracing::{debug, debug_span, warn};

use crate::clock::cadences_for;
use crate::handlers;

/// Read-only inputs shared by every handler of a tick.
#[derive(Clone, Copy)]
pub struct TickInputs<'a> {
    pub catalogs: &'a Catalogs,
    pub events: &'a EventCatalog,
    pub config: &'a SimConfig,
}

/// What a handler sees while it runs.
pub struct TickContext<'a> {
    pub date: NaiveDate,
    pub elapsed_days: u64,
    pub inputs: TickInputs<'a>,
    pub rng: &'a mut ChaCha8Rng,
}

/// One engine's step at one cadence.
pub trait TickHandler: Send {
    fn name(&self) -> &'static str;

    fn run(&mut self, state: &mut CountryState, ctx: &mut TickContext<'_>) -> Result<Vec<Notification>, SimError>;
}

/// Result of a committed tick.
#[derive(Debug)]
pub struct TickOutcome {
    pub state: CountryState,
    pub rng: ChaCha8Rng,
    pub cadences: Vec<Cadence>,
    pub notifications: Vec<Notification>,
}

/// Ordered handler lists, one per cadence.
#[derive(Default)]
pub struct Scheduler {
    chains: BTreeMap<Cadence, Vec<Box<dyn TickHandler>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scheduler wired with every engine in its usual order.
    pub fn with_default_handlers() -> Self {
        let mut s = Self::new();
        s.register(Cadence::Daily, handlers::DateSync);
        s.register(Cadence::Daily, handlers::MilitaryHours);
        s.register(Cadence::Monthly, handlers::Economy);
        s.register(Cadence::Monthly, handlers::Events);
        s.register(Cadence::Quarterly, handlers::Projects);
        s.register(Cadence::Yearly, handlers::Demographics);
        s.register(Cadence::Yearly, handlers::Deliveries);
        s
    }

    /// Append a handler to the end of a cadence's chain.
    pub fn register(&mut self, cadence: Cadence, handler: impl TickHandler + 'static) -> &mut Self {
        self.chains.entry(cadence).or_default().push(Box::new(handler));
        self
    }

    pub fn handler_names(&self, cadence: Cadence) -> Vec<&'static str> {
        self.chains
            .get(&cadence)
            .map(|c| c.iter().map(|h| h.name()).collect())
            .unwrap_or_default()
    }

    /// Process one simulated day on a working copy of `state` and `rng`.
    ///
    /// Handlers run cadence by cadence in registration order. The copy is
    /// normalized and validated before it is returned; any error leaves the
    /// caller's snapshot and generator untouched.
    pub fn apply_tick(
        &mut self,
        state: &CountryState,
        rng: &ChaCha8Rng,
        date: NaiveDate,
        elapsed_days: u64,
        inputs: TickInputs<'_>,
    ) -> Result<TickOutcome, SimError> {
        let mut working = state.clone();
        let mut working_rng = rng.clone();
        let cadences = cadences_for(date, elapsed_days);
        let mut notifications = Vec::new();
        {
            let mut ctx = TickContext {
                date,
                elapsed_days,
                inputs,
                rng: &mut working_rng,
            };
            for cadence in &cadences {
                let Some(chain) = self.chains.get_mut(cadence) else {
                    continue;
                };
                for handler in chain.iter_mut() {
                    let _span = debug_span!("handler", cadence = cadence.as_str(), handler = handler.name()).entered();
                    match handler.run(&mut working, &mut ctx) {
                        Ok(notes) => notifications.extend(notes),
                        Err(e) => {
                            warn!(%date, handler = handler.name(), error = %e, "tick aborted");
                            return Err(e);
                        }
                    }
                }
            }
        }
        working.normalize();
        validate_state(&working)?;
        debug!(%date, elapsed_days, notifications = notifications.len(), "tick applied");
        Ok(TickOutcome {
            state: working,
            rng: working_rng,
            cadences,
            notifications,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use sim_core::testing::{sample_catalogs, sample_country};
    use std::sync::{Arc, Mutex};

    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl TickHandler for Recorder {
        fn name(&self) -> &'static str {
            self.label
        }

        fn run(&mut self, _state: &mut CountryState, ctx: &mut TickContext<'_>) -> Result<Vec<Notification>, SimError> {
            self.log.lock().unwrap().push(format!("{}@{}", self.label, ctx.date));
            Ok(Vec::new())
        }
    }

    struct Corrupt;

    impl TickHandler for Corrupt {
        fn name(&self) -> &'static str {
            "corrupt"
        }

        fn run(&mut self, state: &mut CountryState, _ctx: &mut TickContext<'_>) -> Result<Vec<Notification>, SimError> {
            state.economy.gdp_billions_usd = f64::NAN;
            Ok(Vec::new())
        }
    }

    struct Failing;

    impl TickHandler for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn run(&mut self, state: &mut CountryState, _ctx: &mut TickContext<'_>) -> Result<Vec<Notification>, SimError> {
            state.economy.debt.total_billions = 0.0;
            Err(SimError::Integrity("catalog reference lost".into()))
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut s = Scheduler::new();
        for (cadence, label) in [
            (Cadence::Yearly, "yearly"),
            (Cadence::Daily, "daily-a"),
            (Cadence::Monthly, "monthly"),
            (Cadence::Daily, "daily-b"),
            (Cadence::Quarterly, "quarterly"),
        ] {
            s.register(cadence, Recorder { label, log: log.clone() });
        }
        let (state, catalogs, events, config) =
            (sample_country(), sample_catalogs(), EventCatalog::default(), SimConfig::default());
        let inputs = TickInputs { catalogs: &catalogs, events: &events, config: &config };
        let rng = ChaCha8Rng::seed_from_u64(1);

        s.apply_tick(&state, &rng, date(2024, 1, 2), 1, inputs).unwrap();
        s.apply_tick(&state, &rng, date(2025, 1, 1), 366, inputs).unwrap();
        let seen = log.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                "daily-a@2024-01-02",
                "daily-b@2024-01-02",
                "daily-a@2025-01-01",
                "daily-b@2025-01-01",
                "monthly@2025-01-01",
                "quarterly@2025-01-01",
                "yearly@2025-01-01",
            ]
        );
    }

    #[test]
    fn failed_tick_leaves_state_untouched() {
        let (state, catalogs, events, config) =
            (sample_country(), sample_catalogs(), EventCatalog::default(), SimConfig::default());
        let inputs = TickInputs { catalogs: &catalogs, events: &events, config: &config };
        let rng = ChaCha8Rng::seed_from_u64(1);

        let mut s = Scheduler::new();
        s.register(Cadence::Daily, Failing);
        assert!(matches!(
            s.apply_tick(&state, &rng, date(2024, 1, 2), 1, inputs),
            Err(SimError::Integrity(_))
        ));

        let mut s = Scheduler::new();
        s.register(Cadence::Daily, Corrupt);
        assert!(matches!(
            s.apply_tick(&state, &rng, date(2024, 1, 2), 1, inputs),
            Err(SimError::Validation(_))
        ));
        assert_eq!(state, sample_country());
    }

    #[test]
    fn default_chains() {
        let s = Scheduler::with_default_handlers();
        assert_eq!(s.handler_names(Cadence::Daily), vec!["date_sync", "military_hours"]);
        assert_eq!(s.handler_names(Cadence::Monthly), vec!["economy", "events"]);
        assert_eq!(s.handler_names(Cadence::Quarterly), vec!["projects"]);
        assert_eq!(s.handler_names(Cadence::Yearly), vec!["demographics", "deliveries"]);
        assert!(s.handler_names(Cadence::Weekly).is_empty());
    }
}
