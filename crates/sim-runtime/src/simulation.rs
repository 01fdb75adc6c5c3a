//! The simulation façade: one country snapshot, its catalogs and the
//! scheduler that advances it.
//!
//! Every player action runs on a copy of the snapshot that replaces the live
//! one only on success, so a rejected action never leaves partial changes.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sim_core::military::{GeoPoint, OperationType, ReadinessLevel};
use sim_core::state::MigrationPolicy;
use sim_core::{
    check_all, validate_catalogs, validate_state, ActionError, Catalogs, Commitment, CommitmentId, Constraint,
    ConstraintResult, CountryState, Notification, SimConfig, SimError,
};
use sim_econ::budget::{AllocationChange, DebtChange, FundingSource, TaxChange};
use sim_econ::demographics::PolicyChange;
use sim_econ::economy::ProjectionPoint;
use sim_econ::sectors::{ProjectStarted, ProjectSummary};
use sim_events::{EventCatalog, ResponseApplied};
use sim_military::{
    missions, operations, procurement, units, Asset, EligibilityReport, MilitarySummary, MissionPlan, MissionReport,
    MissionType, Movement, OperationPlan, OrderCancelled, OrderPlaced, ReadinessChange, Sale, UnitStats,
};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::clock::Clock;
use crate::scheduler::{Scheduler, TickInputs};

pub struct Simulation {
    state: CountryState,
    catalogs: Catalogs,
    events: EventCatalog,
    config: SimConfig,
    scheduler: Scheduler,
    rng: ChaCha8Rng,
    clock: Clock,
    outbox: Vec<Notification>,
}

fn rating_note(change: &DebtChange) -> Option<Notification> {
    let (from, to) = change.rating_change.clone()?;
    Some(Notification::CreditRatingChanged {
        upgrade: change.upgraded().unwrap_or(false),
        from,
        to,
    })
}

impl Simulation {
    /// Validate the snapshot and catalogs and wire the default handlers.
    pub fn new(
        state: CountryState,
        catalogs: Catalogs,
        events: EventCatalog,
        config: SimConfig,
    ) -> Result<Self, SimError> {
        validate_state(&state)?;
        validate_catalogs(&catalogs)?;
        let clock = Clock::new(state.meta.current_date, state.meta.elapsed_days);
        info!(
            country = %state.meta.country_code,
            date = %clock.date(),
            seed = config.rng_seed,
            "simulation ready"
        );
        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(config.rng_seed),
            scheduler: Scheduler::with_default_handlers(),
            outbox: Vec::new(),
            state,
            catalogs,
            events,
            config,
            clock,
        })
    }

    /// Replace the handler chains.
    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn state(&self) -> &CountryState {
        &self.state
    }

    pub fn into_state(self) -> CountryState {
        self.state
    }

    pub fn catalogs(&self) -> &Catalogs {
        &self.catalogs
    }

    pub fn events(&self) -> &EventCatalog {
        &self.events
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn pause(&mut self) {
        self.clock.pause();
        info!(date = %self.clock.date(), "paused");
    }

    pub fn resume(&mut self) {
        self.clock.resume();
        info!(date = %self.clock.date(), "resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.clock.is_paused()
    }

    pub fn set_speed(&mut self, speed: f64) -> f64 {
        self.clock.set_speed(speed)
    }

    /// Real-time delay between two days at the current speed.
    pub fn tick_interval(&self) -> Duration {
        self.clock.interval(self.config.realtime_base_interval_ms)
    }

    /// Simulate the next day regardless of pause. On error the snapshot,
    /// generator and calendar stay where they were.
    pub fn apply_tick(&mut self) -> Result<Vec<Notification>, SimError> {
        let (date, elapsed) = self
            .clock
            .next_day()
            .ok_or_else(|| SimError::Integrity("calendar exhausted".into()))?;
        let inputs = TickInputs {
            catalogs: &self.catalogs,
            events: &self.events,
            config: &self.config,
        };
        let outcome = self.scheduler.apply_tick(&self.state, &self.rng, date, elapsed, inputs)?;
        self.state = outcome.state;
        self.rng = outcome.rng;
        self.clock.commit(date, elapsed);
        Ok(outcome.notifications)
    }

    /// Simulate one day unless paused.
    pub fn advance_day(&mut self) -> Result<Vec<Notification>, SimError> {
        if self.clock.is_paused() {
            return Ok(Vec::new());
        }
        self.apply_tick()
    }

    /// Simulate `days` consecutive days, stopping at the first fault.
    #[instrument(level = "info", skip(self), fields(country = %self.state.meta.country_code))]
    pub fn run_days(&mut self, days: u32) -> Result<Vec<Notification>, SimError> {
        let mut out = Vec::new();
        for _ in 0..days {
            out.extend(self.apply_tick()?);
        }
        info!(date = %self.clock.date(), "run finished");
        Ok(out)
    }

    /// Evaluate constraints against the live snapshot.
    pub fn validate(&self, constraints: &[Constraint]) -> Vec<ConstraintResult> {
        check_all(&self.state, constraints).1
    }

    /// Evaluate a named constraint template.
    pub fn validate_template(&self, name: &str) -> Result<(bool, Vec<ConstraintResult>), ActionError> {
        let template = self
            .catalogs
            .constraint_templates
            .get(name)
            .ok_or_else(|| ActionError::unknown("constraint template", name))?;
        Ok(template.validate(&self.state))
    }

    /// Notifications raised by player actions since the last call.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.outbox)
    }

    fn act<T>(
        &mut self,
        action: &'static str,
        f: impl FnOnce(&mut CountryState, &Catalogs, &EventCatalog) -> Result<T, ActionError>,
    ) -> Result<T, ActionError> {
        let mut working = self.state.clone();
        let result = f(&mut working, &self.catalogs, &self.events).and_then(|out| {
            working.normalize();
            validate_state(&working).map_err(|e| ActionError::InvalidState(e.to_string()))?;
            Ok(out)
        });
        match result {
            Ok(out) => {
                self.state = working;
                Ok(out)
            }
            Err(e) => {
                warn!(action, error = %e, "action rejected");
                Err(e)
            }
        }
    }

    // Budget and economy.

    pub fn adjust_allocation(
        &mut self,
        category: &str,
        new_percent: f64,
        source: FundingSource,
    ) -> Result<AllocationChange, ActionError> {
        self.act("adjust_allocation", |s, _, _| {
            sim_econ::adjust_allocation(s, category, new_percent, source)
        })
    }

    pub fn take_debt(&mut self, amount_billions: f64) -> Result<DebtChange, ActionError> {
        let change = self.act("take_debt", |s, _, _| sim_econ::take_debt(s, amount_billions))?;
        self.outbox.extend(rating_note(&change));
        Ok(change)
    }

    pub fn repay_debt(&mut self, amount_billions: f64) -> Result<DebtChange, ActionError> {
        let change = self.act("repay_debt", |s, _, _| sim_econ::repay_debt(s, amount_billions))?;
        self.outbox.extend(rating_note(&change));
        Ok(change)
    }

    pub fn adjust_tax(&mut self, new_rate: f64) -> Result<TaxChange, ActionError> {
        self.act("adjust_tax", |s, _, _| sim_econ::adjust_tax(s, new_rate))
    }

    /// Month-by-month outlook without touching the snapshot.
    pub fn project_economy(&self, months: u32) -> Result<Vec<ProjectionPoint>, SimError> {
        sim_econ::project(&self.state, months, self.config.baseline_gdp_billions)
    }

    pub fn set_migration_policy(&mut self, policy: MigrationPolicy) -> PolicyChange {
        let change = sim_econ::demographics::set_migration_policy(&mut self.state, policy);
        self.state.normalize();
        change
    }

    // Sectors and infrastructure.

    pub fn invest(&mut self, sector: &str, amount_billions: f64, target_gain: f64) -> Result<ProjectStarted, ActionError> {
        self.act("invest", |s, _, _| sim_econ::invest(s, sector, amount_billions, target_gain))
    }

    pub fn start_infrastructure_project(
        &mut self,
        project_type: &str,
        custom_name: Option<&str>,
    ) -> Result<ProjectStarted, ActionError> {
        self.act("start_infrastructure_project", |s, c, _| {
            sim_econ::start_infrastructure_project(s, c, project_type, custom_name)
        })
    }

    pub fn cancel_project(&mut self, id: &CommitmentId) -> Result<Commitment, ActionError> {
        self.act("cancel_project", |s, _, _| sim_econ::sectors::cancel_project(s, id))
    }

    pub fn active_projects(&self) -> Vec<ProjectSummary> {
        sim_econ::sectors::active_projects(&self.state)
    }

    // Procurement.

    pub fn check_purchase(&self, weapon_id: &str, quantity: u32) -> Result<EligibilityReport, ActionError> {
        procurement::check_eligibility(&self.state, &self.catalogs, weapon_id, quantity)
    }

    pub fn order_weapon(&mut self, weapon_id: &str, quantity: u32) -> Result<OrderPlaced, ActionError> {
        self.act("order_weapon", |s, c, _| procurement::order(s, c, weapon_id, quantity))
    }

    pub fn cancel_order(&mut self, id: &CommitmentId) -> Result<OrderCancelled, ActionError> {
        self.act("cancel_order", |s, _, _| procurement::cancel_order(s, id))
    }

    pub fn sell_equipment(&mut self, model: &str, quantity: u32, buyer: &str) -> Result<Sale, ActionError> {
        self.act("sell_equipment", |s, _, _| procurement::sell(s, model, quantity, buyer))
    }

    // Units.

    pub fn deploy_unit(&mut self, unit_id: &str, destination: GeoPoint) -> Result<Movement, ActionError> {
        self.act("deploy_unit", |s, _, _| units::deploy(s, unit_id, destination))
    }

    pub fn return_unit(&mut self, unit_id: &str) -> Result<Movement, ActionError> {
        self.act("return_unit", |s, _, _| units::return_to_base(s, unit_id))
    }

    pub fn resupply_unit(&mut self, unit_id: &str) -> Result<UnitStats, ActionError> {
        self.act("resupply_unit", |s, _, _| units::resupply(s, unit_id))
    }

    pub fn repair_unit(&mut self, unit_id: &str, amount: Option<f64>) -> Result<UnitStats, ActionError> {
        let amount = amount.unwrap_or(units::DEFAULT_REPAIR);
        self.act("repair_unit", |s, _, _| units::repair(s, unit_id, amount))
    }

    // Operations.

    pub fn plan_operation(
        &self,
        op_type: OperationType,
        target: GeoPoint,
        unit_ids: &[String],
    ) -> Result<OperationPlan, ActionError> {
        operations::plan(&self.state, op_type, target, unit_ids)
    }

    pub fn create_operation(
        &mut self,
        name: &str,
        op_type: OperationType,
        target: GeoPoint,
        target_country: Option<&str>,
        unit_ids: &[String],
    ) -> Result<CommitmentId, ActionError> {
        self.act("create_operation", |s, _, _| {
            operations::create(s, name, op_type, target, target_country, unit_ids)
        })
    }

    pub fn start_operation(&mut self, id: &CommitmentId) -> Result<(), ActionError> {
        self.act("start_operation", |s, _, _| operations::start(s, id))
    }

    pub fn cancel_operation(&mut self, id: &CommitmentId) -> Result<(), ActionError> {
        let note = self.act("cancel_operation", |s, _, _| operations::cancel(s, id))?;
        self.outbox.push(note);
        Ok(())
    }

    // Missions and readiness.

    pub fn plan_mission(
        &self,
        mission: MissionType,
        target_country: &str,
        committed: Option<&BTreeMap<Asset, u32>>,
    ) -> Result<MissionPlan, ActionError> {
        missions::plan(&self.state, mission, target_country, committed)
    }

    /// Resolve a mission at once. The simulation's random stream only
    /// advances when the mission goes through.
    pub fn execute_mission(
        &mut self,
        mission: MissionType,
        target_country: &str,
        committed: Option<&BTreeMap<Asset, u32>>,
    ) -> Result<MissionReport, ActionError> {
        let mut rng = self.rng.clone();
        let report = self.act("execute_mission", |s, _, _| {
            missions::execute(s, &mut rng, mission, target_country, committed)
        })?;
        self.rng = rng;
        self.outbox.push(Notification::MissionResolved {
            mission: mission.as_str().to_string(),
            target_country: report.target_country.clone(),
            objective_achieved: report.objective_achieved,
        });
        Ok(report)
    }

    pub fn set_readiness_level(&mut self, level: ReadinessLevel) -> Result<ReadinessChange, ActionError> {
        self.act("set_readiness_level", |s, _, _| Ok(missions::set_readiness_level(s, level)))
    }

    pub fn military_summary(&self) -> MilitarySummary {
        missions::summary(&self.state)
    }

    // Events.

    pub fn respond_to_event(&mut self, instance_id: &str, response: &str) -> Result<ResponseApplied, ActionError> {
        self.act("respond_to_event", |s, _, e| sim_events::respond(s, e, instance_id, response))
    }

    /// Trigger an event immediately, bypassing its probability roll.
    pub fn force_event(&mut self, event_id: &str) -> Result<(), ActionError> {
        let note = self.act("force_event", |s, _, e| sim_events::force_event(s, e, event_id))?;
        self.outbox.push(note);
        Ok(())
    }
}
