//! The engines as scheduler handlers.

use chrono::Datelike;
use sim_core::{CountryState, Notification, SimError};
use sim_military::{operations, procurement, units};

use crate::scheduler::{TickContext, TickHandler};

/// Writes the new day into the snapshot.
pub struct DateSync;

impl TickHandler for DateSync {
    fn name(&self) -> &'static str {
        "date_sync"
    }

    fn run(&mut self, state: &mut CountryState, ctx: &mut TickContext<'_>) -> Result<Vec<Notification>, SimError> {
        state.meta.current_date = ctx.date;
        state.meta.elapsed_days = ctx.elapsed_days;
        Ok(vec![Notification::DayAdvanced {
            date: ctx.date,
            elapsed_days: ctx.elapsed_days,
        }])
    }
}

/// Unit movement and operation progress in hourly sub-steps.
pub struct MilitaryHours;

impl TickHandler for MilitaryHours {
    fn name(&self) -> &'static str {
        "military_hours"
    }

    fn run(&mut self, state: &mut CountryState, ctx: &mut TickContext<'_>) -> Result<Vec<Notification>, SimError> {
        let steps = ctx.inputs.config.operation_substeps_per_day.max(1);
        let hours = 24.0 / f64::from(steps);
        let mut out = Vec::new();
        for _ in 0..steps {
            out.extend(units::advance_movements(state, hours));
            out.extend(operations::advance(state, &mut *ctx.rng, hours));
        }
        Ok(out)
    }
}

pub struct Economy;

impl TickHandler for Economy {
    fn name(&self) -> &'static str {
        "economy"
    }

    fn run(&mut self, state: &mut CountryState, ctx: &mut TickContext<'_>) -> Result<Vec<Notification>, SimError> {
        sim_econ::monthly_update(state, ctx.inputs.config.baseline_gdp_billions)?;
        Ok(Vec::new())
    }
}

pub struct Events;

impl TickHandler for Events {
    fn name(&self) -> &'static str {
        "events"
    }

    fn run(&mut self, state: &mut CountryState, ctx: &mut TickContext<'_>) -> Result<Vec<Notification>, SimError> {
        sim_events::monthly_update(
            state,
            ctx.inputs.events,
            &mut *ctx.rng,
            ctx.inputs.config.default_retrigger,
        )
    }
}

/// Sector and infrastructure projects.
pub struct Projects;

impl TickHandler for Projects {
    fn name(&self) -> &'static str {
        "projects"
    }

    fn run(&mut self, state: &mut CountryState, _ctx: &mut TickContext<'_>) -> Result<Vec<Notification>, SimError> {
        sim_econ::advance_projects(state)
    }
}

pub struct Demographics;

impl TickHandler for Demographics {
    fn name(&self) -> &'static str {
        "demographics"
    }

    fn run(&mut self, state: &mut CountryState, _ctx: &mut TickContext<'_>) -> Result<Vec<Notification>, SimError> {
        let (_, notes) = sim_econ::demographics::yearly_update(state);
        Ok(notes)
    }
}

/// Weapon deliveries due this year.
pub struct Deliveries;

impl TickHandler for Deliveries {
    fn name(&self) -> &'static str {
        "deliveries"
    }

    fn run(&mut self, state: &mut CountryState, ctx: &mut TickContext<'_>) -> Result<Vec<Notification>, SimError> {
        Ok(procurement::process_deliveries(state, ctx.date.year()))
    }
}
