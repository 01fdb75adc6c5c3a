//! Monthly event rolls, active event bookkeeping and player responses.

use rand::Rng;
use serde::{Deserialize, Serialize};
use sim_core::path::{apply_deltas, StateView};
use sim_core::state::ActiveEvent;
use sim_core::{ActionError, CountryState, Notification, RetriggerPolicy, SimError};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

use crate::catalog::{EventCatalog, EventDefinition};

/// Monthly trigger probability in [0,1].
pub fn probability(def: &EventDefinition, view: &StateView) -> f64 {
    let mut p = def.base_annual_probability / 12.0;
    for m in def.triggers.iter().filter(|m| m.condition.evaluate(view)) {
        p += m.delta;
    }
    for m in def.preventions.iter().filter(|m| m.condition.evaluate(view)) {
        p -= m.delta;
    }
    if p.is_nan() {
        return 0.0;
    }
    p.clamp(0.0, 1.0)
}

fn is_active(state: &CountryState, id: &str) -> bool {
    state.active_events.iter().any(|e| e.definition_id == id)
}

/// True when `def` may not fire because an instance is still running.
pub fn is_blocked(state: &CountryState, def: &EventDefinition, default_policy: RetriggerPolicy) -> bool {
    def.retrigger.unwrap_or(default_policy) == RetriggerPolicy::Block && is_active(state, &def.id)
}

/// Apply the event's effects once and record it if it lasts.
fn instantiate(state: &mut CountryState, def: &EventDefinition) -> Result<Notification, SimError> {
    apply_deltas(state, &def.effects)?;
    let instance_id = state.mint_id("event");
    if def.duration_months > 0 {
        state.active_events.push(ActiveEvent {
            instance_id: instance_id.clone(),
            definition_id: def.id.clone(),
            name: def.name.clone(),
            category: def.category.clone(),
            severity: def.severity,
            effects: def.effects.clone(),
            duration_months: def.duration_months,
            months_remaining: def.duration_months,
            triggered_on: state.meta.current_date,
            responses: def.responses.keys().cloned().collect(),
            response_given: None,
        });
    }
    info!(event = %def.id, instance = %instance_id, "event triggered");
    Ok(Notification::EventTriggered {
        instance_id,
        definition_id: def.id.clone(),
        name: def.name.clone(),
        severity: def.severity,
    })
}

/// Count active events down by one month and drop the expired ones.
pub fn process_active_events(state: &mut CountryState) -> Vec<Notification> {
    let mut out = Vec::new();
    state.active_events.retain_mut(|e| {
        e.months_remaining = e.months_remaining.saturating_sub(1);
        if e.months_remaining == 0 {
            info!(instance = %e.instance_id, "event expired");
            out.push(Notification::EventExpired {
                instance_id: e.instance_id.clone(),
                name: e.name.clone(),
            });
            false
        } else {
            true
        }
    });
    out
}

/// The monthly event step: age active events, then roll every definition
/// against one view of the pre-roll state.
#[instrument(level = "debug", skip_all, fields(country = %state.meta.country_code))]
pub fn monthly_update<R: Rng + ?Sized>(
    state: &mut CountryState,
    catalog: &EventCatalog,
    rng: &mut R,
    default_policy: RetriggerPolicy,
) -> Result<Vec<Notification>, SimError> {
    let mut out = process_active_events(state);
    let view = StateView::capture(state)?;
    let mut fired = Vec::new();
    for def in catalog.definitions.values() {
        if is_blocked(state, def, default_policy) {
            continue;
        }
        let p = probability(def, &view);
        let roll: f64 = rng.gen();
        debug!(event = %def.id, p, roll, "event roll");
        if roll < p {
            fired.push(def);
        }
    }
    for def in fired {
        out.push(instantiate(state, def)?);
    }
    Ok(out)
}

/// Fire an event regardless of probability and re-trigger policy.
pub fn force_event(
    state: &mut CountryState,
    catalog: &EventCatalog,
    id: &str,
) -> Result<Notification, ActionError> {
    let def = catalog.get(id).ok_or_else(|| ActionError::unknown("event", id))?;
    instantiate(state, def).map_err(|e| ActionError::InvalidState(e.to_string()))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseApplied {
    pub instance_id: String,
    pub response: String,
    pub effects: BTreeMap<String, f64>,
}

/// Apply a player's response to an active event. Each event takes one response.
pub fn respond(
    state: &mut CountryState,
    catalog: &EventCatalog,
    instance_id: &str,
    response: &str,
) -> Result<ResponseApplied, ActionError> {
    let Some(event) = state.active_events.iter().find(|e| e.instance_id == instance_id) else {
        return Err(ActionError::unknown("event instance", instance_id));
    };
    if let Some(given) = &event.response_given {
        return Err(ActionError::Rejected(format!("already answered with '{given}'")));
    }
    let def = catalog
        .get(&event.definition_id)
        .ok_or_else(|| ActionError::unknown("event", event.definition_id.clone()))?;
    let Some(choice) = def.responses.get(response) else {
        warn!(instance_id, response, "unknown event response");
        let options: Vec<&str> = def.responses.keys().map(String::as_str).collect();
        return Err(ActionError::Rejected(format!(
            "invalid response '{response}', expected one of: {}",
            options.join(", ")
        )));
    };
    apply_deltas(state, &choice.effects).map_err(|e| ActionError::InvalidState(e.to_string()))?;
    if let Some(e) = state.active_events.iter_mut().find(|e| e.instance_id == instance_id) {
        e.response_given = Some(response.to_string());
    }
    info!(instance_id, response, "event response applied");
    Ok(ResponseApplied {
        instance_id: instance_id.to_string(),
        response: response.to_string(),
        effects: choice.effects.clone(),
    })
}
