//! Sector investment and infrastructure construction.
//!
//! Both create quarterly commitments on the country's ledger. Sector
//! projects raise a sector's level when they complete; infrastructure
//! projects add their catalog deltas through the path resolver.

use serde::{Deserialize, Serialize};
use sim_core::commitments::{InfrastructureProject, SectorProject};
use sim_core::constraints::Constraint;
use sim_core::path::apply_deltas;
use sim_core::{
    check_all, ActionError, Catalogs, Commitment, CommitmentId, CommitmentKind, CountryState,
    Notification, SimError,
};
use tracing::{info, instrument, warn};

/// Quarters a project takes when funded at 10% of the sector's output.
pub const BASE_QUARTERS: f64 = 4.0;
pub const MIN_QUARTERS: u32 = 2;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectStarted {
    pub id: CommitmentId,
    pub duration_quarters: u32,
    pub cost_billions: f64,
}

/// Progress of one in-flight project.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: CommitmentId,
    pub kind: String,
    pub target: String,
    pub total_quarters: u32,
    pub remaining_quarters: u32,
    pub progress_percent: f64,
}

/// Quarters a sector investment takes.
pub fn sector_duration(amount: f64, gdp_contribution: f64) -> u32 {
    let reference = (gdp_contribution * 0.1).max(f64::EPSILON);
    let efficiency = (amount / reference).max(f64::EPSILON);
    ((BASE_QUARTERS / efficiency).round().min(u32::MAX as f64) as u32).max(MIN_QUARTERS)
}

/// Development spending comes out of the infrastructure allocation; callers
/// have already checked it can cover `amount`.
fn deduct_development(state: &mut CountryState, amount: f64) {
    if let Some(infra) = state.budget.allocation.get_mut("infrastructure") {
        infra.amount_billions = (infra.amount_billions - amount).max(0.0);
    }
}

/// Start a sector development project.
pub fn invest(
    state: &mut CountryState,
    sector_name: &str,
    amount_billions: f64,
    target_gain: f64,
) -> Result<ProjectStarted, ActionError> {
    let Some(sector) = state.sectors.get(sector_name) else {
        return Err(ActionError::unknown("sector", sector_name));
    };
    if !(amount_billions.is_finite() && amount_billions > 0.0) {
        return Err(ActionError::Rejected("investment must be positive".into()));
    }
    if !(target_gain.is_finite() && target_gain > 0.0) {
        return Err(ActionError::Rejected("target gain must be positive".into()));
    }
    if sector.level >= 100.0 {
        return Err(ActionError::Rejected(format!("{sector_name} is already at maximum level")));
    }
    let mut constraints = vec![Constraint::Budget {
        category: "development".into(),
        amount_billions,
    }];
    if !sector.workforce_required.is_empty() {
        constraints.push(Constraint::Workforce { requirements: sector.workforce_required.clone() });
    }
    if !sector.infrastructure_required.is_empty() {
        constraints.push(Constraint::Infrastructure {
            requirements: sector.infrastructure_required.clone(),
        });
    }
    let (ok, results) = check_all(state, &constraints);
    if !ok {
        warn!(sector = sector_name, "investment rejected by constraints");
        return Err(ActionError::ConstraintsNotMet(
            results.into_iter().filter(|r| !r.satisfied).collect(),
        ));
    }
    let quarters = sector_duration(amount_billions, sector.gdp_contribution_billions);
    let gain = target_gain.min(100.0 - sector.level);

    let id = CommitmentId(state.mint_id("sector"));
    state.commitments.push(Commitment {
        id: id.clone(),
        started_on: state.meta.current_date,
        kind: CommitmentKind::SectorProject(SectorProject {
            sector: sector_name.to_string(),
            amount_billions,
            target_gain: gain,
            total_quarters: quarters,
            remaining_quarters: quarters,
        }),
    });
    deduct_development(state, amount_billions);
    if let Some(sector) = state.sectors.get_mut(sector_name) {
        sector.recent_investment_billions += amount_billions;
    }
    info!(%id, sector = sector_name, amount_billions, quarters, "sector project started");
    Ok(ProjectStarted { id, duration_quarters: quarters, cost_billions: amount_billions })
}

/// Start an infrastructure project from the catalog.
pub fn start_infrastructure_project(
    state: &mut CountryState,
    catalogs: &Catalogs,
    project_type: &str,
    custom_name: Option<&str>,
) -> Result<ProjectStarted, ActionError> {
    let Some(def) = catalogs.infrastructure_projects.get(project_type) else {
        return Err(ActionError::unknown("infrastructure project", project_type));
    };
    let budget = Constraint::Budget {
        category: "infrastructure".into(),
        amount_billions: def.cost_billions,
    };
    let (ok, results) = check_all(state, std::slice::from_ref(&budget));
    if !ok {
        return Err(ActionError::ConstraintsNotMet(results));
    }
    let quarters = def.duration_quarters.max(1);
    let id = CommitmentId(state.mint_id("infra"));
    state.commitments.push(Commitment {
        id: id.clone(),
        started_on: state.meta.current_date,
        kind: CommitmentKind::InfrastructureProject(InfrastructureProject {
            project_type: project_type.to_string(),
            name: custom_name.unwrap_or(&def.name).to_string(),
            cost_billions: def.cost_billions,
            total_quarters: quarters,
            remaining_quarters: quarters,
            effects: def.effects.clone(),
        }),
    });
    deduct_development(state, def.cost_billions);
    info!(%id, project_type, quarters, "infrastructure project started");
    Ok(ProjectStarted { id, duration_quarters: quarters, cost_billions: def.cost_billions })
}

/// Cancel a sector or infrastructure project. Spent money is not refunded.
pub fn cancel_project(state: &mut CountryState, id: &CommitmentId) -> Result<Commitment, ActionError> {
    match state.commitment(id).map(|c| &c.kind) {
        Some(CommitmentKind::SectorProject(_)) | Some(CommitmentKind::InfrastructureProject(_)) => {}
        Some(_) | None => return Err(ActionError::unknown("project", id.0.clone())),
    }
    let removed = state
        .take_commitment(id)
        .ok_or_else(|| ActionError::unknown("project", id.0.clone()))?;
    info!(%id, "project cancelled");
    Ok(removed)
}

pub fn active_projects(state: &CountryState) -> Vec<ProjectSummary> {
    state
        .commitments
        .iter()
        .filter_map(|c| {
            let (kind, target, total, remaining) = match &c.kind {
                CommitmentKind::SectorProject(p) => {
                    ("sector", p.sector.clone(), p.total_quarters, p.remaining_quarters)
                }
                CommitmentKind::InfrastructureProject(p) => {
                    ("infrastructure", p.name.clone(), p.total_quarters, p.remaining_quarters)
                }
                _ => return None,
            };
            let done = total.saturating_sub(remaining) as f64;
            Some(ProjectSummary {
                id: c.id.clone(),
                kind: kind.to_string(),
                target,
                total_quarters: total,
                remaining_quarters: remaining,
                progress_percent: if total > 0 { done / total as f64 * 100.0 } else { 100.0 },
            })
        })
        .collect()
}

fn complete_sector(state: &mut CountryState, p: &SectorProject) {
    let Some(sector) = state.sectors.get_mut(&p.sector) else {
        warn!(sector = %p.sector, "completed project targets a removed sector");
        return;
    };
    sector.level = (sector.level + p.target_gain).min(100.0);
    sector.gdp_contribution_billions *= 1.0 + p.target_gain * 0.02;
    sector.employment = (sector.employment as f64 * (1.0 + p.target_gain * 0.01)) as u64;
}

/// Quarterly step: advance every project by one quarter and complete the
/// ones that reach zero.
#[instrument(level = "debug", skip_all, fields(country = %state.meta.country_code))]
pub fn advance_projects(state: &mut CountryState) -> Result<Vec<Notification>, SimError> {
    let mut finished = Vec::new();
    for c in state.commitments.iter_mut() {
        let remaining = match &mut c.kind {
            CommitmentKind::SectorProject(p) => &mut p.remaining_quarters,
            CommitmentKind::InfrastructureProject(p) => &mut p.remaining_quarters,
            _ => continue,
        };
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            finished.push(c.id.clone());
        }
    }
    let mut out = Vec::new();
    for id in finished {
        let Some(done) = state.take_commitment(&id) else { continue };
        let target = match &done.kind {
            CommitmentKind::SectorProject(p) => {
                complete_sector(state, p);
                p.sector.clone()
            }
            CommitmentKind::InfrastructureProject(p) => {
                apply_deltas(state, &p.effects)?;
                p.name.clone()
            }
            _ => continue,
        };
        info!(%id, %target, "project completed");
        out.push(Notification::ProjectCompleted { project_id: id, target });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_core::testing::{sample_catalogs, sample_country};
    use sim_core::ConstraintKind;

    #[test]
    fn duration_scales_with_funding() {
        // Funding at 10% of output takes the base four quarters.
        assert_eq!(sector_duration(18.0, 180.0), 4);
        assert_eq!(sector_duration(36.0, 180.0), 2);
        assert_eq!(sector_duration(4.5, 180.0), 16);
        assert_eq!(sector_duration(1.0, 0.0), 2);
    }

    #[test]
    fn invest_enqueues_and_completes() {
        let mut state = sample_country();
        let infra_before = state.budget.allocation["infrastructure"].amount_billions;
        let started = invest(&mut state, "technology", 9.0, 5.0).unwrap();
        assert_eq!(started.duration_quarters, 8);
        assert_eq!(state.commitments.len(), 1);
        assert!((state.budget.allocation["infrastructure"].amount_billions - (infra_before - 9.0)).abs() < 1e-9);
        for _ in 0..7 {
            assert!(advance_projects(&mut state).unwrap().is_empty());
        }
        let done = advance_projects(&mut state).unwrap();
        assert_eq!(done.len(), 1);
        assert!(state.commitments.is_empty());
        assert_eq!(state.sectors["technology"].level, 65.0);
        assert!((state.sectors["technology"].gdp_contribution_billions - 180.0 * 1.1).abs() < 1e-9);
    }

    #[test]
    fn level_is_capped_at_100() {
        let mut state = sample_country();
        state.sectors.get_mut("technology").unwrap().level = 98.0;
        invest(&mut state, "technology", 20.0, 5.0).unwrap();
        for _ in 0..4 {
            advance_projects(&mut state).unwrap();
        }
        assert_eq!(state.sectors["technology"].level, 100.0);
    }

    #[test]
    fn invest_reports_all_unmet_constraints() {
        let mut state = sample_country();
        state.workforce.expertise_pools.get_mut("software_engineers").unwrap().employed = 400_000;
        state.infrastructure.get_mut("digital").unwrap().insert("internet_penetration".into(), 10.0);
        let before = state.clone();
        let err = invest(&mut state, "technology", 1000.0, 5.0).unwrap_err();
        let kinds: Vec<ConstraintKind> = err.breakdown().iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![ConstraintKind::Budget, ConstraintKind::Workforce, ConstraintKind::Infrastructure]);
        assert_eq!(state, before);
    }

    #[test]
    fn unknown_sector_is_structured_error() {
        let mut state = sample_country();
        assert!(matches!(invest(&mut state, "space", 1.0, 1.0), Err(ActionError::Unknown { .. })));
    }

    #[test]
    fn infrastructure_project_applies_effects() {
        let mut state = sample_country();
        let catalogs = sample_catalogs();
        let started = start_infrastructure_project(&mut state, &catalogs, "hospital", Some("North Clinic")).unwrap();
        assert_eq!(started.duration_quarters, 4);
        let summary = active_projects(&state);
        assert_eq!(summary[0].target, "North Clinic");
        assert_eq!(summary[0].progress_percent, 0.0);
        for _ in 0..4 {
            advance_projects(&mut state).unwrap();
        }
        assert!((state.infrastructure["health"]["hospital_beds_per_1000"] - 4.6).abs() < 1e-9);
    }

    #[test]
    fn infrastructure_cost_comes_out_of_the_allocation() {
        let mut state = sample_country();
        let catalogs = sample_catalogs();
        state.budget.allocation.get_mut("infrastructure").unwrap().amount_billions = 6.0;
        let exp = state.budget.total_expenditure_billions;
        start_infrastructure_project(&mut state, &catalogs, "power_plant", None).unwrap();
        assert_eq!(state.budget.allocation["infrastructure"].amount_billions, 1.0);
        assert_eq!(state.budget.total_expenditure_billions, exp);
        assert!(start_infrastructure_project(&mut state, &catalogs, "power_plant", None).is_err());
    }

    #[test]
    fn cancel_removes_without_refund() {
        let mut state = sample_country();
        let started = invest(&mut state, "energy", 5.0, 3.0).unwrap();
        let infra = state.budget.allocation["infrastructure"].amount_billions;
        cancel_project(&mut state, &started.id).unwrap();
        assert!(state.commitments.is_empty());
        assert_eq!(state.budget.allocation["infrastructure"].amount_billions, infra);
        assert!(cancel_project(&mut state, &started.id).is_err());
    }
}
