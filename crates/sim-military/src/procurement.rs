//! Weapon purchases, yearly deliveries, cancellations and sales.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_core::commitments::ProcurementOrder;
use sim_core::constraints::Constraint;
use sim_core::state::InventoryItem;
use sim_core::{
    check_all, ActionError, Catalogs, Commitment, CommitmentId, CommitmentKind, ConstraintResult,
    CountryState, Notification, WeaponDefinition,
};
use tracing::{info, instrument, warn};

/// Share of the undelivered value returned on cancellation.
const CANCEL_REFUND_SHARE: f64 = 0.5;
const CANCEL_RELATIONS_PENALTY: f64 = -5.0;
/// Resale value as a share of the unit cost.
const RESALE_SHARE: Decimal = Decimal::from_parts(7, 0, 0, false, 1);
const SALE_RELATIONS_BONUS: f64 = 3.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EligibilityReport {
    pub weapon_id: String,
    pub model: String,
    pub quantity: u32,
    pub total_cost_billions: f64,
    pub manufacturer: String,
    pub constraints: Vec<ConstraintResult>,
    pub buyer_allowed: bool,
    pub eligible: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub id: CommitmentId,
    pub total_cost_billions: f64,
    pub delivery_start_year: i32,
    pub per_year_rate: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub id: CommitmentId,
    pub refund_billions: f64,
    pub relations_delta: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub model: String,
    pub quantity: u32,
    pub buyer: String,
    pub revenue_billions: f64,
    pub relations_delta: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub id: CommitmentId,
    pub model: String,
    pub quantity: u32,
    pub delivered: u32,
    pub remaining: u32,
    pub total_cost_billions: f64,
    pub manufacturer: String,
    pub delivery_start_year: i32,
}

fn to_billions(millions: Decimal) -> Result<f64, ActionError> {
    (millions / Decimal::from(1000))
        .to_f64()
        .ok_or_else(|| ActionError::InvalidState(format!("cost {millions}M is not representable")))
}

fn order_cost(def: &WeaponDefinition, quantity: u32) -> Result<f64, ActionError> {
    def.unit_cost_millions
        .checked_mul(Decimal::from(quantity))
        .ok_or_else(|| ActionError::Rejected("order value overflows".into()))
        .and_then(to_billions)
}

fn purchase_constraints(def: &WeaponDefinition, total_cost_billions: f64) -> Vec<Constraint> {
    let mut out = vec![
        Constraint::Budget {
            category: "procurement".into(),
            amount_billions: total_cost_billions,
        },
        Constraint::Relations {
            country: def.manufacturer.clone(),
            min_score: def.prerequisites.min_relations,
        },
    ];
    if !def.prerequisites.not_operating.is_empty() {
        out.push(Constraint::Exclusion { forbidden: def.prerequisites.not_operating.clone() });
    }
    out
}

fn buyer_allowed(state: &CountryState, def: &WeaponDefinition) -> bool {
    match &def.prerequisites.allowed_buyers {
        Some(list) => list.iter().any(|c| c == &state.meta.country_code),
        None => true,
    }
}

fn resolve<'a>(catalogs: &'a Catalogs, weapon_id: &str) -> Result<&'a WeaponDefinition, ActionError> {
    catalogs.weapons.get(weapon_id).ok_or_else(|| ActionError::unknown("weapon", weapon_id))
}

/// Catalog entries, optionally restricted to one category.
pub fn catalog<'a>(catalogs: &'a Catalogs, category: Option<&'a str>) -> Vec<(&'a String, &'a WeaponDefinition)> {
    match category {
        Some(c) => catalogs.weapons_in_category(c).collect(),
        None => catalogs.weapons.iter().collect(),
    }
}

/// Run every purchase check without touching the state.
pub fn check_eligibility(
    state: &CountryState,
    catalogs: &Catalogs,
    weapon_id: &str,
    quantity: u32,
) -> Result<EligibilityReport, ActionError> {
    let def = resolve(catalogs, weapon_id)?;
    let total_cost_billions = order_cost(def, quantity)?;
    let (ok, constraints) = check_all(state, &purchase_constraints(def, total_cost_billions));
    let allowed = buyer_allowed(state, def);
    Ok(EligibilityReport {
        weapon_id: weapon_id.to_string(),
        model: def.name.clone(),
        quantity,
        total_cost_billions,
        manufacturer: def.manufacturer.clone(),
        constraints,
        buyer_allowed: allowed,
        eligible: ok && allowed,
    })
}

/// Place a weapon order. The procurement budget is charged immediately.
#[instrument(level = "debug", skip(state, catalogs), fields(country = %state.meta.country_code))]
pub fn order(
    state: &mut CountryState,
    catalogs: &Catalogs,
    weapon_id: &str,
    quantity: u32,
) -> Result<OrderPlaced, ActionError> {
    let def = resolve(catalogs, weapon_id)?;
    if quantity == 0 {
        return Err(ActionError::Rejected("quantity must be at least 1".into()));
    }
    let total_cost_billions = order_cost(def, quantity)?;
    let (ok, results) = check_all(state, &purchase_constraints(def, total_cost_billions));
    if !ok {
        warn!(weapon_id, quantity, "purchase rejected by constraints");
        return Err(ActionError::ConstraintsNotMet(
            results.into_iter().filter(|r| !r.satisfied).collect(),
        ));
    }
    if !buyer_allowed(state, def) {
        warn!(weapon_id, "buyer not on the approved list");
        return Err(ActionError::Rejected(format!(
            "{} is not an approved buyer of {}",
            state.meta.country_code, def.name
        )));
    }

    let mean_years = def.delivery.mean_years();
    let year = state.year();
    let delivery_start_year = year + mean_years as i32;
    let per_year_rate = (quantity / mean_years).max(1);
    let id = CommitmentId(state.mint_id("order"));
    state.commitments.push(Commitment {
        id: id.clone(),
        started_on: state.meta.current_date,
        kind: CommitmentKind::ProcurementOrder(ProcurementOrder {
            weapon_id: weapon_id.to_string(),
            model: def.name.clone(),
            manufacturer: def.manufacturer.clone(),
            category: def.category.clone(),
            subcategory: def.subcategory.clone(),
            quantity,
            delivered: 0,
            unit_cost_millions: def.unit_cost_millions,
            total_cost_billions,
            order_year: year,
            delivery_start_year,
            per_year_rate,
        }),
    });
    if let Some(defense) = state.budget.allocation.get_mut("defense") {
        let pool = defense.breakdown.entry("procurement".into()).or_insert(0.0);
        *pool = (*pool - total_cost_billions).max(0.0);
    }
    info!(%id, weapon_id, quantity, total_cost_billions, delivery_start_year, "weapon order placed");
    Ok(OrderPlaced { id, total_cost_billions, delivery_start_year, per_year_rate })
}

fn add_to_inventory(state: &mut CountryState, order: &ProcurementOrder, quantity: u32) {
    if let Some(item) = state.inventory.iter_mut().find(|i| i.model == order.model) {
        let old = item.quantity;
        item.quantity += quantity;
        // New equipment arrives at age zero.
        item.avg_age_years = item.avg_age_years * old as f64 / item.quantity as f64;
        if item.weapon_id.is_none() {
            item.weapon_id = Some(order.weapon_id.clone());
        }
        return;
    }
    state.inventory.push(InventoryItem {
        model: order.model.clone(),
        weapon_id: Some(order.weapon_id.clone()),
        category: order.category.clone(),
        subcategory: order.subcategory.clone(),
        quantity,
        source_country: Some(order.manufacturer.clone()),
        unit_cost_millions: order.unit_cost_millions,
        avg_age_years: 0.0,
    });
}

/// Deliver this year's batch of every order whose start year has come.
/// Completed orders leave the ledger.
#[instrument(level = "debug", skip(state), fields(country = %state.meta.country_code))]
pub fn process_deliveries(state: &mut CountryState, year: i32) -> Vec<Notification> {
    let mut batches = Vec::new();
    for c in state.commitments.iter_mut() {
        let CommitmentKind::ProcurementOrder(order) = &mut c.kind else {
            continue;
        };
        if year < order.delivery_start_year {
            continue;
        }
        let batch = order.per_year_rate.min(order.undelivered());
        if batch == 0 {
            continue;
        }
        order.delivered += batch;
        batches.push((c.id.clone(), order.clone(), batch));
    }

    let mut out = Vec::new();
    for (id, order, batch) in batches {
        add_to_inventory(state, &order, batch);
        info!(%id, model = %order.model, batch, remaining = order.undelivered(), "delivery arrived");
        out.push(Notification::DeliveryArrived {
            order_id: id.clone(),
            model: order.model.clone(),
            quantity: batch,
            remaining: order.undelivered(),
        });
        if order.is_complete() {
            state.take_commitment(&id);
            out.push(Notification::OrderCompleted { order_id: id, model: order.model });
        }
    }
    out
}

/// Cancel an order. Half of the undelivered value returns to the
/// procurement pool and the manufacturer is displeased.
pub fn cancel_order(state: &mut CountryState, id: &CommitmentId) -> Result<OrderCancelled, ActionError> {
    let Some(CommitmentKind::ProcurementOrder(order)) = state.commitment(id).map(|c| &c.kind) else {
        return Err(ActionError::unknown("order", id.0.clone()));
    };
    let undelivered_share = order.undelivered() as f64 / order.quantity.max(1) as f64;
    let refund = order.total_cost_billions * CANCEL_REFUND_SHARE * undelivered_share;
    let manufacturer = order.manufacturer.clone();

    state.take_commitment(id);
    if let Some(defense) = state.budget.allocation.get_mut("defense") {
        *defense.breakdown.entry("procurement".into()).or_insert(0.0) += refund;
    }
    state.adjust_relation(&manufacturer, CANCEL_RELATIONS_PENALTY);
    info!(%id, refund, "order cancelled");
    Ok(OrderCancelled {
        id: id.clone(),
        refund_billions: refund,
        relations_delta: CANCEL_RELATIONS_PENALTY,
    })
}

/// Sell equipment from the inventory to another country.
pub fn sell(
    state: &mut CountryState,
    model: &str,
    quantity: u32,
    buyer: &str,
) -> Result<Sale, ActionError> {
    let Some(pos) = state.inventory.iter().position(|i| i.model == model) else {
        return Err(ActionError::unknown("inventory model", model));
    };
    if quantity == 0 {
        return Err(ActionError::Rejected("quantity must be at least 1".into()));
    }
    let have = state.inventory[pos].quantity;
    if have < quantity {
        return Err(ActionError::Rejected(format!(
            "not enough {model}: have {have}, want to sell {quantity}"
        )));
    }
    let score = state.relations.get(buyer).map_or(0.0, |r| r.score);
    if score < 0.0 {
        return Err(ActionError::Rejected(format!("cannot sell to hostile {buyer} ({score})")));
    }
    let value = state.inventory[pos].unit_cost_millions * RESALE_SHARE * Decimal::from(quantity);
    let revenue_billions = to_billions(value)?;

    state.inventory[pos].quantity -= quantity;
    if state.inventory[pos].quantity == 0 {
        state.inventory.remove(pos);
    }
    state.budget.total_revenue_billions += revenue_billions;
    state.adjust_relation(buyer, SALE_RELATIONS_BONUS);
    info!(model, quantity, buyer, revenue_billions, "equipment sold");
    Ok(Sale {
        model: model.to_string(),
        quantity,
        buyer: buyer.to_string(),
        revenue_billions,
        relations_delta: SALE_RELATIONS_BONUS,
    })
}

pub fn active_orders(state: &CountryState) -> Vec<OrderSummary> {
    state
        .commitments
        .iter()
        .filter_map(|c| match &c.kind {
            CommitmentKind::ProcurementOrder(o) => Some(OrderSummary {
                id: c.id.clone(),
                model: o.model.clone(),
                quantity: o.quantity,
                delivered: o.delivered,
                remaining: o.undelivered(),
                total_cost_billions: o.total_cost_billions,
                manufacturer: o.manufacturer.clone(),
                delivery_start_year: o.delivery_start_year,
            }),
            _ => None,
        })
        .collect()
}
