//! Dot-path access over the nested country state.
//!
//! Paths such as `economy.debt.debt_to_gdp_percent` address fields of the
//! JSON view of a [`CountryState`]. Reads go through a [`StateView`]
//! captured once per evaluation pass; writes go through [`apply_deltas`],
//! which edits the JSON view and deserializes it back so the typed snapshot
//! is only replaced when every delta applied cleanly.

use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use tracing::warn;

use crate::state::CountryState;
use crate::SimError;

/// Resolve `path` inside `root`. Numeric segments index into arrays.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = root;
    for seg in path.split('.') {
        cur = match cur {
            Value::Object(map) => map.get(seg)?,
            Value::Array(items) => items.get(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(cur)
}

/// Numeric value at `path`; booleans read as 0/1.
pub fn lookup_f64(root: &Value, path: &str) -> Option<f64> {
    match lookup(root, path)? {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Add `delta` to the number at `path`, creating missing objects and the
/// leaf on the way. Integer leaves stay integers; unsigned leaves floor at 0.
///
/// Returns `Ok(true)` when the leaf did not exist before.
pub fn add_delta(root: &mut Value, path: &str, delta: f64) -> Result<bool, SimError> {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((leaf, parents)) = segments.split_last() else {
        return Err(path_err(path, "empty path"));
    };
    if leaf.is_empty() {
        return Err(path_err(path, "empty segment"));
    }
    let mut cur = root;
    for seg in parents {
        let map = cur
            .as_object_mut()
            .ok_or_else(|| path_err(path, "intermediate value is not an object"))?;
        cur = map
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    let map = cur
        .as_object_mut()
        .ok_or_else(|| path_err(path, "parent is not an object"))?;
    match map.get_mut(*leaf) {
        None => {
            map.insert(leaf.to_string(), float(path, delta)?);
            Ok(true)
        }
        Some(slot) => {
            *slot = shifted(path, slot, delta)?;
            Ok(false)
        }
    }
}

fn shifted(path: &str, slot: &Value, delta: f64) -> Result<Value, SimError> {
    let Value::Number(n) = slot else {
        return Err(path_err(path, "target is not numeric"));
    };
    if n.is_u64() {
        let next = (n.as_f64().unwrap_or(0.0) + delta).round().max(0.0);
        return Ok(Value::Number(Number::from(next as u64)));
    }
    if n.is_i64() {
        let next = (n.as_f64().unwrap_or(0.0) + delta).round();
        return Ok(Value::Number(Number::from(next as i64)));
    }
    float(path, n.as_f64().unwrap_or(0.0) + delta)
}

fn float(path: &str, v: f64) -> Result<Value, SimError> {
    Number::from_f64(v)
        .map(Value::Number)
        .ok_or_else(|| SimError::NonFinite(path.to_string()))
}

fn path_err(path: &str, reason: &str) -> SimError {
    SimError::Path {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

/// Read-only JSON view of a snapshot.
#[derive(Clone, Debug)]
pub struct StateView {
    root: Value,
}

impl StateView {
    pub fn capture(state: &CountryState) -> Result<Self, SimError> {
        let root = serde_json::to_value(state).map_err(|e| SimError::Serde(e.to_string()))?;
        Ok(Self { root })
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.root, path)
    }

    pub fn number(&self, path: &str) -> Option<f64> {
        lookup_f64(&self.root, path)
    }

    /// Numeric value with missing paths read as 0.
    pub fn number_or_zero(&self, path: &str) -> f64 {
        self.number(path).unwrap_or(0.0)
    }
}

/// Apply additive deltas to `state` by dot-path.
///
/// All deltas are applied to a working copy; `state` is replaced only when
/// the result deserializes back into a valid snapshot. Scores are clamped
/// afterwards. Returns the paths that had to be created.
pub fn apply_deltas(
    state: &mut CountryState,
    deltas: &BTreeMap<String, f64>,
) -> Result<Vec<String>, SimError> {
    if deltas.is_empty() {
        return Ok(Vec::new());
    }
    let mut root = serde_json::to_value(&*state).map_err(|e| SimError::Serde(e.to_string()))?;
    let mut created = Vec::new();
    for (path, delta) in deltas {
        if add_delta(&mut root, path, *delta)? {
            warn!(path = %path, "effect created a missing state path");
            created.push(path.clone());
        }
    }
    let mut next: CountryState =
        serde_json::from_value(root).map_err(|e| SimError::Serde(e.to_string()))?;
    next.normalize();
    *state = next;
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_country;
    use serde_json::json;

    #[test]
    fn lookup_walks_objects_and_arrays() {
        let v = json!({"a": {"b": [1, {"c": 2.5}]}});
        assert_eq!(lookup_f64(&v, "a.b.0"), Some(1.0));
        assert_eq!(lookup_f64(&v, "a.b.1.c"), Some(2.5));
        assert!(lookup(&v, "a.x").is_none());
        assert!(lookup(&v, "a.b.9").is_none());
    }

    #[test]
    fn add_delta_creates_intermediate_objects() {
        let mut v = json!({"a": {}});
        assert!(add_delta(&mut v, "a.b.c", 3.0).unwrap());
        assert_eq!(lookup_f64(&v, "a.b.c"), Some(3.0));
        assert!(!add_delta(&mut v, "a.b.c", -1.0).unwrap());
        assert_eq!(lookup_f64(&v, "a.b.c"), Some(2.0));
    }

    #[test]
    fn unsigned_leaves_stay_non_negative_integers() {
        let mut v = json!({"n": 5u64});
        add_delta(&mut v, "n", -7.4).unwrap();
        assert_eq!(v["n"], json!(0u64));
        add_delta(&mut v, "n", 2.6).unwrap();
        assert_eq!(v["n"], json!(3u64));
    }

    #[test]
    fn delta_into_scalar_is_an_error() {
        let mut v = json!({"a": 1.0});
        assert!(add_delta(&mut v, "a.b", 1.0).is_err());
        let mut s = json!({"a": "text"});
        assert!(add_delta(&mut s, "a", 1.0).is_err());
    }

    #[test]
    fn apply_deltas_clamps_and_reports_created_paths() {
        let mut state = sample_country();
        let mut deltas = BTreeMap::new();
        deltas.insert("indices.happiness".to_string(), 500.0);
        deltas.insert("indices.war_weariness".to_string(), 4.0);
        deltas.insert("economy.inflation_rate".to_string(), 1.5);
        let before_inflation = state.economy.inflation_rate;
        let created = apply_deltas(&mut state, &deltas).unwrap();
        assert_eq!(created, vec!["indices.war_weariness".to_string()]);
        assert_eq!(state.indices["happiness"], 100.0);
        assert_eq!(state.indices["war_weariness"], 4.0);
        assert!((state.economy.inflation_rate - before_inflation - 1.5).abs() < 1e-9);
    }

    #[test]
    fn failed_apply_leaves_state_untouched() {
        let mut state = sample_country();
        let before = state.clone();
        let mut deltas = BTreeMap::new();
        deltas.insert("indices.happiness".to_string(), 1.0);
        deltas.insert("meta.country_code.x".to_string(), 1.0);
        assert!(apply_deltas(&mut state, &deltas).is_err());
        assert_eq!(state, before);
    }

    #[test]
    fn view_reads_missing_as_zero() {
        let view = StateView::capture(&sample_country()).unwrap();
        assert_eq!(view.number_or_zero("nope.nothing"), 0.0);
        assert!(view.number("economy.gdp_billions_usd").unwrap() > 0.0);
    }
}
