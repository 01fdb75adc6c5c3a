//! Event definitions as authored in YAML and their compiled form.

use serde::{Deserialize, Serialize};
use sim_core::{RetriggerPolicy, Severity};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::condition::Condition;
use crate::EventError;

/// A probability modifier as written in the catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawModifier {
    pub when: String,
    /// Monthly probability added (trigger) or removed (prevention).
    pub delta: f64,
}

/// A named player response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseDefinition {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub effects: BTreeMap<String, f64>,
}

/// An event as written in the catalog file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawEventDefinition {
    pub name: String,
    pub category: String,
    pub severity: Severity,
    pub base_annual_probability: f64,
    #[serde(default)]
    pub triggers: Vec<RawModifier>,
    #[serde(default)]
    pub preventions: Vec<RawModifier>,
    #[serde(default)]
    pub effects: BTreeMap<String, f64>,
    /// 0 means the event resolves instantly.
    #[serde(default)]
    pub duration_months: u32,
    #[serde(default)]
    pub responses: BTreeMap<String, ResponseDefinition>,
    #[serde(default)]
    pub retrigger: Option<RetriggerPolicy>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Modifier {
    pub condition: Condition,
    pub delta: f64,
}

/// An event ready for evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct EventDefinition {
    pub id: String,
    pub name: String,
    pub category: String,
    pub severity: Severity,
    pub base_annual_probability: f64,
    pub triggers: Vec<Modifier>,
    pub preventions: Vec<Modifier>,
    pub effects: BTreeMap<String, f64>,
    pub duration_months: u32,
    pub responses: BTreeMap<String, ResponseDefinition>,
    pub retrigger: Option<RetriggerPolicy>,
}

fn compile_modifiers(raw: &[RawModifier]) -> Result<Vec<Modifier>, EventError> {
    raw.iter()
        .map(|m| {
            Ok(Modifier {
                condition: Condition::parse(&m.when)?,
                delta: m.delta,
            })
        })
        .collect()
}

impl EventDefinition {
    pub fn compile(id: &str, raw: RawEventDefinition) -> Result<Self, EventError> {
        if !(0.0..=1.0).contains(&raw.base_annual_probability) {
            return Err(EventError::InvalidProbability(id.to_string()));
        }
        Ok(Self {
            id: id.to_string(),
            triggers: compile_modifiers(&raw.triggers)?,
            preventions: compile_modifiers(&raw.preventions)?,
            name: raw.name,
            category: raw.category,
            severity: raw.severity,
            base_annual_probability: raw.base_annual_probability,
            effects: raw.effects,
            duration_months: raw.duration_months,
            responses: raw.responses,
            retrigger: raw.retrigger,
        })
    }
}

/// All event definitions keyed by id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventCatalog {
    pub definitions: BTreeMap<String, EventDefinition>,
}

impl EventCatalog {
    pub fn from_raw(raw: BTreeMap<String, RawEventDefinition>) -> Result<Self, EventError> {
        let definitions = raw
            .into_iter()
            .map(|(id, def)| EventDefinition::compile(&id, def).map(|d| (id, d)))
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(Self { definitions })
    }

    pub fn from_yaml_str(s: &str) -> Result<Self, EventError> {
        let raw: BTreeMap<String, RawEventDefinition> =
            serde_yaml::from_str(s).map_err(|e| EventError::Parse(e.to_string()))?;
        Self::from_raw(raw)
    }

    /// Load `events.yaml`; an absent file is an empty catalog.
    pub fn load_dir(dir: &Path) -> Result<Self, EventError> {
        let path = dir.join("events.yaml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)?;
        let catalog = Self::from_yaml_str(&text)?;
        info!(events = catalog.definitions.len(), "event catalog loaded");
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Option<&EventDefinition> {
        self.definitions.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
recession:
  name: Recession
  category: economic
  severity: moderate
  base_annual_probability: 0.08
  triggers:
    - { when: "economy.gdp_growth_rate < 0", delta: 0.02 }
  effects:
    workforce.unemployment_rate: 2.0
  duration_months: 6
"#;

    #[test]
    fn compiles_conditions_at_load() {
        let catalog = EventCatalog::from_yaml_str(YAML).unwrap();
        let def = catalog.get("recession").unwrap();
        assert_eq!(def.triggers.len(), 1);
        assert_eq!(def.triggers[0].condition.path, "economy.gdp_growth_rate");
        assert_eq!(def.severity, Severity::Moderate);
        assert!(def.retrigger.is_none());
    }

    #[test]
    fn bad_condition_fails_the_load() {
        let broken = YAML.replace("economy.gdp_growth_rate < 0", "economy.gdp_growth_rate ~ 0");
        assert!(matches!(
            EventCatalog::from_yaml_str(&broken),
            Err(EventError::InvalidCondition { .. })
        ));
    }

    #[test]
    fn bundled_events_load() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../assets/catalogs");
        let catalog = EventCatalog::load_dir(&dir).unwrap();
        assert!(catalog.get("economic_crisis").is_some());
        assert!(!catalog.get("economic_crisis").unwrap().responses.is_empty());
    }
}
