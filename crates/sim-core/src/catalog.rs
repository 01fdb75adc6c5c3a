//! Static reference data: weapons, infrastructure project types and
//! constraint templates. Loaded from YAML and treated as read-only.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::constraints::{check_all, Constraint, ConstraintResult};
use crate::state::CountryState;
use crate::SimError;

/// Event and incident severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Moderate,
    Major,
    Critical,
}

/// Delivery window in years after the order.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRange {
    pub min_years: u32,
    pub max_years: u32,
}

impl DeliveryRange {
    /// Integer mean of the window, at least one year.
    pub fn mean_years(&self) -> u32 {
        ((self.min_years + self.max_years) / 2).max(1)
    }
}

fn default_min_relations() -> f64 {
    50.0
}

/// Conditions a buyer must meet before a weapon is sold to it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prerequisites {
    #[serde(default = "default_min_relations")]
    pub min_relations: f64,
    /// Equipment the buyer may not operate.
    #[serde(default)]
    pub not_operating: Vec<String>,
    /// Closed list of buyer country codes; `None` sells to anyone.
    #[serde(default)]
    pub allowed_buyers: Option<Vec<String>>,
}

impl Default for Prerequisites {
    fn default() -> Self {
        Self {
            min_relations: default_min_relations(),
            not_operating: Vec::new(),
            allowed_buyers: None,
        }
    }
}

/// A purchasable weapon system.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeaponDefinition {
    /// Model name as it appears in inventories.
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub subcategory: String,
    /// Supplier country code.
    pub manufacturer: String,
    #[serde(default)]
    pub manufacturer_name: String,
    pub unit_cost_millions: Decimal,
    pub delivery: DeliveryRange,
    /// Units the manufacturer can build per year.
    pub production_rate_per_year: u32,
    #[serde(default)]
    pub prerequisites: Prerequisites,
}

/// A kind of infrastructure the state can build.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InfrastructureProjectType {
    pub name: String,
    pub cost_billions: f64,
    pub duration_quarters: u32,
    /// Dot-path deltas applied on completion.
    pub effects: BTreeMap<String, f64>,
}

/// A named, reusable list of constraints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstraintTemplate {
    #[serde(default)]
    pub description: String,
    pub constraints: Vec<Constraint>,
}

impl ConstraintTemplate {
    pub fn validate(&self, state: &CountryState) -> (bool, Vec<ConstraintResult>) {
        check_all(state, &self.constraints)
    }
}

/// All read-only catalogs keyed by identifier.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalogs {
    #[serde(default)]
    pub weapons: BTreeMap<String, WeaponDefinition>,
    #[serde(default)]
    pub infrastructure_projects: BTreeMap<String, InfrastructureProjectType>,
    #[serde(default)]
    pub constraint_templates: BTreeMap<String, ConstraintTemplate>,
}

impl Catalogs {
    /// Load `weapons.yaml`, `infrastructure.yaml` and `constraints.yaml` from
    /// `dir`. Missing files leave the corresponding catalog empty.
    pub fn load_dir(dir: &Path) -> Result<Self, SimError> {
        let catalogs = Catalogs {
            weapons: load_optional(&dir.join("weapons.yaml"))?,
            infrastructure_projects: load_optional(&dir.join("infrastructure.yaml"))?,
            constraint_templates: load_optional(&dir.join("constraints.yaml"))?,
        };
        info!(
            weapons = catalogs.weapons.len(),
            infrastructure = catalogs.infrastructure_projects.len(),
            templates = catalogs.constraint_templates.len(),
            "catalogs loaded"
        );
        Ok(catalogs)
    }

    /// Weapons of one category, ordered by id.
    pub fn weapons_in_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a WeaponDefinition)> + 'a {
        self.weapons
            .iter()
            .filter(move |(_, w)| w.category.eq_ignore_ascii_case(category))
    }
}

/// Parse a YAML map file; an absent file is an empty map.
pub fn load_optional<T>(path: &Path) -> Result<BTreeMap<String, T>, SimError>
where
    T: for<'de> Deserialize<'de>,
{
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| SimError::Catalog(format!("{}: {}", path.display(), e)))?;
    serde_yaml::from_str(&text).map_err(|e| SimError::Catalog(format!("{}: {}", path.display(), e)))
}
