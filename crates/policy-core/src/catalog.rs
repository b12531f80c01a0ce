//! # Plan Catalog
//!
//! Read-only lookup of plans and add-on options. The catalog is owned
//! outside the policy core; this module only consumes it.
//!
//! [`StaticCatalog`] holds the catalog in memory and can be loaded from TOML:
//!
//! ```toml
//! [[plans]]
//! id = "family-basic"
//! name = "Family Basic"
//! monthly_premium = 15000   # cents
//! cover_amount = 2000000    # cents
//! max_dependents = 5
//! features = ["repatriation"]
//!
//! [[options]]
//! id = "tombstone"
//! name = "Tombstone Benefit"
//! monthly_price = 2550      # cents
//! ```

use crate::{Money, OptionId, PlanId, PolicyError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A funeral plan as published by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub monthly_premium: Money,
    pub cover_amount: Money,
    pub max_dependents: u32,
    #[serde(default)]
    pub features: Vec<String>,
}

/// An add-on option that can be selected on top of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOnOption {
    pub id: OptionId,
    pub name: String,
    pub monthly_price: Money,
}

/// Outbound lookup of plans and options.
///
/// `Ok(None)` means the key is unknown; `Err` means the lookup itself failed.
pub trait Catalog: Send + Sync {
    fn plan(&self, id: &PlanId) -> Result<Option<Plan>, PolicyError>;

    fn option(&self, id: &OptionId) -> Result<Option<AddOnOption>, PolicyError>;
}

/// In-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    plans: BTreeMap<PlanId, Plan>,
    options: BTreeMap<OptionId, AddOnOption>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    #[serde(default)]
    plans: Vec<Plan>,
    #[serde(default)]
    options: Vec<AddOnOption>,
}

impl StaticCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a plan.
    #[must_use]
    pub fn with_plan(mut self, plan: Plan) -> Self {
        self.plans.insert(plan.id.clone(), plan);
        self
    }

    /// Add or replace an option.
    #[must_use]
    pub fn with_option(mut self, option: AddOnOption) -> Self {
        self.options.insert(option.id.clone(), option);
        self
    }

    /// Parse a catalog from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, PolicyError> {
        let file: CatalogFile =
            toml::from_str(text).map_err(|e| PolicyError::Config(format!("catalog: {e}")))?;
        let catalog = file.plans.into_iter().fold(Self::new(), Self::with_plan);
        Ok(file.options.into_iter().fold(catalog, Self::with_option))
    }

    /// Read and parse a catalog file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PolicyError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn plan_count(&self) -> usize {
        self.plans.len()
    }

    pub fn option_count(&self) -> usize {
        self.options.len()
    }
}

impl Catalog for StaticCatalog {
    fn plan(&self, id: &PlanId) -> Result<Option<Plan>, PolicyError> {
        Ok(self.plans.get(id).cloned())
    }

    fn option(&self, id: &OptionId) -> Result<Option<AddOnOption>, PolicyError> {
        Ok(self.options.get(id).cloned())
    }
}
