//! Configuration types for the simulation.
//!
//! A [`ConfigurationCatalog`] is loaded once, validated, and then shared
//! read-only by everything that needs a parameter. Nothing in the engine reads
//! process-wide defaults.

use crate::{ActionKind, Category, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Biotope dimensions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiotopeConfig {
    /// Cells along the X axis
    pub width: i32,
    /// Cells along the Y axis
    pub height: i32,
}

impl Default for BiotopeConfig {
    fn default() -> Self {
        Self {
            width: 300,
            height: 200,
        }
    }
}

/// Fixed parameters of one species
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesConfig {
    /// Unique species name
    pub name: String,
    pub category: Category,
    /// Display letter; falls back to the category letter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<char>,
    /// Organisms created before the first tick
    pub initial_count: usize,
    /// Upper bound of the death age
    pub max_lifespan: u32,
    /// Chance of attempting procreation on each tick
    pub procreation_probability: f64,
    /// Energy of founders and newborns
    pub initial_energy_reserve: f64,
    /// Energy gained per tick; producers only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photosynthesis_capacity: Option<f64>,
    /// Ceiling for photosynthesis gains
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_energy_reserve: Option<f64>,
    /// If false, energy gating and spending are bypassed
    #[serde(default = "default_energy_dependent")]
    pub energy_dependent: bool,
}

fn default_energy_dependent() -> bool {
    true
}

impl SpeciesConfig {
    pub fn symbol(&self) -> char {
        self.symbol.unwrap_or_else(|| self.category.symbol())
    }
}

/// Energy economics of one action kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCost {
    /// Paid when the action is carried out
    pub energy_cost: f64,
    /// The reserve must be strictly above this to attempt the action
    pub minimum_energy_required: f64,
    /// Paid every tick for merely having the capability
    #[serde(default)]
    pub upkeep_cost: f64,
}

/// Per-action-kind costs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCosts {
    #[serde(rename = "move")]
    pub movement: ActionCost,
    pub hunt: ActionCost,
    pub procreate: ActionCost,
}

impl Default for ActionCosts {
    fn default() -> Self {
        Self {
            movement: ActionCost {
                energy_cost: 5.0,
                minimum_energy_required: 30.0,
                upkeep_cost: 2.0,
            },
            hunt: ActionCost {
                energy_cost: 10.0,
                minimum_energy_required: 30.0,
                upkeep_cost: 4.0,
            },
            procreate: ActionCost {
                energy_cost: 15.0,
                minimum_energy_required: 100.0,
                upkeep_cost: 0.0,
            },
        }
    }
}

/// What a successful hunt is worth to the hunter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HuntReward {
    /// A fixed amount of energy
    Fixed { amount: f64 },
    /// The victim's whole energy reserve
    PreyReserve,
}

impl Default for HuntReward {
    fn default() -> Self {
        HuntReward::PreyReserve
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HuntingConfig {
    #[serde(default)]
    pub reward: HuntReward,
}

/// How the death age of a newborn is chosen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifespanPolicy {
    /// Everyone dies at the species `max_lifespan`
    #[default]
    Fixed,
    /// Drawn uniformly from `1..=max_lifespan` at birth
    Sampled,
}

/// Immutable set of every parameter the engine needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationCatalog {
    pub biotope: BiotopeConfig,
    /// Species in placement order
    pub species: Vec<SpeciesConfig>,
    pub actions: ActionCosts,
    #[serde(default)]
    pub hunting: HuntingConfig,
    #[serde(default)]
    pub lifespan_policy: LifespanPolicy,
}

impl Default for ConfigurationCatalog {
    fn default() -> Self {
        let species = vec![
            producer("plant", 1000, 40, 0.50, 5.0),
            consumer("herbivore_1", Category::Prey, 300, 35, 0.10),
            consumer("herbivore_2", Category::Prey, 150, 50, 0.05),
            consumer("carnivore_1", Category::Predator, 100, 100, 0.02),
            consumer("carnivore_2", Category::Predator, 50, 80, 0.03),
            consumer("carnivore_3", Category::Predator, 25, 120, 0.01),
        ];

        Self {
            biotope: BiotopeConfig::default(),
            species,
            actions: ActionCosts::default(),
            hunting: HuntingConfig::default(),
            lifespan_policy: LifespanPolicy::Sampled,
        }
    }
}

const DEFAULT_INITIAL_ENERGY_RESERVE: f64 = 10_000.0;

/// Largest grid the engine will allocate (4096 x 4096 cells)
pub const MAX_CELLS: usize = 1 << 24;

/// Cell count of a `width` x `height` grid, or why it cannot be built
pub fn grid_cells(width: i32, height: i32) -> std::result::Result<usize, String> {
    if width <= 0 || height <= 0 {
        return Err(format!("grid dimensions {}x{} must be positive", width, height));
    }
    match (width as usize).checked_mul(height as usize) {
        Some(cells) if cells <= MAX_CELLS => Ok(cells),
        _ => Err(format!(
            "grid of {}x{} exceeds the maximum of {} cells",
            width, height, MAX_CELLS
        )),
    }
}

fn producer(name: &str, count: usize, lifespan: u32, probability: f64, rate: f64) -> SpeciesConfig {
    SpeciesConfig {
        name: name.to_string(),
        category: Category::Producer,
        symbol: None,
        initial_count: count,
        max_lifespan: lifespan,
        procreation_probability: probability,
        initial_energy_reserve: DEFAULT_INITIAL_ENERGY_RESERVE,
        photosynthesis_capacity: Some(rate),
        max_energy_reserve: None,
        energy_dependent: true,
    }
}

fn consumer(
    name: &str,
    category: Category,
    count: usize,
    lifespan: u32,
    probability: f64,
) -> SpeciesConfig {
    SpeciesConfig {
        name: name.to_string(),
        category,
        symbol: None,
        initial_count: count,
        max_lifespan: lifespan,
        procreation_probability: probability,
        initial_energy_reserve: DEFAULT_INITIAL_ENERGY_RESERVE,
        photosynthesis_capacity: None,
        max_energy_reserve: None,
        energy_dependent: true,
    }
}

impl ConfigurationCatalog {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut deserializer = serde_json::Deserializer::from_str(json);
        let catalog: ConfigurationCatalog = serde_path_to_error::deserialize(&mut deserializer)
            .map_err(|e| Error::configuration(offending_key(&e), e.inner().to_string()))?;
        deserializer
            .end()
            .map_err(|e| Error::configuration(DOCUMENT_KEY, e.to_string()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {:?}", path);
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn species(&self, name: &str) -> Option<&SpeciesConfig> {
        self.species.iter().find(|s| s.name == name)
    }

    pub fn action(&self, kind: ActionKind) -> &ActionCost {
        match kind {
            ActionKind::Move => &self.actions.movement,
            ActionKind::Hunt => &self.actions.hunt,
            ActionKind::Procreate => &self.actions.procreate,
        }
    }

    pub fn total_cells(&self) -> usize {
        (self.biotope.width.max(0) as usize) * (self.biotope.height.max(0) as usize)
    }

    /// Check every range constraint, reporting the first offending key
    pub fn validate(&self) -> Result<()> {
        if self.biotope.width <= 0 {
            return Err(Error::configuration("biotope.width", "must be positive"));
        }
        if self.biotope.height <= 0 {
            return Err(Error::configuration("biotope.height", "must be positive"));
        }
        grid_cells(self.biotope.width, self.biotope.height)
            .map_err(|reason| Error::configuration("biotope", reason))?;

        let mut seen = HashSet::new();
        let mut founders = 0usize;
        for (index, species) in self.species.iter().enumerate() {
            if species.name.is_empty() {
                return Err(Error::configuration(
                    format!("species[{}].name", index),
                    "must not be empty",
                ));
            }
            let prefix = format!("species.{}", species.name);

            if !seen.insert(species.name.as_str()) {
                return Err(Error::configuration(
                    format!("{}.name", prefix),
                    "duplicate species name",
                ));
            }
            if species.max_lifespan == 0 {
                return Err(Error::configuration(
                    format!("{}.max_lifespan", prefix),
                    "must be at least 1",
                ));
            }
            if !(0.0..=1.0).contains(&species.procreation_probability) {
                return Err(Error::configuration(
                    format!("{}.procreation_probability", prefix),
                    "must be within [0, 1]",
                ));
            }
            check_amount(
                &format!("{}.initial_energy_reserve", prefix),
                species.initial_energy_reserve,
            )?;

            match (species.category, species.photosynthesis_capacity) {
                (Category::Producer, None) => {
                    return Err(Error::configuration(
                        format!("{}.photosynthesis_capacity", prefix),
                        "required for producer species",
                    ));
                }
                (Category::Producer, Some(rate)) => {
                    check_amount(&format!("{}.photosynthesis_capacity", prefix), rate)?;
                }
                (_, Some(_)) => {
                    return Err(Error::configuration(
                        format!("{}.photosynthesis_capacity", prefix),
                        "only producer species photosynthesize",
                    ));
                }
                (_, None) => {}
            }

            if let Some(ceiling) = species.max_energy_reserve {
                check_amount(&format!("{}.max_energy_reserve", prefix), ceiling)?;
                if ceiling < species.initial_energy_reserve {
                    return Err(Error::configuration(
                        format!("{}.max_energy_reserve", prefix),
                        "must not be below initial_energy_reserve",
                    ));
                }
            }

            founders += species.initial_count;
            if founders > self.total_cells() {
                return Err(Error::configuration(
                    format!("{}.initial_count", prefix),
                    format!(
                        "initial organisms exceed the {} cells of the biotope",
                        self.total_cells()
                    ),
                ));
            }
        }

        for kind in [ActionKind::Move, ActionKind::Hunt, ActionKind::Procreate] {
            let cost = self.action(kind);
            check_amount(&format!("actions.{}.energy_cost", kind), cost.energy_cost)?;
            check_amount(
                &format!("actions.{}.minimum_energy_required", kind),
                cost.minimum_energy_required,
            )?;
            check_amount(&format!("actions.{}.upkeep_cost", kind), cost.upkeep_cost)?;
        }

        if let HuntReward::Fixed { amount } = self.hunting.reward {
            check_amount("hunting.reward.amount", amount)?;
        }

        Ok(())
    }
}

fn check_amount(key: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::configuration(key, "must be a finite non-negative number"));
    }
    Ok(())
}

const DOCUMENT_KEY: &str = "<document>";

/// Dotted path of the value serde rejected. A missing field is reported
/// against its parent, so its name is appended.
fn offending_key(err: &serde_path_to_error::Error<serde_json::Error>) -> String {
    let path = err.path().to_string();
    let message = err.inner().to_string();
    let missing = message
        .strip_prefix("missing field `")
        .and_then(|rest| rest.split('`').next());

    match (path.as_str(), missing) {
        (".", Some(field)) => field.to_string(),
        (".", None) => DOCUMENT_KEY.to_string(),
        (_, Some(field)) => format!("{}.{}", path, field),
        (_, None) => path,
    }
}
