//! Organism state and per-tick action resolution.
//!
//! An organism never touches the grid directly. Everything it does to the
//! world (moving, eating a neighbor, placing an offspring) goes through the
//! [`Habitat`] it is handed for the duration of [`Organism::act`]. Killing a
//! neighbor only marks it dead; the ecosystem sweeps it after the action phase.

use biotope_core::{
    ActionCost, ActionKind, CauseOfDeath, Category, ConfigurationCatalog, Coordinate, HuntReward,
    LifeState, OrganismId, Result, SpeciesConfig,
};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use tracing::{trace, warn};

/// What an organism can see and change around itself while acting
pub trait Habitat {
    fn catalog(&self) -> Arc<ConfigurationCatalog>;

    fn rng(&mut self) -> &mut ChaCha8Rng;

    /// Free cells of the Moore neighborhood
    fn surrounding_free_locations(&self, center: Coordinate) -> Vec<Coordinate>;

    /// Living neighbors of the given category
    fn surrounding_living(&self, center: Coordinate, category: Category) -> Vec<OrganismId>;

    /// Mark a neighbor dead, returning the energy it held
    fn kill(&mut self, id: OrganismId, cause: CauseOfDeath) -> Option<f64>;

    fn relocate(&mut self, from: Coordinate, to: Coordinate) -> Result<()>;

    /// Place a newborn of `species` on a free cell
    fn spawn(&mut self, species: &str, at: Coordinate) -> Result<OrganismId>;
}

/// What happened during one call to [`Organism::act`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionReport {
    pub photosynthesized: f64,
    pub prey: Option<OrganismId>,
    pub moved_to: Option<Coordinate>,
    pub offspring: Option<OrganismId>,
    pub died: Option<CauseOfDeath>,
}

impl ActionReport {
    pub fn fed(&self) -> bool {
        self.prey.is_some()
    }
}

/// An organism in the simulation
#[derive(Debug, Clone, PartialEq)]
pub struct Organism {
    pub id: OrganismId,
    pub species: String,
    pub category: Category,
    pub location: Coordinate,
    pub previous_location: Coordinate,
    pub energy_reserve: f64,
    pub age: u32,
    pub death_age: u32,
    pub state: LifeState,
    pub is_energy_dependent: bool,
    pub birth_tick: u64,
}

impl Organism {
    pub fn new(
        id: OrganismId,
        species: &SpeciesConfig,
        location: Coordinate,
        death_age: u32,
        birth_tick: u64,
    ) -> Self {
        Self {
            id,
            species: species.name.clone(),
            category: species.category,
            location,
            previous_location: location,
            energy_reserve: species.initial_energy_reserve,
            age: 0,
            death_age,
            state: LifeState::Alive,
            is_energy_dependent: species.energy_dependent,
            birth_tick,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state.is_alive()
    }

    pub fn cause_of_death(&self) -> Option<CauseOfDeath> {
        self.state.cause_of_death()
    }

    /// Flip to `Dead`. The first cause sticks.
    pub fn die(&mut self, cause: CauseOfDeath) {
        if self.is_alive() {
            self.state = LifeState::Dead(cause);
        }
    }

    pub fn add_energy(&mut self, amount: f64) {
        self.energy_reserve += amount;
    }

    /// Spend energy, never going below zero
    pub fn spend_energy(&mut self, amount: f64) {
        if self.is_energy_dependent {
            self.energy_reserve = (self.energy_reserve - amount).max(0.0);
        }
    }

    pub fn has_enough_energy_to(&self, cost: &ActionCost) -> bool {
        !self.is_energy_dependent
            || (self.energy_reserve > cost.minimum_energy_required
                && self.energy_reserve >= cost.energy_cost)
    }

    /// Resolve one tick: age, photosynthesis, hunt, move, procreate, then
    /// the starvation check.
    pub fn act<H: Habitat>(&mut self, habitat: &mut H) -> ActionReport {
        let mut report = ActionReport::default();
        if !self.is_alive() {
            return report;
        }

        let catalog = habitat.catalog();
        let Some(species) = catalog.species(&self.species) else {
            warn!(organism_id = %self.id, species = %self.species, "Unknown species, skipping");
            return report;
        };

        self.age += 1;
        if self.age >= self.death_age {
            self.die(CauseOfDeath::OldAge);
            report.died = Some(CauseOfDeath::OldAge);
            return report;
        }

        if let Some(rate) = species.photosynthesis_capacity {
            report.photosynthesized = self.photosynthesize(rate, species.max_energy_reserve);
        }

        if !self.category.is_sessile() {
            report.prey = self.hunt(habitat, &catalog);

            if !report.fed() {
                report.moved_to = self.wander(habitat, &catalog);
            }
        }

        report.offspring = self.procreate(habitat, &catalog, species);

        if self.is_energy_dependent && self.energy_reserve <= 0.0 {
            self.die(CauseOfDeath::Starvation);
            report.died = Some(CauseOfDeath::Starvation);
        }

        report
    }

    fn photosynthesize(&mut self, rate: f64, ceiling: Option<f64>) -> f64 {
        let before = self.energy_reserve;
        let gained = before + rate;
        self.energy_reserve = match ceiling {
            Some(max) if before <= max => gained.min(max),
            Some(_) => before,
            None => gained,
        };
        self.energy_reserve - before
    }

    /// Capability upkeep is paid whenever the action would be affordable
    fn pay_upkeep(&mut self, cost: &ActionCost) {
        if cost.upkeep_cost > 0.0 && self.has_enough_energy_to(cost) {
            self.spend_energy(cost.upkeep_cost);
        }
    }

    fn hunt<H: Habitat>(
        &mut self,
        habitat: &mut H,
        catalog: &ConfigurationCatalog,
    ) -> Option<OrganismId> {
        let food = self.category.food()?;
        let cost = catalog.action(ActionKind::Hunt);

        self.pay_upkeep(cost);
        if !self.has_enough_energy_to(cost) {
            trace!(organism_id = %self.id, energy = self.energy_reserve, "Hunt skipped: insufficient energy");
            return None;
        }

        let candidates = habitat.surrounding_living(self.location, food);
        let victim = *candidates.choose(habitat.rng())?;
        let victim_energy = habitat.kill(victim, CauseOfDeath::Predation)?;

        let reward = match catalog.hunting.reward {
            HuntReward::Fixed { amount } => amount,
            HuntReward::PreyReserve => victim_energy,
        };
        self.add_energy(reward);
        self.spend_energy(cost.energy_cost);

        trace!(
            organism_id = %self.id,
            prey_id = %victim,
            reward = reward,
            energy = self.energy_reserve,
            "Hunt succeeded"
        );
        Some(victim)
    }

    fn wander<H: Habitat>(
        &mut self,
        habitat: &mut H,
        catalog: &ConfigurationCatalog,
    ) -> Option<Coordinate> {
        let cost = catalog.action(ActionKind::Move);

        self.pay_upkeep(cost);
        if !self.has_enough_energy_to(cost) {
            return None;
        }

        let free = habitat.surrounding_free_locations(self.location);
        let destination = *free.choose(habitat.rng())?;

        if let Err(e) = habitat.relocate(self.location, destination) {
            warn!(organism_id = %self.id, "Move rejected: {}", e);
            return None;
        }

        self.previous_location = self.location;
        self.location = destination;
        self.spend_energy(cost.energy_cost);
        Some(destination)
    }

    fn procreate<H: Habitat>(
        &mut self,
        habitat: &mut H,
        catalog: &ConfigurationCatalog,
        species: &SpeciesConfig,
    ) -> Option<OrganismId> {
        let cost = catalog.action(ActionKind::Procreate);

        self.pay_upkeep(cost);
        let roll: f64 = habitat.rng().gen();
        if roll >= species.procreation_probability || !self.has_enough_energy_to(cost) {
            return None;
        }

        let free = habitat.surrounding_free_locations(self.location);
        let Some(&birthplace) = free.choose(habitat.rng()) else {
            trace!(organism_id = %self.id, "Procreation skipped: no free neighboring cell");
            return None;
        };

        match habitat.spawn(&self.species, birthplace) {
            Ok(offspring) => {
                self.spend_energy(cost.energy_cost);
                Some(offspring)
            }
            Err(e) => {
                warn!(organism_id = %self.id, "Offspring placement failed: {}", e);
                None
            }
        }
    }
}
