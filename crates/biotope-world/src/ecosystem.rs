//! Ecosystem driver: owns the grid and the organism arena and advances time.

use crate::grid::SpatialGrid;
use crate::organism::{Habitat, Organism};
use biotope_core::{
    CauseOfDeath, Category, ConfigurationCatalog, Coordinate, Error, LifespanPolicy, OrganismId,
    Result, SpeciesConfig,
};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, event, info, trace, Level};

/// How often population metrics are logged
const METRICS_INTERVAL: u64 = 100;

/// Outcome of one call to [`Ecosystem::evolve`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickSummary {
    /// Tick number after the step
    pub tick: u64,
    pub population: usize,
    pub births: u32,
    pub deaths_by_starvation: u32,
    pub deaths_by_old_age: u32,
    pub deaths_by_predation: u32,
}

impl TickSummary {
    pub fn deaths(&self) -> u32 {
        self.deaths_by_starvation + self.deaths_by_old_age + self.deaths_by_predation
    }

    fn record_death(&mut self, cause: CauseOfDeath) {
        match cause {
            CauseOfDeath::Starvation => self.deaths_by_starvation += 1,
            CauseOfDeath::OldAge => self.deaths_by_old_age += 1,
            CauseOfDeath::Predation => self.deaths_by_predation += 1,
        }
    }
}

pub struct Ecosystem {
    catalog: Arc<ConfigurationCatalog>,
    grid: SpatialGrid,
    organisms: BTreeMap<OrganismId, Organism>,
    dead: Vec<OrganismId>,
    rng: ChaCha8Rng,
    tick: u64,
    next_id: u64,
    revision: u64,
    // Lifetime counters for metrics
    total_births: u64,
    total_deaths: u64,
}

impl Ecosystem {
    /// Build a populated ecosystem from a catalog
    pub fn new(catalog: ConfigurationCatalog, seed: u64) -> Result<Self> {
        Self::with_catalog(Arc::new(catalog), seed)
    }

    pub fn with_catalog(catalog: Arc<ConfigurationCatalog>, seed: u64) -> Result<Self> {
        catalog.validate()?;

        let mut ecosystem = Self::empty_unchecked(catalog.clone(), seed);

        // Spawn initial organisms
        for species in &catalog.species {
            for _ in 0..species.initial_count {
                let location = ecosystem.random_free_location()?;
                ecosystem.spawn_at(species, location)?;
            }
            debug!(
                species = %species.name,
                count = species.initial_count,
                "Placed initial organisms"
            );
        }

        info!(
            width = ecosystem.grid.width,
            height = ecosystem.grid.height,
            population = ecosystem.organisms.len(),
            seed = seed,
            "Ecosystem created"
        );

        Ok(ecosystem)
    }

    /// An ecosystem with the catalog's grid and no organisms
    pub fn empty(catalog: ConfigurationCatalog, seed: u64) -> Result<Self> {
        catalog.validate()?;
        Ok(Self::empty_unchecked(Arc::new(catalog), seed))
    }

    fn empty_unchecked(catalog: Arc<ConfigurationCatalog>, seed: u64) -> Self {
        let grid = SpatialGrid::from_config(&catalog.biotope);
        Self::from_parts(catalog, grid, ChaCha8Rng::seed_from_u64(seed))
    }

    pub(crate) fn from_parts(
        catalog: Arc<ConfigurationCatalog>,
        grid: SpatialGrid,
        rng: ChaCha8Rng,
    ) -> Self {
        Self {
            catalog,
            grid,
            organisms: BTreeMap::new(),
            dead: Vec::new(),
            rng,
            tick: 0,
            next_id: 0,
            revision: 0,
            total_births: 0,
            total_deaths: 0,
        }
    }

    pub fn catalog(&self) -> &ConfigurationCatalog {
        &self.catalog
    }

    pub fn shared_catalog(&self) -> Arc<ConfigurationCatalog> {
        self.catalog.clone()
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub(crate) fn set_tick(&mut self, tick: u64) {
        self.tick = tick;
    }

    /// Bumped by every externally visible change
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }

    pub(crate) fn rng_state(&self) -> ChaCha8Rng {
        self.rng.clone()
    }

    pub fn width(&self) -> i32 {
        self.grid.width
    }

    pub fn height(&self) -> i32 {
        self.grid.height
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    pub fn population(&self) -> usize {
        self.organisms.len()
    }

    pub fn occupied_count(&self) -> usize {
        self.grid.occupied_count()
    }

    pub fn free_count(&self) -> usize {
        self.grid.free_count()
    }

    pub fn organism(&self, id: OrganismId) -> Option<&Organism> {
        self.organisms.get(&id)
    }

    /// All organisms in ascending id order
    pub fn organisms(&self) -> impl Iterator<Item = &Organism> + '_ {
        self.organisms.values()
    }

    pub fn organism_at(&self, coordinate: Coordinate) -> Option<&Organism> {
        self.grid
            .occupant(coordinate)
            .and_then(|id| self.organisms.get(&id))
    }

    /// Occupied cells with the category of their occupant
    pub fn cells(&self) -> impl Iterator<Item = (Coordinate, Category)> + '_ {
        self.organisms.values().map(|o| (o.location, o.category))
    }

    /// Text picture of the grid, one row per line. Occupied cells show the
    /// species symbol, free cells a dot.
    pub fn render(&self) -> String {
        let symbols: BTreeMap<&str, char> = self
            .catalog
            .species
            .iter()
            .map(|s| (s.name.as_str(), s.symbol()))
            .collect();

        let width = self.grid.width.max(0) as usize;
        let mut rows = vec![vec!['.'; width]; self.grid.height.max(0) as usize];
        for organism in self.organisms.values() {
            let symbol = symbols
                .get(organism.species.as_str())
                .copied()
                .unwrap_or_else(|| organism.category.symbol());
            rows[organism.location.y as usize][organism.location.x as usize] = symbol;
        }

        rows.into_iter()
            .map(|row| row.into_iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Living organisms per species
    pub fn census(&self) -> BTreeMap<String, usize> {
        let mut census: BTreeMap<String, usize> = self
            .catalog
            .species
            .iter()
            .map(|s| (s.name.clone(), 0))
            .collect();
        for organism in self.organisms.values() {
            *census.entry(organism.species.clone()).or_insert(0) += 1;
        }
        census
    }

    /// Advance one tick: act, sweep, count
    pub fn evolve(&mut self) -> TickSummary {
        let mut summary = TickSummary::default();

        // Snapshot the roster so births and deaths during the tick cannot
        // disturb iteration.
        let mut roster: Vec<OrganismId> = self
            .organisms
            .iter()
            .filter(|(_, o)| o.is_alive())
            .map(|(id, _)| *id)
            .collect();
        roster.shuffle(&mut self.rng);

        for id in roster {
            // Taken out of the arena while acting so it can borrow the
            // ecosystem mutably; its cell stays occupied.
            let Some(mut organism) = self.organisms.remove(&id) else {
                continue;
            };

            if organism.is_alive() {
                let report = organism.act(self);
                if report.offspring.is_some() {
                    summary.births += 1;
                }
                if let Some(cause) = report.died {
                    trace!(organism_id = %id, cause = %cause, "Organism died while acting");
                    self.dead.push(id);
                }
            }

            self.organisms.insert(id, organism);
        }

        // Sweep
        for id in std::mem::take(&mut self.dead) {
            if let Some(cause) = self.reap(id) {
                summary.record_death(cause);
            }
        }

        self.tick += 1;
        self.revision += 1;
        self.total_births += summary.births as u64;
        self.total_deaths += summary.deaths() as u64;

        summary.tick = self.tick;
        summary.population = self.organisms.len();

        if self.tick % METRICS_INTERVAL == 0 {
            self.emit_population_metrics();
        }

        summary
    }

    /// Remove a dead organism from grid and arena
    fn reap(&mut self, id: OrganismId) -> Option<CauseOfDeath> {
        let organism = self.organisms.remove(&id)?;
        if let Err(e) = self.grid.vacate(organism.location) {
            // Arena and grid disagree; nothing else to release
            error!(organism_id = %id, "Sweep could not vacate cell: {}", e);
        }

        let cause = organism.cause_of_death();
        debug!(
            event = "organism_death",
            organism_id = %id,
            species = %organism.species,
            cause = ?cause,
            age = organism.age,
            energy = organism.energy_reserve,
            tick = self.tick,
            "Organism removed"
        );
        cause
    }

    fn emit_population_metrics(&self) {
        let census = self.census();
        let energies: Vec<f64> = self.organisms.values().map(|o| o.energy_reserve).collect();
        let avg_energy = if energies.is_empty() {
            0.0
        } else {
            energies.iter().sum::<f64>() / energies.len() as f64
        };

        info!(
            event = "population_metrics",
            tick = self.tick,
            total_population = self.organisms.len(),
            free_cells = self.grid.free_count(),
            avg_energy = avg_energy,
            total_births = self.total_births,
            total_deaths = self.total_deaths,
            "Population metrics snapshot"
        );

        event!(
            Level::INFO,
            gauge_name = "population_total",
            gauge_value = self.organisms.len(),
            tick = self.tick,
            "Population gauge"
        );
        event!(
            Level::INFO,
            gauge_name = "avg_energy",
            gauge_value = avg_energy,
            tick = self.tick,
            "Average energy gauge"
        );

        for (species, count) in census {
            event!(
                Level::INFO,
                gauge_name = "species_population",
                gauge_value = count,
                species = %species,
                tick = self.tick,
                "Species population gauge"
            );
        }
    }

    /// Free cells of the Moore neighborhood, clipped to the grid
    pub fn surrounding_free_locations(&self, center: Coordinate) -> Vec<Coordinate> {
        self.grid.free_neighbors(center)
    }

    /// Organisms in the Moore neighborhood, dead-but-unswept ones included
    pub fn surrounding_organisms(&self, center: Coordinate) -> Vec<&Organism> {
        self.grid
            .occupied_neighbors(center)
            .into_iter()
            .filter_map(|(_, id)| self.organisms.get(&id))
            .collect()
    }

    pub fn random_free_location(&mut self) -> Result<Coordinate> {
        self.grid.random_free(&mut self.rng)
    }

    /// Create a newborn of `species` at `location`
    pub fn spawn(&mut self, name: &str, location: Coordinate) -> Result<OrganismId> {
        let catalog = self.catalog.clone();
        let species = catalog
            .species(name)
            .ok_or_else(|| Error::configuration(format!("species.{}", name), "unknown species"))?;
        self.spawn_at(species, location)
    }

    fn spawn_at(&mut self, species: &SpeciesConfig, location: Coordinate) -> Result<OrganismId> {
        let death_age = self.sample_death_age(species);
        let organism = Organism::new(OrganismId(self.next_id), species, location, death_age, self.tick);
        self.add_organism(organism)
    }

    fn sample_death_age(&mut self, species: &SpeciesConfig) -> u32 {
        match self.catalog.lifespan_policy {
            LifespanPolicy::Fixed => species.max_lifespan,
            LifespanPolicy::Sampled => self.rng.gen_range(1..=species.max_lifespan),
        }
    }

    /// Register an organism at its recorded location under a fresh id
    pub fn add_organism(&mut self, mut organism: Organism) -> Result<OrganismId> {
        if !organism.is_alive() {
            return Err(Error::DeadOrganism {
                species: organism.species,
                location: organism.location,
            });
        }

        let id = OrganismId(self.next_id);
        self.grid.occupy(organism.location, id)?;
        self.next_id += 1;
        self.revision += 1;

        organism.id = id;
        organism.previous_location = organism.location;
        self.organisms.insert(id, organism);
        Ok(id)
    }

    /// Unregister an organism and release its cell
    pub fn remove_organism(&mut self, id: OrganismId) -> Result<Organism> {
        let location = self
            .organisms
            .get(&id)
            .map(|o| o.location)
            .ok_or(Error::UnknownOrganism(id))?;
        self.grid.vacate(location)?;
        self.revision += 1;
        self.organisms.remove(&id).ok_or(Error::UnknownOrganism(id))
    }

    /// Move an organism, vacating its old cell and occupying `to`
    pub fn update_organism_location(&mut self, id: OrganismId, to: Coordinate) -> Result<()> {
        let from = self
            .organisms
            .get(&id)
            .map(|o| o.location)
            .ok_or(Error::UnknownOrganism(id))?;
        self.grid.relocate(from, to)?;

        if let Some(organism) = self.organisms.get_mut(&id) {
            organism.previous_location = from;
            organism.location = to;
        }
        self.revision += 1;
        Ok(())
    }

    /// Check that arena and grid agree with each other
    pub fn is_consistent(&self) -> bool {
        self.grid.is_consistent()
            && self.grid.occupied_count() == self.organisms.len()
            && self
                .organisms
                .iter()
                .all(|(id, o)| o.id == *id && self.grid.occupant(o.location) == Some(*id))
    }
}

impl Habitat for Ecosystem {
    fn catalog(&self) -> Arc<ConfigurationCatalog> {
        self.catalog.clone()
    }

    fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    fn surrounding_free_locations(&self, center: Coordinate) -> Vec<Coordinate> {
        self.grid.free_neighbors(center)
    }

    fn surrounding_living(&self, center: Coordinate, category: Category) -> Vec<OrganismId> {
        self.grid
            .occupied_neighbors(center)
            .into_iter()
            .filter_map(|(_, id)| self.organisms.get(&id))
            .filter(|o| o.is_alive() && o.category == category)
            .map(|o| o.id)
            .collect()
    }

    fn kill(&mut self, id: OrganismId, cause: CauseOfDeath) -> Option<f64> {
        let victim = self.organisms.get_mut(&id)?;
        if !victim.is_alive() {
            return None;
        }
        victim.die(cause);
        self.dead.push(id);
        Some(victim.energy_reserve)
    }

    fn relocate(&mut self, from: Coordinate, to: Coordinate) -> Result<()> {
        self.grid.relocate(from, to).map(|_| ())
    }

    fn spawn(&mut self, species: &str, at: Coordinate) -> Result<OrganismId> {
        Ecosystem::spawn(self, species, at)
    }
}
