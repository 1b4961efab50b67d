//! Persisted ecosystem state.
//!
//! A snapshot captures the tick, grid dimensions and every organism. Loading
//! validates the whole document before anything is touched, so a rejected
//! snapshot leaves the live ecosystem exactly as it was.

use crate::ecosystem::Ecosystem;
use crate::grid::SpatialGrid;
use crate::organism::Organism;
use biotope_core::{
    grid_cells, CauseOfDeath, Category, ConfigurationCatalog, Coordinate, Error, LifeState,
    OrganismId, Result,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganismRecord {
    pub location: Coordinate,
    pub species: String,
    pub category: Category,
    pub energy_reserve: f64,
    pub age: u32,
    pub death_age: u32,
    pub is_alive: bool,
    pub cause_of_death: Option<CauseOfDeath>,
    #[serde(default)]
    pub birth_tick: u64,
}

impl From<&Organism> for OrganismRecord {
    fn from(organism: &Organism) -> Self {
        Self {
            location: organism.location,
            species: organism.species.clone(),
            category: organism.category,
            energy_reserve: organism.energy_reserve,
            age: organism.age,
            death_age: organism.death_age,
            is_alive: organism.is_alive(),
            cause_of_death: organism.cause_of_death(),
            birth_tick: organism.birth_tick,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub tick: u64,
    pub width: i32,
    pub height: i32,
    /// Ordered by ascending organism id
    pub organisms: Vec<OrganismRecord>,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::SnapshotFormat(e.to_string()))
    }

    /// Parse JSON from raw file contents; invalid UTF-8 is a format error
    pub fn from_json_slice(json: &[u8]) -> Result<Self> {
        serde_json::from_slice(json).map_err(|e| Error::SnapshotFormat(e.to_string()))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::SnapshotFormat(e.to_string()))
    }

    /// Check the document against a catalog without building anything
    pub fn validate(&self, catalog: &ConfigurationCatalog) -> Result<()> {
        if self.version != SNAPSHOT_VERSION {
            return Err(Error::SnapshotFormat(format!(
                "unsupported version {}, expected {}",
                self.version, SNAPSHOT_VERSION
            )));
        }
        grid_cells(self.width, self.height).map_err(Error::SnapshotFormat)?;

        let mut seen = HashSet::with_capacity(self.organisms.len());
        for (index, record) in self.organisms.iter().enumerate() {
            let reject = |reason: String| {
                Err(Error::SnapshotFormat(format!("organism {}: {}", index, reason)))
            };

            if !record.location.is_within(self.width, self.height) {
                return reject(format!("location {} is out of bounds", record.location));
            }
            if !seen.insert(record.location) {
                return reject(format!("location {} is already occupied", record.location));
            }

            let Some(species) = catalog.species(&record.species) else {
                return reject(format!("unknown species '{}'", record.species));
            };
            if species.category != record.category {
                return reject(format!(
                    "category {} does not match species '{}' ({})",
                    record.category, species.name, species.category
                ));
            }

            if !record.is_alive || record.cause_of_death.is_some() {
                return reject("dead organisms are never persisted".to_string());
            }
            if !record.energy_reserve.is_finite() || record.energy_reserve < 0.0 {
                return reject(format!("invalid energy reserve {}", record.energy_reserve));
            }
            if species.energy_dependent && record.energy_reserve == 0.0 {
                return reject("living organism with an empty energy reserve".to_string());
            }
            if record.death_age == 0 || record.age >= record.death_age {
                return reject(format!(
                    "age {} is not below death age {}",
                    record.age, record.death_age
                ));
            }
        }

        Ok(())
    }
}

impl Ecosystem {
    /// Capture the current state
    pub fn serialize(&self) -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            tick: self.tick(),
            width: self.width(),
            height: self.height(),
            organisms: self.organisms().map(OrganismRecord::from).collect(),
        }
    }

    /// Build an ecosystem from a snapshot
    pub fn from_snapshot(
        catalog: ConfigurationCatalog,
        snapshot: &Snapshot,
        seed: u64,
    ) -> Result<Self> {
        catalog.validate()?;
        rehydrate(Arc::new(catalog), snapshot, ChaCha8Rng::seed_from_u64(seed))
    }

    /// Replace the whole state with a snapshot. On error nothing changes.
    pub fn load(&mut self, snapshot: &Snapshot) -> Result<()> {
        let mut replacement = rehydrate(self.shared_catalog(), snapshot, self.rng_state())?;
        replacement.set_revision(self.revision() + 1);
        *self = replacement;
        Ok(())
    }
}

fn rehydrate(
    catalog: Arc<ConfigurationCatalog>,
    snapshot: &Snapshot,
    rng: ChaCha8Rng,
) -> Result<Ecosystem> {
    snapshot.validate(&catalog)?;

    let grid = SpatialGrid::new(snapshot.width, snapshot.height);
    let mut ecosystem = Ecosystem::from_parts(catalog.clone(), grid, rng);

    for record in &snapshot.organisms {
        // Presence was checked by validate
        let Some(species) = catalog.species(&record.species) else {
            return Err(Error::SnapshotFormat(format!(
                "unknown species '{}'",
                record.species
            )));
        };

        let mut organism = Organism::new(
            OrganismId(0),
            species,
            record.location,
            record.death_age,
            record.birth_tick,
        );
        organism.energy_reserve = record.energy_reserve;
        organism.age = record.age;
        organism.state = LifeState::Alive;

        ecosystem
            .add_organism(organism)
            .map_err(|e| Error::SnapshotFormat(e.to_string()))?;
    }

    ecosystem.set_tick(snapshot.tick);

    info!(
        tick = snapshot.tick,
        width = snapshot.width,
        height = snapshot.height,
        population = ecosystem.population(),
        "Ecosystem restored from snapshot"
    );

    Ok(ecosystem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use biotope_core::{ActionCosts, BiotopeConfig, HuntingConfig, LifespanPolicy, SpeciesConfig};

    fn catalog() -> ConfigurationCatalog {
        let species = |name: &str, category: Category, count: usize| SpeciesConfig {
            name: name.to_string(),
            category,
            symbol: None,
            initial_count: count,
            max_lifespan: 25,
            procreation_probability: 0.3,
            initial_energy_reserve: 80.0,
            photosynthesis_capacity: (category == Category::Producer).then_some(4.0),
            max_energy_reserve: None,
            energy_dependent: true,
        };
        ConfigurationCatalog {
            biotope: BiotopeConfig {
                width: 8,
                height: 6,
            },
            species: vec![
                species("grass", Category::Producer, 8),
                species("rabbit", Category::Prey, 4),
                species("fox", Category::Predator, 2),
            ],
            actions: ActionCosts::default(),
            hunting: HuntingConfig::default(),
            lifespan_policy: LifespanPolicy::Sampled,
        }
    }

    fn record(x: i32, y: i32, species: &str, category: Category) -> OrganismRecord {
        OrganismRecord {
            location: Coordinate::new(x, y),
            species: species.to_string(),
            category,
            energy_reserve: 20.0,
            age: 2,
            death_age: 10,
            is_alive: true,
            cause_of_death: None,
            birth_tick: 0,
        }
    }

    fn document(organisms: Vec<OrganismRecord>) -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            tick: 17,
            width: 4,
            height: 4,
            organisms,
        }
    }

    #[test]
    fn test_serialize_load_serialize_is_stable() {
        let mut ecosystem = Ecosystem::new(catalog(), 9).unwrap();
        for _ in 0..5 {
            ecosystem.evolve();
        }

        let first = ecosystem.serialize();
        let restored = Ecosystem::from_snapshot(catalog(), &first, 0).unwrap();
        assert_eq!(restored.serialize(), first);
        assert_eq!(restored.tick(), ecosystem.tick());
        assert_eq!(restored.free_count(), ecosystem.free_count());
        assert!(restored.is_consistent());
    }

    #[test]
    fn test_json_and_binary_encodings() {
        let ecosystem = Ecosystem::new(catalog(), 3).unwrap();
        let snapshot = ecosystem.serialize();

        let json = snapshot.to_json().unwrap();
        assert_eq!(Snapshot::from_json(&json).unwrap(), snapshot);

        let bytes = snapshot.to_bytes().unwrap();
        assert_eq!(Snapshot::from_bytes(&bytes).unwrap(), snapshot);
    }

    #[test]
    fn test_birth_tick_is_optional() {
        let json = r#"{
            "version": 1, "tick": 3, "width": 4, "height": 4,
            "organisms": [{
                "location": {"x": 1, "y": 2}, "species": "grass", "category": "producer",
                "energy_reserve": 5.0, "age": 1, "death_age": 9,
                "is_alive": true, "cause_of_death": null
            }]
        }"#;
        let snapshot = Snapshot::from_json(json).unwrap();
        assert_eq!(snapshot.organisms[0].birth_tick, 0);
        snapshot.validate(&catalog()).unwrap();
    }

    #[test]
    fn test_garbage_is_a_format_error() {
        assert!(matches!(
            Snapshot::from_json("{ not json"),
            Err(Error::SnapshotFormat(_))
        ));
        assert!(matches!(
            Snapshot::from_bytes(&[1, 2, 3]),
            Err(Error::SnapshotFormat(_))
        ));
        assert!(matches!(
            Snapshot::from_json_slice(b"{\"version\": \"\xff\"}"),
            Err(Error::SnapshotFormat(_))
        ));
    }

    #[test]
    fn test_validation_rejections() {
        let catalog = catalog();
        let rejected = |snapshot: Snapshot| {
            matches!(snapshot.validate(&catalog), Err(Error::SnapshotFormat(_)))
        };

        let mut wrong_version = document(vec![]);
        wrong_version.version = 2;
        assert!(rejected(wrong_version));

        let mut flat = document(vec![]);
        flat.height = 0;
        assert!(rejected(flat));

        let mut huge = document(vec![]);
        huge.width = 70_000;
        huge.height = 70_000;
        assert!(rejected(huge));

        assert!(rejected(document(vec![record(4, 0, "grass", Category::Producer)])));
        assert!(rejected(document(vec![
            record(1, 1, "grass", Category::Producer),
            record(1, 1, "rabbit", Category::Prey),
        ])));
        assert!(rejected(document(vec![record(0, 0, "unicorn", Category::Prey)])));
        assert!(rejected(document(vec![record(0, 0, "fox", Category::Prey)])));

        let mut dead = record(0, 0, "fox", Category::Predator);
        dead.is_alive = false;
        dead.cause_of_death = Some(CauseOfDeath::Starvation);
        assert!(rejected(document(vec![dead])));

        let mut drained = record(0, 0, "fox", Category::Predator);
        drained.energy_reserve = 0.0;
        assert!(rejected(document(vec![drained])));

        let mut ancient = record(0, 0, "fox", Category::Predator);
        ancient.age = 10;
        assert!(rejected(document(vec![ancient])));

        assert!(!rejected(document(vec![record(3, 3, "fox", Category::Predator)])));
    }

    #[test]
    fn test_failed_load_leaves_ecosystem_untouched() {
        let mut ecosystem = Ecosystem::new(catalog(), 5).unwrap();
        ecosystem.evolve();
        let before = ecosystem.serialize();
        let revision = ecosystem.revision();

        let bad = document(vec![
            record(0, 0, "grass", Category::Producer),
            record(9, 9, "rabbit", Category::Prey),
        ]);
        assert!(ecosystem.load(&bad).is_err());

        assert_eq!(ecosystem.serialize(), before);
        assert_eq!(ecosystem.revision(), revision);
    }

    #[test]
    fn test_oversized_grid_load_is_rejected() {
        let mut ecosystem = Ecosystem::new(catalog(), 5).unwrap();
        let before = ecosystem.serialize();

        let mut huge = document(vec![]);
        huge.width = 70_000;
        huge.height = 70_000;
        assert!(matches!(ecosystem.load(&huge), Err(Error::SnapshotFormat(_))));
        assert!(matches!(
            Ecosystem::from_snapshot(catalog(), &huge, 1),
            Err(Error::SnapshotFormat(_))
        ));
        assert_eq!(ecosystem.serialize(), before);
    }

    #[test]
    fn test_load_replaces_state() {
        let mut ecosystem = Ecosystem::new(catalog(), 5).unwrap();
        let revision = ecosystem.revision();

        let snapshot = document(vec![
            record(0, 0, "grass", Category::Producer),
            record(1, 0, "rabbit", Category::Prey),
        ]);
        ecosystem.load(&snapshot).unwrap();

        assert_eq!(ecosystem.tick(), 17);
        assert_eq!(ecosystem.width(), 4);
        assert_eq!(ecosystem.population(), 2);
        assert_eq!(ecosystem.free_count(), 14);
        assert!(ecosystem.revision() > revision);
        assert_eq!(
            ecosystem.organism_at(Coordinate::new(1, 0)).unwrap().species,
            "rabbit"
        );
        assert!(ecosystem.is_consistent());
    }
}
