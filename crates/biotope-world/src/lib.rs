//! Ecosystem simulation engine.
//!
//! A bounded grid where producers photosynthesize, prey graze, predators
//! hunt, and everything ages and reproduces one tick at a time.

pub mod ecosystem;
pub mod grid;
pub mod organism;
pub mod shared;
pub mod snapshot;

pub use ecosystem::{Ecosystem, TickSummary};
pub use grid::SpatialGrid;
pub use organism::{ActionReport, Habitat, Organism};
pub use shared::{Frame, FrameCursor, SharedEcosystem};
pub use snapshot::{OrganismRecord, Snapshot, SNAPSHOT_VERSION};
