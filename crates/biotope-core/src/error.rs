//! Error types for the simulation.

use crate::{Coordinate, OrganismId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A configuration parameter is missing or out of range. Construction
    /// aborts and no ecosystem is produced.
    #[error("Configuration error at `{key}`: {reason}")]
    Configuration { key: String, reason: String },

    /// The grid has no free cell left. Callers inside a tick treat this as
    /// "skip the action".
    #[error("No free space left in the biotope")]
    NoFreeSpace,

    #[error("Invalid coordinate {coordinate}: {reason}")]
    InvalidCoordinate {
        coordinate: Coordinate,
        reason: String,
    },

    #[error("No organism with id {0}")]
    UnknownOrganism(OrganismId),

    /// Only living organisms can be registered with an ecosystem
    #[error("Cannot register a dead {species} at {location}")]
    DeadOrganism { species: String, location: Coordinate },

    /// A persisted snapshot could not be applied. The load is rejected as a
    /// whole.
    #[error("Snapshot format error: {0}")]
    SnapshotFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    pub fn configuration(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Configuration {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_coordinate(coordinate: Coordinate, reason: impl Into<String>) -> Self {
        Error::InvalidCoordinate {
            coordinate,
            reason: reason.into(),
        }
    }

    /// Recoverable conditions are part of normal ecological dynamics.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::NoFreeSpace)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
