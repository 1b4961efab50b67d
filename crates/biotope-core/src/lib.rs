//! Core types, configuration and errors for the Biotope ecosystem simulator.

pub mod types;
pub mod config;
pub mod error;
pub mod settings;

pub use error::{Error, Result};
pub use types::*;
pub use config::*;
pub use settings::SettingsNode;
