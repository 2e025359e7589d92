//! Parsing and validation of `tessera.toml` simulation configuration files.
//!
//! This crate reads the configuration file and produces a strongly-typed
//! [`SimConfig`] holding the simulator's iteration ceilings, an optional run
//! time limit, and the list of trace destinations.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE_NAME};
pub use types::*;
