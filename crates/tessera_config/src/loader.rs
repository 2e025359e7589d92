//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::SimConfig;
use std::collections::HashSet;
use std::path::Path;

/// File name looked up by [`load_config`].
pub const CONFIG_FILE_NAME: &str = "tessera.toml";

/// Loads and validates a `tessera.toml` configuration from a directory.
///
/// Reads `<dir>/tessera.toml`, parses it, and validates its values.
pub fn load_config(dir: &Path) -> Result<SimConfig, ConfigError> {
    let config_path = dir.join(CONFIG_FILE_NAME);
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `tessera.toml` configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<SimConfig, ConfigError> {
    let config: SimConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Checks ceilings are usable and trace destinations are distinct.
fn validate_config(config: &SimConfig) -> Result<(), ConfigError> {
    if config.simulation.max_settle_passes == 0 {
        return Err(ConfigError::ValidationError(
            "simulation.max_settle_passes must be at least 1".to_string(),
        ));
    }
    if config.simulation.max_deltas == 0 {
        return Err(ConfigError::ValidationError(
            "simulation.max_deltas must be at least 1".to_string(),
        ));
    }
    let mut paths = HashSet::new();
    for trace in &config.trace {
        if trace.path.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("trace.path".to_string()));
        }
        if !paths.insert(&trace.path) {
            return Err(ConfigError::ValidationError(format!(
                "trace path '{}' is listed more than once",
                trace.path.display()
            )));
        }
        if trace.signals.as_ref().is_some_and(Vec::is_empty) {
            return Err(ConfigError::ValidationError(format!(
                "trace '{}' selects no signals",
                trace.path.display()
            )));
        }
    }
    Ok(())
}
