//! Configuration loading and validation

mod schema;

pub use schema::*;

use anyhow::{Context, Result};
use log::info;
use std::path::Path;

/// Load configuration from a YAML file
pub fn load_config(path: &Path) -> Result<SynthConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {:?}", path))?;
    let config: SynthConfig = serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse config {:?}", path))?;
    config.validate()?;
    Ok(config)
}

/// Load configuration, falling back to defaults when the file does not exist
pub fn load_or_default(path: &Path) -> Result<SynthConfig> {
    if path.exists() {
        load_config(path)
    } else {
        info!("No config at {:?}, using defaults", path);
        Ok(SynthConfig::default())
    }
}

/// The example configuration written by `myco init`
pub const EXAMPLE_CONFIG: &str = include_str!("../../myco.example.yaml");
