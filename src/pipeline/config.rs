// src/pipeline/config.rs
use crate::error::MergeError;
use quire_core::MergeConfig;
use std::fs;
use std::io;
use std::path::Path;

/// Reads a JSON merge configuration. Missing fields take their defaults.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<MergeConfig, MergeError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| {
        MergeError::Io(io::Error::new(
            e.kind(),
            format!("Failed to read config from '{}': {}", path.display(), e),
        ))
    })?;
    let config = MergeConfig::from_json(&text)?;
    log::debug!("loaded merge config from {}", path.display());
    Ok(config)
}
