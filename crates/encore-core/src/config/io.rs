//! YAML configuration files
//!
//! Loading never fails: a missing or unreadable file yields defaults so the
//! player can always start.

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Load a configuration from `path`, falling back to `T::default()`
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("No config at {:?}, using defaults", path);
        return T::default();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            log::warn!("Failed to read config {:?}: {}, using defaults", path, e);
            return T::default();
        }
    };

    match serde_yaml::from_str::<T>(&contents) {
        Ok(config) => {
            log::info!("Loaded config from {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("Invalid config {:?}: {}, using defaults", path, e);
            T::default()
        }
    }
}

/// Write `config` to `path` as YAML, creating parent directories
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write config {:?}", path))?;

    log::info!("Saved config to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config: EngineConfig = load_config(Path::new("/nonexistent/encore/config.yaml"));
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut config = EngineConfig::default();
        config.playback.poll_interval_ms = 50;
        config.analysis.tolerance_cents = 30.0;
        config.metronome.enabled = true;

        save_config(&config, &path).unwrap();
        let loaded: EngineConfig = load_config(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_yaml_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "playback: [not, a, map]").unwrap();

        let config: EngineConfig = load_config(&path);
        assert_eq!(config, EngineConfig::default());
    }
}
