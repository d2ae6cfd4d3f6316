//! Generic YAML load/save used for configuration and effect state

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Load a YAML file
///
/// A missing file yields the default value. An unreadable or invalid file
/// logs a warning and also yields the default value.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    log::info!("load_config: Loading from {:?}", path);

    if !path.exists() {
        log::info!("load_config: {:?} doesn't exist, using defaults", path);
        return T::default();
    }

    match read_yaml(path) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("load_config: {:#}, using defaults", e);
            T::default()
        }
    }
}

/// Read and parse a YAML file, reporting any failure
pub fn read_yaml<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {:?}", path))?;
    serde_yaml::from_str::<T>(&contents).with_context(|| format!("Failed to parse {:?}", path))
}

/// Save a value as YAML, creating parent directories
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    log::info!("save_config: Saving to {:?}", path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize to YAML")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write file: {:?}", path))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct TestConfig {
        value: i32,
        name: String,
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let config: TestConfig = load_config(Path::new("/nonexistent/path/config.yaml"));
        assert_eq!(config, TestConfig::default());
    }

    #[test]
    fn test_load_invalid_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "value: [not a number").unwrap();

        let config: TestConfig = load_config(&path);
        assert_eq!(config, TestConfig::default());
        assert!(read_yaml::<TestConfig>(&path).is_err());
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("test-config.yaml");

        let config = TestConfig {
            value: 42,
            name: "test".to_string(),
        };
        save_config(&config, &path).unwrap();
        let loaded: TestConfig = load_config(&path);
        assert_eq!(loaded, config);
    }
}
