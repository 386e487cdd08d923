use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::Result;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    /// Key holding the JSON array of records.
    pub records_key: String,
    /// Legacy key holding the display order of canonical ids.
    pub order_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("favorites.db"),
            records_key: "favorites.records".to_string(),
            order_key: "favorites.order".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DebounceConfig {
    pub save_ms: u64,
    pub sync_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            save_ms: 150,
            sync_ms: 100,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FlusherConfig {
    pub interval_ms: u64,
}

impl Default for FlusherConfig {
    fn default() -> Self {
        Self { interval_ms: 25 }
    }
}

impl FlusherConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct FavoritesConfig {
    pub storage: StorageConfig,
    pub debounce: DebounceConfig,
    pub flusher: FlusherConfig,
}

/// Load the config at `path`, writing the defaults there first if it is missing.
pub fn load_config(path: &Path) -> Result<FavoritesConfig> {
    if !path.exists() {
        let config = FavoritesConfig::default();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string(&config)?)?;
        return Ok(config);
    }

    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use tempfile::tempdir;

    #[test]
    fn test_missing_config_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("favlink.toml");

        let config = load_config(&path).unwrap();
        assert_eq!(config, FavoritesConfig::default());
        assert!(path.exists());
        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("favlink.toml");
        fs::write(&path, "[debounce]\nsave_ms = 40\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.debounce.save_ms, 40);
        assert_eq!(config.debounce.sync_ms, 100);
        assert_eq!(config.storage.records_key, "favorites.records");
    }

    #[test]
    fn test_flusher_interval_from_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("favlink.toml");
        fs::write(&path, "[flusher]\ninterval_ms = 40\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.flusher.interval(), Duration::from_millis(40));
        assert_eq!(FlusherConfig { interval_ms: 0 }.interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("favlink.toml");
        fs::write(&path, "[debounce\nsave_ms = ").unwrap();

        assert!(matches!(load_config(&path), Err(Error::Config(_))));
    }
}
