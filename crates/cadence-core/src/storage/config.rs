//! TOML-based application configuration.
//!
//! Stores:
//! - Engine timing knobs (retention windows, purchase jitter, tick cadence)
//! - Calendar-day boundary offset
//! - Storage locations (cache database, catalog file)
//!
//! Configuration is stored at `~/.config/cadence/config.toml`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::cache::CacheRetention;
use crate::error::ConfigError;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Assignment history older than this is pruned on read.
    #[serde(default = "default_assignment_retention_hours")]
    pub assignment_retention_hours: i64,
    /// Completion records older than this no longer anchor cooldowns.
    #[serde(default = "default_completion_retention_days")]
    pub completion_retention_days: i64,
    /// Bound of the random offset applied to synthesized purchase timings.
    #[serde(default = "default_purchase_jitter_secs")]
    pub purchase_jitter_secs: u64,
    /// Mixed into the jitter seed; change it to reshuffle purchase timings.
    #[serde(default)]
    pub jitter_salt: String,
    /// Re-evaluation cadence for `watch`.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Offset from UTC at which the calendar day rolls over.
    #[serde(default)]
    pub utc_offset_hours: i32,
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Cache database file name, inside the data directory.
    #[serde(default = "default_database_file")]
    pub database_file: String,
    /// Catalog file used by the CLI gateway. Relative paths resolve against the data directory.
    #[serde(default = "default_catalog_file")]
    pub catalog_file: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/cadence/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_assignment_retention_hours() -> i64 {
    24
}
fn default_completion_retention_days() -> i64 {
    7
}
fn default_purchase_jitter_secs() -> u64 {
    30
}
fn default_tick_interval_ms() -> u64 {
    1000
}
fn default_database_file() -> String {
    "cadence.db".into()
}
fn default_catalog_file() -> String {
    "catalog.json".into()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            assignment_retention_hours: default_assignment_retention_hours(),
            completion_retention_days: default_completion_retention_days(),
            purchase_jitter_secs: default_purchase_jitter_secs(),
            jitter_salt: String::new(),
            tick_interval_ms: default_tick_interval_ms(),
            utc_offset_hours: 0,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_file: default_database_file(),
            catalog_file: default_catalog_file(),
        }
    }
}

impl EngineConfig {
    pub fn retention(&self) -> CacheRetention {
        CacheRetention {
            assignment_hours: self.assignment_retention_hours,
            completion_days: self.completion_retention_days,
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<i64>() {
                            serde_json::Value::Number(n.into())
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as integer")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        return Err(invalid("cannot set a section, set one of its keys".into()));
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        data_dir()
            .map(|dir| dir.join("config.toml"))
            .map_err(|e| ConfigError::LoadFailed {
                path: PathBuf::from("config.toml"),
                message: e.to_string(),
            })
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path,
                message: e.to_string(),
            }),
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key and persist. Returns error if key is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }

    /// Set a config value in memory only.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Absolute catalog path.
    pub fn catalog_path(&self) -> Result<PathBuf, ConfigError> {
        let path = PathBuf::from(&self.storage.catalog_file);
        if path.is_absolute() {
            return Ok(path);
        }
        data_dir()
            .map(|dir| dir.join(path))
            .map_err(|e| ConfigError::LoadFailed {
                path: PathBuf::from(&self.storage.catalog_file),
                message: e.to_string(),
            })
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}
