// Configuration management for Trellis

pub mod env;
pub mod error;
pub mod loader;
pub mod server;
pub mod validation;

pub use env::{DEFAULT_PREFIX, EnvLoader};
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use server::ServerConfig;
pub use validation::{ConfigValidator, Validate};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Layered key/value configuration
///
/// Later loads override earlier ones key by key, so the usual order is
/// defaults, then files, then `.env`, then the process environment.
#[derive(Clone, Default)]
pub struct ConfigManager {
    config: Arc<RwLock<HashMap<String, Value>>>,
    env_prefix: Option<String>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only environment variables starting with `{prefix}_` are loaded
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            config: Arc::default(),
            env_prefix: Some(prefix.into()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Value>> {
        self.config.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Value>> {
        self.config.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn extend(&self, source: &str, entries: impl IntoIterator<Item = (String, Value)>) {
        let mut config = self.write();
        let mut count = 0usize;
        for (key, value) in entries {
            config.insert(key, value);
            count += 1;
        }
        debug!(source, keys = count, "configuration layer loaded");
    }

    /// Like `extend` for raw string values, typing each after the value it
    /// replaces.
    fn extend_raw(&self, source: &str, entries: impl IntoIterator<Item = (String, String)>) {
        let mut config = self.write();
        let mut count = 0usize;
        for (key, raw) in entries {
            let value = env::coerce_as(config.get(&key), &raw);
            config.insert(key, value);
            count += 1;
        }
        debug!(source, keys = count, "configuration layer loaded");
    }

    /// Seed every top-level field of `defaults`
    pub fn load_defaults<T: Serialize>(&self, defaults: &T) -> Result<()> {
        match serde_json::to_value(defaults)
            .map_err(|e| ConfigError::SerializationError(e.to_string()))?
        {
            Value::Object(map) => {
                self.extend("defaults", map);
                Ok(())
            }
            _ => Err(ConfigError::SerializationError(
                "defaults must serialize to a table".to_string(),
            )),
        }
    }

    /// Load configuration from environment variables
    pub fn load_env(&self) -> Result<()> {
        let vars = self.env_loader().load()?;
        self.extend_raw("environment", vars);
        Ok(())
    }

    /// Same as `load_env` over an explicit variable set
    pub fn load_env_from<I, K, V>(&self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let vars = self.env_loader().load_from(vars);
        self.extend_raw("environment", vars);
    }

    /// Load prefixed variables from a `.env` file without touching the
    /// process environment. With no path a missing `./.env` is ignored.
    pub fn load_dotenv(&self, path: Option<&Path>) -> Result<()> {
        let iter = match path {
            Some(path) => dotenvy::from_path_iter(path),
            None => match dotenvy::dotenv_iter() {
                Err(e) if e.not_found() => return Ok(()),
                other => other,
            },
        }
        .map_err(|e| ConfigError::LoadError(e.to_string()))?;

        let mut vars = Vec::new();
        for item in iter {
            vars.push(item.map_err(|e| ConfigError::ParseError(e.to_string()))?);
        }
        let vars = self.env_loader().load_from(vars);
        self.extend_raw("dotenv", vars);
        Ok(())
    }

    /// Load a file, detecting its format from the extension
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let loader = ConfigLoader::auto(path.as_ref())?;
        self.load_file_as(path, loader.format())
    }

    pub fn load_file_as(&self, path: impl AsRef<Path>, format: FileFormat) -> Result<()> {
        let data = ConfigLoader::new(format).load_file(path.as_ref())?;
        let Value::Object(map) = data else {
            return Ok(());
        };
        if format == FileFormat::Env {
            self.extend_raw(
                "file",
                map.into_iter().map(|(k, v)| match v {
                    Value::String(raw) => (k, raw),
                    other => (k, other.to_string()),
                }),
            );
        } else {
            self.extend("file", map);
        }
        Ok(())
    }

    fn env_loader(&self) -> EnvLoader {
        EnvLoader::new(self.env_prefix.clone())
    }

    /// Set a configuration value
    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<()> {
        let json_value = serde_json::to_value(value)
            .map_err(|e| ConfigError::SerializationError(e.to_string()))?;

        self.write().insert(key.to_string(), json_value);
        Ok(())
    }

    /// Get a configuration value
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let config = self.read();

        let value = config
            .get(key)
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;

        serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::DeserializationError(format!("{}: {}", key, e)))
    }

    /// Get a configuration value with default
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn get_string(&self, key: &str) -> Result<String> {
        self.get(key)
    }

    pub fn get_int(&self, key: &str) -> Result<i64> {
        self.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.get(key)
    }

    pub fn get_float(&self, key: &str) -> Result<f64> {
        self.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Copy every key of `other` over this manager's
    pub fn merge(&self, other: &ConfigManager) {
        if Arc::ptr_eq(&self.config, &other.config) {
            return;
        }
        let entries: Vec<_> = other
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.extend("merge", entries);
    }

    /// Deserialize the whole map into `T` and validate it
    pub fn load_validated<T: DeserializeOwned + Validate>(&self) -> Result<T> {
        let json_value = Value::Object(
            self.read()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );

        let validated: T = serde_json::from_value(json_value)
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;

        validated.validate()?;

        Ok(validated)
    }
}
