// Environment variable loading

use crate::{ConfigError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::env;

/// Prefix used by `ServerConfig` and the layered loader
pub const DEFAULT_PREFIX: &str = "TRELLIS";

/// Environment variable loader
///
/// With a prefix, only matching variables are kept and the prefix is
/// stripped: `TRELLIS_MAX_BODY_BYTES` becomes `max_body_bytes`.
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    /// Load all (matching) variables of the process environment
    ///
    /// Values stay raw; `ConfigManager` types each one against the value it
    /// replaces.
    pub fn load(&self) -> Result<HashMap<String, String>> {
        Ok(self.load_from(env::vars()))
    }

    /// Load from an explicit set of variables
    pub fn load_from<I, K, V>(&self, vars: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = HashMap::new();

        for (key, value) in vars {
            let Some(key) = self.strip(key.as_ref()) else {
                continue;
            };
            config.insert(key, value.as_ref().to_string());
        }

        config
    }

    /// Load a specific environment variable
    pub fn load_var(&self, key: &str) -> Result<String> {
        env::var(self.full_key(key)).map_err(ConfigError::EnvError)
    }

    /// Load with default value
    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }

    fn full_key(&self, key: &str) -> String {
        match self.prefix {
            Some(ref prefix) => format!("{}_{}", prefix, key.to_uppercase()),
            None => key.to_uppercase(),
        }
    }

    fn strip(&self, key: &str) -> Option<String> {
        let Some(ref prefix) = self.prefix else {
            return Some(key.to_lowercase());
        };
        let rest = key.strip_prefix(prefix.as_str())?.strip_prefix('_')?;
        if rest.is_empty() {
            return None;
        }
        Some(rest.to_lowercase())
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(Some(DEFAULT_PREFIX.to_string()))
    }
}

/// Type a raw environment value after the value it replaces: a string stays
/// a string, a number or boolean is parsed as one. A value that does not
/// parse is kept as a string so deserialization reports the bad field.
/// With nothing to replace, integers and booleans are guessed.
pub(crate) fn coerce_as(existing: Option<&Value>, raw: &str) -> Value {
    let trimmed = raw.trim();
    match existing {
        Some(Value::String(_)) => Value::String(raw.to_string()),
        Some(Value::Number(_)) => trimmed
            .parse::<u64>()
            .map(Value::from)
            .or_else(|_| trimmed.parse::<i64>().map(Value::from))
            .ok()
            .or_else(|| {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
            })
            .unwrap_or_else(|| Value::String(raw.to_string())),
        Some(Value::Bool(_)) => match trimmed.to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(raw.to_string()),
        },
        _ => coerce(raw),
    }
}

fn coerce(raw: &str) -> Value {
    let trimmed = raw.trim();
    if let Ok(n) = trimmed.parse::<u64>() {
        return Value::from(n);
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return Value::from(n);
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_is_stripped_and_lowercased() {
        let loader = EnvLoader::default();
        let vars = loader.load_from([
            ("TRELLIS_MAX_BODY_BYTES", "1024"),
            ("TRELLIS_HOST", "127.0.0.1"),
            ("TRELLISH_OTHER", "x"),
            ("TRELLIS_", "x"),
            ("PATH", "/usr/bin"),
        ]);

        assert_eq!(vars.len(), 2);
        assert_eq!(vars["max_body_bytes"], "1024");
        assert_eq!(vars["host"], "127.0.0.1");
    }

    #[test]
    fn test_no_prefix_keeps_everything() {
        let loader = EnvLoader::new(None);
        let vars = loader.load_from([("Some_Key", "v")]);
        assert_eq!(vars["some_key"], "v");
    }

    #[test]
    fn test_coercion() {
        assert_eq!(coerce("8080"), Value::from(8080u64));
        assert_eq!(coerce("-3"), Value::from(-3i64));
        assert_eq!(coerce("TRUE"), Value::Bool(true));
        assert_eq!(coerce("false"), Value::Bool(false));
        assert_eq!(coerce("1.5"), Value::from("1.5"));
        assert_eq!(coerce("api"), Value::from("api"));
    }

    #[test]
    fn test_coercion_follows_replaced_value() {
        let text = Value::from("");
        let number = Value::from(8080u64);
        let flag = Value::Bool(false);

        assert_eq!(coerce_as(Some(&text), "2024"), Value::from("2024"));
        assert_eq!(coerce_as(Some(&text), "true"), Value::from("true"));
        assert_eq!(coerce_as(Some(&number), "9000"), Value::from(9000u64));
        assert_eq!(coerce_as(Some(&number), "-1"), Value::from(-1i64));
        assert_eq!(coerce_as(Some(&number), "0.5"), Value::from(0.5));
        assert_eq!(coerce_as(Some(&number), "nine"), Value::from("nine"));
        assert_eq!(coerce_as(Some(&flag), "TRUE"), Value::Bool(true));
        assert_eq!(coerce_as(Some(&flag), "1"), Value::from("1"));
        assert_eq!(coerce_as(None, "2024"), Value::from(2024u64));
        assert_eq!(coerce_as(Some(&Value::Null), "yes"), Value::from("yes"));
    }

    #[test]
    fn test_env_loader_with_default() {
        let loader = EnvLoader::new(None);
        let value = loader.load_var_or("NONEXISTENT_VAR_12345", "default");

        assert_eq!(value, "default");
    }

    #[test]
    fn test_env_loader_missing_var() {
        let loader = EnvLoader::default();
        assert!(loader.load_var("MISSING_VAR_67890").is_err());
    }
}
