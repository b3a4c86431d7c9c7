// Typed server settings built from the layered configuration

use crate::{ConfigError, ConfigManager, ConfigValidator, DEFAULT_PREFIX, Result, Validate};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::sync::Arc;
use trellis_core::logging::{LogConfig, LogFormat, LogLevel};
use trellis_core::{InterfaceConflictPolicy, ResourceApplication, RouteTable, Server};

/// Settings for a Trellis server
///
/// Every field has a default, so a partial file or a handful of
/// `TRELLIS_*` variables is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Prefix of every route, e.g. `api`
    pub application_path: String,
    pub max_body_bytes: usize,
    pub interface_conflict: InterfaceConflictPolicy,
    pub log_level: LogLevel,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            application_path: String::new(),
            max_body_bytes: Server::DEFAULT_MAX_BODY_BYTES,
            interface_conflict: InterfaceConflictPolicy::default(),
            log_level: LogLevel::default(),
            log_format: LogFormat::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults, then each file in order, then `./.env`, then `TRELLIS_*`
    /// environment variables.
    pub fn load<P: AsRef<Path>>(files: &[P]) -> Result<Self> {
        let manager = Self::layers(files)?;
        manager.load_dotenv(None)?;
        manager.load_env()?;
        Self::from_manager(&manager)
    }

    /// Defaults and files only
    pub fn layers<P: AsRef<Path>>(files: &[P]) -> Result<ConfigManager> {
        let manager = ConfigManager::with_prefix(DEFAULT_PREFIX);
        manager.load_defaults(&Self::default())?;
        for file in files {
            manager.load_file(file)?;
        }
        Ok(manager)
    }

    pub fn from_manager(manager: &ConfigManager) -> Result<Self> {
        manager.load_validated()
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| {
                ConfigError::ValidationError(format!("host `{}`: {}", self.host, e))
            })?
            .next()
            .ok_or_else(|| {
                ConfigError::ValidationError(format!("host `{}` resolves to nothing", self.host))
            })
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig::new().level(self.log_level).format(self.log_format)
    }

    /// Application path and conflict policy
    pub fn apply(&self, application: ResourceApplication) -> ResourceApplication {
        application
            .application_path(self.application_path.clone())
            .conflict_policy(self.interface_conflict)
    }

    /// Bind address and body limit
    pub fn server(&self, table: Arc<RouteTable>) -> Result<Server> {
        Ok(Server::new(table)
            .bind_addr(self.socket_addr()?)
            .max_body_bytes(self.max_body_bytes))
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> Result<()> {
        ConfigValidator::not_empty(&self.host, "host")?;
        ConfigValidator::is_path(&self.application_path, "application_path")?;
        ConfigValidator::in_range(self.max_body_bytes, 1, usize::MAX, "max_body_bytes")?;
        Ok(())
    }
}
