//! Per-environment connection settings and the provider that supplies them

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::{ConsoleError, Result};

/// Host/port pair a command is sent to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port`; the port is taken after the last colon
    pub fn parse(s: &str) -> Option<Self> {
        let (host, port) = s.rsplit_once(':')?;
        if host.is_empty() {
            return None;
        }
        Some(Self::new(host, port.parse().ok()?))
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Connection settings of one environment
///
/// Owned by the external configuration store; read-only here.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub tls_enabled: bool,
    #[serde(default)]
    pub cluster_enabled: bool,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
            tls_enabled: false,
            cluster_enabled: false,
        }
    }

    pub fn cluster(mut self, enabled: bool) -> Self {
        self.cluster_enabled = enabled;
        self
    }

    /// The configured endpoint, also used as the cluster seed node
    pub fn address(&self) -> ServerAddress {
        ServerAddress::new(self.host.clone(), self.port)
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("tls_enabled", &self.tls_enabled)
            .field("cluster_enabled", &self.cluster_enabled)
            .finish()
    }
}

/// Source of connection settings, keyed by environment id
///
/// Unknown ids must fail with [`ConsoleError::ConfigNotFound`].
pub trait ConnectionConfigProvider: Send + Sync {
    fn get_config(&self, id: &str) -> Result<ConnectionConfig>;
}

#[derive(Debug, Deserialize)]
struct EnvironmentsFile {
    environments: HashMap<String, ConnectionConfig>,
}

/// In-memory provider, optionally loaded from a JSON file:
///
/// ```text
/// { "environments": { "local": { "host": "127.0.0.1", "port": 6379 } } }
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticConfigProvider {
    environments: HashMap<String, ConnectionConfig>,
}

impl StaticConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: impl Into<String>, config: ConnectionConfig) -> Self {
        self.insert(id, config);
        self
    }

    pub fn insert(&mut self, id: impl Into<String>, config: ConnectionConfig) {
        self.environments.insert(id.into(), config);
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: EnvironmentsFile = serde_json::from_str(json)
            .map_err(|e| ConsoleError::Config(format!("Invalid environments file: {}", e)))?;
        Ok(Self {
            environments: file.environments,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ConsoleError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.environments.keys().map(String::as_str)
    }
}

impl ConnectionConfigProvider for StaticConfigProvider {
    fn get_config(&self, id: &str) -> Result<ConnectionConfig> {
        self.environments
            .get(id)
            .cloned()
            .ok_or_else(|| ConsoleError::ConfigNotFound(id.to_string()))
    }
}
