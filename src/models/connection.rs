//! Connection-related data models.
//!
//! This module defines types for MySQL connection configuration and state.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default MySQL port.
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

/// How the MySQL server is reached. Only affects host/port defaults and reporting.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    #[default]
    Direct,
    /// MySQL published from a local container
    Docker,
    Remote,
}

impl ConnectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Docker => "docker",
            Self::Remote => "remote",
        }
    }
}

impl std::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for one MySQL server.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MySqlConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Contains sensitive data - never log
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Maximum pooled connections
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquire_timeout_ms: Option<u64>,
    /// Per-statement timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Docker only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    /// Docker only: host port the container publishes MySQL on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_port: Option<u16>,
}

impl MySqlConnectionConfig {
    /// Create a config with the required fields; everything else unset.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        database: Option<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
            database,
            connection_limit: None,
            acquire_timeout_ms: None,
            timeout_ms: None,
            container_name: None,
            docker_port: None,
        }
    }

    /// Apply connection-type specific defaults.
    ///
    /// Docker connections default the host to `localhost` and prefer the
    /// published `docker_port` over `port`.
    pub fn for_connection_type(mut self, connection_type: ConnectionType) -> Self {
        if connection_type == ConnectionType::Docker {
            if self.host.trim().is_empty() {
                self.host = "localhost".to_string();
            }
            self.port = self
                .docker_port
                .or(Some(self.port).filter(|p| *p != 0))
                .unwrap_or(DEFAULT_MYSQL_PORT);
        }
        self
    }

    /// `host:port/database` (database empty when unset).
    pub fn display_target(&self) -> String {
        format!(
            "{}:{}/{}",
            self.host,
            self.port,
            self.database.as_deref().unwrap_or("")
        )
    }

    /// Database name for display ("not specified" when unset).
    pub fn database_label(&self) -> &str {
        self.database.as_deref().unwrap_or("not specified")
    }
}

impl std::fmt::Debug for MySqlConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("connection_limit", &self.connection_limit)
            .field("container_name", &self.container_name)
            .finish_non_exhaustive()
    }
}

/// Connection details safe to show to a client (no secrets).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub connection_type: ConnectionType,
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
}

/// Outcome of a liveness probe against a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionTestResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionTestResult {
    pub fn ok(connection_time_ms: u64, server_version: Option<String>) -> Self {
        Self {
            success: true,
            message: "Connection OK".to_string(),
            connection_time_ms: Some(connection_time_ms),
            server_version,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: "Connection failed".to_string(),
            connection_time_ms: None,
            server_version: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MySqlConnectionConfig {
        MySqlConnectionConfig::new("db.internal", 3307, "app", "s3cret", Some("shop".into()))
    }

    #[test]
    fn test_connection_type_serde() {
        let t: ConnectionType = serde_json::from_str("\"docker\"").unwrap();
        assert_eq!(t, ConnectionType::Docker);
        assert_eq!(ConnectionType::default(), ConnectionType::Direct);
        assert_eq!(ConnectionType::Remote.to_string(), "remote");
    }

    #[test]
    fn test_debug_masks_password() {
        let debug = format!("{:?}", sample());
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_password_not_serialized() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert!(!json.contains("s3cret"));
    }

    #[test]
    fn test_display_target() {
        assert_eq!(sample().display_target(), "db.internal:3307/shop");
        let mut no_db = sample();
        no_db.database = None;
        assert_eq!(no_db.display_target(), "db.internal:3307/");
        assert_eq!(no_db.database_label(), "not specified");
    }

    #[test]
    fn test_docker_prefers_published_port() {
        let mut config = MySqlConnectionConfig::new("", 3306, "root", "", None);
        config.docker_port = Some(13306);
        let config = config.for_connection_type(ConnectionType::Docker);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 13306);
    }

    #[test]
    fn test_docker_falls_back_to_port_then_default() {
        let config = MySqlConnectionConfig::new("127.0.0.1", 3310, "root", "", None)
            .for_connection_type(ConnectionType::Docker);
        assert_eq!(config.port, 3310);

        let config = MySqlConnectionConfig::new("127.0.0.1", 0, "root", "", None)
            .for_connection_type(ConnectionType::Docker);
        assert_eq!(config.port, DEFAULT_MYSQL_PORT);
    }

    #[test]
    fn test_direct_keeps_config() {
        let config = sample().for_connection_type(ConnectionType::Direct);
        assert_eq!(config, sample());
    }
}
