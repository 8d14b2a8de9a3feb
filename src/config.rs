//! Configuration handling for the MySQL MCP Server.
//!
//! This module provides configuration management via CLI arguments and environment variables.

use crate::models::{DEFAULT_MYSQL_PORT, MySqlConnectionConfig};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_MCP_ENDPOINT: &str = "/";
pub const DEFAULT_SESSION_IDLE_TIMEOUT_MINS: u64 = 30;
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;

// Connection defaults used by mysql_connect when arguments are omitted
pub const DEFAULT_MYSQL_HOST: &str = "localhost";
pub const DEFAULT_MYSQL_USER: &str = "root";

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 0;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 60_000;

/// Connection pool configuration options.
///
/// Per-connection values on [`MySqlConnectionConfig`] take precedence over these.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PoolOptions {
    /// Maximum connections in pool (default: 10)
    pub max_connections: Option<u32>,
    /// Minimum idle connections kept open (default: 0)
    pub min_connections: Option<u32>,
    /// Idle timeout in seconds for pooled connections (default: 600)
    pub idle_timeout_secs: Option<u64>,
    /// Connection acquire timeout in milliseconds (default: 60000)
    pub acquire_timeout_ms: Option<u64>,
    /// Per-statement timeout in milliseconds (default: 60000)
    pub query_timeout_ms: Option<u64>,
    /// Whether to test connections before use (default: true)
    pub test_before_acquire: Option<bool>,
}

impl PoolOptions {
    /// Get max_connections with default value.
    pub fn max_connections_or_default(&self) -> u32 {
        self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS)
    }

    /// Get min_connections with default value.
    pub fn min_connections_or_default(&self) -> u32 {
        self.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    /// Get idle_timeout with default value.
    pub fn idle_timeout_or_default(&self) -> u64 {
        self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS)
    }

    /// Get acquire_timeout with default value.
    pub fn acquire_timeout_or_default(&self) -> u64 {
        self.acquire_timeout_ms.unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_MS)
    }

    /// Get query_timeout with default value.
    pub fn query_timeout_or_default(&self) -> u64 {
        self.query_timeout_ms.unwrap_or(DEFAULT_QUERY_TIMEOUT_MS)
    }

    /// Get test_before_acquire with default value.
    pub fn test_before_acquire_or_default(&self) -> bool {
        self.test_before_acquire.unwrap_or(true)
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(max) = self.max_connections {
            if max == 0 {
                return Err("max_connections must be greater than 0".to_string());
            }
            if let Some(min) = self.min_connections {
                if min > max {
                    return Err(format!(
                        "min_connections ({}) cannot exceed max_connections ({})",
                        min, max
                    ));
                }
            }
        }
        if self.acquire_timeout_ms == Some(0) {
            return Err("acquire_timeout must be greater than 0".to_string());
        }
        if self.query_timeout_ms == Some(0) {
            return Err("query_timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Transport mode for the MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TransportMode {
    /// Standard input/output (for CLI integration)
    #[default]
    Stdio,
    /// HTTP with Server-Sent Events (for web clients)
    Http,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// Fallback values for `mysql_connect` arguments the caller leaves out.
#[derive(Debug, Clone)]
pub struct ConnectDefaults {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: Option<String>,
}

impl Default for ConnectDefaults {
    fn default() -> Self {
        Self {
            host: DEFAULT_MYSQL_HOST.to_string(),
            port: DEFAULT_MYSQL_PORT,
            user: DEFAULT_MYSQL_USER.to_string(),
            password: String::new(),
            database: None,
        }
    }
}

impl ConnectDefaults {
    /// Build a connection config, preferring explicit values over defaults.
    ///
    /// Empty strings count as "not given".
    pub fn resolve(
        &self,
        host: Option<String>,
        port: Option<u16>,
        user: Option<String>,
        password: Option<String>,
        database: Option<String>,
    ) -> MySqlConnectionConfig {
        fn given(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.trim().is_empty())
        }

        MySqlConnectionConfig::new(
            given(host).unwrap_or_else(|| self.host.clone()),
            port.filter(|p| *p != 0).unwrap_or(self.port),
            given(user).unwrap_or_else(|| self.user.clone()),
            given(password).unwrap_or_else(|| self.password.clone()),
            given(database).or_else(|| self.database.clone()),
        )
    }
}

/// Configuration for the MySQL MCP Server.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "mysql-mcp-server",
    about = "MCP server for MySQL - project environment detection, multi-session connections and SQL tools",
    version,
    author
)]
pub struct Config {
    /// Transport mode (stdio or http)
    #[arg(
        short,
        long,
        value_enum,
        default_value = "stdio",
        env = "MCP_TRANSPORT"
    )]
    pub transport: TransportMode,

    /// HTTP host to bind to (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_HTTP_HOST,
        env = "MCP_HTTP_HOST"
    )]
    pub http_host: String,

    /// HTTP port to bind to (only used with http transport)
    #[arg(
        long,
        default_value_t = DEFAULT_HTTP_PORT,
        env = "MCP_HTTP_PORT"
    )]
    pub http_port: u16,

    /// MCP endpoint path (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_MCP_ENDPOINT,
        env = "MCP_ENDPOINT"
    )]
    pub mcp_endpoint: String,

    /// Project root scanned for database configuration (default: current directory)
    #[arg(short = 'w', long, value_name = "DIR", env = "MCP_WORKING_DIR")]
    pub working_dir: Option<PathBuf>,

    /// Detect project environments at startup
    #[arg(long, env = "MCP_AUTO_DETECT")]
    pub auto_detect: bool,

    /// Minutes a session may stay unused before it is closed
    #[arg(
        long,
        default_value_t = DEFAULT_SESSION_IDLE_TIMEOUT_MINS,
        env = "MCP_SESSION_IDLE_TIMEOUT"
    )]
    pub session_idle_timeout: u64,

    /// Seconds between idle-session sweeps
    #[arg(
        long,
        default_value_t = DEFAULT_CLEANUP_INTERVAL_SECS,
        env = "MCP_CLEANUP_INTERVAL"
    )]
    pub cleanup_interval: u64,

    /// Default MySQL host for mysql_connect
    #[arg(long, default_value = DEFAULT_MYSQL_HOST, env = "MYSQL_HOST")]
    pub mysql_host: String,

    /// Default MySQL port for mysql_connect
    #[arg(long, default_value_t = DEFAULT_MYSQL_PORT, env = "MYSQL_PORT")]
    pub mysql_port: u16,

    /// Default MySQL user for mysql_connect
    #[arg(long, default_value = DEFAULT_MYSQL_USER, env = "MYSQL_USER")]
    pub mysql_user: String,

    /// Default MySQL password for mysql_connect
    #[arg(long, default_value = "", env = "MYSQL_PASSWORD", hide_env_values = true)]
    pub mysql_password: String,

    /// Default database for mysql_connect
    #[arg(long, env = "MYSQL_DATABASE")]
    pub mysql_database: Option<String>,

    /// Maximum pooled connections per session
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_CONNECTIONS,
        env = "MYSQL_CONNECTION_LIMIT"
    )]
    pub connection_limit: u32,

    /// Connection acquire timeout in milliseconds
    #[arg(
        long,
        default_value_t = DEFAULT_ACQUIRE_TIMEOUT_MS,
        env = "MYSQL_ACQUIRE_TIMEOUT"
    )]
    pub acquire_timeout: u64,

    /// Statement timeout in milliseconds
    #[arg(
        long,
        default_value_t = DEFAULT_QUERY_TIMEOUT_MS,
        env = "MYSQL_QUERY_TIMEOUT"
    )]
    pub query_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MCP_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "MCP_JSON_LOGS")]
    pub json_logs: bool,

    /// Enable logging output (disabled by default to avoid interfering with stdio transport)
    #[arg(long, env = "MCP_ENABLE_LOGS")]
    pub enable_logs: bool,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            transport: TransportMode::Stdio,
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            mcp_endpoint: DEFAULT_MCP_ENDPOINT.to_string(),
            working_dir: None,
            auto_detect: false,
            session_idle_timeout: DEFAULT_SESSION_IDLE_TIMEOUT_MINS,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL_SECS,
            mysql_host: DEFAULT_MYSQL_HOST.to_string(),
            mysql_port: DEFAULT_MYSQL_PORT,
            mysql_user: DEFAULT_MYSQL_USER.to_string(),
            mysql_password: String::new(),
            mysql_database: None,
            connection_limit: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT_MS,
            query_timeout: DEFAULT_QUERY_TIMEOUT_MS,
            log_level: "info".to_string(),
            json_logs: false,
            enable_logs: false,
        }
    }

    /// Check values that clap cannot range-check on its own.
    pub fn validate(&self) -> Result<(), String> {
        if self.session_idle_timeout == 0 {
            return Err("session_idle_timeout must be greater than 0".to_string());
        }
        if self.cleanup_interval == 0 {
            return Err("cleanup_interval must be greater than 0".to_string());
        }
        self.pool_options().validate()
    }

    /// Pool options applied to every session.
    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_connections: Some(self.connection_limit),
            acquire_timeout_ms: Some(self.acquire_timeout),
            query_timeout_ms: Some(self.query_timeout),
            ..PoolOptions::default()
        }
    }

    /// Fallbacks for mysql_connect.
    pub fn connect_defaults(&self) -> ConnectDefaults {
        ConnectDefaults {
            host: self.mysql_host.clone(),
            port: self.mysql_port,
            user: self.mysql_user.clone(),
            password: self.mysql_password.clone(),
            database: self.mysql_database.clone().filter(|d| !d.is_empty()),
        }
    }

    /// Resolve the project root, falling back to the process working directory.
    pub fn project_root(&self) -> PathBuf {
        self.working_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Get the HTTP bind address.
    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    /// Get the idle timeout for sessions as a Duration.
    pub fn session_idle_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout.saturating_mul(60))
    }

    /// Get the sweep interval as a Duration.
    pub fn cleanup_interval_duration(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.transport, TransportMode::Stdio);
        assert_eq!(config.http_host, DEFAULT_HTTP_HOST);
        assert_eq!(config.http_port, DEFAULT_HTTP_PORT);
        assert_eq!(config.mysql_port, 3306);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_http_bind_addr() {
        let config = Config {
            http_host: "0.0.0.0".to_string(),
            http_port: 3000,
            ..Config::default()
        };
        assert_eq!(config.http_bind_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_durations() {
        let config = Config {
            session_idle_timeout: 5,
            cleanup_interval: 15,
            ..Config::default()
        };
        assert_eq!(
            config.session_idle_timeout_duration(),
            Duration::from_secs(300)
        );
        assert_eq!(config.cleanup_interval_duration(), Duration::from_secs(15));

        let config = Config {
            session_idle_timeout: u64::MAX,
            ..Config::default()
        };
        assert_eq!(
            config.session_idle_timeout_duration(),
            Duration::from_secs(u64::MAX)
        );
    }

    #[test]
    fn test_validate_rejects_zero_idle_timeout() {
        let config = Config {
            session_idle_timeout: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_connection_limit() {
        let config = Config {
            connection_limit: 0,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("max_connections"));
    }

    #[test]
    fn test_pool_options_from_config() {
        let config = Config {
            connection_limit: 4,
            acquire_timeout: 5_000,
            query_timeout: 7_000,
            ..Config::default()
        };
        let opts = config.pool_options();
        assert_eq!(opts.max_connections_or_default(), 4);
        assert_eq!(opts.acquire_timeout_or_default(), 5_000);
        assert_eq!(opts.query_timeout_or_default(), 7_000);
        assert!(opts.test_before_acquire_or_default());
    }

    #[test]
    fn test_pool_options_defaults() {
        let opts = PoolOptions::default();
        assert_eq!(opts.max_connections_or_default(), DEFAULT_MAX_CONNECTIONS);
        assert_eq!(opts.min_connections_or_default(), DEFAULT_MIN_CONNECTIONS);
        assert_eq!(opts.idle_timeout_or_default(), DEFAULT_IDLE_TIMEOUT_SECS);
        assert_eq!(opts.acquire_timeout_or_default(), DEFAULT_ACQUIRE_TIMEOUT_MS);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_pool_options_min_exceeds_max() {
        let opts = PoolOptions {
            max_connections: Some(2),
            min_connections: Some(5),
            ..PoolOptions::default()
        };
        assert!(opts.validate().unwrap_err().contains("cannot exceed"));
    }

    #[test]
    fn test_connect_defaults_fill_missing_fields() {
        let config = Config {
            mysql_host: "db.local".to_string(),
            mysql_user: "app".to_string(),
            mysql_password: "pw".to_string(),
            mysql_database: Some("shop".to_string()),
            ..Config::default()
        };
        let resolved = config
            .connect_defaults()
            .resolve(None, None, None, None, None);
        assert_eq!(resolved.host, "db.local");
        assert_eq!(resolved.port, 3306);
        assert_eq!(resolved.user, "app");
        assert_eq!(resolved.password, "pw");
        assert_eq!(resolved.database.as_deref(), Some("shop"));
    }

    #[test]
    fn test_connect_defaults_explicit_values_win() {
        let resolved = ConnectDefaults::default().resolve(
            Some("10.0.0.5".into()),
            Some(3307),
            Some("".into()),
            Some("secret".into()),
            Some("inventory".into()),
        );
        assert_eq!(resolved.host, "10.0.0.5");
        assert_eq!(resolved.port, 3307);
        // empty user falls back
        assert_eq!(resolved.user, DEFAULT_MYSQL_USER);
        assert_eq!(resolved.password, "secret");
        assert_eq!(resolved.database.as_deref(), Some("inventory"));
    }

    #[test]
    fn test_project_root_prefers_working_dir() {
        let config = Config {
            working_dir: Some(PathBuf::from("/srv/app")),
            ..Config::default()
        };
        assert_eq!(config.project_root(), PathBuf::from("/srv/app"));
    }

    #[test]
    fn test_cli_parsing() {
        let config = Config::try_parse_from([
            "mysql-mcp-server",
            "--transport",
            "http",
            "--session-idle-timeout",
            "10",
            "--mysql-host",
            "db.example.com",
        ])
        .unwrap();
        assert_eq!(config.transport, TransportMode::Http);
        assert_eq!(config.session_idle_timeout, 10);
        assert_eq!(config.mysql_host, "db.example.com");
    }
}
