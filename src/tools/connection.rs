//! Connection and environment tools.
//!
//! This module implements the session-management MCP tools:
//! `mysql_connect`, `mysql_test_connection`, `mysql_disconnect`,
//! `mysql_detect_project`, `mysql_list_environments`,
//! `mysql_connect_environment`, `mysql_switch_environment`,
//! `mysql_list_sessions` and `mysql_get_project_summary`.

use crate::config::ConnectDefaults;
use crate::db::{ConnectionStats, SessionInfo, SessionRegistry};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionTestResult, ConnectionType, ProjectEnvironment, ProjectInfo};
use schemars::JsonSchema;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Input for the mysql_connect tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ConnectInput {
    /// MySQL host. Default: MYSQL_HOST or localhost
    #[serde(default)]
    pub host: Option<String>,
    /// MySQL port. Default: MYSQL_PORT or 3306
    #[serde(default)]
    pub port: Option<u16>,
    /// Default: MYSQL_USER or root
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Database to select after connecting
    #[serde(default)]
    pub database: Option<String>,
    /// direct, docker or remote. Default: direct
    #[serde(default, alias = "connectionType")]
    pub connection_type: Option<ConnectionType>,
    /// Docker container name (docker only, informational)
    #[serde(default, alias = "containerName")]
    pub container_name: Option<String>,
    /// Host port the container publishes MySQL on (docker only)
    #[serde(default, alias = "dockerPort")]
    pub docker_port: Option<u16>,
}

/// Input for the mysql_test_connection tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct TestConnectionInput {
    /// Detected environment to probe. Omit to test the current session.
    #[serde(default, alias = "environmentName")]
    pub environment_name: Option<String>,
}

/// Input for the mysql_disconnect tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct DisconnectInput {
    /// Session to close. Omit to close the current session.
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
}

/// Input for the mysql_detect_project tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct DetectProjectInput {
    /// Project directory to scan. Relative paths resolve against the current root.
    #[serde(default, alias = "workingDirectory")]
    pub working_directory: Option<String>,
}

/// Input for the mysql_connect_environment tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ConnectEnvironmentInput {
    /// Environment name from mysql_list_environments, e.g. `dev` or `local`
    #[serde(alias = "environmentName")]
    pub environment_name: String,
}

/// Input for the mysql_switch_environment tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct SwitchEnvironmentInput {
    /// Environment to switch to; connects if no session exists yet
    #[serde(default, alias = "environmentName")]
    pub environment_name: Option<String>,
    /// Existing session to make current. Takes precedence over environment_name.
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
}

/// Outcome of `mysql_test_connection`.
#[derive(Debug, Clone)]
pub enum ConnectionProbe {
    /// Live test of the current session
    Current {
        session: SessionInfo,
        result: ConnectionTestResult,
    },
    /// Temporary connection to a detected environment
    Environment { name: String, reachable: bool },
}

/// Detected environments plus the current session, if any.
#[derive(Debug, Clone)]
pub struct EnvironmentListing {
    pub environments: Vec<ProjectEnvironment>,
    pub current: Option<SessionInfo>,
}

#[derive(Debug, Clone)]
pub struct SessionListing {
    pub sessions: Vec<SessionInfo>,
    pub stats: ConnectionStats,
}

pub struct ConnectionToolHandler {
    registry: Arc<SessionRegistry>,
    defaults: ConnectDefaults,
}

impl ConnectionToolHandler {
    pub fn new(registry: Arc<SessionRegistry>, defaults: ConnectDefaults) -> Self {
        Self { registry, defaults }
    }

    /// Open a new session from explicit parameters and make it current.
    pub async fn connect(&self, input: ConnectInput) -> DbResult<SessionInfo> {
        let connection_type = input.connection_type.unwrap_or_default();
        let mut config = self.defaults.resolve(
            input.host,
            input.port,
            input.user,
            input.password,
            input.database,
        );
        config.container_name = input.container_name.filter(|c| !c.trim().is_empty());
        config.docker_port = input.docker_port.filter(|p| *p != 0);

        self.registry
            .connect_manually(config, connection_type, None)
            .await
    }

    pub async fn test_connection(&self, input: TestConnectionInput) -> DbResult<ConnectionProbe> {
        if let Some(name) = non_empty(input.environment_name) {
            let reachable = self.registry.test_environment_connection(&name).await;
            return Ok(ConnectionProbe::Environment { name, reachable });
        }

        let conn = self.registry.current_connection().await?;
        let result = conn.test_connection().await;
        let session = self
            .registry
            .current_session()
            .await
            .ok_or(DbError::NotConnected)?;
        Ok(ConnectionProbe::Current { session, result })
    }

    /// Close the named session, or the current one. `None` when nothing was closed.
    pub async fn disconnect(&self, input: DisconnectInput) -> DbResult<Option<SessionInfo>> {
        match non_empty(input.session_id) {
            Some(id) => match self.registry.disconnect_session(&id).await {
                Some(info) => Ok(Some(info)),
                None => Err(DbError::session_not_found(id)),
            },
            None => Ok(self.registry.disconnect_current().await),
        }
    }

    pub async fn detect_project(&self, input: DetectProjectInput) -> DbResult<ProjectInfo> {
        let project = match non_empty(input.working_directory) {
            Some(dir) => {
                let root = resolve_dir(&self.registry.root().await, &dir);
                self.registry.detect_project_at(root).await?
            }
            None => self.registry.detect_project().await?,
        };
        info!(
            project_type = %project.project_type,
            environments = project.environments.len(),
            root = %project.root_path.display(),
            "Project detected"
        );
        Ok(project)
    }

    pub async fn list_environments(&self) -> EnvironmentListing {
        EnvironmentListing {
            environments: self.registry.list_environments().await,
            current: self.registry.current_session().await,
        }
    }

    /// Connect to a detected environment and run a live probe on it.
    pub async fn connect_environment(
        &self,
        input: ConnectEnvironmentInput,
    ) -> DbResult<(SessionInfo, ConnectionTestResult)> {
        let name = required(input.environment_name, "environment_name")?;
        let session = self.registry.connect_to_environment(&name).await?;
        let conn = self.registry.current_connection().await?;
        let result = conn.test_connection().await;
        Ok((session, result))
    }

    pub async fn switch_environment(&self, input: SwitchEnvironmentInput) -> DbResult<SessionInfo> {
        if let Some(id) = non_empty(input.session_id) {
            return self.registry.switch_to_session(&id).await;
        }
        match non_empty(input.environment_name) {
            Some(name) => self.registry.connect_to_environment(&name).await,
            None => Err(DbError::invalid_input(
                "Either environment_name or session_id is required",
            )),
        }
    }

    pub async fn list_sessions(&self) -> SessionListing {
        SessionListing {
            sessions: self.registry.list_sessions().await,
            stats: self.registry.connection_stats().await,
        }
    }

    pub async fn project_summary(&self) -> String {
        self.registry.environment_summary().await
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(value: String, field: &str) -> DbResult<String> {
    non_empty(Some(value)).ok_or_else(|| DbError::invalid_input(format!("{} is required", field)))
}

fn resolve_dir(root: &Path, dir: &str) -> PathBuf {
    let dir = Path::new(dir);
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        root.join(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolOptions;
    use tempfile::TempDir;

    fn handler(root: &Path) -> ConnectionToolHandler {
        ConnectionToolHandler::new(
            Arc::new(SessionRegistry::new(root, PoolOptions::default())),
            ConnectDefaults::default(),
        )
    }

    #[test]
    fn test_connect_input_parses_connection_type() {
        let input: ConnectInput =
            serde_json::from_str(r#"{"connection_type": "docker", "docker_port": 13306}"#).unwrap();
        assert_eq!(input.connection_type, Some(ConnectionType::Docker));
        assert_eq!(input.docker_port, Some(13306));
        assert!(input.host.is_none());
    }

    #[test]
    fn test_inputs_accept_camel_case() {
        let input: ConnectInput = serde_json::from_str(
            r#"{"connectionType": "docker", "containerName": "mysql-dev", "dockerPort": 13306}"#,
        )
        .unwrap();
        assert_eq!(input.connection_type, Some(ConnectionType::Docker));
        assert_eq!(input.container_name.as_deref(), Some("mysql-dev"));
        assert_eq!(input.docker_port, Some(13306));

        let input: ConnectEnvironmentInput =
            serde_json::from_str(r#"{"environmentName": "dev"}"#).unwrap();
        assert_eq!(input.environment_name, "dev");
        let input: DetectProjectInput =
            serde_json::from_str(r#"{"workingDirectory": "app"}"#).unwrap();
        assert_eq!(input.working_directory.as_deref(), Some("app"));
        let input: SwitchEnvironmentInput =
            serde_json::from_str(r#"{"sessionId": "session_1_abc"}"#).unwrap();
        assert_eq!(input.session_id.as_deref(), Some("session_1_abc"));
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(Some("  dev ".into())), Some("dev".into()));
        assert_eq!(non_empty(Some("   ".into())), None);
        assert_eq!(non_empty(None), None);
    }

    #[tokio::test]
    async fn test_disconnect_without_session() {
        let dir = TempDir::new().unwrap();
        let handler = handler(dir.path());
        let closed = handler.disconnect(DisconnectInput::default()).await.unwrap();
        assert!(closed.is_none());

        let err = handler
            .disconnect(DisconnectInput {
                session_id: Some("session_1_abc".into()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_switch_requires_target() {
        let dir = TempDir::new().unwrap();
        let err = handler(dir.path())
            .switch_environment(SwitchEnvironmentInput::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_switch_unknown_session() {
        let dir = TempDir::new().unwrap();
        let err = handler(dir.path())
            .switch_environment(SwitchEnvironmentInput {
                environment_name: Some("dev".into()),
                session_id: Some("missing".into()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_connect_environment_before_detection() {
        let dir = TempDir::new().unwrap();
        let err = handler(dir.path())
            .connect_environment(ConnectEnvironmentInput {
                environment_name: "dev".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::ProjectNotDetected));
    }

    #[tokio::test]
    async fn test_test_connection_unknown_environment() {
        let dir = TempDir::new().unwrap();
        let probe = handler(dir.path())
            .test_connection(TestConnectionInput {
                environment_name: Some("dev".into()),
            })
            .await
            .unwrap();
        assert!(matches!(
            probe,
            ConnectionProbe::Environment { reachable: false, .. }
        ));
    }

    #[tokio::test]
    async fn test_detect_project_relative_directory() {
        let dir = TempDir::new().unwrap();
        let app = dir.path().join("app");
        std::fs::create_dir(&app).unwrap();
        std::fs::write(app.join("package.json"), "{}").unwrap();
        std::fs::write(
            app.join(".env"),
            "DB_HOST=127.0.0.1\nDB_DATABASE=shop\nDB_USERNAME=app\n",
        )
        .unwrap();

        let handler = handler(dir.path());
        let project = handler
            .detect_project(DetectProjectInput {
                working_directory: Some("app".into()),
            })
            .await
            .unwrap();
        assert_eq!(project.root_path, app);
        assert_eq!(project.environments.len(), 1);

        let listing = handler.list_environments().await;
        assert_eq!(listing.environments.len(), 1);
        assert!(listing.current.is_none());
    }

    #[tokio::test]
    async fn test_detect_project_missing_directory() {
        let dir = TempDir::new().unwrap();
        let err = handler(dir.path())
            .detect_project(DetectProjectInput {
                working_directory: Some("does-not-exist".into()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Detection { .. }));
    }

    #[tokio::test]
    async fn test_failed_detect_keeps_previous_project() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        std::fs::write(dir.path().join(".env"), "DB_HOST=localhost\nDB_DATABASE=shop\n").unwrap();

        let handler = handler(dir.path());
        handler
            .detect_project(DetectProjectInput::default())
            .await
            .unwrap();

        let err = handler
            .detect_project(DetectProjectInput {
                working_directory: Some("typo-dir".into()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Detection { .. }));
        assert_eq!(handler.registry.root().await, dir.path());
        assert_eq!(handler.list_environments().await.environments.len(), 1);
    }
}
