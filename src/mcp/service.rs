//! MCP service implementation using rmcp.
//!
//! This module defines the MySqlService struct with all MySQL tools
//! exposed via the MCP protocol using the rmcp framework's macros.
//! Every tool replies with one text block; operational failures come back
//! as error results so the assistant can read them and recover.

use crate::config::ConnectDefaults;
use crate::db::SessionRegistry;
use crate::error::{DbError, DbResult};
use crate::tools::connection::ConnectionProbe;
use crate::tools::format;
use crate::tools::{
    ConnectEnvironmentInput, ConnectInput, ConnectionToolHandler, DetectProjectInput,
    DisconnectInput, ExecuteBatchInput, ExecuteScriptInput, ExecuteSqlInput, GetSchemaInput,
    SchemaToolHandler, SqlToolHandler, SwitchEnvironmentInput, TestConnectionInput,
};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{
        CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    tool, tool_handler, tool_router,
};
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct MySqlService {
    /// Sessions shared by every client of this process
    registry: Arc<SessionRegistry>,
    /// Fallbacks for mysql_connect arguments
    connect_defaults: ConnectDefaults,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl MySqlService {
    pub fn new(registry: Arc<SessionRegistry>, connect_defaults: ConnectDefaults) -> Self {
        Self {
            registry,
            connect_defaults,
            tool_router: Self::tool_router(),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    fn connections(&self) -> ConnectionToolHandler {
        ConnectionToolHandler::new(self.registry.clone(), self.connect_defaults.clone())
    }

    fn sql(&self) -> SqlToolHandler {
        SqlToolHandler::new(self.registry.clone())
    }
}

/// Turn a handler outcome into a tool reply.
///
/// Invalid arguments are protocol errors; anything else that fails is
/// reported as an error result with an `Error:` prefix.
fn reply(tool: &str, result: DbResult<String>) -> Result<CallToolResult, McpError> {
    match result {
        Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
        Err(err @ DbError::InvalidInput { .. }) => Err(err.into()),
        Err(err) => {
            warn!(tool, error = %err, "Tool call failed");
            Ok(error_result(&err.to_string(), err.suggestion()))
        }
    }
}

fn error_result(message: &str, suggestion: Option<&str>) -> CallToolResult {
    let text = match suggestion {
        Some(hint) => format!("Error: {}\nSuggestion: {}", message, hint),
        None => format!("Error: {}", message),
    };
    CallToolResult::error(vec![Content::text(text)])
}

#[tool_router]
impl MySqlService {
    #[tool(
        description = "Connect to a MySQL server with explicit parameters and make it the current session.\nOmitted fields fall back to MYSQL_HOST, MYSQL_PORT, MYSQL_USER, MYSQL_PASSWORD and MYSQL_DATABASE.\nconnection_type: direct (default), docker or remote. Docker uses docker_port when given."
    )]
    async fn mysql_connect(
        &self,
        Parameters(input): Parameters<ConnectInput>,
    ) -> Result<CallToolResult, McpError> {
        let result = self.connections().connect(input).await;
        reply(
            "mysql_connect",
            result.map(|session| format::format_connected(&session)),
        )
    }

    #[tool(
        description = "Execute one SQL statement on the current session.\nSupports positional `?` parameters to prevent SQL injection.\nRow-returning statements (SELECT, SHOW, DESCRIBE, EXPLAIN, WITH) return rows as JSON; others return affected rows and the insert id."
    )]
    async fn mysql_execute_sql(
        &self,
        Parameters(input): Parameters<ExecuteSqlInput>,
    ) -> Result<CallToolResult, McpError> {
        match self.sql().execute_sql(input).await {
            Ok(result) if result.success => Ok(CallToolResult::success(vec![Content::text(
                format::format_sql_result(&result),
            )])),
            Ok(result) => {
                let message = result.error.unwrap_or(result.message);
                warn!(tool = "mysql_execute_sql", error = %message, "Tool call failed");
                Ok(error_result(&message, None))
            }
            Err(err) => reply("mysql_execute_sql", Err(err)),
        }
    }

    #[tool(
        description = "Execute a .sql script file on the current session.\nStatements are split on semicolons and run in order.\nSet atomic=true to run them in one transaction that rolls back on the first failure."
    )]
    async fn mysql_execute_script(
        &self,
        Parameters(input): Parameters<ExecuteScriptInput>,
    ) -> Result<CallToolResult, McpError> {
        let result = self
            .sql()
            .execute_script(&input.script_path, input.atomic)
            .await;
        reply(
            "mysql_execute_script",
            result.map(|r| format::format_script_result("Script", &r)),
        )
    }

    #[tool(
        description = "Execute several SQL statements separated by semicolons on the current session.\nSet atomic=true to run them in one transaction that rolls back on the first failure."
    )]
    async fn mysql_execute_batch(
        &self,
        Parameters(input): Parameters<ExecuteBatchInput>,
    ) -> Result<CallToolResult, McpError> {
        let result = self
            .sql()
            .execute_batch(&input.sql_script, input.atomic)
            .await;
        reply(
            "mysql_execute_batch",
            result.map(|r| format::format_script_result("Batch", &r)),
        )
    }

    #[tool(
        description = "Describe the tables (columns, indexes, foreign keys) and views of a database.\nDefaults to the current session's database."
    )]
    async fn mysql_get_schema(
        &self,
        Parameters(input): Parameters<GetSchemaInput>,
    ) -> Result<CallToolResult, McpError> {
        let handler = SchemaToolHandler::new(self.registry.clone());
        let result = handler.get_schema(input).await;
        reply(
            "mysql_get_schema",
            result.map(|schema| format::format_schema(&schema)),
        )
    }

    #[tool(
        description = "Test a connection.\nWithout arguments tests the current session and reports latency and server version.\nWith environment_name opens a temporary connection to that detected environment."
    )]
    async fn mysql_test_connection(
        &self,
        Parameters(input): Parameters<TestConnectionInput>,
    ) -> Result<CallToolResult, McpError> {
        match self.connections().test_connection(input).await {
            Ok(probe) => {
                let text = format::format_probe(&probe);
                let failed =
                    matches!(&probe, ConnectionProbe::Current { result, .. } if !result.success);
                if failed {
                    Ok(CallToolResult::error(vec![Content::text(text)]))
                } else {
                    Ok(CallToolResult::success(vec![Content::text(text)]))
                }
            }
            Err(err) => reply("mysql_test_connection", Err(err)),
        }
    }

    #[tool(description = "Close a session by session_id, or the current session when omitted.")]
    async fn mysql_disconnect(
        &self,
        Parameters(input): Parameters<DisconnectInput>,
    ) -> Result<CallToolResult, McpError> {
        let result = self.connections().disconnect(input).await;
        reply(
            "mysql_disconnect",
            result.map(|closed| format::format_disconnected(closed.as_ref())),
        )
    }

    #[tool(
        description = "Scan a project directory for database configuration.\nRecognizes Spring Boot, Node.js, Laravel, Django and generic projects.\nworking_directory changes the project root for later calls."
    )]
    async fn mysql_detect_project(
        &self,
        Parameters(input): Parameters<DetectProjectInput>,
    ) -> Result<CallToolResult, McpError> {
        let result = self.connections().detect_project(input).await;
        reply(
            "mysql_detect_project",
            result.map(|project| format::format_project(&project)),
        )
    }

    #[tool(description = "List the database environments found by mysql_detect_project.")]
    async fn mysql_list_environments(&self) -> Result<CallToolResult, McpError> {
        let listing = self.connections().list_environments().await;
        reply(
            "mysql_list_environments",
            Ok(format::format_environments(&listing)),
        )
    }

    #[tool(
        description = "Connect to a detected environment by name and make it current.\nReuses the existing session for that environment if there is one."
    )]
    async fn mysql_connect_environment(
        &self,
        Parameters(input): Parameters<ConnectEnvironmentInput>,
    ) -> Result<CallToolResult, McpError> {
        let result = self.connections().connect_environment(input).await;
        reply(
            "mysql_connect_environment",
            result.map(|(session, test)| format::format_environment_connected(&session, &test)),
        )
    }

    #[tool(
        description = "Change the current session.\nsession_id selects an existing session; environment_name connects to that environment or reuses its session."
    )]
    async fn mysql_switch_environment(
        &self,
        Parameters(input): Parameters<SwitchEnvironmentInput>,
    ) -> Result<CallToolResult, McpError> {
        let result = self.connections().switch_environment(input).await;
        reply(
            "mysql_switch_environment",
            result.map(|session| format::format_switched(&session)),
        )
    }

    #[tool(description = "List open sessions with their environment, server and last use.")]
    async fn mysql_list_sessions(&self) -> Result<CallToolResult, McpError> {
        let listing = self.connections().list_sessions().await;
        reply("mysql_list_sessions", Ok(format::format_sessions(&listing)))
    }

    #[tool(description = "Summarize the detected project environments and which are connected.")]
    async fn mysql_get_project_summary(&self) -> Result<CallToolResult, McpError> {
        let summary = self.connections().project_summary().await;
        reply(
            "mysql_get_project_summary",
            Ok(format::format_project_summary(&summary)),
        )
    }
}

#[tool_handler]
impl ServerHandler for MySqlService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "mysql-mcp-server".to_owned(),
                title: Some("MySQL MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "MySQL tools with project environment detection and multiple sessions.\n\
                \n\
                ## Workflow\n\
                1. Call `mysql_detect_project` to find database settings in the project\n\
                2. Call `mysql_list_environments` to see them, then `mysql_connect_environment`\n\
                   (or use `mysql_connect` with explicit parameters)\n\
                3. Run SQL with `mysql_execute_sql`, `mysql_execute_batch` or `mysql_execute_script`\n\
                4. Inspect tables with `mysql_get_schema`\n\
                \n\
                ## Sessions\n\
                - Every connection is a session; SQL tools always use the current one\n\
                - `mysql_switch_environment` changes the current session\n\
                - `mysql_list_sessions` shows all sessions; idle sessions are closed automatically\n\
                \n\
                ## Errors\n\
                - \"Not connected\": connect first\n\
                - \"No project configuration detected\": run `mysql_detect_project` first"
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolOptions;
    use tempfile::TempDir;

    fn create_test_service(dir: &TempDir) -> MySqlService {
        let registry = Arc::new(SessionRegistry::new(dir.path(), PoolOptions::default()));
        MySqlService::new(registry, ConnectDefaults::default())
    }

    fn text_of(result: &CallToolResult) -> String {
        result
            .content
            .iter()
            .filter_map(|c| c.as_text().map(|t| t.text.clone()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_server_info() {
        let dir = TempDir::new().unwrap();
        let info = create_test_service(&dir).get_info();
        assert_eq!(info.server_info.name, "mysql-mcp-server");
        assert!(info.capabilities.tools.is_some());
        assert!(
            info.instructions
                .unwrap_or_default()
                .contains("mysql_detect_project")
        );
    }

    #[test]
    fn test_tool_router_lists_all_tools() {
        let dir = TempDir::new().unwrap();
        let service = create_test_service(&dir);
        let mut names: Vec<String> = service
            .tool_router
            .list_all()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "mysql_connect",
                "mysql_connect_environment",
                "mysql_detect_project",
                "mysql_disconnect",
                "mysql_execute_batch",
                "mysql_execute_script",
                "mysql_execute_sql",
                "mysql_get_project_summary",
                "mysql_get_schema",
                "mysql_list_environments",
                "mysql_list_sessions",
                "mysql_switch_environment",
                "mysql_test_connection",
            ]
        );
    }

    #[test]
    fn test_reply_maps_errors() {
        let ok = reply("t", Ok("done".into())).unwrap();
        assert_ne!(ok.is_error, Some(true));
        assert_eq!(text_of(&ok), "done");

        let failed = reply("t", Err(DbError::NotConnected)).unwrap();
        assert_eq!(failed.is_error, Some(true));
        assert!(text_of(&failed).starts_with("Error: Not connected"));

        let invalid = reply("t", Err(DbError::invalid_input("sql must not be empty")));
        assert!(invalid.is_err());
    }

    #[test]
    fn test_error_result_includes_suggestion() {
        let result = error_result("Connection failed: refused", Some("Is MySQL running?"));
        assert_eq!(
            text_of(&result),
            "Error: Connection failed: refused\nSuggestion: Is MySQL running?"
        );
    }

    #[tokio::test]
    async fn test_execute_sql_without_session_is_error_result() {
        let dir = TempDir::new().unwrap();
        let service = create_test_service(&dir);
        let result = service
            .mysql_execute_sql(Parameters(ExecuteSqlInput {
                sql: "SELECT 1".into(),
                params: Vec::new(),
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert!(text_of(&result).contains("Not connected"));
    }

    #[tokio::test]
    async fn test_execute_sql_empty_is_invalid_params() {
        let dir = TempDir::new().unwrap();
        let service = create_test_service(&dir);
        let err = service
            .mysql_execute_sql(Parameters(ExecuteSqlInput {
                sql: String::new(),
                params: Vec::new(),
            }))
            .await
            .unwrap_err();
        assert!(err.message.contains("sql must not be empty"));
    }

    #[tokio::test]
    async fn test_disconnect_without_session() {
        let dir = TempDir::new().unwrap();
        let service = create_test_service(&dir);
        let result = service
            .mysql_disconnect(Parameters(DisconnectInput::default()))
            .await
            .unwrap();
        assert_eq!(text_of(&result), "No active connection to disconnect");
    }

    #[tokio::test]
    async fn test_summary_before_detection() {
        let dir = TempDir::new().unwrap();
        let service = create_test_service(&dir);
        let result = service.mysql_get_project_summary().await.unwrap();
        assert_eq!(
            text_of(&result),
            "Project database summary\n\nNo project configuration detected"
        );
    }

    #[tokio::test]
    async fn test_detect_then_list_environments() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"database": {"host": "127.0.0.1", "port": 3307, "user": "app", "database": "shop"}}"#,
        )
        .unwrap();
        let service = create_test_service(&dir);

        let detected = service
            .mysql_detect_project(Parameters(DetectProjectInput::default()))
            .await
            .unwrap();
        assert!(text_of(&detected).contains("Project type: generic"));

        let listed = service.mysql_list_environments().await.unwrap();
        let text = text_of(&listed);
        assert!(text.contains("Server: 127.0.0.1:3307"));
        assert!(text.contains("Database: shop"));
    }
}
