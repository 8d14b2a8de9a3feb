//! Text rendering for MCP tool responses.
//!
//! Every tool replies with a single text block. The functions here turn
//! handler results into that text and never touch the database.

use crate::db::SessionInfo;
use crate::models::{
    ConnectionInfo, ConnectionTestResult, DatabaseSchema, ProjectInfo, SqlExecutionResult,
    SqlScriptResult,
};
use crate::tools::connection::{ConnectionProbe, EnvironmentListing, SessionListing};
use chrono::{DateTime, Utc};

const NOT_SPECIFIED: &str = "not specified";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn server(info: &ConnectionInfo) -> String {
    format!("{}:{}", info.host, info.port)
}

fn database(name: Option<&str>) -> &str {
    name.unwrap_or(NOT_SPECIFIED)
}

/// Reply for `mysql_connect`.
pub fn format_connected(session: &SessionInfo) -> String {
    let conn = &session.connection;
    let mut lines = vec![
        "Connected to MySQL".to_string(),
        format!("Connection type: {}", conn.connection_type),
        format!("Server: {}", server(conn)),
        format!("User: {}", conn.user),
        format!("Database: {}", database(conn.database.as_deref())),
    ];
    if let Some(container) = &conn.container_name {
        lines.push(format!("Container: {}", container));
    }
    lines.push(format!("Session ID: {}", session.id));
    lines.join("\n")
}

/// Reply for a successful `mysql_execute_sql`.
pub fn format_sql_result(result: &SqlExecutionResult) -> String {
    let mut lines = vec![
        result.message.clone(),
        format!("Execution time: {}ms", result.execution_time_ms.unwrap_or(0)),
    ];

    match (&result.data, result.affected_rows) {
        (Some(rows), _) if !rows.is_empty() => {
            let json = serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_string());
            lines.push(String::new());
            lines.push("Results:".to_string());
            lines.push(json);
        }
        (_, Some(affected)) => {
            lines.push(String::new());
            lines.push(format!("Affected rows: {}", affected));
            if let Some(id) = result.insert_id {
                lines.push(format!("Insert ID: {}", id));
            }
        }
        _ => {}
    }
    lines.join("\n")
}

/// Summary for `mysql_execute_script` and `mysql_execute_batch`.
///
/// `label` names the unit of work, e.g. "Script" or "Batch".
pub fn format_script_result(label: &str, result: &SqlScriptResult) -> String {
    let header = if result.success {
        format!("{} completed successfully", label)
    } else {
        format!("{} completed with errors", label)
    };
    let mut lines = vec![
        header,
        format!("Total statements: {}", result.total_statements),
        format!("Successful: {}", result.successful_statements),
        format!("Failed: {}", result.failed_statements),
        format!("Execution time: {}ms", result.execution_time_ms),
    ];
    if !result.errors.is_empty() {
        lines.push(String::new());
        lines.push("Errors:".to_string());
        lines.extend(result.errors.iter().cloned());
    }
    lines.join("\n")
}

/// Reply for `mysql_get_schema`.
pub fn format_schema(schema: &DatabaseSchema) -> String {
    let mut lines = vec![
        "Database schema".to_string(),
        String::new(),
        format!("Tables ({}):", schema.tables.len()),
    ];

    for table in &schema.tables {
        lines.push(String::new());
        lines.push(format!("  {}", table.name));
        lines.push(format!("    Columns: {}", table.columns.len()));
        lines.push(format!("    Indexes: {}", table.indexes.len()));
        lines.push(format!("    Foreign keys: {}", table.foreign_keys.len()));

        if !table.columns.is_empty() {
            lines.push("    Column details:".to_string());
            for column in &table.columns {
                let flags = column.flags();
                if flags.is_empty() {
                    lines.push(format!("      - {}: {}", column.name, column.column_type));
                } else {
                    lines.push(format!(
                        "      - {}: {} [{}]",
                        column.name,
                        column.column_type,
                        flags.join(", ")
                    ));
                }
            }
        }

        if !table.foreign_keys.is_empty() {
            lines.push("    References:".to_string());
            for fk in &table.foreign_keys {
                lines.push(format!(
                    "      - {} -> {}.{}",
                    fk.column, fk.referenced_table, fk.referenced_column
                ));
            }
        }
    }

    if !schema.views.is_empty() {
        lines.push(String::new());
        lines.push(format!("Views ({}):", schema.views.len()));
        for view in &schema.views {
            lines.push(format!("  - {}", view.name));
        }
    }
    lines.join("\n")
}

fn test_result_lines(result: &ConnectionTestResult, indent: &str) -> Vec<String> {
    if result.success {
        vec![
            format!(
                "{}Server version: {}",
                indent,
                result.server_version.as_deref().unwrap_or("unknown")
            ),
            format!(
                "{}Response time: {}ms",
                indent,
                result.connection_time_ms.unwrap_or(0)
            ),
        ]
    } else {
        vec![format!(
            "{}Error: {}",
            indent,
            result.error.as_deref().unwrap_or("unknown error")
        )]
    }
}

/// Reply for `mysql_test_connection`.
pub fn format_probe(probe: &ConnectionProbe) -> String {
    match probe {
        ConnectionProbe::Current { session, result } => {
            let header = if result.success {
                format!("Connection test succeeded ({})", session.display_name)
            } else {
                format!("Connection test failed ({})", session.display_name)
            };
            let mut lines = vec![header];
            lines.extend(test_result_lines(result, ""));
            lines.join("\n")
        }
        ConnectionProbe::Environment { name, reachable } => {
            if *reachable {
                format!("Environment '{}' is reachable", name)
            } else {
                format!("Environment '{}' is unreachable", name)
            }
        }
    }
}

/// Reply for `mysql_disconnect`.
pub fn format_disconnected(closed: Option<&SessionInfo>) -> String {
    match closed {
        Some(session) => format!(
            "Disconnected session {} ({})",
            session.id, session.display_name
        ),
        None => "No active connection to disconnect".to_string(),
    }
}

/// Reply for `mysql_detect_project`.
pub fn format_project(project: &ProjectInfo) -> String {
    let mut lines = vec![
        "Project detection complete".to_string(),
        String::new(),
        format!("Project type: {}", project.project_type),
        format!("Project path: {}", project.root_path.display()),
        format!("Config files: {}", project.config_files.len()),
    ];

    if !project.config_files.is_empty() {
        lines.push(String::new());
        lines.push("Config files found:".to_string());
        for file in &project.config_files {
            lines.push(format!("  - {}", file));
        }
    }

    lines.push(String::new());
    lines.push(format!(
        "Detected environments: {}",
        project.environments.len()
    ));
    for env in &project.environments {
        lines.push(format!("  - {}", env.display_name));
        lines.push(format!("    Source: {}", env.source));
        lines.push(format!("    Server: {}:{}", env.config.host, env.config.port));
        lines.push(format!("    Database: {}", env.config.database_label()));
    }
    lines.join("\n")
}

/// Reply for `mysql_list_environments`.
pub fn format_environments(listing: &EnvironmentListing) -> String {
    if listing.environments.is_empty() {
        return "No database environments detected. Run mysql_detect_project first.".to_string();
    }

    let mut lines = vec![format!(
        "Available database environments ({}):",
        listing.environments.len()
    )];
    for (i, env) in listing.environments.iter().enumerate() {
        lines.push(String::new());
        lines.push(format!("{}. {}", i + 1, env.display_name));
        lines.push(format!("   Name: {}", env.name));
        lines.push(format!("   Server: {}:{}", env.config.host, env.config.port));
        lines.push(format!("   Database: {}", env.config.database_label()));
        lines.push(format!("   User: {}", env.config.user));
        lines.push(format!("   Source: {}", env.source));
        lines.push(format!("   Type: {}", env.kind.label()));
    }

    lines.push(String::new());
    match &listing.current {
        Some(session) => lines.push(format!("Current connection: {}", session.display_name)),
        None => lines.push(
            "Use mysql_connect_environment to connect to an environment".to_string(),
        ),
    }
    lines.join("\n")
}

/// Reply for `mysql_connect_environment`.
pub fn format_environment_connected(session: &SessionInfo, test: &ConnectionTestResult) -> String {
    let conn = &session.connection;
    let mut lines = vec![
        format!("Connected to environment: {}", session.display_name),
        String::new(),
        "Connection details:".to_string(),
        format!("  Server: {}", server(conn)),
        format!("  Database: {}", database(conn.database.as_deref())),
        format!("  User: {}", conn.user),
        format!("  Session ID: {}", session.id),
        format!("  Connected at: {}", format_timestamp(session.created_at)),
        String::new(),
    ];
    if test.success {
        lines.push("Connection test succeeded".to_string());
    } else {
        lines.push("Connection test failed".to_string());
    }
    lines.extend(test_result_lines(test, "  "));
    lines.join("\n")
}

/// Reply for `mysql_switch_environment`.
pub fn format_switched(session: &SessionInfo) -> String {
    format!(
        "Switched to environment: {}\nSession ID: {}",
        session.display_name, session.id
    )
}

/// Reply for `mysql_list_sessions`.
pub fn format_sessions(listing: &SessionListing) -> String {
    if listing.sessions.is_empty() {
        return "No active database sessions".to_string();
    }

    let mut lines = vec![format!("Database sessions ({}):", listing.sessions.len())];
    for (i, session) in listing.sessions.iter().enumerate() {
        let conn = &session.connection;
        lines.push(String::new());
        if session.is_current {
            lines.push(format!("* Session {} (current)", i + 1));
        } else {
            lines.push(format!("  Session {}", i + 1));
        }
        lines.push(format!("   ID: {}", session.id));
        lines.push(format!("   Environment: {}", session.display_name));
        lines.push(format!("   Server: {}", server(conn)));
        lines.push(format!("   Database: {}", database(conn.database.as_deref())));
        lines.push(format!("   Created: {}", format_timestamp(session.created_at)));
        lines.push(format!("   Last used: {}", format_timestamp(session.last_used)));
    }

    let stats = &listing.stats;
    lines.push(String::new());
    lines.push("Statistics:".to_string());
    lines.push(format!("  Total sessions: {}", stats.total_sessions));
    lines.push(format!("  Active sessions: {}", stats.active_sessions));
    lines.push(format!(
        "  Current environment: {}",
        stats.current_environment.as_deref().unwrap_or("none")
    ));
    lines.push(format!(
        "  Detected environments: {}",
        stats.detected_environments
    ));
    lines.join("\n")
}

/// Reply for `mysql_get_project_summary`.
pub fn format_project_summary(summary: &str) -> String {
    format!("Project database summary\n\n{}", summary)
}
