//! Data models for the MySQL MCP Server.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod project;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{
    ConnectionInfo, ConnectionTestResult, ConnectionType, DEFAULT_MYSQL_PORT,
    MySqlConnectionConfig,
};
pub use project::{EnvironmentKind, ProjectEnvironment, ProjectInfo, ProjectType};
pub use query::{ExecuteOutcome, JsonRow, QueryParam, SqlExecutionResult, SqlScriptResult};
pub use schema::{ColumnInfo, DatabaseSchema, ForeignKeyInfo, IndexInfo, TableInfo, ViewInfo};
