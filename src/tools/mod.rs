//! MCP tool implementations.
//!
//! This module contains the tool handlers behind the MCP service:
//! - `connection`: Sessions, environments and project detection
//! - `sql`: Single statements, batches and script files
//! - `schema`: Database schema introspection
//! - `format`: Plain-text rendering of tool results

pub mod connection;
pub mod format;
pub mod schema;
pub mod sql;

pub use connection::{
    ConnectEnvironmentInput, ConnectInput, ConnectionToolHandler, DetectProjectInput,
    DisconnectInput, SwitchEnvironmentInput, TestConnectionInput,
};
pub use schema::{GetSchemaInput, SchemaToolHandler};
pub use sql::{ExecuteBatchInput, ExecuteScriptInput, ExecuteSqlInput, SqlToolHandler};
