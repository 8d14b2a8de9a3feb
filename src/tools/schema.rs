//! Schema introspection tool.
//!
//! This module implements the `mysql_get_schema` MCP tool.

use crate::db::{SchemaInspector, SessionRegistry};
use crate::error::DbResult;
use crate::models::DatabaseSchema;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// Input for the mysql_get_schema tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct GetSchemaInput {
    /// Database to inspect. Defaults to the current session's database.
    #[serde(default, alias = "databaseName")]
    pub database_name: Option<String>,
}

pub struct SchemaToolHandler {
    registry: Arc<SessionRegistry>,
}

impl SchemaToolHandler {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub async fn get_schema(&self, input: GetSchemaInput) -> DbResult<DatabaseSchema> {
        let database = input
            .database_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());
        let conn = self.registry.current_connection().await?;
        let schema = SchemaInspector::database_schema(&conn, database).await?;

        info!(
            database = database.unwrap_or("(current)"),
            tables = schema.tables.len(),
            views = schema.views.len(),
            "Schema inspected"
        );
        Ok(schema)
    }
}
