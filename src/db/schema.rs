//! Schema introspection for MySQL.
//!
//! Reads `information_schema` for one database (the connection's current
//! database unless another is named) and assembles tables with their
//! columns, indexes and foreign keys, plus views.

use crate::db::MySqlConnection;
use crate::error::{DbError, DbResult};
use crate::models::{
    ColumnInfo, DatabaseSchema, ForeignKeyInfo, IndexInfo, TableInfo, ViewInfo,
};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};
use std::collections::BTreeMap;
use tokio::time::timeout;
use tracing::debug;

// =============================================================================
// SQL Query Templates
// =============================================================================
//
// Text columns are converted to utf8 because some servers report
// information_schema strings as VARBINARY.

mod queries {
    pub const CURRENT_DATABASE: &str = "SELECT DATABASE() AS db";

    pub const LIST_TABLES: &str = r#"
        SELECT CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = COALESCE(?, DATABASE())
        AND TABLE_TYPE = 'BASE TABLE'
        ORDER BY TABLE_NAME
        "#;

    pub const LIST_COLUMNS: &str = r#"
        SELECT
            CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME,
            CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
            CONVERT(COLUMN_TYPE USING utf8) AS COLUMN_TYPE,
            CONVERT(IS_NULLABLE USING utf8) AS IS_NULLABLE,
            CONVERT(COLUMN_DEFAULT USING utf8) AS COLUMN_DEFAULT,
            CONVERT(COLUMN_KEY USING utf8) AS COLUMN_KEY,
            CONVERT(EXTRA USING utf8) AS EXTRA,
            CONVERT(COLUMN_COMMENT USING utf8) AS COLUMN_COMMENT
        FROM information_schema.COLUMNS
        WHERE TABLE_SCHEMA = COALESCE(?, DATABASE())
        ORDER BY TABLE_NAME, ORDINAL_POSITION
        "#;

    pub const LIST_INDEXES: &str = r#"
        SELECT
            CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME,
            CONVERT(INDEX_NAME USING utf8) AS INDEX_NAME,
            CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
            NON_UNIQUE
        FROM information_schema.STATISTICS
        WHERE TABLE_SCHEMA = COALESCE(?, DATABASE())
        ORDER BY TABLE_NAME, INDEX_NAME, SEQ_IN_INDEX
        "#;

    pub const LIST_FOREIGN_KEYS: &str = r#"
        SELECT
            CONVERT(k.TABLE_NAME USING utf8) AS TABLE_NAME,
            CONVERT(k.CONSTRAINT_NAME USING utf8) AS CONSTRAINT_NAME,
            CONVERT(k.COLUMN_NAME USING utf8) AS COLUMN_NAME,
            CONVERT(k.REFERENCED_TABLE_NAME USING utf8) AS REFERENCED_TABLE_NAME,
            CONVERT(k.REFERENCED_COLUMN_NAME USING utf8) AS REFERENCED_COLUMN_NAME,
            CONVERT(r.DELETE_RULE USING utf8) AS DELETE_RULE,
            CONVERT(r.UPDATE_RULE USING utf8) AS UPDATE_RULE
        FROM information_schema.KEY_COLUMN_USAGE k
        LEFT JOIN information_schema.REFERENTIAL_CONSTRAINTS r
            ON r.CONSTRAINT_SCHEMA = k.CONSTRAINT_SCHEMA
            AND r.CONSTRAINT_NAME = k.CONSTRAINT_NAME
            AND r.TABLE_NAME = k.TABLE_NAME
        WHERE k.TABLE_SCHEMA = COALESCE(?, DATABASE())
        AND k.REFERENCED_TABLE_NAME IS NOT NULL
        ORDER BY k.TABLE_NAME, k.CONSTRAINT_NAME, k.ORDINAL_POSITION
        "#;

    pub const LIST_VIEWS: &str = r#"
        SELECT
            CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME,
            CONVERT(VIEW_DEFINITION USING utf8) AS VIEW_DEFINITION
        FROM information_schema.VIEWS
        WHERE TABLE_SCHEMA = COALESCE(?, DATABASE())
        ORDER BY TABLE_NAME
        "#;
}

/// Schema inspector for database introspection.
pub struct SchemaInspector;

impl SchemaInspector {
    /// Load the schema of `database`, or of the connection's default database.
    pub async fn database_schema(
        conn: &MySqlConnection,
        database: Option<&str>,
    ) -> DbResult<DatabaseSchema> {
        let database = database.filter(|d| !d.trim().is_empty());
        let limit = conn.query_timeout();
        timeout(limit, load_schema(conn.pool(), database))
            .await
            .map_err(|_| DbError::timeout("schema introspection", limit.as_secs()))?
    }
}

async fn load_schema(pool: &MySqlPool, database: Option<&str>) -> DbResult<DatabaseSchema> {
    if database.is_none() {
        let current: Option<String> = sqlx::query_scalar(queries::CURRENT_DATABASE)
            .fetch_one(pool)
            .await?;
        if current.is_none() {
            return Err(DbError::invalid_input(
                "No database selected. Pass database_name or connect with a database.",
            ));
        }
    }

    let table_rows = sqlx::query(queries::LIST_TABLES)
        .bind(database)
        .fetch_all(pool)
        .await?;
    let column_rows = sqlx::query(queries::LIST_COLUMNS)
        .bind(database)
        .fetch_all(pool)
        .await?;
    let index_rows = sqlx::query(queries::LIST_INDEXES)
        .bind(database)
        .fetch_all(pool)
        .await?;
    let fk_rows = sqlx::query(queries::LIST_FOREIGN_KEYS)
        .bind(database)
        .fetch_all(pool)
        .await?;
    let view_rows = sqlx::query(queries::LIST_VIEWS)
        .bind(database)
        .fetch_all(pool)
        .await?;

    let mut tables: BTreeMap<String, TableInfo> = table_rows
        .iter()
        .map(|row| get_string(row, "TABLE_NAME"))
        .filter(|name| !name.is_empty())
        .map(|name| (name.clone(), TableInfo::new(name)))
        .collect();

    for row in &column_rows {
        if let Some(table) = tables.get_mut(&get_string(row, "TABLE_NAME")) {
            table.columns.push(column_from_row(row));
        }
    }

    for (table_name, index) in group_indexes(&index_rows) {
        if let Some(table) = tables.get_mut(&table_name) {
            table.indexes.push(index);
        }
    }

    for row in &fk_rows {
        if let Some(table) = tables.get_mut(&get_string(row, "TABLE_NAME")) {
            table.foreign_keys.push(ForeignKeyInfo {
                name: get_string(row, "CONSTRAINT_NAME"),
                column: get_string(row, "COLUMN_NAME"),
                referenced_table: get_string(row, "REFERENCED_TABLE_NAME"),
                referenced_column: get_string(row, "REFERENCED_COLUMN_NAME"),
                on_delete: get_optional_string(row, "DELETE_RULE"),
                on_update: get_optional_string(row, "UPDATE_RULE"),
            });
        }
    }

    let views = view_rows
        .iter()
        .map(|row| ViewInfo {
            name: get_string(row, "TABLE_NAME"),
            definition: get_optional_string(row, "VIEW_DEFINITION").filter(|d| !d.is_empty()),
        })
        .filter(|view| !view.name.is_empty())
        .collect::<Vec<_>>();

    debug!(
        database = ?database,
        tables = tables.len(),
        views = views.len(),
        "Loaded MySQL schema"
    );

    Ok(DatabaseSchema {
        tables: tables.into_values().collect(),
        views,
    })
}

fn column_from_row(row: &MySqlRow) -> ColumnInfo {
    let extra = get_string(row, "EXTRA").to_lowercase();
    ColumnInfo {
        name: get_string(row, "COLUMN_NAME"),
        column_type: get_string(row, "COLUMN_TYPE"),
        nullable: get_string(row, "IS_NULLABLE").eq_ignore_ascii_case("YES"),
        default_value: get_optional_string(row, "COLUMN_DEFAULT"),
        is_primary_key: get_string(row, "COLUMN_KEY") == "PRI",
        is_auto_increment: extra.contains("auto_increment"),
        comment: get_optional_string(row, "COLUMN_COMMENT").filter(|c| !c.is_empty()),
    }
}

/// Group STATISTICS rows (one per indexed column) into indexes, keeping
/// the query's table/index ordering.
fn group_indexes(rows: &[MySqlRow]) -> Vec<(String, IndexInfo)> {
    let entries = rows.iter().map(|row| {
        let non_unique = try_get_u64(row, "NON_UNIQUE").unwrap_or(1);
        (
            get_string(row, "TABLE_NAME"),
            get_string(row, "INDEX_NAME"),
            get_string(row, "COLUMN_NAME"),
            non_unique == 0,
        )
    });
    build_indexes(entries)
}

fn build_indexes(
    entries: impl IntoIterator<Item = (String, String, String, bool)>,
) -> Vec<(String, IndexInfo)> {
    let mut indexes: Vec<(String, IndexInfo)> = Vec::new();
    for (table, index_name, column, is_unique) in entries {
        match indexes.last_mut() {
            Some((last_table, index)) if *last_table == table && index.name == index_name => {
                index.columns.push(column);
            }
            _ => {
                let is_primary = index_name == "PRIMARY";
                indexes.push((
                    table,
                    IndexInfo {
                        name: index_name,
                        columns: vec![column],
                        is_unique,
                        is_primary,
                    },
                ));
            }
        }
    }
    indexes
}

/// Try to get a u64 value from a row, handling MySQL version differences.
/// MySQL 5.x may return BIGINT (i64), MySQL 8.x returns BIGINT UNSIGNED (u64).
fn try_get_u64(row: &MySqlRow, column: &str) -> Option<u64> {
    if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(column) {
        return Some(v);
    }
    if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(column) {
        return Some(v as u64);
    }
    None
}

/// Safely get a string from a MySQL row.
/// MySQL may return VARBINARY instead of VARCHAR depending on charset configuration.
fn get_string(row: &MySqlRow, column: &str) -> String {
    get_optional_string(row, column).unwrap_or_default()
}

fn get_optional_string(row: &MySqlRow, column: &str) -> Option<String> {
    row.try_get::<Option<String>, _>(column)
        .ok()
        .flatten()
        .or_else(|| {
            row.try_get::<Option<Vec<u8>>, _>(column)
                .ok()
                .flatten()
                .and_then(|bytes| String::from_utf8(bytes).ok())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(table: &str, index: &str, column: &str, unique: bool) -> (String, String, String, bool) {
        (table.into(), index.into(), column.into(), unique)
    }

    #[test]
    fn test_build_indexes_groups_columns() {
        let indexes = build_indexes(vec![
            entry("orders", "PRIMARY", "id", true),
            entry("orders", "idx_customer_date", "customer_id", false),
            entry("orders", "idx_customer_date", "created_at", false),
            entry("users", "PRIMARY", "id", true),
            entry("users", "uniq_email", "email", true),
        ]);

        assert_eq!(indexes.len(), 4);
        let (table, primary) = &indexes[0];
        assert_eq!(table, "orders");
        assert!(primary.is_primary);
        assert!(primary.is_unique);

        let (_, composite) = &indexes[1];
        assert_eq!(composite.columns, vec!["customer_id", "created_at"]);
        assert!(!composite.is_unique);
        assert!(!composite.is_primary);

        let (table, email) = &indexes[3];
        assert_eq!(table, "users");
        assert!(email.is_unique);
        assert!(!email.is_primary);
    }

    #[test]
    fn test_build_indexes_same_name_different_tables() {
        let indexes = build_indexes(vec![
            entry("a", "PRIMARY", "id", true),
            entry("b", "PRIMARY", "id", true),
        ]);
        assert_eq!(indexes.len(), 2);
    }
}
