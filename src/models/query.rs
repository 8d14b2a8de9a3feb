//! Query-related data models.
//!
//! This module defines types for SQL execution requests and results.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A row decoded to JSON, keyed by column name.
pub type JsonRow = serde_json::Map<String, JsonValue>;

/// A parameter value for parameterized statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
        }
    }
}

/// Raw result of running one statement on a connection.
#[derive(Debug, Clone)]
pub enum ExecuteOutcome {
    /// Row-returning statement (SELECT, SHOW, DESCRIBE, ...)
    Rows {
        rows: Vec<JsonRow>,
        execution_time_ms: u64,
    },
    /// Any other statement
    Write {
        rows_affected: u64,
        last_insert_id: u64,
        execution_time_ms: u64,
    },
}

impl ExecuteOutcome {
    pub fn execution_time_ms(&self) -> u64 {
        match self {
            Self::Rows {
                execution_time_ms, ..
            }
            | Self::Write {
                execution_time_ms, ..
            } => *execution_time_ms,
        }
    }
}

/// Result of a single SQL statement as reported to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlExecutionResult {
    pub success: bool,
    /// Present for row-returning statements
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<JsonRow>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_rows: Option<u64>,
    /// None when the statement generated no id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_id: Option<u64>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl SqlExecutionResult {
    /// Build a successful result from a statement outcome.
    pub fn from_outcome(outcome: ExecuteOutcome) -> Self {
        match outcome {
            ExecuteOutcome::Rows {
                rows,
                execution_time_ms,
            } => Self {
                success: true,
                message: format!("Query OK, {} rows returned", rows.len()),
                data: Some(rows),
                affected_rows: None,
                insert_id: None,
                error: None,
                execution_time_ms: Some(execution_time_ms),
            },
            ExecuteOutcome::Write {
                rows_affected,
                last_insert_id,
                execution_time_ms,
            } => Self {
                success: true,
                message: format!("OK, {} rows affected", rows_affected),
                data: None,
                affected_rows: Some(rows_affected),
                insert_id: Some(last_insert_id).filter(|id| *id != 0),
                error: None,
                execution_time_ms: Some(execution_time_ms),
            },
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            affected_rows: None,
            insert_id: None,
            message: "SQL execution failed".to_string(),
            error: Some(error.into()),
            execution_time_ms: None,
        }
    }
}

/// Aggregate result of a multi-statement script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlScriptResult {
    pub success: bool,
    pub results: Vec<SqlExecutionResult>,
    pub total_statements: usize,
    pub successful_statements: usize,
    pub failed_statements: usize,
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param_untagged() {
        let params: Vec<QueryParam> =
            serde_json::from_str(r#"[null, true, 42, 1.5, "abc"]"#).unwrap();
        assert_eq!(
            params,
            vec![
                QueryParam::Null,
                QueryParam::Bool(true),
                QueryParam::Int(42),
                QueryParam::Float(1.5),
                QueryParam::String("abc".into()),
            ]
        );
        assert!(params[0].is_null());
        assert_eq!(params[4].type_name(), "string");
    }

    #[test]
    fn test_rows_outcome_message() {
        let mut row = JsonRow::new();
        row.insert("id".into(), JsonValue::from(1));
        let result = SqlExecutionResult::from_outcome(ExecuteOutcome::Rows {
            rows: vec![row.clone(), row],
            execution_time_ms: 3,
        });
        assert!(result.success);
        assert_eq!(result.message, "Query OK, 2 rows returned");
        assert_eq!(result.data.as_ref().map(Vec::len), Some(2));
        assert!(result.affected_rows.is_none());
    }

    #[test]
    fn test_write_outcome_zero_insert_id_is_none() {
        let result = SqlExecutionResult::from_outcome(ExecuteOutcome::Write {
            rows_affected: 4,
            last_insert_id: 0,
            execution_time_ms: 1,
        });
        assert_eq!(result.message, "OK, 4 rows affected");
        assert_eq!(result.affected_rows, Some(4));
        assert_eq!(result.insert_id, None);

        let result = SqlExecutionResult::from_outcome(ExecuteOutcome::Write {
            rows_affected: 1,
            last_insert_id: 17,
            execution_time_ms: 1,
        });
        assert_eq!(result.insert_id, Some(17));
    }
}
