//! SQL execution tools.
//!
//! This module implements `mysql_execute_sql`, `mysql_execute_batch` and
//! `mysql_execute_script`, all of which run against the current session.

use crate::db::connection::causes_implicit_commit;
use crate::db::SessionRegistry;
use crate::error::{DbError, DbResult};
use crate::models::{QueryParam, SqlExecutionResult, SqlScriptResult};
use schemars::JsonSchema;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Input for the mysql_execute_sql tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteSqlInput {
    /// SQL statement to execute
    pub sql: String,
    /// Positional parameters for `?` placeholders
    #[serde(default)]
    pub params: Vec<QueryParam>,
}

/// Input for the mysql_execute_batch tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteBatchInput {
    /// Multiple SQL statements separated by semicolons
    #[serde(alias = "sqlScript")]
    pub sql_script: String,
    /// Run all statements in one transaction and roll back on the first failure. Default: false
    #[serde(default)]
    pub atomic: bool,
}

/// Input for the mysql_execute_script tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteScriptInput {
    /// Path to a .sql file; relative paths resolve against the project root
    #[serde(alias = "scriptPath")]
    pub script_path: String,
    /// Run all statements in one transaction and roll back on the first failure. Default: false
    #[serde(default)]
    pub atomic: bool,
}

pub struct SqlToolHandler {
    registry: Arc<SessionRegistry>,
}

impl SqlToolHandler {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Run one statement on the current session.
    ///
    /// Database failures are reported in the result; only a missing session
    /// or empty SQL is an error.
    pub async fn execute_sql(&self, input: ExecuteSqlInput) -> DbResult<SqlExecutionResult> {
        let sql = input.sql.trim();
        if sql.is_empty() {
            return Err(DbError::invalid_input("sql must not be empty"));
        }

        let conn = self.registry.current_connection().await?;
        match conn.execute(sql, &input.params).await {
            Ok(outcome) => {
                let result = SqlExecutionResult::from_outcome(outcome);
                info!(
                    execution_time_ms = ?result.execution_time_ms,
                    message = %result.message,
                    "SQL executed"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(error = %e, "SQL execution failed");
                Ok(SqlExecutionResult::failed(e.to_string()))
            }
        }
    }

    /// Run a semicolon-separated script on the current session.
    pub async fn execute_batch(&self, script: &str, atomic: bool) -> DbResult<SqlScriptResult> {
        let conn = self.registry.current_connection().await?;
        let statements = split_statements(script);
        let start = Instant::now();

        let mut result = if atomic {
            run_atomic(&conn, &statements).await?
        } else {
            run_sequential(&conn, &statements).await
        };
        result.execution_time_ms = start.elapsed().as_millis() as u64;

        info!(
            total = result.total_statements,
            successful = result.successful_statements,
            failed = result.failed_statements,
            atomic,
            execution_time_ms = result.execution_time_ms,
            "SQL batch executed"
        );
        Ok(result)
    }

    /// Read a script file and run it like [`execute_batch`](Self::execute_batch).
    pub async fn execute_script(&self, path: &str, atomic: bool) -> DbResult<SqlScriptResult> {
        // Fail fast on a missing session before touching the file
        self.registry.current_connection().await?;

        let path = resolve_path(&self.registry.root().await, path);
        match tokio::fs::read_to_string(&path).await {
            Ok(script) => self.execute_batch(&script, atomic).await,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read script file");
                Ok(SqlScriptResult {
                    success: false,
                    results: Vec::new(),
                    total_statements: 0,
                    successful_statements: 0,
                    failed_statements: 1,
                    execution_time_ms: 0,
                    errors: vec![format!("Failed to read script file: {}", e)],
                })
            }
        }
    }
}

async fn run_sequential(
    conn: &crate::db::MySqlConnection,
    statements: &[String],
) -> SqlScriptResult {
    let mut results = Vec::with_capacity(statements.len());
    let mut errors = Vec::new();

    for (i, sql) in statements.iter().enumerate() {
        match conn.execute(sql, &[]).await {
            Ok(outcome) => results.push(SqlExecutionResult::from_outcome(outcome)),
            Err(e) => {
                errors.push(format!("Statement {}: {}", i + 1, e));
                results.push(SqlExecutionResult::failed(e.to_string()));
            }
        }
    }

    script_result(statements.len(), results, errors)
}

/// Run every statement in one transaction. The first failure rolls back
/// and leaves the remaining statements unexecuted.
///
/// MySQL commits DDL and a few other statements implicitly. Once one of
/// those has succeeded the rollback can no longer undo earlier work, and
/// the result counts what actually ran.
async fn run_atomic(
    conn: &crate::db::MySqlConnection,
    statements: &[String],
) -> DbResult<SqlScriptResult> {
    let mut tx = conn.begin().await?;
    let mut results = Vec::with_capacity(statements.len());
    let mut committed_at: Option<usize> = None;

    for (i, sql) in statements.iter().enumerate() {
        match tx.execute(sql, &[]).await {
            Ok(outcome) => {
                results.push(SqlExecutionResult::from_outcome(outcome));
                if committed_at.is_none() && causes_implicit_commit(sql) {
                    committed_at = Some(i + 1);
                }
            }
            Err(e) => {
                let mut errors = vec![format!("Statement {}: {}", i + 1, e)];
                results.push(SqlExecutionResult::failed(e.to_string()));
                match tx.rollback().await {
                    Ok(()) if committed_at.is_none() => {
                        errors.push("Transaction rolled back; no changes were applied".into())
                    }
                    Ok(()) => {}
                    Err(rb) => errors.push(format!("Rollback failed: {}", rb)),
                }
                return Ok(aborted(statements.len(), results, errors, committed_at));
            }
        }
    }

    if let Err(e) = tx.commit().await {
        return Ok(aborted(
            statements.len(),
            results,
            vec![format!("Commit failed: {}", e)],
            committed_at,
        ));
    }
    Ok(script_result(statements.len(), results, Vec::new()))
}

fn script_result(
    total: usize,
    results: Vec<SqlExecutionResult>,
    errors: Vec<String>,
) -> SqlScriptResult {
    let successful = results.iter().filter(|r| r.success).count();
    let failed = total - successful;
    SqlScriptResult {
        success: failed == 0,
        results,
        total_statements: total,
        successful_statements: successful,
        failed_statements: failed,
        execution_time_ms: 0,
        errors,
    }
}

/// Result of an atomic run that did not commit.
///
/// Without an implicit commit nothing was applied, so every statement
/// counts as failed. After one, the successful statements stay applied.
fn aborted(
    total: usize,
    results: Vec<SqlExecutionResult>,
    mut errors: Vec<String>,
    committed_at: Option<usize>,
) -> SqlScriptResult {
    match committed_at {
        Some(n) => {
            errors.push(format!(
                "Statement {} committed implicitly; successful statements were applied and could not be rolled back",
                n
            ));
            script_result(total, results, errors)
        }
        None => SqlScriptResult {
            success: false,
            results,
            total_statements: total,
            successful_statements: 0,
            failed_statements: total,
            execution_time_ms: 0,
            errors,
        },
    }
}

fn resolve_path(root: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Split a script into statements on `;`.
///
/// Semicolons inside quoted strings or identifiers do not split. Comments
/// (`-- `, `#`, `/* */`) are dropped, and so are statements left empty.
pub fn split_statements(script: &str) -> Vec<String> {
    let chars: Vec<char> = script.chars().collect();
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if let Some(q) = quote {
            current.push(c);
            if c == '\\' && q != '`' {
                if let Some(&next) = chars.get(i + 1) {
                    current.push(next);
                    i += 1;
                }
            } else if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                current.push(c);
            }
            ';' => {
                push_statement(&mut statements, &current);
                current.clear();
            }
            '-' if chars.get(i + 1) == Some(&'-')
                && chars.get(i + 2).is_none_or(|n| n.is_whitespace()) =>
            {
                i = skip_line(&chars, i);
                current.push('\n');
                continue;
            }
            '#' => {
                i = skip_line(&chars, i);
                current.push('\n');
                continue;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i = skip_block_comment(&chars, i);
                current.push(' ');
                continue;
            }
            _ => current.push(c),
        }
        i += 1;
    }

    push_statement(&mut statements, &current);
    statements
}

fn push_statement(statements: &mut Vec<String>, raw: &str) {
    let statement = raw.trim();
    if !statement.is_empty() {
        statements.push(statement.to_string());
    }
}

/// Index just past the end of the current line.
fn skip_line(chars: &[char], from: usize) -> usize {
    chars[from..]
        .iter()
        .position(|&c| c == '\n')
        .map(|offset| from + offset + 1)
        .unwrap_or(chars.len())
}

/// Index just past the closing `*/`, or the end of input if unterminated.
fn skip_block_comment(chars: &[char], from: usize) -> usize {
    let mut i = from + 2;
    while i + 1 < chars.len() {
        if chars[i] == '*' && chars[i + 1] == '/' {
            return i + 2;
        }
        i += 1;
    }
    chars.len()
}
