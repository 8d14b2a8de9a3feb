//! Pooled MySQL connection for one environment.
//!
//! `MySqlConnection` wraps a single `sqlx::MySqlPool` and exposes the small
//! surface the tools need: statement execution with a timeout, a liveness
//! probe, transactions and teardown.

use crate::config::PoolOptions;
use crate::db::params::bind_all;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{
    ConnectionInfo, ConnectionTestResult, ConnectionType, ExecuteOutcome, MySqlConnectionConfig,
    QueryParam,
};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::{Executor, MySql, MySqlPool, Transaction};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Leading keywords of statements that return a result set.
const ROW_RETURNING_KEYWORDS: &[&str] = &["select", "show", "describe", "desc", "explain", "with"];

/// Leading keywords of statements MySQL commits implicitly, ending any open transaction.
const IMPLICIT_COMMIT_KEYWORDS: &[&str] = &[
    "alter", "create", "drop", "rename", "truncate", "grant", "revoke", "lock", "unlock", "begin",
    "start", "commit",
];

/// Lowercased first keyword of a statement.
///
/// Leading whitespace, `(`, and `-- `, `#` and `/* */` comments are skipped.
pub fn first_keyword(sql: &str) -> String {
    let mut rest = sql;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
        if rest.starts_with('#') || is_dash_comment(rest) {
            rest = rest.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(body) = rest.strip_prefix("/*") {
            rest = body.split_once("*/").map_or("", |(_, tail)| tail);
        } else {
            break;
        }
    }
    rest.chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn is_dash_comment(sql: &str) -> bool {
    sql.strip_prefix("--")
        .is_some_and(|tail| tail.is_empty() || tail.starts_with(char::is_whitespace))
}

/// Check whether a statement returns rows, judged by its first keyword.
pub fn is_row_returning(sql: &str) -> bool {
    ROW_RETURNING_KEYWORDS.contains(&first_keyword(sql).as_str())
}

/// Check whether MySQL commits a statement implicitly, so a rollback cannot undo it.
pub fn causes_implicit_commit(sql: &str) -> bool {
    IMPLICIT_COMMIT_KEYWORDS.contains(&first_keyword(sql).as_str())
}

/// A connection pool bound to one MySQL server.
#[derive(Debug)]
pub struct MySqlConnection {
    pool: MySqlPool,
    config: MySqlConnectionConfig,
    connection_type: ConnectionType,
    query_timeout: Duration,
}

impl MySqlConnection {
    /// Open a pool and verify it with [`test_connection`](Self::test_connection).
    ///
    /// The pool is closed again if the probe fails.
    pub async fn connect(
        config: MySqlConnectionConfig,
        connection_type: ConnectionType,
        pool_options: &PoolOptions,
    ) -> DbResult<Self> {
        let config = config.for_connection_type(connection_type);
        let pool = pool_builder(&config, pool_options)
            .connect_with(connect_options(&config))
            .await
            .map_err(|e| {
                DbError::connection(
                    format!("Failed to connect to {}: {}", config.display_target(), e),
                    connection_suggestion(&e.to_string(), connection_type),
                )
            })?;

        let connection = Self::from_pool(pool, config, connection_type, pool_options);
        let test = connection.test_connection().await;
        if !test.success {
            connection.close().await;
            let error = test.error.unwrap_or_else(|| test.message.clone());
            return Err(DbError::connection(
                format!("Connection test failed: {}", error),
                connection_suggestion(&error, connection_type),
            ));
        }

        info!(
            target_db = %connection.config.display_target(),
            connection_type = %connection_type,
            server_version = ?test.server_version,
            "MySQL connection established"
        );
        Ok(connection)
    }

    /// Build a connection whose pool connects on first use.
    ///
    /// Nothing touches the network until a statement runs.
    pub fn connect_lazy(
        config: MySqlConnectionConfig,
        connection_type: ConnectionType,
        pool_options: &PoolOptions,
    ) -> Self {
        let config = config.for_connection_type(connection_type);
        let pool = pool_builder(&config, pool_options).connect_lazy_with(connect_options(&config));
        Self::from_pool(pool, config, connection_type, pool_options)
    }

    fn from_pool(
        pool: MySqlPool,
        config: MySqlConnectionConfig,
        connection_type: ConnectionType,
        pool_options: &PoolOptions,
    ) -> Self {
        let query_timeout = Duration::from_millis(
            config
                .timeout_ms
                .unwrap_or_else(|| pool_options.query_timeout_or_default()),
        );
        Self {
            pool,
            config,
            connection_type,
            query_timeout,
        }
    }

    /// Execute one statement.
    ///
    /// Row-returning statements yield decoded rows; everything else yields
    /// the affected row count and last insert id.
    pub async fn execute(&self, sql: &str, params: &[QueryParam]) -> DbResult<ExecuteOutcome> {
        run_statement(&self.pool, sql, params, self.query_timeout).await
    }

    /// Probe the server with `SELECT 1` and fetch its version.
    ///
    /// Never fails: problems are reported in the result.
    pub async fn test_connection(&self) -> ConnectionTestResult {
        let start = Instant::now();
        let probe = timeout(
            self.query_timeout,
            sqlx::query("SELECT 1 AS ok").fetch_one(&self.pool),
        )
        .await;

        match probe {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return ConnectionTestResult::failed(e.to_string()),
            Err(_) => {
                return ConnectionTestResult::failed(format!(
                    "Connection test exceeded {}s",
                    self.query_timeout.as_secs()
                ));
            }
        }

        // A failed version lookup does not make the server unreachable
        let server_version = sqlx::query_scalar::<_, String>("SELECT @@version AS version")
            .fetch_one(&self.pool)
            .await
            .inspect_err(|e| debug!(error = %e, "Server version lookup failed"))
            .ok();

        ConnectionTestResult::ok(start.elapsed().as_millis() as u64, server_version)
    }

    /// Start a transaction on a pooled connection.
    pub async fn begin(&self) -> DbResult<MySqlTransaction> {
        let tx = timeout(self.query_timeout, self.pool.begin())
            .await
            .map_err(|_| timeout_error("begin transaction", self.query_timeout))??;
        Ok(MySqlTransaction {
            tx,
            query_timeout: self.query_timeout,
        })
    }

    /// Close the pool. Safe to call more than once.
    pub async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
            debug!(target_db = %self.config.display_target(), "MySQL pool closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Connection details without credentials.
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            connection_type: self.connection_type,
            host: self.config.host.clone(),
            port: self.config.port,
            user: self.config.user.clone(),
            database: self.config.database.clone(),
            container_name: self.config.container_name.clone(),
        }
    }

    pub fn config(&self) -> &MySqlConnectionConfig {
        &self.config
    }

    pub fn connection_type(&self) -> ConnectionType {
        self.connection_type
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    pub(crate) fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

/// An open transaction. Dropping it without committing rolls it back.
pub struct MySqlTransaction {
    tx: Transaction<'static, MySql>,
    query_timeout: Duration,
}

impl MySqlTransaction {
    pub async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<ExecuteOutcome> {
        run_statement(&mut *self.tx, sql, params, self.query_timeout).await
    }

    pub async fn commit(self) -> DbResult<()> {
        self.tx.commit().await.map_err(DbError::from)
    }

    pub async fn rollback(self) -> DbResult<()> {
        self.tx.rollback().await.map_err(DbError::from)
    }
}

fn connect_options(config: &MySqlConnectionConfig) -> MySqlConnectOptions {
    let options = MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .charset("utf8mb4");
    match config.database.as_deref().filter(|db| !db.is_empty()) {
        Some(database) => options.database(database),
        None => options,
    }
}

fn pool_builder(config: &MySqlConnectionConfig, pool_options: &PoolOptions) -> MySqlPoolOptions {
    let max_connections = config
        .connection_limit
        .unwrap_or_else(|| pool_options.max_connections_or_default());
    let acquire_timeout = Duration::from_millis(
        config
            .acquire_timeout_ms
            .unwrap_or_else(|| pool_options.acquire_timeout_or_default()),
    );
    let idle_timeout = Some(Duration::from_secs(pool_options.idle_timeout_or_default()));

    MySqlPoolOptions::new()
        .min_connections(
            pool_options
                .min_connections_or_default()
                .min(max_connections),
        )
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .idle_timeout(idle_timeout)
        .test_before_acquire(pool_options.test_before_acquire_or_default())
}

/// Run one statement on any MySQL executor (pool or transaction).
async fn run_statement<'c, E>(
    executor: E,
    sql: &str,
    params: &[QueryParam],
    query_timeout: Duration,
) -> DbResult<ExecuteOutcome>
where
    E: Executor<'c, Database = MySql>,
{
    let start = Instant::now();
    debug!(sql = %sql, params = params.len(), "Executing statement");

    // When params is empty, use raw SQL to avoid prepared statement issues
    // (SHOW, DDL and procedures are not all preparable)
    if is_row_returning(sql) {
        let fetch = async {
            if params.is_empty() {
                executor.fetch_all(sql).await
            } else {
                bind_all(sql, params).fetch_all(executor).await
            }
        };
        let rows = timeout(query_timeout, fetch)
            .await
            .map_err(|_| timeout_error("query execution", query_timeout))??;

        Ok(ExecuteOutcome::Rows {
            rows: rows.iter().map(RowToJson::to_json_map).collect(),
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    } else {
        let write = async {
            if params.is_empty() {
                executor.execute(sql).await
            } else {
                bind_all(sql, params).execute(executor).await
            }
        };
        let result = timeout(query_timeout, write)
            .await
            .map_err(|_| timeout_error("statement execution", query_timeout))??;

        Ok(ExecuteOutcome::Write {
            rows_affected: result.rows_affected(),
            last_insert_id: result.last_insert_id(),
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

fn timeout_error(operation: &str, limit: Duration) -> DbError {
    warn!(operation, timeout_secs = limit.as_secs(), "Operation timed out");
    DbError::timeout(operation, limit.as_secs())
}

/// Generate a helpful suggestion for connection errors.
pub fn connection_suggestion(error: &str, connection_type: ConnectionType) -> String {
    let error = error.to_lowercase();

    if error.contains("access denied") || error.contains("password") {
        return "Verify the MySQL user name and password".to_string();
    }

    if error.contains("unknown database") {
        return "Check that the database exists or omit it to connect to the server".to_string();
    }

    if error.contains("connection refused") {
        return match connection_type {
            ConnectionType::Docker => {
                "Check that the MySQL container is running and its port is published".to_string()
            }
            _ => "Check that the MySQL server is running and the host and port are correct"
                .to_string(),
        };
    }

    if error.contains("timed out") || error.contains("timeout") {
        return "The server did not answer in time; check network access and firewall rules"
            .to_string();
    }

    if error.contains("tls") || error.contains("ssl") {
        return "Check TLS/SSL configuration on the server".to_string();
    }

    "Check the host, port, user and database settings".to_string()
}
