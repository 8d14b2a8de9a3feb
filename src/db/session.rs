//! Session registry for MySQL connections across MCP tool calls.
//!
//! A session is an open pooled connection bound to one environment. The
//! registry tracks every session, which one is current, and the last
//! project detection result. All state sits behind a single `RwLock`;
//! network work (connecting, probing, closing) always happens outside it.

use crate::config::PoolOptions;
use crate::db::MySqlConnection;
use crate::detect::ProjectDetector;
use crate::error::{DbError, DbResult};
use crate::models::{
    ConnectionInfo, ConnectionType, EnvironmentKind, MySqlConnectionConfig, ProjectEnvironment,
    ProjectInfo,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Default idle time before a session is closed.
pub const DEFAULT_MAX_IDLE: Duration = Duration::from_secs(30 * 60);

struct Session {
    environment: ProjectEnvironment,
    connection: Arc<MySqlConnection>,
    /// Creation order, for stable listing
    seq: u64,
    created_at: Instant,
    last_used: Instant,
}

impl Session {
    fn touch(&mut self) {
        self.last_used = Instant::now();
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub environment_name: String,
    pub display_name: String,
    pub source: String,
    pub kind: EnvironmentKind,
    pub connection: ConnectionInfo,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    pub is_current: bool,
}

/// Aggregate counters shown by `mysql_list_sessions`.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStats {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub current_environment: Option<String>,
    pub detected_environments: usize,
}

struct RegistryState {
    sessions: HashMap<String, Session>,
    current: Option<String>,
    project: Option<ProjectInfo>,
    detector: ProjectDetector,
    next_seq: u64,
}

impl RegistryState {
    fn session_for_environment(&self, name: &str) -> Option<String> {
        self.sessions
            .iter()
            .filter(|(_, s)| s.environment.name == name)
            .min_by_key(|(_, s)| s.seq)
            .map(|(id, _)| id.clone())
    }
}

pub struct SessionRegistry {
    state: RwLock<RegistryState>,
    pool_options: PoolOptions,
    /// System start time for converting Instant to DateTime
    system_start_instant: Instant,
    /// System start time as UTC DateTime
    system_start_datetime: DateTime<Utc>,
}

impl SessionRegistry {
    /// Create an empty registry that detects projects under `root`.
    pub fn new(root: impl Into<PathBuf>, pool_options: PoolOptions) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                sessions: HashMap::new(),
                current: None,
                project: None,
                detector: ProjectDetector::new(root),
                next_seq: 0,
            }),
            pool_options,
            system_start_instant: Instant::now(),
            system_start_datetime: Utc::now(),
        }
    }

    pub fn pool_options(&self) -> &PoolOptions {
        &self.pool_options
    }

    // -------------------------------------------------------------------------
    // Project detection
    // -------------------------------------------------------------------------

    /// Scan the configured root and remember the result.
    pub async fn detect_project(&self) -> DbResult<ProjectInfo> {
        let detector = self.state.read().await.detector.clone();
        let info = detector.detect().await?;

        let mut state = self.state.write().await;
        if state.detector.root() == detector.root() {
            state.project = Some(info.clone());
        } else {
            debug!(
                root = %detector.root().display(),
                "Project root changed during detection; result not stored"
            );
        }
        Ok(info)
    }

    /// Detect the project under another directory and adopt it as the root.
    ///
    /// The root and the stored project only change when detection succeeds.
    pub async fn detect_project_at(&self, root: impl Into<PathBuf>) -> DbResult<ProjectInfo> {
        let detector = ProjectDetector::new(root);
        let info = detector.detect().await?;

        let mut state = self.state.write().await;
        info!(root = %detector.root().display(), "Project root changed");
        state.detector = detector;
        state.project = Some(info.clone());
        Ok(info)
    }

    /// Point detection at another directory. Open sessions stay open.
    pub async fn set_root(&self, root: impl Into<PathBuf>) {
        let root = root.into();
        let mut state = self.state.write().await;
        info!(root = %root.display(), "Project root changed");
        state.detector = ProjectDetector::new(root);
        state.project = None;
    }

    pub async fn root(&self) -> PathBuf {
        self.state.read().await.detector.root().to_path_buf()
    }

    pub async fn project_info(&self) -> Option<ProjectInfo> {
        self.state.read().await.project.clone()
    }

    pub async fn list_environments(&self) -> Vec<ProjectEnvironment> {
        self.state
            .read()
            .await
            .project
            .as_ref()
            .map(|p| p.environments.clone())
            .unwrap_or_default()
    }

    // -------------------------------------------------------------------------
    // Connecting
    // -------------------------------------------------------------------------

    /// Connect to a detected environment and make it current.
    ///
    /// An existing session for the same environment is reused.
    pub async fn connect_to_environment(&self, name: &str) -> DbResult<SessionInfo> {
        let environment = {
            let mut state = self.state.write().await;
            let project = state.project.as_ref().ok_or(DbError::ProjectNotDetected)?;
            let environment = project
                .find_environment(name)
                .cloned()
                .ok_or_else(|| DbError::environment_not_found(name))?;

            if let Some(id) = state.session_for_environment(name) {
                if let Some(info) = self.activate(&mut state, &id) {
                    debug!(session_id = %id, environment = %name, "Reusing existing session");
                    return Ok(info);
                }
            }
            environment
        };

        let connection = MySqlConnection::connect(
            environment.config.clone(),
            ConnectionType::Direct,
            &self.pool_options,
        )
        .await?;

        let mut state = self.state.write().await;
        // Another caller may have connected the same environment meanwhile
        let existing = state.session_for_environment(name);
        if let Some(info) = existing.and_then(|id| self.activate(&mut state, &id)) {
            drop(state);
            connection.close().await;
            return Ok(info);
        }
        Ok(self.insert(&mut state, environment, connection))
    }

    /// Connect with explicit parameters. Always opens a new session.
    pub async fn connect_manually(
        &self,
        config: MySqlConnectionConfig,
        connection_type: ConnectionType,
        name: Option<String>,
    ) -> DbResult<SessionInfo> {
        let connection = MySqlConnection::connect(config, connection_type, &self.pool_options).await?;
        let environment = ProjectEnvironment::manual(name, connection.config().clone());
        Ok(self.register_session(environment, connection).await)
    }

    /// Adopt an open connection as a new session and make it current.
    pub async fn register_session(
        &self,
        environment: ProjectEnvironment,
        connection: MySqlConnection,
    ) -> SessionInfo {
        let mut state = self.state.write().await;
        self.insert(&mut state, environment, connection)
    }

    fn insert(
        &self,
        state: &mut RegistryState,
        environment: ProjectEnvironment,
        connection: MySqlConnection,
    ) -> SessionInfo {
        let id = generate_session_id();
        let now = Instant::now();
        let seq = state.next_seq;
        state.next_seq += 1;

        info!(
            session_id = %id,
            environment = %environment.name,
            target_db = %connection.config().display_target(),
            "Session opened"
        );

        let session = Session {
            environment,
            connection: Arc::new(connection),
            seq,
            created_at: now,
            last_used: now,
        };
        let info = self.describe(&id, &session, true);
        state.sessions.insert(id.clone(), session);
        state.current = Some(id);
        info
    }

    /// Touch a session and make it current.
    fn activate(&self, state: &mut RegistryState, id: &str) -> Option<SessionInfo> {
        state.sessions.get_mut(id)?.touch();
        state.current = Some(id.to_string());
        self.snapshot(state, id)
    }

    // -------------------------------------------------------------------------
    // Session access
    // -------------------------------------------------------------------------

    pub async fn switch_to_session(&self, id: &str) -> DbResult<SessionInfo> {
        let mut state = self.state.write().await;
        let info = self
            .activate(&mut state, id)
            .ok_or_else(|| DbError::session_not_found(id))?;
        info!(session_id = %id, "Switched current session");
        Ok(info)
    }

    pub async fn current_session(&self) -> Option<SessionInfo> {
        let state = self.state.read().await;
        let id = state.current.as_deref()?;
        self.snapshot(&state, id)
    }

    /// Connection of the current session. Counts as a use of that session.
    pub async fn current_connection(&self) -> DbResult<Arc<MySqlConnection>> {
        let mut state = self.state.write().await;
        let id = state.current.clone().ok_or(DbError::NotConnected)?;
        let session = state.sessions.get_mut(&id).ok_or(DbError::NotConnected)?;
        session.touch();
        Ok(session.connection.clone())
    }

    /// All sessions in creation order.
    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        let state = self.state.read().await;
        let mut ids: Vec<(&String, u64)> = state.sessions.iter().map(|(id, s)| (id, s.seq)).collect();
        ids.sort_by_key(|(_, seq)| *seq);
        ids.into_iter()
            .filter_map(|(id, _)| self.snapshot(&state, id))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Disconnecting
    // -------------------------------------------------------------------------

    /// Close one session. Returns its final snapshot, or `None` for an unknown id.
    pub async fn disconnect_session(&self, id: &str) -> Option<SessionInfo> {
        let (info, session) = {
            let mut state = self.state.write().await;
            let info = self.snapshot(&state, id)?;
            let session = state.sessions.remove(id)?;
            if state.current.as_deref() == Some(id) {
                state.current = None;
            }
            (info, session)
        };

        session.connection.close().await;
        info!(session_id = %id, environment = %info.environment_name, "Session closed");
        Some(info)
    }

    /// Close the current session, if any.
    pub async fn disconnect_current(&self) -> Option<SessionInfo> {
        let id = self.state.read().await.current.clone()?;
        self.disconnect_session(&id).await
    }

    /// Close every session. Returns how many were closed.
    pub async fn disconnect_all(&self) -> usize {
        let sessions: Vec<(String, Session)> = {
            let mut state = self.state.write().await;
            state.current = None;
            state.sessions.drain().collect()
        };

        let count = sessions.len();
        for (id, session) in sessions {
            session.connection.close().await;
            debug!(session_id = %id, "Session closed");
        }
        if count > 0 {
            info!(count, "All sessions closed");
        }
        count
    }

    // -------------------------------------------------------------------------
    // Probing, stats and summaries
    // -------------------------------------------------------------------------

    /// Open a throwaway connection to a detected environment and probe it.
    ///
    /// `false` when nothing is detected, the name is unknown or the probe fails.
    pub async fn test_environment_connection(&self, name: &str) -> bool {
        let environment = {
            let state = self.state.read().await;
            match state.project.as_ref().and_then(|p| p.find_environment(name)) {
                Some(env) => env.clone(),
                None => return false,
            }
        };

        match MySqlConnection::connect(
            environment.config,
            ConnectionType::Direct,
            &self.pool_options,
        )
        .await
        {
            Ok(connection) => {
                let result = connection.test_connection().await;
                connection.close().await;
                result.success
            }
            Err(e) => {
                warn!(environment = %name, error = %e, "Environment connection test failed");
                false
            }
        }
    }

    pub async fn connection_stats(&self) -> ConnectionStats {
        let state = self.state.read().await;
        let current_environment = state
            .current
            .as_ref()
            .and_then(|id| state.sessions.get(id))
            .map(|s| s.environment.name.clone());
        ConnectionStats {
            total_sessions: state.sessions.len(),
            active_sessions: state.sessions.len(),
            current_environment,
            detected_environments: state
                .project
                .as_ref()
                .map(|p| p.environments.len())
                .unwrap_or(0),
        }
    }

    /// Human-readable overview of detected environments and their state.
    pub async fn environment_summary(&self) -> String {
        let state = self.state.read().await;
        let Some(project) = state.project.as_ref() else {
            return "No project configuration detected".to_string();
        };

        let mut lines = vec![
            format!("Project type: {}", project.project_type),
            format!("Detected {} environments:", project.environments.len()),
        ];
        for env in &project.environments {
            let status = if state.session_for_environment(&env.name).is_some() {
                "connected"
            } else {
                "not connected"
            };
            lines.push(format!("  - {} [{}]", env.display_name, status));
        }

        if let Some(session) = state.current.as_ref().and_then(|id| state.sessions.get(id)) {
            lines.push(String::new());
            lines.push(format!(
                "Current environment: {}",
                session.environment.display_name
            ));
        }
        lines.join("\n")
    }

    // -------------------------------------------------------------------------
    // Idle cleanup
    // -------------------------------------------------------------------------

    /// Close sessions unused for longer than `max_idle`. Returns their ids.
    pub async fn cleanup_expired_sessions(&self, max_idle: Duration) -> Vec<String> {
        let expired: Vec<(String, Session)> = {
            let mut state = self.state.write().await;
            let ids: Vec<String> = state
                .sessions
                .iter()
                .filter(|(_, s)| s.last_used.elapsed() > max_idle)
                .map(|(id, _)| id.clone())
                .collect();

            let mut removed = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(session) = state.sessions.remove(&id) {
                    if state.current.as_deref() == Some(id.as_str()) {
                        state.current = None;
                    }
                    removed.push((id, session));
                }
            }
            removed
        };

        let mut ids = Vec::with_capacity(expired.len());
        for (id, session) in expired {
            warn!(
                session_id = %id,
                idle_secs = session.last_used.elapsed().as_secs(),
                "Closing idle session"
            );
            session.connection.close().await;
            ids.push(id);
        }
        ids
    }

    /// Start a background task that closes idle sessions.
    ///
    /// This should be called once when the server starts.
    pub fn start_cleanup_task(self: Arc<Self>, interval: Duration, max_idle: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = self.cleanup_expired_sessions(max_idle).await;
                if !removed.is_empty() {
                    info!(count = removed.len(), "Idle sessions cleaned up");
                }
            }
        });
    }

    fn snapshot(&self, state: &RegistryState, id: &str) -> Option<SessionInfo> {
        let session = state.sessions.get(id)?;
        Some(self.describe(id, session, state.current.as_deref() == Some(id)))
    }

    fn describe(&self, id: &str, session: &Session, is_current: bool) -> SessionInfo {
        SessionInfo {
            id: id.to_string(),
            environment_name: session.environment.name.clone(),
            display_name: session.environment.display_name.clone(),
            source: session.environment.source.clone(),
            kind: session.environment.kind,
            connection: session.connection.info(),
            created_at: self.to_datetime(session.created_at),
            last_used: self.to_datetime(session.last_used),
            is_current,
        }
    }

    /// Convert Instant to DateTime by calculating offset from system start.
    fn to_datetime(&self, instant: Instant) -> DateTime<Utc> {
        self.system_start_datetime + instant.duration_since(self.system_start_instant)
    }
}

/// `session_<unix millis>_<9 hex chars>`
fn generate_session_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("session_{}_{}", Utc::now().timestamp_millis(), &suffix[..9])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProjectType;
    use std::fs;
    use tempfile::TempDir;

    fn registry(root: &std::path::Path) -> SessionRegistry {
        SessionRegistry::new(root, PoolOptions::default())
    }

    fn lazy_connection(database: &str) -> MySqlConnection {
        MySqlConnection::connect_lazy(
            MySqlConnectionConfig::new("localhost", 3306, "root", "", Some(database.into())),
            ConnectionType::Direct,
            &PoolOptions::default(),
        )
    }

    fn manual(name: &str, database: &str) -> ProjectEnvironment {
        ProjectEnvironment::manual(
            Some(name.to_string()),
            MySqlConnectionConfig::new("localhost", 3306, "root", "", Some(database.into())),
        )
    }

    #[test]
    fn test_session_id_format() {
        let id = generate_session_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "session");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let dir = TempDir::new().unwrap();
        let registry = registry(dir.path());
        assert!(registry.current_session().await.is_none());
        assert!(matches!(
            registry.current_connection().await,
            Err(DbError::NotConnected)
        ));
        assert!(registry.list_sessions().await.is_empty());
        assert!(registry.list_environments().await.is_empty());
        assert_eq!(
            registry.environment_summary().await,
            "No project configuration detected"
        );
        assert!(registry.disconnect_current().await.is_none());
        assert!(registry.disconnect_session("session_missing").await.is_none());
    }

    #[tokio::test]
    async fn test_register_makes_current_and_lists_in_order() {
        let dir = TempDir::new().unwrap();
        let registry = registry(dir.path());
        let first = registry
            .register_session(manual("a", "one"), lazy_connection("one"))
            .await;
        let second = registry
            .register_session(manual("b", "two"), lazy_connection("two"))
            .await;

        assert!(second.is_current);
        let sessions = registry.list_sessions().await;
        let ids: Vec<_> = sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);
        assert!(!sessions[0].is_current);
        assert!(sessions[1].is_current);

        let switched = registry.switch_to_session(&first.id).await.unwrap();
        assert!(switched.is_current);
        assert_eq!(
            registry.current_session().await.unwrap().environment_name,
            "a"
        );
        registry.disconnect_all().await;
    }

    #[tokio::test]
    async fn test_switch_unknown_session() {
        let dir = TempDir::new().unwrap();
        let registry = registry(dir.path());
        assert!(matches!(
            registry.switch_to_session("nope").await,
            Err(DbError::SessionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_disconnect_current_clears_pointer() {
        let dir = TempDir::new().unwrap();
        let registry = registry(dir.path());
        let keep = registry
            .register_session(manual("keep", "one"), lazy_connection("one"))
            .await;
        let drop_me = registry
            .register_session(manual("drop", "two"), lazy_connection("two"))
            .await;

        let closed = registry.disconnect_current().await.unwrap();
        assert_eq!(closed.id, drop_me.id);
        assert!(registry.current_session().await.is_none());
        assert_eq!(registry.list_sessions().await.len(), 1);

        // Disconnecting a non-current session leaves current alone
        registry.switch_to_session(&keep.id).await.unwrap();
        assert_eq!(registry.disconnect_all().await, 1);
        assert!(registry.current_session().await.is_none());
    }

    #[tokio::test]
    async fn test_cleanup_expired_sessions() {
        let dir = TempDir::new().unwrap();
        let registry = registry(dir.path());
        let idle = registry
            .register_session(manual("idle", "one"), lazy_connection("one"))
            .await;

        assert!(
            registry
                .cleanup_expired_sessions(Duration::from_secs(60))
                .await
                .is_empty()
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        let removed = registry
            .cleanup_expired_sessions(Duration::from_millis(5))
            .await;
        assert_eq!(removed, vec![idle.id]);
        assert!(registry.current_session().await.is_none());
    }

    #[tokio::test]
    async fn test_current_connection_touches_session() {
        let dir = TempDir::new().unwrap();
        let registry = registry(dir.path());
        registry
            .register_session(manual("busy", "one"), lazy_connection("one"))
            .await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.current_connection().await.unwrap();
        let removed = registry
            .cleanup_expired_sessions(Duration::from_millis(15))
            .await;
        assert!(removed.is_empty());
        registry.disconnect_all().await;
    }

    #[tokio::test]
    async fn test_connect_to_environment_requires_detection() {
        let dir = TempDir::new().unwrap();
        let registry = registry(dir.path());
        assert!(matches!(
            registry.connect_to_environment("local").await,
            Err(DbError::ProjectNotDetected)
        ));
        assert!(!registry.test_environment_connection("local").await);
    }

    #[tokio::test]
    async fn test_connect_to_environment_reuses_session() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();
        fs::write(dir.path().join(".env"), "DB_DATABASE=app\n").unwrap();

        let registry = registry(dir.path());
        let info = registry.detect_project().await.unwrap();
        assert_eq!(info.project_type, ProjectType::NodeJs);
        assert!(matches!(
            registry.connect_to_environment("staging").await,
            Err(DbError::EnvironmentNotFound { .. })
        ));

        let env = info.find_environment("local").unwrap().clone();
        let existing = registry
            .register_session(env, lazy_connection("app"))
            .await;
        registry
            .register_session(manual("other", "x"), lazy_connection("x"))
            .await;

        let reused = registry.connect_to_environment("local").await.unwrap();
        assert_eq!(reused.id, existing.id);
        assert!(reused.is_current);

        let summary = registry.environment_summary().await;
        assert!(summary.contains("Project type: node-js"));
        assert!(summary.contains("Detected 1 environments:"));
        assert!(summary.contains("[connected]"));
        assert!(summary.contains("Current environment: local"));

        let stats = registry.connection_stats().await;
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.active_sessions, 2);
        assert_eq!(stats.current_environment.as_deref(), Some("local"));
        assert_eq!(stats.detected_environments, 1);
        registry.disconnect_all().await;
    }

    #[tokio::test]
    async fn test_set_root_keeps_sessions() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.json"), r#"{"host":"h","database":"d"}"#).unwrap();
        let registry = registry(dir.path());
        registry.detect_project().await.unwrap();
        registry
            .register_session(manual("m", "d"), lazy_connection("d"))
            .await;

        let other = TempDir::new().unwrap();
        registry.set_root(other.path()).await;
        assert!(registry.project_info().await.is_none());
        assert_eq!(registry.root().await, other.path());
        assert_eq!(registry.list_sessions().await.len(), 1);
        registry.disconnect_all().await;
    }
}
