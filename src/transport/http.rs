//! HTTP transport with Streamable HTTP support for the MCP server.
//!
//! Every HTTP client gets its own MCP session, but all of them share one
//! `SessionRegistry`, so database sessions are visible across clients.

use crate::error::{DbError, DbResult};
use crate::mcp::MySqlService;
use crate::transport::{Transport, wait_for_signal};
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Time allowed for open streams to finish after a shutdown signal.
const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpTransport {
    service: MySqlService,
    host: String,
    port: u16,
    /// MCP endpoint path
    endpoint: String,
}

impl HttpTransport {
    pub fn new(
        service: MySqlService,
        host: impl Into<String>,
        port: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            service,
            host: host.into(),
            port,
            endpoint: endpoint.into(),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Close every database session, then hand back the server outcome.
    async fn finish(&self, outcome: DbResult<()>) -> DbResult<()> {
        let closed = self.service.registry().disconnect_all().await;
        info!(sessions = closed, "Closed all database sessions");
        outcome
    }

    fn router(&self) -> axum::Router {
        let prototype = self.service.clone();
        let service = StreamableHttpService::new(
            move || Ok(prototype.clone()),
            LocalSessionManager::default().into(),
            Default::default(),
        );

        // nest_service rejects the root path
        if self.endpoint == "/" {
            axum::Router::new().fallback_service(service)
        } else {
            axum::Router::new().nest_service(&self.endpoint, service)
        }
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> DbResult<()> {
        let bind_addr = self.bind_addr();
        info!("Starting MCP server with HTTP transport on {}", bind_addr);

        let app = self.router();
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            DbError::connection(
                format!("Failed to bind to {}: {}", bind_addr, e),
                "Check that the port is available",
            )
        })?;

        info!(endpoint = %self.endpoint, "MCP endpoint ready");

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_notify_clone = shutdown_notify.clone();
        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_notify_clone.notify_one();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        // SSE streams can keep the server alive forever, so bound the drain
        let outcome = tokio::select! {
            result = server => {
                match result {
                    Ok(()) => {
                        info!("HTTP server stopped");
                        Ok(())
                    }
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        Err(DbError::internal(format!("HTTP server error: {}", e)))
                    }
                }
            }
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for connections to close (send signal again to force exit)..."
                );

                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => Ok(()),
        };

        self.finish(outcome).await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectDefaults, PoolOptions};
    use crate::db::SessionRegistry;

    fn transport(endpoint: &str) -> HttpTransport {
        let registry = Arc::new(SessionRegistry::new(".", PoolOptions::default()));
        let service = MySqlService::new(registry, ConnectDefaults::default());
        HttpTransport::new(service, "0.0.0.0", 3000, endpoint)
    }

    #[test]
    fn test_http_transport_creation() {
        let transport = transport("/mcp");
        assert_eq!(transport.name(), "http");
        assert_eq!(transport.bind_addr(), "0.0.0.0:3000");
        assert_eq!(transport.endpoint(), "/mcp");
    }

    #[tokio::test]
    async fn test_http_router_builds_for_root_and_nested() {
        let _ = transport("/").router();
        let _ = transport("/api/mcp").router();
    }

    #[tokio::test]
    async fn test_server_error_still_closes_sessions() {
        use crate::db::MySqlConnection;
        use crate::models::{ConnectionType, MySqlConnectionConfig, ProjectEnvironment};

        let transport = transport("/");
        let registry = transport.service.registry();
        let config = MySqlConnectionConfig::new("localhost", 3306, "root", "", None);
        let connection =
            MySqlConnection::connect_lazy(config.clone(), ConnectionType::Direct, &PoolOptions::default());
        registry
            .register_session(ProjectEnvironment::manual(None, config), connection)
            .await;

        let err = transport
            .finish(Err(DbError::internal("listener closed")))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Internal { .. }));
        assert!(registry.list_sessions().await.is_empty());
    }
}
