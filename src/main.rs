//! MySQL MCP Server - Main entry point.
//!
//! This server provides MCP (Model Context Protocol) tools for AI assistants
//! to detect project database settings and work with MySQL sessions.

use mysql_mcp_server::config::{Config, TransportMode};
use mysql_mcp_server::db::SessionRegistry;
use mysql_mcp_server::mcp::MySqlService;
use mysql_mcp_server::transport::{HttpTransport, StdioTransport, Transport};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr; stdout carries the stdio transport.
fn init_tracing(config: &Config) {
    if !config.enable_logs {
        return;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // MYSQL_* defaults may live in a .env next to the server
    dotenvy::dotenv().ok();

    let config = Config::parse_args();
    init_tracing(&config);

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let root = config.project_root();
    info!(
        transport = %config.transport,
        root = %root.display(),
        "Starting MySQL MCP Server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let registry = Arc::new(SessionRegistry::new(root, config.pool_options()));
    registry.clone().start_cleanup_task(
        config.cleanup_interval_duration(),
        config.session_idle_timeout_duration(),
    );

    if config.auto_detect {
        match registry.detect_project().await {
            Ok(project) => info!(
                project_type = %project.project_type,
                environments = project.environments.len(),
                "Detected project at startup"
            ),
            Err(e) => warn!(error = %e, "Startup project detection failed"),
        }
    }

    let service = MySqlService::new(registry, config.connect_defaults());

    let result = match config.transport {
        TransportMode::Stdio => {
            info!("Using stdio transport");
            StdioTransport::new(service).run().await
        }
        TransportMode::Http => {
            info!(
                host = %config.http_host,
                port = config.http_port,
                endpoint = %config.mcp_endpoint,
                "Using HTTP transport"
            );
            HttpTransport::new(
                service,
                &config.http_host,
                config.http_port,
                &config.mcp_endpoint,
            )
            .run()
            .await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
