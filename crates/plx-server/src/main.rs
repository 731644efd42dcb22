//! plx-server: Perplexity search bridge over MCP stdio.
//!
//! Speaks newline-framed JSON-RPC on stdin/stdout and forwards each
//! `perplexity_search` invocation as one chat-completion request to the
//! Perplexity API.

mod bridge;
mod config;
mod registry;
mod server;
mod upstream;

use bridge::SearchBridge;
use clap::Parser;
use config::ServerConfig;
use registry::ToolRegistry;
use server::McpServer;
use std::path::PathBuf;
use tracing::{error, info};
use upstream::PerplexityClient;

/// plx-server — Perplexity search bridge (MCP stdio)
#[derive(Parser, Debug)]
#[command(name = "plx-server", version, about = "Perplexity search bridge over MCP stdio")]
struct Cli {
    /// Config file path
    #[arg(long, default_value = "~/.plx/config.toml")]
    config: String,

    /// Upstream API base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Upstream model identifier
    #[arg(long)]
    model: Option<String>,

    /// Upstream request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing. Logs go to stderr: stdout carries the protocol.
    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting plx-server"
    );

    // Load server config (file + CLI overrides + environment)
    let config_path = PathBuf::from(&cli.config);
    let server_config = match ServerConfig::load(
        Some(&config_path),
        cli.base_url.as_deref(),
        cli.model.as_deref(),
        cli.timeout,
    ) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    info!(
        base_url = %server_config.base_url,
        model = %server_config.model,
        timeout_secs = server_config.timeout.as_secs(),
        "upstream configured"
    );

    // Wire up the bridge
    let upstream = PerplexityClient::new(
        server_config.base_url,
        server_config.model,
        server_config.timeout,
    );
    let bridge = SearchBridge::new(ToolRegistry::builtin(), upstream, server_config.api_key);
    let mcp_server = McpServer::new(bridge);

    // Run until stdin closes or a shutdown signal arrives
    tokio::select! {
        result = mcp_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "server error");
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    info!("plx-server stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
