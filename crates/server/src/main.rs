use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ragbridge_mcp::{Dispatcher, McpServer};
use ragbridge_server::{HttpTransport, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    /// Streamable HTTP (POST/GET/DELETE /mcp)
    Http,
    /// Newline-delimited JSON-RPC on stdin/stdout
    Stdio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "ragbridge")]
#[command(about = "MCP adapter for a document/RAG backend", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "ragbridge.toml")]
    config: PathBuf,

    /// Transport to serve
    #[arg(short, long, value_enum, default_value = "http")]
    transport: Transport,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "RAGBRIDGE_PORT")]
    port: Option<u16>,

    /// Host to bind to (overrides the config file)
    #[arg(long, env = "RAGBRIDGE_HOST")]
    host: Option<String>,

    /// Document backend base URL (overrides the config file)
    #[arg(long, env = "RAGBRIDGE_BACKEND_URL")]
    backend_url: Option<String>,

    /// Log line format on stderr
    #[arg(long, value_enum, default_value = "text", env = "RAGBRIDGE_LOG_FORMAT")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout belongs to the protocol in stdio mode
    init_tracing(args.log_format);

    tracing::info!("Starting ragbridge");

    // Load configuration
    let mut config = ServerConfig::load(&args.config)?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(url) = args.backend_url {
        config.backend.url = Some(url);
    }

    let registry = Arc::new(
        config
            .tool_registry()
            .context("Failed to build tool registry")?,
    );
    tracing::info!("Registered {} tools", registry.len());

    let dispatcher = Arc::new(
        Dispatcher::from_registry(config.mcp.server_info(), registry)
            .with_protocol_version(config.mcp.protocol_version.clone()),
    );

    match args.transport {
        Transport::Stdio => McpServer::new(dispatcher).start().await?,
        Transport::Http => {
            let addr = config.listen_addr();
            HttpTransport::new(dispatcher, &config)
                .serve(&addr, shutdown_signal())
                .await?
        }
    }

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ragbridge=info,tower_http=info".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
