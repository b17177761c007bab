//! Polyglot Runtime CLI entry point.
//!
//! Starts the function-bundle host: loads the configuration file, registers
//! the bundles it lists and serves the HTTP API.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use polyglot_common::ConfigFile;
use polyglot_server::{PolyglotServer, ServerConfig};

/// Log output format.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Host for polyglot function bundles.
#[derive(Debug, Parser)]
#[command(name = "polyglot-runtime", version, about)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "POLYGLOT_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on; overrides `server.bind_addr`.
    #[arg(short, long, env = "BIND_ADDR")]
    bind: Option<SocketAddr>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,polyglot_runtime=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    info!("Starting Polyglot Runtime");

    let file = match &args.config {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ConfigFile::default(),
    };

    let mut server_config =
        ServerConfig::from_file(&file.server).context("Invalid [server] configuration")?;
    if let Some(bind) = args.bind {
        server_config = server_config.with_bind_addr(bind);
    }

    let server = PolyglotServer::from_config_file(&file)
        .context("Failed to initialize runtime")?
        .with_config(server_config);

    info!(
        bind_addr = %server.config().bind_addr,
        bundle_dir = %server.state().uploader().bundle_dir().display(),
        bundles = server.state().registry().len(),
        host_access = ?file.runtime.scripting.host_access,
        "Configuration loaded"
    );

    info!("Server initialized. Available endpoints:");
    info!("  GET  /health                      - Health check");
    info!("  GET  /ready                       - Readiness check");
    info!("  GET  /api/v1/handlers             - List registered bundles");
    info!("  POST /api/v1/handler/:name        - Upload bundle (multipart .zip)");
    info!("  GET  /api/v1/handler/:name        - Invoke bundle");
    info!("  POST /api/v1/handler/:name/invoke - Invoke bundle with body");

    server.run().await?;

    Ok(())
}
