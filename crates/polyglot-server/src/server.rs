//! Server lifecycle: bind, serve, shut down.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{error, info};

use polyglot_common::{ConfigFile, RuntimeConfig, RuntimeError, ServerConfigFile};

use crate::router::{RouterLimits, build_router};
use crate::state::AppState;

/// Listener and transport settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address.
    pub bind_addr: SocketAddr,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Drain connections on SIGTERM/SIGINT.
    pub graceful_shutdown: bool,
    /// Maximum request body (and upload) size in megabytes.
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
            request_timeout_secs: 30,
            graceful_shutdown: true,
            max_upload_mb: 64,
        }
    }
}

impl ServerConfig {
    /// Build from the `[server]` table of a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if `bind_addr` is not a socket address.
    pub fn from_file(file: &ServerConfigFile) -> Result<Self, RuntimeError> {
        let bind_addr = file.bind_addr.parse().map_err(|e| {
            RuntimeError::invalid_config(format!("invalid bind_addr '{}': {e}", file.bind_addr))
        })?;

        Ok(Self {
            bind_addr,
            request_timeout_secs: file.request_timeout_secs,
            graceful_shutdown: file.graceful_shutdown,
            max_upload_mb: file.max_upload_mb,
        })
    }

    /// Override the listen address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Override the request timeout, in seconds.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Per-request deadline applied by the router.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Router limits derived from this configuration.
    pub fn limits(&self) -> RouterLimits {
        RouterLimits {
            request_timeout: self.request_timeout(),
            max_body_bytes: self.max_upload_mb.saturating_mul(1024 * 1024),
        }
    }
}

/// The function-bundle host.
///
/// # Example
///
/// ```ignore
/// use polyglot_server::PolyglotServer;
/// use polyglot_common::ConfigFile;
///
/// let file = ConfigFile::from_file("polyglot.toml")?;
/// let server = PolyglotServer::from_config_file(&file)?;
/// server.run().await?;
/// ```
pub struct PolyglotServer {
    /// Application state.
    state: AppState,
    /// Server configuration.
    config: ServerConfig,
}

impl PolyglotServer {
    /// Create a server with an empty registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be initialized.
    pub fn new(
        runtime_config: &RuntimeConfig,
        server_config: ServerConfig,
        bundle_dir: impl Into<PathBuf>,
    ) -> Result<Self, RuntimeError> {
        let state = AppState::new(runtime_config, bundle_dir)?;

        Ok(Self {
            state,
            config: server_config,
        })
    }

    /// Create a server from a parsed configuration file and register the
    /// bundles it lists.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a listed bundle
    /// cannot be registered.
    pub fn from_config_file(file: &ConfigFile) -> Result<Self, RuntimeError> {
        let server = Self::new(
            &file.runtime,
            ServerConfig::from_file(&file.server)?,
            file.storage.bundle_dir(),
        )?;
        server.state.preload(&file.bundles)?;
        Ok(server)
    }

    /// Replace the server configuration.
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Shared state; register bundles here before [`run`](Self::run).
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Listener and transport settings in effect.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Serve until a shutdown signal arrives (or forever, without graceful
    /// shutdown). The epoch ticker lives exactly as long as the listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot bind to the address.
    pub async fn run(self) -> Result<(), RuntimeError> {
        tokio::fs::create_dir_all(self.state.uploader().bundle_dir()).await?;

        let ticker = self.state.engine().start_epoch_ticker()?;
        let app = build_router(self.state, self.config.limits());

        let listener = TcpListener::bind(&self.config.bind_addr)
            .await
            .map_err(|e| RuntimeError::invalid_config(format!("Failed to bind: {e}")))?;

        info!(addr = %self.config.bind_addr, "Starting HTTP server");

        let served = if self.config.graceful_shutdown {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
        } else {
            axum::serve(listener, app).await
        };

        if let Some(ticker) = ticker {
            ticker.stop();
        }
        served?;

        info!("Server shutdown complete");
        Ok(())
    }
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
