//! # Stow Server
//!
//! An `axum` gateway in front of a local fileblob bucket. It serves the
//! signed URLs the bucket issues:
//!
//! - `GET /blob?obj=..&expiry=..&method=GET&signature=..` streams an object;
//! - `PUT` stores the request body, honoring `Content-Type`, `Content-MD5`
//!   and `Cache-Control`;
//! - `DELETE` removes the object.
//!
//! ## Example
//! ```no_run
//! use stow_server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut cfg = ServerConfig::default();
//!     cfg.signing.secret = "change-me".to_owned();
//!
//!     Server::builder()
//!         .config(cfg)
//!         .port(4583)
//!         .build()
//!         .await?
//!         .run()
//!         .await
//! }
//! ```

mod config;
mod error;
mod router;

pub use crate::config::{
    ConfigError, ConfigErrorExt, ENV_PREFIX, ServerConfig, SigningConfig, StorageConfig,
    load_config,
};
pub use crate::error::{ApiError, ApiErrorExt, status_for};
pub use crate::router::AppState;

use anyhow::{Context, Result};
use axum::Router;
use axum_server::Handle;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use stow_blob::Bucket;
use stow_fileblob::{FileBucket, UrlSignerHmac};
use tokio::signal;
use tracing::{error, info};
use url::Url;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// A fluent builder for configuring and initializing the [`Server`].
#[must_use = "builders do nothing unless you call .build()"]
#[derive(Debug, Default)]
pub struct ServerBuilder {
    cfg: ServerConfig,
}

impl ServerBuilder {
    pub fn config(mut self, cfg: ServerConfig) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.cfg.port = port;
        self
    }

    /// Opens the bucket and prepares the router state.
    ///
    /// # Errors
    /// Returns an error if:
    /// * `signing.secret` is empty or `signing.base_url` is not a URL
    /// * the storage root cannot be created or resolved
    pub async fn build(self) -> Result<Server> {
        let cfg = self.cfg;
        anyhow::ensure!(!cfg.signing.secret.is_empty(), "signing.secret must be set");

        let base_url = Url::parse(&cfg.signing.base_url)
            .with_context(|| format!("Invalid signing.base_url {:?}", cfg.signing.base_url))?;
        let signer = Arc::new(UrlSignerHmac::new(base_url.clone(), cfg.signing.secret.as_bytes())?);

        let driver = FileBucket::builder()
            .root(&cfg.storage.root)
            .min_part_size(cfg.storage.min_part_size)
            .default_page_size(cfg.storage.default_page_size)
            .url_signer(signer.clone())
            .open()
            .await
            .with_context(|| format!("Failed to open bucket at {}", cfg.storage.root.display()))?;

        info!(root = %driver.root().display(), base_url = %base_url, "Bucket ready");

        let state = AppState { bucket: Bucket::new(driver), signer, base_url };
        Ok(Server { cfg, state })
    }
}

/// A fully initialized server instance ready to run.
#[must_use = "call .run().await to start the server"]
#[derive(Debug)]
pub struct Server {
    cfg: ServerConfig,
    state: AppState,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// The HTTP routes, for embedding or for in-process tests.
    pub fn router(&self) -> Router {
        router::init(self.state.clone())
    }

    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    /// Serves until Ctrl+C or SIGTERM, then drains connections and closes the bucket.
    ///
    /// # Errors
    /// Returns an error if the server fails to bind to the configured address.
    pub async fn run(self) -> Result<()> {
        let address = SocketAddr::new(self.cfg.address, self.cfg.port);
        let app = self.router();

        let handle = Handle::<SocketAddr>::new();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = shutdown_signal().await {
                error!("Error while waiting for shutdown signal: {e}");
                return;
            }
            info!("Shutdown signal received, starting graceful shutdown");
            shutdown_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        });

        info!("Starting HTTP server on http://{address}");
        axum_server::bind(address)
            .handle(handle)
            .serve(app.into_make_service())
            .await
            .context("HTTP server failed")?;

        anyhow::Context::context(self.state.bucket.close().await, "Failed to close bucket")?;
        info!("Server shutdown complete");
        Ok(())
    }
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.context("Failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?
            .recv()
            .await;
        Ok::<_, anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        res = ctrl_c => res?,
        res = terminate => res?,
    }

    Ok(())
}
