//! Quizbank Web Server
//!
//! Binds the listener, serves the router and drains in-flight requests on
//! shutdown.

use crate::{create_app, AppState, WebError, WebResult};
use axum::serve;
use quizbank_core::QuizbankConfig;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::{net::TcpListener, sync::Notify};
use tracing::{error, info, warn};

/// Main quizbank web server
pub struct QuizbankServer {
    config: QuizbankConfig,
    state: AppState,
}

impl QuizbankServer {
    /// Create a new server; connects the database and seeds the admin account
    pub async fn new(config: QuizbankConfig) -> WebResult<Self> {
        let state = AppState::new(config.clone()).await?;

        Ok(Self { config, state })
    }

    /// Serve until ctrl-c or SIGTERM, then give in-flight requests the
    /// configured grace period
    pub async fn start(self) -> WebResult<()> {
        let address = self.config.server.address();
        let grace = Duration::from_secs(self.config.server.shutdown_grace_secs);

        info!("Starting quizbank server");
        let app = create_app(self.state.clone()).await?;

        let listener = TcpListener::bind(&address)
            .await
            .map_err(WebError::Server)?;
        info!("Server listening on http://{}", address);
        if self.config.server.enable_swagger {
            info!("API docs at http://{}/swagger-ui", address);
        }

        let shutdown = Arc::new(Notify::new());
        let trigger = shutdown.clone();
        let mut server = tokio::spawn(
            serve(listener, app)
                .with_graceful_shutdown(async move { trigger.notified().await })
                .into_future(),
        );

        tokio::select! {
            result = &mut server => return finish(result),
            _ = shutdown_signal() => {}
        }

        info!(grace_secs = grace.as_secs(), "Shutdown signal received, draining requests");
        shutdown.notify_one();

        match tokio::time::timeout(grace, server).await {
            Ok(result) => finish(result),
            Err(_) => {
                warn!("Grace period elapsed, dropping remaining connections");
                Ok(())
            }
        }
    }

    /// Get server configuration
    pub fn config(&self) -> &QuizbankConfig {
        &self.config
    }

    /// Get application state
    pub fn state(&self) -> &AppState {
        &self.state
    }
}

fn finish(result: Result<std::io::Result<()>, tokio::task::JoinError>) -> WebResult<()> {
    match result {
        Ok(Ok(())) => {
            info!("Server shut down gracefully");
            Ok(())
        }
        Ok(Err(e)) => {
            error!("Server error: {}", e);
            Err(WebError::Server(e))
        }
        Err(e) => {
            error!("Server task failed: {}", e);
            Err(WebError::Server(std::io::Error::other(e)))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
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
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Builder for QuizbankServer
pub struct QuizbankServerBuilder {
    config: QuizbankConfig,
}

impl QuizbankServerBuilder {
    /// Create a new server builder
    pub fn new() -> Self {
        Self {
            config: QuizbankConfig::default(),
        }
    }

    /// Start from an already loaded configuration
    pub fn with_config(config: QuizbankConfig) -> Self {
        Self { config }
    }

    /// Set the server host
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.server.host = host.into();
        self
    }

    /// Set the server port
    pub fn port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    /// Set database URL
    pub fn database_url<S: Into<String>>(mut self, database_url: S) -> Self {
        self.config.database.url = database_url.into();
        self
    }

    pub fn jwt_secret<S: Into<String>>(mut self, secret: S) -> Self {
        self.config.auth.jwt_secret = secret.into();
        self
    }

    pub fn menu_file<S: Into<String>>(mut self, path: Option<S>) -> Self {
        self.config.menu_file = path.map(Into::into);
        self
    }

    pub fn config(&self) -> &QuizbankConfig {
        &self.config
    }

    /// Build the server
    pub async fn build(self) -> WebResult<QuizbankServer> {
        self.config.validate()?;
        if !self.config.auth.has_secret() {
            return Err(WebError::Core(quizbank_core::QuizbankError::Config {
                message: "auth.jwt_secret is not set".to_string(),
                source: None,
                context: quizbank_core::ErrorContext::new("server")
                    .with_suggestion("Set QUIZBANK__AUTH__JWT_SECRET or run with --generate-secret"),
            }));
        }
        QuizbankServer::new(self.config).await
    }
}

impl Default for QuizbankServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
