//! API server

use crate::auth::{AuthConfig, Authenticator};
use crate::handler::{self, AppState, ServerError};
use crate::middleware::{self as mw, RateLimiter};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use toolguard_engine::{ConfigError, SharedEngine};
use tower_http::trace::TraceLayer;

/// Server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address
    pub bind: SocketAddr,
    /// Engine configuration file
    pub config_path: PathBuf,
    /// Authentication settings
    pub auth: AuthConfig,
    /// Requests per client per minute, `0` for unlimited
    pub rate_limit: u32,
    /// Largest accepted batch
    pub max_batch_size: usize,
}

impl ServerConfig {
    /// Create settings with defaults for everything but the config file
    #[must_use]
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            config_path: config_path.into(),
            auth: AuthConfig::default(),
            rate_limit: 60,
            max_batch_size: 100,
        }
    }

    /// Set listen address
    #[must_use]
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    /// Set authentication
    #[must_use]
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Set rate limit
    #[must_use]
    pub fn with_rate_limit(mut self, per_minute: u32) -> Self {
        self.rate_limit = per_minute;
        self
    }

    /// Set maximum batch size
    #[must_use]
    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max;
        self
    }
}

/// API server
pub struct ApiServer {
    config: ServerConfig,
    state: AppState,
}

impl ApiServer {
    /// Load the engine configuration and prepare the server
    ///
    /// # Errors
    ///
    /// Returns error if the engine configuration is invalid
    pub fn new(config: ServerConfig) -> Result<Self, ConfigError> {
        let engine = SharedEngine::from_path(&config.config_path)?;
        Ok(Self::with_engine(config, engine))
    }

    /// Prepare the server around an existing engine
    #[must_use]
    pub fn with_engine(config: ServerConfig, engine: SharedEngine) -> Self {
        let auth = Authenticator::new(config.auth.clone());
        if !auth.is_enabled() {
            tracing::warn!("no API key configured, API routes are open to every client");
        }
        let state = AppState {
            engine: Arc::new(engine),
            auth: Arc::new(auth),
            limiter: Arc::new(RateLimiter::per_minute(config.rate_limit)),
            max_batch_size: config.max_batch_size,
        };
        Self { config, state }
    }

    /// Shared state
    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router
    #[must_use]
    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Serve until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound or the server fails
    pub async fn serve(self) -> Result<(), ServerError> {
        let app = self.router();
        let limiter = Arc::clone(&self.state.limiter);
        if limiter.is_enabled() {
            tokio::spawn(async move {
                let mut ticks = tokio::time::interval(limiter.window());
                loop {
                    ticks.tick().await;
                    limiter.retain_recent();
                }
            });
        }
        let listener = tokio::net::TcpListener::bind(self.config.bind).await?;
        tracing::info!(addr = %self.config.bind, config = %self.config.config_path.display(), "toolguard listening");

        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

/// All routes with their middleware
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/validate", post(handler::validate))
        .route("/tools", get(handler::tools))
        .route("/reload", post(handler::reload))
        .route_layer(from_fn_with_state(state.clone(), mw::require_api_key));

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(handler::health))
        .layer(from_fn_with_state(state.clone(), mw::rate_limit))
        .layer(from_fn(mw::request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
