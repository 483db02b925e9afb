//! HTTP API server for the bistro bridge
//!
//! One axum router: the `/ws/voice` upgrade that carries live sessions, plus
//! liveness/readiness/status endpoints for deployment probes. All handlers
//! share an [`ApiState`] holding the configuration and the session registry.

pub mod health;
pub mod rate_limit;
pub mod websocket;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{http::HeaderValue, Router};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::session::SessionRegistry;
use crate::{Error, Result};

/// WebSocket upgrades allowed per client address per minute
const UPGRADES_PER_MINUTE: u32 = 30;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
    pub limiter: rate_limit::SharedLimiter,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
}

impl ApiServer {
    /// Assemble the server from loaded configuration
    #[must_use]
    pub fn new(config: Arc<Config>) -> Self {
        let registry = Arc::new(SessionRegistry::from_config(&config.session));
        let state = Arc::new(ApiState {
            config,
            registry,
            limiter: rate_limit::create_limiter(UPGRADES_PER_MINUTE),
            started_at: chrono::Utc::now(),
        });
        Self { state }
    }

    /// Build the router with all routes
    fn router(&self) -> Router {
        let origins: Vec<HeaderValue> = self
            .state
            .config
            .server
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        let cors = CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .nest("/ws", websocket::router(self.state.clone()))
            .merge(health::router())
            .merge(health::ready_router(self.state.clone()))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if the server fails to bind or run.
    pub async fn run(self) -> Result<()> {
        self.state.registry.start_sweeper();

        let addr = format!(
            "{}:{}",
            self.state.config.server.host, self.state.config.server.port
        );
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind {addr}: {e}")))?;

        tracing::info!(%addr, "bridge server listening");

        // ConnectInfo feeds the per-address upgrade limiter.
        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| Error::Config(format!("server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
