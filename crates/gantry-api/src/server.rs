//! HTTP server setup and lifecycle.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use gantry_core::coordinator::RequestCoordinator;

// ============================================================================
// Response types
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ReadyResponse {
    /// Whether the service is ready to accept requests.
    pub ready: bool,
    /// Details when the service is not ready.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// Application state
// ============================================================================

/// Shared state for all request handlers.
pub struct AppState {
    /// Coordinates resolution and materialization per target.
    pub coordinator: RequestCoordinator,
    base_path: String,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("coordinator", &"<RequestCoordinator>")
            .field("base_path", &self.base_path)
            .finish()
    }
}

impl AppState {
    /// Creates the shared application state.
    pub fn new(coordinator: RequestCoordinator, base_path: impl Into<String>) -> Self {
        Self {
            coordinator,
            base_path: base_path.into(),
        }
    }

    /// Returns the prefix redirect locations are built under.
    ///
    /// Empty for the root base path so locations never start with `//`.
    pub(crate) fn location_prefix(&self) -> &str {
        if self.base_path == "/" {
            ""
        } else {
            &self.base_path
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Liveness probe.
async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness probe: the cache directory must exist and be reachable.
async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let serve_root = state.coordinator.store().serve_root();
    match tokio::fs::metadata(&serve_root).await {
        Ok(_) => (
            StatusCode::OK,
            Json(ReadyResponse {
                ready: true,
                message: None,
            }),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                ready: false,
                message: Some(format!(
                    "cache directory {} is unavailable",
                    serve_root.display()
                )),
            }),
        ),
    }
}

// ============================================================================
// Server
// ============================================================================

/// The gantry HTTP server.
#[derive(Debug)]
pub struct Server {
    state: Arc<AppState>,
    addr: SocketAddr,
}

impl Server {
    /// Creates a server that resolves requests through `coordinator`.
    pub fn new(
        coordinator: RequestCoordinator,
        addr: SocketAddr,
        base_path: impl Into<String>,
    ) -> Self {
        Self {
            state: Arc::new(AppState::new(coordinator, base_path)),
            addr,
        }
    }

    fn create_router(&self) -> Router {
        let serve_root = self.state.coordinator.store().serve_root();

        let api = Router::new()
            .route("/health", get(health))
            .route("/ready", get(ready))
            .merge(crate::routes::proxy_routes())
            .nest_service(
                "/artifacts",
                ServiceBuilder::new()
                    .layer(SetResponseHeaderLayer::overriding(
                        header::CACHE_CONTROL,
                        HeaderValue::from_static("no-cache"),
                    ))
                    .service(ServeDir::new(serve_root)),
            )
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.state));

        if self.state.base_path == "/" {
            api
        } else {
            Router::new().nest(&self.state.base_path, api)
        }
    }

    /// Binds the listen address and serves requests until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error when the address cannot be bound or the server
    /// fails while running.
    pub async fn serve(&self) -> anyhow::Result<()> {
        tracing::info!(
            addr = %self.addr,
            base_path = %self.state.base_path,
            "Starting gantry server"
        );

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("binding {}", self.addr))?;
        axum::serve(listener, self.create_router())
            .await
            .context("server error")
    }

    /// Returns the router for in-process testing.
    #[doc(hidden)]
    #[must_use]
    pub fn test_router(&self) -> Router {
        self.create_router()
    }
}
