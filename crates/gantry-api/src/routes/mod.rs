//! HTTP route handlers.

use std::sync::Arc;

use axum::Router;

use crate::server::AppState;

pub mod artifacts;

/// Composes all proxy routes into a single router.
pub fn proxy_routes() -> Router<Arc<AppState>> {
    artifacts::routes()
}
