//! Artifact resolution routes.
//!
//! ## Routes
//!
//! - `GET /targets/:target/runs/:run/artifacts/:artifact` - redirect to the
//!   extracted artifact's directory listing
//! - `GET /targets/:target/runs/:run/artifacts/:artifact/*file` - redirect to
//!   a file inside the extracted artifact

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;

use crate::error::ApiError;
use crate::server::AppState;

/// Resolves an artifact reference and redirects to its cache directory.
pub(crate) async fn resolve_artifact(
    State(state): State<Arc<AppState>>,
    Path((target, run, artifact)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    redirect_to_file(&state, &target, &run, &artifact, String::new()).await
}

/// Resolves an artifact reference and redirects to a file within it.
pub(crate) async fn resolve_artifact_file(
    State(state): State<Arc<AppState>>,
    Path((target, run, artifact, file)): Path<(String, String, String, String)>,
) -> Result<Response, ApiError> {
    redirect_to_file(&state, &target, &run, &artifact, file).await
}

async fn redirect_to_file(
    state: &AppState,
    target: &str,
    run: &str,
    artifact: &str,
    file: String,
) -> Result<Response, ApiError> {
    let file = file.trim_start_matches('/');
    tracing::info!(
        target = %target,
        run = %run,
        artifact = %artifact,
        file = %file,
        "Resolving artifact request"
    );

    let resolved = state.coordinator.resolve_file(target, run, artifact, file).await?;

    let prefix = state.location_prefix();
    let location = if file.is_empty() {
        format!("{prefix}/artifacts/{}", resolved.artifact_id)
    } else {
        format!("{prefix}/artifacts/{}/{file}", resolved.artifact_id)
    };
    tracing::debug!(
        run_id = resolved.run_id,
        artifact_id = resolved.artifact_id,
        location = %location,
        "Redirecting into the artifact cache"
    );

    // Redirect::to would answer 303; the contract is a plain 302 with
    // caching disabled so clients re-resolve on every request.
    Ok((
        StatusCode::FOUND,
        [
            (header::LOCATION, location),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
    )
        .into_response())
}

/// Returns the artifact resolution routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/targets/:target/runs/:run/artifacts/:artifact",
            get(resolve_artifact),
        )
        .route(
            "/targets/:target/runs/:run/artifacts/:artifact/",
            get(resolve_artifact),
        )
        .route(
            "/targets/:target/runs/:run/artifacts/:artifact/*file",
            get(resolve_artifact_file),
        )
}
