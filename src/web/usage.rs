use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use super::AppState;
use crate::db;

/// Record every request in `api_usage` under its route template.
pub async fn record_usage(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path().to_string(), |p| p.as_str().to_string());

    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed_ms = started.elapsed().as_millis() as i64;

    if let Err(e) = db::insert_api_usage(
        state.db.pool(),
        &endpoint,
        &method,
        response.status().as_u16(),
        elapsed_ms,
    )
    .await
    {
        warn!(endpoint = %endpoint, error = %e, "Failed to record API usage");
    }

    response
}
