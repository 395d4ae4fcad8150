use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::db::{ContentStatus, ContentType};

/// Unauthenticated routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
}

async fn root() -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "docs": "/api/v1",
        "health": "/health",
    }))
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let database_ok = state.db.ping().await;
    let status = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if database_ok { "healthy" } else { "degraded" },
            "version": env!("CARGO_PKG_VERSION"),
            "database": if database_ok { "connected" } else { "unavailable" },
        })),
    )
}

// ========== Shared request/response bodies ==========

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub approved: bool,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    #[serde(default = "default_true")]
    pub post_to_network: bool,
}

impl Default for PublishRequest {
    fn default() -> Self {
        Self {
            post_to_network: true,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReviewStarted {
    status: &'static str,
    content_type: ContentType,
    id: i64,
}

impl ReviewStarted {
    pub fn new(content_type: ContentType, id: i64) -> Self {
        Self {
            status: "review_requested",
            content_type,
            id,
        }
    }
}

/// Parse an optional `?status=` filter.
pub fn parse_status(status: Option<&str>) -> ApiResult<Option<ContentStatus>> {
    status
        .map(|s| {
            ContentStatus::from_str(s)
                .ok_or_else(|| ApiError::bad_request(format!("unknown status {s}")))
        })
        .transpose()
}
