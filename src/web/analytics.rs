use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use super::error::ApiResult;
use super::AppState;
use crate::db::ContentType;
use crate::service::{ContentAnalytics, EngagementSummary, UsageReport};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(posts))
        .route("/replies", get(replies))
        .route("/engagement", get(engagement))
        .route("/api-usage", get(api_usage))
}

async fn posts(State(state): State<AppState>) -> ApiResult<Json<ContentAnalytics>> {
    Ok(Json(state.service.content_analytics(ContentType::Post).await?))
}

async fn replies(State(state): State<AppState>) -> ApiResult<Json<ContentAnalytics>> {
    Ok(Json(state.service.content_analytics(ContentType::Reply).await?))
}

async fn engagement(State(state): State<AppState>) -> ApiResult<Json<EngagementSummary>> {
    Ok(Json(state.service.engagement().await?))
}

async fn api_usage(State(state): State<AppState>) -> ApiResult<Json<UsageReport>> {
    Ok(Json(state.service.api_usage().await?))
}
