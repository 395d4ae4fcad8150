use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use super::error::{ApiJson, ApiQuery, ApiResult, OptionalJson, Page};
use super::{parse_status, AppState, DecisionRequest, PublishRequest, ReviewStarted};
use crate::db::{ContentType, Reply};
use crate::service::Opportunity;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_replies))
        .route("/search", post(search))
        .route("/generate", post(generate_reply))
        .route("/:id", get(get_reply))
        .route("/:id/approve", post(approve_reply))
        .route("/:id/publish", post(publish_reply))
        .route("/:id/review", post(review_reply))
}

fn default_search_limit() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    hashtag: String,
    #[serde(default = "default_search_limit")]
    limit: u32,
}

#[derive(Debug, Deserialize)]
pub struct GenerateReplyRequest {
    post_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ListRepliesParams {
    status: Option<String>,
    post_id: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn search(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SearchRequest>,
) -> ApiResult<Json<Vec<Opportunity>>> {
    let found = state
        .service
        .search_opportunities(&request.hashtag, request.limit)
        .await?;
    Ok(Json(found))
}

async fn generate_reply(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<GenerateReplyRequest>,
) -> ApiResult<(StatusCode, Json<Reply>)> {
    let reply = state.service.generate_reply(&request.post_id).await?;
    Ok((StatusCode::CREATED, Json(reply)))
}

async fn list_replies(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListRepliesParams>,
) -> ApiResult<Json<Vec<Reply>>> {
    let page = Page::new(params.limit, params.offset)?;
    let status = parse_status(params.status.as_deref())?;
    let replies = state
        .service
        .list_replies(status, params.post_id.as_deref(), page.limit, page.offset)
        .await?;
    Ok(Json(replies))
}

async fn get_reply(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Reply>> {
    Ok(Json(state.service.get_reply(id).await?))
}

async fn approve_reply(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(request): ApiJson<DecisionRequest>,
) -> ApiResult<Json<Reply>> {
    let reply = state
        .service
        .decide_reply(id, request.approved, request.rejection_reason)
        .await?;
    Ok(Json(reply))
}

async fn publish_reply(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    OptionalJson(request): OptionalJson<PublishRequest>,
) -> ApiResult<Json<Reply>> {
    Ok(Json(state.service.publish_reply(id, request.post_to_network).await?))
}

async fn review_reply(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<(StatusCode, Json<ReviewStarted>)> {
    state
        .service
        .clone()
        .start_review(ContentType::Reply, id)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ReviewStarted::new(ContentType::Reply, id)),
    ))
}
