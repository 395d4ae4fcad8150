use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use super::error::{ApiError, ApiJson, ApiQuery, ApiResult, OptionalJson, Page};
use super::{parse_status, AppState, DecisionRequest, PublishRequest, ReviewStarted};
use crate::db::{ContentType, Post};
use crate::generate::{Platform, PostType};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_posts))
        .route("/generate", post(generate_post))
        .route("/:id", get(get_post))
        .route("/:id/approve", post(approve_post))
        .route("/:id/publish", post(publish_post))
        .route("/:id/review", post(review_post))
}

#[derive(Debug, Deserialize)]
pub struct GeneratePostRequest {
    post_type: PostType,
    #[serde(default)]
    platform: Option<String>,
    #[serde(default)]
    generate_image: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListPostsParams {
    status: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn generate_post(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<GeneratePostRequest>,
) -> ApiResult<(StatusCode, Json<Post>)> {
    let platform = match request.platform.as_deref() {
        None => Platform::default(),
        Some(name) => Platform::from_str(name)
            .ok_or_else(|| ApiError::bad_request(format!("unknown platform {name}")))?,
    };
    let post = state
        .service
        .generate_post(request.post_type, platform, request.generate_image)
        .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn list_posts(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListPostsParams>,
) -> ApiResult<Json<Vec<Post>>> {
    let page = Page::new(params.limit, params.offset)?;
    let status = parse_status(params.status.as_deref())?;
    let posts = state
        .service
        .list_posts(status, page.limit, page.offset)
        .await?;
    Ok(Json(posts))
}

async fn get_post(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Post>> {
    Ok(Json(state.service.get_post(id).await?))
}

async fn approve_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(request): ApiJson<DecisionRequest>,
) -> ApiResult<Json<Post>> {
    let post = state
        .service
        .decide_post(id, request.approved, request.rejection_reason)
        .await?;
    Ok(Json(post))
}

async fn publish_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    OptionalJson(request): OptionalJson<PublishRequest>,
) -> ApiResult<Json<Post>> {
    Ok(Json(state.service.publish_post(id, request.post_to_network).await?))
}

async fn review_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<(StatusCode, Json<ReviewStarted>)> {
    state
        .service
        .clone()
        .start_review(ContentType::Post, id)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ReviewStarted::new(ContentType::Post, id)),
    ))
}
