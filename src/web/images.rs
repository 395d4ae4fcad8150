use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use super::error::{ApiJson, ApiQuery, ApiResult, Page};
use super::AppState;
use crate::db::Image;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_images))
        .route("/generate", post(generate_image))
        .route("/:id", get(get_image))
}

fn default_aspect_ratio() -> String {
    "1:1".to_string()
}

#[derive(Debug, Deserialize)]
pub struct GenerateImageRequest {
    prompt: String,
    #[serde(default = "default_aspect_ratio")]
    aspect_ratio: String,
    post_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ListImagesParams {
    post_id: Option<i64>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn generate_image(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<GenerateImageRequest>,
) -> ApiResult<(StatusCode, Json<Image>)> {
    let image = state
        .service
        .generate_image(&request.prompt, &request.aspect_ratio, request.post_id)
        .await?;
    Ok((StatusCode::CREATED, Json(image)))
}

async fn list_images(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListImagesParams>,
) -> ApiResult<Json<Vec<Image>>> {
    let page = Page::new(params.limit, params.offset)?;
    let images = state
        .service
        .list_images(params.post_id, page.limit, page.offset)
        .await?;
    Ok(Json(images))
}

async fn get_image(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Image>> {
    Ok(Json(state.service.get_image(id).await?))
}
