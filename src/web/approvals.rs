use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::error::{ApiError, ApiQuery, ApiResult, Page};
use super::AppState;
use crate::db::{ApprovalFilter, ApprovalRecord, ContentType, RejectionFeedback};
use crate::service::ApprovalSummary;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_approvals))
        .route("/stats/summary", get(summary))
        .route("/feedback", get(feedback))
}

#[derive(Debug, Deserialize)]
pub struct ListApprovalsParams {
    content_type: Option<String>,
    approved: Option<bool>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackParams {
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ApprovalList {
    total: usize,
    approvals: Vec<ApprovalRecord>,
}

async fn list_approvals(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListApprovalsParams>,
) -> ApiResult<Json<ApprovalList>> {
    let page = Page::new(params.limit, params.offset)?;
    let content_type = params
        .content_type
        .as_deref()
        .map(|t| {
            ContentType::from_str(t)
                .ok_or_else(|| ApiError::bad_request(format!("unknown content_type {t}")))
        })
        .transpose()?;

    let filter = ApprovalFilter {
        content_type,
        approved: params.approved,
    };
    let approvals = state
        .service
        .list_approvals(&filter, page.limit, page.offset)
        .await?;
    Ok(Json(ApprovalList {
        total: approvals.len(),
        approvals,
    }))
}

async fn summary(State(state): State<AppState>) -> ApiResult<Json<ApprovalSummary>> {
    Ok(Json(state.service.approval_summary().await?))
}

async fn feedback(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<FeedbackParams>,
) -> ApiResult<Json<Vec<RejectionFeedback>>> {
    let page = Page::new(params.limit, None)?;
    Ok(Json(state.service.rejection_feedback(page.limit).await?))
}
