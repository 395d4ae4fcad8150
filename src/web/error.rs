use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{async_trait, Json};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;

use crate::service::ServiceError;

/// JSON error body returned by every API endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub detail: Option<String>,
    pub status_code: u16,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    detail: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            detail: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Bad request").with_detail(detail)
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let detail = err.to_string();
        match err {
            ServiceError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "Not found").with_detail(detail),
            ServiceError::InvalidState(_) => {
                Self::new(StatusCode::BAD_REQUEST, "Invalid state").with_detail(detail)
            }
            ServiceError::Invalid(_) => Self::bad_request(detail),
            ServiceError::BelowThreshold { .. } => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "Below relevance threshold")
                    .with_detail(detail)
            }
            ServiceError::NotConfigured(_) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "Not configured").with_detail(detail)
            }
            ServiceError::Internal(e) => {
                error!("Request failed: {e:#}");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                    .with_detail(format!("{e:#}"))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error,
            detail: self.detail,
            status_code: self.status.as_u16(),
        };
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// `Query` whose rejection is reported as a JSON `ApiError`.
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| Self(value))
            .map_err(|e: QueryRejection| ApiError::bad_request(e.body_text()))
    }
}

/// `Json` whose rejection is reported as a JSON `ApiError`.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| Self(value))
            .map_err(|e: JsonRejection| ApiError::new(e.status(), "Invalid request body").with_detail(e.body_text()))
    }
}

/// Optional JSON body: an empty body yields `T::default()`, anything else
/// must parse as `T` whatever the `Content-Type` says.
pub struct OptionalJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for OptionalJson<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::new(e.status(), "Invalid request body").with_detail(e.body_text()))?;
        parse_optional_json(&bytes).map(Self)
    }
}

fn parse_optional_json<T: DeserializeOwned + Default>(bytes: &[u8]) -> ApiResult<T> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(bytes).map_err(|e| {
        ApiError::new(StatusCode::BAD_REQUEST, "Invalid request body").with_detail(e.to_string())
    })
}

/// Validated `limit`/`offset` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 100;

impl Page {
    /// # Errors
    ///
    /// Rejects a limit outside 1..=100 or a negative offset.
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> ApiResult<Self> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        let offset = offset.unwrap_or(0);
        if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
            return Err(ApiError::bad_request(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}"
            )));
        }
        if offset < 0 {
            return Err(ApiError::bad_request("offset must be non-negative"));
        }
        Ok(Self { limit, offset })
    }
}
