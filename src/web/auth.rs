use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;

use super::error::ApiError;
use super::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Requires a valid `X-API-Key` header.
///
/// Missing key is 401, a wrong key is 403.
#[derive(Debug, Clone, Copy)]
pub struct RequireApiKey;

#[async_trait]
impl FromRequestParts<AppState> for RequireApiKey {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|h| h.to_str().ok())
            .filter(|k| !k.is_empty());

        match provided {
            None => Err(ApiError::new(StatusCode::UNAUTHORIZED, "Missing API key")
                .with_detail("Provide the key in the X-API-Key header")),
            Some(key) if key == state.config.api_key => Ok(Self),
            Some(_) => Err(ApiError::new(StatusCode::FORBIDDEN, "Invalid API key")),
        }
    }
}
