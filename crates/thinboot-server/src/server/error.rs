//! Mapping of domain errors to HTTP responses.
//!
//! Boot endpoints answer in plain text (the caller is iPXE firmware, so
//! bodies are script comments); every other endpoint answers in JSON, except
//! for rate-limit rejections, which are plain text everywhere.
//! Internal failures are logged where they happen and reach the caller only
//! as a generic message.

use axum::Json;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use crate::registry::RegistryError;
use crate::script::ScriptError;
use crate::storage::DatabaseError;

/// Errors a handler can answer with.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid MAC address")]
    InvalidMac,

    #[error("{0}")]
    BadRequest(String),

    #[error("Client not found")]
    ClientNotFound,

    /// Unknown token. Same message as `ExpiredToken` on purpose.
    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Invalid or expired token")]
    ExpiredToken,

    #[error("Rate limit exceeded. Try again later.")]
    RateLimited,

    #[error("Failed to generate boot configuration")]
    NoBootImage,

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidMac | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::ClientNotFound | Self::InvalidToken => StatusCode::NOT_FOUND,
            Self::ExpiredToken => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::NoBootImage | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self, Self::RateLimited) {
            return (
                self.status(),
                [(CONTENT_TYPE, "text/plain; charset=utf-8")],
                format!("{self}\n"),
            )
                .into_response();
        }
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Plain-text rendering of an [`ApiError`], for the boot endpoints.
#[derive(Debug)]
pub struct PlainText(pub ApiError);

impl From<ApiError> for PlainText {
    fn from(e: ApiError) -> Self {
        Self(e)
    }
}

impl IntoResponse for PlainText {
    fn into_response(self) -> Response {
        (
            self.0.status(),
            [(CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("# {}\n", self.0),
        )
            .into_response()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        error!(error = %e, "Storage failure");
        Self::Internal
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        error!(error = %e, "Registry failure");
        Self::Internal
    }
}

impl From<ScriptError> for ApiError {
    fn from(_: ScriptError) -> Self {
        Self::NoBootImage
    }
}

impl From<DatabaseError> for PlainText {
    fn from(e: DatabaseError) -> Self {
        Self(e.into())
    }
}

impl From<RegistryError> for PlainText {
    fn from(e: RegistryError) -> Self {
        Self(e.into())
    }
}

impl From<ScriptError> for PlainText {
    fn from(e: ScriptError) -> Self {
        Self(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(ApiError::InvalidMac.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::InvalidToken.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::ExpiredToken.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::NoBootImage.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn token_rejections_read_the_same() {
        assert_eq!(
            ApiError::InvalidToken.to_string(),
            ApiError::ExpiredToken.to_string()
        );
    }

    fn content_type(response: &Response) -> Option<&str> {
        response.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    #[test]
    fn rate_limit_is_plain_text_on_json_endpoints() {
        let response = ApiError::RateLimited.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(content_type(&response), Some("text/plain; charset=utf-8"));

        let response = ApiError::ClientNotFound.into_response();
        assert_eq!(content_type(&response), Some("application/json"));
    }

    #[test]
    fn plain_text_is_a_script_comment() {
        let response = PlainText(ApiError::InvalidMac).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("text/plain; charset=utf-8")
        );
    }
}
