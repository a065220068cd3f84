//! Gateway error types.
//!
//! Every error renders as `{"detail": "<message>"}` with
//! `Content-Type: application/json` and a permissive CORS origin header.

use axum::http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::cache::CachedResponse;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not Found")]
    NotFound,

    #[error("Method Not Allowed")]
    MethodNotAllowed,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid Content-Type")]
    InvalidContentType,

    #[error("Payload Too Large")]
    PayloadTooLarge,

    #[error("Invalid request body")]
    InvalidBody,

    /// Object store or access-control backend failure.
    #[error("{message}{}", with_detail(.detail))]
    Upstream {
        message: &'static str,
        detail: Option<String>,
    },
}

fn with_detail(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|d| format!(": {}", d))
        .unwrap_or_default()
}

impl ApiError {
    pub fn upstream(message: &'static str, detail: impl ToString) -> Self {
        Self::Upstream {
            message,
            detail: Some(detail.to_string()),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::InvalidContentType | ApiError::InvalidBody => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render as a complete, cacheable response.
    pub fn to_cached(&self) -> CachedResponse {
        let body = serde_json::to_vec(&ErrorResponse {
            detail: self.to_string(),
        })
        .unwrap_or_default();

        let mut headers = HeaderMap::new();
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        CachedResponse {
            status: self.status_code(),
            headers,
            body: Bytes::from(body),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.to_cached().into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::MethodNotAllowed.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::InvalidContentType.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::PayloadTooLarge.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            ApiError::upstream("Failed to upload image", "boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_upstream_detail_in_message() {
        let err = ApiError::upstream("Failed to upload image", "SlowDown");
        assert_eq!(err.to_string(), "Failed to upload image: SlowDown");

        let err = ApiError::Upstream {
            message: "Failed to add user to image",
            detail: None,
        };
        assert_eq!(err.to_string(), "Failed to add user to image");
    }

    #[test]
    fn test_json_body_and_headers() {
        let cached = ApiError::NotFound.to_cached();
        assert_eq!(cached.status, StatusCode::NOT_FOUND);
        assert_eq!(cached.headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(cached.headers[CONTENT_TYPE], "application/json");

        let body: serde_json::Value = serde_json::from_slice(&cached.body).unwrap();
        assert_eq!(body, serde_json::json!({ "detail": "Not Found" }));
    }
}
