//! API error types.
//!
//! Every variant maps to an HTTP status and an envelope result code.  The
//! enum implements [`axum::response::IntoResponse`] so handlers can simply
//! return `Err(ApiError::InvalidArgument { .. })` and the caller still gets
//! a well-formed envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use crate::base64url::Base64UrlError;
use crate::envelope::{Envelope, ResultCode};
use crate::storage::backend::BlobError;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Errors surfaced at the HTTP boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A required input was missing or malformed.
    #[error("{message}")]
    InvalidArgument { message: String },

    /// The identity provider rejected the code or returned no token.
    #[error("{message}")]
    AuthExchange { message: String },

    /// A blob or container does not exist.
    #[error("{what} was not found")]
    NotFound { what: String },

    /// The state token or a base64url value could not be decoded.
    #[error("{message}")]
    MalformedInput { message: String },

    /// A required setting is missing or unusable.
    #[error("{message}")]
    Configuration { message: String },

    /// Catch-all for unexpected internal errors.
    #[error("We encountered an internal error, please try again.")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        ApiError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Return the envelope result code for this error.
    pub fn result_code(&self) -> ResultCode {
        match self {
            ApiError::InvalidArgument { .. } => ResultCode::BadRequest,
            ApiError::AuthExchange { .. } => ResultCode::Unauthorized,
            ApiError::NotFound { .. } => ResultCode::BadRequest,
            ApiError::MalformedInput { .. } => ResultCode::BadRequest,
            ApiError::Configuration { .. } => ResultCode::Exception,
            ApiError::Internal(_) => ResultCode::Exception,
        }
    }

    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
            ApiError::AuthExchange { .. } => StatusCode::UNAUTHORIZED,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::MalformedInput { .. } => StatusCode::BAD_REQUEST,
            ApiError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Collapse a failed upstream fetch into an empty list, logging the cause.
pub fn degrade_to_empty<T>(context: &str, result: anyhow::Result<Vec<T>>) -> Vec<T> {
    match result {
        Ok(items) => items,
        Err(e) => {
            warn!("{} failed, returning no results: {:#}", context, e);
            Vec::new()
        }
    }
}

impl From<Base64UrlError> for ApiError {
    fn from(err: Base64UrlError) -> Self {
        ApiError::MalformedInput {
            message: err.to_string(),
        }
    }
}

impl From<BlobError> for ApiError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::InvalidArgument(message) => ApiError::InvalidArgument { message },
            BlobError::NotFound(what) => ApiError::NotFound { what },
            BlobError::Transport(e) => ApiError::Internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            match &self {
                ApiError::Internal(e) => error!("Request failed: {:#}", e),
                other => error!("Request failed: {}", other),
            }
        } else {
            warn!("Request rejected ({}): {}", status.as_u16(), self);
        }

        Envelope::<()>::empty(self.result_code()).with_status(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_format() {
        let id = generate_request_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_status_and_code_mapping() {
        let cases = [
            (ApiError::invalid_argument("x"), StatusCode::BAD_REQUEST, ResultCode::BadRequest),
            (
                ApiError::AuthExchange {
                    message: "x".into(),
                },
                StatusCode::UNAUTHORIZED,
                ResultCode::Unauthorized,
            ),
            (
                ApiError::NotFound { what: "x".into() },
                StatusCode::NOT_FOUND,
                ResultCode::BadRequest,
            ),
            (
                ApiError::MalformedInput {
                    message: "x".into(),
                },
                StatusCode::BAD_REQUEST,
                ResultCode::BadRequest,
            ),
            (
                ApiError::Configuration {
                    message: "x".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
                ResultCode::Exception,
            ),
            (
                ApiError::Internal(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
                ResultCode::Exception,
            ),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status_code(), status, "{err:?}");
            assert_eq!(err.result_code(), code, "{err:?}");
        }
    }

    #[test]
    fn test_blob_error_conversion() {
        let err: ApiError = BlobError::NotFound("container 'files'".into()).into();
        assert!(matches!(err, ApiError::NotFound { .. }));
        let err: ApiError = BlobError::InvalidArgument("empty".into()).into();
        assert!(matches!(err, ApiError::InvalidArgument { .. }));
    }

    #[test]
    fn test_degrade_to_empty() {
        assert_eq!(degrade_to_empty("fetch", Ok(vec![1, 2])), vec![1, 2]);
        let empty: Vec<u8> = degrade_to_empty("fetch", Err(anyhow::anyhow!("down")));
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_into_response_renders_envelope() {
        let resp = ApiError::invalid_argument("missing code").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["resultCode"], "BadRequest");
        assert!(json["resultObject"].is_null());
    }
}
