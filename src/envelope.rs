//! The `{resultCode, resultObject}` response envelope.
//!
//! Every JSON endpoint wraps its payload in an [`Envelope`].  The result
//! code is `Success` exactly when a payload is present; the constructors
//! below are the only way to build one so the two never disagree.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Outcome reported in the `resultCode` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResultCode {
    Success,
    Unauthorized,
    BadRequest,
    Exception,
    Unknown,
}

/// Typed response envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    result_code: ResultCode,
    result_object: Option<T>,
}

impl<T> Envelope<T> {
    /// A successful envelope carrying `payload`.
    pub fn success(payload: T) -> Self {
        Self {
            result_code: ResultCode::Success,
            result_object: Some(payload),
        }
    }

    /// An envelope with no payload.  `Success` is downgraded to `Unknown`
    /// since a success must carry a payload.
    pub fn empty(code: ResultCode) -> Self {
        let result_code = match code {
            ResultCode::Success => ResultCode::Unknown,
            other => other,
        };
        Self {
            result_code,
            result_object: None,
        }
    }

    /// `Success` when the payload is present, `Unknown` otherwise.
    pub fn from_option(payload: Option<T>) -> Self {
        match payload {
            Some(p) => Self::success(p),
            None => Self::empty(ResultCode::Unknown),
        }
    }

    pub fn result_code(&self) -> ResultCode {
        self.result_code
    }

    pub fn result_object(&self) -> Option<&T> {
        self.result_object.as_ref()
    }
}

impl<T: Serialize> Envelope<T> {
    /// Render with an explicit HTTP status.
    pub fn with_status(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        self.with_status(StatusCode::OK)
    }
}
