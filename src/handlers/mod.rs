//! Route handlers.
//!
//! Handlers receive already-extracted arguments from [`crate::server`],
//! build a [`crate::gateway::Gateway`] for the caller and shape its result
//! into an envelope, a redirect or a raw body.

pub mod auth;
pub mod file;
pub mod forecast;
pub mod log;
pub mod ping;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

/// `302 Found` pointing at `location`.
pub(crate) fn redirect(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}
