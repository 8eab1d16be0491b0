//! Client log ingestion.

use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use garde::Validate;
use serde::Deserialize;
use tracing::{debug, info};

use crate::envelope::Envelope;
use crate::errors::ApiError;
use crate::gateway::{ClientContext, Gateway};
use crate::logging::{LogArgs, LogLevel};
use crate::AppState;

/// Category used when the request names none.
pub const DEFAULT_CATEGORY: &str = "API";

/// Body of `POST /api/v1/log`.
#[derive(Debug, Deserialize, garde::Validate)]
pub struct LogRequest {
    #[garde(length(min = 1, max = 8192))]
    pub message: String,
    /// Level name; unknown or missing reads as `Information`.
    #[serde(default)]
    #[garde(length(max = 32))]
    pub level: Option<String>,
    #[serde(default)]
    #[garde(length(max = 256))]
    pub category: Option<String>,
    #[serde(default)]
    #[garde(skip)]
    pub args: LogArgs,
}

impl LogRequest {
    pub fn level(&self) -> LogLevel {
        LogLevel::from(self.level.clone().unwrap_or_default())
    }

    pub fn category(&self) -> &str {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CATEGORY)
    }
}

/// Parse and validate a raw request body.
pub fn parse_log_request(body: &[u8]) -> Result<LogRequest, ApiError> {
    let req: LogRequest = serde_json::from_slice(body).map_err(|e| ApiError::MalformedInput {
        message: format!("Invalid log request: {}", e),
    })?;
    req.validate()
        .map_err(|report| ApiError::invalid_argument(report.to_string()))?;
    Ok(req)
}

/// `POST /api/v1/log`: write one record through the configured sink.
///
/// The request succeeds once accepted; whether the sink persisted it is
/// reported in metrics, not to the caller.
#[utoipa::path(
    post,
    path = "/api/v1/log",
    tag = "Logging",
    operation_id = "WriteLog",
    request_body(content = String, content_type = "application/json",
        description = "{message, level?, category?, args?}"),
    responses(
        (status = 200, description = "Envelope holding true"),
        (status = 400, description = "Body is not a valid log request")
    )
)]
pub async fn write_log(
    state: Arc<AppState>,
    client: ClientContext,
    body: Bytes,
) -> Result<Response, ApiError> {
    info!("WriteLog triggered.");
    let req = parse_log_request(&body)?;
    let level = req.level();
    let category = req.category().to_string();

    let written = Gateway::new(&state)
        .with_client(client)
        .write_log(level, &category, &req.message, req.args)
        .await;
    debug!("Client log category={} level={} written={}", category, level, written);

    Ok(Envelope::success(true).into_response())
}
