//! File upload and download.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use tracing::info;

use crate::envelope::Envelope;
use crate::errors::ApiError;
use crate::gateway::{ClientContext, Gateway};
use crate::AppState;

/// `POST /api/v1/file/{name}`: store the raw request body.
///
/// `name` is the original filename; its extension decides the stored
/// content type and the generated blob name's suffix.
#[utoipa::path(
    post,
    path = "/api/v1/file/{name}",
    tag = "Files",
    operation_id = "UploadFile",
    params(("name" = String, Path, description = "Original filename with extension")),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Envelope holding the blob URL"),
        (status = 400, description = "Missing filename or empty body"),
        (status = 404, description = "Default container does not exist")
    )
)]
pub async fn upload(
    state: Arc<AppState>,
    client: ClientContext,
    name: Option<&str>,
    body: Bytes,
) -> Result<Response, ApiError> {
    info!("UploadFile triggered.");
    let name = name.unwrap_or_default();
    let url = Gateway::new(&state)
        .with_client(client)
        .upload_file(body, name)
        .await?;
    Ok(Envelope::success(url).into_response())
}

/// `GET /api/v1/file/{name}`: stream a stored blob back.
#[utoipa::path(
    get,
    path = "/api/v1/file/{name}",
    tag = "Files",
    operation_id = "DownloadFile",
    params(("name" = String, Path, description = "Blob name returned by the upload")),
    responses(
        (status = 200, description = "File bytes with their stored content type"),
        (status = 404, description = "No such blob")
    )
)]
pub async fn download(
    state: Arc<AppState>,
    client: ClientContext,
    name: &str,
) -> Result<Response, ApiError> {
    info!("DownloadFile triggered.");
    let file = Gateway::new(&state)
        .with_client(client)
        .download_file(name)
        .await?;

    if !file.valid() {
        return Err(ApiError::NotFound {
            what: format!("File '{}'", name.trim()),
        });
    }

    let disposition = format!(
        "inline; filename*=UTF-8''{}",
        utf8_percent_encode(&file.filename, NON_ALPHANUMERIC)
    );
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, file.content_type.as_str())
        .header(header::CONTENT_LENGTH, file.data.len())
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from(file.data))
        .map_err(|e| ApiError::Internal(e.into()))
}
