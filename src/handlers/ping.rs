//! Liveness echo.

use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use tracing::info;

use crate::envelope::Envelope;
use crate::gateway::{ClientContext, Gateway};
use crate::AppState;

/// `GET /api/v1/ping/{msg}`: service signature echoing `msg`.
#[utoipa::path(
    get,
    path = "/api/v1/ping/{msg}",
    tag = "Diagnostics",
    operation_id = "Ping",
    params(("msg" = String, Path, description = "Text echoed in the signature")),
    responses(
        (status = 200, description = "Envelope holding the signature string")
    )
)]
pub async fn ping(state: Arc<AppState>, client: ClientContext, msg: Option<&str>) -> Response {
    info!("Ping triggered.");
    let signature = Gateway::new(&state).with_client(client).ping(msg);
    Envelope::success(signature).into_response()
}
