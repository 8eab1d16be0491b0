use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use tracing::info;

use crate::envelope::Envelope;
use crate::gateway::{ClientContext, Gateway};
use crate::AppState;

/// `GET /api/v1/forecast`: upcoming days from the configured provider.
///
/// An upstream failure yields an empty list, not an error.
#[utoipa::path(
    get,
    path = "/api/v1/forecast",
    tag = "Forecast",
    operation_id = "GetForecast",
    responses(
        (status = 200, description = "Envelope holding forecast records")
    )
)]
pub async fn get_forecast(state: Arc<AppState>, client: ClientContext) -> Response {
    info!("GetForecast triggered.");
    let records = Gateway::new(&state).with_client(client).fetch_forecast().await;
    Envelope::success(records).into_response()
}
