//! Axum router construction and route mapping.
//!
//! The [`app`] function wires every endpoint to its handler and returns a
//! ready-to-serve [`axum::Router`].  Gateway routes live under `/api`;
//! `/health`, `/metrics` and `/openapi.json` sit at the root.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, OriginalUri, Path, RawQuery, State},
    http::{HeaderMap, HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::errors::generate_request_id;
use crate::gateway::ClientContext;
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

// -- OpenAPI document ---------------------------------------------------------

/// OpenAPI documentation for the Portico API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Portico API",
        version = "0.1.0",
        description = "Gateway for identity, file, forecast and logging services"
    ),
    paths(
        health_check,
        crate::handlers::ping::ping,
        crate::handlers::forecast::get_forecast,
        crate::handlers::auth::login,
        crate::handlers::auth::token,
        crate::handlers::auth::logout,
        crate::handlers::file::upload,
        crate::handlers::file::download,
        crate::handlers::log::write_log,
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Diagnostics", description = "Liveness echo"),
        (name = "Forecast", description = "Weather forecast"),
        (name = "Auth", description = "OAuth login flow"),
        (name = "Files", description = "File upload and download"),
        (name = "Logging", description = "Client log ingestion"),
    )
)]
struct ApiDoc;

/// Build the axum [`Router`] with all routes.
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    let max_upload = state.config.server.max_upload_size;

    let api = Router::new()
        .route("/v1/ping", get(handle_ping))
        .route("/v1/ping/:msg", get(handle_ping_msg))
        .route("/v1/forecast", get(handle_forecast))
        .route("/login", get(handle_login))
        .route("/login/:id", get(handle_login_id))
        .route("/token", get(handle_token))
        .route("/v1/logout", get(handle_logout))
        .route("/v1/file", get(handle_missing_name).post(handle_upload_unnamed))
        .route("/v1/file/*name", get(handle_download).post(handle_upload))
        .route("/v1/log", axum::routing::post(handle_log));

    Router::new()
        // Health check endpoint.
        .route("/health", get(health_check))
        // Prometheus metrics endpoint.
        .route("/metrics", get(metrics_handler))
        // OpenAPI document.
        .route("/openapi.json", get(openapi_json))
        .nest("/api", api)
        // Application state shared across all handlers.
        .with_state(state)
        // Layer ordering: inner layers run first, outer layers wrap them.
        .layer(DefaultBodyLimit::max(max_upload))
        // common_headers_middleware adds request id and server headers.
        .layer(middleware::from_fn(common_headers_middleware))
        // Request/response spans.
        .layer(TraceLayer::new_for_http())
        // metrics_middleware is outer (captures full request lifecycle).
        .layer(middleware::from_fn(metrics_middleware))
}

// -- Common headers middleware -----------------------------------------------

/// Adds to every response:
/// - `x-request-id`: 16-character uppercase hex string
/// - `Server`: `Portico`
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if !headers.contains_key("x-request-id") {
        if let Ok(value) = HeaderValue::from_str(&generate_request_id()) {
            headers.insert("x-request-id", value);
        }
    }
    headers.insert("server", HeaderValue::from_static("Portico"));

    response
}

// -- Health check ------------------------------------------------------------

/// `GET /health`: returns `{"status": "ok"}` with 200 OK.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Health check OK")
    )
)]
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// -- Query parameter parsing helper ------------------------------------------

/// Parse raw query string into a HashMap.
fn parse_query(raw: Option<String>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if let Some(qs) = raw {
        for part in qs.split('&') {
            let (k, v) = part.split_once('=').unwrap_or((part, ""));
            if k.is_empty() {
                continue;
            }
            // Form-style '+' means space in query values.
            let decode = |s: &str| {
                percent_encoding::percent_decode_str(&s.replace('+', " "))
                    .decode_utf8_lossy()
                    .into_owned()
            };
            map.insert(decode(k), decode(v));
        }
    }
    map
}

fn client(headers: &HeaderMap, uri: &OriginalUri) -> ClientContext {
    ClientContext::from_request(headers, &uri.0)
}

// -- Route dispatch -----------------------------------------------------------

async fn handle_ping(
    State(state): State<Arc<AppState>>,
    uri: OriginalUri,
    headers: HeaderMap,
) -> Response {
    crate::handlers::ping::ping(state, client(&headers, &uri), None).await
}

async fn handle_ping_msg(
    State(state): State<Arc<AppState>>,
    Path(msg): Path<String>,
    uri: OriginalUri,
    headers: HeaderMap,
) -> Response {
    crate::handlers::ping::ping(state, client(&headers, &uri), Some(&msg)).await
}

async fn handle_forecast(
    State(state): State<Arc<AppState>>,
    uri: OriginalUri,
    headers: HeaderMap,
) -> Response {
    crate::handlers::forecast::get_forecast(state, client(&headers, &uri)).await
}

async fn handle_login(
    State(state): State<Arc<AppState>>,
    RawQuery(raw_query): RawQuery,
    uri: OriginalUri,
    headers: HeaderMap,
) -> Response {
    let query = parse_query(raw_query);
    crate::handlers::auth::login(state, client(&headers, &uri), None, &query).await
}

async fn handle_login_id(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    RawQuery(raw_query): RawQuery,
    uri: OriginalUri,
    headers: HeaderMap,
) -> Response {
    let query = parse_query(raw_query);
    crate::handlers::auth::login(state, client(&headers, &uri), Some(&id), &query).await
}

async fn handle_token(
    State(state): State<Arc<AppState>>,
    RawQuery(raw_query): RawQuery,
    uri: OriginalUri,
    headers: HeaderMap,
) -> Response {
    let query = parse_query(raw_query);
    crate::handlers::auth::token(state, client(&headers, &uri), &query)
        .await
        .into_response()
}

async fn handle_logout(
    State(state): State<Arc<AppState>>,
    uri: OriginalUri,
    headers: HeaderMap,
) -> Response {
    crate::handlers::auth::logout(state, client(&headers, &uri)).await
}

async fn handle_upload(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    crate::handlers::file::upload(state, client(&headers, &uri), Some(&name), body)
        .await
        .into_response()
}

async fn handle_upload_unnamed(
    State(state): State<Arc<AppState>>,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    crate::handlers::file::upload(state, client(&headers, &uri), None, body)
        .await
        .into_response()
}

async fn handle_download(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    uri: OriginalUri,
    headers: HeaderMap,
) -> Response {
    crate::handlers::file::download(state, client(&headers, &uri), &name)
        .await
        .into_response()
}

async fn handle_missing_name() -> Response {
    crate::errors::ApiError::invalid_argument("The blob name with extension to get is required")
        .into_response()
}

async fn handle_log(
    State(state): State<Arc<AppState>>,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    crate::handlers::log::write_log(state, client(&headers, &uri), body)
        .await
        .into_response()
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::repository::{LogStore, MemoryRepository};
    use crate::logging::{LogLevel, LogRecord};
    use crate::oauth::{OAuthState, TokenRetrieveType};
    use crate::testing::{test_state, test_state_with_store};
    use axum::body::Body;
    use tower::ServiceExt;

    async fn send(state: AppState, req: Request<Body>) -> Response {
        app(Arc::new(state)).oneshot(req).await.unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_req(uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(body.into())
            .unwrap()
    }

    async fn json_body(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn text_body(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_parse_query() {
        let q = parse_query(Some("code=a%2Bb&state=xyz&flag&m=re+direct".to_string()));
        assert_eq!(q["code"], "a+b");
        assert_eq!(q["state"], "xyz");
        assert_eq!(q["flag"], "");
        assert_eq!(q["m"], "re direct");
        assert!(parse_query(None).is_empty());
    }

    #[tokio::test]
    async fn test_health_and_common_headers() {
        let resp = send(test_state(), get_req("/health")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["server"], "Portico");
        assert_eq!(resp.headers()["x-request-id"].len(), 16);
    }

    #[tokio::test]
    async fn test_openapi_lists_routes() {
        let resp = send(test_state(), get_req("/openapi.json")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = json_body(resp).await;
        assert!(json["paths"]["/api/v1/log"].is_object());
        assert!(json["paths"]["/api/token"].is_object());
    }

    #[tokio::test]
    async fn test_ping_echoes_message() {
        let resp = send(test_state(), get_req("/api/v1/ping/hello")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = json_body(resp).await;
        assert_eq!(json["resultCode"], "Success");
        assert!(json["resultObject"].as_str().unwrap().contains("hello"));

        let resp = send(test_state(), get_req("/api/v1/ping")).await;
        let json = json_body(resp).await;
        assert!(json["resultObject"].as_str().unwrap().ends_with("Message : "));
    }

    #[tokio::test]
    async fn test_forecast() {
        let resp = send(test_state(), get_req("/api/v1/forecast")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = json_body(resp).await;
        assert_eq!(json["resultCode"], "Success");
        let records = json["resultObject"].as_array().unwrap();
        assert_eq!(records.len(), 5);
        let c = records[0]["c"].as_i64().unwrap();
        let f = records[0]["f"].as_i64().unwrap();
        assert_eq!(f, 32 + (c as f64 / 0.5556) as i64);
    }

    #[tokio::test]
    async fn test_login_returns_text_url_with_state() {
        let resp = send(test_state(), get_req("/api/login/client-9?p=3000&m=Redirect")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
        let url = text_body(resp).await;
        let (_, encoded) = url.rsplit_once("&state=").unwrap();
        let state = OAuthState::decode(encoded).unwrap();
        assert_eq!(state.method(), TokenRetrieveType::Redirect);
        assert_eq!(state.port(), 5001);
        assert_eq!(state.client_hint(), Some("client-9"));
    }

    #[tokio::test]
    async fn test_login_defaults() {
        let resp = send(test_state(), get_req("/api/login")).await;
        let url = text_body(resp).await;
        let (_, encoded) = url.rsplit_once("&state=").unwrap();
        let state = OAuthState::decode(encoded).unwrap();
        assert_eq!(state.method(), TokenRetrieveType::Polling);
        assert_eq!(state.port(), 50001);
        assert_eq!(state.client_hint(), None);
    }

    #[tokio::test]
    async fn test_token_polling_returns_envelope() {
        let oauth = OAuthState::new(TokenRetrieveType::Polling, 6000, None).encode();
        let resp = send(test_state(), get_req(&format!("/api/token?code=good&state={oauth}"))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = json_body(resp).await;
        assert_eq!(json["resultCode"], "Success");
        assert_eq!(json["resultObject"]["token"], "access-good");
        assert_eq!(json["resultObject"]["userID"], "user@example.com");
        assert_eq!(json["resultObject"]["refresh"], "refresh-good");
    }

    #[tokio::test]
    async fn test_token_redirect_goes_to_loopback() {
        let oauth = OAuthState::new(TokenRetrieveType::Redirect, 6123, None).encode();
        let resp = send(test_state(), get_req(&format!("/api/token?code=good&state={oauth}"))).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        let location = resp.headers()["location"].to_str().unwrap();
        assert!(location.starts_with("http://127.0.0.1:6123/login?token=access%2Dgood&"));
        assert!(location.contains("&userID=user%40example%2Ecom&"));
    }

    #[tokio::test]
    async fn test_token_errors() {
        let oauth = OAuthState::new(TokenRetrieveType::Polling, 6000, None).encode();

        let resp = send(test_state(), get_req(&format!("/api/token?state={oauth}"))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["resultCode"], "BadRequest");

        let resp = send(test_state(), get_req("/api/token?code=good&state=%%%")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = send(test_state(), get_req(&format!("/api/token?code=nope&state={oauth}"))).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let json = json_body(resp).await;
        assert_eq!(json["resultCode"], "Unauthorized");
        assert!(json["resultObject"].is_null());
    }

    #[tokio::test]
    async fn test_logout_redirects() {
        let resp = send(test_state(), get_req("/api/v1/logout")).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(
            resp.headers()["location"],
            "https://id.test/v2/logout?client_id=stub&returnTo="
        );
    }

    #[tokio::test]
    async fn test_upload_then_download() {
        let state = Arc::new(test_state());
        let router = app(state);

        let resp = router
            .clone()
            .oneshot(post_req("/api/v1/file/report.pdf", "%PDF-1.7 body"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = json_body(resp).await;
        assert_eq!(json["resultCode"], "Success");
        let url = json["resultObject"].as_str().unwrap().to_string();
        let blob = url.rsplit('/').next().unwrap();
        assert_eq!(blob.len(), 11 + ".pdf".len());

        let resp = router
            .oneshot(get_req(&format!("/api/v1/file/{blob}")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "application/pdf");
        assert_eq!(
            resp.headers()["content-disposition"],
            "inline; filename*=UTF-8''report%2Epdf"
        );
        assert_eq!(text_body(resp).await, "%PDF-1.7 body");
    }

    #[tokio::test]
    async fn test_upload_rejections() {
        let resp = send(test_state(), post_req("/api/v1/file/empty.txt", Body::empty())).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = send(test_state(), post_req("/api/v1/file", "data")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let mut state = test_state();
        state.blobs = None;
        let resp = send(state, post_req("/api/v1/file/a.txt", "data")).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(resp).await["resultCode"], "Exception");
    }

    #[tokio::test]
    async fn test_upload_over_limit() {
        let mut state = test_state();
        state.config.server.max_upload_size = 8;
        let resp = send(state, post_req("/api/v1/file/big.bin", "0123456789abcdef")).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_download_missing_is_404_envelope() {
        let resp = send(test_state(), get_req("/api/v1/file/missing.txt")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json = json_body(resp).await;
        assert_eq!(json["resultCode"], "BadRequest");
        assert!(json["resultObject"].is_null());
    }

    #[tokio::test]
    async fn test_write_log_persists_one_record() {
        let store = Arc::new(MemoryRepository::<LogRecord>::new());
        let state = test_state_with_store(store.clone());

        let resp = send(
            state,
            post_req(
                "/api/v1/log",
                r#"{"message":"hi","level":"Warning","category":"test"}"#,
            ),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = json_body(resp).await;
        assert_eq!(json["resultCode"], "Success");
        assert_eq!(json["resultObject"], true);

        let records = store.latest(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, LogLevel::Warning);
        assert_eq!(records[0].category, "test");
        assert_eq!(records[0].message, "hi");
    }

    #[tokio::test]
    async fn test_write_log_rejects_bad_body() {
        let resp = send(test_state(), post_req("/api/v1/log", "{")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["resultCode"], "BadRequest");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let resp = send(test_state(), get_req("/api/v2/nothing")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
