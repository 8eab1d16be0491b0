//! OAuth login, callback and logout.
//!
//! The login route returns the provider's authorize URL with a state token
//! describing how the client wants its tokens delivered.  The callback
//! route decodes that state after the provider redirects back, exchanges
//! the code and either answers with an envelope (`Polling`) or bounces the
//! browser to the client's loopback listener (`Redirect`).

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::SecondsFormat;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use tracing::{debug, info};

use super::redirect;
use crate::convert::{parse_enum, parse_long};
use crate::envelope::Envelope;
use crate::errors::ApiError;
use crate::gateway::{ClientContext, Gateway, TokenResponse};
use crate::oauth::{OAuthState, TokenRetrieveType};
use crate::AppState;

fn query_value<'q>(query: &'q HashMap<String, String>, key: &str) -> Option<&'q str> {
    query.get(key).map(String::as_str)
}

/// `GET /api/login/{id}`: plain-text authorize URL.
///
/// Query `p` is the loopback port for redirect delivery and `m` the
/// delivery method (`polling` or `redirect`).
#[utoipa::path(
    get,
    path = "/api/login/{id}",
    tag = "Auth",
    operation_id = "Login",
    params(
        ("id" = String, Path, description = "Optional client identifier carried in the state"),
        ("p" = Option<i64>, Query, description = "Loopback port for redirect delivery"),
        ("m" = Option<String>, Query, description = "Token delivery method: polling or redirect")
    ),
    responses(
        (status = 200, description = "Authorize URL as text/plain")
    )
)]
pub async fn login(
    state: Arc<AppState>,
    client: ClientContext,
    id: Option<&str>,
    query: &HashMap<String, String>,
) -> Response {
    info!("Login triggered.");
    let port = parse_long(
        query_value(query, "p"),
        i64::from(state.config.identity.default_port),
    );
    let method = parse_enum(query_value(query, "m"), TokenRetrieveType::Polling);
    let oauth = OAuthState::new(method, port, id.map(str::to_string));

    let url = Gateway::new(&state).with_client(client).login_url(&oauth);
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        url,
    )
        .into_response()
}

/// Loopback URL the desktop client listens on for `Redirect` delivery.
fn loopback_url(port: u16, token: &TokenResponse) -> String {
    let enc = |v: &str| utf8_percent_encode(v, NON_ALPHANUMERIC).to_string();
    format!(
        "http://{}:{}/login?token={}&refresh={}&userID={}&expires={}",
        Ipv4Addr::LOCALHOST,
        port,
        enc(&token.token),
        enc(token.refresh.as_deref().unwrap_or_default()),
        enc(token.user_id.as_deref().unwrap_or_default()),
        enc(&token.expires.to_rfc3339_opts(SecondsFormat::Secs, true))
    )
}

/// `GET /api/token`: OAuth callback.
#[utoipa::path(
    get,
    path = "/api/token",
    tag = "Auth",
    operation_id = "Token",
    params(
        ("code" = String, Query, description = "Authorization code from the provider"),
        ("state" = String, Query, description = "State token issued by the login route")
    ),
    responses(
        (status = 200, description = "Envelope holding the token response (polling)"),
        (status = 302, description = "Redirect to the client's loopback listener"),
        (status = 400, description = "Missing code or undecodable state"),
        (status = 401, description = "Code exchange rejected")
    )
)]
pub async fn token(
    state: Arc<AppState>,
    client: ClientContext,
    query: &HashMap<String, String>,
) -> Result<Response, ApiError> {
    info!("Token triggered.");
    let code = query_value(query, "code").unwrap_or_default();
    if code.trim().is_empty() {
        return Err(ApiError::invalid_argument("Invalid input parameters."));
    }

    let oauth = OAuthState::decode(query_value(query, "state").unwrap_or_default()).ok_or_else(
        || ApiError::MalformedInput {
            message: "The state parameter is missing or could not be decoded".to_string(),
        },
    )?;
    debug!("Callback state method={} port={}", oauth.method(), oauth.port());

    let token = Gateway::new(&state)
        .with_client(client)
        .exchange_code_for_token(code)
        .await?;

    match oauth.method() {
        TokenRetrieveType::Redirect => Ok(redirect(&loopback_url(oauth.port(), &token))),
        TokenRetrieveType::Polling => Ok(Envelope::success(token).into_response()),
    }
}

/// `GET /api/v1/logout`: redirect to the provider's logout endpoint.
#[utoipa::path(
    get,
    path = "/api/v1/logout",
    tag = "Auth",
    operation_id = "Logout",
    responses(
        (status = 302, description = "Redirect to the provider logout URL")
    )
)]
pub async fn logout(state: Arc<AppState>, client: ClientContext) -> Response {
    info!("Logout triggered.");
    let url = Gateway::new(&state).with_client(client).logout_url();
    redirect(&url)
}
