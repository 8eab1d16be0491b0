//! Gateway facade.
//!
//! Every handler builds a [`Gateway`] over the shared [`AppState`], records
//! who is calling with [`Gateway::with_client`], and then makes one call.
//! The gateway owns the policy decisions that sit between the HTTP surface
//! and the adapters: what counts as invalid input, which failures degrade
//! and which surface.

use axum::http::{HeaderMap, Uri};
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::ApiError;
use crate::forecast::ForecastRecord;
use crate::logging::{LogArgs, LogLevel};
use crate::metrics::{record_operation, BYTES_DOWNLOADED_TOTAL, BYTES_UPLOADED_TOTAL, LOG_RECORDS_TOTAL};
use crate::oauth::OAuthState;
use crate::storage::mime::mime_for_extension;
use crate::storage::repository::{BlobRepository, RawFile};
use crate::AppState;

/// Name reported by `ping`.
pub const SERVICE_NAME: &str = concat!(module_path!(), "::Gateway");

/// Who made the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContext {
    pub ip: String,
    pub agent: String,
    pub url: String,
}

impl ClientContext {
    pub const UNKNOWN_IP: &'static str = "0.0.0.0";
    pub const UNKNOWN_AGENT: &'static str = "no client";

    /// Read the caller from request headers.  The first `x-forwarded-for`
    /// hop is taken as the client address.
    pub fn from_request(headers: &HeaderMap, uri: &Uri) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let ip = header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(Self::UNKNOWN_IP)
            .to_string();
        let agent = header("user-agent").unwrap_or(Self::UNKNOWN_AGENT).to_string();

        Self {
            ip,
            agent,
            url: uri.to_string(),
        }
    }
}

impl Default for ClientContext {
    fn default() -> Self {
        Self {
            ip: Self::UNKNOWN_IP.to_string(),
            agent: Self::UNKNOWN_AGENT.to_string(),
            url: String::new(),
        }
    }
}

/// Result of a successful code exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenResponse {
    pub token: String,
    #[serde(rename = "userID")]
    pub user_id: Option<String>,
    pub refresh: Option<String>,
    pub expires: DateTime<Utc>,
}

pub struct Gateway<'a> {
    state: &'a AppState,
    client: ClientContext,
}

impl<'a> Gateway<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self {
            state,
            client: ClientContext::default(),
        }
    }

    pub fn with_client(mut self, client: ClientContext) -> Self {
        self.client = client;
        self
    }

    pub fn client(&self) -> &ClientContext {
        &self.client
    }

    /// Diagnostic signature echoing `message`.
    pub fn ping(&self, message: Option<&str>) -> String {
        let message = message.unwrap_or_default();
        info!("Pinged = {} ip={}", message, self.client.ip);
        record_operation("ping", true);
        format!(
            "Service : {}; Version : {}; Env : {}; Message : {}",
            SERVICE_NAME,
            env!("CARGO_PKG_VERSION"),
            self.state.config.environment,
            message
        )
    }

    /// Provider authorize URL carrying the encoded `state`.
    pub fn login_url(&self, state: &OAuthState) -> String {
        let base = self
            .state
            .identity
            .authorize_url(&self.state.config.identity.callback_url);
        info!(
            "Login requested method={} port={} ip={}",
            state.method(),
            state.port(),
            self.client.ip
        );
        record_operation("login", true);
        format!("{}&state={}", base, state.encode())
    }

    pub fn logout_url(&self) -> String {
        info!("Request for logout ip={}", self.client.ip);
        record_operation("logout", true);
        self.state.identity.logout_url()
    }

    /// Trade an authorization code for tokens, then look up the user.
    ///
    /// A failed profile lookup still yields the token, with no user id.
    pub async fn exchange_code_for_token(&self, code: &str) -> Result<TokenResponse, ApiError> {
        let code = code.trim();
        if code.is_empty() {
            record_operation("token", false);
            return Err(ApiError::invalid_argument("An authorization code is required"));
        }

        let identity = &self.state.identity;
        let callback = &self.state.config.identity.callback_url;

        let token = match identity.exchange_code(code, callback).await {
            Ok(token) if !token.access.trim().is_empty() => token,
            Ok(_) => {
                record_operation("token", false);
                return Err(ApiError::AuthExchange {
                    message: "Identity provider returned no access token".to_string(),
                });
            }
            Err(e) => {
                record_operation("token", false);
                return Err(ApiError::AuthExchange {
                    message: format!("Code exchange failed: {:#}", e),
                });
            }
        };

        let user_id = match identity.user_info(&token.access).await {
            Ok(profile) => profile.user_id(),
            Err(e) => {
                warn!("Profile lookup failed, returning token without user: {:#}", e);
                None
            }
        };

        let Some(expires) = TimeDelta::try_seconds(token.expires_in.max(0))
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        else {
            record_operation("token", false);
            return Err(ApiError::AuthExchange {
                message: format!(
                    "Identity provider returned an unusable lifetime of {}s",
                    token.expires_in
                ),
            });
        };

        record_operation("token", true);
        Ok(TokenResponse {
            token: token.access,
            user_id,
            refresh: token.refresh,
            expires,
        })
    }

    pub async fn fetch_forecast(&self) -> Vec<ForecastRecord> {
        info!("Request for weather forecast");
        let records = self.state.forecast.get_forecast().await;
        record_operation("forecast", !records.is_empty());
        records
    }

    fn files(&self) -> Result<BlobRepository, ApiError> {
        let backend = self.state.blobs.clone().ok_or_else(|| ApiError::Configuration {
            message: "No file store is configured".to_string(),
        })?;
        Ok(BlobRepository::new(backend)
            .with_mime_resolver(|ext| mime_for_extension(ext).to_string()))
    }

    /// Store `data` under a generated name in the default container.
    pub async fn upload_file(&self, data: Bytes, filename: &str) -> Result<String, ApiError> {
        let filename = filename.trim();
        if filename.is_empty() {
            record_operation("upload", false);
            return Err(ApiError::invalid_argument(
                "A full filename with extension is required",
            ));
        }

        let size = data.len() as u64;
        let container = &self.state.config.storage.default_container;
        let result = match self.files() {
            Ok(files) => files
                .write(data, container, filename, None)
                .await
                .map_err(ApiError::from),
            Err(e) => Err(e),
        };

        record_operation("upload", result.is_ok());
        let url = result?;
        metrics::counter!(BYTES_UPLOADED_TOTAL).increment(size);
        info!("Inserted new file {}", url);
        Ok(url)
    }

    /// Read a blob from the default container.  Missing blobs come back
    /// as an invalid [`RawFile`].
    pub async fn download_file(&self, blob_name: &str) -> Result<RawFile, ApiError> {
        let blob_name = blob_name.trim();
        if blob_name.is_empty() {
            record_operation("download", false);
            return Err(ApiError::invalid_argument(
                "The blob name with extension is required",
            ));
        }

        let container = &self.state.config.storage.default_container;
        let result = match self.files() {
            Ok(files) => files
                .read_raw(container, blob_name)
                .await
                .map_err(ApiError::from),
            Err(e) => Err(e),
        };

        record_operation("download", result.is_ok());
        let file = result?;
        metrics::counter!(BYTES_DOWNLOADED_TOTAL).increment(file.data.len() as u64);
        Ok(file)
    }

    /// Hand one record to the configured sink.  Returns whether it was
    /// written.
    pub async fn write_log(
        &self,
        level: LogLevel,
        category: &str,
        message: &str,
        mut args: LogArgs,
    ) -> bool {
        args.push("ip", self.client.ip.as_str());
        let sink = &self.state.log_sink;
        let written = sink.insert(level, category, message, args).await;
        metrics::counter!(
            LOG_RECORDS_TOTAL,
            "sink" => sink.kind().to_string(),
            "written" => written.to_string()
        )
        .increment(1);
        written
    }
}
