//! Identity provider adapter.
//!
//! [`IdentityProvider`] covers the four calls the OAuth flow needs: the
//! authorize and logout URLs, the code-for-token exchange and the profile
//! lookup.  [`Auth0Client`] implements it against an Auth0 tenant.

use std::future::Future;
use std::pin::Pin;

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::IdentityConfig;

/// Scopes requested at login.
pub const LOGIN_SCOPE: &str = "openid profile email offline_access";

/// Tokens returned by a successful code exchange.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IdentityToken {
    #[serde(rename = "access_token", default)]
    pub access: String,
    #[serde(rename = "refresh_token", default)]
    pub refresh: Option<String>,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl UserProfile {
    /// Identifier reported to clients: the email when present, else the
    /// subject.
    pub fn user_id(&self) -> Option<String> {
        self.email
            .clone()
            .filter(|e| !e.trim().is_empty())
            .or_else(|| Some(self.sub.clone()).filter(|s| !s.is_empty()))
    }
}

pub trait IdentityProvider: Send + Sync + 'static {
    /// Authorize endpoint URL without the `state` parameter.
    fn authorize_url(&self, callback_url: &str) -> String;

    /// URL that ends the provider session.
    fn logout_url(&self) -> String;

    fn exchange_code(
        &self,
        code: &str,
        callback_url: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<IdentityToken>> + Send + '_>>;

    fn user_info(
        &self,
        access_token: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<UserProfile>> + Send + '_>>;
}

pub struct Auth0Client {
    client: reqwest::Client,
    tenant_url: String,
    client_id: String,
    client_secret: String,
}

impl Auth0Client {
    pub fn new(config: &IdentityConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        let tenant_url = config.tenant_url.trim().trim_end_matches('/').to_string();
        if tenant_url.is_empty() {
            warn!("No identity tenant configured; login and token exchange will fail");
        } else {
            info!("Identity provider: {}", tenant_url);
        }

        Ok(Self {
            client,
            tenant_url,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

impl IdentityProvider for Auth0Client {
    fn authorize_url(&self, callback_url: &str) -> String {
        format!(
            "{}/authorize?client_id={}&redirect_uri={}&response_type=code&scope={}",
            self.tenant_url,
            encode(&self.client_id),
            encode(callback_url),
            encode(LOGIN_SCOPE)
        )
    }

    fn logout_url(&self) -> String {
        format!(
            "{}/v2/logout?client_id={}&returnTo=",
            self.tenant_url,
            encode(&self.client_id)
        )
    }

    fn exchange_code(
        &self,
        code: &str,
        callback_url: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<IdentityToken>> + Send + '_>> {
        let code = code.trim().to_string();
        let callback_url = callback_url.to_string();
        Box::pin(async move {
            let url = format!("{}/oauth/token", self.tenant_url);
            let form = [
                ("grant_type", "authorization_code"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code.as_str()),
                ("redirect_uri", callback_url.as_str()),
            ];
            let resp = self.client.post(&url).form(&form).send().await?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(anyhow::anyhow!(
                    "Token exchange failed ({}): {}",
                    status.as_u16(),
                    body
                ));
            }
            let token: IdentityToken = resp.json().await?;
            debug!("Token exchange succeeded, expires_in={}", token.expires_in);
            Ok(token)
        })
    }

    fn user_info(
        &self,
        access_token: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<UserProfile>> + Send + '_>> {
        let access_token = access_token.to_string();
        Box::pin(async move {
            let url = format!("{}/userinfo", self.tenant_url);
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&access_token)
                .send()
                .await?
                .error_for_status()?;
            Ok(resp.json().await?)
        })
    }
}
