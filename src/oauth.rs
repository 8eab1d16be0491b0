//! OAuth `state` round trip.
//!
//! The login endpoint packs the client's redirect preferences into an
//! [`OAuthState`], serializes it to JSON, and base64url-encodes the bytes.
//! The identity provider hands the token back untouched on the callback,
//! where [`OAuthState::decode`] recovers it.
//!
//! Wire form (before encoding):
//!
//! ```json
//! {"type":"Redirect","port":5005,"id":"client-a"}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::base64url;

/// Lowest loopback port a client may ask to be redirected to.
pub const MIN_PORT: u16 = 5001;

/// Highest loopback port.
pub const MAX_PORT: u16 = 65535;

/// Port used when the client supplied none (or zero).
pub const FALLBACK_PORT: u16 = 50001;

/// How the client wants to receive its token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenRetrieveType {
    /// The client polls for the token; the callback answers with JSON.
    Polling,
    /// The callback redirects to a loopback listener on the client.
    Redirect,
}

impl FromStr for TokenRetrieveType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "polling" | "0" => Ok(TokenRetrieveType::Polling),
            "redirect" | "1" => Ok(TokenRetrieveType::Redirect),
            other => Err(format!("unknown token retrieve type '{other}'")),
        }
    }
}

impl fmt::Display for TokenRetrieveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenRetrieveType::Polling => f.write_str("Polling"),
            TokenRetrieveType::Redirect => f.write_str("Redirect"),
        }
    }
}

/// Client preferences carried through the identity provider's redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OAuthState {
    #[serde(rename = "type")]
    method: TokenRetrieveType,
    port: u16,
    #[serde(rename = "id", skip_serializing_if = "Option::is_none")]
    client_hint: Option<String>,
}

/// Lenient shape used while decoding; normalized into [`OAuthState`].
#[derive(Deserialize)]
struct RawState {
    #[serde(rename = "type")]
    method: TokenRetrieveType,
    #[serde(default)]
    port: Option<i64>,
    #[serde(rename = "id", default)]
    client_hint: Option<String>,
}

/// Clamp a raw port into `[MIN_PORT, MAX_PORT]`; zero or negative means
/// "not supplied" and yields [`FALLBACK_PORT`].
pub fn clamp_port(raw: i64) -> u16 {
    if raw <= 0 {
        return FALLBACK_PORT;
    }
    raw.clamp(MIN_PORT as i64, MAX_PORT as i64) as u16
}

impl OAuthState {
    pub fn new(method: TokenRetrieveType, port: i64, client_hint: Option<String>) -> Self {
        let client_hint = client_hint
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty());
        Self {
            method,
            port: clamp_port(port),
            client_hint,
        }
    }

    pub fn method(&self) -> TokenRetrieveType {
        self.method
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn client_hint(&self) -> Option<&str> {
        self.client_hint.as_deref()
    }

    /// Set the port, clamped. Returns the stored value.
    pub fn set_port(&mut self, raw: i64) -> u16 {
        self.port = clamp_port(raw);
        self.port
    }

    /// Serialize to JSON and base64url-encode.
    pub fn encode(&self) -> String {
        // Serializing a struct of plain fields cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        base64url::encode(&json)
    }

    /// Decode a token produced by [`OAuthState::encode`].
    ///
    /// Returns `None` for an empty token, bad base64url, invalid JSON or a
    /// missing `type`; never a partially filled state.
    pub fn decode(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }

        let bytes = match base64url::decode(token) {
            Ok(b) => b,
            Err(e) => {
                debug!("State token is not base64url: {}", e);
                return None;
            }
        };

        let raw: RawState = match serde_json::from_slice(&bytes) {
            Ok(r) => r,
            Err(e) => {
                debug!("State token is not a valid state object: {}", e);
                return None;
            }
        };

        Some(Self::new(
            raw.method,
            raw.port.unwrap_or(0),
            raw.client_hint,
        ))
    }
}
