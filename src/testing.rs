//! Stub adapters and a ready-made [`AppState`] for unit tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::{Config, EnvironmentType};
use crate::forecast::mock::MockForecast;
use crate::identity::{IdentityProvider, IdentityToken, UserProfile};
use crate::logging::document::DocumentLogger;
use crate::logging::repository::LogStore;
use crate::logging::{LogLevel, NullSink};
use crate::storage::memory::MemoryBlobBackend;
use crate::AppState;

/// Identity provider answering from fixed data.
///
/// `exchange_code` accepts `"good"`, returns an empty access token for
/// `"empty"`, a token that never expires for `"forever"`, and fails for
/// anything else.
pub struct StubIdentity {
    calls: AtomicUsize,
    profile: bool,
}

impl StubIdentity {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            profile: true,
        }
    }

    /// A provider whose profile endpoint always fails.
    pub fn without_profile() -> Self {
        Self {
            profile: false,
            ..Self::new()
        }
    }

    /// Outbound calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl IdentityProvider for StubIdentity {
    fn authorize_url(&self, callback_url: &str) -> String {
        format!(
            "https://id.test/authorize?client_id=stub&redirect_uri={}&response_type=code",
            callback_url
        )
    }

    fn logout_url(&self) -> String {
        "https://id.test/v2/logout?client_id=stub&returnTo=".to_string()
    }

    fn exchange_code(
        &self,
        code: &str,
        _callback_url: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<IdentityToken>> + Send + '_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let code = code.to_string();
        Box::pin(async move {
            match code.as_str() {
                "good" => Ok(IdentityToken {
                    access: "access-good".to_string(),
                    refresh: Some("refresh-good".to_string()),
                    expires_in: 3600,
                }),
                "empty" => Ok(IdentityToken::default()),
                "forever" => Ok(IdentityToken {
                    access: "access-forever".to_string(),
                    refresh: None,
                    expires_in: i64::MAX,
                }),
                _ => Err(anyhow::anyhow!("invalid_grant")),
            }
        })
    }

    fn user_info(
        &self,
        _access_token: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<UserProfile>> + Send + '_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let profile = self.profile;
        Box::pin(async move {
            if !profile {
                return Err(anyhow::anyhow!("userinfo unavailable"));
            }
            Ok(UserProfile {
                sub: "stub|1".to_string(),
                name: Some("Stub User".to_string()),
                email: Some("user@example.com".to_string()),
            })
        })
    }
}

fn test_config() -> Config {
    let mut config = Config {
        environment: EnvironmentType::Testing,
        ..Default::default()
    };
    config.identity.callback_url = "http://localhost:7071/api/token".to_string();
    config.storage.connection_string = "memory".to_string();
    config
}

/// State with stub identity, mock forecast, an in-memory file store holding
/// the default container, and no log sink.
pub fn test_state() -> AppState {
    let config = test_config();
    let blobs = MemoryBlobBackend::with_containers(&[config.storage.default_container.as_str()]);
    AppState {
        config,
        identity: Arc::new(StubIdentity::new()),
        forecast: Arc::new(MockForecast),
        blobs: Some(Arc::new(blobs)),
        log_sink: Arc::new(NullSink),
    }
}

/// [`test_state`] with a document logger writing to `store`.
pub fn test_state_with_store(store: Arc<dyn LogStore>) -> AppState {
    let mut state = test_state();
    state.log_sink = Arc::new(DocumentLogger::new(
        store,
        LogLevel::Trace,
        &state.config.logging.source,
        state.config.logging.max_records,
    ));
    state
}
