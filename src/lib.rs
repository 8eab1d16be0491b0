//! Portico library: an HTTP gateway in front of identity, file storage,
//! weather forecast and log persistence services.
//!
//! Each external service sits behind a narrow adapter trait.  The
//! [`gateway::Gateway`] facade applies request policy on top of those
//! adapters, and [`server::app`] exposes it over HTTP with every JSON
//! response wrapped in an [`envelope::Envelope`].

use std::sync::Arc;

pub mod azure;
pub mod base64url;
pub mod config;
pub mod convert;
pub mod envelope;
pub mod errors;
pub mod forecast;
pub mod gateway;
pub mod handlers;
pub mod identity;
pub mod logging;
pub mod metrics;
pub mod oauth;
pub mod random;
pub mod server;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

use crate::config::Config;
use crate::forecast::ForecastService;
use crate::identity::IdentityProvider;
use crate::logging::LogSink;
use crate::storage::backend::BlobBackend;

/// Shared application state passed to all handlers via `axum::extract::State`.
///
/// Built once at startup and read-only afterwards.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Identity provider used by the OAuth routes.
    pub identity: Arc<dyn IdentityProvider>,
    /// Forecast adapter chosen by `forecast.provider`.
    pub forecast: Arc<dyn ForecastService>,
    /// File store; `None` when no connection string is configured.
    pub blobs: Option<Arc<dyn BlobBackend>>,
    /// Destination for records written through `v1/log`.
    pub log_sink: Arc<dyn LogSink>,
}
