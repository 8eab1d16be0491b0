//! Weather forecast adapters.
//!
//! [`ForecastService::fetch`] is the fallible call each adapter implements;
//! [`ForecastService::get_forecast`] applies the degrade-to-empty policy so
//! the gateway never sees an upstream failure.

pub mod mock;
pub mod nws;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::config::{ForecastConfig, ForecastProvider};
use crate::errors::degrade_to_empty;

/// One day of forecast.  Fahrenheit is derived on every read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastRecord {
    pub date: NaiveDate,
    pub temperature_c: i32,
    pub summary: String,
}

impl ForecastRecord {
    pub fn new(date: NaiveDate, temperature_c: i32, summary: impl Into<String>) -> Self {
        Self {
            date,
            temperature_c,
            summary: summary.into(),
        }
    }

    /// `32 + C / 0.5556`, truncated toward zero.
    pub fn temperature_f(&self) -> i32 {
        32 + (self.temperature_c as f64 / 0.5556) as i32
    }
}

impl Serialize for ForecastRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ForecastRecord", 4)?;
        s.serialize_field("date", &self.date)?;
        s.serialize_field("c", &self.temperature_c)?;
        s.serialize_field("f", &self.temperature_f())?;
        s.serialize_field("summary", &self.summary)?;
        s.end()
    }
}

pub trait ForecastService: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn fetch(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<ForecastRecord>>> + Send + '_>>;

    /// Forecast records, or an empty list when the upstream call fails.
    fn get_forecast(&self) -> Pin<Box<dyn Future<Output = Vec<ForecastRecord>> + Send + '_>> {
        Box::pin(async move { degrade_to_empty("forecast fetch", self.fetch().await) })
    }
}

/// Build the configured forecast adapter.
pub fn build_service(config: &ForecastConfig) -> anyhow::Result<Arc<dyn ForecastService>> {
    let service: Arc<dyn ForecastService> = match config.provider {
        ForecastProvider::Mock => Arc::new(mock::MockForecast),
        ForecastProvider::Nws => Arc::new(nws::NwsForecast::new(config)?),
    };
    tracing::info!("Forecast provider: {}", service.name());
    Ok(service)
}
