//! National Weather Service gridpoint forecast.
//!
//! One `GET {base}/gridpoints/{station}/{x,y}/forecast?units=si` per call.
//! The API rejects requests without a `User-Agent`.

use std::future::Future;
use std::pin::Pin;

use chrono::DateTime;
use serde::Deserialize;
use tracing::debug;

use super::{ForecastRecord, ForecastService};
use crate::config::ForecastConfig;

#[derive(Debug, Deserialize)]
struct GridForecast {
    properties: GridProperties,
}

#[derive(Debug, Deserialize)]
struct GridProperties {
    #[serde(default)]
    periods: Vec<Period>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Period {
    temperature: i32,
    start_time: String,
    #[serde(default)]
    detailed_forecast: String,
}

pub struct NwsForecast {
    client: reqwest::Client,
    url: String,
}

impl NwsForecast {
    pub fn new(config: &ForecastConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        let url = format!(
            "{}/gridpoints/{}/{}/forecast?units=si",
            config.base_url.trim_end_matches('/'),
            config.station,
            config.grid
        );
        Ok(Self { client, url })
    }

    fn to_records(forecast: GridForecast) -> anyhow::Result<Vec<ForecastRecord>> {
        forecast
            .properties
            .periods
            .into_iter()
            .map(|p| {
                let start = DateTime::parse_from_rfc3339(&p.start_time).map_err(|e| {
                    anyhow::anyhow!("Bad period start time '{}': {}", p.start_time, e)
                })?;
                Ok(ForecastRecord::new(
                    start.date_naive(),
                    p.temperature,
                    p.detailed_forecast,
                ))
            })
            .collect()
    }
}

impl ForecastService for NwsForecast {
    fn name(&self) -> &'static str {
        "nws"
    }

    fn fetch(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<ForecastRecord>>> + Send + '_>> {
        Box::pin(async move {
            debug!("GET {}", self.url);
            let forecast: GridForecast = self
                .client
                .get(&self.url)
                .header("Accept", "application/geo+json")
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            Self::to_records(forecast)
        })
    }
}
