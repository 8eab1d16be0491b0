//! Randomized forecast for environments without a weather upstream.

use std::future::Future;
use std::pin::Pin;

use chrono::{Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

use super::{ForecastRecord, ForecastService};

pub const SUMMARIES: [&str; 10] = [
    "Freezing",
    "Bracing",
    "Chilly",
    "Cool",
    "Mild",
    "Warm",
    "Balmy",
    "Hot",
    "Sweltering",
    "Scorching",
];

/// Days generated, starting tomorrow.
pub const FORECAST_DAYS: i64 = 5;

/// Celsius bounds, half-open.
pub const MIN_TEMP_C: i32 = -20;
pub const MAX_TEMP_C: i32 = 55;

pub struct MockForecast;

impl MockForecast {
    pub fn generate() -> Vec<ForecastRecord> {
        let mut rng = rand::thread_rng();
        let today = Utc::now().date_naive();
        (1..=FORECAST_DAYS)
            .map(|offset| {
                let summary = SUMMARIES.choose(&mut rng).copied().unwrap_or("Mild");
                ForecastRecord::new(
                    today + Duration::days(offset),
                    rng.gen_range(MIN_TEMP_C..MAX_TEMP_C),
                    summary,
                )
            })
            .collect()
    }
}

impl ForecastService for MockForecast {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn fetch(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<ForecastRecord>>> + Send + '_>> {
        Box::pin(async { Ok(Self::generate()) })
    }
}
