//! Log sink that appends records to a [`LogStore`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};

use super::repository::LogStore;
use super::{LogArgs, LogLevel, LogRecord, LogSink, SinkKind};
use crate::errors::ApiError;

pub struct DocumentLogger {
    store: Arc<dyn LogStore>,
    min_level: LogLevel,
    source: String,
    max_records: usize,
}

impl DocumentLogger {
    pub fn new(
        store: Arc<dyn LogStore>,
        min_level: LogLevel,
        source: &str,
        max_records: usize,
    ) -> Self {
        Self {
            store,
            min_level,
            source: source.to_string(),
            max_records,
        }
    }

    /// Delete records older than `days` days.  A store failure is logged
    /// and reported as zero deletions.
    pub async fn purge_older_than(&self, days: i64) -> Result<u64, ApiError> {
        if days < 0 {
            return Err(ApiError::invalid_argument(format!(
                "retention must be zero or more days, got {days}"
            )));
        }
        // A cutoff before the earliest representable instant matches nothing.
        let Some(cutoff) =
            TimeDelta::try_days(days).and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            debug!("Retention of {} days reaches past every record", days);
            return Ok(0);
        };
        match self.store.delete_before(cutoff).await {
            Ok(n) => Ok(n),
            Err(e) => {
                warn!("Log purge failed: {:#}", e);
                Ok(0)
            }
        }
    }

    /// The newest `n` records, capped at the configured maximum.
    pub async fn list_top(&self, n: usize) -> anyhow::Result<Vec<LogRecord>> {
        self.store.latest(n.min(self.max_records)).await
    }

    /// Records in `[begin, end)`, newest first.  Empty when the range is
    /// inverted.
    pub async fn list_by_range(
        &self,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<LogRecord>> {
        if begin > end {
            return Ok(Vec::new());
        }
        self.store.between(begin, end).await
    }
}

impl LogSink for DocumentLogger {
    fn kind(&self) -> SinkKind {
        SinkKind::DocumentStore
    }

    fn insert(
        &self,
        level: LogLevel,
        category: &str,
        message: &str,
        args: LogArgs,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        if level < self.min_level {
            debug!("Dropping {} record below minimum {}", level, self.min_level);
            return Box::pin(async { false });
        }
        let record = LogRecord::new(self.source.as_str(), level, category, message, args);
        Box::pin(async move {
            match self.store.append(record).await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Log write failed: {:#}", e);
                    false
                }
            }
        })
    }
}
