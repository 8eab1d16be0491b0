//! Log sink that inserts entities into an Azure storage table.
//!
//! Uses the Table service REST API (Insert Entity) with JSON payloads.
//! Requests are authorized with Shared Key Lite, or by the SAS token from
//! the connection string.

use std::future::Future;
use std::pin::Pin;

use chrono::SecondsFormat;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{LogArgs, LogLevel, LogRecord, LogSink, SinkKind};
use crate::azure::{endpoint_path, rfc1123_date, StorageAccount, TABLE_API_VERSION};

/// Target table name.
pub const LOG_TABLE: &str = "Logs";

/// All log entities share one partition.
const PARTITION_KEY: &str = "1";

pub struct TableLogger {
    client: reqwest::Client,
    account: StorageAccount,
    min_level: LogLevel,
    source: String,
}

impl TableLogger {
    pub fn from_connection_string(
        conn_str: &str,
        min_level: LogLevel,
        source: &str,
    ) -> anyhow::Result<Self> {
        let account = StorageAccount::parse(conn_str)?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        info!(
            "Azure table log sink initialized: account={} endpoint={}",
            account.account, account.table_endpoint
        );

        Ok(Self {
            client,
            account,
            min_level,
            source: source.to_string(),
        })
    }

    /// JSON body of an Insert Entity request.
    fn entity(record: &LogRecord) -> serde_json::Value {
        json!({
            "PartitionKey": PARTITION_KEY,
            "RowKey": record.id.to_string(),
            "Timestamp": record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            "Timestamp@odata.type": "Edm.DateTime",
            "Source": record.source,
            "Level": record.level.to_string(),
            "Category": record.category,
            "Message": record.message,
            "Args": record.args.to_pairs().join(";"),
        })
    }

    async fn insert_record(&self, record: &LogRecord) -> anyhow::Result<()> {
        let url = self
            .account
            .maybe_append_sas(&format!("{}/{}", self.account.table_endpoint, LOG_TABLE));
        let date = rfc1123_date();

        let mut builder = self
            .client
            .post(&url)
            .header("x-ms-date", &date)
            .header("x-ms-version", TABLE_API_VERSION)
            .header("DataServiceVersion", "3.0;NetFx")
            .header("Accept", "application/json;odata=nometadata")
            .header("Prefer", "return-no-content")
            .json(&Self::entity(record));

        if self.account.signs_requests() {
            let resource = format!("{}/{}", endpoint_path(&self.account.table_endpoint), LOG_TABLE);
            builder = builder.header("Authorization", self.account.shared_key_lite(&date, &resource)?);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Insert entity failed ({}): {}",
                status.as_u16(),
                body
            ));
        }
        debug!("Inserted log entity {}", record.id);
        Ok(())
    }
}

impl LogSink for TableLogger {
    fn kind(&self) -> SinkKind {
        SinkKind::TableStore
    }

    fn insert(
        &self,
        level: LogLevel,
        category: &str,
        message: &str,
        args: LogArgs,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        if level < self.min_level {
            return Box::pin(async { false });
        }
        let record = LogRecord::new(self.source.as_str(), level, category, message, args);
        Box::pin(async move {
            match self.insert_record(&record).await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Log write failed: {:#}", e);
                    false
                }
            }
        })
    }
}
