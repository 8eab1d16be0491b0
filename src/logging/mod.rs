//! Persistent log sinks.
//!
//! Distinct from process diagnostics (`tracing`): a [`LogSink`] is where
//! records written through the `v1/log` route end up.  The sink kind is
//! chosen once at startup from the configured connection string by
//! [`SinkKind::select`] and the constructed sink is carried in
//! [`crate::AppState`].
//!
//! - [`NullSink`] discards everything.
//! - [`table::TableLogger`] inserts entities into an Azure table.
//! - [`document::DocumentLogger`] appends to a [`repository::LogStore`],
//!   normally MongoDB.
//!
//! [`layer::SinkLayer`] also routes the service's own `tracing` events into
//! the selected sink.

pub mod document;
pub mod layer;
pub mod mongo;
pub mod repository;
pub mod table;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::LoggingConfig;

/// Severity of a log record, lowest first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(from = "String")]
pub enum LogLevel {
    #[default]
    Trace,
    Debug,
    Information,
    Warning,
    Error,
    Critical,
    /// Above every real level: a minimum of `None` disables the sink.
    None,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "information" | "info" => Ok(LogLevel::Information),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            "critical" | "fatal" => Ok(LogLevel::Critical),
            "none" => Ok(LogLevel::None),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

/// Unknown names read as `Information`.
impl From<String> for LogLevel {
    fn from(value: String) -> Self {
        value.parse().unwrap_or(LogLevel::Information)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Trace => "Trace",
            LogLevel::Debug => "Debug",
            LogLevel::Information => "Information",
            LogLevel::Warning => "Warning",
            LogLevel::Error => "Error",
            LogLevel::Critical => "Critical",
            LogLevel::None => "None",
        };
        f.write_str(name)
    }
}

/// Ordered `key=value` arguments attached to a record.
///
/// Deserializes from either a JSON object (key order preserved, non-string
/// values rendered as JSON, `null` as empty) or a list of `"key=value"`
/// strings.  Serializes as the list form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogArgs(Vec<(String, String)>);

impl LogArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `key=value` strings in order.
    pub fn to_pairs(&self) -> Vec<String> {
        self.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }

    /// Parse one `key=value` string; a missing `=` yields an empty value.
    pub fn parse_pair(pair: &str) -> (String, String) {
        match pair.split_once('=') {
            Some((k, v)) => (k.trim().to_string(), v.to_string()),
            None => (pair.trim().to_string(), String::new()),
        }
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            pairs
                .into_iter()
                .map(|p| Self::parse_pair(p.as_ref()))
                .collect(),
        )
    }
}

impl FromIterator<(String, String)> for LogArgs {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for LogArgs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.to_pairs())
    }
}

impl<'de> Deserialize<'de> for LogArgs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ArgsVisitor;

        impl<'de> Visitor<'de> for ArgsVisitor {
            type Value = LogArgs;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of arguments or a list of \"key=value\" strings")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<LogArgs, A::Error> {
                let mut args = LogArgs::new();
                while let Some((key, value)) = map.next_entry::<String, serde_json::Value>()? {
                    let value = match value {
                        serde_json::Value::Null => String::new(),
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    args.push(key, value);
                }
                Ok(args)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<LogArgs, A::Error> {
                let mut args = LogArgs::new();
                while let Some(pair) = seq.next_element::<String>()? {
                    let (k, v) = LogArgs::parse_pair(&pair);
                    args.push(k, v);
                }
                Ok(args)
            }

            fn visit_unit<E: de::Error>(self) -> Result<LogArgs, E> {
                Ok(LogArgs::new())
            }

            fn visit_none<E: de::Error>(self) -> Result<LogArgs, E> {
                Ok(LogArgs::new())
            }
        }

        deserializer.deserialize_any(ArgsVisitor)
    }
}

/// A single persisted log record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub level: LogLevel,
    pub category: String,
    pub message: String,
    pub args: LogArgs,
}

impl LogRecord {
    /// A new record stamped with a fresh id and the current time.
    pub fn new(
        source: impl Into<String>,
        level: LogLevel,
        category: impl Into<String>,
        message: impl Into<String>,
        args: LogArgs,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            level,
            category: category.into(),
            message: message.into(),
            args,
        }
    }
}

/// Which sink implementation the connection string selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    NoOp,
    TableStore,
    DocumentStore,
}

impl SinkKind {
    /// `mongodb...` selects the document store, any other non-blank string
    /// the table store, and a blank string no sink at all.
    pub fn select(connection_string: &str) -> Self {
        let normalized = connection_string.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            SinkKind::NoOp
        } else if normalized.starts_with("mongodb") {
            SinkKind::DocumentStore
        } else {
            SinkKind::TableStore
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkKind::NoOp => f.write_str("none"),
            SinkKind::TableStore => f.write_str("table"),
            SinkKind::DocumentStore => f.write_str("document"),
        }
    }
}

/// Destination for records written through the API.
pub trait LogSink: Send + Sync + 'static {
    fn kind(&self) -> SinkKind;

    /// Write one record.  Returns `false` when the record was filtered out
    /// by the minimum level or the write failed; never errors.
    fn insert(
        &self,
        level: LogLevel,
        category: &str,
        message: &str,
        args: LogArgs,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;
}

/// Sink used when no connection string is configured.
pub struct NullSink;

impl LogSink for NullSink {
    fn kind(&self) -> SinkKind {
        SinkKind::NoOp
    }

    fn insert(
        &self,
        _level: LogLevel,
        _category: &str,
        _message: &str,
        _args: LogArgs,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async { false })
    }
}

/// Construct the sink selected by `config.connection_string`.
///
/// For the document store, a configured `retention_days` triggers one
/// background purge of older records.
pub async fn build_sink(config: &LoggingConfig) -> anyhow::Result<Arc<dyn LogSink>> {
    let kind = SinkKind::select(&config.connection_string);
    info!("Log sink selected: {}", kind);

    let sink: Arc<dyn LogSink> = match kind {
        SinkKind::NoOp => Arc::new(NullSink),
        SinkKind::TableStore => Arc::new(table::TableLogger::from_connection_string(
            &config.connection_string,
            config.min_level,
            &config.source,
        )?),
        SinkKind::DocumentStore => {
            let store = mongo::MongoLogStore::connect(
                config.connection_string.trim(),
                &config.database,
            )
            .await?;
            let logger = Arc::new(document::DocumentLogger::new(
                Arc::new(store),
                config.min_level,
                &config.source,
                config.max_records,
            ));

            if let Some(days) = config.retention_days {
                let purger = logger.clone();
                tokio::spawn(async move {
                    match purger.purge_older_than(days).await {
                        Ok(n) => info!("Purged {} log records older than {} days", n, days),
                        Err(e) => warn!("Log purge skipped: {}", e),
                    }
                });
            }
            logger
        }
    };

    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_sink_kind() {
        assert_eq!(SinkKind::select("mongodb://localhost:27017/logs"), SinkKind::DocumentStore);
        assert_eq!(SinkKind::select("MongoDB+srv://cluster/logs"), SinkKind::DocumentStore);
        assert_eq!(SinkKind::select("  mongodb://x "), SinkKind::DocumentStore);
        assert_eq!(
            SinkKind::select("DefaultEndpointsProtocol=https;AccountName=a;AccountKey=b"),
            SinkKind::TableStore
        );
        assert_eq!(SinkKind::select("anything"), SinkKind::TableStore);
        assert_eq!(SinkKind::select(""), SinkKind::NoOp);
        assert_eq!(SinkKind::select("   "), SinkKind::NoOp);
    }

    #[test]
    fn test_level_order_and_parse() {
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Information);
        assert!(LogLevel::Information < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Critical);
        assert!(LogLevel::Critical < LogLevel::None);

        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("info".parse::<LogLevel>().unwrap(), LogLevel::Information);
        assert_eq!("fatal".parse::<LogLevel>().unwrap(), LogLevel::Critical);
        assert_eq!(LogLevel::from("loud".to_string()), LogLevel::Information);
        assert_eq!(LogLevel::Warning.to_string(), "Warning");
    }

    #[test]
    fn test_level_serde() {
        let level: LogLevel = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(level, LogLevel::Error);
        assert_eq!(serde_json::to_string(&LogLevel::Warning).unwrap(), "\"Warning\"");
    }

    #[test]
    fn test_args_from_object_keeps_order() {
        let args: LogArgs =
            serde_json::from_str(r#"{"zeta":"1","alpha":2,"flag":true,"gone":null}"#).unwrap();
        let pairs: Vec<(&str, &str)> = args.iter().collect();
        assert_eq!(
            pairs,
            vec![("zeta", "1"), ("alpha", "2"), ("flag", "true"), ("gone", "")]
        );
    }

    #[test]
    fn test_args_from_list() {
        let args: LogArgs = serde_json::from_str(r#"["a=1","b=x=y","bare"]"#).unwrap();
        assert_eq!(args.to_pairs(), vec!["a=1", "b=x=y", "bare="]);
        assert_eq!(serde_json::to_value(&args).unwrap(), serde_json::json!(["a=1", "b=x=y", "bare="]));
    }

    #[test]
    fn test_args_rejects_scalars() {
        assert!(serde_json::from_str::<LogArgs>("42").is_err());
        assert!(serde_json::from_str::<LogArgs>("null").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_null_sink() {
        let sink = NullSink;
        assert_eq!(sink.kind(), SinkKind::NoOp);
        assert!(!sink.insert(LogLevel::Error, "c", "m", LogArgs::new()).await);
    }

    #[tokio::test]
    async fn test_build_sink_noop() {
        let sink = build_sink(&LoggingConfig::default()).await.unwrap();
        assert_eq!(sink.kind(), SinkKind::NoOp);
    }

    #[tokio::test]
    async fn test_build_sink_table() {
        let config = LoggingConfig {
            connection_string: "UseDevelopmentStorage=true".to_string(),
            ..Default::default()
        };
        let sink = build_sink(&config).await.unwrap();
        assert_eq!(sink.kind(), SinkKind::TableStore);
    }
}
