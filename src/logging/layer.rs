//! Forwards the service's own `tracing` events to the configured
//! [`LogSink`].
//!
//! [`SinkLayer`] runs inside the subscriber and must not block, so it only
//! queues events.  [`SinkForwarder`] drains the queue into the sink chosen
//! at startup.  Filter the layer with [`sink_targets`]: it admits crate
//! events at or above the sink's minimum level and excludes the sinks' own
//! diagnostics, which would otherwise feed back into themselves.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::{Context, Layer};

use super::{LogArgs, LogLevel, LogSink};

/// Events held while the sink catches up; further events are dropped.
const QUEUE_DEPTH: usize = 1024;

/// One `tracing` event reduced to sink fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkEvent {
    pub level: LogLevel,
    /// The event target, normally the emitting module path.
    pub category: String,
    pub message: String,
    pub args: LogArgs,
}

pub struct SinkLayer {
    tx: mpsc::Sender<SinkEvent>,
}

pub struct SinkForwarder {
    rx: mpsc::Receiver<SinkEvent>,
}

/// A connected layer and forwarder pair.
pub fn sink_layer() -> (SinkLayer, SinkForwarder) {
    let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
    (SinkLayer { tx }, SinkForwarder { rx })
}

impl From<Level> for LogLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::TRACE => LogLevel::Trace,
            Level::DEBUG => LogLevel::Debug,
            Level::INFO => LogLevel::Information,
            Level::WARN => LogLevel::Warning,
            _ => LogLevel::Error,
        }
    }
}

/// The most verbose `tracing` level a sink with this minimum accepts.
pub fn level_filter(min_level: LogLevel) -> LevelFilter {
    match min_level {
        LogLevel::Trace => LevelFilter::TRACE,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Information => LevelFilter::INFO,
        LogLevel::Warning => LevelFilter::WARN,
        LogLevel::Error | LogLevel::Critical => LevelFilter::ERROR,
        LogLevel::None => LevelFilter::OFF,
    }
}

/// Crate events at or above `min_level`, minus everything under
/// `portico::logging`.
pub fn sink_targets(min_level: LogLevel) -> Targets {
    Targets::new()
        .with_target(env!("CARGO_PKG_NAME"), level_filter(min_level))
        .with_target(concat!(env!("CARGO_PKG_NAME"), "::logging"), LevelFilter::OFF)
}

#[derive(Default)]
struct EventVisitor {
    message: String,
    args: LogArgs,
}

impl Visit for EventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.args.push(field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.args.push(field.name(), format!("{:?}", value));
        }
    }
}

impl<S: Subscriber> Layer<S> for SinkLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let forwarded = SinkEvent {
            level: LogLevel::from(*meta.level()),
            category: meta.target().to_string(),
            message: visitor.message,
            args: visitor.args,
        };
        // Full queue or no forwarder: drop the event.
        let _ = self.tx.try_send(forwarded);
    }
}

impl SinkForwarder {
    /// Write queued events to `sink` until every [`SinkLayer`] is gone.
    pub async fn run(mut self, sink: Arc<dyn LogSink>) {
        while let Some(event) = self.rx.recv().await {
            sink.insert(event.level, &event.category, &event.message, event.args)
                .await;
        }
    }
}
