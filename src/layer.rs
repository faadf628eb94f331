use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::level::LogLevel;
use crate::service::LoggerService;

/// Crates whose events are never fed back in: this crate's own diagnostics
/// and the HTTP stack the remote destination sends through.
const SKIPPED_CRATES: &[&str] = &["fanout_log_sink", "reqwest", "hyper", "hyper_util", "h2", "rustls", "tokio_rustls"];

fn is_skipped(target: &str) -> bool {
    let krate = target.split("::").next().unwrap_or(target);
    SKIPPED_CRATES.contains(&krate)
}

/// `tracing_subscriber` layer that turns events into log records and hands
/// them to a [`LoggerService`].
///
/// The event's `message` field becomes the record message and every other
/// field is collected into `args`. Handing off never blocks: the service's
/// per-severity path only enqueues.
pub struct PipelineLayer {
    service: LoggerService,
    /// Total events seen by the layer.
    pub total_events: Arc<AtomicU64>,
    /// Events forwarded to the service.
    pub forwarded_events: Arc<AtomicU64>,
}

impl PipelineLayer {
    pub fn new(service: LoggerService) -> Self {
        PipelineLayer {
            service,
            total_events: Arc::new(AtomicU64::new(0)),
            forwarded_events: Arc::new(AtomicU64::new(0)),
        }
    }
}

fn level_of(level: &Level) -> LogLevel {
    match *level {
        Level::TRACE => LogLevel::Trace,
        Level::DEBUG => LogLevel::Debug,
        Level::INFO => LogLevel::Info,
        Level::WARN => LogLevel::Warn,
        _ => LogLevel::Error,
    }
}

impl<S> Layer<S> for PipelineLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);

        let meta = event.metadata();
        if is_skipped(meta.target()) {
            return;
        }

        let mut fields = Map::new();
        let mut message: Option<String> = None;
        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: &mut message,
        };
        event.record(&mut visitor);

        let args = if fields.is_empty() { None } else { Some(Value::Object(fields)) };
        let message = message.unwrap_or_else(|| meta.target().to_string());

        self.service.log_at(level_of(meta.level()), message, args);
        self.forwarded_events.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut Map<String, Value>,
    pub message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        // `message` arrives here when it is a format string.
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), Value::String(format!("{:?}", value)));
        }
    }
}
