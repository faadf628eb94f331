//! Worker-offload destination.
//!
//! Buffering and delivery run in a separate task (the offloaded context)
//! that is only reachable through JSON messages, mirroring a browser
//! worker: the host side posts `init`, `log` and `dispose` messages and the
//! worker posts back delivery reports. Nothing but plain JSON crosses the
//! channel in either direction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::adapter::Adapter;
use crate::buffer::{BatchBuffer, BatchSettings};
use crate::fallback::Fallback;
use crate::level::{accepts, LogLevel};
use crate::record::{LogRecord, LogSource, SerializedError};
use crate::sink::{BoxError, LogSink};

const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_IDLE_SECS: u64 = 5;

/// Host → worker message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerMessage {
    Init {
        #[serde(rename = "batchSize")]
        batch_size: usize,
        /// Seconds.
        #[serde(rename = "idleTime")]
        idle_time: u64,
    },
    Log {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<LogData>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<Value>,
    },
    Dispose,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogData {
    One(Box<LogRecord>),
    Many(Vec<LogRecord>),
}

/// Worker → host message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerEvent {
    Delivered { count: usize },
    Failed { context: String, error: SerializedError },
}

fn post_json<T: Serialize>(channel: &UnboundedSender<Value>, message: &T) -> bool {
    match serde_json::to_value(message) {
        Ok(value) => channel.send(value).is_ok(),
        Err(_) => false,
    }
}

/// Delivery wrapper that reports successful batches back to the host.
struct ReportingSink {
    delivery: Arc<dyn LogSink>,
    events: UnboundedSender<Value>,
}

#[async_trait]
impl LogSink for ReportingSink {
    async fn send_batch(&self, batch: &[LogRecord]) -> Result<(), BoxError> {
        self.delivery.send_batch(batch).await?;
        post_json(&self.events, &WorkerEvent::Delivered { count: batch.len() });
        Ok(())
    }
}

/// Fallback of the worker's buffer: failures travel back as events.
struct EventFallback {
    events: UnboundedSender<Value>,
}

impl Fallback for EventFallback {
    fn report(&self, context: &str, error: &(dyn Error + 'static)) {
        post_json(
            &self.events,
            &WorkerEvent::Failed {
                context: context.to_string(),
                error: SerializedError::from_dyn(error),
            },
        );
    }
}

/// State of the offloaded context.
pub struct WorkerContext {
    settings: BatchSettings,
    buffer: Option<BatchBuffer>,
    delivery: Arc<dyn LogSink>,
    events: UnboundedSender<Value>,
}

impl WorkerContext {
    pub fn new(delivery: Arc<dyn LogSink>, events: UnboundedSender<Value>) -> Self {
        WorkerContext {
            settings: BatchSettings::from_secs(DEFAULT_BATCH_SIZE, DEFAULT_IDLE_SECS),
            buffer: None,
            delivery,
            events,
        }
    }

    /// Process messages until `dispose` or until the host goes away.
    pub async fn run(mut self, mut inbox: UnboundedReceiver<Value>) {
        while let Some(value) = inbox.recv().await {
            if !self.handle(value).await {
                return;
            }
        }
        if let Some(buffer) = &self.buffer {
            buffer.dispose().await;
        }
    }

    /// Returns `false` once the context is disposed.
    ///
    /// Only the `type` tag is required up front. Records inside a `log`
    /// message are decoded one by one so a malformed entry costs only
    /// itself.
    async fn handle(&mut self, value: Value) -> bool {
        let kind = value.get("type").and_then(Value::as_str).map(str::to_owned);
        match kind.as_deref() {
            Some("log") => self.handle_log(value),
            Some("init") => match serde_json::from_value::<WorkerMessage>(value) {
                Ok(WorkerMessage::Init { batch_size, idle_time }) => {
                    if let Some(previous) = self.buffer.take() {
                        previous.dispose().await;
                    }
                    self.settings = BatchSettings::from_secs(batch_size, idle_time);
                }
                Ok(_) => {}
                Err(err) => self.report("worker: ignored malformed init message", &err),
            },
            Some("dispose") => {
                if let Some(buffer) = &self.buffer {
                    buffer.dispose().await;
                }
                return false;
            }
            _ => self.add(vec![LogRecord::new(
                LogLevel::Error,
                LogSource::Client,
                "logger worker received a message without a valid type",
                None,
            )]),
        }
        true
    }

    fn handle_log(&mut self, mut value: Value) {
        let items = match value.get_mut("data").map(Value::take) {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => {
                let message = value.get("message").and_then(Value::as_str).map(str::to_owned);
                let record = match message {
                    Some(message) => {
                        let args = value.get_mut("args").map(Value::take).filter(|args| !args.is_null());
                        LogRecord::new(LogLevel::Log, LogSource::Client, message, args)
                    }
                    None => LogRecord::new(
                        LogLevel::Error,
                        LogSource::Client,
                        "logger worker received a log message without data",
                        None,
                    ),
                };
                self.add(vec![record]);
                return;
            }
            Some(item) => vec![item],
        };

        let mut records = Vec::with_capacity(items.len());
        for item in items {
            match LogRecord::from_value(item) {
                Ok(record) => records.push(record),
                Err(err) => self.report("worker: dropped malformed log record", &err),
            }
        }
        self.add(records);
    }

    fn report(&self, context: &str, error: &(dyn Error + 'static)) {
        EventFallback {
            events: self.events.clone(),
        }
        .report(context, error);
    }

    fn add(&mut self, records: Vec<LogRecord>) {
        let buffer = self.buffer.get_or_insert_with(|| {
            BatchBuffer::new(
                "worker",
                self.settings,
                Arc::new(ReportingSink {
                    delivery: Arc::clone(&self.delivery),
                    events: self.events.clone(),
                }),
                Arc::new(EventFallback {
                    events: self.events.clone(),
                }),
            )
        });
        buffer.add(records);
    }
}

struct Startup {
    inbox: UnboundedReceiver<Value>,
    delivery: Arc<dyn LogSink>,
}

/// Host side of the worker-offload destination.
///
/// Filters by level and posts accepted records to the worker context,
/// which is started by `initialize`. Delivery failures reported by the
/// worker go to the fallback. Without a delivery function (the client
/// could not be built) the adapter is inert.
pub struct WorkerAdapter {
    levels: Vec<LogLevel>,
    inbox: Option<UnboundedSender<Value>>,
    startup: Mutex<Option<Startup>>,
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    fallback: Arc<dyn Fallback>,
}

impl WorkerAdapter {
    pub fn new(
        levels: Vec<LogLevel>,
        settings: BatchSettings,
        delivery: Option<Arc<dyn LogSink>>,
        fallback: Arc<dyn Fallback>,
    ) -> Self {
        let (inbox, startup) = match delivery {
            Some(delivery) => {
                let (tx, rx) = mpsc::unbounded_channel();
                post_json(
                    &tx,
                    &WorkerMessage::Init {
                        batch_size: settings.batch_size,
                        idle_time: settings.idle.as_secs().max(1),
                    },
                );
                (Some(tx), Some(Startup { inbox: rx, delivery }))
            }
            None => (None, None),
        };

        WorkerAdapter {
            levels,
            inbox,
            startup: Mutex::new(startup),
            tasks: tokio::sync::Mutex::new(Vec::new()),
            fallback,
        }
    }

    /// Post a raw message to the worker context.
    pub fn post(&self, message: &WorkerMessage) -> Result<(), BoxError> {
        match &self.inbox {
            Some(inbox) if post_json(inbox, message) => Ok(()),
            Some(_) => Err("logger worker is no longer running".into()),
            None => Ok(()),
        }
    }
}

async fn relay_events(mut events: UnboundedReceiver<Value>, fallback: Arc<dyn Fallback>) {
    while let Some(value) = events.recv().await {
        match serde_json::from_value::<WorkerEvent>(value) {
            Ok(WorkerEvent::Delivered { count }) => {
                tracing::debug!(count, "logger worker delivered batch");
            }
            Ok(WorkerEvent::Failed { context, error }) => fallback.report(&context, &error),
            Err(err) => fallback.report("worker: unreadable event from logger worker", &err),
        }
    }
}

#[async_trait]
impl Adapter for WorkerAdapter {
    fn name(&self) -> &str {
        "worker"
    }

    async fn initialize(&self) -> Result<(), BoxError> {
        let startup = self
            .startup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(Startup { inbox, delivery }) = startup else {
            return Ok(());
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let context = WorkerContext::new(delivery, events_tx);

        let mut tasks = self.tasks.lock().await;
        tasks.push(tokio::spawn(context.run(inbox)));
        tasks.push(tokio::spawn(relay_events(events_rx, Arc::clone(&self.fallback))));
        Ok(())
    }

    async fn submit(&self, records: Vec<LogRecord>) -> Result<(), BoxError> {
        let accepted: Vec<LogRecord> = records
            .into_iter()
            .filter(|r| accepts(r.level(), &self.levels))
            .collect();
        if accepted.is_empty() {
            return Ok(());
        }
        self.post(&WorkerMessage::Log {
            data: Some(LogData::Many(accepted)),
            message: None,
            args: None,
        })
    }

    /// Ask the worker to flush and stop, then wait for it and for the last
    /// delivery reports.
    async fn dispose(&self) {
        if self.post(&WorkerMessage::Dispose).is_err() {
            return;
        }
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }
    }
}
