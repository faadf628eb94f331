use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::{oneshot, watch};

use crate::adapter::Adapter;
use crate::config::PipelineConfig;
use crate::console::ConsoleAdapter;
use crate::dispatch::{BuildFn, Command, Dispatcher};
use crate::fallback::Fallback;
use crate::info::InfoProvider;
use crate::level::LogLevel;
use crate::record::{LogRecord, LogSource};
use crate::registry::build_adapters;

/// Lifecycle of a [`LoggerService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Uninitialized,
    Initializing,
    /// Adapters are built; stays here until `dispose`.
    Ready,
    /// The registry could not be built. Every call is a silent no-op.
    Failed,
    Disposed,
}

/// Orchestrator in front of the adapter registry.
///
/// Per-severity calls build a [`LogRecord`] and hand it to every adapter
/// without waiting for anything. The registry is built lazily by the first
/// call (or by [`initialize`](Self::initialize)); failures of individual
/// adapters are isolated and reported to the fallback, never to the
/// caller. Cloning is cheap and every clone talks to the same registry.
#[derive(Clone)]
pub struct LoggerService {
    inner: Arc<Inner>,
}

struct Inner {
    source: LogSource,
    commands: UnboundedSender<Command>,
    state: watch::Receiver<ServiceState>,
    providers: Vec<Arc<dyn InfoProvider>>,
    fallback: Arc<dyn Fallback>,
}

/// Builder for [`LoggerService`].
pub struct LoggerServiceBuilder {
    source: LogSource,
    config: Option<PipelineConfig>,
    adapters: Vec<Arc<dyn Adapter>>,
    providers: Vec<Arc<dyn InfoProvider>>,
    fallback: Option<Arc<dyn Fallback>>,
}

impl Default for LoggerServiceBuilder {
    fn default() -> Self {
        LoggerServiceBuilder {
            source: LogSource::Server,
            config: None,
            adapters: Vec::new(),
            providers: Vec::new(),
            fallback: None,
        }
    }
}

impl LoggerServiceBuilder {
    pub fn source(mut self, source: LogSource) -> Self {
        self.source = source;
        self
    }

    /// Build the registry from this snapshot on first use. Also takes the
    /// snapshot's `source`.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.source = config.source;
        self.config = Some(config);
        self
    }

    /// Register an adapter after those built from the configuration.
    pub fn adapter(mut self, adapter: Arc<dyn Adapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn info_provider(mut self, provider: Arc<dyn InfoProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Where adapter failures are reported. Defaults to an error-only
    /// console.
    pub fn fallback(mut self, fallback: Arc<dyn Fallback>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Start the dispatcher. Must be called from within a tokio runtime.
    pub fn build(self) -> LoggerService {
        let fallback = self
            .fallback
            .unwrap_or_else(|| Arc::new(ConsoleAdapter::fallback()));

        let config = self.config;
        let extra = self.adapters;
        let build_fallback = Arc::clone(&fallback);
        let build: BuildFn = Box::new(move || {
            let mut adapters = match config {
                Some(config) => build_adapters(&config, build_fallback)?,
                None => Vec::new(),
            };
            adapters.extend(extra);
            Ok(adapters)
        });

        let (state_tx, state_rx) = watch::channel(ServiceState::Uninitialized);
        let (commands, inbox) = mpsc::unbounded_channel();
        tokio::spawn(Dispatcher::new(build, Arc::clone(&fallback), state_tx).run(inbox));

        LoggerService {
            inner: Arc::new(Inner {
                source: self.source,
                commands,
                state: state_rx,
                providers: self.providers,
                fallback,
            }),
        }
    }
}

impl LoggerService {
    pub fn builder() -> LoggerServiceBuilder {
        LoggerServiceBuilder::default()
    }

    /// Service whose registry is built from `config` with the default
    /// fallback.
    pub fn from_config(config: PipelineConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn state(&self) -> ServiceState {
        *self.inner.state.borrow()
    }

    fn accepting(&self) -> bool {
        !matches!(self.state(), ServiceState::Failed | ServiceState::Disposed)
    }

    fn send(&self, command: Command) -> bool {
        self.inner.commands.send(command).is_ok()
    }

    /// Build the registry now instead of on the first call and report the
    /// resulting state. Concurrent callers share one initialization.
    pub async fn initialize(&self) -> ServiceState {
        let (ack, done) = oneshot::channel();
        if !self.send(Command::Initialize(ack)) {
            return self.state();
        }
        done.await.unwrap_or_else(|_| self.state())
    }

    /// Create a record at `level` and fan it out. Never waits.
    pub fn log_at(&self, level: LogLevel, message: impl Into<String>, args: Option<Value>) {
        if !self.accepting() {
            return;
        }
        let mut record = LogRecord::new(level, self.inner.source, message, args);
        for provider in &self.inner.providers {
            provider.populate(&mut record);
        }
        self.send(Command::Dispatch(vec![record]));
    }

    pub fn trace(&self, message: impl Into<String>, args: Option<Value>) {
        self.log_at(LogLevel::Trace, message, args);
    }

    pub fn debug(&self, message: impl Into<String>, args: Option<Value>) {
        self.log_at(LogLevel::Debug, message, args);
    }

    pub fn log(&self, message: impl Into<String>, args: Option<Value>) {
        self.log_at(LogLevel::Log, message, args);
    }

    pub fn info(&self, message: impl Into<String>, args: Option<Value>) {
        self.log_at(LogLevel::Info, message, args);
    }

    pub fn warn(&self, message: impl Into<String>, args: Option<Value>) {
        self.log_at(LogLevel::Warn, message, args);
    }

    pub fn error(&self, message: impl Into<String>, args: Option<Value>) {
        self.log_at(LogLevel::Error, message, args);
    }

    /// Fan out records that were built elsewhere and wait until every
    /// adapter has taken them. Each adapter keeps only the records its
    /// allow-list accepts.
    pub async fn bulk(&self, records: Vec<LogRecord>) {
        if records.is_empty() || !self.accepting() {
            return;
        }
        if self.send(Command::Dispatch(records)) {
            self.settle().await;
        }
    }

    /// Decode records that arrived as JSON, then [`bulk`](Self::bulk) them.
    /// Malformed entries are dropped and reported to the fallback.
    pub async fn bulk_json(&self, values: Vec<Value>) {
        let mut records = Vec::with_capacity(values.len());
        for value in values {
            match LogRecord::from_value(value) {
                Ok(record) => records.push(record),
                Err(err) => self.inner.fallback.report("logger: dropped malformed log record", &err),
            }
        }
        self.bulk(records).await;
    }

    /// Resolve once every adapter has processed all calls issued before
    /// this one. Buffered adapters may still hold the records.
    pub async fn settle(&self) {
        let (ack, done) = oneshot::channel();
        if self.send(Command::Settle(ack)) {
            let _ = done.await;
        }
    }

    /// Dispose every adapter, forcing final flushes. Later calls are no-ops.
    pub async fn dispose(&self) {
        let (ack, done) = oneshot::channel();
        if self.send(Command::Dispose(ack)) {
            let _ = done.await;
        }
    }

    /// Handle that prefixes every message with `[name] `.
    pub fn scoped(&self, name: impl AsRef<str>) -> ScopedLogger {
        ScopedLogger {
            service: self.clone(),
            prefix: format!("[{}] ", name.as_ref()),
        }
    }
}

/// Per-module view of a [`LoggerService`].
#[derive(Clone)]
pub struct ScopedLogger {
    service: LoggerService,
    prefix: String,
}

impl ScopedLogger {
    pub fn log_at(&self, level: LogLevel, message: impl AsRef<str>, args: Option<Value>) {
        self.service
            .log_at(level, format!("{}{}", self.prefix, message.as_ref()), args);
    }

    pub fn trace(&self, message: impl AsRef<str>, args: Option<Value>) {
        self.log_at(LogLevel::Trace, message, args);
    }

    pub fn debug(&self, message: impl AsRef<str>, args: Option<Value>) {
        self.log_at(LogLevel::Debug, message, args);
    }

    pub fn log(&self, message: impl AsRef<str>, args: Option<Value>) {
        self.log_at(LogLevel::Log, message, args);
    }

    pub fn info(&self, message: impl AsRef<str>, args: Option<Value>) {
        self.log_at(LogLevel::Info, message, args);
    }

    pub fn warn(&self, message: impl AsRef<str>, args: Option<Value>) {
        self.log_at(LogLevel::Warn, message, args);
    }

    pub fn error(&self, message: impl AsRef<str>, args: Option<Value>) {
        self.log_at(LogLevel::Error, message, args);
    }

    pub fn service(&self) -> &LoggerService {
        &self.service
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::tests::CountingFallback;
    use crate::sink::BoxError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect {
        messages: Mutex<Vec<String>>,
        initialized: AtomicUsize,
    }

    #[async_trait]
    impl Adapter for Collect {
        fn name(&self) -> &str {
            "collect"
        }

        async fn initialize(&self) -> Result<(), BoxError> {
            self.initialized.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(())
        }

        async fn submit(&self, records: Vec<LogRecord>) -> Result<(), BoxError> {
            let mut messages = self.messages.lock().unwrap();
            messages.extend(records.into_iter().map(|r| r.message));
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_initialization() {
        let adapter = Arc::new(Collect::default());
        let service = LoggerService::builder().adapter(adapter.clone()).build();
        assert_eq!(service.state(), ServiceState::Uninitialized);

        service.info("first", None);
        let (a, b) = tokio::join!(service.initialize(), service.initialize());
        assert_eq!((a, b), (ServiceState::Ready, ServiceState::Ready));
        service.settle().await;

        assert_eq!(adapter.initialized.load(Ordering::SeqCst), 1);
        assert_eq!(*adapter.messages.lock().unwrap(), vec!["first"]);
    }

    #[tokio::test]
    async fn scoped_logger_prefixes_messages() {
        let adapter = Arc::new(Collect::default());
        let service = LoggerService::builder().adapter(adapter.clone()).build();
        let scoped = service.scoped("checkout");

        scoped.warn("card declined", None);
        service.settle().await;

        assert_eq!(*adapter.messages.lock().unwrap(), vec!["[checkout] card declined"]);
    }

    #[tokio::test]
    async fn invalid_config_leaves_service_inert() {
        let mut config = PipelineConfig::default();
        config.file_logging.enabled = true;
        config.file_logging.file_name_pattern = "no-part.log".to_string();

        let fallback = Arc::new(CountingFallback::default());
        let service = LoggerService::builder()
            .config(config)
            .fallback(fallback.clone())
            .build();

        assert_eq!(service.initialize().await, ServiceState::Failed);
        service.error("ignored", None);
        service.settle().await;
        service.dispose().await;
        assert_eq!(service.state(), ServiceState::Disposed);

        let reports = fallback.reports.lock().unwrap().clone();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].starts_with("logger: failed to build adapters"));
    }

    #[tokio::test]
    async fn calls_after_dispose_are_ignored() {
        let adapter = Arc::new(Collect::default());
        let service = LoggerService::builder().adapter(adapter.clone()).build();

        service.info("kept", None);
        service.dispose().await;
        assert_eq!(service.state(), ServiceState::Disposed);

        service.info("dropped", None);
        service.bulk(vec![LogRecord::new(LogLevel::Info, LogSource::Client, "dropped too", None)]).await;
        service.settle().await;

        assert_eq!(*adapter.messages.lock().unwrap(), vec!["kept"]);
    }

    #[tokio::test]
    async fn disposing_an_unused_service_builds_nothing() {
        let adapter = Arc::new(Collect::default());
        let service = LoggerService::builder().adapter(adapter.clone()).build();
        service.dispose().await;
        assert_eq!(service.state(), ServiceState::Disposed);
        assert_eq!(adapter.initialized.load(Ordering::SeqCst), 0);

        let mut config = PipelineConfig::default();
        config.file_logging.enabled = true;
        config.file_logging.file_name_pattern = "no-part.log".to_string();
        let fallback = Arc::new(CountingFallback::default());
        let service = LoggerService::builder()
            .config(config)
            .fallback(fallback.clone())
            .build();
        service.dispose().await;
        assert_eq!(service.state(), ServiceState::Disposed);
        assert!(fallback.reports.lock().unwrap().is_empty());
    }
}
