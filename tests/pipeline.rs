use async_trait::async_trait;
use fanout_log_sink::console::{ConsoleAdapter, ConsoleWriter};
use fanout_log_sink::format;
use fanout_log_sink::info::{HostInfoProvider, RuntimeInfoProvider};
use fanout_log_sink::{Adapter, BoxError, Fallback, LogLevel, LogRecord, LogSource, LoggerService, ServiceState};
use serde_json::json;
use std::error::Error;
use std::io;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Capture {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl ConsoleWriter for Capture {
    fn write_line(&self, level: LogLevel, text: &str) -> io::Result<()> {
        self.lines.lock().unwrap().push((level, text.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct Reports {
    contexts: Mutex<Vec<String>>,
}

impl Fallback for Reports {
    fn report(&self, context: &str, _error: &(dyn Error + 'static)) {
        self.contexts.lock().unwrap().push(context.to_string());
    }
}

struct Recorder {
    name: &'static str,
    levels: Vec<LogLevel>,
    records: Mutex<Vec<LogRecord>>,
}

impl Recorder {
    fn new(name: &'static str, levels: Vec<LogLevel>) -> Arc<Self> {
        Arc::new(Recorder {
            name,
            levels,
            records: Mutex::new(Vec::new()),
        })
    }

    fn messages(&self) -> Vec<String> {
        self.records.lock().unwrap().iter().map(|r| r.message.clone()).collect()
    }
}

#[async_trait]
impl Adapter for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    async fn submit(&self, records: Vec<LogRecord>) -> Result<(), BoxError> {
        let accepted = records.into_iter().filter(|r| self.levels.contains(&r.level()));
        self.records.lock().unwrap().extend(accepted);
        Ok(())
    }
}

struct Failing;

#[async_trait]
impl Adapter for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    async fn submit(&self, _records: Vec<LogRecord>) -> Result<(), BoxError> {
        Err("destination rejected the batch".into())
    }
}

struct Panicking;

#[async_trait]
impl Adapter for Panicking {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn submit(&self, _records: Vec<LogRecord>) -> Result<(), BoxError> {
        panic!("adapter bug");
    }
}

#[tokio::test]
async fn console_end_to_end_filters_and_formats() {
    let capture = Arc::new(Capture::default());
    let console = ConsoleAdapter::new(
        vec![LogLevel::Info, LogLevel::Warn, LogLevel::Error],
        capture.clone(),
        format::server_line,
    );
    let service = LoggerService::builder().adapter(Arc::new(console)).build();

    service.debug("x", None);
    service.settle().await;
    assert!(capture.lines.lock().unwrap().is_empty());

    service.error("boom", Some(json!({"code": 500})));
    service.settle().await;

    let lines = capture.lines.lock().unwrap().clone();
    assert_eq!(lines.len(), 1);
    let (level, text) = &lines[0];
    assert_eq!(*level, LogLevel::Error);
    assert!(text.contains("SERVER: ERROR: boom"), "{text}");
    assert!(text.contains("\"code\": 500"), "{text}");
}

#[tokio::test]
async fn one_failing_adapter_does_not_block_the_others() {
    let first = Recorder::new("first", LogLevel::ALL.to_vec());
    let third = Recorder::new("third", LogLevel::ALL.to_vec());
    let reports = Arc::new(Reports::default());

    let service = LoggerService::builder()
        .adapter(first.clone())
        .adapter(Arc::new(Failing))
        .adapter(third.clone())
        .fallback(reports.clone())
        .build();

    service.info("delivered", None);
    service.settle().await;

    assert_eq!(first.messages(), ["delivered"]);
    assert_eq!(third.messages(), ["delivered"]);
    assert_eq!(*reports.contexts.lock().unwrap(), ["failing: submit failed"]);
}

#[tokio::test]
async fn panicking_adapter_is_isolated_and_keeps_its_lane() {
    let first = Recorder::new("first", LogLevel::ALL.to_vec());
    let third = Recorder::new("third", LogLevel::ALL.to_vec());
    let reports = Arc::new(Reports::default());

    let service = LoggerService::builder()
        .adapter(first.clone())
        .adapter(Arc::new(Panicking))
        .adapter(third.clone())
        .fallback(reports.clone())
        .build();

    service.warn("one", None);
    service.warn("two", None);
    service.settle().await;

    assert_eq!(first.messages(), ["one", "two"]);
    assert_eq!(third.messages(), ["one", "two"]);
    assert_eq!(
        *reports.contexts.lock().unwrap(),
        ["panicking: submit panicked", "panicking: submit panicked"]
    );
}

#[tokio::test]
async fn records_carry_source_timestamp_and_info() {
    let recorder = Recorder::new("recorder", LogLevel::ALL.to_vec());
    let service = LoggerService::builder()
        .source(LogSource::Client)
        .adapter(recorder.clone())
        .info_provider(Arc::new(HostInfoProvider))
        .info_provider(Arc::new(RuntimeInfoProvider))
        .build();

    let before = chrono::Utc::now().timestamp_millis();
    service.log("page shown", None);
    service.settle().await;

    let records = recorder.records.lock().unwrap();
    let record = &records[0];
    assert_eq!(record.level(), LogLevel::Log);
    assert_eq!(record.source, LogSource::Client);
    assert!(record.timestamp() >= before);
    let info = record.info.as_ref().expect("info populated");
    assert!(info.contains_key("host"));
    assert_eq!(info["runtime"]["pid"], std::process::id());
}

#[tokio::test]
async fn bulk_is_filtered_per_adapter() {
    let errors_only = Recorder::new("errors", vec![LogLevel::Error]);
    let everything = Recorder::new("all", LogLevel::ALL.to_vec());
    let service = LoggerService::builder()
        .adapter(errors_only.clone())
        .adapter(everything.clone())
        .build();

    service
        .bulk(vec![
            LogRecord::new(LogLevel::Info, LogSource::Client, "a", None),
            LogRecord::new(LogLevel::Error, LogSource::Client, "b", None),
            LogRecord::new(LogLevel::Debug, LogSource::Client, "c", None),
        ])
        .await;

    assert_eq!(errors_only.messages(), ["b"]);
    assert_eq!(everything.messages(), ["a", "b", "c"]);
}

#[tokio::test]
async fn bulk_json_drops_malformed_records() {
    let recorder = Recorder::new("recorder", LogLevel::ALL.to_vec());
    let reports = Arc::new(Reports::default());
    let service = LoggerService::builder()
        .adapter(recorder.clone())
        .fallback(reports.clone())
        .build();

    service
        .bulk_json(vec![
            json!({"level": "warn", "message": "relayed", "timestamp": 1_700_000_000_000i64}),
            json!({"level": "warn", "timestamp": 1}),
            json!("not a record"),
        ])
        .await;

    assert_eq!(recorder.messages(), ["relayed"]);
    assert_eq!(recorder.records.lock().unwrap()[0].source, LogSource::Client);
    assert_eq!(reports.contexts.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn lifecycle_runs_from_lazy_init_to_dispose() {
    let recorder = Recorder::new("recorder", LogLevel::ALL.to_vec());
    let service = LoggerService::builder().adapter(recorder.clone()).build();
    assert_eq!(service.state(), ServiceState::Uninitialized);

    service.trace("wakes the registry", None);
    service.settle().await;
    assert_eq!(service.state(), ServiceState::Ready);

    service.dispose().await;
    assert_eq!(service.state(), ServiceState::Disposed);

    service.error("after dispose", None);
    service.settle().await;
    assert_eq!(recorder.messages(), ["wakes the registry"]);
}
