use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;
use std::fmt;

use crate::level::LogLevel;

/// Which side of the process boundary produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Client,
    Server,
}

impl LogSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogSource::Client => "client",
            LogSource::Server => "server",
        }
    }
}

/// The unit of data flowing through the pipeline.
///
/// `level` and `timestamp` are fixed at creation. Records are plain owned
/// values, so every adapter works on its own clone and never observes
/// another adapter's changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    timestamp: i64,
    pub source: LogSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Map<String, Value>>,
}

impl LogRecord {
    /// Create a record stamped with the current time.
    pub fn new(level: LogLevel, source: LogSource, message: impl Into<String>, args: Option<Value>) -> Self {
        Self::with_timestamp(level, source, message, args, Utc::now().timestamp_millis())
    }

    pub fn with_timestamp(
        level: LogLevel,
        source: LogSource,
        message: impl Into<String>,
        args: Option<Value>,
        timestamp: i64,
    ) -> Self {
        LogRecord {
            level,
            message: message.into(),
            args,
            timestamp,
            source,
            info: None,
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// Milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// Attach one key of environment context under `info`.
    pub fn insert_info(&mut self, key: impl Into<String>, value: Value) {
        self.info.get_or_insert_with(Map::new).insert(key.into(), value);
    }

    /// Decode a record that arrived as JSON (relayed from a worker or a
    /// network request).
    pub fn from_value(value: Value) -> Result<Self, RecordError> {
        let Value::Object(map) = &value else {
            return Err(RecordError::NotAnObject);
        };
        for field in ["level", "message", "timestamp"] {
            if !map.contains_key(field) {
                return Err(RecordError::MissingField(field));
            }
        }
        let mut value = value;
        if let Value::Object(map) = &mut value {
            // Relayed records may omit the source; they always come from the client side.
            map.entry("source").or_insert_with(|| Value::from("client"));
        }
        serde_json::from_value(value).map_err(RecordError::Invalid)
    }
}

/// Shape of a record once it leaves the process: a file line or an element
/// of a remote batch. Adds the resolved RFC 3339 time and the host
/// identifier to the record's own fields.
#[derive(Debug, Serialize)]
pub struct Envelope<'a> {
    #[serde(flatten)]
    pub record: &'a LogRecord,
    pub time: String,
    pub host: &'a str,
}

impl<'a> Envelope<'a> {
    pub fn new(record: &'a LogRecord, host: &'a str) -> Self {
        Envelope {
            record,
            time: record.datetime().to_rfc3339_opts(SecondsFormat::Millis, true),
            host,
        }
    }
}

/// A record that could not be decoded from caller input.
#[derive(thiserror::Error, Debug)]
pub enum RecordError {
    #[error("log record is not a JSON object")]
    NotAnObject,

    #[error("log record is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid log record: {0}")]
    Invalid(#[source] serde_json::Error),
}

/// Plain structured form of an error, safe to send across any boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedError {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<SerializedError>>,
}

impl SerializedError {
    /// Convert a typed error and its whole `source()` chain.
    pub fn from_error<E: Error + 'static>(error: &E) -> Self {
        let mut serialized = Self::from_dyn(error);
        serialized.kind = short_type_name(std::any::type_name::<E>()).to_string();
        serialized
    }

    /// Convert an error whose concrete type is erased.
    ///
    /// `type` is the leading identifier of the error's `Debug` output, which
    /// is the type or variant name for derived `Debug` impls (`Custom`,
    /// `Os`, `ParseIntError`). `stack` holds a backtrace of the conversion
    /// site when backtraces are enabled (`RUST_BACKTRACE`/`RUST_LIB_BACKTRACE`);
    /// only the top level carries it.
    pub fn from_dyn(error: &(dyn Error + 'static)) -> Self {
        let mut serialized = Self::chain(error);
        let backtrace = Backtrace::capture();
        if backtrace.status() == BacktraceStatus::Captured {
            serialized.stack = Some(backtrace.to_string());
        }
        serialized
    }

    fn chain(error: &(dyn Error + 'static)) -> Self {
        let debug = format!("{error:?}");
        let kind = debug
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .find(|s| !s.is_empty())
            .unwrap_or("Error")
            .to_string();

        SerializedError {
            kind,
            message: error.to_string(),
            stack: None,
            cause: error.source().map(|source| Box::new(Self::chain(source))),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl fmt::Display for SerializedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl Error for SerializedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_deref().map(|cause| cause as &(dyn Error + 'static))
    }
}

fn short_type_name(name: &str) -> &str {
    let base = name.split('<').next().unwrap_or(name);
    base.rsplit("::").next().unwrap_or(base)
}

/// Structured `args` payload for an error value.
pub fn error_args<E: Error + 'static>(error: &E) -> Value {
    SerializedError::from_error(error).to_value()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct Outer {
        inner: std::io::Error,
    }

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("could not write batch")
        }
    }

    impl Error for Outer {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.inner)
        }
    }

    #[test]
    fn serialized_error_keeps_cause_chain() {
        let err = Outer {
            inner: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        };
        let serialized = SerializedError::from_error(&err);

        assert_eq!(serialized.kind, "Outer");
        assert_eq!(serialized.message, "could not write batch");
        let cause = serialized.cause.expect("cause");
        assert_eq!(cause.message, "disk full");
        assert_eq!(cause.kind, "Custom");
        assert!(cause.cause.is_none());

        let value = error_args(&err);
        assert_eq!(value["type"], "Outer");
        assert_eq!(value["cause"]["message"], "disk full");
    }

    #[test]
    fn stack_follows_backtrace_setting_on_top_level_only() {
        let err = Outer {
            inner: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        };
        let enabled = Backtrace::capture().status() == BacktraceStatus::Captured;
        let serialized = SerializedError::from_error(&err);

        assert_eq!(serialized.stack.is_some(), enabled);
        assert!(serialized.cause.as_ref().unwrap().stack.is_none());
        assert_eq!(serialized.to_value().get("stack").is_some(), enabled);

        let parse = "x".parse::<u32>().unwrap_err();
        assert_eq!(SerializedError::from_dyn(&parse).kind, "ParseIntError");
    }

    #[test]
    fn decodes_relayed_records() {
        let record = LogRecord::from_value(json!({
            "level": "warn",
            "message": "slow paint",
            "timestamp": 1_700_000_000_000i64,
            "args": {"ms": 120}
        }))
        .expect("valid record");

        assert_eq!(record.level(), LogLevel::Warn);
        assert_eq!(record.source, LogSource::Client);
        assert_eq!(record.timestamp(), 1_700_000_000_000);
        assert_eq!(record.args, Some(json!({"ms": 120})));
    }

    #[test]
    fn rejects_records_missing_required_fields() {
        let err = LogRecord::from_value(json!({"level": "info", "timestamp": 1})).unwrap_err();
        assert!(matches!(err, RecordError::MissingField("message")));

        let err = LogRecord::from_value(json!(["info"])).unwrap_err();
        assert!(matches!(err, RecordError::NotAnObject));

        let err = LogRecord::from_value(json!({"level": "fatal", "message": "x", "timestamp": 1})).unwrap_err();
        assert!(matches!(err, RecordError::Invalid(_)));
    }

    #[test]
    fn envelope_adds_time_and_host() {
        let record = LogRecord::with_timestamp(LogLevel::Info, LogSource::Client, "hi", None, 1_000);
        let value = serde_json::to_value(Envelope::new(&record, "web-1")).unwrap();
        assert_eq!(value["time"], "1970-01-01T00:00:01.000Z");
        assert_eq!(value["host"], "web-1");
        assert_eq!(value["timestamp"], 1_000);
        assert_eq!(value["source"], "client");
    }

    #[test]
    fn serializes_in_wire_shape() {
        let record = LogRecord::with_timestamp(LogLevel::Error, LogSource::Server, "boom", Some(json!({"code": 500})), 42);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({"level": "error", "message": "boom", "args": {"code": 500}, "timestamp": 42, "source": "server"})
        );
    }
}
