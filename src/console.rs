use async_trait::async_trait;
use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;

use crate::adapter::Adapter;
use crate::fallback::Fallback;
use crate::format::{self, Formatter};
use crate::level::{accepts, LogLevel};
use crate::record::{LogRecord, LogSource, SerializedError};
use crate::sink::BoxError;

/// Console-like output used by [`ConsoleAdapter`].
pub trait ConsoleWriter: Send + Sync {
    fn write_line(&self, level: LogLevel, text: &str) -> io::Result<()>;
}

/// Process stdio: `warn` and `error` go to stderr, everything else to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stdio;

impl ConsoleWriter for Stdio {
    fn write_line(&self, level: LogLevel, text: &str) -> io::Result<()> {
        match level {
            LogLevel::Warn | LogLevel::Error => writeln!(io::stderr().lock(), "{text}"),
            _ => writeln!(io::stdout().lock(), "{text}"),
        }
    }
}

/// Writes accepted records synchronously to a [`ConsoleWriter`].
///
/// Write failures are swallowed. The adapter doubles as the usual
/// [`Fallback`] of the other destinations (see [`ConsoleAdapter::fallback`]).
pub struct ConsoleAdapter {
    name: String,
    levels: Vec<LogLevel>,
    writer: Arc<dyn ConsoleWriter>,
    formatter: Formatter,
}

impl ConsoleAdapter {
    pub fn new(levels: Vec<LogLevel>, writer: Arc<dyn ConsoleWriter>, formatter: Formatter) -> Self {
        ConsoleAdapter {
            name: "console".to_string(),
            levels,
            writer,
            formatter,
        }
    }

    /// Server-formatted stdio console.
    pub fn stdio(levels: Vec<LogLevel>) -> Self {
        Self::new(levels, Arc::new(Stdio), format::server_line)
    }

    /// Error-only stdio console used to report other destinations' failures.
    pub fn fallback() -> Self {
        let mut adapter = Self::stdio(vec![LogLevel::Error]);
        adapter.name = "fallback".to_string();
        adapter
    }

    pub fn levels(&self) -> &[LogLevel] {
        &self.levels
    }

    pub fn write(&self, record: &LogRecord) {
        if !accepts(record.level(), &self.levels) {
            return;
        }
        let text = format::grouped(self.formatter, record);
        let _ = self.writer.write_line(record.level(), &text);
    }
}

#[async_trait]
impl Adapter for ConsoleAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, records: Vec<LogRecord>) -> Result<(), BoxError> {
        for record in &records {
            self.write(record);
        }
        Ok(())
    }
}

impl Fallback for ConsoleAdapter {
    fn report(&self, context: &str, error: &(dyn Error + 'static)) {
        let args = SerializedError::from_dyn(error).to_value();
        self.write(&LogRecord::new(LogLevel::Error, LogSource::Server, context, Some(args)));
    }
}
