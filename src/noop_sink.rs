use crate::record::LogRecord;
use crate::sink::{BoxError, LogSink};
use async_trait::async_trait;

/// A sink that accepts and drops every batch.
///
/// Useful for measuring the overhead of buffering and fan-out without any
/// external I/O, and for tests that don't care about persistence.
#[derive(Clone, Default)]
pub struct NoopSink;

#[async_trait]
impl LogSink for NoopSink {
    async fn send_batch(&self, _batch: &[LogRecord]) -> Result<(), BoxError> {
        Ok(())
    }
}
