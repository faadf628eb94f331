use crate::record::LogRecord;
use async_trait::async_trait;
use std::error::Error;

/// Error type returned by physical sinks.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Physical destination behind a [`BatchBuffer`](crate::buffer::BatchBuffer).
///
/// Implementations move a finished batch to a concrete backend (a file, an
/// HTTP endpoint, a worker channel). The buffer calls `send_batch` from a
/// background task and never from the caller of a logging entry point.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Deliver one batch, in order.
    ///
    /// **Returns**
    /// - `Ok(())` once the backend accepted every record of the batch.
    /// - `Err(..)` if the backend failed (I/O error, serialization error,
    ///   HTTP status, etc.). The buffer treats this as transient: the batch
    ///   is put back in front of the queue and retried on the next flush.
    async fn send_batch(&self, batch: &[LogRecord]) -> Result<(), BoxError>;
}
