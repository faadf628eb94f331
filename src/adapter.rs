use async_trait::async_trait;

use crate::record::LogRecord;
use crate::sink::BoxError;

/// A destination in the logger registry.
///
/// Adapters filter by their own allow-list, buffer when they batch, and
/// absorb their own I/O failures through a fallback. `submit` should return
/// quickly: physical writes of buffered destinations run on background
/// flush tasks.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Short name used in failure reports and diagnostics.
    fn name(&self) -> &str;

    /// One-time setup (directories, clients, worker contexts). Failures are
    /// reported by the caller and leave the adapter in the registry.
    async fn initialize(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Accept records; those outside the allow-list are skipped.
    async fn submit(&self, records: Vec<LogRecord>) -> Result<(), BoxError>;

    /// Final flush before shutdown.
    async fn dispose(&self) {}
}
