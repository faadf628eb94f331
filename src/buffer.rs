use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use crate::fallback::Fallback;
use crate::record::LogRecord;
use crate::sink::LogSink;

/// Flush triggers of a [`BatchBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    /// Flush as soon as this many records are pending.
    pub batch_size: usize,
    /// Flush after this long without a new record.
    pub idle: Duration,
}

impl BatchSettings {
    pub fn new(batch_size: usize, idle: Duration) -> Self {
        // Enforce minimal thresholds to avoid degenerate configs.
        Self {
            batch_size: batch_size.max(1),
            idle: idle.max(Duration::from_millis(10)),
        }
    }

    pub fn from_secs(batch_size: usize, idle_secs: u64) -> Self {
        Self::new(batch_size, Duration::from_secs(idle_secs))
    }
}

/// Ordered per-destination queue between record arrival and the physical
/// sink.
///
/// Two triggers flush it: the pending count reaching `batch_size`, and
/// `idle` elapsing without a new record (every `add` restarts the idle
/// timer). A flush takes the whole queue at once and hands it to the
/// [`LogSink`]; only one flush runs at a time and records added meanwhile
/// wait for the next cycle. A failed batch is put back in front of the
/// queue in its original order and reported to the [`Fallback`].
///
/// Must be used from within a tokio runtime.
pub struct BatchBuffer {
    shared: Arc<Shared>,
}

struct Shared {
    name: String,
    settings: BatchSettings,
    sink: Arc<dyn LogSink>,
    fallback: Arc<dyn Fallback>,
    state: Mutex<State>,
    flushed: Notify,
}

#[derive(Default)]
struct State {
    pending: VecDeque<LogRecord>,
    flushing: bool,
    idle_timer: Option<JoinHandle<()>>,
    closed: bool,
}

impl BatchBuffer {
    pub fn new(
        name: impl Into<String>,
        settings: BatchSettings,
        sink: Arc<dyn LogSink>,
        fallback: Arc<dyn Fallback>,
    ) -> Self {
        let settings = BatchSettings::new(settings.batch_size, settings.idle);
        BatchBuffer {
            shared: Arc::new(Shared {
                name: name.into(),
                settings,
                sink,
                fallback,
                state: Mutex::new(State::default()),
                flushed: Notify::new(),
            }),
        }
    }

    pub fn settings(&self) -> BatchSettings {
        self.shared.settings
    }

    /// Append records, restart the idle timer and start a flush when the
    /// size threshold is reached. Never waits for I/O.
    pub fn add(&self, records: impl IntoIterator<Item = LogRecord>) {
        let mut state = self.shared.lock();
        if state.closed {
            return;
        }

        let before = state.pending.len();
        state.pending.extend(records);
        if state.pending.len() == before {
            return;
        }

        self.restart_idle_timer(&mut state);

        let size_reached = state.pending.len() >= self.shared.settings.batch_size && !state.flushing;
        drop(state);

        if size_reached {
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move { shared.flush().await });
        }
    }

    /// Flush now. A no-op when the queue is empty or a flush is running.
    pub async fn flush(&self) {
        self.shared.flush().await;
    }

    /// Number of records waiting for a flush.
    pub fn len(&self) -> usize {
        self.shared.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the idle timer, wait for any running flush and flush what is
    /// left. Records added afterwards are ignored.
    pub async fn dispose(&self) {
        {
            let mut state = self.shared.lock();
            state.closed = true;
            if let Some(timer) = state.idle_timer.take() {
                timer.abort();
            }
        }
        self.shared.wait_idle().await;
        self.shared.flush().await;
    }

    fn restart_idle_timer(&self, state: &mut State) {
        if let Some(timer) = state.idle_timer.take() {
            timer.abort();
        }

        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let idle = self.shared.settings.idle;
        state.idle_timer = Some(tokio::spawn(async move {
            sleep(idle).await;
            if let Some(shared) = shared.upgrade() {
                // Run the flush on its own task so restarting the timer can't cancel it halfway.
                tokio::spawn(async move { shared.flush().await });
            }
        }));
    }
}

impl Drop for BatchBuffer {
    fn drop(&mut self) {
        if let Some(timer) = self.shared.lock().idle_timer.take() {
            timer.abort();
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn flush(&self) {
        let batch: Vec<LogRecord> = {
            let mut state = self.lock();
            if state.flushing || state.pending.is_empty() {
                return;
            }
            state.flushing = true;
            std::mem::take(&mut state.pending).into()
        };

        let count = batch.len();
        let result = self.sink.send_batch(&batch).await;

        let mut state = self.lock();
        state.flushing = false;
        match result {
            Ok(()) => {
                drop(state);
                tracing::debug!(destination = %self.name, count, "flushed log batch");
            }
            Err(err) => {
                for record in batch.into_iter().rev() {
                    state.pending.push_front(record);
                }
                drop(state);
                self.fallback
                    .report(&format!("{}: failed to flush {count} log records", self.name), &*err);
            }
        }
        self.flushed.notify_waiters();
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.flushed.notified();
            let flushing = self.lock().flushing;
            if !flushing {
                return;
            }
            notified.await;
        }
    }
}
