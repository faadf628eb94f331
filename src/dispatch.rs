//! Fan-out machinery behind [`LoggerService`](crate::service::LoggerService).
//!
//! A single dispatcher task owns the adapter registry. It builds the
//! registry on the first command it receives, so every caller that arrives
//! while it is initializing simply waits in the channel for the same
//! initialization. Each adapter then gets its own lane: a task with an
//! unbounded queue that calls the adapter strictly in arrival order. A slow
//! or hung adapter only stalls its own lane, and a panicking `submit` is
//! caught at the lane boundary and reported to the fallback.

use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, watch};

use crate::adapter::Adapter;
use crate::fallback::Fallback;
use crate::record::LogRecord;
use crate::registry::BuildError;
use crate::service::ServiceState;

pub(crate) type BuildFn = Box<dyn FnOnce() -> Result<Vec<Arc<dyn Adapter>>, BuildError> + Send>;

pub(crate) enum Command {
    Initialize(oneshot::Sender<ServiceState>),
    Dispatch(Vec<LogRecord>),
    Settle(oneshot::Sender<()>),
    Dispose(oneshot::Sender<()>),
}

enum LaneCommand {
    Submit(Vec<LogRecord>),
    Settle(oneshot::Sender<()>),
    Dispose(oneshot::Sender<()>),
}

struct Lane {
    name: String,
    queue: UnboundedSender<LaneCommand>,
}

impl Lane {
    fn spawn(adapter: Arc<dyn Adapter>, fallback: Arc<dyn Fallback>) -> Self {
        let (queue, inbox) = mpsc::unbounded_channel();
        let name = adapter.name().to_string();
        tokio::spawn(run_lane(adapter, fallback, inbox));
        Lane { name, queue }
    }

    fn submit(&self, records: Vec<LogRecord>) {
        if self.queue.send(LaneCommand::Submit(records)).is_err() {
            tracing::warn!(adapter = %self.name, "adapter lane is gone, dropping records");
        }
    }

    /// Resolves once everything queued before it has been handed to the
    /// adapter.
    fn settle(&self) -> oneshot::Receiver<()> {
        let (ack, done) = oneshot::channel();
        let _ = self.queue.send(LaneCommand::Settle(ack));
        done
    }

    fn dispose(&self) -> oneshot::Receiver<()> {
        let (ack, done) = oneshot::channel();
        let _ = self.queue.send(LaneCommand::Dispose(ack));
        done
    }
}

async fn run_lane(
    adapter: Arc<dyn Adapter>,
    fallback: Arc<dyn Fallback>,
    mut inbox: UnboundedReceiver<LaneCommand>,
) {
    while let Some(command) = inbox.recv().await {
        match command {
            LaneCommand::Submit(records) => {
                let task = {
                    let adapter = Arc::clone(&adapter);
                    tokio::spawn(async move { adapter.submit(records).await })
                };
                match task.await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => fallback.report(&format!("{}: submit failed", adapter.name()), &*err),
                    Err(err) => fallback.report(&format!("{}: submit panicked", adapter.name()), &err),
                }
            }
            LaneCommand::Settle(ack) => {
                let _ = ack.send(());
            }
            LaneCommand::Dispose(ack) => {
                let task = {
                    let adapter = Arc::clone(&adapter);
                    tokio::spawn(async move { adapter.dispose().await })
                };
                if let Err(err) = task.await {
                    fallback.report(&format!("{}: dispose panicked", adapter.name()), &err);
                }
                let _ = ack.send(());
                return;
            }
        }
    }
}

async fn wait_all(pending: Vec<oneshot::Receiver<()>>) {
    for done in pending {
        // A lane that went away has nothing left to wait for.
        let _ = done.await;
    }
}

pub(crate) struct Dispatcher {
    build: Option<BuildFn>,
    lanes: Vec<Lane>,
    fallback: Arc<dyn Fallback>,
    state: watch::Sender<ServiceState>,
}

impl Dispatcher {
    pub(crate) fn new(build: BuildFn, fallback: Arc<dyn Fallback>, state: watch::Sender<ServiceState>) -> Self {
        Dispatcher {
            build: Some(build),
            lanes: Vec::new(),
            fallback,
            state,
        }
    }

    fn state(&self) -> ServiceState {
        *self.state.borrow()
    }

    pub(crate) async fn run(mut self, mut commands: UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            // Disposing a service that never ran must not build its destinations.
            if self.state() == ServiceState::Uninitialized && !matches!(command, Command::Dispose(_)) {
                self.initialize().await;
            }

            match command {
                Command::Initialize(ack) => {
                    let _ = ack.send(self.state());
                }
                Command::Dispatch(records) => {
                    if let Some((last, rest)) = self.lanes.split_last() {
                        for lane in rest {
                            lane.submit(records.clone());
                        }
                        last.submit(records);
                    }
                }
                Command::Settle(ack) => {
                    let pending: Vec<_> = self.lanes.iter().map(Lane::settle).collect();
                    tokio::spawn(async move {
                        wait_all(pending).await;
                        let _ = ack.send(());
                    });
                }
                Command::Dispose(ack) => {
                    self.dispose_lanes().await;
                    self.state.send_replace(ServiceState::Disposed);
                    let _ = ack.send(());
                }
            }
        }

        // Every handle is gone; flush what is left.
        self.dispose_lanes().await;
    }

    async fn initialize(&mut self) {
        self.state.send_replace(ServiceState::Initializing);

        let adapters = match self.build.take().map(|build| build()) {
            Some(Ok(adapters)) => adapters,
            Some(Err(err)) => {
                self.fallback.report("logger: failed to build adapters", &err);
                self.state.send_replace(ServiceState::Failed);
                return;
            }
            None => Vec::new(),
        };

        // All setups run at once; a slow one does not delay the others.
        let setups: Vec<_> = adapters
            .iter()
            .map(|adapter| {
                let adapter = Arc::clone(adapter);
                tokio::spawn(async move { adapter.initialize().await })
            })
            .collect();

        for (adapter, setup) in adapters.iter().zip(setups) {
            match setup.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => self
                    .fallback
                    .report(&format!("{}: initialization failed", adapter.name()), &*err),
                Err(err) => self
                    .fallback
                    .report(&format!("{}: initialization panicked", adapter.name()), &err),
            }
            self.lanes
                .push(Lane::spawn(Arc::clone(adapter), Arc::clone(&self.fallback)));
        }

        tracing::debug!(adapters = self.lanes.len(), "logger ready");
        self.state.send_replace(ServiceState::Ready);
    }

    async fn dispose_lanes(&mut self) {
        let pending: Vec<_> = self.lanes.drain(..).map(|lane| lane.dispose()).collect();
        wait_all(pending).await;
    }
}
