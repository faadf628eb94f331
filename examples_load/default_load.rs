use std::sync::Arc;
use std::time::Instant;
use tracing::error;

use fanout_log_sink::buffer::BatchSettings;
use fanout_log_sink::console::ConsoleAdapter;
use fanout_log_sink::init::init_tracing;
use fanout_log_sink::noop_sink::NoopSink;
use fanout_log_sink::worker::WorkerAdapter;
use fanout_log_sink::{LogLevel, LoggerService};

#[tokio::main]
async fn main() {
    let worker = WorkerAdapter::new(
        vec![LogLevel::Error],
        BatchSettings::from_secs(1_000, 1),
        Some(Arc::new(NoopSink)),
        Arc::new(ConsoleAdapter::fallback()),
    );
    let service = LoggerService::builder().adapter(Arc::new(worker)).build();

    if let Err(err) = init_tracing(service.clone()) {
        eprintln!("failed to install tracing bridge: {err}");
        return;
    }

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "default load test error");
    }

    let elapsed = start.elapsed();
    println!("default config: sent {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    // Drain the lanes and the worker before exiting.
    service.dispose().await;
    println!("drained in {:?}", start.elapsed());
}
