use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::adapter::Adapter;
use crate::buffer::{BatchBuffer, BatchSettings};
use crate::config::FileSettings;
use crate::fallback::Fallback;
use crate::info::host_id;
use crate::level::{accepts, LogLevel};
use crate::record::{Envelope, LogRecord};
use crate::rotation::{prune_older_than, Rotation};
use crate::sink::{BoxError, LogSink};

/// Appends batches as newline-delimited JSON to the active rotated file.
pub struct FileSink {
    rotation: Mutex<Rotation>,
    max_age_days: u64,
}

impl FileSink {
    pub fn new(rotation: Rotation, max_age_days: u64) -> Self {
        FileSink {
            rotation: Mutex::new(rotation),
            max_age_days,
        }
    }

    fn encode(batch: &[LogRecord]) -> Result<Vec<u8>, serde_json::Error> {
        let host = host_id();
        let mut out = Vec::new();
        for record in batch {
            serde_json::to_writer(&mut out, &Envelope::new(record, host))?;
            out.push(b'\n');
        }
        Ok(out)
    }
}

#[async_trait]
impl LogSink for FileSink {
    async fn send_batch(&self, batch: &[LogRecord]) -> Result<(), BoxError> {
        let body = Self::encode(batch)?;

        let mut rotation = self.rotation.lock().await;
        let (path, rotated) = rotation.rotate_if_needed(Utc::now().date_naive()).await;

        // Patterns may place the date or part in a subdirectory.
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path).await?;
        file.write_all(&body).await?;
        file.flush().await?;

        if rotated {
            if let Err(err) = prune_older_than(rotation.dir(), self.max_age_days, SystemTime::now()).await {
                tracing::debug!(error = %err, "retention sweep after rotation failed");
            }
        }
        Ok(())
    }
}

/// Buffered destination writing rotated NDJSON files.
pub struct FileAdapter {
    levels: Vec<LogLevel>,
    dir: PathBuf,
    max_age_days: u64,
    buffer: BatchBuffer,
    fallback: Arc<dyn Fallback>,
}

impl FileAdapter {
    pub fn new(settings: &FileSettings, fallback: Arc<dyn Fallback>) -> Self {
        let rotation = Rotation::new(
            settings.file_path.clone(),
            settings.file_name_pattern.clone(),
            settings.max_file_size,
        );
        let sink = Arc::new(FileSink::new(rotation, settings.max_storage_period_days));
        let buffer = BatchBuffer::new(
            "file",
            BatchSettings::from_secs(settings.batch_size, settings.idle_time_sec),
            sink,
            Arc::clone(&fallback),
        );

        FileAdapter {
            levels: settings.log_levels.clone(),
            dir: settings.file_path.clone(),
            max_age_days: settings.max_storage_period_days,
            buffer,
            fallback,
        }
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub async fn flush(&self) {
        self.buffer.flush().await;
    }
}

#[async_trait]
impl Adapter for FileAdapter {
    fn name(&self) -> &str {
        "file"
    }

    /// Create the log directory and run one retention sweep.
    async fn initialize(&self) -> Result<(), BoxError> {
        fs::create_dir_all(&self.dir).await?;
        if let Err(err) = prune_older_than(&self.dir, self.max_age_days, SystemTime::now()).await {
            self.fallback.report("file: retention sweep failed", &err);
        }
        Ok(())
    }

    async fn submit(&self, records: Vec<LogRecord>) -> Result<(), BoxError> {
        self.buffer
            .add(records.into_iter().filter(|r| accepts(r.level(), &self.levels)));
        Ok(())
    }

    async fn dispose(&self) {
        self.buffer.dispose().await;
    }
}
