use chrono::NaiveDate;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;

/// Replaced by the current date, `YYYY-MM-DD`.
pub const DATE_TOKEN: &str = "%DATE%";
/// Replaced by the part counter, zero-padded to three digits.
pub const PART_TOKEN: &str = "%PART%";

const SECS_PER_DAY: u64 = 24 * 60 * 60;

// Upper bound on parts skipped in one rotation when successive parts are already full.
const MAX_SKIPPED_PARTS: u32 = 1_000;

/// Substitute the date and part tokens of `pattern`.
pub fn file_name(pattern: &str, date: NaiveDate, part: u32) -> String {
    pattern
        .replace(DATE_TOKEN, &date.format("%Y-%m-%d").to_string())
        .replace(PART_TOKEN, &format!("{part:03}"))
}

/// Picks the active output file of one file destination.
///
/// The part counter starts at 1, only ever grows, and lives in memory:
/// after a restart numbering begins at part 1 again.
#[derive(Debug)]
pub struct Rotation {
    dir: PathBuf,
    pattern: String,
    max_size: u64,
    part: u32,
}

impl Rotation {
    pub fn new(dir: impl Into<PathBuf>, pattern: impl Into<String>, max_size: u64) -> Self {
        Rotation {
            dir: dir.into(),
            pattern: pattern.into(),
            max_size,
            part: 1,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn part(&self) -> u32 {
        self.part
    }

    pub fn current_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(file_name(&self.pattern, date, self.part))
    }

    /// Advance the part counter while the target file is at or above the
    /// size limit. Returns the path to append to and whether it changed.
    pub async fn rotate_if_needed(&mut self, date: NaiveDate) -> (PathBuf, bool) {
        let mut rotated = false;
        let mut path = self.current_path(date);

        for _ in 0..MAX_SKIPPED_PARTS {
            match fs::metadata(&path).await {
                Ok(meta) if meta.len() >= self.max_size => {
                    self.part += 1;
                    rotated = true;
                    path = self.current_path(date);
                }
                _ => break,
            }
        }

        if rotated {
            tracing::debug!(path = %path.display(), part = self.part, "rotated log file");
        }
        (path, rotated)
    }
}

const MAX_ENTRY_FAILURES: usize = 32;

/// Delete regular files in `dir` last modified more than `max_age_days`
/// before `now`. Per-file failures are skipped. Returns the number of files
/// removed.
pub async fn prune_older_than(dir: &Path, max_age_days: u64, now: SystemTime) -> io::Result<usize> {
    let cutoff = now
        .checked_sub(Duration::from_secs(max_age_days.saturating_mul(SECS_PER_DAY)))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut entries = fs::read_dir(dir).await?;
    let mut removed = 0;
    let mut failures = 0;

    loop {
        // A bad entry skips that entry only; a directory that keeps failing ends the sweep.
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(_) if failures < MAX_ENTRY_FAILURES => {
                failures += 1;
                continue;
            }
            Err(err) => {
                tracing::debug!(dir = %dir.display(), error = %err, "stopped pruning after repeated read errors");
                break;
            }
        };
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let Ok(modified) = meta.modified() else {
            continue;
        };
        if modified < cutoff && fs::remove_file(entry.path()).await.is_ok() {
            removed += 1;
        }
    }

    if removed > 0 {
        tracing::debug!(dir = %dir.display(), removed, "pruned expired log files");
    }
    Ok(removed)
}
