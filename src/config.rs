use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::env::{env_opt, LOG_SINK_REMOTE_KEY_ENV, LOG_SINK_REMOTE_TABLE_ENV, LOG_SINK_REMOTE_URL_ENV};
use crate::level::LogLevel;
use crate::record::LogSource;
use crate::rotation::PART_TOKEN;

fn default_levels() -> Vec<LogLevel> {
    vec![LogLevel::Info, LogLevel::Warn, LogLevel::Error]
}

/// Resolved, per-destination settings snapshot.
///
/// Field names follow the camelCase keys of the host application's
/// configuration store. Missing sections are disabled.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Side of the process boundary this pipeline runs on.
    pub source: LogSource,
    pub console_logging: ConsoleSettings,
    pub file_logging: FileSettings,
    pub remote_logging: RemoteSettings,
    pub worker_logging: RemoteSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            source: LogSource::Server,
            console_logging: ConsoleSettings::default(),
            file_logging: FileSettings::default(),
            remote_logging: RemoteSettings::default(),
            worker_logging: RemoteSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsoleSettings {
    pub enabled: bool,
    pub log_levels: Vec<LogLevel>,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        ConsoleSettings {
            enabled: true,
            log_levels: default_levels(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileSettings {
    pub enabled: bool,
    pub log_levels: Vec<LogLevel>,
    /// Directory holding the log files.
    pub file_path: PathBuf,
    /// File name with `%DATE%` and `%PART%` tokens.
    pub file_name_pattern: String,
    pub batch_size: usize,
    pub idle_time_sec: u64,
    pub max_storage_period_days: u64,
    /// Bytes; a file at or above this size is rotated before the next append.
    pub max_file_size: u64,
}

impl Default for FileSettings {
    fn default() -> Self {
        FileSettings {
            enabled: false,
            log_levels: default_levels(),
            file_path: PathBuf::from("./log"),
            file_name_pattern: "%DATE%-%PART%.log".to_string(),
            batch_size: 10,
            idle_time_sec: 10,
            max_storage_period_days: 30,
            max_file_size: 10 * 1024 * 1024,
        }
    }
}

/// Settings of the remote batch endpoint, shared by the remote and the
/// worker-offload destinations.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteSettings {
    pub enabled: bool,
    pub log_levels: Vec<LogLevel>,
    pub batch_size: usize,
    pub idle_time_sec: u64,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub table: Option<String>,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            enabled: false,
            log_levels: default_levels(),
            batch_size: 10,
            idle_time_sec: 10,
            url: None,
            api_key: None,
            table: None,
        }
    }
}

impl RemoteSettings {
    /// Fill credentials missing from the snapshot from the environment.
    pub fn with_env(mut self) -> Self {
        self.url = self.url.or_else(|| env_opt(LOG_SINK_REMOTE_URL_ENV));
        self.api_key = self.api_key.or_else(|| env_opt(LOG_SINK_REMOTE_KEY_ENV));
        self.table = self.table.or_else(|| env_opt(LOG_SINK_REMOTE_TABLE_ENV));
        self
    }

    pub fn table(&self) -> &str {
        self.table.as_deref().unwrap_or("logs")
    }
}

/// An enabled destination selected from the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    Console(ConsoleSettings),
    File(FileSettings),
    Remote(RemoteSettings),
    Worker(RemoteSettings),
}

/// Error returned when loading or validating a [`PipelineConfig`].
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{destination}: {field} must be greater than zero")]
    Zero {
        destination: &'static str,
        field: &'static str,
    },

    #[error("fileLogging: filePath must not be empty")]
    EmptyFilePath,

    #[error("fileLogging: fileNamePattern `{0}` must contain %PART%")]
    MissingPartToken(String),
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check every enabled destination.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for destination in self.destinations() {
            match &destination {
                Destination::Console(_) => {}
                Destination::File(file) => {
                    non_zero("fileLogging", "batchSize", file.batch_size as u64)?;
                    non_zero("fileLogging", "idleTimeSec", file.idle_time_sec)?;
                    non_zero("fileLogging", "maxFileSize", file.max_file_size)?;
                    if file.file_path.as_os_str().is_empty() {
                        return Err(ConfigError::EmptyFilePath);
                    }
                    if !file.file_name_pattern.contains(PART_TOKEN) {
                        return Err(ConfigError::MissingPartToken(file.file_name_pattern.clone()));
                    }
                }
                Destination::Remote(remote) => {
                    non_zero("remoteLogging", "batchSize", remote.batch_size as u64)?;
                    non_zero("remoteLogging", "idleTimeSec", remote.idle_time_sec)?;
                }
                Destination::Worker(worker) => {
                    non_zero("workerLogging", "batchSize", worker.batch_size as u64)?;
                    non_zero("workerLogging", "idleTimeSec", worker.idle_time_sec)?;
                }
            }
        }
        Ok(())
    }

    /// Enabled destinations in registry order: console, file, remote, worker.
    pub fn destinations(&self) -> Vec<Destination> {
        let mut out = Vec::new();
        if self.console_logging.enabled {
            out.push(Destination::Console(self.console_logging.clone()));
        }
        if self.file_logging.enabled {
            out.push(Destination::File(self.file_logging.clone()));
        }
        if self.remote_logging.enabled {
            out.push(Destination::Remote(self.remote_logging.clone()));
        }
        if self.worker_logging.enabled {
            out.push(Destination::Worker(self.worker_logging.clone()));
        }
        out
    }
}

fn non_zero(destination: &'static str, field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::Zero { destination, field })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_snapshot() {
        let config = PipelineConfig::from_json_str(
            r#"{
                "source": "client",
                "consoleLogging": { "enabled": true, "logLevels": ["debug", "error"] },
                "fileLogging": {
                    "enabled": true,
                    "logLevels": ["info"],
                    "filePath": "/var/log/app",
                    "fileNamePattern": "app-%DATE%-%PART%.log",
                    "batchSize": 50,
                    "idleTimeSec": 3,
                    "maxStoragePeriodDays": 7,
                    "maxFileSize": 1024
                },
                "remoteLogging": { "enabled": true, "url": "https://logs.example.com", "apiKey": "k" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.source, LogSource::Client);
        assert_eq!(config.console_logging.log_levels, vec![LogLevel::Debug, LogLevel::Error]);
        assert_eq!(config.file_logging.file_path, PathBuf::from("/var/log/app"));
        assert_eq!(config.file_logging.max_file_size, 1024);
        assert_eq!(config.remote_logging.batch_size, 10);
        assert_eq!(config.remote_logging.table(), "logs");
        assert!(!config.worker_logging.enabled);

        let kinds: Vec<_> = config
            .destinations()
            .iter()
            .map(|d| match d {
                Destination::Console(_) => "console",
                Destination::File(_) => "file",
                Destination::Remote(_) => "remote",
                Destination::Worker(_) => "worker",
            })
            .collect();
        assert_eq!(kinds, ["console", "file", "remote"]);
        config.validate().unwrap();
    }

    #[test]
    fn defaults_enable_console_only() {
        let config = PipelineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.destinations(), vec![Destination::Console(ConsoleSettings::default())]);
    }

    #[test]
    fn rejects_pattern_without_part_token() {
        let mut config = PipelineConfig::default();
        config.file_logging.enabled = true;
        config.file_logging.file_name_pattern = "%DATE%.log".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::MissingPartToken(_))));
    }

    #[test]
    fn rejects_zero_batch_size_only_when_enabled() {
        let mut config = PipelineConfig::default();
        config.remote_logging.batch_size = 0;
        config.validate().unwrap();

        config.remote_logging.enabled = true;
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "remoteLogging: batchSize must be greater than zero");
    }

    #[test]
    fn explicit_credentials_win_over_environment() {
        let settings = RemoteSettings {
            url: Some("https://explicit.example.com".to_string()),
            table: Some("audit".to_string()),
            ..RemoteSettings::default()
        }
        .with_env();
        assert_eq!(settings.url.as_deref(), Some("https://explicit.example.com"));
        assert_eq!(settings.table(), "audit");
    }
}
