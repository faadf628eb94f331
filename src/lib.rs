pub mod level;
pub mod record;
pub mod format;
pub mod info;
pub mod sink;
pub mod noop_sink;
pub mod fallback;
pub mod buffer;
pub mod adapter;
pub mod console;
pub mod rotation;
pub mod file;
pub mod env;
pub mod config;

#[cfg(feature = "remote")]
pub mod remote;

pub mod worker;
pub mod registry;
mod dispatch;
pub mod service;
pub mod layer;
pub mod init;

pub use adapter::Adapter;
pub use config::PipelineConfig;
pub use fallback::Fallback;
pub use level::LogLevel;
pub use record::{LogRecord, LogSource, SerializedError};
pub use service::{LoggerService, ScopedLogger, ServiceState};
pub use sink::{BoxError, LogSink};
