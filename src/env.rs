/// Environment variable names used by this crate to supply remote
/// endpoint credentials outside of the settings snapshot.
///
/// These are purely helpers; adapters never read the environment
/// themselves.

/// Base URL of the remote batch-ingestion endpoint.
pub const LOG_SINK_REMOTE_URL_ENV: &str = "LOG_SINK_REMOTE_URL";

/// API key sent with every remote batch.
pub const LOG_SINK_REMOTE_KEY_ENV: &str = "LOG_SINK_REMOTE_KEY";

/// Target table (path segment) on the remote endpoint.
pub const LOG_SINK_REMOTE_TABLE_ENV: &str = "LOG_SINK_REMOTE_TABLE";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read a non-empty environment variable.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}
