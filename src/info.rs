use serde_json::Value;
use std::sync::OnceLock;
use sysinfo::System;

use crate::record::LogRecord;

/// Attaches environment context to records at creation time.
pub trait InfoProvider: Send + Sync {
    fn populate(&self, record: &mut LogRecord);
}

/// Adds `info.host` with the identifier returned by [`host_id`].
#[derive(Debug, Clone, Default)]
pub struct HostInfoProvider;

impl InfoProvider for HostInfoProvider {
    fn populate(&self, record: &mut LogRecord) {
        record.insert_info("host", Value::from(host_id()));
    }
}

/// Adds a runtime fingerprint: `info.runtime = { os, arch, pid }`.
#[derive(Debug, Clone, Default)]
pub struct RuntimeInfoProvider;

impl InfoProvider for RuntimeInfoProvider {
    fn populate(&self, record: &mut LogRecord) {
        record.insert_info(
            "runtime",
            serde_json::json!({
                "os": std::env::consts::OS,
                "arch": std::env::consts::ARCH,
                "pid": std::process::id(),
            }),
        );
    }
}

/// Host name of this machine, or a per-process UUID when it cannot be
/// determined. Resolved once.
///
/// The OS is asked first; `HOSTNAME` only covers sandboxes where that
/// lookup fails.
pub fn host_id() -> &'static str {
    static HOST: OnceLock<String> = OnceLock::new();
    HOST.get_or_init(|| {
        resolve_host_name(System::host_name(), std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    })
}

fn resolve_host_name(os: Option<String>, env: Option<String>) -> Option<String> {
    [os, env]
        .into_iter()
        .flatten()
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
}
