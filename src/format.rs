use chrono::Local;

use crate::record::LogRecord;

/// Renders the header line of a record for a console-like sink.
pub type Formatter = fn(&LogRecord) -> String;

const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

fn date_time(record: &LogRecord) -> String {
    record
        .datetime()
        .with_timezone(&Local)
        .format(DATE_TIME_FORMAT)
        .to_string()
}

/// `[<date time>] SERVER: ERROR: message`
pub fn server_line(record: &LogRecord) -> String {
    format!(
        "[{}] {}: {}: {}",
        date_time(record),
        record.source.as_str().to_uppercase(),
        record.level().as_str().to_uppercase(),
        record.message
    )
}

/// `[<date time>] message`
pub fn client_line(record: &LogRecord) -> String {
    format!("[{}] {}", date_time(record), record.message)
}

/// Header plus the record's `args` as an indented block, when present.
pub fn grouped(formatter: Formatter, record: &LogRecord) -> String {
    let header = formatter(record);
    let Some(args) = &record.args else {
        return header;
    };

    let body = serde_json::to_string_pretty(args).unwrap_or_else(|_| args.to_string());
    let mut out = header;
    for line in body.lines() {
        out.push_str("\n  ");
        out.push_str(line);
    }
    out
}
