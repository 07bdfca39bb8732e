use std::io::Write;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogEvent {
    pub ts: String,
    pub level: LogLevel,
    pub event_code: String,
    pub message: String,
    pub trace_id: String,
    pub component: String,
    pub context: Value,
}

impl LogEvent {
    pub fn new(
        level: LogLevel,
        event_code: impl Into<String>,
        message: impl Into<String>,
        trace_id: impl Into<String>,
        component: impl Into<String>,
        context: Value,
    ) -> Self {
        Self {
            ts: now_utc_rfc3339_millis(),
            level,
            event_code: event_code.into(),
            message: message.into(),
            trace_id: trace_id.into(),
            component: component.into(),
            context,
        }
    }
}

pub fn now_utc_rfc3339_millis() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn new_trace_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn emit_ndjson<W: Write>(writer: &mut W, event: &LogEvent) -> std::io::Result<()> {
    serde_json::to_writer(&mut *writer, event)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string()))?;
    writer.write_all(b"\n")?;
    writer.flush()
}

/// Emits one NDJSON event to stderr. Logging must never abort the operation
/// being logged, so write errors are discarded.
pub fn log_event(
    trace_id: &str,
    level: LogLevel,
    component: &str,
    code: &str,
    message: &str,
    context: Value,
) {
    let event = LogEvent::new(level, code, message, trace_id, component, context);

    let mut stderr = std::io::stderr();
    let _ = emit_ndjson(&mut stderr, &event);
}
