use serde_json::Value;
use std::fs::OpenOptions;
use std::io::{IsTerminal, Write};

const DEFAULT_DEBUG_LOG_PATH: &str = "/tmp/colloquy-debug.log";
const DEBUG_PAYLOAD_ENV: &str = "COLLOQUY_DEBUG_PAYLOAD";
const DEBUG_LOG_PATH_ENV: &str = "COLLOQUY_DEBUG_LOG";

pub fn debug_payload_enabled() -> bool {
    std::env::var(DEBUG_PAYLOAD_ENV)
        .ok()
        .and_then(|v| crate::util::parse_bool_str(&v))
        .unwrap_or(false)
}

pub fn emit_debug_payload(request_url: &str, payload: &Value) {
    let formatted_payload = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|_| "<payload serialization error>".to_string());
    let message =
        format!("COLLOQUY DEBUG payload_request url={request_url}\npayload:\n{formatted_payload}\n");
    emit_log_message(&message);
}

pub fn emit_stream_parse_error(frame: &str, parse_error: &serde_json::Error) {
    let message =
        format!("COLLOQUY ERROR stream_parse_failed error={parse_error}\nframe:\n{frame}\n");
    emit_log_message(&message);
}

pub fn emit_persistence_degraded(path: &str, error: &anyhow::Error) {
    let message =
        format!("COLLOQUY WARN persistence_degraded path={path} error={error:#}; state is now in-memory only\n");
    emit_log_message(&message);
}

fn emit_log_message(message: &str) {
    if let Some(path) = resolve_log_path() {
        if append_log_file(&path, message).is_ok() {
            return;
        }
    }

    eprintln!("{message}");
}

fn resolve_log_path() -> Option<String> {
    std::env::var(DEBUG_LOG_PATH_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            if std::io::stderr().is_terminal() {
                Some(DEFAULT_DEBUG_LOG_PATH.to_string())
            } else {
                None
            }
        })
}

fn append_log_file(path: &str, message: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(message.as_bytes())
}
