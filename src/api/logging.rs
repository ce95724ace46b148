use crate::util::parse_bool_flag;
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::{IsTerminal, Write};

const DEFAULT_LOG_PATH: &str = "/tmp/graphrun-debug.log";
const DEBUG_PAYLOAD_ENV: &str = "GRAPHRUN_DEBUG_PAYLOAD";
const LOG_PATH_ENV: &str = "GRAPHRUN_LOG_PATH";
const PAYLOAD_PREVIEW_CHARS: usize = 512;

pub fn debug_payload_enabled() -> bool {
    std::env::var(DEBUG_PAYLOAD_ENV)
        .ok()
        .and_then(parse_bool_flag)
        .unwrap_or(false)
}

pub fn emit_debug_payload(request_url: &str, payload: &Value) {
    let formatted_payload = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|_| "<payload serialization error>".to_string());
    let message = format!(
        "GRAPHRUN DEBUG payload_request url={request_url}\npayload:\n{formatted_payload}\n"
    );
    emit_log_message(&message);
}

pub fn emit_frame_decode_error(payload: &str, parse_error: &serde_json::Error) {
    let message = format!(
        "GRAPHRUN ERROR frame_decode_failed error={parse_error}\ndata:\n{}\n",
        preview(payload)
    );
    emit_log_message(&message);
}

pub fn emit_resume_skipped(thread_id: Option<&str>, reason: &str) {
    let message = format!(
        "GRAPHRUN WARN resume_skipped thread_id={} reason={reason}\n",
        thread_id.unwrap_or("<none>")
    );
    emit_log_message(&message);
}

pub fn emit_resume_submitted(thread_id: &str, tool_call_id: &str, content: &str) {
    if !debug_payload_enabled() {
        return;
    }
    let message = format!(
        "GRAPHRUN DEBUG resume_submitted thread_id={thread_id} tool_call_id={tool_call_id} content={content}\n"
    );
    emit_log_message(&message);
}

pub fn emit_decision_dropped(thread_id: Option<&str>) {
    let message = format!(
        "GRAPHRUN WARN decision_dropped thread_id={}\n",
        thread_id.unwrap_or("<none>")
    );
    emit_log_message(&message);
}

pub fn emit_session_transition(generation: u64, from: &str, to: &str) {
    if !debug_payload_enabled() {
        return;
    }
    let message =
        format!("GRAPHRUN DEBUG session_transition generation={generation} from={from} to={to}\n");
    emit_log_message(&message);
}

fn preview(payload: &str) -> String {
    if payload.chars().count() <= PAYLOAD_PREVIEW_CHARS {
        return payload.to_string();
    }
    let mut truncated: String = payload.chars().take(PAYLOAD_PREVIEW_CHARS).collect();
    truncated.push_str("...");
    truncated
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
    std::env::var(LOG_PATH_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            if std::io::stderr().is_terminal() {
                Some(DEFAULT_LOG_PATH.to_string())
            } else {
                None
            }
        })
}

fn append_log_file(path: &str, message: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(message.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_payload_enabled_accepts_true_variants() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        std::env::set_var(DEBUG_PAYLOAD_ENV, "1");
        assert!(debug_payload_enabled());
        std::env::set_var(DEBUG_PAYLOAD_ENV, "TRUE");
        assert!(debug_payload_enabled());
        std::env::set_var(DEBUG_PAYLOAD_ENV, "off");
        assert!(!debug_payload_enabled());
        std::env::remove_var(DEBUG_PAYLOAD_ENV);
    }

    #[test]
    fn test_resolve_log_path_uses_env_override() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        std::env::set_var(LOG_PATH_ENV, "/tmp/test-graphrun.log");
        assert_eq!(resolve_log_path().as_deref(), Some("/tmp/test-graphrun.log"));
        std::env::remove_var(LOG_PATH_ENV);
    }

    #[test]
    fn test_decode_error_is_appended_to_log_file() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graphrun.log");
        std::env::set_var(LOG_PATH_ENV, path.to_str().unwrap());

        let parse_error = serde_json::from_str::<Value>("{not json").unwrap_err();
        emit_frame_decode_error("{not json", &parse_error);
        emit_resume_skipped(None, "no thread id");
        std::env::remove_var(LOG_PATH_ENV);

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("frame_decode_failed"));
        assert!(written.contains("{not json"));
        assert!(written.contains("resume_skipped thread_id=<none> reason=no thread id"));
    }

    #[test]
    fn test_preview_truncates_long_payloads() {
        let long = "x".repeat(PAYLOAD_PREVIEW_CHARS + 10);
        let shown = preview(&long);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), PAYLOAD_PREVIEW_CHARS + 3);
    }
}
