use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILE: &str = "chatstream.logs.jsonl";

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn logging_enabled() -> bool {
    for key in ["CHATSTREAM_OBSERVABILITY_ENABLED", "CHATSTREAM_OBSERVABILITY"] {
        if let Ok(value) = std::env::var(key) {
            return parse_flag(&value).unwrap_or(true);
        }
    }
    true
}

fn env_filter() -> EnvFilter {
    if let Ok(level) = std::env::var("CHATSTREAM_LOG_LEVEL")
        && let Ok(filter) = EnvFilter::try_new(level)
    {
        return filter;
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn split_log_path(raw: &str) -> (PathBuf, String) {
    let path = Path::new(raw);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let file = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(DEFAULT_LOG_FILE)
        .to_string();
    (dir, file)
}

/// Installs the global tracing subscriber once per process.
///
/// Environment variables:
/// - `CHATSTREAM_OBSERVABILITY_ENABLED` / `CHATSTREAM_OBSERVABILITY`: set to
///   `0`/`false` to install nothing.
/// - `CHATSTREAM_LOG_LEVEL`: filter directive (`info`, `chatstream_core=debug`, ...).
/// - `CHATSTREAM_JSON_LOG_PATH`: write JSONL to this file instead of the console.
/// - `RUST_LOG`: fallback filter.
///
/// Console output goes to stderr so stdout stays free for rendered output.
pub fn init_observability() {
    INIT.get_or_init(|| {
        if !logging_enabled() {
            return;
        }
        let filter = env_filter();
        match std::env::var("CHATSTREAM_JSON_LOG_PATH") {
            Ok(raw) if !raw.trim().is_empty() => {
                let (dir, file) = split_log_path(&raw);
                let _ = std::fs::create_dir_all(&dir);
                let writer = tracing_appender::rolling::never(dir, file);
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(false)
                    .with_writer(writer);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init();
            }
            _ => {
                let layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_parse_common_spellings() {
        assert_eq!(parse_flag(" YES "), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn bare_file_name_logs_to_current_dir() {
        let (dir, file) = split_log_path("events.jsonl");
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(file, "events.jsonl");

        let (dir, file) = split_log_path("/var/log/chat/out.jsonl");
        assert_eq!(dir, PathBuf::from("/var/log/chat"));
        assert_eq!(file, "out.jsonl");
    }

    #[test]
    fn init_is_idempotent() {
        init_observability();
        init_observability();
    }
}
