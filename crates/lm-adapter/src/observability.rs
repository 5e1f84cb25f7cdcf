use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

const ENABLED_ENV: &str = "LM_ADAPTER_OBSERVABILITY";
const LEVEL_ENV: &str = "LM_ADAPTER_LOG_LEVEL";
const JSON_LOG_PATH_ENV: &str = "LM_ADAPTER_JSON_LOG_PATH";
const DEFAULT_LOG_FILE: &str = "lm-adapter.logs.jsonl";

static INIT: OnceCell<()> = OnceCell::new();

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_filter(level: Option<&str>) -> EnvFilter {
    if let Some(level) = level
        && let Ok(filter) = EnvFilter::try_new(level)
    {
        return filter;
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

// Splits a log path into the directory and file name `tracing-appender` wants.
fn log_file_location(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE)
        .to_string();
    (dir, file_name)
}

/// Installs the global `tracing` subscriber once per process.
///
/// Environment variables:
/// - `LM_ADAPTER_OBSERVABILITY`: set to `0`/`false`/`off` to disable (default enabled).
/// - `LM_ADAPTER_LOG_LEVEL`: filter override (`debug`, `lm_adapter=trace`, ...).
/// - `LM_ADAPTER_JSON_LOG_PATH`: write JSON lines to this file instead of the console.
/// - `RUST_LOG`: used when no level override is given.
///
/// Console output goes to stderr so stdout stays free for model output.
/// A subscriber installed elsewhere is left in place.
pub fn init_observability() {
    INIT.get_or_init(|| {
        let enabled = std::env::var(ENABLED_ENV)
            .ok()
            .map(|v| parse_bool_env(&v).unwrap_or(true))
            .unwrap_or(true);
        if !enabled {
            return;
        }

        let filter = env_filter(std::env::var(LEVEL_ENV).ok().as_deref());
        match std::env::var(JSON_LOG_PATH_ENV) {
            Ok(raw) if !raw.trim().is_empty() => {
                let (dir, file_name) = log_file_location(Path::new(raw.trim()));
                let _ = std::fs::create_dir_all(&dir);
                let writer = tracing_appender::rolling::never(dir, file_name);
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
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
    fn parses_common_boolean_spellings() {
        assert_eq!(parse_bool_env(" ON "), Some(true));
        assert_eq!(parse_bool_env("0"), Some(false));
        assert_eq!(parse_bool_env("maybe"), None);
    }

    #[test]
    fn log_location_defaults_to_current_dir() {
        assert_eq!(
            log_file_location(Path::new("run.jsonl")),
            (PathBuf::from("."), "run.jsonl".to_string())
        );
        assert_eq!(
            log_file_location(Path::new("logs/app/run.jsonl")),
            (PathBuf::from("logs/app"), "run.jsonl".to_string())
        );
    }

    #[test]
    fn explicit_level_wins_over_default() {
        assert_eq!(env_filter(Some("debug")).to_string(), "debug");
    }

    #[test]
    fn init_is_idempotent() {
        init_observability();
        init_observability();
    }
}
