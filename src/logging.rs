use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::constants::{LOG_PREFIX_ERROR, LOG_PREFIX_SUCCESS, LOG_PREFIX_WARNING};

pub struct LogConfig {
    pub debug_enabled: bool,
}

static LOG_CONFIG: OnceLock<LogConfig> = OnceLock::new();

impl LogConfig {
    pub fn init(debug: bool) {
        LOG_CONFIG.get_or_init(|| LogConfig {
            debug_enabled: debug,
        });
    }

    pub fn get() -> &'static LogConfig {
        LOG_CONFIG.get().unwrap_or_else(|| {
            static FALLBACK: LogConfig = LogConfig {
                debug_enabled: false,
            };
            &FALLBACK
        })
    }
}

pub fn log_request(method: &str, url: &str, model: Option<&str>) {
    match model {
        Some(m) => log::info!(
            "{} {} (model: {})",
            method,
            sanitize_log_message(url),
            sanitize_log_message(m)
        ),
        None => log::info!("{} {}", method, sanitize_log_message(url)),
    }
}

pub fn log_timed(prefix: &str, operation: &str, start: Instant) {
    let duration = start.elapsed();
    let formatted_duration = format_duration(duration);

    match prefix {
        LOG_PREFIX_SUCCESS => log::info!("{} | {}", operation, formatted_duration),
        LOG_PREFIX_ERROR => log::error!("{} | {}", operation, formatted_duration),
        LOG_PREFIX_WARNING => log::warn!("{} | {}", operation, formatted_duration),
        _ => log::info!("{} | {}", operation, formatted_duration),
    }
}

pub fn format_duration(duration: Duration) -> String {
    let total_nanos = duration.as_nanos();

    if total_nanos < 1_000_000 {
        format!("{:.1}µs", total_nanos as f64 / 1_000.0)
    } else if total_nanos < 1_000_000_000 {
        format!("{:.2}ms", total_nanos as f64 / 1_000_000.0)
    } else {
        format!("{:.2}s", total_nanos as f64 / 1_000_000_000.0)
    }
}

pub fn sanitize_log_message(message: &str) -> String {
    message
        .chars()
        .map(|c| {
            if c.is_control() && !matches!(c, '\t' | '\n' | '\r') {
                '?'
            } else {
                c
            }
        })
        .collect()
}

/// Masks an API key for display, keeping only the last four characters.
pub fn mask_secret(secret: &str) -> String {
    let count = secret.chars().count();
    if count == 0 {
        return String::from("(not set)");
    }
    if count <= 4 {
        return "*".repeat(count);
    }
    let tail: String = secret.chars().skip(count - 4).collect();
    format!("{}{}", "*".repeat(count - 4), tail)
}

/// Dumps an outgoing payload when debug logging is on. The payload never
/// carries credentials; those travel in headers only.
pub fn log_payload(endpoint: &str, body: &serde_json::Value) {
    if LogConfig::get().debug_enabled {
        log::debug!(
            "{} request: {}",
            endpoint,
            serde_json::to_string_pretty(body).unwrap_or_default()
        );
    }
}

#[cfg(test)]
mod logging_tests {
    use super::*;

    #[test]
    fn formats_sub_millisecond_durations_in_micros() {
        assert_eq!(format_duration(Duration::from_micros(250)), "250.0µs");
    }

    #[test]
    fn formats_long_durations_in_seconds() {
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.50s");
    }

    #[test]
    fn control_characters_are_replaced() {
        assert_eq!(sanitize_log_message("a\u{1b}[31mb\n"), "a?[31mb\n");
    }

    #[test]
    fn secrets_keep_only_last_four_characters() {
        assert_eq!(mask_secret("sk-1234567890"), "*********7890");
        assert_eq!(mask_secret("abc"), "***");
        assert_eq!(mask_secret(""), "(not set)");
    }
}
