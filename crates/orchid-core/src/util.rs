//! Small helpers shared by config, auth and the remote stores.

const MAX_COMPACT_CHARS: usize = 180;

/// Trim an optional setting, treating blank values as unset.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .map(str::to_owned)
}

/// Whether `value` uses an HTTP(S) scheme.
pub fn is_http_url(value: &str) -> bool {
    ["http://", "https://"]
        .iter()
        .any(|scheme| value.starts_with(scheme))
}

/// Trim and cap a backend message so it fits on one log line.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(MAX_COMPACT_CHARS).collect()
}

/// Wall clock in Unix milliseconds; entity timestamps use this unit.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Wall clock in Unix seconds, as used by auth token expiry.
pub fn unix_timestamp_now() -> i64 {
    chrono::Utc::now().timestamp()
}
