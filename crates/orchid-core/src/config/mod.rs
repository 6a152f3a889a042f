//! Sync and remote backend configuration.
//!
//! `SyncConfig` tunes the engine and worker; `RemoteConfig` locates the
//! Supabase REST endpoint. Both carry public values only.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_DEBOUNCE_MS: u64 = 750;
const DEFAULT_MAX_ATTEMPTS: u32 = 8;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 2_000;
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 10 * 60 * 1_000;
const DEFAULT_AUTH_RETRY_MULTIPLIER: u32 = 4;
const DEFAULT_CLOCK_SKEW_ALLOWANCE_MS: u64 = 5 * 60 * 1_000;
const DEFAULT_CONFLICT_LOG_LIMIT: usize = 1_000;

const SUPABASE_URL_ENV: &str = "SUPABASE_URL";
const SUPABASE_ANON_KEY_ENV: &str = "SUPABASE_ANON_KEY";

/// Tuning for the sync engine and background worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Quiet period after a local change before a background cycle starts
    pub debounce_ms: u64,
    /// Rejected pushes before background cycles stop retrying an entity
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Extra backoff factor for authorization failures
    pub auth_retry_multiplier: u32,
    /// Periodic background sync; `None` disables it
    pub sync_interval_secs: Option<u64>,
    /// Run the background worker at all
    pub auto_sync: bool,
    /// Background pulls fetch only rows changed since the last pull
    pub incremental_pull: bool,
    /// How far another device's clock may lag; incremental pulls re-read this window
    pub clock_skew_allowance_ms: u64,
    /// Resolved conflicts kept in the local log
    pub conflict_log_limit: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            auth_retry_multiplier: DEFAULT_AUTH_RETRY_MULTIPLIER,
            sync_interval_secs: None,
            auto_sync: true,
            incremental_pull: true,
            clock_skew_allowance_ms: DEFAULT_CLOCK_SKEW_ALLOWANCE_MS,
            conflict_log_limit: DEFAULT_CONFLICT_LOG_LIMIT,
        }
    }
}

impl SyncConfig {
    /// Parse from JSON; missing fields take defaults, unknown fields are rejected.
    pub fn from_json_str(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)
            .map_err(|error| Error::Config(format!("invalid sync config JSON: {error}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".to_string()));
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(Error::Config(
                "retry_base_delay_ms must not exceed retry_max_delay_ms".to_string(),
            ));
        }
        if self.auth_retry_multiplier == 0 {
            return Err(Error::Config(
                "auth_retry_multiplier must be at least 1".to_string(),
            ));
        }
        if self.conflict_log_limit == 0 {
            return Err(Error::Config(
                "conflict_log_limit must be at least 1".to_string(),
            ));
        }
        if self.sync_interval_secs == Some(0) {
            return Err(Error::Config(
                "sync_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = duration_millis(debounce);
        self
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.retry_base_delay_ms = duration_millis(base);
        self.retry_max_delay_ms = duration_millis(max);
        self
    }

    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval_secs = Some(interval.as_secs());
        self
    }

    #[must_use]
    pub const fn with_incremental_pull(mut self, incremental_pull: bool) -> Self {
        self.incremental_pull = incremental_pull;
        self
    }

    #[must_use]
    pub fn with_clock_skew_allowance(mut self, allowance: Duration) -> Self {
        self.clock_skew_allowance_ms = duration_millis(allowance);
        self
    }

    #[must_use]
    pub const fn with_conflict_log_limit(mut self, limit: usize) -> Self {
        self.conflict_log_limit = limit;
        self
    }

    /// Disable the background worker; only explicit syncs reach the remote.
    #[must_use]
    pub const fn without_auto_sync(mut self) -> Self {
        self.auto_sync = false;
        self
    }

    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub const fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub const fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    pub fn sync_interval(&self) -> Option<Duration> {
        self.sync_interval_secs.map(Duration::from_secs)
    }

    /// Overlap subtracted from the high-water mark of incremental pulls.
    ///
    /// Covers edits stamped by a lagging clock or saved while a cycle's
    /// debounce window was open.
    pub const fn pull_overlap(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.saturating_add(self.clock_skew_allowance_ms))
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Location of the Supabase project backing the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    pub supabase_url: String,
    pub anon_key: String,
}

impl RemoteConfig {
    pub fn new(supabase_url: impl AsRef<str>, anon_key: impl Into<String>) -> Result<Self> {
        let supabase_url = normalize_project_url(supabase_url.as_ref())?;
        let anon_key = anon_key.into().trim().to_string();
        if anon_key.is_empty() {
            return Err(Error::Config(
                "Supabase anon key must not be empty".to_string(),
            ));
        }
        Ok(Self {
            supabase_url,
            anon_key,
        })
    }

    /// Read `SUPABASE_URL` and `SUPABASE_ANON_KEY`.
    ///
    /// Returns `Ok(None)` when neither is set; setting only one is an error.
    pub fn from_env() -> Result<Option<Self>> {
        resolve_optional_remote_config(
            std::env::var(SUPABASE_URL_ENV).ok(),
            std::env::var(SUPABASE_ANON_KEY_ENV).ok(),
        )
    }

    /// PostgREST base URL (`{project}/rest/v1`)
    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.supabase_url)
    }
}

pub fn resolve_optional_remote_config(
    url: Option<String>,
    anon_key: Option<String>,
) -> Result<Option<RemoteConfig>> {
    let url = normalize_text_option(url);
    let anon_key = normalize_text_option(anon_key);

    match (url, anon_key) {
        (None, None) => Ok(None),
        (Some(url), Some(anon_key)) => RemoteConfig::new(url, anon_key).map(Some),
        _ => Err(Error::Config(
            "Supabase URL and anon key must be configured together".to_string(),
        )),
    }
}

fn normalize_project_url(url: &str) -> Result<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::Config("Supabase URL must not be empty".to_string()));
    }
    if !is_http_url(trimmed) {
        return Err(Error::Config(
            "Supabase URL must include http:// or https://".to_string(),
        ));
    }
    let trimmed = trimmed.strip_suffix("/rest/v1").unwrap_or(trimmed);
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sync_config_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.debounce(), Duration::from_millis(750));
        assert_eq!(config.max_attempts, 8);
        assert_eq!(config.retry_base_delay(), Duration::from_secs(2));
        assert_eq!(config.retry_max_delay(), Duration::from_secs(600));
        assert_eq!(config.sync_interval(), None);
        assert!(config.auto_sync);
        assert_eq!(config.conflict_log_limit, 1_000);
        assert_eq!(config.pull_overlap(), Duration::from_millis(300_750));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sync_config_pull_overlap_follows_debounce_and_skew() {
        let config = SyncConfig::default()
            .with_debounce(Duration::from_millis(200))
            .with_clock_skew_allowance(Duration::from_secs(30));
        assert_eq!(config.pull_overlap(), Duration::from_millis(30_200));

        let config =
            SyncConfig::from_json_str(r#"{"clock_skew_allowance_ms": 0, "conflict_log_limit": 5}"#)
                .unwrap();
        assert_eq!(config.pull_overlap(), Duration::from_millis(750));
        assert_eq!(config.conflict_log_limit, 5);
    }

    #[test]
    fn sync_config_json_fills_defaults() {
        let config = SyncConfig::from_json_str(r#"{"debounce_ms": 100, "sync_interval_secs": 300}"#)
            .unwrap();
        assert_eq!(config.debounce_ms, 100);
        assert_eq!(config.sync_interval(), Some(Duration::from_secs(300)));
        assert_eq!(config.max_attempts, 8);
    }

    #[test]
    fn sync_config_json_rejects_unknown_and_invalid() {
        assert!(SyncConfig::from_json_str(r#"{"debounce": 100}"#).is_err());
        assert!(SyncConfig::from_json_str(r#"{"max_attempts": 0}"#).is_err());
        assert!(SyncConfig::from_json_str(r#"{"conflict_log_limit": 0}"#).is_err());
        assert!(SyncConfig::from_json_str(
            r#"{"retry_base_delay_ms": 10, "retry_max_delay_ms": 1}"#
        )
        .is_err());
    }

    #[test]
    fn sync_config_builders() {
        let config = SyncConfig::default()
            .with_debounce(Duration::from_millis(20))
            .with_max_attempts(3)
            .with_retry_delays(Duration::from_secs(1), Duration::from_secs(8))
            .with_sync_interval(Duration::from_secs(60))
            .without_auto_sync();
        assert_eq!(config.debounce_ms, 20);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_max_delay_ms, 8_000);
        assert_eq!(config.sync_interval_secs, Some(60));
        assert!(!config.auto_sync);
    }

    #[test]
    fn remote_config_normalizes_url() {
        let config = RemoteConfig::new("https://demo.supabase.co/", " anon ").unwrap();
        assert_eq!(config.supabase_url, "https://demo.supabase.co");
        assert_eq!(config.anon_key, "anon");
        assert_eq!(config.rest_url(), "https://demo.supabase.co/rest/v1");

        let config = RemoteConfig::new("https://demo.supabase.co/rest/v1", "anon").unwrap();
        assert_eq!(config.rest_url(), "https://demo.supabase.co/rest/v1");
    }

    #[test]
    fn remote_config_rejects_invalid_values() {
        assert!(RemoteConfig::new("", "anon").is_err());
        assert!(RemoteConfig::new("demo.supabase.co", "anon").is_err());
        assert!(RemoteConfig::new("https://demo.supabase.co", "  ").is_err());
    }

    #[test]
    fn resolve_optional_remote_config_requires_both_values() {
        assert_eq!(resolve_optional_remote_config(None, None).unwrap(), None);
        assert!(resolve_optional_remote_config(Some("https://demo.supabase.co".to_string()), None)
            .is_err());
        let config = resolve_optional_remote_config(
            Some("https://demo.supabase.co".to_string()),
            Some("anon".to_string()),
        )
        .unwrap()
        .unwrap();
        assert_eq!(config.anon_key, "anon");
    }
}
