//! Scheduling knobs for a sync engine.

use std::time::Duration;

use serde::Deserialize;

use crate::SyncError;

/// Configuration for a [`SyncEngine`](super::SyncEngine).
///
/// Deserializable so hosts can keep it next to the rest of their config;
/// `from_env` covers the common case of tuning a deployment without code.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Fallback poll period for missed push notifications. `0` disables polling.
    pub poll_interval_ms: u64,
    /// Quiet period after a change notification before refreshing, so a
    /// burst of notifications collapses into one read.
    pub notify_debounce_ms: u64,
    /// Whether to register with the store's change feed.
    pub subscribe: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            poll_interval_ms: 30_000,
            notify_debounce_ms: 250,
            subscribe: true,
        }
    }
}

impl SyncOptions {
    pub const ENV_POLL_INTERVAL_MS: &'static str = "FUNNEL_SYNC_POLL_INTERVAL_MS";
    pub const ENV_NOTIFY_DEBOUNCE_MS: &'static str = "FUNNEL_SYNC_NOTIFY_DEBOUNCE_MS";
    pub const ENV_SUBSCRIBE: &'static str = "FUNNEL_SYNC_SUBSCRIBE";

    /// Options with no background work at all: refreshes happen only when
    /// called explicitly.
    pub fn manual() -> Self {
        Self {
            poll_interval_ms: 0,
            notify_debounce_ms: 0,
            subscribe: false,
        }
    }

    /// Defaults overridden by `FUNNEL_SYNC_*` environment variables.
    pub fn from_env() -> Result<Self, SyncError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SyncError> {
        let mut options = Self::default();
        if let Some(raw) = lookup(Self::ENV_POLL_INTERVAL_MS) {
            options.poll_interval_ms = parse_millis(Self::ENV_POLL_INTERVAL_MS, &raw)?;
        }
        if let Some(raw) = lookup(Self::ENV_NOTIFY_DEBOUNCE_MS) {
            options.notify_debounce_ms = parse_millis(Self::ENV_NOTIFY_DEBOUNCE_MS, &raw)?;
        }
        if let Some(raw) = lookup(Self::ENV_SUBSCRIBE) {
            options.subscribe = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(SyncError::Validation(format!(
                        "{} must be a boolean, got {:?}",
                        Self::ENV_SUBSCRIBE,
                        other
                    )))
                }
            };
        }
        Ok(options)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_notify_debounce(mut self, debounce: Duration) -> Self {
        self.notify_debounce_ms = debounce.as_millis() as u64;
        self
    }

    pub fn with_subscribe(mut self, subscribe: bool) -> Self {
        self.subscribe = subscribe;
        self
    }

    /// Poll period, or `None` when polling is disabled.
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_ms > 0).then(|| Duration::from_millis(self.poll_interval_ms))
    }

    pub fn notify_debounce(&self) -> Duration {
        Duration::from_millis(self.notify_debounce_ms)
    }
}

fn parse_millis(key: &str, raw: &str) -> Result<u64, SyncError> {
    raw.trim().parse().map_err(|_| {
        SyncError::Validation(format!("{} must be milliseconds, got {:?}", key, raw))
    })
}
