//! Token refresh configuration sourced from environment variables.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_REFRESH_INTERVAL_MINUTES: u64 = 45;
pub const DEFAULT_REFRESH_BUFFER_MINUTES: u64 = 5;
pub const DEFAULT_REFRESH_TIMEOUT_SECONDS: u64 = 30;

pub const ENV_REFRESH_INTERVAL: &str = "TOKEN_REFRESH_INTERVAL_MINUTES";
pub const ENV_REFRESH_BUFFER: &str = "TOKEN_REFRESH_BUFFER_MINUTES";
pub const ENV_REFRESH_TIMEOUT: &str = "TOKEN_REFRESH_TIMEOUT_SECONDS";
pub const ENV_REFRESH_ENABLED: &str = "TOKEN_REFRESH_ENABLED";

/// Automatic token refresh settings.
///
/// Snapshots of this struct are immutable; the token service mutates its
/// copy only through `update_refresh_config`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRefreshConfig {
    /// Interval between scheduled refreshes, in minutes.
    pub refresh_interval_minutes: u64,
    /// Safety margin before expiry at which a token counts as stale, in minutes.
    pub refresh_buffer_minutes: u64,
    /// Upper bound on how long a silent refresh may take, in seconds.
    pub refresh_timeout_seconds: u64,
    /// Whether automatic refresh is active at all.
    pub enabled: bool,
}

impl Default for TokenRefreshConfig {
    fn default() -> Self {
        Self {
            refresh_interval_minutes: DEFAULT_REFRESH_INTERVAL_MINUTES,
            refresh_buffer_minutes: DEFAULT_REFRESH_BUFFER_MINUTES,
            refresh_timeout_seconds: DEFAULT_REFRESH_TIMEOUT_SECONDS,
            enabled: true,
        }
    }
}

impl TokenRefreshConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary lookup function.
    ///
    /// Validation falls back in a cascade: a bad interval discards all three
    /// numeric values, a bad buffer discards buffer and timeout, a bad
    /// timeout discards only the timeout. `enabled` is carried through every
    /// branch untouched.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        // An unset variable takes its default; a set-but-unparsable one is
        // treated as out of range so it hits the warning path below.
        let parse = |key: &str, default: i64| -> i64 {
            match lookup(key) {
                None => default,
                Some(raw) => raw.trim().parse().unwrap_or(-1),
            }
        };

        let interval = parse(ENV_REFRESH_INTERVAL, DEFAULT_REFRESH_INTERVAL_MINUTES as i64);
        let buffer = parse(ENV_REFRESH_BUFFER, DEFAULT_REFRESH_BUFFER_MINUTES as i64);
        let timeout = parse(ENV_REFRESH_TIMEOUT, DEFAULT_REFRESH_TIMEOUT_SECONDS as i64);
        let enabled = lookup(ENV_REFRESH_ENABLED)
            .map(|raw| raw.trim() != "false")
            .unwrap_or(true);

        Self::from_candidates(interval, buffer, timeout, enabled)
    }

    /// Apply the validation cascade to candidate values. Out-of-range
    /// values are treated exactly like invalid environment input.
    fn from_candidates(interval: i64, buffer: i64, timeout: i64, enabled: bool) -> Self {
        if !(1..=1440).contains(&interval) {
            log::warn!(
                "Invalid refresh interval: {interval}. Using default: {DEFAULT_REFRESH_INTERVAL_MINUTES} minutes"
            );
            return Self {
                enabled,
                ..Self::default()
            };
        }

        if !(0..interval).contains(&buffer) {
            log::warn!(
                "Invalid refresh buffer: {buffer}. Using default: {DEFAULT_REFRESH_BUFFER_MINUTES} minutes"
            );
            return Self {
                refresh_interval_minutes: interval as u64,
                refresh_buffer_minutes: DEFAULT_REFRESH_BUFFER_MINUTES,
                refresh_timeout_seconds: DEFAULT_REFRESH_TIMEOUT_SECONDS,
                enabled,
            };
        }

        if !(5..=120).contains(&timeout) {
            log::warn!(
                "Invalid refresh timeout: {timeout}. Using default: {DEFAULT_REFRESH_TIMEOUT_SECONDS} seconds"
            );
            return Self {
                refresh_interval_minutes: interval as u64,
                refresh_buffer_minutes: buffer as u64,
                refresh_timeout_seconds: DEFAULT_REFRESH_TIMEOUT_SECONDS,
                enabled,
            };
        }

        Self {
            refresh_interval_minutes: interval as u64,
            refresh_buffer_minutes: buffer as u64,
            refresh_timeout_seconds: timeout as u64,
            enabled,
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_minutes * 60)
    }

    pub fn refresh_buffer(&self) -> Duration {
        Duration::from_secs(self.refresh_buffer_minutes * 60)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_seconds)
    }

    /// Merge a partial update into this config, returning the result.
    ///
    /// The merged values go through the same validation cascade as
    /// environment input, so an out-of-range update falls back to defaults
    /// rather than arming absurd timers.
    pub fn merged(&self, update: &TokenRefreshConfigUpdate) -> Self {
        let candidate = |value: Option<u64>, current: u64| -> i64 {
            i64::try_from(value.unwrap_or(current)).unwrap_or(-1)
        };

        Self::from_candidates(
            candidate(update.refresh_interval_minutes, self.refresh_interval_minutes),
            candidate(update.refresh_buffer_minutes, self.refresh_buffer_minutes),
            candidate(update.refresh_timeout_seconds, self.refresh_timeout_seconds),
            update.enabled.unwrap_or(self.enabled),
        )
    }
}

/// Partial configuration update; `None` fields keep their current value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenRefreshConfigUpdate {
    pub refresh_interval_minutes: Option<u64>,
    pub refresh_buffer_minutes: Option<u64>,
    pub refresh_timeout_seconds: Option<u64>,
    pub enabled: Option<bool>,
}
