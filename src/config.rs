use std::time::Duration;

use serde::Deserialize;

use crate::limits::MAX_BULK_SPAN_DAYS;

/// Engine tunables. Hosts either build this directly, deserialize it from
/// their own config file, or take the `RATEGRID_*` environment overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Fixed delay between stream reconnect attempts.
    pub reconnect_interval: Duration,
    /// Reconnect attempts before the supervisor parks in `Disconnected`.
    pub max_reconnect_attempts: u32,
    /// Stream inactivity bound; any event (heartbeats included) resets it.
    pub heartbeat_timeout: Duration,
    /// How long a surfaced cell error stays visible before the reaper
    /// clears it.
    pub error_display_ttl: Duration,
    /// Widest date span one bulk selection may cover. Never above
    /// `limits::MAX_BULK_SPAN_DAYS`.
    pub max_bulk_span_days: usize,
    /// When set, an unreachable bulk validator blocks execution instead of
    /// degrading to a local rooms × days estimate.
    pub strict_bulk_validation: bool,
    /// Capacity of the per-room change broadcast channels.
    pub event_channel_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_secs(5),
            max_reconnect_attempts: 5,
            heartbeat_timeout: Duration::from_secs(30),
            error_display_ttl: Duration::from_secs(10),
            max_bulk_span_days: MAX_BULK_SPAN_DAYS,
            strict_bulk_validation: false,
            event_channel_capacity: 256,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.reconnect_interval.is_zero() {
            return Err("reconnect_interval must be non-zero");
        }
        if self.heartbeat_timeout.is_zero() {
            return Err("heartbeat_timeout must be non-zero");
        }
        if self.error_display_ttl.is_zero() {
            return Err("error_display_ttl must be non-zero");
        }
        if self.max_bulk_span_days == 0 || self.max_bulk_span_days > MAX_BULK_SPAN_DAYS {
            return Err("max_bulk_span_days out of range");
        }
        if self.event_channel_capacity == 0 {
            return Err("event_channel_capacity must be non-zero");
        }
        Ok(())
    }

    /// Defaults overridden by `RATEGRID_*` environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(ms) = env_parse::<u64>("RATEGRID_RECONNECT_INTERVAL_MS") {
            cfg.reconnect_interval = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse("RATEGRID_MAX_RECONNECT_ATTEMPTS") {
            cfg.max_reconnect_attempts = n;
        }
        if let Some(ms) = env_parse::<u64>("RATEGRID_HEARTBEAT_TIMEOUT_MS") {
            cfg.heartbeat_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("RATEGRID_ERROR_DISPLAY_TTL_MS") {
            cfg.error_display_ttl = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse("RATEGRID_MAX_BULK_SPAN_DAYS") {
            cfg.max_bulk_span_days = n;
        }
        if let Some(b) = env_parse("RATEGRID_STRICT_BULK_VALIDATION") {
            cfg.strict_bulk_validation = b;
        }
        if let Some(n) = env_parse("RATEGRID_EVENT_CHANNEL_CAPACITY") {
            cfg.event_channel_capacity = n;
        }
        cfg
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
