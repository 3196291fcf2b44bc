//! Tracker configuration loaded from environment variables.
//!
//! All settings have defaults so the tracker can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use parley_shared::constants::{
    DEFAULT_TRACKER_PORT, EVICT_AFTER_SECS, LIVENESS_TIMEOUT_SECS, PROBE_TIMEOUT_MS,
    SWEEP_INTERVAL_SECS,
};

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Env: `TRACKER_LISTEN_ADDR`
    /// Default: `0.0.0.0:12345`
    pub listen_addr: SocketAddr,

    /// SQLite file holding channel backups.
    /// Env: `TRACKER_DB_PATH`
    /// Default: `./data/tracker.db`
    pub db_path: PathBuf,

    /// Env: `SWEEP_INTERVAL_SECS`
    pub sweep_interval: Duration,

    /// A peer unseen for longer than this is probed by the sweep.
    /// Env: `LIVENESS_TIMEOUT_SECS`
    pub liveness_timeout: Duration,

    /// Unreachable (or explicitly offline) peers are dropped after this.
    /// Env: `EVICT_AFTER_SECS`
    pub evict_after: Duration,

    /// Bound on a single reachability probe.
    /// Env: `PROBE_TIMEOUT_MS`
    pub probe_timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            listen_addr: ([0, 0, 0, 0], DEFAULT_TRACKER_PORT).into(),
            db_path: PathBuf::from("./data/tracker.db"),
            sweep_interval: Duration::from_secs(SWEEP_INTERVAL_SECS),
            liveness_timeout: Duration::from_secs(LIVENESS_TIMEOUT_SECS),
            evict_after: Duration::from_secs(EVICT_AFTER_SECS),
            probe_timeout: Duration::from_millis(PROBE_TIMEOUT_MS),
        }
    }
}

impl TrackerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(addr) = parse_env::<SocketAddr>("TRACKER_LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Ok(path) = std::env::var("TRACKER_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(secs) = parse_env::<u64>("SWEEP_INTERVAL_SECS") {
            config.sweep_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = parse_env::<u64>("LIVENESS_TIMEOUT_SECS") {
            config.liveness_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env::<u64>("EVICT_AFTER_SECS") {
            config.evict_after = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_env::<u64>("PROBE_TIMEOUT_MS") {
            config.probe_timeout = Duration::from_millis(ms);
        }

        config
    }
}

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrackerConfig::default();
        assert_eq!(config.listen_addr.port(), 12345);
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
        assert_eq!(config.liveness_timeout, Duration::from_secs(90));
        assert_eq!(config.evict_after, Duration::from_secs(3600));
    }
}
