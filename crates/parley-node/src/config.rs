//! Node configuration loaded from environment variables.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use parley_shared::constants::{
    DEFAULT_NODE_PORT, DEFAULT_TRACKER_PORT, HEARTBEAT_INTERVAL_SECS, NET_TIMEOUT_MS,
    RECONCILE_INTERVAL_SECS,
};
use parley_store::Database;

/// Default bound on waiting for a host's pushed history reply.
pub const HISTORY_WAIT_MS: u64 = 3_000;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Env: `TRACKER_ADDR`
    /// Default: `127.0.0.1:12345`
    pub tracker_addr: SocketAddr,

    /// Address the inbound listener binds.
    /// Env: `NODE_LISTEN_ADDR`
    /// Default: `0.0.0.0:9001`
    pub listen_addr: SocketAddr,

    /// IP other nodes should dial; combined with the bound port.
    /// Env: `NODE_ADVERTISE_IP`
    /// Default: `127.0.0.1`
    pub advertise_ip: IpAddr,

    /// Directory holding the node database.
    /// Env: `NODE_DATA_DIR`
    /// Default: platform data dir, or `./data`
    pub data_dir: PathBuf,

    /// Log in automatically at startup.
    /// Env: `NODE_USERNAME`
    pub username: Option<String>,

    /// Env: `RECONCILE_INTERVAL_SECS`
    pub reconcile_interval: Duration,

    /// Env: `HEARTBEAT_INTERVAL_SECS`
    pub heartbeat_interval: Duration,

    /// Bound on any single outbound connection.
    /// Env: `NET_TIMEOUT_MS`
    pub net_timeout: Duration,

    /// Env: `HISTORY_WAIT_MS`
    pub history_wait: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            tracker_addr: ([127, 0, 0, 1], DEFAULT_TRACKER_PORT).into(),
            listen_addr: ([0, 0, 0, 0], DEFAULT_NODE_PORT).into(),
            advertise_ip: [127, 0, 0, 1].into(),
            data_dir: Database::default_data_dir().unwrap_or_else(|_| PathBuf::from("./data")),
            username: None,
            reconcile_interval: Duration::from_secs(RECONCILE_INTERVAL_SECS),
            heartbeat_interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
            net_timeout: Duration::from_millis(NET_TIMEOUT_MS),
            history_wait: Duration::from_millis(HISTORY_WAIT_MS),
        }
    }
}

impl NodeConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(addr) = parse_env::<SocketAddr>("TRACKER_ADDR") {
            config.tracker_addr = addr;
        }
        if let Some(addr) = parse_env::<SocketAddr>("NODE_LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Some(ip) = parse_env::<IpAddr>("NODE_ADVERTISE_IP") {
            config.advertise_ip = ip;
        }
        if let Ok(dir) = std::env::var("NODE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(name) = std::env::var("NODE_USERNAME") {
            let name = name.trim();
            if !name.is_empty() {
                config.username = Some(name.to_string());
            }
        }
        if let Some(secs) = parse_env::<u64>("RECONCILE_INTERVAL_SECS") {
            config.reconcile_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = parse_env::<u64>("HEARTBEAT_INTERVAL_SECS") {
            config.heartbeat_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(ms) = parse_env::<u64>("NET_TIMEOUT_MS") {
            config.net_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_env::<u64>("HISTORY_WAIT_MS") {
            config.history_wait = Duration::from_millis(ms);
        }

        config
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("node.db")
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
        let config = NodeConfig::default();
        assert_eq!(config.tracker_addr, "127.0.0.1:12345".parse().unwrap());
        assert_eq!(config.listen_addr.port(), 9001);
        assert_eq!(config.reconcile_interval, Duration::from_secs(60));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(15));
        assert!(config.db_path().ends_with("node.db"));
    }
}
