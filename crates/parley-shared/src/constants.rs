/// Application name
pub const APP_NAME: &str = "Parley";

/// Label used for unauthenticated users. Never a channel member.
pub const VISITOR: &str = "visitor";

/// Default tracker TCP port
pub const DEFAULT_TRACKER_PORT: u16 = 12345;

/// Default node listener TCP port
pub const DEFAULT_NODE_PORT: u16 = 9001;

/// Maximum length of a single wire frame (one line) in bytes (16 MiB).
/// Large enough for a full channel history reply.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Tracker liveness sweep interval in seconds
pub const SWEEP_INTERVAL_SECS: u64 = 30;

/// A peer unseen for this long is re-probed by the sweep
pub const LIVENESS_TIMEOUT_SECS: u64 = 90;

/// A peer unreachable for this long is evicted from the registry
pub const EVICT_AFTER_SECS: u64 = 60 * 60;

/// Node reconciliation timer in seconds
pub const RECONCILE_INTERVAL_SECS: u64 = 60;

/// Node heartbeat (re-registration) interval in seconds
pub const HEARTBEAT_INTERVAL_SECS: u64 = 15;

/// Default bound for a single outbound network attempt, in milliseconds
pub const NET_TIMEOUT_MS: u64 = 3_000;

/// Default bound for a tracker reachability probe, in milliseconds
pub const PROBE_TIMEOUT_MS: u64 = 2_000;
