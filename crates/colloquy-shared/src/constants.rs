//! Protocol-level constants shared by server and clients.

/// Seconds without any inbound frame before a session is considered dead.
pub const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 60;

/// Interval in seconds between server-initiated pings.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 25;

/// Maximum accepted image upload size (10 MiB).
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Default bearer token validity in days.
pub const DEFAULT_TOKEN_TTL_DAYS: i64 = 7;
