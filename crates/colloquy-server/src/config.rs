//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use colloquy_shared::constants::{
    DEFAULT_HEARTBEAT_INTERVAL_SECS, DEFAULT_HEARTBEAT_TIMEOUT_SECS, DEFAULT_MAX_UPLOAD_SIZE,
    DEFAULT_TOKEN_TTL_DAYS,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:5000`
    pub http_addr: SocketAddr,

    /// Filesystem path of the SQLite database.
    /// Env: `DATABASE_PATH`
    /// Default: `./colloquy.db`
    pub database_path: PathBuf,

    /// Filesystem path where image attachments are stored.
    /// Env: `MEDIA_STORAGE_PATH`
    /// Default: `./media`
    pub media_storage_path: PathBuf,

    /// Ed25519 seed for signing bearer tokens (hex-encoded, 64 chars).
    /// Env: `TOKEN_KEY`
    /// Default: none (a fresh key is generated at startup; tokens do not
    /// survive a restart).
    pub token_key: Option<[u8; 32]>,

    /// Bearer token validity.
    /// Env: `TOKEN_TTL_DAYS`
    /// Default: 7 days.
    pub token_ttl: chrono::Duration,

    /// A session with no inbound frame for this long is evicted.
    /// Env: `HEARTBEAT_TIMEOUT_SECS`
    /// Default: 60.
    pub heartbeat_timeout: Duration,

    /// Interval between server-initiated pings.
    /// Env: `HEARTBEAT_INTERVAL_SECS`
    /// Default: 25.
    pub heartbeat_interval: Duration,

    /// Maximum accepted image upload size in bytes.
    /// Env: `MAX_UPLOAD_SIZE`
    /// Default: 10 MiB.
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 5000).into(),
            database_path: PathBuf::from("./colloquy.db"),
            media_storage_path: PathBuf::from("./media"),
            token_key: None,
            token_ttl: chrono::Duration::days(DEFAULT_TOKEN_TTL_DAYS),
            heartbeat_timeout: Duration::from_secs(DEFAULT_HEARTBEAT_TIMEOUT_SECS),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS),
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.  Invalid values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("MEDIA_STORAGE_PATH") {
            config.media_storage_path = PathBuf::from(path);
        }

        if let Ok(hex_key) = std::env::var("TOKEN_KEY") {
            match parse_hex_seed(&hex_key) {
                Ok(key) => config.token_key = Some(key),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Invalid TOKEN_KEY, generating an ephemeral key"
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("TOKEN_TTL_DAYS") {
            match val.parse::<i64>() {
                Ok(days) if days > 0 => config.token_ttl = chrono::Duration::days(days),
                _ => tracing::warn!(value = %val, "Invalid TOKEN_TTL_DAYS, using default"),
            }
        }

        if let Some(secs) = parse_secs_var("HEARTBEAT_TIMEOUT_SECS") {
            config.heartbeat_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_secs_var("HEARTBEAT_INTERVAL_SECS") {
            config.heartbeat_interval = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("MAX_UPLOAD_SIZE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_upload_size = n,
                _ => tracing::warn!(value = %val, "Invalid MAX_UPLOAD_SIZE, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn parse_secs_var(name: &str) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    match val.parse::<u64>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            tracing::warn!(var = name, value = %val, "Invalid duration, using default");
            None
        }
    }
}

/// Parse a 64-character hex string into a 32-byte array.
fn parse_hex_seed(hex_str: &str) -> Result<[u8; 32], String> {
    let hex_str = hex_str.trim();
    if hex_str.len() != 64 {
        return Err(format!("expected 64 hex chars, got {}", hex_str.len()));
    }

    let bytes = hex::decode(hex_str).map_err(|e| e.to_string())?;
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&bytes);
    Ok(seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 5000).into());
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(60));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(25));
        assert!(config.token_key.is_none());
    }

    #[test]
    fn test_parse_hex_seed() {
        let hex_str = "ab".repeat(32);
        let seed = parse_hex_seed(&hex_str).unwrap();
        assert_eq!(seed, [0xab; 32]);
    }

    #[test]
    fn test_parse_hex_seed_wrong_length() {
        assert!(parse_hex_seed("abcd").is_err());
    }
}
