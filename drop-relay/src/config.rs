//! Configuration loading for codedrop-relay.
//!
//! Configuration is loaded from a TOML file. Every field has a default, so an
//! empty file (or no file at all) gives a working relay.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for codedrop-relay.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Slot allocation configuration.
    #[serde(default)]
    pub slots: SlotsConfig,
    /// Rate limiting configuration.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// HTTP endpoints configuration.
    #[serde(default)]
    pub http: HttpConfig,
    /// Reaper task configuration.
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP/WebSocket listener (default: 0.0.0.0:8080).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Path clients open the WebSocket on (default: /ws).
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
}

/// Slot allocation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SlotsConfig {
    /// Seconds a claimed slot may sit idle before the reaper frees it (default: 60).
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Claim attempts before reporting exhaustion (default: 5).
    #[serde(default = "default_claim_attempts")]
    pub claim_attempts: u32,
    /// Base backoff between claim attempts in milliseconds, scaled by attempt
    /// number (default: 200).
    #[serde(default = "default_claim_backoff_ms")]
    pub claim_backoff_ms: u64,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum new connections per IP address per minute (default: 30).
    #[serde(default = "default_connections_per_ip")]
    pub connections_per_ip: u32,
    /// Maximum events per connection per minute (default: 6000).
    ///
    /// Transfers are chunked, so this is sized for streaming, not chat.
    #[serde(default = "default_messages_per_minute")]
    pub messages_per_minute: u32,
    /// Maximum events per second across all connections (default: 5000).
    #[serde(default = "default_global_requests_per_second")]
    pub global_requests_per_second: u32,
    /// Maximum simultaneously open connections (default: 10000).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Maximum size of one inbound frame in bytes (default: 16MB).
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Events queued per connection before senders to it wait (default: 16).
    #[serde(default = "default_outbound_queue_size")]
    pub outbound_queue_size: usize,
}

/// HTTP endpoints configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Enable metrics endpoint (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

/// Reaper task configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    /// Sweep interval in seconds (default: 180 = 3 minutes).
    #[serde(default = "default_cleanup_interval")]
    pub interval_secs: u64,
    /// Enable the reaper (default: true).
    #[serde(default = "default_cleanup_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_idle_timeout_secs() -> u64 {
    60
}

fn default_claim_attempts() -> u32 {
    5
}

fn default_claim_backoff_ms() -> u64 {
    200
}

fn default_connections_per_ip() -> u32 {
    30
}

fn default_messages_per_minute() -> u32 {
    6000
}

fn default_global_requests_per_second() -> u32 {
    5000
}

fn default_max_connections() -> usize {
    10_000
}

fn default_max_message_size() -> usize {
    16 * 1024 * 1024 // 16MB
}

fn default_outbound_queue_size() -> usize {
    crate::transport::DEFAULT_QUEUE_SIZE
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_cleanup_interval() -> u64 {
    180 // 3 minutes
}

fn default_cleanup_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            ws_path: default_ws_path(),
        }
    }
}

impl Default for SlotsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            claim_attempts: default_claim_attempts(),
            claim_backoff_ms: default_claim_backoff_ms(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            connections_per_ip: default_connections_per_ip(),
            messages_per_minute: default_messages_per_minute(),
            global_requests_per_second: default_global_requests_per_second(),
            max_connections: default_max_connections(),
            max_message_size: default_max_message_size(),
            outbound_queue_size: default_outbound_queue_size(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_cleanup_interval(),
            enabled: default_cleanup_enabled(),
        }
    }
}

impl SlotsConfig {
    /// Idle timeout as a Duration.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Backoff to wait after the given (1-based) failed claim attempt.
    pub fn claim_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.claim_backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
