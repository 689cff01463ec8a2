//! Rate limiting for codedrop-relay.
//!
//! Provides protection against connection flooding and event spam.
//!
//! ## Design Notes
//!
//! Connections are limited per remote IP address at upgrade time. Events are
//! limited per connection, plus one global limiter that caps aggregate load
//! even when every client is individually within its quota.
//!
//! All three use the governor crate; the keyed ones are backed by DashMap.

use crate::config::LimitsConfig;
use drop_types::ConnId;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

type KeyedLimiter<K> = RateLimiter<
    K,
    dashmap::DashMap<K, InMemoryState>,
    DefaultClock,
    NoOpMiddleware<governor::clock::QuantaInstant>,
>;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiters for the relay server.
#[derive(Clone)]
pub struct RateLimits {
    /// Limits new connections per remote IP (`limits.connections_per_ip`).
    connection_limiter: Arc<KeyedLimiter<IpAddr>>,

    /// Limits inbound events per connection (`limits.messages_per_minute`).
    message_limiter: Arc<KeyedLimiter<ConnId>>,

    /// Caps inbound events across all connections.
    global_limiter: Arc<DirectLimiter>,
}

impl std::fmt::Debug for RateLimits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimits")
            .field("connection_keys", &self.connection_limiter.len())
            .field("message_keys", &self.message_limiter.len())
            .field("global_limiter", &"DirectLimiter")
            .finish()
    }
}

/// Quota sizes of zero are treated as one.
fn at_least_one(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN)
}

impl RateLimits {
    /// Create rate limiters from configuration.
    pub fn new(config: &LimitsConfig) -> Self {
        let connection_quota = Quota::per_minute(at_least_one(config.connections_per_ip));
        let message_quota = Quota::per_minute(at_least_one(config.messages_per_minute));
        let global_quota = Quota::per_second(at_least_one(config.global_requests_per_second));

        Self {
            connection_limiter: Arc::new(RateLimiter::keyed(connection_quota)),
            message_limiter: Arc::new(RateLimiter::keyed(message_quota)),
            global_limiter: Arc::new(RateLimiter::direct(global_quota)),
        }
    }

    /// Check if a new connection from `ip` is allowed.
    pub fn check_connection(&self, ip: &IpAddr) -> Result<(), RateLimitError> {
        self.connection_limiter
            .check_key(ip)
            .map_err(|_| RateLimitError::ConnectionLimitExceeded)
    }

    /// Check if `conn` may send another event.
    pub fn check_message(&self, conn: &ConnId) -> Result<(), RateLimitError> {
        self.message_limiter
            .check_key(conn)
            .map_err(|_| RateLimitError::MessageLimitExceeded)
    }

    /// Check the server-wide event rate.
    pub fn check_global(&self) -> Result<(), RateLimitError> {
        self.global_limiter
            .check()
            .map_err(|_| RateLimitError::GlobalLimitExceeded)
    }

    /// Check both the per-connection and the global event limits.
    pub fn check_event(&self, conn: &ConnId) -> Result<(), RateLimitError> {
        self.check_message(conn)?;
        self.check_global()
    }

    /// Number of tracked connection keys (for metrics).
    pub fn connection_keys_count(&self) -> usize {
        self.connection_limiter.len()
    }

    /// Number of tracked message keys (for metrics).
    pub fn message_keys_count(&self) -> usize {
        self.message_limiter.len()
    }

    /// Evict entries whose cells have fully recharged.
    ///
    /// Closed connections and quiet IPs otherwise stay in the maps forever.
    /// Called periodically by the reaper.
    pub fn shrink(&self) {
        self.connection_limiter.retain_recent();
        self.message_limiter.retain_recent();
    }
}

/// Rate limit error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// Too many new connections from this IP.
    #[error("connection rate limit exceeded")]
    ConnectionLimitExceeded,
    /// Too many events from this connection.
    #[error("message rate limit exceeded")]
    MessageLimitExceeded,
    /// Too many events across all connections.
    #[error("global rate limit exceeded")]
    GlobalLimitExceeded,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn config(connections_per_ip: u32, messages_per_minute: u32, global: u32) -> LimitsConfig {
        LimitsConfig {
            connections_per_ip,
            messages_per_minute,
            global_requests_per_second: global,
            ..LimitsConfig::default()
        }
    }

    #[test]
    fn create_rate_limits() {
        let limits = RateLimits::new(&LimitsConfig::default());
        assert_eq!(limits.connection_keys_count(), 0);
        assert_eq!(limits.message_keys_count(), 0);
    }

    #[test]
    fn connection_limit_allows_within_quota() {
        let limits = RateLimits::new(&config(5, 100, 1000));
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));

        for _ in 0..5 {
            assert!(limits.check_connection(&ip).is_ok());
        }
        assert_eq!(
            limits.check_connection(&ip),
            Err(RateLimitError::ConnectionLimitExceeded)
        );
    }

    #[test]
    fn message_limit_allows_within_quota() {
        let limits = RateLimits::new(&config(100, 5, 1000));
        let conn = ConnId::random();

        for _ in 0..5 {
            assert!(limits.check_message(&conn).is_ok());
        }
        assert_eq!(
            limits.check_message(&conn),
            Err(RateLimitError::MessageLimitExceeded)
        );
    }

    #[test]
    fn different_keys_have_independent_limits() {
        let limits = RateLimits::new(&config(2, 2, 1000));
        let a = ConnId::random();
        let b = ConnId::random();

        assert!(limits.check_message(&a).is_ok());
        assert!(limits.check_message(&a).is_ok());
        assert!(limits.check_message(&a).is_err());

        assert!(limits.check_message(&b).is_ok());
        assert!(limits.check_message(&b).is_ok());
        assert!(limits.check_message(&b).is_err());
    }

    #[test]
    fn global_rate_limiter_rejects_excess() {
        let limits = RateLimits::new(&config(100, 100, 5));

        for _ in 0..5 {
            assert!(limits.check_event(&ConnId::random()).is_ok());
        }
        assert_eq!(
            limits.check_event(&ConnId::random()),
            Err(RateLimitError::GlobalLimitExceeded)
        );
    }

    #[test]
    fn zero_quota_still_admits_one() {
        let limits = RateLimits::new(&config(0, 0, 0));
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        assert!(limits.check_connection(&ip).is_ok());
        assert!(limits.check_connection(&ip).is_err());
    }

    #[test]
    fn rate_limits_are_debug() {
        let limits = RateLimits::new(&LimitsConfig::default());
        let debug = format!("{:?}", limits);
        assert!(debug.contains("RateLimits"));
    }

    #[test]
    fn rate_limit_error_display() {
        assert_eq!(
            RateLimitError::ConnectionLimitExceeded.to_string(),
            "connection rate limit exceeded"
        );
        assert_eq!(
            RateLimitError::GlobalLimitExceeded.to_string(),
            "global rate limit exceeded"
        );
    }

    #[test]
    fn shrink_keeps_limiter_usable() {
        let limits = RateLimits::new(&LimitsConfig::default());
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let conn = ConnId::random();
        let _ = limits.check_connection(&ip);
        let _ = limits.check_message(&conn);
        assert!(limits.connection_keys_count() > 0);

        limits.shrink();
        assert!(limits.check_message(&conn).is_ok());
    }
}
