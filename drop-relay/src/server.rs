//! Main SlotRelay server coordination.
//!
//! SlotRelay owns the pairing state machine, turns inbound events into
//! transitions, and delivers the resulting outbound events through its
//! [`Transport`]. It is the only place that does I/O on behalf of the core,
//! and it does so after the pairing lock has been released.

use crate::config::Config;
use crate::error::{ClientError, ClientResult};
use crate::limits::RateLimits;
use crate::pairing::{Claimed, Pairing, PairingStats, Vacated};
use crate::transport::Transport;
use drop_types::{ConnId, Inbound, Outbound, Payload};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Operational metrics for monitoring relay activity.
///
/// All counters are monotonically increasing (reset only on restart).
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Total WebSocket connections accepted.
    pub connections_total: AtomicU64,
    /// Total slots handed out.
    pub claims_total: AtomicU64,
    /// Total successful joins.
    pub joins_total: AtomicU64,
    /// Total chunks forwarded to a receiver.
    pub transmissions_total: AtomicU64,
    /// Total payload bytes forwarded.
    pub bytes_relayed: AtomicU64,
    /// Total transfers the receiver confirmed.
    pub completions_total: AtomicU64,
    /// Total slots freed because a participant left or moved on.
    pub disconnect_releases_total: AtomicU64,
    /// Total slots freed by the reaper.
    pub reclaimed_total: AtomicU64,
    /// Total claims that gave up after retrying.
    pub exhausted_total: AtomicU64,
    /// Total rate limit rejections (connection + message + global).
    pub rate_limit_hits: AtomicU64,
    /// Total `servererror` events sent.
    pub errors_total: AtomicU64,
}

impl RelayMetrics {
    fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Main relay server.
pub struct SlotRelay<T: Transport> {
    config: Config,
    pairing: Pairing,
    transport: Arc<T>,
    /// Rate limiters for connections and events.
    rate_limits: RateLimits,
    /// Operational metrics (counters).
    metrics: RelayMetrics,
    /// Connections admitted and not yet closed.
    admitted: AtomicUsize,
}

/// A reserved connection place, released on drop.
pub struct Admission<T: Transport> {
    relay: Arc<SlotRelay<T>>,
}

impl<T: Transport> Drop for Admission<T> {
    fn drop(&mut self) {
        self.relay.admitted.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<T: Transport> std::fmt::Debug for SlotRelay<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotRelay")
            .field("config", &self.config)
            .field("rate_limits", &self.rate_limits)
            .field("metrics", &self.metrics)
            .field("stats", &self.pairing.stats())
            .finish_non_exhaustive()
    }
}

impl<T: Transport> SlotRelay<T> {
    /// Create a relay over the full code space.
    pub fn new(config: Config, transport: Arc<T>) -> Self {
        Self::with_pairing(config, Pairing::new(), transport)
    }

    /// Create a relay over an existing pairing state machine.
    pub fn with_pairing(config: Config, pairing: Pairing, transport: Arc<T>) -> Self {
        let rate_limits = RateLimits::new(&config.limits);
        Self {
            config,
            pairing,
            transport,
            rate_limits,
            metrics: RelayMetrics::default(),
            admitted: AtomicUsize::new(0),
        }
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the transport events are delivered through.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Get the pairing state machine.
    pub fn pairing(&self) -> &Pairing {
        &self.pairing
    }

    /// Get access to the rate limiters.
    pub fn rate_limits(&self) -> &RateLimits {
        &self.rate_limits
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Slot and session counts.
    pub fn stats(&self) -> PairingStats {
        self.pairing.stats()
    }

    /// Number of live connections.
    pub fn active_connections(&self) -> usize {
        self.transport.connection_count()
    }

    /// Number of connections holding an [`Admission`].
    pub fn admitted_connections(&self) -> usize {
        self.admitted.load(Ordering::Acquire)
    }

    /// Reserve one of `limits.max_connections` places for a new connection.
    ///
    /// Returns `None` when the relay is full. The place is given back when
    /// the returned [`Admission`] is dropped.
    pub fn try_admit(self: &Arc<Self>) -> Option<Admission<T>> {
        let max = self.config.limits.max_connections;
        self.admitted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()?;
        Some(Admission {
            relay: Arc::clone(self),
        })
    }

    /// Handle one event from `conn`.
    ///
    /// Failures are reported to `conn` as `servererror` and never affect
    /// any other connection's slot.
    pub async fn dispatch(&self, conn: ConnId, event: Inbound) {
        // got_all is not rate limited (completion must always go through)
        if !matches!(event, Inbound::GotAll) {
            if let Err(e) = self.rate_limits.check_event(&conn) {
                tracing::warn!("Rate limited {:?} on {}: {}", conn, event.name(), e);
                RelayMetrics::incr(&self.metrics.rate_limit_hits);
                self.reject(conn, ClientError::RateLimited).await;
                return;
            }
        }

        let outcome = match event {
            Inbound::RequestSlot => self.request_slot(conn).await,
            Inbound::RequestFromSlot { slot } => self.request_from_slot(conn, slot).await,
            Inbound::Transmission(payload) => self.transmission(conn, payload).await,
            Inbound::GotAll => self.got_all(conn).await,
        };

        if let Err(e) = outcome {
            self.reject(conn, e).await;
        }
    }

    /// Claim a slot for `conn`, retrying while the code space is exhausted.
    ///
    /// Makes up to `slots.claim_attempts` attempts with a linearly growing
    /// backoff between them. The pairing lock is not held while waiting.
    pub async fn claim(&self, conn: ConnId) -> ClientResult<Claimed> {
        let attempts = self.config.slots.claim_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.pairing.claim(conn) {
                Ok(claimed) => return Ok(claimed),
                Err(e) if attempt >= attempts => {
                    tracing::warn!(
                        "Claim for {:?} failed after {} attempts: {}",
                        conn,
                        attempts,
                        e
                    );
                    RelayMetrics::incr(&self.metrics.exhausted_total);
                    return Err(ClientError::SlotsExhausted);
                }
                Err(e) => {
                    let backoff = self.config.slots.claim_backoff(attempt);
                    tracing::debug!(
                        "Claim attempt {} for {:?} failed ({}), retrying in {:?}",
                        attempt,
                        conn,
                        e,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// `conn` went away: free its slot and tell the peer.
    pub async fn disconnect(&self, conn: ConnId) {
        let vacated = self.pairing.disconnect(conn);
        self.notify_vacated(vacated).await;
    }

    /// Free every slot idle past `slots.idle_timeout_secs` at `now`.
    ///
    /// Returns the number of slots reclaimed. Participants of a reclaimed
    /// slot are not notified; their next event gets `old_slot`.
    pub fn reap(&self, now: Instant) -> usize {
        let reclaimed = self
            .pairing
            .sweep_expired(now, self.config.slots.idle_timeout());
        self.rate_limits.shrink();

        for released in &reclaimed {
            tracing::info!("Slot {} idle too long; reclaiming it", released.code);
        }
        self.metrics
            .reclaimed_total
            .fetch_add(reclaimed.len() as u64, Ordering::Relaxed);
        reclaimed.len()
    }

    /// Report `error` to `conn` as a `servererror` event.
    pub async fn reject(&self, conn: ConnId, error: ClientError) {
        tracing::warn!("Client error for {:?}: {} ({})", conn, error, error.code());
        RelayMetrics::incr(&self.metrics.errors_total);
        self.deliver(conn, error.to_outbound()).await;
    }

    async fn request_slot(&self, conn: ConnId) -> ClientResult<()> {
        let claimed = self.claim(conn).await?;
        RelayMetrics::incr(&self.metrics.claims_total);

        self.notify_vacated(claimed.vacated).await;
        self.deliver(conn, Outbound::SlotAnswer { slot: claimed.code })
            .await;
        Ok(())
    }

    async fn request_from_slot(&self, conn: ConnId, slot: Option<String>) -> ClientResult<()> {
        let joined = self.pairing.join(conn, slot.as_deref())?;
        RelayMetrics::incr(&self.metrics.joins_total);

        self.notify_vacated(joined.vacated).await;
        self.deliver(joined.sender, Outbound::TransmitNow).await;
        Ok(())
    }

    async fn transmission(&self, conn: ConnId, payload: Payload) -> ClientResult<()> {
        let receiver = self.pairing.relay(conn)?;
        let bytes = payload.len() as u64;

        tracing::debug!("Relaying {} bytes from {:?} to {:?}", bytes, conn, receiver);
        RelayMetrics::incr(&self.metrics.transmissions_total);
        self.metrics
            .bytes_relayed
            .fetch_add(bytes, Ordering::Relaxed);

        self.deliver(receiver, Outbound::Transmission(payload)).await;
        Ok(())
    }

    async fn got_all(&self, conn: ConnId) -> ClientResult<()> {
        let completed = self.pairing.complete(conn)?;
        RelayMetrics::incr(&self.metrics.completions_total);

        self.deliver(completed.sender, Outbound::GotAll).await;
        Ok(())
    }

    async fn notify_vacated(&self, vacated: Option<Vacated>) {
        let Some(vacated) = vacated else {
            return;
        };
        RelayMetrics::incr(&self.metrics.disconnect_releases_total);

        if let Some(peer) = vacated.peer {
            tracing::info!("Telling {:?} its peer on slot {} left", peer, vacated.code);
            RelayMetrics::incr(&self.metrics.errors_total);
            self.deliver(peer, ClientError::PeerDisconnected.to_outbound())
                .await;
        }
    }

    /// Send `event` to `conn`. Failures are logged, never propagated.
    async fn deliver(&self, conn: ConnId, event: Outbound) {
        let name = event.name();
        if let Err(e) = self.transport.send(conn, event).await {
            tracing::debug!("Failed to deliver {} to {:?}: {}", name, conn, e);
        }
    }
}
