//! Background reaper for idle slots.
//!
//! Runs periodically to free slots whose handshake or transfer has stalled,
//! and to evict idle rate-limiter entries.

use crate::config::CleanupConfig;
use crate::server::SlotRelay;
use crate::transport::Transport;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};

/// Spawn the background reaper.
///
/// Returns a handle that can be used to abort the task.
pub fn spawn_reaper_task<T: Transport + 'static>(
    relay: Arc<SlotRelay<T>>,
    config: CleanupConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if !config.enabled {
            tracing::info!("Reaper disabled");
            return;
        }

        let interval_secs = config.interval_secs.max(1);
        tracing::info!(
            "Reaper started (interval: {}s, idle timeout: {}s)",
            interval_secs,
            relay.config().slots.idle_timeout_secs
        );

        let mut timer = interval(Duration::from_secs(interval_secs));
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; nothing can be idle yet.
        timer.tick().await;

        loop {
            timer.tick().await;

            let reclaimed = relay.reap(Instant::now());
            if reclaimed > 0 {
                tracing::info!("Reaper: reclaimed {} idle slots", reclaimed);
            } else {
                tracing::debug!("Reaper: no idle slots");
            }
        }
    })
}
