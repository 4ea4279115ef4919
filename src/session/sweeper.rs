//! Background expiry sweep.
//!
//! One task per server walks every shard on a fixed period and removes
//! records that outlived the TTL. Lookups evict lazily as well, so the sweep
//! only bounds memory held by codes nobody asks about again.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::session::registry::SessionRegistry;
use crate::utils::metrics::Timer;

/// Spawn the sweep loop. The first pass runs one `period` after start; the
/// task exits as soon as `shutdown` is cancelled.
pub fn spawn_sweeper(
    registry: Arc<SessionRegistry>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(period_ms = period.as_millis() as u64, "Session sweeper started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Session sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let _timer = Timer::start("session_sweep");
                    let removed = registry.sweep();
                    if removed > 0 {
                        debug!(removed, remaining = registry.stats().total_entries, "Expired sessions swept");
                    }
                }
            }
        }
    })
}
