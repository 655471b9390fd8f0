//! Periodic compaction of the window store.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::limiter::RateLimiter;
use super::store::CompactionStats;
use super::window::{duration_millis, now_millis, TimeWindow, Timestamp};

/// Scheduling and retention settings for the compactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactorConfig {
    /// Time between sweeps.
    pub interval: Duration,
    /// How long per-origin timestamps are kept.
    pub origin_retention: Duration,
    /// How long global timestamps are kept.
    pub global_retention: Duration,
}

impl Default for CompactorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            origin_retention: TimeWindow::Hour.duration(),
            global_retention: TimeWindow::Minute.duration(),
        }
    }
}

/// Background task that bounds the memory held by the limiter.
///
/// Session counters are never touched; only sliding-window timestamps expire.
pub struct Compactor {
    limiter: Arc<RateLimiter>,
    config: CompactorConfig,
}

impl Compactor {
    /// Create a compactor for a limiter.
    ///
    /// Retention shorter than the window a tier reads would undercount, so it
    /// is raised to that window.
    pub fn new(limiter: Arc<RateLimiter>, mut config: CompactorConfig) -> Self {
        if config.origin_retention < TimeWindow::Hour.duration() {
            warn!(
                configured = ?config.origin_retention,
                "Origin retention is shorter than the hourly window, using one hour"
            );
            config.origin_retention = TimeWindow::Hour.duration();
        }
        if config.global_retention < TimeWindow::Minute.duration() {
            warn!(
                configured = ?config.global_retention,
                "Global retention is shorter than the minute window, using one minute"
            );
            config.global_retention = TimeWindow::Minute.duration();
        }
        if config.interval.is_zero() {
            warn!("Compaction interval is zero, using the default");
            config.interval = CompactorConfig::default().interval;
        }

        Self { limiter, config }
    }

    /// The effective configuration.
    pub fn config(&self) -> &CompactorConfig {
        &self.config
    }

    /// Run a single sweep as of `now`.
    pub fn run_once(&self, now: Timestamp) -> CompactionStats {
        let stats = self.limiter.store().prune(
            now,
            duration_millis(self.config.origin_retention),
            duration_millis(self.config.global_retention),
        );

        debug!(
            pruned = stats.pruned_timestamps,
            removed_origins = stats.removed_origins,
            retained_origins = stats.retained_origins,
            "Compacted rate limit windows"
        );

        stats
    }

    /// Spawn the sweep loop on the tokio runtime.
    ///
    /// The loop ends when `shutdown` flips to `true` or its sender is dropped.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval = ?self.config.interval,
                origin_retention = ?self.config.origin_retention,
                global_retention = ?self.config.global_retention,
                "Compactor started"
            );

            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once(now_millis());
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Compactor stopped");
        })
    }
}
