//! Sliding time windows over admission timestamps.

use std::collections::VecDeque;
use std::time::Duration;

/// Wall-clock milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Time window a sliding-window tier is evaluated over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeWindow {
    /// Per-minute rate limiting
    Minute,
    /// Per-hour rate limiting
    Hour,
}

impl TimeWindow {
    /// Get the duration of this time window.
    pub fn duration(&self) -> Duration {
        match self {
            TimeWindow::Minute => Duration::from_secs(60),
            TimeWindow::Hour => Duration::from_secs(3600),
        }
    }

    /// Get the length of this time window in milliseconds.
    pub fn as_millis(&self) -> u64 {
        duration_millis(self.duration())
    }

    /// Whether an event recorded at `timestamp` is still inside the window at `now`.
    pub fn contains(&self, now: Timestamp, timestamp: Timestamp) -> bool {
        is_within(now, timestamp, self.as_millis())
    }
}

/// Current wall-clock time. Clocks set before the epoch read as zero.
pub fn now_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Age of `timestamp` at `now`, clamped to zero for timestamps in the future.
pub fn age(now: Timestamp, timestamp: Timestamp) -> u64 {
    now.saturating_sub(timestamp)
}

/// Whether `timestamp` is younger than `window_ms` at `now`.
pub fn is_within(now: Timestamp, timestamp: Timestamp, window_ms: u64) -> bool {
    age(now, timestamp) < window_ms
}

/// Count the timestamps younger than `window_ms`.
///
/// Sequences are append-ordered but a wall clock that steps backwards can
/// leave them out of order, so every entry is inspected.
pub fn count_within(timestamps: &VecDeque<Timestamp>, now: Timestamp, window_ms: u64) -> usize {
    timestamps
        .iter()
        .filter(|&&ts| is_within(now, ts, window_ms))
        .count()
}

pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
