//! Window store: all mutable rate-limit state.

use std::collections::VecDeque;

use dashmap::DashMap;
use parking_lot::Mutex;

use super::window::{count_within, is_within, TimeWindow, Timestamp};

/// Key used for callers that supply an empty identity.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Normalise an identity key. Empty or blank keys share [`UNKNOWN_IDENTITY`].
pub fn identity(key: &str) -> &str {
    if key.trim().is_empty() {
        UNKNOWN_IDENTITY
    } else {
        key
    }
}

/// Windowed request counts for one client origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OriginCounts {
    /// Admissions younger than one minute
    pub minute: u64,
    /// Admissions younger than one hour
    pub hour: u64,
}

/// Outcome of a single pruning pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    /// Timestamps dropped across all origins and the global sequence
    pub pruned_timestamps: usize,
    /// Origin keys removed because nothing was left in their window
    pub removed_origins: usize,
    /// Origin keys still tracked after the pass
    pub retained_origins: usize,
}

/// Owner of the session counters, per-origin timestamps and the global
/// timestamp sequence.
///
/// Each top-level structure has its own lock: the maps are sharded
/// (`DashMap`) and the global sequence sits behind a mutex.
pub struct WindowStore {
    /// Admissions ever made per session, until the session is cleared
    sessions: DashMap<String, u64>,
    /// Admission timestamps per client origin
    origins: DashMap<String, VecDeque<Timestamp>>,
    /// Admission timestamps across every identity
    global: Mutex<VecDeque<Timestamp>>,
}

impl WindowStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            origins: DashMap::new(),
            global: Mutex::new(VecDeque::new()),
        }
    }

    /// Number of admissions recorded for a session.
    pub fn session_count(&self, session: &str) -> u64 {
        self.sessions
            .get(identity(session))
            .map(|count| *count)
            .unwrap_or(0)
    }

    /// Minute and hour counts for a client origin at `now`.
    pub fn origin_counts(&self, origin: &str, now: Timestamp) -> OriginCounts {
        match self.origins.get(identity(origin)) {
            Some(timestamps) => OriginCounts {
                minute: count_within(&timestamps, now, TimeWindow::Minute.as_millis()) as u64,
                hour: count_within(&timestamps, now, TimeWindow::Hour.as_millis()) as u64,
            },
            None => OriginCounts::default(),
        }
    }

    /// Global admissions inside `window` at `now`.
    pub fn global_count(&self, now: Timestamp, window: TimeWindow) -> u64 {
        let global = self.global.lock();
        count_within(&global, now, window.as_millis()) as u64
    }

    /// Register one admission across every structure.
    pub fn record(&self, session: &str, origin: &str, now: Timestamp) {
        *self
            .sessions
            .entry(identity(session).to_string())
            .or_insert(0) += 1;

        self.origins
            .entry(identity(origin).to_string())
            .or_default()
            .push_back(now);

        self.global.lock().push_back(now);
    }

    /// Forget a session's counter. Returns `false` if it was unknown.
    pub fn remove_session(&self, session: &str) -> bool {
        self.sessions.remove(identity(session)).is_some()
    }

    /// Drop timestamps older than the retention windows and remove origins
    /// left empty.
    ///
    /// The origin map is swept one shard at a time, so request handlers only
    /// wait on the shard currently being filtered.
    pub fn prune(
        &self,
        now: Timestamp,
        origin_retention_ms: u64,
        global_retention_ms: u64,
    ) -> CompactionStats {
        let mut stats = CompactionStats::default();

        self.origins.retain(|_, timestamps| {
            let before = timestamps.len();
            timestamps.retain(|&ts| is_within(now, ts, origin_retention_ms));
            stats.pruned_timestamps += before - timestamps.len();

            if timestamps.is_empty() {
                stats.removed_origins += 1;
                false
            } else {
                true
            }
        });
        stats.retained_origins = self.origins.len();

        let mut global = self.global.lock();
        let before = global.len();
        global.retain(|&ts| is_within(now, ts, global_retention_ms));
        stats.pruned_timestamps += before - global.len();

        stats
    }

    /// Number of sessions with a live counter.
    pub fn session_len(&self) -> usize {
        self.sessions.len()
    }

    /// Number of tracked client origins.
    pub fn origin_len(&self) -> usize {
        self.origins.len()
    }

    /// Whether an origin currently has an entry.
    pub fn contains_origin(&self, origin: &str) -> bool {
        self.origins.contains_key(identity(origin))
    }

    /// Length of the global timestamp sequence, pruned or not.
    pub fn global_len(&self) -> usize {
        self.global.lock().len()
    }
}

impl Default for WindowStore {
    fn default() -> Self {
        Self::new()
    }
}
