//! Core admission limiter.
//!
//! Four tiers are evaluated in a fixed order and the first one that is
//! exhausted decides the request:
//!
//! 1. requests per session (lifetime, until the session is cleared)
//! 2. requests per client origin in the last minute
//! 3. requests per client origin in the last hour
//! 4. requests across all identities in the last minute

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use super::store::{identity, WindowStore};
use super::window::{TimeWindow, Timestamp};

/// Default lifetime quota per session.
pub const DEFAULT_MAX_REQUESTS_PER_SESSION: u64 = 1000;
/// Default quota per client origin per minute.
pub const DEFAULT_MAX_REQUESTS_PER_IP_PER_MINUTE: u64 = 200;
/// Default quota per client origin per hour.
pub const DEFAULT_MAX_REQUESTS_PER_IP_PER_HOUR: u64 = 2000;
/// Default quota across all identities per minute.
pub const DEFAULT_GLOBAL_MAX_REQUESTS_PER_MINUTE: u64 = 2000;

/// Quotas enforced by the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub max_requests_per_session: u64,
    pub max_requests_per_ip_per_minute: u64,
    pub max_requests_per_ip_per_hour: u64,
    pub global_max_requests_per_minute: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_requests_per_session: DEFAULT_MAX_REQUESTS_PER_SESSION,
            max_requests_per_ip_per_minute: DEFAULT_MAX_REQUESTS_PER_IP_PER_MINUTE,
            max_requests_per_ip_per_hour: DEFAULT_MAX_REQUESTS_PER_IP_PER_HOUR,
            global_max_requests_per_minute: DEFAULT_GLOBAL_MAX_REQUESTS_PER_MINUTE,
        }
    }
}

/// One of the independent quota dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Session,
    IpMinute,
    IpHour,
    GlobalMinute,
}

/// Why a request was refused.
///
/// The display text is the reason reported to clients. The global tier's
/// text does not mention its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Denial {
    #[error("Session limit reached. Maximum {limit} requests per session.")]
    Session { limit: u64 },
    #[error("Rate limit exceeded. Maximum {limit} requests per minute per IP.")]
    IpPerMinute { limit: u64 },
    #[error("Rate limit exceeded. Maximum {limit} requests per hour per IP.")]
    IpPerHour { limit: u64 },
    #[error("Global rate limit exceeded. Please try again later.")]
    Global { limit: u64 },
}

impl Denial {
    /// The tier that refused the request.
    pub fn tier(&self) -> Tier {
        match self {
            Denial::Session { .. } => Tier::Session,
            Denial::IpPerMinute { .. } => Tier::IpMinute,
            Denial::IpPerHour { .. } => Tier::IpHour,
            Denial::Global { .. } => Tier::GlobalMinute,
        }
    }

    /// The configured quota of the refusing tier.
    pub fn limit(&self) -> u64 {
        match *self {
            Denial::Session { limit }
            | Denial::IpPerMinute { limit }
            | Denial::IpPerHour { limit }
            | Denial::Global { limit } => limit,
        }
    }

    /// Quota left in the refusing tier. Always zero.
    pub fn remaining(&self) -> u64 {
        0
    }
}

/// Quota left in each client-visible tier, counting the request being admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quota {
    pub session_remaining: u64,
    pub ip_minute_remaining: u64,
    pub ip_hour_remaining: u64,
}

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admitted(Quota),
    Denied(Denial),
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted(_))
    }

    pub fn quota(&self) -> Option<Quota> {
        match self {
            Decision::Admitted(quota) => Some(*quota),
            Decision::Denied(_) => None,
        }
    }

    pub fn denial(&self) -> Option<Denial> {
        match self {
            Decision::Admitted(_) => None,
            Decision::Denied(denial) => Some(*denial),
        }
    }
}

/// The admission limiter and the state it owns.
///
/// `check` and `record` may be called separately; two concurrent requests
/// for the same identity can then both pass `check` before either records.
/// `admit` runs both under one lock and never over-admits.
pub struct RateLimiter {
    limits: Limits,
    store: WindowStore,
    /// Serialises `admit` so check and record happen as one step
    admission: Mutex<()>,
}

impl RateLimiter {
    /// Create a limiter with empty state.
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            store: WindowStore::new(),
            admission: Mutex::new(()),
        }
    }

    /// The quotas this limiter enforces.
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// The underlying window store.
    pub fn store(&self) -> &WindowStore {
        &self.store
    }

    /// Decide whether a request may proceed. Does not modify any state.
    pub fn check(&self, session: &str, client_ip: &str, now: Timestamp) -> Decision {
        let session = identity(session);
        let client_ip = identity(client_ip);
        let limits = &self.limits;

        trace!(session = %session, client_ip = %client_ip, now, "Checking admission");

        let session_count = self.store.session_count(session);
        if session_count >= limits.max_requests_per_session {
            return self.deny(
                Denial::Session {
                    limit: limits.max_requests_per_session,
                },
                session,
                client_ip,
            );
        }

        let origin = self.store.origin_counts(client_ip, now);
        if origin.minute >= limits.max_requests_per_ip_per_minute {
            return self.deny(
                Denial::IpPerMinute {
                    limit: limits.max_requests_per_ip_per_minute,
                },
                session,
                client_ip,
            );
        }
        if origin.hour >= limits.max_requests_per_ip_per_hour {
            return self.deny(
                Denial::IpPerHour {
                    limit: limits.max_requests_per_ip_per_hour,
                },
                session,
                client_ip,
            );
        }

        let global = self.store.global_count(now, TimeWindow::Minute);
        if global >= limits.global_max_requests_per_minute {
            return self.deny(
                Denial::Global {
                    limit: limits.global_max_requests_per_minute,
                },
                session,
                client_ip,
            );
        }

        Decision::Admitted(Quota {
            session_remaining: remaining_after(limits.max_requests_per_session, session_count),
            ip_minute_remaining: remaining_after(
                limits.max_requests_per_ip_per_minute,
                origin.minute,
            ),
            ip_hour_remaining: remaining_after(limits.max_requests_per_ip_per_hour, origin.hour),
        })
    }

    /// Register an admitted request. Call only after `check` admitted it.
    pub fn record(&self, session: &str, client_ip: &str, now: Timestamp) {
        self.store.record(session, client_ip, now);
    }

    /// Check and, if admitted, record the request in one critical section.
    pub fn admit(&self, session: &str, client_ip: &str, now: Timestamp) -> Decision {
        let _guard = self.admission.lock();
        let decision = self.check(session, client_ip, now);
        if decision.is_admitted() {
            self.record(session, client_ip, now);
        }
        decision
    }

    /// Delete a session's counter. Returns `false` if the session was unknown.
    pub fn clear_session(&self, session: &str) -> bool {
        let found = self.store.remove_session(session);
        debug!(session = %identity(session), found, "Clearing session counter");
        found
    }

    fn deny(&self, denial: Denial, session: &str, client_ip: &str) -> Decision {
        debug!(
            session = %session,
            client_ip = %client_ip,
            tier = ?denial.tier(),
            limit = denial.limit(),
            "Rate limit exceeded"
        );
        Decision::Denied(denial)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Limits::default())
    }
}

fn remaining_after(limit: u64, count: u64) -> u64 {
    limit.saturating_sub(count).saturating_sub(1)
}
