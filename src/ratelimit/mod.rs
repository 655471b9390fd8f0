//! Admission control: multi-tier sliding-window rate limiting.

mod compactor;
mod limiter;
mod store;
mod window;

pub use compactor::{Compactor, CompactorConfig};
pub use limiter::{Decision, Denial, Limits, Quota, RateLimiter, Tier};
pub use store::{CompactionStats, OriginCounts, WindowStore, UNKNOWN_IDENTITY};
pub use window::{now_millis, TimeWindow, Timestamp};
