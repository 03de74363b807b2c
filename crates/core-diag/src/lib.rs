//! Diagnostics + counters: rate-limited logging, process-wide
//! counters, and the periodic stats-file writer.

mod counters;
mod ratelimit;
mod stats;

pub use counters::{Counters, CountersSnapshot};
pub use ratelimit::{Channel, Decision, PeriodSummary, RateLimiter};
pub use stats::StatsSink;
