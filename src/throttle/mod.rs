//! Throttling for calls to external integrations.
//!
//! [`RateLimiter`] keeps one token bucket per key; [`ResponseCache`] holds
//! recent responses so repeated lookups skip the network entirely.

mod cache;
mod rate_limit;

pub use cache::ResponseCache;
pub use rate_limit::{Acquire, Integration, RateLimit, RateLimiter};
