//! Per-key token bucket rate limiting.

use crate::error::SandboxError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Bucket capacity and refill period.
///
/// A bucket holds at most `max_tokens` and regains all of them over
/// `refill_period`, continuously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Maximum tokens (requests) held at once
    pub max_tokens: u32,
    /// Time to refill from empty to full
    #[serde(with = "duration_secs")]
    pub refill_period: Duration,
}

impl RateLimit {
    /// Creates a new rate limit.
    #[must_use]
    pub const fn new(max_tokens: u32, refill_period: Duration) -> Self {
        Self {
            max_tokens,
            refill_period,
        }
    }

    /// `max_tokens` per minute.
    #[must_use]
    pub const fn per_minute(max_tokens: u32) -> Self {
        Self::new(max_tokens, Duration::from_secs(60))
    }

    /// Tokens regained per second, or `None` if the bucket never refills.
    fn refill_rate(&self) -> Option<f64> {
        if self.max_tokens == 0 || self.refill_period.is_zero() {
            return None;
        }
        Some(f64::from(self.max_tokens) / self.refill_period.as_secs_f64())
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::per_minute(30)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Outcome of an acquire attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// A token was consumed
    Allowed,
    /// No token was available
    Denied {
        /// Time until the next token becomes available
        retry_after: Duration,
    },
}

impl Acquire {
    /// Returns true if a token was consumed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Returns the wait time on denial.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Allowed => None,
            Self::Denied { retry_after } => Some(*retry_after),
        }
    }
}

/// External integrations with their own buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Integration {
    /// Web search
    Search,
    /// Encyclopedia lookups
    Wiki,
    /// Task tracker API
    TaskTracker,
    /// Grocery price lookups
    GroceryPricing,
    /// Image generation
    ImageGeneration,
}

impl Integration {
    /// All known integrations.
    pub const ALL: [Integration; 5] = [
        Integration::Search,
        Integration::Wiki,
        Integration::TaskTracker,
        Integration::GroceryPricing,
        Integration::ImageGeneration,
    ];

    /// Bucket key used for this integration.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Wiki => "wiki",
            Self::TaskTracker => "task-tracker",
            Self::GroceryPricing => "grocery-pricing",
            Self::ImageGeneration => "image-generation",
        }
    }

    /// Default limit for this integration.
    #[must_use]
    pub fn default_limit(self) -> RateLimit {
        match self {
            Self::Search => RateLimit::per_minute(30),
            Self::Wiki => RateLimit::per_minute(60),
            Self::TaskTracker => RateLimit::per_minute(50),
            Self::GroceryPricing => RateLimit::per_minute(10),
            Self::ImageGeneration => RateLimit::per_minute(5),
        }
    }
}

impl fmt::Display for Integration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Integration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|integration| integration.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown integration '{s}'"))
    }
}

/// Token bucket state for one key.
#[derive(Debug, Clone)]
struct TokenBucket {
    limit: RateLimit,
    /// Always within `[0, limit.max_tokens]`
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a full bucket.
    fn new(limit: RateLimit, now: Instant) -> Self {
        Self {
            limit,
            tokens: f64::from(limit.max_tokens),
            last_refill: now,
        }
    }

    /// Adds tokens for the time elapsed since the last refill.
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if let Some(rate) = self.limit.refill_rate() {
            let max = f64::from(self.limit.max_tokens);
            self.tokens = (self.tokens + elapsed.as_secs_f64() * rate).clamp(0.0, max);
        }
        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    /// Consumes a token, or reports how long until one is available.
    fn try_consume(&mut self, now: Instant) -> Acquire {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Acquire::Allowed;
        }

        let retry_after = match self.limit.refill_rate() {
            Some(rate) => Duration::from_secs_f64((1.0 - self.tokens) / rate)
                .max(Duration::from_nanos(1)),
            None => self.limit.refill_period.max(Duration::from_nanos(1)),
        };
        Acquire::Denied { retry_after }
    }
}

/// Rate limiter keyed by integration name.
///
/// Check-and-decrement for a key happens under a single lock, so two callers
/// can never both take the last token.
///
/// # Example
///
/// ```rust,ignore
/// use toolgate::throttle::{Integration, RateLimiter};
///
/// let limiter = RateLimiter::new();
/// match limiter.try_acquire_for(Integration::Search) {
///     toolgate::throttle::Acquire::Allowed => { /* call the API */ }
///     toolgate::throttle::Acquire::Denied { retry_after } => {
///         eprintln!("try again in {retry_after:?}");
///     }
/// }
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    default_limit: RateLimit,
    limits: HashMap<String, RateLimit>,
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    /// Creates a limiter with the built-in integration limits.
    #[must_use]
    pub fn new() -> Self {
        let limits = Integration::ALL
            .into_iter()
            .map(|integration| (integration.as_str().to_string(), integration.default_limit()))
            .collect();
        Self {
            default_limit: RateLimit::default(),
            limits,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the limit for a key.
    ///
    /// Applies the next time the key's bucket is created; configure limits
    /// before first use.
    #[must_use]
    pub fn with_limit(mut self, key: impl Into<String>, limit: RateLimit) -> Self {
        self.limits.insert(key.into(), limit);
        self
    }

    /// Sets the limit used for keys without their own.
    #[must_use]
    pub fn with_default_limit(mut self, limit: RateLimit) -> Self {
        self.default_limit = limit;
        self
    }

    /// Returns the limit that applies to a key.
    #[must_use]
    pub fn limit_for(&self, key: &str) -> RateLimit {
        self.limits.get(key).copied().unwrap_or(self.default_limit)
    }

    /// Attempts to take a token for a key.
    pub fn try_acquire(&self, key: &str) -> Acquire {
        self.try_acquire_at(key, Instant::now())
    }

    /// Attempts to take a token for an integration.
    pub fn try_acquire_for(&self, integration: Integration) -> Acquire {
        self.try_acquire(integration.as_str())
    }

    /// Attempts to take a token as of `now`.
    pub fn try_acquire_at(&self, key: &str, now: Instant) -> Acquire {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let limit = self.limit_for(key);
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(limit, now));

        let outcome = bucket.try_consume(now);
        match outcome {
            Acquire::Allowed => {
                tracing::debug!(key, tokens_remaining = bucket.tokens.floor() as u64, "Rate limit check passed");
            }
            Acquire::Denied { retry_after } => {
                tracing::debug!(key, retry_after_ms = retry_after.as_millis() as u64, "Rate limit exceeded");
            }
        }
        outcome
    }

    /// Takes a token or fails with the wait time.
    ///
    /// # Errors
    ///
    /// Returns a rate-limit-exceeded error when no token is available.
    pub fn acquire(&self, key: &str) -> Result<(), SandboxError> {
        match self.try_acquire(key) {
            Acquire::Allowed => Ok(()),
            Acquire::Denied { retry_after } => Err(SandboxError::rate_limit_exceeded(key, retry_after)),
        }
    }

    /// Whole tokens currently available for a key.
    ///
    /// Keys never used report a full bucket.
    #[must_use]
    pub fn available_tokens(&self, key: &str) -> u32 {
        self.available_tokens_at(key, Instant::now())
    }

    fn available_tokens_at(&self, key: &str, now: Instant) -> u32 {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        match buckets.get_mut(key) {
            Some(bucket) => {
                bucket.refill(now);
                bucket.tokens.floor() as u32
            }
            None => self.limit_for(key).max_tokens,
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
