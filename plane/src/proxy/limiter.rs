//! Process-wide request rate limiter

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

use crate::errors::PlatformError;

/// Token bucket options
#[derive(Debug, Clone)]
pub struct Options {
    /// Tokens added per second
    pub per_second: u32,

    /// Bucket size
    pub burst: u32,

    /// Longest a request waits for a token
    pub max_wait: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            per_second: 100,
            burst: 200,
            max_wait: Duration::from_millis(500),
        }
    }
}

/// Lock-free token bucket shared by every proxied request
pub struct RequestLimiter {
    limiter: DefaultDirectRateLimiter,
    max_wait: Duration,
}

impl RequestLimiter {
    pub fn new(options: &Options) -> Result<Self, PlatformError> {
        let per_second = NonZeroU32::new(options.per_second)
            .ok_or_else(|| PlatformError::ConfigError("rate limit must be positive".to_string()))?;
        let burst = NonZeroU32::new(options.burst)
            .ok_or_else(|| PlatformError::ConfigError("rate burst must be positive".to_string()))?;

        Ok(Self {
            limiter: RateLimiter::direct(Quota::per_second(per_second).allow_burst(burst)),
            max_wait: options.max_wait,
        })
    }

    /// Take a token, waiting at most until `deadline` (capped by the
    /// configured maximum wait). Dropping the future abandons the wait.
    pub async fn acquire(&self, deadline: Duration) -> Result<(), PlatformError> {
        if self.limiter.check().is_ok() {
            return Ok(());
        }

        let wait = deadline.min(self.max_wait);
        tokio::time::timeout(wait, self.limiter.until_ready())
            .await
            .map_err(|_| PlatformError::RateLimited)
    }
}
