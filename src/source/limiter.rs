//! Request spacing for the listing API
//!
//! A token bucket holding up to `burst` tokens, refilled at `burst` tokens
//! per `period`. Callers wait for a token before every request.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{RepobinError, Result};

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    burst: f64,
    per_token: Duration,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Allow `burst` requests per `period`, starting with a full bucket.
    pub fn new(period: Duration, burst: u32) -> Self {
        let burst = burst.max(1);
        Self {
            burst: f64::from(burst),
            per_token: period / burst,
            bucket: Mutex::new(Bucket {
                tokens: f64::from(burst),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Wait until a request may be issued.
    ///
    /// # Returns
    /// * `Err(RepobinError::Cancelled)` if `cancel` fires while waiting
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.last_refill);
                let refill = elapsed.as_secs_f64() / self.per_token.as_secs_f64().max(f64::EPSILON);
                bucket.tokens = (bucket.tokens + refill).min(self.burst);
                bucket.last_refill = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return Ok(());
                }
                self.per_token.mul_f64(1.0 - bucket.tokens)
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled() => return Err(RepobinError::Cancelled),
            }
        }
    }
}
