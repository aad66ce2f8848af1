//! Token-bucket rate limiter placed in front of every model call.
//!
//! The bucket starts full. With the default budget (capacity 1, one token
//! per 10 s) the first call goes out immediately and each later call waits
//! until 10 s after the previous one. A provider's `retry-after` hint is
//! applied with [`TokenBucket::defer`], which drains the bucket and holds
//! every caller until the hint has elapsed.
//!
//! Waiters hold the lock while sleeping, so they are served in arrival
//! order (tokio's mutex is fair).

use crate::config::RateLimit;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
    not_before: Option<Instant>,
}

pub struct TokenBucket {
    capacity: f64,
    interval: Duration,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(limit: RateLimit) -> Self {
        let capacity = f64::from(limit.burst.max(1));
        Self {
            capacity,
            interval: limit.interval,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
                not_before: None,
            }),
        }
    }

    /// Take one token, sleeping until one is available. Returns the time spent waiting.
    pub async fn acquire(&self) -> Duration {
        let start = Instant::now();
        let mut state = self.state.lock().await;
        loop {
            let now = Instant::now();
            self.refill(&mut state, now);

            if let Some(until) = state.not_before {
                if until > now {
                    debug!("Rate limiter: holding {:?} for provider retry-after", until - now);
                    sleep(until - now).await;
                    continue;
                }
                state.not_before = None;
            }

            if state.tokens >= 1.0 {
                state.tokens -= 1.0;
                return start.elapsed();
            }

            let wait = self.interval.mul_f64(1.0 - state.tokens);
            debug!("Rate limiter: waiting {:?} for a token", wait);
            sleep(wait).await;
        }
    }

    /// Empty the bucket and block callers for `retry_after`.
    pub async fn defer(&self, retry_after: Duration) {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        self.refill(&mut state, now);
        state.tokens = 0.0;
        let until = now + retry_after;
        state.not_before = Some(state.not_before.map_or(until, |t| t.max(until)));
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill);
        state.last_refill = now;
        if self.interval.is_zero() {
            state.tokens = self.capacity;
            return;
        }
        let earned = elapsed.as_secs_f64() / self.interval.as_secs_f64();
        state.tokens = (state.tokens + earned).min(self.capacity);
    }
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("capacity", &self.capacity)
            .field("interval", &self.interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(burst: u32, interval_ms: u64) -> TokenBucket {
        TokenBucket::new(RateLimit::new(burst, Duration::from_millis(interval_ms)))
    }

    #[tokio::test]
    async fn first_call_is_immediate() {
        let b = bucket(1, 10_000);
        assert!(b.acquire().await < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn second_call_waits_one_interval() {
        let b = bucket(1, 150);
        b.acquire().await;
        let waited = b.acquire().await;
        assert!(waited >= Duration::from_millis(120), "waited {waited:?}");
    }

    #[tokio::test]
    async fn burst_allows_back_to_back_calls() {
        let b = bucket(3, 10_000);
        for _ in 0..3 {
            assert!(b.acquire().await < Duration::from_millis(50));
        }
    }

    #[tokio::test]
    async fn defer_holds_even_a_full_bucket() {
        let b = bucket(5, 10);
        b.defer(Duration::from_millis(150)).await;
        let waited = b.acquire().await;
        assert!(waited >= Duration::from_millis(120), "waited {waited:?}");
    }
}
