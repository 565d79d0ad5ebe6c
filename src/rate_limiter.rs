//! Global token bucket gating mutation RPCs.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Token bucket shared by every worker of a batch run.
///
/// Tokens accrue at `rate` per second up to `burst` capacity and the bucket
/// starts full. Tokens are tracked in thousandths so sub-second refill does
/// not round down to zero. Time comes from the tokio clock so paced code can
/// be exercised under a paused test runtime.
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<BucketState>,
    rate: u64,
    burst: u64,
}

#[derive(Debug)]
struct BucketState {
    /// Current token count, scaled by 1000.
    tokens: u64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(rate: u32, burst: u32) -> Self {
        let rate = u64::from(rate).max(1);
        let burst = u64::from(burst).max(1);
        Self {
            state: Mutex::new(BucketState {
                tokens: burst * 1000,
                last_refill: Instant::now(),
            }),
            rate,
            burst,
        }
    }

    /// Consume one token if available, otherwise report how long until the
    /// next token accrues.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut state = self.state.lock().expect("rate limiter state poisoned");

        let now = Instant::now();
        let elapsed_ms = now.duration_since(state.last_refill).as_millis() as u64;
        if elapsed_ms > 0 {
            // One scaled token per millisecond per unit of rate.
            state.tokens = (state.tokens + elapsed_ms * self.rate).min(self.burst * 1000);
            state.last_refill = now;
        }

        if state.tokens >= 1000 {
            state.tokens -= 1000;
            return Ok(());
        }
        let deficit = 1000 - state.tokens;
        Err(Duration::from_millis(deficit.div_ceil(self.rate)))
    }

    /// Wait until a token is available and consume it.
    ///
    /// Cancellation is composed at the call site with `tokio::select!`; the
    /// limiter itself only paces.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                Ok(()) => return,
                Err(wait) => tokio::time::sleep(wait).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_is_available_immediately() {
        let limiter = RateLimiter::new(10, 3);
        for _ in 0..3 {
            limiter.try_acquire().expect("token within burst");
        }
        assert!(limiter.try_acquire().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_refill_at_the_configured_rate() {
        let limiter = RateLimiter::new(10, 1);
        limiter.try_acquire().expect("initial token");
        let wait = limiter.try_acquire().expect_err("bucket drained");
        assert_eq!(wait, Duration::from_millis(100));

        tokio::time::advance(Duration::from_millis(100)).await;
        limiter.try_acquire().expect("token after refill interval");
    }

    #[tokio::test(start_paused = true)]
    async fn refill_never_exceeds_burst() {
        let limiter = RateLimiter::new(100, 2);
        tokio::time::advance(Duration::from_secs(60)).await;
        limiter.try_acquire().expect("first token");
        limiter.try_acquire().expect("second token");
        assert!(limiter.try_acquire().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_sleeps_out_the_deficit() {
        let limiter = RateLimiter::new(10, 1);
        limiter.try_acquire().expect("initial token");

        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::from_millis(100));
    }
}
