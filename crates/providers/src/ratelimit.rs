//! Minimum-interval rate limiter.
//!
//! Each backend owns one limiter. `acquire` spaces successive entries at
//! least `1 / rate` seconds apart; concurrent callers queue on the mutex and
//! are released one interval apart.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{trace, warn};

#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Option<Duration>,
    last_entry: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// A limiter allowing `calls_per_second` entries per second.
    ///
    /// `None`, non-finite, and non-positive rates build a disabled limiter,
    /// as does a rate so small its interval cannot be represented.
    pub fn new(calls_per_second: Option<f64>) -> Self {
        match calls_per_second {
            Some(rate) if rate.is_finite() && rate > 0.0 => {
                match Duration::try_from_secs_f64(1.0 / rate) {
                    Ok(interval) => Self::from_interval(interval),
                    Err(_) => {
                        warn!(rate, "Rate limit interval out of range; limiter disabled");
                        Self::disabled()
                    }
                }
            }
            _ => Self::disabled(),
        }
    }

    pub fn from_interval(min_interval: Duration) -> Self {
        Self {
            min_interval: (!min_interval.is_zero()).then_some(min_interval),
            last_entry: Mutex::new(None),
        }
    }

    /// A limiter that never blocks.
    pub fn disabled() -> Self {
        Self {
            min_interval: None,
            last_entry: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.min_interval.is_some()
    }

    pub fn min_interval(&self) -> Option<Duration> {
        self.min_interval
    }

    /// Wait until the minimum interval since the previous entry has elapsed.
    ///
    /// The read, the sleep and the write of the last-entry instant all happen
    /// while holding the lock.
    pub async fn acquire(&self) {
        let Some(interval) = self.min_interval else {
            return;
        };

        let mut last = self.last_entry.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + interval;
            let now = Instant::now();
            if ready_at > now {
                trace!(wait_ms = (ready_at - now).as_millis() as u64, "Rate limiter waiting");
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn invalid_rates_disable() {
        assert!(!RateLimiter::new(None).is_enabled());
        assert!(!RateLimiter::new(Some(0.0)).is_enabled());
        assert!(!RateLimiter::new(Some(-2.0)).is_enabled());
        assert!(!RateLimiter::new(Some(f64::NAN)).is_enabled());
        assert!(!RateLimiter::new(Some(f64::INFINITY)).is_enabled());
        assert!(!RateLimiter::new(Some(1e-320)).is_enabled());
        assert_eq!(
            RateLimiter::new(Some(4.0)).min_interval(),
            Some(Duration::from_millis(250))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_never_blocks() {
        let limiter = RateLimiter::disabled();
        let start = Instant::now();
        for _ in 0..100 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn first_entry_is_immediate() {
        let limiter = RateLimiter::new(Some(0.5));
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_entries_are_spaced() {
        let limiter = RateLimiter::new(Some(10.0));
        let mut entries = Vec::new();
        for _ in 0..5 {
            limiter.acquire().await;
            entries.push(Instant::now());
        }
        for pair in entries.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_serialise() {
        let limiter = Arc::new(RateLimiter::new(Some(2.0)));
        let start = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let mut entries = Vec::new();
        for handle in handles {
            entries.push(handle.await.unwrap());
        }
        entries.sort();

        for pair in entries.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(500));
        }
        assert!(start.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_caller_does_not_wait() {
        let limiter = RateLimiter::new(Some(1.0));
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        let before = Instant::now();
        limiter.acquire().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }
}
