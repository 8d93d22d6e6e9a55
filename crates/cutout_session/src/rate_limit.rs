use std::{
    collections::VecDeque,
    future::Future,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Time source for the limiter; swapped for a manual clock in tests
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
    fn sleep_until(&self, deadline: Instant) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep_until(&self, deadline: Instant) -> impl Future<Output = ()> + Send {
        tokio::time::sleep_until(deadline)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_calls: usize,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: 10,
            window_secs: 60,
        }
    }
}

/// Sliding-window limiter: at most `max_calls` reservations per `window`.
/// Callers over the cap wait for the oldest reservation to expire.
#[derive(Debug)]
pub struct RateLimiter<C = TokioClock> {
    max_calls: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
    clock: C,
}

impl RateLimiter<TokioClock> {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self::with_clock(max_calls, window, TokioClock)
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_calls, Duration::from_secs(config.window_secs))
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(max_calls: usize, window: Duration, clock: C) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window,
            calls: Mutex::new(VecDeque::new()),
            clock,
        }
    }

    fn calls(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn prune(&self, calls: &mut VecDeque<Instant>, now: Instant) {
        while calls
            .front()
            .is_some_and(|&oldest| now.duration_since(oldest) >= self.window)
        {
            calls.pop_front();
        }
    }

    /// Reserve a slot now, or report when the next one frees up
    fn reserve(&self) -> Result<(), Instant> {
        let now = self.clock.now();
        let mut calls = self.calls();
        self.prune(&mut calls, now);
        if calls.len() < self.max_calls {
            calls.push_back(now);
            return Ok(());
        }
        match calls.front() {
            Some(&oldest) => Err(oldest + self.window),
            None => Ok(()),
        }
    }

    pub fn try_acquire(&self) -> bool {
        self.reserve().is_ok()
    }

    /// Wait until a slot is free, then take it
    pub async fn acquire(&self) {
        loop {
            match self.reserve() {
                Ok(()) => return,
                Err(deadline) => {
                    tracing::debug!(
                        wait_ms = deadline.saturating_duration_since(self.clock.now()).as_millis() as u64,
                        "Rate limit reached, waiting for a free slot"
                    );
                    self.clock.sleep_until(deadline).await;
                }
            }
        }
    }

    /// Give back the most recent reservation (the call never went out)
    pub fn release(&self) {
        self.calls().pop_back();
    }

    /// Slots available right now
    pub fn remaining(&self) -> usize {
        let now = self.clock.now();
        let mut calls = self.calls();
        self.prune(&mut calls, now);
        self.max_calls - calls.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Clock that only moves when told to; sleeping jumps straight to the deadline
    #[derive(Debug, Clone)]
    struct ManualClock {
        now: Arc<Mutex<Instant>>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self { now: Arc::new(Mutex::new(Instant::now())) }
        }

        fn advance(&self, by: Duration) {
            *self.now.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }

        fn sleep_until(&self, deadline: Instant) -> impl Future<Output = ()> + Send {
            let mut now = self.now.lock().unwrap();
            if deadline > *now {
                *now = deadline;
            }
            std::future::ready(())
        }
    }

    #[test]
    fn test_cap_and_window_expiry() {
        let clock = ManualClock::new();
        let limiter = RateLimiter::with_clock(3, Duration::from_secs(60), clock.clone());

        assert!(limiter.try_acquire());
        clock.advance(Duration::from_secs(10));
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        assert_eq!(limiter.remaining(), 0);

        clock.advance(Duration::from_secs(50));
        assert_eq!(limiter.remaining(), 1);
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_release_returns_last_slot() {
        let limiter = RateLimiter::with_clock(1, Duration::from_secs(60), ManualClock::new());
        assert!(limiter.try_acquire());
        limiter.release();
        assert!(limiter.try_acquire());
    }

    #[tokio::test]
    async fn test_acquire_waits_for_oldest_to_expire() {
        let clock = ManualClock::new();
        let start = clock.now();
        let limiter = RateLimiter::with_clock(2, Duration::from_secs(60), clock.clone());

        limiter.acquire().await;
        clock.advance(Duration::from_secs(5));
        limiter.acquire().await;
        assert_eq!(clock.now() - start, Duration::from_secs(5));

        limiter.acquire().await;
        assert_eq!(clock.now() - start, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_blocks_instead_of_failing() {
        let limiter = RateLimiter::from_config(&RateLimitConfig { max_calls: 1, window_secs: 2 });
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
