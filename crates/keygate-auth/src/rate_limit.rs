//! Sliding-window limiter for remote key fetches.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Caps the number of operations within a rolling time window.
///
/// Shared by every caller of a [`KeyCache`](crate::KeyCache); each permitted
/// fetch records its start instant and instants older than the window are
/// discarded on the next check.
#[derive(Debug)]
pub struct FetchRateLimiter {
    window: Duration,
    limit: usize,
    permits: Mutex<VecDeque<Instant>>,
}

impl FetchRateLimiter {
    /// Create a limiter allowing `limit` operations per rolling minute.
    #[must_use]
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Create a limiter allowing `limit` operations per `window`.
    #[must_use]
    pub fn new(limit: u32, window: Duration) -> Self {
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Self {
            window,
            limit,
            permits: Mutex::new(VecDeque::with_capacity(limit.min(64))),
        }
    }

    /// Take a permit if the window has room for one.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut permits = self.permits.lock();
        Self::purge(&mut permits, now, self.window);

        if permits.len() < self.limit {
            permits.push_back(now);
            true
        } else {
            false
        }
    }

    /// Number of permits still available in the current window.
    #[must_use]
    pub fn remaining(&self) -> usize {
        let mut permits = self.permits.lock();
        Self::purge(&mut permits, Instant::now(), self.window);
        self.limit.saturating_sub(permits.len())
    }

    fn purge(permits: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(&front) = permits.front() {
            if now.duration_since(front) >= window {
                permits.pop_front();
            } else {
                break;
            }
        }
    }
}
