//! Rolling-window request limiter for the telephony provider API.
//!
//! The provider allows a fixed number of requests per minute. The limiter
//! remembers the instants of admitted requests and refuses a new one while
//! the window is full, reporting how long until the oldest request ages out.
//! It never sleeps; the caller decides what to do with a refusal.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("rate limit of {limit} requests per minute exceeded; retry in {}s", .retry_after.as_secs().max(1))]
pub struct RateLimited {
    pub limit: u32,
    pub retry_after: Duration,
}

#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            admitted: Mutex::new(VecDeque::new()),
        }
    }

    pub fn try_acquire(&self) -> Result<(), RateLimited> {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&self, now: Instant) -> Result<(), RateLimited> {
        let mut admitted = self
            .admitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        while let Some(oldest) = admitted.front() {
            if now.duration_since(*oldest) >= self.window {
                admitted.pop_front();
            } else {
                break;
            }
        }

        if admitted.len() >= self.limit as usize {
            let oldest = admitted.front().copied().unwrap_or(now);
            let retry_after = self.window.saturating_sub(now.duration_since(oldest));
            return Err(RateLimited {
                limit: self.limit,
                retry_after,
            });
        }

        admitted.push_back(now);
        Ok(())
    }
}
