use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::info;

use crate::clock::Clock;

pub const DEFAULT_MAX_REQUESTS: usize = 120;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Rolling-window request limiter.
///
/// Remembers when each request was admitted and holds the caller back whenever one more
/// request would put more than `max_requests` inside the trailing `window`. State lives
/// only as long as the limiter does.
#[derive(Debug)]
pub struct RateLimiter<C: Clock> {
    clock: C,
    max_requests: usize,
    window: Duration,
    sent: VecDeque<Instant>,
}

impl<C: Clock> RateLimiter<C> {
    pub fn new(clock: C, max_requests: usize, window: Duration) -> RateLimiter<C> {
        RateLimiter {
            clock,
            // a zero quota could never admit anything
            max_requests: max_requests.max(1),
            window,
            sent: VecDeque::new(),
        }
    }

    #[cfg(test)]
    pub fn with_defaults(clock: C) -> RateLimiter<C> {
        RateLimiter::new(clock, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }

    /// Number of requests currently counted against the window.
    #[cfg(test)]
    pub fn in_window(&self) -> usize {
        self.sent.len()
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.sent.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                self.sent.pop_front();
            } else {
                break;
            }
        }
    }

    /// Blocks until one more request fits in the window, then records it.
    /// Returns how long the caller was held back.
    pub fn admit(&mut self) -> Duration {
        let now = self.clock.now();
        self.prune(now);

        let mut waited = Duration::from_secs(0);
        if self.sent.len() >= self.max_requests {
            // the request that has to age out before we may proceed
            let blocking = self.sent[self.sent.len() - self.max_requests];
            let elapsed = now.saturating_duration_since(blocking);
            waited = self.window.checked_sub(elapsed).unwrap_or_default();

            info!("Request limit reached. Waiting for {:.1} seconds.", waited.as_secs_f64());
            self.clock.sleep(waited);
            self.prune(self.clock.now());
        }

        self.sent.push_back(self.clock.now());
        waited
    }
}
