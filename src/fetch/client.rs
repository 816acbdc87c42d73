use std::time::Duration;

use chrono::NaiveDate;
use tracing::{error, warn};

use super::rate_limit::RateLimiter;
use crate::clock::Clock;
use crate::common::SeriesPoint;
use crate::fred::SeriesSource;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchFailure {
    #[error("rate limit still exceeded after {attempts} attempts")]
    RateLimited { attempts: u32 },
    #[error("{0}")]
    Other(String),
    #[error("service returned no observations")]
    Empty,
}

pub type FetchResult = Result<Vec<SeriesPoint>, FetchFailure>;

/// Wraps a series source with the request limiter and a fixed-delay retry for quota errors.
pub struct FetchClient<S, C: Clock> {
    source: S,
    limiter: RateLimiter<C>,
    clock: C,
    retry_delay: Duration,
    attempts_made: u64,
}

impl<S: SeriesSource, C: Clock + Clone> FetchClient<S, C> {
    pub fn new(source: S, limiter: RateLimiter<C>, clock: C, retry_delay: Duration) -> FetchClient<S, C> {
        FetchClient { source, limiter, clock, retry_delay, attempts_made: 0 }
    }

    #[cfg(test)]
    pub fn with_defaults(source: S, clock: C) -> FetchClient<S, C> {
        let limiter = RateLimiter::with_defaults(clock.clone());
        FetchClient::new(source, limiter, clock, DEFAULT_RETRY_DELAY)
    }

    #[cfg(test)]
    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Total number of remote calls issued over the client's lifetime.
    pub fn attempts_made(&self) -> u64 {
        self.attempts_made
    }

    /// Fetches one series. Quota errors are retried up to `max_attempts` total attempts with
    /// `retry_delay` between them; any other error fails straight away.
    pub fn fetch(&mut self, series_id: &str, start: Option<NaiveDate>, end: Option<NaiveDate>, max_attempts: u32) -> FetchResult {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 0;

        while attempt < max_attempts {
            self.limiter.admit();
            self.attempts_made += 1;
            attempt += 1;

            match self.source.get_series(series_id, start, end) {
                Ok(points) => {
                    if points.is_empty() {
                        warn!("Series {} returned no observations.", series_id);
                        return Err(FetchFailure::Empty);
                    }
                    return Ok(points);
                },
                Err(e) if e.is_rate_limited() => {
                    if attempt < max_attempts {
                        warn!(
                            "Rate limit exceeded. Retrying in {} seconds (Attempt {}/{})...",
                            self.retry_delay.as_secs(), attempt, max_attempts
                        );
                        self.clock.sleep(self.retry_delay);
                    }
                },
                Err(e) => {
                    error!("Error fetching series {}: {}", series_id, e);
                    return Err(FetchFailure::Other(e.message));
                }
            }
        }

        error!("Max retry attempts reached. Could not fetch series {}.", series_id);
        Err(FetchFailure::RateLimited { attempts: max_attempts })
    }
}
