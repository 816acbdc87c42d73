pub mod api;

use chrono::NaiveDate;
use regex::Regex;

use crate::common::SeriesPoint;

pub use self::api::FredApi;

/// Failure reported by the remote data service. The status is kept when the service
/// answered at all; the message is inspected as a fallback for rate-limit detection.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct SourceError {
    pub status: Option<u16>,
    pub message: String,
}

impl SourceError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> SourceError {
        SourceError { status, message: message.into() }
    }

    pub fn transport(message: impl Into<String>) -> SourceError {
        SourceError::new(None, message)
    }

    /// True when the service signalled that the request quota was exceeded.
    /// The message is only consulted when no status code came back.
    pub fn is_rate_limited(&self) -> bool {
        lazy_static! {
            static ref RE_RATE_LIMIT: Regex = Regex::new(r"\b429\b").unwrap();
        }

        match self.status {
            Some(code) => { code == 429 },
            None => { RE_RATE_LIMIT.is_match(&self.message) }
        }
    }
}

/// Anything that can hand back a series by identifier, optionally clipped to a date range.
pub trait SeriesSource {
    fn get_series(&mut self, series_id: &str, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Vec<SeriesPoint>, SourceError>;
}

#[test]
fn test_rate_limit_detection() {
    assert!(SourceError::new(Some(429), "Too Many Requests").is_rate_limited());
    assert!(SourceError::transport("HTTP Error 429: Too Many Requests").is_rate_limited());
    assert!(!SourceError::new(Some(400), "Bad Request. The series does not exist.").is_rate_limited());
    assert!(!SourceError::transport("connection refused on port 4290").is_rate_limited());
}

#[test]
fn test_known_status_overrides_message() {
    let bad_request = SourceError::new(Some(400), "FRED returned HTTP 400 for series BAD 429: Bad Request");
    assert!(!bad_request.is_rate_limited());
    assert!(SourceError::new(Some(429), "").is_rate_limited());
}
