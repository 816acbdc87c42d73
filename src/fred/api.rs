// https://fred.stlouisfed.org/docs/api/fred/series_observations.html

use chrono::NaiveDate;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;
use tracing::debug;

use super::{SeriesSource, SourceError};
use crate::common::{parse_date, SeriesPoint, SeriesValue, DATE_FORMAT, USER_AGENT};

const API_ROOT: &str = "https://api.stlouisfed.org/fred";

#[derive(Deserialize, Debug)]
struct Observation {
    date: String,
    value: String,
}

#[derive(Deserialize, Debug)]
struct ObservationsResponse {
    observations: Vec<Observation>,
}

#[derive(Deserialize, Debug)]
struct ErrorResponse {
    error_code: Option<u16>,
    error_message: Option<String>,
}

pub struct FredApi {
    api_key: String,
    http_connect_timeout: u64,
    http_receive_timeout: u64,
}

impl FredApi {
    pub fn new(api_key: String, http_connect_timeout: u64, http_receive_timeout: u64) -> FredApi {
        FredApi { api_key, http_connect_timeout, http_receive_timeout }
    }

    fn observations_url(&self, series_id: &str, start: Option<NaiveDate>, end: Option<NaiveDate>) -> String {
        observations_url(&self.api_key, series_id, start, end)
    }
}

fn observations_url(api_key: &str, series_id: &str, start: Option<NaiveDate>, end: Option<NaiveDate>) -> String {
    let mut url = format!(
        "{root}/series/observations?series_id={series}&api_key={key}&file_type=json",
        root=API_ROOT,
        series=utf8_percent_encode(series_id, NON_ALPHANUMERIC),
        key=utf8_percent_encode(api_key, NON_ALPHANUMERIC)
    );

    if let Some(d) = start {
        url.push_str(&format!("&observation_start={}", d.format(DATE_FORMAT)));
    }
    if let Some(d) = end {
        url.push_str(&format!("&observation_end={}", d.format(DATE_FORMAT)));
    }

    url
}

fn redact(url: &str, api_key: &str) -> String {
    url.replace(&format!("api_key={}", utf8_percent_encode(api_key, NON_ALPHANUMERIC)), "api_key=<redacted>")
}

fn parse_observations(observations: Vec<Observation>) -> Result<Vec<SeriesPoint>, SourceError> {
    let mut points = Vec::with_capacity(observations.len());

    for observation in observations {
        let date = parse_date(&observation.date).map_err(SourceError::transport)?;
        let value = observation.value.parse::<SeriesValue>().map_err(SourceError::transport)?;
        points.push(SeriesPoint::new(date, value));
    }

    Ok(points)
}

impl SeriesSource for FredApi {
    fn get_series(&mut self, series_id: &str, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Vec<SeriesPoint>, SourceError> {
        let target_url = self.observations_url(series_id, start, end);
        let printable_url = redact(&target_url, &self.api_key);
        debug!("Requesting {}", printable_url);

        let response = ureq::get(&target_url)
            .set("User-Agent", USER_AGENT)
            .timeout_connect(self.http_connect_timeout)
            .timeout_read(self.http_receive_timeout)
            .call();

        if let Some(error) = response.synthetic_error() {
            return Err(SourceError::transport(format!("Failed to reach FRED with URL {}. Error: {}", printable_url, error)));
        }

        let status = response.status();
        if status != 200 {
            let status_text = response.status_text().to_owned();
            // FRED explains most failures in a small JSON body
            let detail = match response.into_json_deserialize::<ErrorResponse>() {
                Ok(ErrorResponse { error_code, error_message: Some(message) }) => {
                    format!("{} (code {})", message, error_code.unwrap_or(status))
                },
                _ => { status_text }
            };
            return Err(SourceError::new(Some(status), format!("FRED returned HTTP {} for series {}: {}", status, series_id, detail)));
        }

        let parsed = match response.into_json_deserialize::<ObservationsResponse>() {
            Ok(j) => { j },
            Err(e) => {
                return Err(SourceError::transport(format!("Response from FRED is not valid JSON, or the structure has changed significantly. Target url: {}. Error: {}", printable_url, e)));
            }
        };

        parse_observations(parsed.observations)
    }
}

#[test]
fn test_observations_url() {
    let url = observations_url("key&1", "DPSACBW027SBOG", None, None);
    assert_eq!(url, "https://api.stlouisfed.org/fred/series/observations?series_id=DPSACBW027SBOG&api_key=key%261&file_type=json");

    let start = NaiveDate::from_ymd_opt(2024, 1, 1);
    let end = NaiveDate::from_ymd_opt(2024, 2, 1);
    let url = observations_url("k", "WALCL", start, end);
    assert!(url.ends_with("&observation_start=2024-01-01&observation_end=2024-02-01"));
}

#[test]
fn test_redact_hides_key() {
    let url = observations_url("secret", "WALCL", None, None);
    let printable = redact(&url, "secret");
    assert!(!printable.contains("secret"));
    assert!(printable.contains("api_key=<redacted>"));
}

#[test]
fn test_parse_observations() {
    let body = r#"{"observations": [
        {"realtime_start": "2025-03-01", "realtime_end": "2025-03-01", "date": "2000-06-28", "value": "211.4984"},
        {"realtime_start": "2025-03-01", "realtime_end": "2025-03-01", "date": "2000-07-05", "value": "."}
    ]}"#;
    let response: ObservationsResponse = serde_json::from_str(body).unwrap();
    let points = parse_observations(response.observations).unwrap();

    assert_eq!(points.len(), 2);
    assert_eq!(points[0], SeriesPoint::number(NaiveDate::from_ymd_opt(2000, 6, 28).unwrap(), 211.4984));
    assert_eq!(points[1].value, SeriesValue::Missing);
}

#[test]
fn test_parse_observations_rejects_bad_date() {
    let observations = vec![Observation { date: "28/06/2000".to_owned(), value: "1".to_owned() }];
    let error = parse_observations(observations).unwrap_err();
    assert!(!error.is_rate_limited());
    assert_eq!(error.status, None);
}
