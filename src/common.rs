use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

pub const USER_AGENT: &str = "fred-acquisition/0.1";

/// Date format used on the wire and in series files.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A single observation value. FRED reports gaps as "." which we keep as `Missing`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeriesValue {
    Number(f64),
    Missing,
}

impl fmt::Display for SeriesValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Debug keeps the trailing ".0" and is the shortest exact representation
            SeriesValue::Number(v) if v.is_finite() => { write!(f, "{:?}", v) },
            SeriesValue::Number(_) | SeriesValue::Missing => { write!(f, "nan") },
        }
    }
}

impl FromStr for SeriesValue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed {
            "" | "." | "nan" | "NaN" => { Ok(SeriesValue::Missing) },
            _ => {
                match trimmed.parse::<f64>() {
                    Ok(v) if v.is_finite() => { Ok(SeriesValue::Number(v)) },
                    Ok(_) => { Ok(SeriesValue::Missing) },
                    Err(_) => { Err(format!("Not a numeric value: `{}`", trimmed)) }
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub value: SeriesValue,
}

impl SeriesPoint {
    pub fn new(date: NaiveDate, value: SeriesValue) -> SeriesPoint {
        SeriesPoint { date, value }
    }

    #[cfg(test)]
    pub fn number(date: NaiveDate, value: f64) -> SeriesPoint {
        SeriesPoint::new(date, SeriesValue::Number(value))
    }
}

pub fn parse_date(text: &str) -> Result<NaiveDate, String> {
    // only the date prefix matters, the remote side sometimes appends a time
    let prefix = text.trim().get(0..10).unwrap_or_else(|| text.trim());
    NaiveDate::parse_from_str(prefix, DATE_FORMAT)
        .map_err(|e| format!("Invalid date `{}`: {}", text, e))
}

#[test]
fn test_value_display() {
    assert_eq!(SeriesValue::Number(100.0).to_string(), "100.0");
    assert_eq!(SeriesValue::Number(101.5).to_string(), "101.5");
    assert_eq!(SeriesValue::Number(-0.25).to_string(), "-0.25");
    assert_eq!(SeriesValue::Missing.to_string(), "nan");
    assert_eq!(SeriesValue::Number(f64::NAN).to_string(), "nan");
}

#[test]
fn test_value_parse() {
    assert_eq!("211.4984".parse::<SeriesValue>(), Ok(SeriesValue::Number(211.4984)));
    assert_eq!(".".parse::<SeriesValue>(), Ok(SeriesValue::Missing));
    assert_eq!("nan".parse::<SeriesValue>(), Ok(SeriesValue::Missing));
    assert!("abc".parse::<SeriesValue>().is_err());
}

#[test]
fn test_parse_date_prefix() {
    let expected = NaiveDate::from_ymd_opt(2000, 6, 28).unwrap();
    assert_eq!(parse_date("2000-06-28"), Ok(expected));
    assert_eq!(parse_date("2000-06-28 00:00:00"), Ok(expected));
    assert!(parse_date("06/28/2000").is_err());
    assert!(parse_date("").is_err());
}
