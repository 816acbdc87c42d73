use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::error;

use super::{StoreError, FIELD_SEPARATOR};
use crate::common::{parse_date, SeriesPoint, SeriesValue, DATE_FORMAT};

/// Persists a fetched series. Failures are reported through the return value, never raised.
pub trait SeriesWriter {
    fn write(&mut self, path: &Path, points: &[SeriesPoint]) -> bool;
}

/// Writes `date\0value\n` lines, replacing whatever was at the path before.
#[derive(Debug, Default)]
pub struct FileSeriesWriter;

impl FileSeriesWriter {
    pub fn new() -> FileSeriesWriter {
        FileSeriesWriter
    }
}

fn write_points(path: &Path, points: &[SeriesPoint]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut writer = BufWriter::new(File::create(path)?);
    for point in points {
        writeln!(writer, "{}{}{}", point.date.format(DATE_FORMAT), FIELD_SEPARATOR, point.value)?;
    }
    writer.flush()
}

impl SeriesWriter for FileSeriesWriter {
    fn write(&mut self, path: &Path, points: &[SeriesPoint]) -> bool {
        match write_points(path, points) {
            Ok(_) => { true },
            Err(e) => {
                error!("Error writing to {}: {}", path.display(), e);
                false
            }
        }
    }
}

pub fn parse_series(text: &str, path: &Path) -> Result<Vec<SeriesPoint>, StoreError> {
    let mut points = Vec::new();

    for (number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let malformed = |message: String| StoreError::Malformed { path: path.display().to_string(), line: number + 1, message };

        let mut parts = line.splitn(2, FIELD_SEPARATOR);
        let (date, value) = match (parts.next(), parts.next()) {
            (Some(d), Some(v)) => { (d, v) },
            _ => { return Err(malformed("missing NUL separator".to_owned())) }
        };

        let date = parse_date(date).map_err(malformed)?;
        let value = value.parse::<SeriesValue>().map_err(malformed)?;
        points.push(SeriesPoint::new(date, value));
    }

    Ok(points)
}

pub fn read_series_file(path: &Path) -> Result<Vec<SeriesPoint>, StoreError> {
    let text = fs::read_to_string(path).map_err(|e| StoreError::Io { path: path.display().to_string(), source: e })?;
    parse_series(&text, path)
}

/// Last observation in a series file, if it has any.
pub fn last_observation(path: &Path) -> Result<Option<SeriesPoint>, StoreError> {
    Ok(read_series_file(path)?.pop())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_exact_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("dep.txt");
        let points = vec![SeriesPoint::number(date(2024, 1, 1), 100.0), SeriesPoint::number(date(2024, 1, 8), 101.5)];

        assert!(FileSeriesWriter::new().write(&path, &points));
        assert_eq!(fs::read(&path).unwrap(), b"2024-01-01\x00100.0\n2024-01-08\x00101.5\n".to_vec());
    }

    #[test]
    fn test_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series.txt");
        fs::write(&path, "stale contents that are longer than the new series\n").unwrap();

        assert!(FileSeriesWriter::new().write(&path, &[SeriesPoint::new(date(2000, 6, 28), SeriesValue::Missing)]));
        assert_eq!(fs::read_to_string(&path).unwrap(), "2000-06-28\0nan\n");
    }

    #[test]
    fn test_write_failure_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        // a directory cannot be opened as a file
        assert!(!FileSeriesWriter::new().write(dir.path(), &[SeriesPoint::number(date(2024, 1, 1), 1.0)]));
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("H41").join("table1").join("WALCL.txt");
        let points = vec![
            SeriesPoint::number(date(2000, 6, 28), 211.4984),
            SeriesPoint::number(date(2000, 7, 5), 212.0107),
            SeriesPoint::new(date(2000, 7, 12), SeriesValue::Missing),
            SeriesPoint::number(date(2000, 7, 19), 0.1 + 0.2),
            SeriesPoint::number(date(2000, 7, 26), -1e-7),
        ];

        assert!(FileSeriesWriter::new().write(&path, &points));
        assert_eq!(read_series_file(&path).unwrap(), points);
        assert_eq!(last_observation(&path).unwrap(), Some(points[4].clone()));
    }

    #[test]
    fn test_parse_rejects_missing_separator() {
        let error = parse_series("2024-01-01,100.0\n", Path::new("bad.txt")).unwrap_err();
        assert!(matches!(error, StoreError::Malformed { line: 1, .. }));
    }

    #[test]
    fn test_last_observation_of_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        fs::write(&path, "").unwrap();
        assert_eq!(last_observation(&path).unwrap(), None);
    }
}
