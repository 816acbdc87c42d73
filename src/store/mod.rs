use std::io;

pub mod index;
pub mod series_file;

pub use self::index::{FileIndex, FlatFileIndex};
pub use self::series_file::{FileSeriesWriter, SeriesWriter};

/// Separates the date from the value on every line of a series file.
pub const FIELD_SEPARATOR: char = '\0';

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Io { path: String, source: io::Error },
    #[error("{path} line {line}: {message}")]
    Malformed { path: String, line: usize, message: String },
}
