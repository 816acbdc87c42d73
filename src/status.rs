use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{Days, NaiveDate};
use tracing::{info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::catalog::Family;
use crate::store::index::INDEX_FILE_NAME;
use crate::store::series_file::last_observation;
use crate::store::{FlatFileIndex, StoreError};

pub const DEFAULT_MAX_AGE_DAYS: u64 = 7;

#[derive(Debug, Default, PartialEq)]
pub struct StatusReport {
    pub fresh: Vec<(PathBuf, NaiveDate)>,
    pub stale: Vec<(PathBuf, NaiveDate)>,
    pub empty: Vec<PathBuf>,
    pub unreadable: Vec<(PathBuf, String)>,
    /// Series files on disk that no index entry points at.
    pub unindexed: Vec<PathBuf>,
}

/// Oldest last-observation date that still counts as fresh. `None` when the age reaches
/// past the earliest representable date.
pub fn stale_cutoff(today: NaiveDate, max_age_days: u64) -> Option<NaiveDate> {
    today.checked_sub_days(Days::new(max_age_days))
}

fn series_filter(entry: &DirEntry) -> bool {
    if entry.file_type().is_dir() {
        return true;
    }

    let file_name = entry.file_name().to_string_lossy().to_lowercase();
    file_name.ends_with(".txt") && file_name != INDEX_FILE_NAME
}

fn files_on_disk(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();

    for entry in WalkDir::new(dir).into_iter().filter_entry(|e| series_filter(e)) {
        match entry {
            Ok(e) => {
                if e.file_type().is_file() {
                    found.push(e.into_path());
                }
            },
            Err(e) => {
                warn!("Forced to skip entry: {}", e);
            }
        }
    }

    found.sort();
    found
}

/// Checks every indexed series of `family` against `cutoff` and looks for files the index missed.
pub fn family_status(index: &FlatFileIndex, data_root: &Path, family: Family, cutoff: NaiveDate) -> Result<StatusReport, StoreError> {
    let mut report = StatusReport::default();
    let entries = index.entries(family)?;

    for path in &entries {
        match last_observation(path) {
            Ok(Some(point)) => {
                if point.date >= cutoff {
                    report.fresh.push((path.clone(), point.date));
                } else {
                    report.stale.push((path.clone(), point.date));
                }
            },
            Ok(None) => { report.empty.push(path.clone()) },
            Err(e) => { report.unreadable.push((path.clone(), e.to_string())) }
        }
    }

    let indexed: HashSet<&PathBuf> = entries.iter().collect();
    report.unindexed = files_on_disk(&data_root.join(family.dir_name()))
        .into_iter()
        .filter(|p| !indexed.contains(p))
        .collect();

    Ok(report)
}

pub fn log_report(family: Family, report: &StatusReport) {
    info!(
        "{}: {} fresh, {} stale, {} empty, {} unreadable, {} not indexed.",
        family, report.fresh.len(), report.stale.len(), report.empty.len(), report.unreadable.len(), report.unindexed.len()
    );

    for (path, last) in &report.stale {
        info!("  stale: {} (last observation {})", path.display(), last);
    }
    for path in &report.empty {
        warn!("  empty: {}", path.display());
    }
    for (path, reason) in &report.unreadable {
        warn!("  unreadable: {} ({})", path.display(), reason);
    }
    for path in &report.unindexed {
        warn!("  not indexed: {}", path.display());
    }
}
