//! Walks a catalog and downloads every leaf: fetch, write, then record in the index.
//!
//! Items are processed one at a time in catalog order. A failure on one leaf is logged and
//! the walk carries on with its siblings; nothing short of killing the process stops a run.

use std::time::Duration;

use chrono::NaiveDate;
use tracing::{error, info};

use crate::catalog::{Catalog, CatalogNode, Family, FlatCatalog, LeafEntry};
use crate::clock::Clock;
use crate::config::AcquisitionConfig;
use crate::fetch::FetchClient;
use crate::fred::SeriesSource;
use crate::store::{FileIndex, SeriesWriter};

pub const DEFAULT_INTER_ITEM_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub family: Family,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub max_attempts: u32,
    /// Pause after every leaf, on top of the limiter's own pacing.
    pub inter_item_delay: Duration,
}

impl DownloadSettings {
    /// Retry budget and pacing from `config`, no date range.
    pub fn from_config(family: Family, config: &AcquisitionConfig) -> DownloadSettings {
        DownloadSettings {
            family,
            start: None,
            end: None,
            max_attempts: config.retry.max_attempts,
            inter_item_delay: config.inter_item_delay(),
        }
    }

    pub fn with_range(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> DownloadSettings {
        self.start = start;
        self.end = end;
        self
    }

    #[cfg(test)]
    pub fn new(family: Family) -> DownloadSettings {
        DownloadSettings::from_config(family, &AcquisitionConfig::default())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub attempted: usize,
    pub written: usize,
    pub indexed: usize,
    pub failed: Vec<String>,
}

struct Downloader<'a, S, C: Clock, W, I> {
    client: &'a mut FetchClient<S, C>,
    writer: &'a mut W,
    index: &'a mut I,
    settings: &'a DownloadSettings,
    summary: RunSummary,
}

impl<'a, S, C, W, I> Downloader<'a, S, C, W, I>
where
    S: SeriesSource,
    C: Clock + Clone,
    W: SeriesWriter,
    I: FileIndex,
{
    fn download_leaf(&mut self, leaf: &LeafEntry, indent: &str) {
        self.summary.attempted += 1;
        let settings = self.settings;

        match self.client.fetch(&leaf.series_id, settings.start, settings.end, settings.max_attempts) {
            Ok(points) => {
                if self.writer.write(&leaf.path, &points) {
                    self.summary.written += 1;
                    info!("{}Data for {} successfully written to: {}", indent, leaf.series_id, leaf.path.display());

                    if self.index.append(settings.family, &leaf.path) {
                        self.summary.indexed += 1;
                    } else {
                        self.summary.failed.push(leaf.series_id.clone());
                    }
                } else {
                    error!("{}Failed to write data for {} to {}", indent, leaf.series_id, leaf.path.display());
                    self.summary.failed.push(leaf.series_id.clone());
                }
            },
            Err(e) => {
                error!("{}Skipping series {}: {}", indent, leaf.series_id, e);
                self.summary.failed.push(leaf.series_id.clone());
            }
        }

        self.client.clock().sleep(settings.inter_item_delay);
    }

    fn walk_flat(&mut self, catalog: &FlatCatalog) {
        for group in &catalog.groups {
            info!("Units & Frequency: {}", group.label);

            for (dataset, leaf) in &group.datasets {
                info!("  Dataset: {}", dataset);
                self.download_leaf(leaf, "    ");
            }
        }
    }

    /// Depth-first: the node's own leaf first, then each child in catalog order.
    fn walk_tree(&mut self, node: &CatalogNode, depth: usize) {
        let indent = "  ".repeat(depth);

        if let Some(leaf) = &node.leaf {
            info!(depth, "{}{}) Downloading series {}", indent, depth, leaf.series_id);
            self.download_leaf(leaf, &format!("{}  ", indent));
        }

        for (label, child) in &node.children {
            info!(depth, "{}{}) {}", indent, depth, label);
            self.walk_tree(child, depth + 1);
        }
    }
}

/// Downloads every leaf of `catalog`. Returns what happened; failures never abort the run.
pub fn run<S, C, W, I>(
    catalog: &Catalog,
    client: &mut FetchClient<S, C>,
    writer: &mut W,
    index: &mut I,
    settings: &DownloadSettings,
) -> RunSummary
where
    S: SeriesSource,
    C: Clock + Clone,
    W: SeriesWriter,
    I: FileIndex,
{
    info!("Downloading {} {} series.", catalog.leaf_count(), settings.family);

    let mut downloader = Downloader { client, writer, index, settings, summary: RunSummary::default() };
    match catalog {
        Catalog::Flat(flat) => { downloader.walk_flat(flat) },
        Catalog::Tree(root) => { downloader.walk_tree(root, 0) },
    }

    let summary = downloader.summary;
    info!(
        "Finished {}: {} attempted, {} written, {} indexed, {} failed.",
        settings.family, summary.attempted, summary.written, summary.indexed, summary.failed.len()
    );
    if !summary.failed.is_empty() {
        info!("Failed series: {}", summary.failed.join(", "));
    }

    summary
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::fs;
    use std::path::{Path, PathBuf};

    use super::*;
    use crate::catalog::CatalogGroup;
    use crate::clock::ManualClock;
    use crate::common::SeriesPoint;
    use crate::fetch::client::testing::{rate_limited, StubSource};
    use crate::fred::SourceError;
    use crate::store::{FileSeriesWriter, FlatFileIndex};

    fn sample() -> Vec<SeriesPoint> {
        vec![
            SeriesPoint::number(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 100.0),
            SeriesPoint::number(NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(), 101.5),
        ]
    }

    fn leaf(root: &Path, id: &str) -> CatalogNode {
        CatalogNode::leaf(LeafEntry::new(id, root.join(format!("{}.txt", id))))
    }

    /// Writer that refuses a chosen set of paths and remembers everything it was asked to write.
    #[derive(Default)]
    struct RecordingWriter {
        refuse: HashSet<PathBuf>,
        written: Vec<PathBuf>,
    }

    impl SeriesWriter for RecordingWriter {
        fn write(&mut self, path: &Path, _points: &[SeriesPoint]) -> bool {
            if self.refuse.contains(path) {
                return false;
            }
            self.written.push(path.to_path_buf());
            true
        }
    }

    #[test]
    fn test_flat_catalog_writes_file_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out").join("dep.txt");
        let catalog = Catalog::Flat(FlatCatalog {
            groups: vec![CatalogGroup {
                label: "Weekly-SA".to_owned(),
                datasets: vec![("Deposits".to_owned(), LeafEntry::new("DPSACBW027SBOG", target.clone()))],
            }],
        });

        let clock = ManualClock::new();
        let mut client = FetchClient::with_defaults(StubSource::always(Ok(sample())), clock.clone());
        let mut index = FlatFileIndex::new(dir.path().join("index"));

        let summary = run(&catalog, &mut client, &mut FileSeriesWriter::new(), &mut index, &DownloadSettings::new(Family::H8));

        assert_eq!(fs::read(&target).unwrap(), b"2024-01-01\x00100.0\n2024-01-08\x00101.5\n".to_vec());
        assert_eq!(index.entries(Family::H8).unwrap(), vec![target]);
        assert_eq!(summary, RunSummary { attempted: 1, written: 1, indexed: 1, failed: Vec::new() });
        assert_eq!(clock.sleeps(), vec![DEFAULT_INTER_ITEM_DELAY]);
    }

    #[test]
    fn test_flat_catalog_continues_after_failures() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = FlatCatalog::default();
        catalog.group_mut("Weekly-SA").datasets.push(("Bad".to_owned(), LeafEntry::new("BAD", dir.path().join("bad.txt"))));
        catalog.group_mut("Monthly-NSA").datasets.push(("Good".to_owned(), LeafEntry::new("GOOD", dir.path().join("good.txt"))));

        let source = StubSource::default().script("GOOD", Ok(sample()));
        let clock = ManualClock::new();
        let mut client = FetchClient::with_defaults(source, clock.clone());
        let mut index = FlatFileIndex::new(dir.path());

        let summary = run(&Catalog::Flat(catalog), &mut client, &mut FileSeriesWriter::new(), &mut index, &DownloadSettings::new(Family::H8));

        assert_eq!(summary.failed, vec!["BAD".to_owned()]);
        assert_eq!(index.entries(Family::H8).unwrap(), vec![dir.path().join("good.txt")]);
        // the delay follows every item, failed or not
        assert_eq!(clock.sleeps(), vec![DEFAULT_INTER_ITEM_DELAY; 2]);
    }

    #[test]
    fn test_hybrid_node_fetches_leaf_and_children() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        // depth 0 group → depth 1 group → depth 2 leaf that also owns a depth 3 group
        let hybrid = leaf(root, "HYBRID").with_child("Nested", CatalogNode::group().with_child("Deep", leaf(root, "DEEP")));
        let tree = CatalogNode::group()
            .with_child("table1", CatalogNode::group().with_child("Assets", CatalogNode::group().with_child("Securities", hybrid)));

        let mut client = FetchClient::with_defaults(StubSource::always(Ok(sample())), ManualClock::new());
        let mut writer = RecordingWriter::default();
        let mut index = FlatFileIndex::new(root);

        let summary = run(&Catalog::Tree(tree), &mut client, &mut writer, &mut index, &DownloadSettings::new(Family::H41));

        let fetched: Vec<&str> = client.source().calls.iter().map(|(id, _, _)| id.as_str()).collect();
        assert_eq!(fetched, vec!["HYBRID", "DEEP"]);
        assert_eq!(writer.written, vec![root.join("HYBRID.txt"), root.join("DEEP.txt")]);
        assert_eq!(summary.indexed, 2);
    }

    #[test]
    fn test_settings_follow_config() {
        let mut config = AcquisitionConfig::default();
        config.retry.max_attempts = 2;
        config.download.inter_item_delay_seconds = 0;

        let settings = DownloadSettings::from_config(Family::H8, &config);
        assert_eq!(settings.max_attempts, 2);
        assert_eq!(settings.inter_item_delay, Duration::from_secs(0));
        assert_eq!(settings.start, None);

        let defaults = DownloadSettings::new(Family::H8);
        assert_eq!(defaults.max_attempts, crate::fetch::client::DEFAULT_MAX_ATTEMPTS);
        assert_eq!(defaults.inter_item_delay, DEFAULT_INTER_ITEM_DELAY);
    }

    #[test]
    fn test_root_leaf_is_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let catalog = Catalog::Tree(leaf(root, "ROOT"));

        let mut client = FetchClient::with_defaults(StubSource::always(Ok(sample())), ManualClock::new());
        let mut index = FlatFileIndex::new(root);

        let summary = run(&catalog, &mut client, &mut RecordingWriter::default(), &mut index, &DownloadSettings::new(Family::H41));

        assert_eq!(summary.attempted, catalog.leaf_count());
        assert_eq!(summary.indexed, 1);
        assert_eq!(index.entries(Family::H41).unwrap(), vec![root.join("ROOT.txt")]);
    }

    #[test]
    fn test_root_leaf_comes_before_its_children() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let tree = leaf(root, "ROOT")
            .with_child("a", leaf(root, "A"))
            .with_child("b", CatalogNode::group().with_child("c", leaf(root, "C")));
        let catalog = Catalog::Tree(tree);

        let mut client = FetchClient::with_defaults(StubSource::always(Ok(sample())), ManualClock::new());
        let mut writer = RecordingWriter::default();

        let summary = run(&catalog, &mut client, &mut writer, &mut FlatFileIndex::new(root), &DownloadSettings::new(Family::H41));

        assert_eq!(summary.attempted, catalog.leaf_count());
        assert_eq!(writer.written, vec![root.join("ROOT.txt"), root.join("A.txt"), root.join("C.txt")]);
    }

    #[test]
    fn test_single_failing_leaf_among_ten() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let mut table = CatalogNode::group();
        for i in 0..10 {
            table = table.with_child(format!("Line {}", i), leaf(root, &format!("S{}", i)));
        }
        let tree = CatalogNode::group().with_child("table1", table);

        let source = StubSource::always(Ok(sample()))
            .script("S4", Err(SourceError::new(Some(400), "Bad Request. The series does not exist.")));
        let mut client = FetchClient::with_defaults(source, ManualClock::new());
        let mut index = FlatFileIndex::new(root.join("index"));

        let summary = run(&Catalog::Tree(tree), &mut client, &mut FileSeriesWriter::new(), &mut index, &DownloadSettings::new(Family::H41));

        let entries = index.entries(Family::H41).unwrap();
        assert_eq!(entries.len(), 9);
        assert!(!entries.contains(&root.join("S4.txt")));
        assert!(!root.join("S4.txt").exists());
        assert_eq!(summary.failed, vec!["S4".to_owned()]);

        // index order follows traversal order
        let expected: Vec<PathBuf> = (0..10).filter(|i| *i != 4).map(|i| root.join(format!("S{}.txt", i))).collect();
        assert_eq!(entries, expected);
    }

    #[test]
    fn test_write_failure_is_not_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let tree = CatalogNode::group()
            .with_child("a", leaf(root, "A"))
            .with_child("b", leaf(root, "B"));

        let mut writer = RecordingWriter::default();
        writer.refuse.insert(root.join("A.txt"));
        let mut client = FetchClient::with_defaults(StubSource::always(Ok(sample())), ManualClock::new());
        let mut index = FlatFileIndex::new(root);

        let summary = run(&Catalog::Tree(tree), &mut client, &mut writer, &mut index, &DownloadSettings::new(Family::H41));

        assert_eq!(index.entries(Family::H41).unwrap(), vec![root.join("B.txt")]);
        assert_eq!(summary.written, 1);
        assert_eq!(summary.failed, vec!["A".to_owned()]);
    }

    #[test]
    fn test_rate_limited_leaf_degrades_to_failure() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let tree = CatalogNode::group()
            .with_child("throttled", leaf(root, "SLOW"))
            .with_child("fine", leaf(root, "FAST"));

        let source = StubSource::always(Ok(sample())).script("SLOW", Err(rate_limited())).script("SLOW", Err(rate_limited()));
        let clock = ManualClock::new();
        let mut client = FetchClient::with_defaults(source, clock.clone());
        let mut index = FlatFileIndex::new(root);
        let mut settings = DownloadSettings::new(Family::H41);
        settings.max_attempts = 2;
        settings.inter_item_delay = Duration::from_secs(0);

        let summary = run(&Catalog::Tree(tree), &mut client, &mut FileSeriesWriter::new(), &mut index, &settings);

        assert_eq!(client.source().calls_for("SLOW"), 2);
        assert_eq!(summary.failed, vec!["SLOW".to_owned()]);
        assert_eq!(index.entries(Family::H41).unwrap(), vec![root.join("FAST.txt")]);
        assert_eq!(clock.total_slept(), Duration::from_secs(20));
    }

    #[test]
    fn test_date_range_reaches_every_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let tree = CatalogNode::group().with_child("a", leaf(dir.path(), "A")).with_child("b", leaf(dir.path(), "B"));
        let settings = DownloadSettings::new(Family::H41)
            .with_range(NaiveDate::from_ymd_opt(2020, 1, 1), NaiveDate::from_ymd_opt(2020, 12, 31));

        let mut client = FetchClient::with_defaults(StubSource::always(Ok(sample())), ManualClock::new());
        run(&Catalog::Tree(tree), &mut client, &mut RecordingWriter::default(), &mut FlatFileIndex::new(dir.path()), &settings);

        assert!(client.source().calls.iter().all(|(_, s, e)| *s == settings.start && *e == settings.end));
    }
}
