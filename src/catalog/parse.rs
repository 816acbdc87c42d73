//! Readers for the hyphen-delimited series catalogs.
//!
//! H8 lines look like `Dataset Name-Weekly-SA-SERIESID`, H41 lines like
//! `table1-Level 1-Level 2-...-SERIESID`. Bad lines are logged and skipped.

use std::path::{Path, PathBuf};

use tracing::warn;

use super::{CatalogNode, Family, FlatCatalog, LeafEntry};

const FIELD_DELIMITER: char = '-';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Weekly,
    Monthly,
}

impl Frequency {
    fn parse(s: &str) -> Option<Frequency> {
        match s {
            "Weekly" => { Some(Frequency::Weekly) },
            "Monthly" => { Some(Frequency::Monthly) },
            _ => { None }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Frequency::Weekly => { "Weekly" },
            Frequency::Monthly => { "Monthly" },
        }
    }

    fn initial(&self) -> &'static str {
        &self.label()[0..1]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Units {
    SeasonallyAdjusted,
    NotSeasonallyAdjusted,
}

impl Units {
    fn parse(s: &str) -> Option<Units> {
        match s {
            "SA" => { Some(Units::SeasonallyAdjusted) },
            "NSA" => { Some(Units::NotSeasonallyAdjusted) },
            _ => { None }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Units::SeasonallyAdjusted => { "SA" },
            Units::NotSeasonallyAdjusted => { "NSA" },
        }
    }
}

/// `{root}/H8/{UNITS}{F}/{series_id}.txt`, e.g. `data/H8/SAW/TOTBKCR.txt`
pub fn h8_file_path(root: &Path, frequency: Frequency, units: Units, series_id: &str) -> PathBuf {
    root.join(Family::H8.dir_name())
        .join(format!("{}{}", units.label(), frequency.initial()))
        .join(format!("{}.txt", series_id))
}

/// `{root}/H41/{table}/{series_id}.txt`
pub fn h41_file_path(root: &Path, table: &str, series_id: &str) -> PathBuf {
    root.join(Family::H41.dir_name())
        .join(table)
        .join(format!("{}.txt", series_id))
}

fn split_fields(line: &str) -> Vec<&str> {
    line.split(FIELD_DELIMITER).map(|part| part.trim()).collect()
}

/// Builds the flat H8 catalog, grouped as `"{Frequency}-{Units}"` → dataset name → leaf.
pub fn parse_h8(text: &str, root: &Path) -> FlatCatalog {
    let mut catalog = FlatCatalog::default();

    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let fields = split_fields(line);
        if fields.len() < 4 {
            warn!("Malformed H8 line {} skipped: {:?}", number + 1, line);
            continue;
        }

        let dataset = fields[0];
        let series_id = fields[fields.len() - 1];
        let (frequency, units) = match (Frequency::parse(fields[fields.len() - 3]), Units::parse(fields[fields.len() - 2])) {
            (Some(f), Some(u)) => { (f, u) },
            _ => {
                warn!("H8 line {} has unknown frequency or units, skipped: {:?}", number + 1, line);
                continue;
            }
        };

        if dataset.is_empty() || series_id.is_empty() {
            warn!("H8 line {} is missing a dataset name or series id, skipped: {:?}", number + 1, line);
            continue;
        }

        let group = catalog.group_mut(&format!("{}-{}", frequency.label(), units.label()));
        if group.dataset(dataset).is_some() {
            warn!("Duplicate H8 dataset `{}` in {} on line {}, skipped.", dataset, group.label, number + 1);
            continue;
        }

        let path = h8_file_path(root, frequency, units, series_id);
        group.datasets.push((dataset.to_owned(), LeafEntry::new(series_id, path)));
    }

    catalog
}

/// Builds the H41 tree. Every field but the last is a label on the way down; the last is the
/// series id stored on the node the labels lead to.
pub fn parse_h41(text: &str, root: &Path) -> CatalogNode {
    let mut tree = CatalogNode::group();

    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let fields = split_fields(line);
        if fields.len() < 2 || fields.iter().any(|f| f.is_empty()) {
            warn!("Malformed H41 line {} skipped: {:?}", number + 1, line);
            continue;
        }

        let (series_id, labels) = match fields.split_last() {
            Some(split) => { split },
            None => { continue; }
        };
        let table = labels[0];

        let mut node = &mut tree;
        for label in labels {
            node = node.child_or_insert(label);
        }

        if let Some(previous) = &node.leaf {
            warn!("H41 line {} replaces series {} with {} under {:?}.", number + 1, previous.series_id, series_id, labels.join("-"));
        }
        node.leaf = Some(LeafEntry::new(*series_id, h41_file_path(root, table, series_id)));
    }

    tree
}
