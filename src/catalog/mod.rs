use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub mod parse;

/// Dataset family. Each family has its own directory under the data root and its own index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    H8,
    H41,
}

impl Family {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Family::H8 => { "H8" },
            Family::H41 => { "H41" },
        }
    }

    pub fn all() -> [Family; 2] {
        [Family::H8, Family::H41]
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

/// One fetchable series and where it is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafEntry {
    pub series_id: String,
    pub path: PathBuf,
}

impl LeafEntry {
    pub fn new(series_id: impl Into<String>, path: impl Into<PathBuf>) -> LeafEntry {
        LeafEntry { series_id: series_id.into(), path: path.into() }
    }
}

/// A node of a hierarchical catalog. It may carry a leaf payload, children, or both;
/// children keep the order they were first seen in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogNode {
    pub leaf: Option<LeafEntry>,
    pub children: Vec<(String, CatalogNode)>,
}

impl CatalogNode {
    pub fn group() -> CatalogNode {
        CatalogNode::default()
    }

    #[cfg(test)]
    pub fn leaf(entry: LeafEntry) -> CatalogNode {
        CatalogNode { leaf: Some(entry), children: Vec::new() }
    }

    pub fn with_child(mut self, label: impl Into<String>, child: CatalogNode) -> CatalogNode {
        self.children.push((label.into(), child));
        self
    }

    pub fn child(&self, label: &str) -> Option<&CatalogNode> {
        self.children.iter().find(|(l, _)| l == label).map(|(_, node)| node)
    }

    /// Returns the child named `label`, appending an empty group if there is none yet.
    pub fn child_or_insert(&mut self, label: &str) -> &mut CatalogNode {
        let position = match self.children.iter().position(|(l, _)| l == label) {
            Some(p) => { p },
            None => {
                self.children.push((label.to_owned(), CatalogNode::group()));
                self.children.len() - 1
            }
        };
        &mut self.children[position].1
    }

    pub fn is_leaf(&self) -> bool {
        self.leaf.is_some()
    }

    pub fn leaf_count(&self) -> usize {
        let own = if self.is_leaf() { 1 } else { 0 };
        own + self.children.iter().map(|(_, child)| child.leaf_count()).sum::<usize>()
    }
}

/// A two-level catalog: group label → dataset label → leaf.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatCatalog {
    pub groups: Vec<CatalogGroup>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogGroup {
    pub label: String,
    pub datasets: Vec<(String, LeafEntry)>,
}

impl FlatCatalog {
    pub fn group_mut(&mut self, label: &str) -> &mut CatalogGroup {
        let position = match self.groups.iter().position(|g| g.label == label) {
            Some(p) => { p },
            None => {
                self.groups.push(CatalogGroup { label: label.to_owned(), datasets: Vec::new() });
                self.groups.len() - 1
            }
        };
        &mut self.groups[position]
    }

    #[cfg(test)]
    pub fn group(&self, label: &str) -> Option<&CatalogGroup> {
        self.groups.iter().find(|g| g.label == label)
    }

    pub fn leaf_count(&self) -> usize {
        self.groups.iter().map(|g| g.datasets.len()).sum()
    }
}

impl CatalogGroup {
    pub fn dataset(&self, label: &str) -> Option<&LeafEntry> {
        self.datasets.iter().find(|(l, _)| l == label).map(|(_, entry)| entry)
    }
}

/// Either catalog shape the downloader knows how to walk.
#[derive(Debug, Clone, PartialEq)]
pub enum Catalog {
    Flat(FlatCatalog),
    Tree(CatalogNode),
}

impl Catalog {
    pub fn leaf_count(&self) -> usize {
        match self {
            Catalog::Flat(flat) => { flat.leaf_count() },
            Catalog::Tree(root) => { root.leaf_count() },
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to read catalog {path}: {source}")]
pub struct CatalogError {
    pub path: String,
    pub source: io::Error,
}

pub fn read_catalog_file(path: &Path) -> Result<String, CatalogError> {
    fs::read_to_string(path).map_err(|e| CatalogError { path: path.display().to_string(), source: e })
}

#[test]
fn test_child_or_insert_keeps_first_seen_order() {
    let mut root = CatalogNode::group();
    root.child_or_insert("table1").child_or_insert("Assets");
    root.child_or_insert("table2");
    root.child_or_insert("table1").child_or_insert("Liabilities");

    let labels: Vec<&str> = root.children.iter().map(|(l, _)| l.as_str()).collect();
    assert_eq!(labels, vec!["table1", "table2"]);
    assert_eq!(root.child("table1").unwrap().children.len(), 2);
}

#[test]
fn test_leaf_count_includes_hybrid_nodes() {
    let hybrid = CatalogNode::leaf(LeafEntry::new("A", "a.txt"))
        .with_child("nested", CatalogNode::group().with_child("B", CatalogNode::leaf(LeafEntry::new("B", "b.txt"))));
    let root = CatalogNode::group().with_child("x", hybrid);

    assert_eq!(root.leaf_count(), 2);
    assert!(!root.is_leaf());
}

#[test]
fn test_read_missing_catalog_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let error = read_catalog_file(&dir.path().join("H8_Series_Ids.txt")).unwrap_err();
    assert!(error.to_string().contains("H8_Series_Ids.txt"));
}
