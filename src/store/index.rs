use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{error, warn};

use super::StoreError;
use crate::catalog::Family;

pub const INDEX_FILE_NAME: &str = "filenames.txt";

/// Append-only record of every series file that was written successfully.
pub trait FileIndex {
    fn append(&mut self, family: Family, path: &Path) -> bool;
}

/// One plain-text index per family at `{root}/{FAMILY}/filenames.txt`, one path per line.
#[derive(Debug, Clone)]
pub struct FlatFileIndex {
    root: PathBuf,
}

impl FlatFileIndex {
    pub fn new(root: impl Into<PathBuf>) -> FlatFileIndex {
        FlatFileIndex { root: root.into() }
    }

    pub fn index_path(&self, family: Family) -> PathBuf {
        self.root.join(family.dir_name()).join(INDEX_FILE_NAME)
    }

    /// Every path recorded for `family`, in append order. A missing index reads as empty.
    pub fn entries(&self, family: Family) -> Result<Vec<PathBuf>, StoreError> {
        let index_path = self.index_path(family);
        let raw = match fs::read(&index_path) {
            Ok(t) => { t },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("{} not found, treating the {} index as empty.", index_path.display(), family);
                return Ok(Vec::new());
            },
            Err(e) => {
                return Err(StoreError::Io { path: index_path.display().to_string(), source: e });
            }
        };

        Ok(raw.split(|b| *b == b'\n')
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
            .filter(|line| !line.is_empty())
            .map(path_from_bytes)
            .collect())
    }

    fn append_line(&self, family: Family, path: &Path) -> io::Result<()> {
        let index_path = self.index_path(family);
        if let Some(parent) = index_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut line = path_to_bytes(path);
        line.push(b'\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&index_path)?;
        file.write_all(&line)
    }
}

/// Index lines hold the path's raw bytes, so names that are not UTF-8 read back unchanged.
#[cfg(unix)]
fn path_to_bytes(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(unix)]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(OsStr::from_bytes(bytes))
}

// elsewhere paths are only recorded faithfully when they are valid unicode
#[cfg(not(unix))]
fn path_to_bytes(path: &Path) -> Vec<u8> {
    path.to_string_lossy().into_owned().into_bytes()
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}

impl FileIndex for FlatFileIndex {
    fn append(&mut self, family: Family, path: &Path) -> bool {
        match self.append_line(family, path) {
            Ok(_) => { true },
            Err(e) => {
                error!("Failed to record {} in the {} index: {}", path.display(), family, e);
                false
            }
        }
    }
}
