//! Discovery and loading of raw source documents.
//!
//! Each document is a JSON file named `sample_{index}.json` holding at least
//! a `text` field.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::warn;
use walkdir::WalkDir;

use crate::ItemError;

static SOURCE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^sample_(\d+)\.json$").unwrap());

/// A discovered, not yet loaded, source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub index: usize,
    pub path: PathBuf,
}

/// A loaded source document.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub index: usize,
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct RawSample {
    text: String,
}

impl SourceEntry {
    /// Read and decode the document's text.
    pub fn load(&self) -> Result<SourceDocument, ItemError> {
        let load_err = |reason: String| ItemError::Load {
            path: self.path.clone(),
            reason,
        };
        let contents = std::fs::read_to_string(&self.path).map_err(|e| load_err(e.to_string()))?;
        let raw: RawSample = serde_json::from_str(&contents).map_err(|e| load_err(e.to_string()))?;
        Ok(SourceDocument {
            index: self.index,
            text: raw.text,
        })
    }
}

/// Parse the index out of a source file name.
pub fn source_index(file_name: &str) -> Option<usize> {
    SOURCE_NAME_RE
        .captures(file_name)
        .and_then(|caps| caps[1].parse().ok())
}

/// Discover all source documents directly under `root`, sorted by index.
///
/// A missing directory yields an empty list; the caller decides whether that
/// is fatal. When several files share an index (`sample_7.json` and
/// `sample_007.json`), the first by path wins and the rest are ignored.
pub fn discover_sources(root: &Path) -> Vec<SourceEntry> {
    let mut entries: Vec<SourceEntry> = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let index = source_index(e.file_name().to_str()?)?;
            Some(SourceEntry {
                index,
                path: e.path().to_path_buf(),
            })
        })
        .collect();
    entries.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.path.cmp(&b.path)));
    entries.dedup_by(|later, kept| {
        let duplicate = later.index == kept.index;
        if duplicate {
            warn!(index = kept.index, "ignoring {:?}, index already taken by {:?}", later.path, kept.path);
        }
        duplicate
    });
    entries
}
