//! Persisted processed records.
//!
//! One JSON file per source index is both the output and the resume ledger:
//! if `sample_{index:05}_processed.json` exists, that index is done.

use std::collections::BTreeSet;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::{PipelineError, ValidationReport};

static RECORD_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^sample_(\d+)_processed\.json$").unwrap());

/// Validated output for one source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub source_index: usize,
    pub samples: Vec<String>,
    pub statistics: ValidationReport,
    /// Wall-clock seconds spent extracting this document.
    pub processing_time: f64,
}

/// Output directory of processed records.
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("sample_{:05}_processed.json", index))
    }

    /// Indices that already have a record. A missing directory means none.
    pub fn completed_indices(&self) -> Result<BTreeSet<usize>, PipelineError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(e.into()),
        };

        let mut done = BTreeSet::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(index) = name.to_str().and_then(record_index) else {
                continue;
            };
            done.insert(index);
        }
        Ok(done)
    }

    pub fn load(&self, index: usize) -> Result<ProcessedRecord, PipelineError> {
        let contents = std::fs::read_to_string(self.record_path(index))?;
        serde_json::from_str(&contents).map_err(|e| PipelineError::Io(e.into()))
    }

    /// Publish `record` atomically.
    ///
    /// The record is written to a temporary file in the output directory and
    /// then linked into place without clobbering. Returns `Ok(false)` when a
    /// record for the index already exists; the existing file is left alone.
    pub fn write(&self, record: &ProcessedRecord) -> Result<bool, PipelineError> {
        let index = record.source_index;
        let persist_err = |source: std::io::Error| PipelineError::Persist { index, source };

        std::fs::create_dir_all(&self.dir).map_err(persist_err)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".sample_")
            .suffix(".json.tmp")
            .tempfile_in(&self.dir)
            .map_err(persist_err)?;
        write_pretty(&mut tmp, record).map_err(persist_err)?;
        tmp.as_file().sync_all().map_err(persist_err)?;

        match tmp.persist_noclobber(self.record_path(index)) {
            Ok(_) => Ok(true),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(persist_err(e.error)),
        }
    }
}

fn write_pretty(tmp: &mut NamedTempFile, record: &ProcessedRecord) -> std::io::Result<()> {
    let mut writer = BufWriter::new(tmp.as_file_mut());
    serde_json::to_writer_pretty(&mut writer, record)?;
    writer.flush()
}

/// Parse the index out of a record file name.
pub fn record_index(file_name: &str) -> Option<usize> {
    RECORD_NAME_RE
        .captures(file_name)
        .and_then(|caps| caps[1].parse().ok())
}
