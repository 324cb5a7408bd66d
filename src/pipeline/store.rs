//! Durable outputs: one result file per document, plus an append-only
//! failure log.
//!
//! ## Checkpoints
//!
//! There is no index file. A document is done iff `<output_dir>/<key>.json`
//! exists, where `key` is the document's file stem. Results are written to a
//! temporary file in the same directory and renamed into place, so an
//! interrupted run never leaves a half-written result that would later be
//! mistaken for a checkpoint.
//!
//! ## Failure log
//!
//! JSON Lines, one `{timestamp, document_id, error}` object per failure.
//! Entries are only ever appended.

use crate::error::{DocumentError, ExtractError};
use crate::schema::ExtractionRecord;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Timing and provenance attached to every persisted extraction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetadata {
    pub model_used: String,
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
    pub duration_seconds: f64,
    /// Document file name, e.g. `attention.pdf`.
    pub source_document_id: String,
    /// Length of the normalised text sent to the model, in characters.
    pub character_count: usize,
    /// Backend attempts used, including the successful one.
    pub attempts: u32,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// The persisted unit per document. Written once, never modified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub metadata: RunMetadata,
    pub extraction: ExtractionRecord,
}

/// One line of the failure log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub timestamp: DateTime<Local>,
    pub document_id: String,
    pub error: String,
}

/// Where results and failures live.
#[derive(Debug, Clone)]
pub struct ResultStore {
    output_dir: PathBuf,
    failure_log: PathBuf,
}

impl ResultStore {
    pub fn new(output_dir: impl Into<PathBuf>, failure_log: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            failure_log: failure_log.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn failure_log(&self) -> &Path {
        &self.failure_log
    }

    /// Create the output directory and the failure log's parent.
    pub fn ensure_dirs(&self) -> Result<(), ExtractError> {
        let mut dirs = vec![self.output_dir.as_path()];
        if let Some(parent) = self.failure_log.parent().filter(|p| !p.as_os_str().is_empty()) {
            dirs.push(parent);
        }
        for dir in dirs {
            std::fs::create_dir_all(dir).map_err(|source| ExtractError::OutputDirFailed {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }

    /// Deterministic result location for a checkpoint key.
    pub fn result_path(&self, key: &str) -> PathBuf {
        self.output_dir.join(format!("{key}.json"))
    }

    /// Checkpoint test.
    pub fn has_result(&self, key: &str) -> bool {
        self.result_path(key).is_file()
    }

    /// Atomically write a result as pretty-printed JSON.
    pub fn write_result(&self, key: &str, result: &RunResult) -> Result<PathBuf, DocumentError> {
        let path = self.result_path(key);
        let persist_err = |detail: String| DocumentError::Persist {
            path: path.clone(),
            detail,
        };

        let mut json = serde_json::to_string_pretty(result).map_err(|e| persist_err(e.to_string()))?;
        json.push('\n');

        std::fs::create_dir_all(&self.output_dir).map_err(|e| persist_err(e.to_string()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.output_dir)
            .map_err(|e| persist_err(e.to_string()))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| persist_err(e.to_string()))?;
        tmp.persist(&path).map_err(|e| persist_err(e.error.to_string()))?;

        debug!("Wrote {} ({} bytes)", path.display(), json.len());
        Ok(path)
    }

    /// Append one entry to the failure log.
    pub fn append_failure(&self, entry: &FailureEntry) -> std::io::Result<()> {
        if let Some(parent) = self.failure_log.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(entry).map_err(std::io::Error::other)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.failure_log)?;
        file.write_all(line.as_bytes())
    }

    /// Every entry in the failure log; empty if the log does not exist.
    pub fn read_failures(&self) -> std::io::Result<Vec<FailureEntry>> {
        let text = match std::fs::read_to_string(&self.failure_log) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(std::io::Error::other))
            .collect()
    }
}
