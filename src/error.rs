//! Error types for the edgequake-extract library.
//!
//! Failures are split by blast radius:
//!
//! * [`SchemaError`]: the field-descriptor source is structurally invalid.
//!   No document can be meaningfully processed without a schema, so this
//!   aborts the run before the first backend call.
//!
//! * [`ExtractError`]: **Fatal**: the run cannot start at all (missing input
//!   directory, provider not configured, bad configuration). Returned as
//!   `Err(ExtractError)` from the top-level `extract*` functions.
//!
//! * [`BackendError`]: what a single model-backend round trip can fail with.
//!   Every variant classifies as [`ErrorKind::Transient`] or
//!   [`ErrorKind::Permanent`]; the batch orchestrator retries only the former.
//!
//! * [`DocumentError`]: **Non-fatal**: one document failed (unreadable PDF,
//!   retries exhausted, result write failed) but the batch carries on. Stored
//!   in [`crate::pipeline::batch::DocumentOutcome`] and appended to the
//!   failure log.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Structural problems in a field-descriptor source.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The descriptor file does not exist.
    #[error("Schema file not found: '{path}'")]
    NotFound { path: PathBuf },

    /// The descriptor file exists but could not be read.
    #[error("Failed to read schema file '{path}': {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The descriptor source is not valid YAML / JSON.
    #[error("Failed to parse schema source: {detail}")]
    Parse { detail: String },

    /// The top level of the descriptor source is not a list.
    #[error("Schema source must be a list of field descriptors, found {found}")]
    NotAList { found: String },

    /// The descriptor list is empty.
    #[error("Schema source contains no field descriptors")]
    Empty,

    /// A list entry is not a mapping.
    #[error("Field descriptor #{index} must be a mapping, found {found}")]
    EntryNotAMapping { index: usize, found: String },

    /// A required key is missing on an entry.
    #[error("Field descriptor #{index} is missing required key '{key}'")]
    MissingKey { index: usize, key: &'static str },

    /// A key is present but holds a value of the wrong type.
    #[error("Field descriptor #{index}: key '{key}' must be {expected}")]
    InvalidValue {
        index: usize,
        key: &'static str,
        expected: &'static str,
    },

    /// Two descriptors share the same `item_name`.
    #[error("Duplicate field name '{name}' (descriptors #{first} and #{second})")]
    DuplicateField {
        name: String,
        first: usize,
        second: usize,
    },
}

/// All fatal errors returned by the edgequake-extract library.
///
/// Per-document failures use [`DocumentError`] and never surface here.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Schema errors ─────────────────────────────────────────────────────
    /// The field-descriptor source could not be compiled.
    #[error("Invalid extraction schema: {0}")]
    Schema(#[from] SchemaError),

    // ── Input errors ──────────────────────────────────────────────────────
    /// The document directory does not exist.
    #[error("Document directory not found: '{path}'\nCreate it and add documents to process.")]
    SourceNotFound { path: PathBuf },

    /// The document directory exists but could not be listed.
    #[error("Failed to list documents in '{path}': {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key, unknown name …).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// The output directory (results / failure log) could not be created.
    #[error("Failed to prepare output directory '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A single-document extraction failed.
    ///
    /// Only returned by [`crate::extract::extract_document`]; batch runs
    /// record document failures instead of returning them.
    #[error("{0}")]
    Document(#[from] DocumentError),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Whether retrying a failed backend call can help.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Timeouts, 5xx, rate limits, dropped connections.
    Transient,
    /// Auth/config failures, malformed requests, output the model cannot
    /// make schema-conformant.
    Permanent,
}

/// A failed model-backend round trip.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum BackendError {
    /// The call exceeded the per-call timeout.
    #[error("backend call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Server-side or network failure (HTTP 5xx, 429, connection reset).
    #[error("backend unavailable: {detail}")]
    Unavailable { detail: String },

    /// The backend refused the request (bad credentials, HTTP 4xx, unknown model).
    #[error("backend rejected the request: {detail}")]
    Rejected { detail: String },

    /// The model answered with something that is not a JSON object.
    #[error("model output is not a JSON object: {detail}")]
    MalformedOutput { detail: String },

    /// The model answered with JSON that does not satisfy the schema.
    #[error("model output violates the extraction schema: {detail}")]
    SchemaViolation { detail: String },
}

impl BackendError {
    /// Retry classification for the orchestrator.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackendError::Timeout { .. } | BackendError::Unavailable { .. } => ErrorKind::Transient,
            BackendError::Rejected { .. }
            | BackendError::MalformedOutput { .. }
            | BackendError::SchemaViolation { .. } => ErrorKind::Permanent,
        }
    }
}

/// A non-fatal error for a single document.
///
/// The batch continues; the error is kept in the outcome and written to the
/// failure log.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum DocumentError {
    /// The document could not be opened or its text layer read.
    #[error("failed to read document: {detail}")]
    Read { detail: String },

    /// The document has no extractable text (e.g. a scanned PDF without OCR).
    #[error("document contains no extractable text")]
    EmptyText,

    /// A permanent backend error aborted the document.
    #[error("extraction failed on attempt {attempts}: {source}")]
    Extraction { attempts: u32, source: BackendError },

    /// Every attempt hit a transient backend error.
    #[error("extraction failed after {attempts} attempts: {source}")]
    RetriesExhausted { attempts: u32, source: BackendError },

    /// Another document in the batch maps to the same result file
    /// (e.g. `paper.pdf` and `paper.PDF`).
    #[error("result key '{key}' is already taken by '{taken_by}'")]
    DuplicateKey { key: String, taken_by: String },

    /// The result file could not be written.
    #[error("failed to persist result to '{path}': {detail}")]
    Persist { path: PathBuf, detail: String },
}

impl DocumentError {
    /// Number of backend attempts consumed before the failure (0 if none).
    pub fn attempts(&self) -> u32 {
        match self {
            DocumentError::Extraction { attempts, .. }
            | DocumentError::RetriesExhausted { attempts, .. } => *attempts,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds() {
        assert_eq!(BackendError::Timeout { secs: 5 }.kind(), ErrorKind::Transient);
        assert_eq!(
            BackendError::Unavailable {
                detail: "503".into()
            }
            .kind(),
            ErrorKind::Transient
        );
    }

    #[test]
    fn permanent_kinds() {
        for e in [
            BackendError::Rejected {
                detail: "401".into(),
            },
            BackendError::MalformedOutput {
                detail: "eof".into(),
            },
            BackendError::SchemaViolation {
                detail: "title missing".into(),
            },
        ] {
            assert_eq!(e.kind(), ErrorKind::Permanent, "{e}");
        }
    }

    #[test]
    fn retries_exhausted_display() {
        let e = DocumentError::RetriesExhausted {
            attempts: 5,
            source: BackendError::Timeout { secs: 1000 },
        };
        let msg = e.to_string();
        assert!(msg.contains("5 attempts"), "got: {msg}");
        assert!(msg.contains("1000s"), "got: {msg}");
        assert_eq!(e.attempts(), 5);
    }

    #[test]
    fn duplicate_field_display() {
        let e = SchemaError::DuplicateField {
            name: "title".into(),
            first: 0,
            second: 3,
        };
        assert!(e.to_string().contains("'title'"));
    }

    #[test]
    fn schema_error_converts_to_fatal() {
        let e: ExtractError = SchemaError::Empty.into();
        assert!(matches!(e, ExtractError::Schema(SchemaError::Empty)));
        assert!(e.to_string().contains("no field descriptors"));
    }

    #[test]
    fn document_error_roundtrips_through_json() {
        let e = DocumentError::Persist {
            path: PathBuf::from("results/a.json"),
            detail: "disk full".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: DocumentError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
        assert_eq!(back.attempts(), 0);
    }
}
