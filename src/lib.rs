//! # edgequake-extract
//!
//! Schema-driven structured data extraction from documents using LLMs.
//!
//! Describe what you want as a list of field descriptors (a question, an
//! optional hint and examples, a value type, a required flag). The crate
//! compiles that list into a runtime schema, asks a model for one
//! schema-conformant JSON object per document, validates it, and writes one
//! result file per document.
//!
//! ## Pipeline Overview
//!
//! ```text
//! queries.yaml ──▶ ExtractionSchema (compiled once per run)
//!                        │
//! papers/*.pdf           ▼
//!  ├─ 1. Source     per-page text via pdfium (spawn_blocking)
//!  ├─ 2. Normalise  strip running headers/footers, join pages
//!  ├─ 3. Extract    system prompt + JSON Schema + text → model (timeout-bounded)
//!  ├─ 4. Validate   parse + type-check against the schema
//!  ├─ 5. Retry      transient failures: 2^n + base seconds, max 5 attempts
//!  └─ 6. Persist    results/<stem>.json (checkpoint) or failures.jsonl
//! ```
//!
//! Documents are processed one at a time in name order. Re-running a batch
//! skips every document that already has a result file.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_extract::{extract_directory, ExtractionConfig, ExtractionSchema};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::builder()
//!         .model("academic-extractor")
//!         .build()?;
//!     let schema = ExtractionSchema::load(&config.schema_name, "queries.yaml")?;
//!     let summary = extract_directory("pdfs", &schema, &config).await?;
//!     eprintln!(
//!         "{} succeeded, {} skipped, {} failed",
//!         summary.succeeded, summary.skipped, summary.failed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `paper-extract` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-extract = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod schema;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use context::RunContext;
pub use error::{BackendError, DocumentError, ErrorKind, ExtractError, SchemaError};
pub use extract::{
    build_backend, extract_directory, extract_directory_sync, extract_document, resolve_provider,
};
pub use pipeline::batch::{BatchRunner, BatchSummary, DocumentOutcome, DocumentState};
pub use pipeline::llm::{Extraction, ExtractionBackend, ProviderBackend};
pub use pipeline::normalize::normalize;
pub use pipeline::retry::{RetryDecision, RetryPolicy};
pub use pipeline::source::{DirectorySource, DocumentId, DocumentSource, MemorySource};
pub use pipeline::store::{FailureEntry, ResultStore, RunMetadata, RunResult};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use schema::{
    ExtractionRecord, ExtractionSchema, FieldDescriptor, FieldSpec, FieldValue, OutputKind,
};
