//! Pipeline stages for schema-driven extraction.
//!
//! Each submodule implements one step; the orchestrator in [`batch`] wires
//! them together for a whole directory.
//!
//! ## Data Flow
//!
//! ```text
//! source ──▶ normalize ──▶ llm ──▶ response ──▶ schema.validate ──▶ store
//! (pages)    (headers)    (chat)   (JSON)        (record)           (result/failure)
//!                           ▲
//!                         retry (backoff decision, driven by batch)
//! ```
//!
//! 1. [`source`]: list documents and read per-page text (pdfium in
//!    `spawn_blocking`, or form-feed-separated text files)
//! 2. [`normalize`]: drop running headers and footers, join pages
//! 3. [`llm`]: one bounded model call per attempt, no retries
//! 4. [`response`]: recover the JSON object from raw completion text
//! 5. [`retry`]: pure `(error kind, attempt) → retry | abort` decision
//! 6. [`store`]: atomic result files (the checkpoint) and the failure log
//! 7. [`batch`]: the per-document state machine

pub mod batch;
pub mod llm;
pub mod normalize;
pub mod response;
pub mod retry;
pub mod source;
pub mod store;
