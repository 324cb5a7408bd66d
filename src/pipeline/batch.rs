//! Batch orchestrator: documents → persisted records or failure-log entries.
//!
//! ## Per-document state machine
//!
//! ```text
//! PENDING ──checkpoint exists──▶ SKIPPED
//!    ├──result key taken by an earlier document──▶ FAILED
//!    │
//!    └──▶ IN_PROGRESS ──▶ SUCCEEDED   (result file written)
//!            │  ▲
//!            │  └── transient error, attempt < max: sleep 2^n + base
//!            └────▶ FAILED            (failure-log entry appended)
//! ```
//!
//! Documents run strictly one at a time, in name order, so an interrupted
//! batch resumes with exactly the documents that have no result yet. One
//! document's failure never stops the batch: every error below the run level
//! becomes a [`DocumentError`] in the outcome and a line in the failure log.
//!
//! A fixed cooldown separates consecutive processed documents. Skipped
//! documents cost nothing and no cooldown trails the last document.

use crate::context::RunContext;
use crate::error::{DocumentError, ErrorKind, ExtractError};
use crate::pipeline::llm::{Extraction, ExtractionBackend};
use crate::pipeline::normalize::normalize;
use crate::pipeline::retry::{RetryDecision, RetryPolicy};
use crate::pipeline::source::{DocumentId, DocumentSource};
use crate::pipeline::store::{FailureEntry, ResultStore, RunMetadata, RunResult};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::schema::ExtractionSchema;
use chrono::Local;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn, Instrument};

/// Terminal state of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    Skipped,
    Succeeded,
    Failed,
}

/// What happened to one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentOutcome {
    pub document: String,
    pub state: DocumentState,
    /// Backend calls made (0 when skipped or failed before extraction).
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DocumentError>,
}

/// Aggregate result of [`BatchRunner::run`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub run_id: String,
    pub total: usize,
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub outcomes: Vec<DocumentOutcome>,
}

impl BatchSummary {
    pub fn outcome(&self, document: &str) -> Option<&DocumentOutcome> {
        self.outcomes.iter().find(|o| o.document == document)
    }

    pub fn failures(&self) -> impl Iterator<Item = &DocumentOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.state == DocumentState::Failed)
    }
}

/// Sequential orchestrator over one source, one backend and one store.
pub struct BatchRunner<S, B> {
    ctx: RunContext,
    source: S,
    backend: B,
    store: ResultStore,
    policy: RetryPolicy,
    cooldown: Duration,
    progress: ProgressCallback,
}

impl<S: DocumentSource, B: ExtractionBackend> BatchRunner<S, B> {
    /// Runner with store, retry policy, cooldown and progress sink taken from
    /// the context's configuration.
    pub fn new(ctx: RunContext, source: S, backend: B) -> Self {
        let config = ctx.config();
        let store = ResultStore::new(&config.output_dir, &config.failure_log);
        let policy = config.retry_policy();
        let cooldown = config.cooldown();
        let progress = config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));
        Self {
            ctx,
            source,
            backend,
            store,
            policy,
            cooldown,
            progress,
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// List the source, prepare output directories, then [`run`](Self::run).
    pub async fn run_all(&self, schema: &ExtractionSchema) -> Result<BatchSummary, ExtractError> {
        let documents = self.source.list()?;
        self.store.ensure_dirs()?;
        Ok(self.run(documents, schema).await)
    }

    /// Process `documents` in name order. Never fails: per-document errors
    /// are recorded, not returned.
    pub async fn run(&self, documents: Vec<DocumentId>, schema: &ExtractionSchema) -> BatchSummary {
        let span = self.ctx.span().clone();
        self.run_inner(documents, schema).instrument(span).await
    }

    async fn run_inner(
        &self,
        mut documents: Vec<DocumentId>,
        schema: &ExtractionSchema,
    ) -> BatchSummary {
        documents.sort();
        documents.dedup();

        let total = documents.len();
        let started = Instant::now();
        info!(
            "Starting batch: {} documents, schema '{}' ({} fields), model {}",
            total,
            schema.name(),
            schema.len(),
            self.backend.model_name()
        );
        self.progress.on_batch_start(total);

        let mut outcomes = Vec::with_capacity(total);
        let mut processed_any = false;
        let mut claimed: HashMap<String, &str> = HashMap::with_capacity(total);

        for (index, doc) in documents.iter().enumerate() {
            let key = doc.checkpoint_key();
            if let Some(first) = claimed.get(key.as_str()) {
                let err = DocumentError::DuplicateKey {
                    key: key.clone(),
                    taken_by: first.to_string(),
                };
                outcomes.push(self.record_failure(index, total, doc, err));
                continue;
            }
            claimed.insert(key.clone(), doc.name.as_str());

            if self.store.has_result(&key) {
                info!("Skipping {} (result exists)", doc);
                self.progress.on_document_skipped(index, total, &doc.name);
                outcomes.push(DocumentOutcome {
                    document: doc.name.clone(),
                    state: DocumentState::Skipped,
                    attempts: 0,
                    result_path: Some(self.store.result_path(&key)),
                    error: None,
                });
                continue;
            }

            if processed_any && !self.cooldown.is_zero() {
                debug!("Cooling down for {:?}", self.cooldown);
                tokio::time::sleep(self.cooldown).await;
            }
            processed_any = true;

            let span = self.ctx.document_span(&doc.name);
            let outcome = self
                .process_document(index, total, doc, &key, schema)
                .instrument(span)
                .await;
            outcomes.push(outcome);
        }

        let count = |state: DocumentState| outcomes.iter().filter(|o| o.state == state).count();
        let summary = BatchSummary {
            run_id: self.ctx.run_id().to_string(),
            total,
            skipped: count(DocumentState::Skipped),
            succeeded: count(DocumentState::Succeeded),
            failed: count(DocumentState::Failed),
            duration_ms: started.elapsed().as_millis() as u64,
            outcomes,
        };

        info!(
            "Batch complete: {} succeeded, {} skipped, {} failed ({} ms)",
            summary.succeeded, summary.skipped, summary.failed, summary.duration_ms
        );
        self.progress
            .on_batch_complete(total, summary.succeeded, summary.skipped, summary.failed);
        summary
    }

    async fn process_document(
        &self,
        index: usize,
        total: usize,
        doc: &DocumentId,
        key: &str,
        schema: &ExtractionSchema,
    ) -> DocumentOutcome {
        info!("Processing {} ({}/{})", doc, index + 1, total);
        self.progress.on_document_start(index, total, &doc.name);

        match self.extract_and_persist(doc, key, schema).await {
            Ok((path, attempts)) => {
                info!("Saved {}", path.display());
                self.progress.on_document_complete(index, total, &doc.name);
                DocumentOutcome {
                    document: doc.name.clone(),
                    state: DocumentState::Succeeded,
                    attempts,
                    result_path: Some(path),
                    error: None,
                }
            }
            Err(err) => self.record_failure(index, total, doc, err),
        }
    }

    /// Failure-log entry, progress event and outcome for a failed document.
    fn record_failure(
        &self,
        index: usize,
        total: usize,
        doc: &DocumentId,
        err: DocumentError,
    ) -> DocumentOutcome {
        error!("Failed {}: {}", doc, err);
        let entry = FailureEntry {
            timestamp: Local::now(),
            document_id: doc.name.clone(),
            error: err.to_string(),
        };
        if let Err(log_err) = self.store.append_failure(&entry) {
            error!(
                "Could not append to failure log {}: {}",
                self.store.failure_log().display(),
                log_err
            );
        }
        self.progress
            .on_document_error(index, total, &doc.name, &err.to_string());
        DocumentOutcome {
            document: doc.name.clone(),
            state: DocumentState::Failed,
            attempts: err.attempts(),
            result_path: None,
            error: Some(err),
        }
    }

    /// Read → normalise → extract with retries → persist.
    async fn extract_and_persist(
        &self,
        doc: &DocumentId,
        key: &str,
        schema: &ExtractionSchema,
    ) -> Result<(PathBuf, u32), DocumentError> {
        let start_time = Local::now();
        let started = Instant::now();

        let text = self.read_text(doc).await?;
        let character_count = text.chars().count();
        let (extraction, attempts) = self.extract_with_retry(doc, schema, &text).await?;

        let result = RunResult {
            metadata: RunMetadata {
                model_used: self.backend.model_name().to_string(),
                start_time,
                end_time: Local::now(),
                duration_seconds: started.elapsed().as_secs_f64(),
                source_document_id: doc.name.clone(),
                character_count,
                attempts,
                input_tokens: extraction.input_tokens,
                output_tokens: extraction.output_tokens,
            },
            extraction: extraction.record,
        };
        let path = self.store.write_result(key, &result)?;
        Ok((path, attempts))
    }

    /// Extract one document with the full retry policy, without touching the
    /// store. Returns the extraction and the number of attempts used.
    pub async fn extract_one(
        &self,
        doc: &DocumentId,
        schema: &ExtractionSchema,
    ) -> Result<(Extraction, u32), DocumentError> {
        let span = self.ctx.document_span(&doc.name);
        async {
            let text = self.read_text(doc).await?;
            self.extract_with_retry(doc, schema, &text).await
        }
        .instrument(span)
        .await
    }

    /// Page text, normalised; empty text is a document failure.
    async fn read_text(&self, doc: &DocumentId) -> Result<String, DocumentError> {
        let pages = self.source.read_pages(doc).await?;
        let text = normalize(&pages);
        if text.trim().is_empty() {
            return Err(DocumentError::EmptyText);
        }
        debug!(
            "{} pages, {} characters after normalisation",
            pages.len(),
            text.chars().count()
        );
        Ok(text)
    }

    /// Drive the backend until success, a permanent error, or the attempt cap.
    async fn extract_with_retry(
        &self,
        doc: &DocumentId,
        schema: &ExtractionSchema,
        text: &str,
    ) -> Result<(Extraction, u32), DocumentError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!("Attempt {}/{}", attempt, self.policy.max_attempts);

            let err = match self.backend.extract(schema, text).await {
                Ok(extraction) => return Ok((extraction, attempt)),
                Err(err) => err,
            };

            let kind = err.kind();
            match self.policy.decide(kind, attempt) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        "Attempt {}/{} failed: {}; retrying in {}s",
                        attempt,
                        self.policy.max_attempts,
                        err,
                        delay.as_secs()
                    );
                    self.progress
                        .on_retry(&doc.name, attempt, delay, &err.to_string());
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::Abort => {
                    return Err(match kind {
                        ErrorKind::Permanent => DocumentError::Extraction {
                            attempts: attempt,
                            source: err,
                        },
                        ErrorKind::Transient => DocumentError::RetriesExhausted {
                            attempts: attempt,
                            source: err,
                        },
                    });
                }
            }
        }
    }
}
