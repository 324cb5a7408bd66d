//! Per-run context: configuration snapshot, run id and logging span.
//!
//! Nothing in the library installs a global logger or reads module-level
//! state. Each batch run creates one [`RunContext`]; its `extraction_run`
//! span is the parent of every per-document span, so all log lines from one
//! invocation share `run_id` and `model` fields and end with the run.

use crate::config::ExtractionConfig;
use chrono::{DateTime, Local};
use tracing::{info_span, Span};

/// Explicit handle passed to the orchestrator for one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    config: ExtractionConfig,
    run_id: String,
    started_at: DateTime<Local>,
    span: Span,
}

impl RunContext {
    pub fn new(config: ExtractionConfig) -> Self {
        let started_at = Local::now();
        let run_id = started_at.format("%Y%m%dT%H%M%S%.3f").to_string();
        let span = info_span!("extraction_run", run_id = %run_id, model = %config.model);
        Self {
            config,
            run_id,
            started_at,
            span,
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Parent span for everything logged during this run.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Child span for one document.
    pub fn document_span(&self, document: &str) -> Span {
        info_span!(parent: &self.span, "document", id = %document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_is_timestamp() {
        let ctx = RunContext::new(ExtractionConfig::default());
        assert_eq!(ctx.run_id().len(), "20240101T120000.000".len());
        assert!(ctx.run_id().contains('T'));
        assert_eq!(ctx.config().model, "academic-extractor");
    }
}
