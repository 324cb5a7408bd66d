//! Progress-callback trait for per-document batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to observe a
//! batch as it runs. The CLI uses this to drive its progress bar; library
//! users can forward events to a channel, a database or a log.
//!
//! # Example
//!
//! ```rust
//! use edgequake_extract::{BatchProgressCallback, ExtractionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counting {
//!     done: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for Counting {
//!     fn on_document_complete(&self, index: usize, total: usize, document: &str) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("[{}/{}] {}", index + 1, total, document);
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(Counting { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;
use std::time::Duration;

/// Called by the batch orchestrator as it processes each document.
///
/// All methods default to no-ops. `index` is 0-based into the sorted
/// document list; `total` is its length. Events for one document always
/// arrive in the order start → (retry)* → complete | error, or just skipped.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once, before the first document.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// A checkpoint exists; the document will not be processed.
    fn on_document_skipped(&self, index: usize, total: usize, document: &str) {
        let _ = (index, total, document);
    }

    /// Processing begins (text extraction, then the backend call).
    fn on_document_start(&self, index: usize, total: usize, document: &str) {
        let _ = (index, total, document);
    }

    /// A transient failure on `attempt`; the next attempt follows after `delay`.
    fn on_retry(&self, document: &str, attempt: u32, delay: Duration, error: &str) {
        let _ = (document, attempt, delay, error);
    }

    /// The result was persisted.
    fn on_document_complete(&self, index: usize, total: usize, document: &str) {
        let _ = (index, total, document);
    }

    /// The document failed and was written to the failure log.
    fn on_document_error(&self, index: usize, total: usize, document: &str, error: &str) {
        let _ = (index, total, document, error);
    }

    /// Called once, after the last document.
    fn on_batch_complete(&self, total: usize, succeeded: usize, skipped: usize, failed: usize) {
        let _ = (total, succeeded, skipped, failed);
    }
}

/// Default when no callback is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
