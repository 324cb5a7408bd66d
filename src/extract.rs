//! Top-level entry points: resolve a provider, build a runner, run it.

use crate::config::{ExtractionConfig, DEFAULT_PROVIDER};
use crate::context::RunContext;
use crate::error::ExtractError;
use crate::pipeline::batch::{BatchRunner, BatchSummary};
use crate::pipeline::llm::{Extraction, ProviderBackend};
use crate::pipeline::source::{DirectorySource, DocumentId};
use crate::schema::ExtractionSchema;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Extract every matching document in `input_dir`.
///
/// Documents with an existing result in `config.output_dir` are skipped.
///
/// # Errors
/// Returns `Err(ExtractError)` only for fatal, run-level problems:
/// - `input_dir` missing or unreadable
/// - provider cannot be constructed
/// - output directory cannot be created
///
/// Per-document failures are in the returned [`BatchSummary`] and the
/// failure log.
pub async fn extract_directory(
    input_dir: impl AsRef<Path>,
    schema: &ExtractionSchema,
    config: &ExtractionConfig,
) -> Result<BatchSummary, ExtractError> {
    let input_dir = input_dir.as_ref();
    info!(
        "Extracting '{}' from {} into {}",
        schema.name(),
        input_dir.display(),
        config.output_dir.display()
    );

    let backend = build_backend(config)?;
    let source = DirectorySource::new(input_dir, &config.extension);
    let runner = BatchRunner::new(RunContext::new(config.clone()), source, backend);
    runner.run_all(schema).await
}

/// Synchronous wrapper around [`extract_directory`].
///
/// Creates a temporary tokio runtime. Do not call from within an async context.
pub fn extract_directory_sync(
    input_dir: impl AsRef<Path>,
    schema: &ExtractionSchema,
    config: &ExtractionConfig,
) -> Result<BatchSummary, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_directory(input_dir, schema, config))
}

/// Extract a single document without reading or writing checkpoints.
///
/// The retry policy still applies; a document-level failure is returned as
/// [`ExtractError::Document`].
pub async fn extract_document(
    path: impl AsRef<Path>,
    schema: &ExtractionSchema,
    config: &ExtractionConfig,
) -> Result<Extraction, ExtractError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ExtractError::SourceNotFound {
            path: path.to_path_buf(),
        });
    }
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or(config.extension.as_str());
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let backend = build_backend(config)?;
    let source = DirectorySource::new(dir, extension);
    let runner = BatchRunner::new(RunContext::new(config.clone()), source, backend);

    let (extraction, attempts) = runner
        .extract_one(&DocumentId::from_path(path), schema)
        .await?;
    debug!("{} extracted in {} attempt(s)", path.display(), attempts);
    Ok(extraction)
}

/// Provider wrapped with the configured prompt, sampling and timeout.
pub fn build_backend(config: &ExtractionConfig) -> Result<ProviderBackend, ExtractError> {
    let provider = resolve_provider(config)?;
    let mut backend = ProviderBackend::new(provider, &config.model)
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens)
        .with_timeout(config.api_timeout());
    if let Some(prompt) = &config.system_prompt {
        backend = backend.with_system_prompt(prompt);
    }
    Ok(backend)
}

/// Instantiate a named provider with the given model.
fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ExtractError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is. Tests and
///    callers with custom middleware land here.
/// 2. **Named provider** (`config.provider_name`) with `config.model`.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    both set and non-empty.
/// 4. **Local Ollama** with `config.model`. Extraction runs are usually
///    pointed at a local model; cloud providers must be asked for by name.
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    // 1) User-provided provider takes priority
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    // 2) Provider name + model
    if let Some(ref name) = config.provider_name {
        return create_provider(name, &config.model);
    }

    // 3) Environment pair
    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    // 4) Local default
    create_provider(DEFAULT_PROVIDER, &config.model).map_err(|e| match e {
        ExtractError::ProviderNotConfigured { provider, hint } => {
            ExtractError::ProviderNotConfigured {
                provider,
                hint: format!(
                    "{hint}\nStart Ollama (OLLAMA_HOST, default http://localhost:11434) \
                     or pass --provider / set EDGEQUAKE_LLM_PROVIDER."
                ),
            }
        }
        other => other,
    })
}
