//! Configuration types for batch extraction.
//!
//! All run behaviour is controlled through [`ExtractionConfig`], built via
//! its [`ExtractionConfigBuilder`]. One config is cloned into the
//! [`RunContext`](crate::context::RunContext) of each run, so two runs can be
//! compared by their logged configs.

use crate::error::ExtractError;
use crate::pipeline::retry::RetryPolicy;
use crate::progress::ProgressCallback;
use crate::schema::DEFAULT_SCHEMA_NAME;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Model requested when nothing else is configured.
pub const DEFAULT_MODEL: &str = "academic-extractor";

/// Provider used when neither the config nor the environment names one.
pub const DEFAULT_PROVIDER: &str = "ollama";

/// Configuration for a batch extraction run.
///
/// # Example
/// ```rust
/// use edgequake_extract::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .model("qwen2.5:14b")
///     .provider_name("ollama")
///     .output_dir("out")
///     .cooldown_secs(0)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_attempts, 5);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Model identifier passed to the provider. Default: `academic-extractor`.
    pub model: String,

    /// LLM provider name (e.g. "ollama", "openai", "anthropic").
    /// If None, see the resolution chain in [`crate::extract::resolve_provider`].
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Response token ceiling per call. Default: 4096.
    ///
    /// Records are small; a model that needs more than this is usually
    /// looping, and the truncated output fails validation as malformed.
    pub max_tokens: usize,

    /// Backend attempts per document, including the first. Default: 5.
    pub max_attempts: u32,

    /// Fixed part of the backoff delay, in seconds. Default: 5.
    ///
    /// The wait after failed attempt `n` is `2^n + backoff_base_secs`.
    pub backoff_base_secs: u64,

    /// Pause between processed documents, in seconds. Default: 5.
    ///
    /// Local inference servers queue requests on one accelerator; the pause
    /// lets them release KV cache before the next long prompt.
    pub cooldown_secs: u64,

    /// Per-call timeout in seconds. Default: 1000.
    pub api_timeout_secs: u64,

    /// Directory that receives one `<stem>.json` per document. Default: `results`.
    pub output_dir: PathBuf,

    /// JSON Lines failure log. Default: `results/failures.jsonl`.
    pub failure_log: PathBuf,

    /// Document file extension to pick up. Default: `pdf`.
    pub extension: String,

    /// Title of the rendered JSON Schema. Default: `AcademicPaperExtraction`.
    pub schema_name: String,

    /// Custom task framing. If None, uses [`crate::prompts::DEFAULT_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// Optional per-document event sink.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_attempts: 5,
            backoff_base_secs: 5,
            cooldown_secs: 5,
            api_timeout_secs: 1000,
            output_dir: PathBuf::from("results"),
            failure_log: PathBuf::from("results/failures.jsonl"),
            extension: "pdf".to_string(),
            schema_name: DEFAULT_SCHEMA_NAME.to_string(),
            system_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_attempts", &self.max_attempts)
            .field("backoff_base_secs", &self.backoff_base_secs)
            .field("cooldown_secs", &self.cooldown_secs)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("output_dir", &self.output_dir)
            .field("failure_log", &self.failure_log)
            .field("extension", &self.extension)
            .field("schema_name", &self.schema_name)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.backoff_base_secs))
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl fmt::Debug for ExtractionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ExtractionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn backoff_base_secs(mut self, secs: u64) -> Self {
        self.config.backoff_base_secs = secs;
        self
    }

    pub fn cooldown_secs(mut self, secs: u64) -> Self {
        self.config.cooldown_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn failure_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.failure_log = path.into();
        self
    }

    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        self.config.extension = ext.into();
        self
    }

    pub fn schema_name(mut self, name: impl Into<String>) -> Self {
        self.config.schema_name = name.into();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(ExtractError::InvalidConfig("Model name must not be empty".into()));
        }
        if c.max_attempts == 0 {
            return Err(ExtractError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(ExtractError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(ExtractError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.extension.trim_start_matches('.').trim().is_empty() {
            return Err(ExtractError::InvalidConfig(
                "Document extension must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
