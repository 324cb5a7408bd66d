//! Extraction client adapter: one document text → one validated record.
//!
//! [`ExtractionBackend`] is the seam the orchestrator calls through. The
//! production implementation, [`ProviderBackend`], wraps an edgequake-llm
//! [`LLMProvider`]: it builds the two-message request from [`crate::prompts`],
//! bounds the call with a timeout, parses the completion and validates it
//! against the schema. A record returned from [`ExtractionBackend::extract`]
//! is already validated; callers must not re-validate.
//!
//! ## No retries here
//!
//! The adapter makes exactly one call per `extract`. Every failure is mapped
//! to a [`BackendError`] whose [`ErrorKind`](crate::error::ErrorKind) tells
//! the orchestrator whether another attempt can help.

use crate::error::BackendError;
use crate::pipeline::response::parse_model_output;
use crate::prompts::{system_message, user_message, DEFAULT_SYSTEM_PROMPT};
use crate::schema::{ExtractionRecord, ExtractionSchema};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// `response_format` value that puts OpenAI-compatible backends in JSON mode.
pub const JSON_RESPONSE_FORMAT: &str = "json_object";

/// A validated record plus token accounting for one successful call.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub record: ExtractionRecord,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// A model backend that can fill an [`ExtractionSchema`] from document text.
pub trait ExtractionBackend: Send + Sync {
    /// Label recorded as `model_used` in run metadata.
    fn model_name(&self) -> &str;

    /// One round trip. Never retries.
    fn extract(
        &self,
        schema: &ExtractionSchema,
        document_text: &str,
    ) -> impl Future<Output = Result<Extraction, BackendError>> + Send;
}

/// [`ExtractionBackend`] over any edgequake-llm chat provider.
#[derive(Clone)]
pub struct ProviderBackend {
    provider: Arc<dyn LLMProvider>,
    model: String,
    system_prompt: String,
    temperature: f32,
    max_tokens: usize,
    timeout: Duration,
}

impl std::fmt::Debug for ProviderBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderBackend")
            .field("provider", &"<dyn LLMProvider>")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            temperature: 0.1,
            max_tokens: 4096,
            timeout: Duration::from_secs(1000),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn with_max_tokens(mut self, n: usize) -> Self {
        self.max_tokens = n;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_messages(&self, schema: &ExtractionSchema, document_text: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(system_message(&self.system_prompt, schema)),
            ChatMessage::user(user_message(document_text)),
        ]
    }

    /// JSON mode plus the configured sampling. Providers without a JSON mode
    /// ignore `response_format`; the schema instruction still applies.
    fn build_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            response_format: Some(JSON_RESPONSE_FORMAT.to_string()),
            ..Default::default()
        }
    }
}

impl ExtractionBackend for ProviderBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn extract(
        &self,
        schema: &ExtractionSchema,
        document_text: &str,
    ) -> Result<Extraction, BackendError> {
        let messages = self.build_messages(schema, document_text);
        let options = self.build_options();
        let start = Instant::now();

        let response =
            match tokio::time::timeout(self.timeout, self.provider.chat(&messages, Some(&options)))
                .await
            {
                Err(_) => {
                    return Err(BackendError::Timeout {
                        secs: self.timeout.as_secs(),
                    })
                }
                Ok(Err(e)) => return Err(classify_provider_error(&e.to_string())),
                Ok(Ok(response)) => response,
            };

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            self.model,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        let value = parse_model_output(&response.content)?;
        let record = schema.validate(&value).map_err(|e| {
            warn!("Model output failed validation: {}", e);
            BackendError::SchemaViolation {
                detail: e.to_string(),
            }
        })?;

        Ok(Extraction {
            record,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

/// Map a provider error message onto the transient/permanent taxonomy.
///
/// edgequake-llm surfaces HTTP and transport failures as text, so the
/// classification is by substring. Anything unrecognised is treated as
/// permanent: retrying an unknown failure five times only delays the report.
pub fn classify_provider_error(message: &str) -> BackendError {
    const TRANSIENT_MARKERS: &[&str] = &[
        "timeout",
        "timed out",
        "429",
        "rate limit",
        "too many requests",
        "500",
        "502",
        "503",
        "504",
        "overloaded",
        "unavailable",
        "connection",
        "network",
        "reset by peer",
        "broken pipe",
    ];

    let lower = message.to_lowercase();
    let detail = message.to_string();
    if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
        BackendError::Unavailable { detail }
    } else {
        BackendError::Rejected { detail }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::{FieldDescriptor, FieldValue};
    use async_trait::async_trait;
    use edgequake_llm::{LLMResponse, LlmError, MockProvider};
    use std::sync::Mutex;

    fn schema() -> ExtractionSchema {
        ExtractionSchema::compile(
            "AcademicPaperExtraction",
            &[
                FieldDescriptor::new("title", "Title?").required(true),
                FieldDescriptor::new("year", "Year?").output_type("integer"),
            ],
        )
        .unwrap()
    }

    /// Answers after `delay`, or fails with `error`; records the options it saw.
    struct StubProvider {
        content: String,
        error: Option<String>,
        delay: Duration,
        seen_format: Mutex<Option<String>>,
    }

    impl StubProvider {
        fn answering(content: &str) -> Self {
            Self {
                content: content.to_string(),
                error: None,
                delay: Duration::ZERO,
                seen_format: Mutex::new(None),
            }
        }

        fn failing(error: &str) -> Self {
            Self {
                error: Some(error.to_string()),
                ..Self::answering("")
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::answering(r#"{"title": "Late"}"#)
            }
        }
    }

    #[async_trait]
    impl LLMProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        fn model(&self) -> &str {
            "stub-model"
        }

        fn max_context_length(&self) -> usize {
            8192
        }

        async fn complete(&self, _prompt: &str) -> edgequake_llm::Result<LLMResponse> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.error {
                Some(e) => Err(LlmError::ApiError(e.clone())),
                None => Ok(LLMResponse::new(self.content.clone(), "stub-model")
                    .with_usage(120, 30)),
            }
        }

        async fn complete_with_options(
            &self,
            prompt: &str,
            _options: &CompletionOptions,
        ) -> edgequake_llm::Result<LLMResponse> {
            self.complete(prompt).await
        }

        async fn chat(
            &self,
            _messages: &[ChatMessage],
            options: Option<&CompletionOptions>,
        ) -> edgequake_llm::Result<LLMResponse> {
            *self.seen_format.lock().unwrap() = options.and_then(|o| o.response_format.clone());
            self.complete("").await
        }
    }

    #[test]
    fn build_options_defaults() {
        let backend = ProviderBackend::new(Arc::new(MockProvider::new()), "m");
        let opts = backend.build_options();
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(4096));
        assert_eq!(opts.response_format.as_deref(), Some("json_object"));
    }

    #[test]
    fn build_messages_carry_schema_and_text() {
        let backend = ProviderBackend::new(Arc::new(MockProvider::new()), "m");
        let messages = backend.build_messages(&schema(), "Paper body");
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("\"title\""));
        assert!(messages[1].content.ends_with("Paper body"));
    }

    #[tokio::test]
    async fn fenced_answer_is_parsed_and_validated() {
        let provider = Arc::new(MockProvider::new());
        provider
            .add_response("```json\n{\"title\": \"Attention\", \"year\": 2017}\n```")
            .await;
        let backend = ProviderBackend::new(provider, "m");

        let extraction = backend.extract(&schema(), "text").await.unwrap();
        assert_eq!(
            extraction.record.get("title"),
            Some(&FieldValue::String("Attention".into()))
        );
        assert_eq!(extraction.record.get("year"), Some(&FieldValue::Integer(2017)));
    }

    #[tokio::test]
    async fn token_usage_and_json_mode_reach_the_provider() {
        let provider = Arc::new(StubProvider::answering(r#"{"title": "T"}"#));
        let backend = ProviderBackend::new(provider.clone(), "m");

        let extraction = backend.extract(&schema(), "text").await.unwrap();
        assert_eq!((extraction.input_tokens, extraction.output_tokens), (120, 30));
        assert_eq!(
            provider.seen_format.lock().unwrap().as_deref(),
            Some(JSON_RESPONSE_FORMAT)
        );
    }

    #[tokio::test]
    async fn schema_violation_is_permanent() {
        let provider = Arc::new(MockProvider::new());
        provider.add_response(r#"{"year": "two thousand"}"#).await;
        let backend = ProviderBackend::new(provider, "m");

        let err = backend.extract(&schema(), "text").await.unwrap_err();
        assert!(matches!(err, BackendError::SchemaViolation { .. }), "{err:?}");
        assert_eq!(err.kind(), ErrorKind::Permanent);
    }

    #[tokio::test]
    async fn non_json_answer_is_malformed() {
        let provider = Arc::new(MockProvider::new());
        provider.add_response("I could not find a title.").await;
        let backend = ProviderBackend::new(provider, "m");

        let err = backend.extract(&schema(), "text").await.unwrap_err();
        assert!(matches!(err, BackendError::MalformedOutput { .. }), "{err:?}");
        assert_eq!(err.kind(), ErrorKind::Permanent);
    }

    #[tokio::test]
    async fn provider_errors_are_classified() {
        let provider = Arc::new(StubProvider::failing("HTTP 503 overloaded"));
        let backend = ProviderBackend::new(provider, "m");
        let err = backend.extract(&schema(), "text").await.unwrap_err();
        assert!(matches!(err, BackendError::Unavailable { .. }), "{err:?}");

        let provider = Arc::new(StubProvider::failing("401 invalid key"));
        let backend = ProviderBackend::new(provider, "m");
        let err = backend.extract(&schema(), "text").await.unwrap_err();
        assert!(matches!(err, BackendError::Rejected { .. }), "{err:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out_as_transient() {
        let provider = Arc::new(StubProvider::slow(Duration::from_secs(60)));
        let backend = ProviderBackend::new(provider, "m").with_timeout(Duration::from_secs(10));

        let err = backend.extract(&schema(), "text").await.unwrap_err();
        assert_eq!(err, BackendError::Timeout { secs: 10 });
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[test]
    fn transient_provider_errors() {
        for msg in [
            "HTTP 503 Service Unavailable",
            "Rate limit exceeded (429)",
            "error sending request: connection refused",
            "request timed out",
            "model is overloaded, try later",
        ] {
            assert_eq!(classify_provider_error(msg).kind(), ErrorKind::Transient, "{msg}");
        }
    }

    #[test]
    fn permanent_provider_errors() {
        for msg in [
            "401 Unauthorized: invalid api key",
            "model 'academic-extractor' not found",
            "400 Bad Request",
        ] {
            assert_eq!(classify_provider_error(msg).kind(), ErrorKind::Permanent, "{msg}");
        }
    }
}
