//! Prompt text for schema-driven extraction.
//!
//! Every string the model sees is built here so prompt changes never touch
//! retry or validation code, and tests can inspect prompts directly.
//!
//! The request is two messages:
//!
//! 1. **System**: the task framing ([`DEFAULT_SYSTEM_PROMPT`] or the
//!    configured override) followed by [`schema_instruction`], which binds the
//!    answer to the compiled schema rendered as JSON Schema.
//! 2. **User**: [`user_message`] wrapping the normalised document text.

use crate::schema::ExtractionSchema;

/// Task framing used when `ExtractionConfig::system_prompt` is `None`.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert academic data extractor.";

/// Prefix of the user message; the document text follows after a blank line.
pub const USER_MESSAGE_PREFIX: &str = "Extract data from this paper:";

/// Output contract appended to the system prompt.
///
/// Field order in the rendered schema follows descriptor order.
pub fn schema_instruction(schema: &ExtractionSchema) -> String {
    let rendered = serde_json::to_string_pretty(&schema.json_schema())
        .unwrap_or_else(|_| schema.json_schema().to_string());
    format!(
        "Respond with a single JSON object that conforms to the following JSON Schema. \
         Use exactly the property names given. Use null for an optional value the paper \
         does not state; never invent values. Output only the JSON object, with no \
         markdown fences and no commentary.\n\n{rendered}"
    )
}

/// Full system message: task framing, then the output contract.
pub fn system_message(base: &str, schema: &ExtractionSchema) -> String {
    format!("{}\n\n{}", base.trim_end(), schema_instruction(schema))
}

/// User message carrying the document text.
pub fn user_message(document_text: &str) -> String {
    format!("{USER_MESSAGE_PREFIX}\n\n{document_text}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDescriptor;

    fn schema() -> ExtractionSchema {
        ExtractionSchema::compile(
            "AcademicPaperExtraction",
            &[
                FieldDescriptor::new("title", "What is the title?").required(true),
                FieldDescriptor::new("year", "Publication year?").output_type("integer"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn system_message_has_framing_and_schema() {
        let msg = system_message(DEFAULT_SYSTEM_PROMPT, &schema());
        assert!(msg.starts_with(DEFAULT_SYSTEM_PROMPT));
        assert!(msg.contains("\"title\": \"AcademicPaperExtraction\""));
        assert!(msg.contains("What is the title?"));
        let title_at = msg.find("\"title\": {").unwrap();
        let year_at = msg.find("\"year\": {").unwrap();
        assert!(title_at < year_at, "properties must keep descriptor order");
    }

    #[test]
    fn user_message_layout() {
        assert_eq!(
            user_message("Abstract. We study..."),
            "Extract data from this paper:\n\nAbstract. We study..."
        );
    }
}
