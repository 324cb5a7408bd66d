//! Schema compiler: field descriptors → runtime-validated record type.
//!
//! A descriptor file is an ordered list of extraction questions:
//!
//! ```yaml
//! - item_name: publication_year
//!   question: In which year was the paper published?
//!   hint: Use the year on the first page, not the arXiv date.
//!   examples:
//!     - input: "Published 2019"
//!       output: "2019"
//!   output_type: integer
//!   is_required: true
//! ```
//!
//! [`ExtractionSchema::compile`] turns the list into an immutable
//! [`ExtractionSchema`]: an ordered mapping from field name to
//! `(OutputKind, required, prompt_text)`. The same schema instance is used
//! twice per document: rendered into the prompt so the model knows what to
//! produce, and as the validator for what it actually produced. Validation is
//! one generic function over [`OutputKind`], not per-field generated code.

use crate::error::SchemaError;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

/// Title used when a schema is compiled without an explicit name.
pub const DEFAULT_SCHEMA_NAME: &str = "AcademicPaperExtraction";

// ── Output kinds ─────────────────────────────────────────────────────────

/// The value type a field must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OutputKind {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "integer")]
    Integer,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "list[string]")]
    StringList,
    #[serde(rename = "list[integer]")]
    IntegerList,
}

impl OutputKind {
    /// Parse a descriptor `output_type`, case-insensitively.
    ///
    /// Returns `None` for unrecognised names; see [`OutputKind::resolve`].
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "string" => Some(OutputKind::String),
            "integer" => Some(OutputKind::Integer),
            "float" => Some(OutputKind::Float),
            "boolean" => Some(OutputKind::Boolean),
            "list[string]" | "list-of-string" => Some(OutputKind::StringList),
            "list[integer]" | "list-of-integer" => Some(OutputKind::IntegerList),
            _ => None,
        }
    }

    /// Parse an `output_type`, falling back to [`OutputKind::String`].
    ///
    /// The fallback is logged: a typo such as `intger` still yields a usable
    /// field, and a string can always carry what the model found.
    pub fn resolve(s: &str) -> Self {
        Self::parse(s).unwrap_or_else(|| {
            warn!("Unknown output_type '{}', falling back to string", s.trim());
            OutputKind::String
        })
    }

    /// Canonical descriptor spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputKind::String => "string",
            OutputKind::Integer => "integer",
            OutputKind::Float => "float",
            OutputKind::Boolean => "boolean",
            OutputKind::StringList => "list[string]",
            OutputKind::IntegerList => "list[integer]",
        }
    }

    /// JSON Schema fragment for this kind, nullable when the field is optional.
    fn json_schema(&self, nullable: bool) -> Value {
        let scalar = |t: &str| {
            if nullable {
                json!([t, "null"])
            } else {
                json!(t)
            }
        };
        match self {
            OutputKind::String => json!({ "type": scalar("string") }),
            OutputKind::Integer => json!({ "type": scalar("integer") }),
            OutputKind::Float => json!({ "type": scalar("number") }),
            OutputKind::Boolean => json!({ "type": scalar("boolean") }),
            OutputKind::StringList => {
                json!({ "type": scalar("array"), "items": { "type": "string" } })
            }
            OutputKind::IntegerList => {
                json!({ "type": scalar("array"), "items": { "type": "integer" } })
            }
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Descriptors ──────────────────────────────────────────────────────────

/// One worked example attached to a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldExample {
    pub input: String,
    pub output: String,
}

/// One declarative unit of extraction intent, as written in the descriptor file.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Output record key (`item_name`).
    pub name: String,
    /// Base question shown to the model.
    pub question: String,
    pub hint: Option<String>,
    pub examples: Vec<FieldExample>,
    /// Raw `output_type` string; resolved during compilation.
    pub output_type: String,
    /// `is_required`.
    pub required: bool,
}

impl FieldDescriptor {
    /// A descriptor with only a name and question; string-typed and optional.
    pub fn new(name: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            question: question.into(),
            hint: None,
            examples: Vec::new(),
            output_type: OutputKind::String.as_str().to_string(),
            required: false,
        }
    }

    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn example(mut self, input: impl Into<String>, output: impl Into<String>) -> Self {
        self.examples.push(FieldExample {
            input: input.into(),
            output: output.into(),
        });
        self
    }

    pub fn output_type(mut self, output_type: impl Into<String>) -> Self {
        self.output_type = output_type.into();
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Question, then ` (Hint: …)`, then ` [Examples: …]`, in that order.
    pub fn prompt_text(&self) -> String {
        let mut text = self.question.clone();
        if let Some(hint) = self.hint.as_deref().filter(|h| !h.is_empty()) {
            text.push_str(&format!(" (Hint: {hint})"));
        }
        if !self.examples.is_empty() {
            let rendered: Vec<String> = self
                .examples
                .iter()
                .map(|ex| format!("Input: {} -> Output: {}", ex.input, ex.output))
                .collect();
            text.push_str(&format!(" [Examples: {}]", rendered.join(" | ")));
        }
        text
    }
}

/// Parse a descriptor list from an already-deserialised document.
///
/// Structural problems (not a list, entry not a mapping, missing
/// `item_name`, wrongly typed keys) are errors. Malformed example entries are
/// skipped with a warning instead: one bad example should not cost the run.
pub fn parse_descriptors(source: &Value) -> Result<Vec<FieldDescriptor>, SchemaError> {
    let entries = source.as_array().ok_or_else(|| SchemaError::NotAList {
        found: json_type_name(source).to_string(),
    })?;
    if entries.is_empty() {
        return Err(SchemaError::Empty);
    }

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| parse_descriptor(index, entry))
        .collect()
}

fn parse_descriptor(index: usize, entry: &Value) -> Result<FieldDescriptor, SchemaError> {
    let map = entry
        .as_object()
        .ok_or_else(|| SchemaError::EntryNotAMapping {
            index,
            found: json_type_name(entry).to_string(),
        })?;

    let name = match map.get("item_name") {
        None | Some(Value::Null) => {
            return Err(SchemaError::MissingKey {
                index,
                key: "item_name",
            })
        }
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(_) => {
            return Err(SchemaError::InvalidValue {
                index,
                key: "item_name",
                expected: "a non-empty string",
            })
        }
    };

    let question = optional_string(map, index, "question")?.unwrap_or_default();
    let hint = optional_scalar(map, index, "hint")?.filter(|h| !h.is_empty());
    let output_type = optional_string(map, index, "output_type")?
        .unwrap_or_else(|| OutputKind::String.as_str().to_string());

    let required = match map.get("is_required") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => {
            return Err(SchemaError::InvalidValue {
                index,
                key: "is_required",
                expected: "a boolean",
            })
        }
    };

    let examples = match map.get("examples") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                let ex = parse_example(item);
                if ex.is_none() {
                    warn!(field = %name, "Skipping malformed example entry: {}", item);
                }
                ex
            })
            .collect(),
        Some(other) => {
            warn!(field = %name, "Ignoring 'examples' that is not a list: {}", other);
            Vec::new()
        }
    };

    Ok(FieldDescriptor {
        name,
        question,
        hint,
        examples,
        output_type,
        required,
    })
}

fn optional_string(
    map: &Map<String, Value>,
    index: usize,
    key: &'static str,
) -> Result<Option<String>, SchemaError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(SchemaError::InvalidValue {
            index,
            key,
            expected: "a string",
        }),
    }
}

/// An example is usable only as a mapping carrying both `input` and `output`.
fn parse_example(item: &Value) -> Option<FieldExample> {
    let map = item.as_object()?;
    let input = scalar_text(map.get("input")?)?;
    let output = scalar_text(map.get("output")?)?;
    Some(FieldExample { input, output })
}

/// Like [`optional_string`], but numbers, booleans and lists are rendered
/// as text (`hint: 2019`).
fn optional_scalar(
    map: &Map<String, Value>,
    index: usize,
    key: &'static str,
) -> Result<Option<String>, SchemaError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => scalar_text(v).map(Some).ok_or(SchemaError::InvalidValue {
            index,
            key,
            expected: "a string or scalar",
        }),
    }
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) => Some(v.to_string()),
        Value::Null | Value::Object(_) => None,
    }
}

// ── Compiled schema ──────────────────────────────────────────────────────

/// One compiled field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: OutputKind,
    pub required: bool,
    pub prompt_text: String,
}

/// Immutable, ordered field mapping compiled from descriptors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionSchema {
    name: String,
    fields: Vec<FieldSpec>,
}

impl ExtractionSchema {
    /// Compile descriptors into a schema, preserving descriptor order.
    ///
    /// Duplicate names are rejected: with silent overwrite the surviving
    /// question would depend on file order, and half the author's intent
    /// would vanish without a trace.
    pub fn compile(
        name: impl Into<String>,
        descriptors: &[FieldDescriptor],
    ) -> Result<Self, SchemaError> {
        if descriptors.is_empty() {
            return Err(SchemaError::Empty);
        }

        let mut seen: HashMap<&str, usize> = HashMap::with_capacity(descriptors.len());
        let mut fields = Vec::with_capacity(descriptors.len());

        for (index, d) in descriptors.iter().enumerate() {
            if let Some(&first) = seen.get(d.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    name: d.name.clone(),
                    first,
                    second: index,
                });
            }
            seen.insert(d.name.as_str(), index);

            fields.push(FieldSpec {
                name: d.name.clone(),
                kind: OutputKind::resolve(&d.output_type),
                required: d.required,
                prompt_text: d.prompt_text(),
            });
        }

        let schema = Self {
            name: name.into(),
            fields,
        };
        debug!(
            "Compiled schema '{}': {} fields ({} required)",
            schema.name,
            schema.fields.len(),
            schema.required_count()
        );
        Ok(schema)
    }

    /// Parse and compile a descriptor document already held in memory.
    pub fn from_value(name: impl Into<String>, source: &Value) -> Result<Self, SchemaError> {
        let descriptors = parse_descriptors(source)?;
        Self::compile(name, &descriptors)
    }

    /// Parse and compile YAML descriptor text.
    pub fn from_yaml_str(name: impl Into<String>, yaml: &str) -> Result<Self, SchemaError> {
        let source: Value = serde_yaml::from_str(yaml).map_err(|e| SchemaError::Parse {
            detail: e.to_string(),
        })?;
        Self::from_value(name, &source)
    }

    /// Parse and compile JSON descriptor text.
    pub fn from_json_str(name: impl Into<String>, json: &str) -> Result<Self, SchemaError> {
        let source: Value = serde_json::from_str(json).map_err(|e| SchemaError::Parse {
            detail: e.to_string(),
        })?;
        Self::from_value(name, &source)
    }

    /// Load a descriptor file. `.json` files are parsed as JSON, anything
    /// else as YAML (a superset of JSON).
    pub fn load(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SchemaError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(name, &text)
        } else {
            Self::from_yaml_str(name, &text)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in descriptor order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn required_count(&self) -> usize {
        self.fields.iter().filter(|f| f.required).count()
    }

    /// Render as a JSON Schema object (draft-07 subset) for the prompt.
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        for f in &self.fields {
            let mut prop = f.kind.json_schema(!f.required);
            if let Value::Object(ref mut m) = prop {
                m.insert("description".into(), Value::String(f.prompt_text.clone()));
            }
            properties.insert(f.name.clone(), prop);
        }
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();

        json!({
            "title": self.name,
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Validate a model-produced JSON value into a record.
    ///
    /// Keys not in the schema are dropped; the returned record always holds
    /// exactly the schema's field names, in schema order.
    pub fn validate(&self, value: &Value) -> Result<ExtractionRecord, ValidationError> {
        let obj = value.as_object().ok_or_else(|| ValidationError {
            issues: vec![FieldIssue {
                field: "<root>".into(),
                problem: format!("expected a JSON object, found {}", json_type_name(value)),
            }],
        })?;

        let mut issues = Vec::new();
        let mut values = Vec::with_capacity(self.fields.len());

        for f in &self.fields {
            match obj.get(&f.name) {
                None | Some(Value::Null) if f.required => issues.push(FieldIssue {
                    field: f.name.clone(),
                    problem: "required field is missing or null".into(),
                }),
                None | Some(Value::Null) => values.push((f.name.clone(), None)),
                Some(v) => match coerce(f.kind, v) {
                    Ok(fv) => values.push((f.name.clone(), Some(fv))),
                    Err(problem) => issues.push(FieldIssue {
                        field: f.name.clone(),
                        problem,
                    }),
                },
            }
        }

        let extra: Vec<&String> = obj.keys().filter(|k| self.field(k).is_none()).collect();
        if !extra.is_empty() {
            debug!("Dropping {} keys not in schema: {:?}", extra.len(), extra);
        }

        if issues.is_empty() {
            Ok(ExtractionRecord { values })
        } else {
            Err(ValidationError { issues })
        }
    }
}

/// Check one JSON value against a kind.
fn coerce(kind: OutputKind, v: &Value) -> Result<FieldValue, String> {
    let mismatch = || format!("expected {}, found {}", kind, json_type_name(v));
    match kind {
        OutputKind::String => v
            .as_str()
            .map(|s| FieldValue::String(s.to_string()))
            .ok_or_else(mismatch),
        OutputKind::Integer => as_integer(v).map(FieldValue::Integer).ok_or_else(mismatch),
        OutputKind::Float => v.as_f64().map(FieldValue::Float).ok_or_else(mismatch),
        OutputKind::Boolean => v.as_bool().map(FieldValue::Boolean).ok_or_else(mismatch),
        OutputKind::StringList => v
            .as_array()
            .and_then(|items| {
                items
                    .iter()
                    .map(|i| i.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
            })
            .map(FieldValue::StringList)
            .ok_or_else(mismatch),
        OutputKind::IntegerList => v
            .as_array()
            .and_then(|items| items.iter().map(as_integer).collect::<Option<Vec<_>>>())
            .map(FieldValue::IntegerList)
            .ok_or_else(mismatch),
    }
}

/// Integers, plus floats with no fractional part (`2019.0`).
fn as_integer(v: &Value) -> Option<i64> {
    if let Some(i) = v.as_i64() {
        return Some(i);
    }
    let f = v.as_f64()?;
    // i64::MAX rounds up to 2^63 as f64, which does not fit.
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

// ── Records ──────────────────────────────────────────────────────────────

/// A validated field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    StringList(Vec<String>),
    IntegerList(Vec<i64>),
}

impl FieldValue {
    pub fn kind(&self) -> OutputKind {
        match self {
            FieldValue::String(_) => OutputKind::String,
            FieldValue::Integer(_) => OutputKind::Integer,
            FieldValue::Float(_) => OutputKind::Float,
            FieldValue::Boolean(_) => OutputKind::Boolean,
            FieldValue::StringList(_) => OutputKind::StringList,
            FieldValue::IntegerList(_) => OutputKind::IntegerList,
        }
    }
}

/// One instance conforming to an [`ExtractionSchema`].
///
/// Only [`ExtractionSchema::validate`] constructs records, so keys are always
/// exactly the schema's field names. Serialises as a JSON object in schema
/// order, absent optional fields as `null`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRecord {
    values: Vec<(String, Option<FieldValue>)>,
}

impl ExtractionRecord {
    /// Value of a field; `None` when absent or not in the schema.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values
            .iter()
            .find(|(k, _)| k == name)
            .and_then(|(_, v)| v.as_ref())
    }

    pub fn contains_field(&self, name: &str) -> bool {
        self.values.iter().any(|(k, _)| k == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&FieldValue>)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for ExtractionRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (k, v) in &self.values {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: String,
    pub problem: String,
}

/// Why a model answer failed validation. Lists every offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .issues
            .iter()
            .map(|i| format!("{}: {}", i.field, i.problem))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    const QUERIES: &str = r#"
- item_name: title
  question: What is the title of the paper?
  output_type: string
  is_required: true
- item_name: publication_year
  question: In which year was the paper published?
  hint: Use the conference year
  examples:
    - input: "NeurIPS 2017"
      output: 2017
    - "not a mapping"
    - input: "missing output"
  output_type: Integer
- item_name: authors
  question: Who are the authors?
  output_type: list[string]
- item_name: sample_size
  question: How many participants?
  output_type: intger
"#;

    fn schema() -> ExtractionSchema {
        ExtractionSchema::from_yaml_str(DEFAULT_SCHEMA_NAME, QUERIES).expect("valid schema")
    }

    #[test]
    fn compiles_in_descriptor_order() {
        let s = schema();
        let names: Vec<&str> = s.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["title", "publication_year", "authors", "sample_size"]);
        assert_eq!(s.required_count(), 1);
    }

    #[test]
    fn resolves_kinds_with_string_fallback() {
        let s = schema();
        assert_eq!(s.field("publication_year").unwrap().kind, OutputKind::Integer);
        assert_eq!(s.field("authors").unwrap().kind, OutputKind::StringList);
        assert_eq!(s.field("sample_size").unwrap().kind, OutputKind::String);
    }

    #[test]
    fn prompt_text_joins_question_hint_examples() {
        let s = schema();
        assert_eq!(
            s.field("publication_year").unwrap().prompt_text,
            "In which year was the paper published? (Hint: Use the conference year) \
             [Examples: Input: NeurIPS 2017 -> Output: 2017]"
        );
        assert_eq!(
            s.field("title").unwrap().prompt_text,
            "What is the title of the paper?"
        );
    }

    #[test]
    fn scalar_hints_are_rendered_as_text() {
        let s = ExtractionSchema::from_yaml_str(
            "S",
            "- item_name: year\n  question: Publication year?\n  hint: 2019\n\
             - item_name: open\n  question: Open access?\n  hint: true\n",
        )
        .unwrap();
        assert_eq!(
            s.field("year").unwrap().prompt_text,
            "Publication year? (Hint: 2019)"
        );
        assert_eq!(
            s.field("open").unwrap().prompt_text,
            "Open access? (Hint: true)"
        );

        let err = ExtractionSchema::from_yaml_str("S", "- item_name: a\n  hint: {x: 1}\n")
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidValue { key: "hint", .. }));
    }

    #[test]
    fn builder_descriptor_prompt_text() {
        let d = FieldDescriptor::new("venue", "Where was it published?")
            .hint("conference or journal")
            .example("Proc. ICML", "ICML")
            .example("JMLR vol 3", "JMLR");
        assert_eq!(
            d.prompt_text(),
            "Where was it published? (Hint: conference or journal) \
             [Examples: Input: Proc. ICML -> Output: ICML | Input: JMLR vol 3 -> Output: JMLR]"
        );
    }

    #[test]
    fn rejects_duplicate_names() {
        let descriptors = vec![
            FieldDescriptor::new("title", "first"),
            FieldDescriptor::new("year", "y"),
            FieldDescriptor::new("title", "second"),
        ];
        let err = ExtractionSchema::compile("S", &descriptors).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::DuplicateField { ref name, first: 0, second: 2 } if name == "title"
        ));
    }

    #[test]
    fn rejects_non_list_source() {
        let err = ExtractionSchema::from_yaml_str("S", "title: What?").unwrap_err();
        assert!(matches!(err, SchemaError::NotAList { ref found } if found == "mapping"));
    }

    #[test]
    fn rejects_missing_item_name() {
        let yaml = "- item_name: ok\n  question: q\n- question: no name here\n";
        let err = ExtractionSchema::from_yaml_str("S", yaml).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::MissingKey {
                index: 1,
                key: "item_name"
            }
        ));
    }

    #[test]
    fn rejects_scalar_entry_and_bad_types() {
        let err = ExtractionSchema::from_yaml_str("S", "- just a string\n").unwrap_err();
        assert!(matches!(err, SchemaError::EntryNotAMapping { index: 0, .. }));

        let err =
            ExtractionSchema::from_yaml_str("S", "- item_name: a\n  is_required: maybe\n").unwrap_err();
        assert!(matches!(
            err,
            SchemaError::InvalidValue {
                key: "is_required",
                ..
            }
        ));
    }

    #[test]
    fn rejects_empty_list_and_garbage() {
        assert!(matches!(
            ExtractionSchema::from_yaml_str("S", "[]").unwrap_err(),
            SchemaError::Empty
        ));
        assert!(matches!(
            ExtractionSchema::from_json_str("S", "[{").unwrap_err(),
            SchemaError::Parse { .. }
        ));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = ExtractionSchema::load("S", "/definitely/not/here/queries.yaml").unwrap_err();
        assert!(matches!(err, SchemaError::NotFound { .. }));
    }

    #[test]
    fn every_kind_accepts_matching_and_rejects_mismatched() {
        let cases: Vec<(&str, Value, Value)> = vec![
            ("string", json!("Attention"), json!(42)),
            ("integer", json!(2017), json!("2017")),
            ("float", json!(0.93), json!("high")),
            ("boolean", json!(true), json!("yes")),
            ("list[string]", json!(["a", "b"]), json!(["a", 1])),
            ("list[integer]", json!([1, 2, 3]), json!([1.5])),
        ];
        for (kind, good, bad) in cases {
            let d = FieldDescriptor::new("f", "q").output_type(kind).required(true);
            let s = ExtractionSchema::compile("S", &[d]).unwrap();

            let rec = s
                .validate(&json!({ "f": good }))
                .unwrap_or_else(|e| panic!("{kind} should accept: {e}"));
            assert_eq!(rec.get("f").unwrap().kind().as_str(), kind);

            let err = s.validate(&json!({ "f": bad })).unwrap_err();
            assert_eq!(err.issues.len(), 1, "{kind} should reject exactly one field");
            assert_eq!(err.issues[0].field, "f");
        }
    }

    #[test]
    fn float_accepts_integers_and_integer_accepts_whole_floats() {
        let s = ExtractionSchema::compile(
            "S",
            &[
                FieldDescriptor::new("ratio", "r").output_type("float"),
                FieldDescriptor::new("year", "y").output_type("integer"),
            ],
        )
        .unwrap();
        let rec = s.validate(&json!({ "ratio": 1, "year": 2019.0 })).unwrap();
        assert_eq!(rec.get("ratio"), Some(&FieldValue::Float(1.0)));
        assert_eq!(rec.get("year"), Some(&FieldValue::Integer(2019)));
    }

    #[test]
    fn integer_rejects_floats_outside_i64() {
        let s = ExtractionSchema::compile(
            "S",
            &[FieldDescriptor::new("count", "n").output_type("integer")],
        )
        .unwrap();
        for v in [json!(9223372036854775808.0_f64), json!(1e19), json!(-1e19)] {
            assert!(s.validate(&json!({ "count": v })).is_err(), "{v}");
        }
        let rec = s.validate(&json!({ "count": -9223372036854775808.0_f64 })).unwrap();
        assert_eq!(rec.get("count"), Some(&FieldValue::Integer(i64::MIN)));
    }

    #[test]
    fn optional_fields_may_be_absent_or_null() {
        let s = schema();
        let rec = s
            .validate(&json!({ "title": "Attention Is All You Need", "authors": null }))
            .unwrap();
        assert_eq!(rec.len(), 4);
        assert!(rec.contains_field("sample_size"));
        assert_eq!(rec.get("authors"), None);
        assert_eq!(
            rec.get("title"),
            Some(&FieldValue::String("Attention Is All You Need".into()))
        );
    }

    #[test]
    fn required_field_missing_or_null_is_rejected() {
        let s = schema();
        assert!(s.validate(&json!({})).is_err());
        let err = s.validate(&json!({ "title": null })).unwrap_err();
        assert!(err.to_string().contains("title: required"));
    }

    #[test]
    fn extra_keys_are_dropped() {
        let s = schema();
        let rec = s
            .validate(&json!({ "title": "T", "confidence": 0.9 }))
            .unwrap();
        let names: Vec<&str> = rec.field_names().collect();
        assert_eq!(names, ["title", "publication_year", "authors", "sample_size"]);
        assert!(!rec.contains_field("confidence"));
    }

    #[test]
    fn non_object_answer_is_rejected() {
        let err = schema().validate(&json!(["title"])).unwrap_err();
        assert_eq!(err.issues[0].field, "<root>");
    }

    #[test]
    fn record_serialises_in_schema_order_with_nulls() {
        let s = schema();
        let rec = s
            .validate(&json!({ "authors": ["Vaswani"], "title": "T" }))
            .unwrap();
        let out = serde_json::to_string(&rec).unwrap();
        assert_eq!(
            out,
            r#"{"title":"T","publication_year":null,"authors":["Vaswani"],"sample_size":null}"#
        );
    }

    #[test]
    fn json_schema_marks_required_and_nullable() {
        let js = schema().json_schema();
        assert_eq!(js["title"], DEFAULT_SCHEMA_NAME);
        assert_eq!(js["required"], json!(["title"]));
        assert_eq!(js["properties"]["title"]["type"], "string");
        assert_eq!(js["properties"]["authors"]["type"], json!(["array", "null"]));
        assert_eq!(js["properties"]["authors"]["items"]["type"], "string");
        let keys: Vec<&String> = js["properties"].as_object().unwrap().keys().collect();
        assert_eq!(keys, ["title", "publication_year", "authors", "sample_size"]);
    }
}
