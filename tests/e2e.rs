//! End-to-end integration tests for edgequake-extract.
//!
//! These tests make live LLM calls through the configured provider
//! (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, or local Ollama with
//! `E2E_MODEL`). They are gated behind the `E2E_ENABLED` environment
//! variable so they do not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 E2E_MODEL=llama3.1 cargo test --test e2e -- --nocapture
//!
//! PDF tests additionally need pdfium and a paper in `./test_cases/`:
//!   DYLD_LIBRARY_PATH=. E2E_ENABLED=1 cargo test --test e2e pdf -- --nocapture

use edgequake_extract::{
    extract_directory, extract_document, DocumentState, ExtractionConfig, ExtractionSchema,
    FieldDescriptor, FieldValue,
};
use std::path::PathBuf;
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip this test unless E2E_ENABLED is set.
macro_rules! e2e_skip_unless_enabled {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    }};
}

/// Skip this test unless E2E_ENABLED is set *and* a file exists at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        e2e_skip_unless_enabled!();
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            return;
        }
        p
    }};
}

fn config(dir: &TempDir) -> ExtractionConfig {
    let mut builder = ExtractionConfig::builder()
        .output_dir(dir.path().join("results"))
        .failure_log(dir.path().join("results/failures.jsonl"))
        .cooldown_secs(0)
        .api_timeout_secs(300);
    if let Ok(model) = std::env::var("E2E_MODEL") {
        builder = builder.model(model);
    }
    builder.build().expect("valid config")
}

fn paper_schema() -> ExtractionSchema {
    ExtractionSchema::compile(
        "AcademicPaperExtraction",
        &[
            FieldDescriptor::new("title", "What is the title of the paper?").required(true),
            FieldDescriptor::new("year", "In which year was the paper published?")
                .output_type("integer")
                .hint("Four-digit year"),
            FieldDescriptor::new("authors", "Who are the authors?")
                .output_type("list[string]")
                .example("Smith, J. and Doe, A.", "[\"J. Smith\", \"A. Doe\"]"),
            FieldDescriptor::new("uses_deep_learning", "Does the paper use deep learning?")
                .output_type("boolean"),
        ],
    )
    .expect("schema compiles")
}

const SYNTHETIC_PAPER: &str = "\
Proceedings of the Workshop on Tiny Models\n\
Sparse Gradients for Small Networks\n\
Ada Lovelace and Charles Babbage\n\
Published 2021\n\
Abstract. We train a convolutional neural network with sparse gradient updates.\n\
\u{c}\
Proceedings of the Workshop on Tiny Models\n\
1 Introduction\n\
Deep learning models are expensive to train. Our method reduces cost by 40 percent.\n";

// ── Text documents (no pdfium) ───────────────────────────────────────────────

#[tokio::test]
async fn test_extract_text_document() {
    e2e_skip_unless_enabled!();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sparse.txt");
    std::fs::write(&path, SYNTHETIC_PAPER).unwrap();

    let extraction = extract_document(&path, &paper_schema(), &config(&dir))
        .await
        .expect("extraction should succeed");

    let title = extraction.record.get("title").expect("title present");
    match title {
        FieldValue::String(t) => assert!(
            t.to_lowercase().contains("sparse gradients"),
            "unexpected title {t:?}"
        ),
        other => panic!("title should be a string, got {other:?}"),
    }
    if let Some(year) = extraction.record.get("year") {
        assert_eq!(year, &FieldValue::Integer(2021));
    }
    println!("Record: {}", serde_json::to_string_pretty(&extraction.record).unwrap());
}

#[tokio::test]
async fn test_batch_is_resumable() {
    e2e_skip_unless_enabled!();

    let dir = TempDir::new().unwrap();
    let input = dir.path().join("papers");
    std::fs::create_dir_all(&input).unwrap();
    std::fs::write(input.join("one.txt"), SYNTHETIC_PAPER).unwrap();
    std::fs::write(input.join("two.txt"), SYNTHETIC_PAPER).unwrap();

    let config = ExtractionConfig {
        extension: "txt".into(),
        ..config(&dir)
    };
    let schema = paper_schema();

    let first = extract_directory(&input, &schema, &config).await.unwrap();
    assert_eq!(first.total, 2);
    assert_eq!(first.failed, 0, "failures: {:?}", first.failures().collect::<Vec<_>>());

    let before = std::fs::read(dir.path().join("results/one.json")).unwrap();
    let second = extract_directory(&input, &schema, &config).await.unwrap();
    assert!(second
        .outcomes
        .iter()
        .all(|o| o.state == DocumentState::Skipped));
    assert_eq!(std::fs::read(dir.path().join("results/one.json")).unwrap(), before);
}

// ── PDF documents ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_extract_pdf_attention_paper() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("attention_is_all_you_need.pdf"));

    let dir = TempDir::new().unwrap();
    let extraction = extract_document(&path, &paper_schema(), &config(&dir))
        .await
        .expect("extraction should succeed");

    match extraction.record.get("title") {
        Some(FieldValue::String(t)) => assert!(t.contains("Attention"), "title {t:?}"),
        other => panic!("unexpected title {other:?}"),
    }
    println!(
        "{} input tokens, {} output tokens",
        extraction.input_tokens, extraction.output_tokens
    );
}

#[tokio::test]
async fn test_missing_document_is_an_error() {
    e2e_skip_unless_enabled!();

    let dir = TempDir::new().unwrap();
    let result = extract_document(
        "/definitely/not/a/real/file.pdf",
        &paper_schema(),
        &config(&dir),
    )
    .await;
    assert!(result.is_err());
}
