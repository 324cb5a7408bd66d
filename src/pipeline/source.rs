//! Document source: list document identifiers and read their page text.
//!
//! The orchestrator only pulls from a source; it never writes back. Two
//! formats are supported by [`DirectorySource`]:
//!
//! * **PDF**: text layer read through pdfium, one string per page. pdfium is
//!   blocking and not async-safe, so reads run inside `spawn_blocking`.
//! * **Text**: pre-extracted `.txt` files with pages separated by form feed
//!   (`\x0c`), the layout `pdftotext` produces.

use crate::error::{DocumentError, ExtractError};
use pdfium_render::prelude::*;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Page separator in plain-text documents.
const FORM_FEED: char = '\x0c';

/// A document as the orchestrator sees it.
///
/// Ordered by `name`, which is what makes batch order deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId {
    /// File name including extension, e.g. `attention.pdf`.
    pub name: String,
    pub path: PathBuf,
}

impl DocumentId {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self { name, path }
    }

    /// Key the persisted result is stored under: the file stem.
    pub fn checkpoint_key(&self) -> String {
        Path::new(&self.name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone())
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Pull interface over a collection of documents.
pub trait DocumentSource: Send + Sync {
    /// Every document this source offers, sorted by name.
    fn list(&self) -> Result<Vec<DocumentId>, ExtractError>;

    /// Raw text of each page, in page order.
    fn read_pages(
        &self,
        id: &DocumentId,
    ) -> impl Future<Output = Result<Vec<String>, DocumentError>> + Send;
}

/// On-disk document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentFormat {
    #[default]
    Pdf,
    Text,
}

impl DocumentFormat {
    /// Format implied by a file extension (`pdf` unless `txt`/`text`).
    pub fn from_extension(ext: &str) -> Self {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "txt" | "text" => DocumentFormat::Text,
            _ => DocumentFormat::Pdf,
        }
    }
}

/// All files with one extension in one directory (non-recursive).
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
    extension: String,
    format: DocumentFormat,
}

impl DirectorySource {
    /// `extension` is matched case-insensitively, with or without a leading dot.
    pub fn new(dir: impl Into<PathBuf>, extension: &str) -> Self {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        Self {
            dir: dir.into(),
            format: DocumentFormat::from_extension(&extension),
            extension,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn format(&self) -> DocumentFormat {
        self.format
    }
}

impl DocumentSource for DirectorySource {
    fn list(&self) -> Result<Vec<DocumentId>, ExtractError> {
        if !self.dir.is_dir() {
            return Err(ExtractError::SourceNotFound {
                path: self.dir.clone(),
            });
        }
        let unreadable = |source| ExtractError::SourceUnreadable {
            path: self.dir.clone(),
            source,
        };

        let mut docs = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(unreadable)? {
            let path = entry.map_err(unreadable)?.path();
            let matches = path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension));
            if matches {
                docs.push(DocumentId::from_path(path));
            }
        }
        docs.sort();

        info!(
            "Found {} .{} documents in {}",
            docs.len(),
            self.extension,
            self.dir.display()
        );
        Ok(docs)
    }

    async fn read_pages(&self, id: &DocumentId) -> Result<Vec<String>, DocumentError> {
        match self.format {
            DocumentFormat::Pdf => read_pdf_pages(&id.path).await,
            DocumentFormat::Text => read_text_pages(&id.path).await,
        }
    }
}

/// Documents held in memory, keyed by name. Useful when page text was
/// extracted upstream.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    documents: BTreeMap<String, Vec<String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document<P: Into<String>>(
        mut self,
        name: impl Into<String>,
        pages: impl IntoIterator<Item = P>,
    ) -> Self {
        self.insert(name, pages);
        self
    }

    pub fn insert<P: Into<String>>(
        &mut self,
        name: impl Into<String>,
        pages: impl IntoIterator<Item = P>,
    ) {
        self.documents
            .insert(name.into(), pages.into_iter().map(Into::into).collect());
    }
}

impl DocumentSource for MemorySource {
    fn list(&self) -> Result<Vec<DocumentId>, ExtractError> {
        Ok(self.documents.keys().map(DocumentId::from_path).collect())
    }

    async fn read_pages(&self, id: &DocumentId) -> Result<Vec<String>, DocumentError> {
        self.documents
            .get(&id.name)
            .cloned()
            .ok_or_else(|| DocumentError::Read {
                detail: format!("no document named '{}'", id.name),
            })
    }
}

/// Read the text layer of every page of a PDF.
pub async fn read_pdf_pages(path: &Path) -> Result<Vec<String>, DocumentError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || read_pdf_pages_blocking(&path))
        .await
        .map_err(|e| DocumentError::Read {
            detail: format!("PDF read task panicked: {e}"),
        })?
}

/// Bind pdfium from `PDFIUM_LIB_PATH` (a directory or the library file),
/// falling back to the system library search path.
fn bind_pdfium() -> Result<Pdfium, DocumentError> {
    let bindings = match std::env::var_os("PDFIUM_LIB_PATH") {
        Some(p) if Path::new(&p).is_dir() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&p))
        }
        Some(p) => Pdfium::bind_to_library(&p),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| DocumentError::Read {
        detail: format!("cannot load pdfium (set PDFIUM_LIB_PATH): {e:?}"),
    })?;
    Ok(Pdfium::new(bindings))
}

fn read_pdf_pages_blocking(path: &Path) -> Result<Vec<String>, DocumentError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium.load_pdf_from_file(path, None).map_err(|e| {
        let err_str = format!("{e:?}");
        let detail = if err_str.contains("Password") || err_str.contains("password") {
            format!("{} is password-protected", path.display())
        } else {
            format!("cannot open {}: {err_str}", path.display())
        };
        DocumentError::Read { detail }
    })?;

    let pages = document.pages();
    let total = pages.len() as usize;
    debug!("PDF loaded: {} ({} pages)", path.display(), total);

    let mut texts = Vec::with_capacity(total);
    for (idx, page) in pages.iter().enumerate() {
        let text = page.text().map_err(|e| DocumentError::Read {
            detail: format!("page {}: {e:?}", idx + 1),
        })?;
        texts.push(text.all().replace("\r\n", "\n"));

        let n = idx + 1;
        if n == 1 || n % 10 == 0 || n == total {
            debug!("Read page {}/{} of {}", n, total, path.display());
        }
    }
    Ok(texts)
}

/// Read a form-feed-separated text file.
pub async fn read_text_pages(path: &Path) -> Result<Vec<String>, DocumentError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| DocumentError::Read {
            detail: format!("cannot read {}: {e}", path.display()),
        })?;
    Ok(split_text_pages(&text))
}

/// Split pre-extracted text on form feeds; a trailing separator adds no page.
pub fn split_text_pages(text: &str) -> Vec<String> {
    let text = text.replace("\r\n", "\n");
    let body = text.strip_suffix(FORM_FEED).unwrap_or(&text);
    if body.is_empty() {
        return Vec::new();
    }
    body.split(FORM_FEED).map(str::to_string).collect()
}
