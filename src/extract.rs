//! Page text extraction.
//!
//! Produces the ordered `(page_number, text)` sequence the chunker consumes.
//! PDFs are read page by page with `pdf-extract`; plain text and Markdown
//! files are split into pages on form-feed (`\x0c`) characters. Pages are
//! numbered from 1. Blank pages are dropped from `pages` but still counted
//! in `total_pages`.

use std::path::Path;

use folio_core::models::Page;
use thiserror::Error;

/// File extensions [`extract_pages`] accepts (lowercase, without the dot).
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["pdf", "txt", "md"];

const PAGE_BREAK: char = '\x0c';

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Pages of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedDocument {
    /// Non-blank pages in order.
    pub pages: Vec<Page>,
    /// Page count of the source, blank pages included.
    pub total_pages: u32,
}

/// Whether `path` has an extension [`extract_pages`] can handle.
pub fn is_supported(path: &Path) -> bool {
    extension(path)
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub fn extract_pages(path: &Path) -> Result<ExtractedDocument, ExtractError> {
    let ext = extension(path).unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(ExtractError::Unsupported(path.display().to_string()));
    }

    let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let raw_pages = match ext.as_str() {
        "pdf" => pdf_extract::extract_text_from_mem_by_pages(&bytes)
            .map_err(|e| ExtractError::Pdf(e.to_string()))?,
        _ => split_text_pages(&String::from_utf8_lossy(&bytes)),
    };

    let doc = number_pages(raw_pages);
    tracing::debug!(
        path = %path.display(),
        total_pages = doc.total_pages,
        text_pages = doc.pages.len(),
        "extracted pages"
    );
    Ok(doc)
}

/// Split text on form-feeds. A trailing form-feed does not open a new page.
pub fn split_text_pages(text: &str) -> Vec<String> {
    let mut pages: Vec<String> = text.split(PAGE_BREAK).map(str::to_string).collect();
    if pages.len() > 1 && pages.last().map(|p| p.is_empty()).unwrap_or(false) {
        pages.pop();
    }
    pages
}

/// Number raw page texts from 1, dropping blank ones.
pub fn number_pages(raw_pages: Vec<String>) -> ExtractedDocument {
    let total_pages = raw_pages.len() as u32;
    let pages = raw_pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| Page::new(i as u32 + 1, text.trim()))
        .collect();
    ExtractedDocument { pages, total_pages }
}
