//! Core data models used throughout folio.
//!
//! These types represent the pages, chunks, index records, and ranked
//! results that flow through the ingestion and retrieval pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a stored document (the relational store's row id).
pub type DocumentId = i64;

/// Positional identifier of an embedding inside the vector index.
pub type VectorId = u64;

/// Text extracted from one page of a source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number.
    pub page_number: u32,
    pub text: String,
}

impl Page {
    pub fn new(page_number: u32, text: impl Into<String>) -> Self {
        Self {
            page_number,
            text: text.into(),
        }
    }
}

/// A contiguous, size-bounded slice of a document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub document_id: DocumentId,
    /// 0-based, contiguous per document.
    pub chunk_index: u32,
    /// Pages the chunk was drawn from, in page order. Never empty.
    pub page_numbers: Vec<u32>,
    pub text: String,
    /// Length of `text` in characters.
    pub char_length: usize,
}

/// Provenance of one vector in the index. Position in the side-table equals `vector_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub vector_id: VectorId,
    pub document_id: DocumentId,
    pub chunk_index: u32,
}

/// Inclusive range of vector ids assigned by a single `add` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorRange {
    pub start: VectorId,
    pub end: VectorId,
}

impl VectorRange {
    /// Number of ids in the range.
    pub fn count(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// A nearest-neighbour hit produced by [`VectorIndex::search`](crate::index::VectorIndex::search).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchCandidate {
    pub vector_id: VectorId,
    pub document_id: DocumentId,
    pub chunk_index: u32,
    /// Squared Euclidean distance to the query.
    pub distance: f32,
    /// `1 / (1 + distance)`, in `(0, 1]`.
    pub similarity: f64,
}

/// Size of the vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub total_vectors: usize,
    pub dimension: usize,
}

/// Category a document was filed under at ingestion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    #[default]
    FinancialReport,
    Invoice,
    Statement,
    Contract,
    Other,
}

impl DocumentType {
    pub const ALL: [DocumentType; 5] = [
        DocumentType::FinancialReport,
        DocumentType::Invoice,
        DocumentType::Statement,
        DocumentType::Contract,
        DocumentType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::FinancialReport => "financial_report",
            DocumentType::Invoice => "invoice",
            DocumentType::Statement => "statement",
            DocumentType::Contract => "contract",
            DocumentType::Other => "other",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown document type: '{}'. Must be one of: financial_report, invoice, statement, contract, other.",
                    s
                )
            })
    }
}

/// Document fields supplied at ingestion, before the store assigns an id.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub filename: String,
    pub file_path: String,
    pub document_type: DocumentType,
    pub total_pages: u32,
    pub file_size_mb: f64,
}

/// Stored document metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentMetadata {
    pub id: DocumentId,
    pub filename: String,
    pub file_path: String,
    pub document_type: DocumentType,
    pub upload_date: DateTime<Utc>,
    pub total_pages: u32,
    pub file_size_mb: f64,
    pub chunk_count: u32,
    /// Vector ids assigned at ingestion. Informational once a later
    /// delete has renumbered the index.
    pub vector_start: Option<VectorId>,
    pub vector_end: Option<VectorId>,
}

/// A document-level search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    pub document_id: DocumentId,
    pub filename: String,
    pub file_path: String,
    pub document_type: DocumentType,
    /// Mean combined score of the document's surviving candidates.
    pub relevance_score: f64,
    pub matched_chunk_indices: Vec<u32>,
    /// Sorted, de-duplicated.
    pub matched_pages: Vec<u32>,
    pub snippet: String,
}

/// Everything returned for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<RankedResult>,
    pub total_results: usize,
    pub search_time_ms: f64,
}

impl SearchResponse {
    pub fn empty(query: &str, search_time_ms: f64) -> Self {
        Self {
            query: query.to_string(),
            results: Vec::new(),
            total_results: 0,
            search_time_ms,
        }
    }
}
