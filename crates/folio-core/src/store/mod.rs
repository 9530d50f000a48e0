//! Storage abstraction for folio.
//!
//! The [`Store`] trait is the relational collaborator of the pipeline: it
//! keeps document metadata and chunk text keyed by `(document_id,
//! chunk_index)`. The vector index only stores ids, so every search result
//! is enriched through this trait.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, DocumentId, DocumentMetadata, NewDocument, VectorRange};

/// Abstract storage backend for documents and chunks.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_document`](Store::insert_document) | Add a document row, returning its id |
/// | [`get_document_metadata`](Store::get_document_metadata) | Look up one document |
/// | [`find_document_by_filename`](Store::find_document_by_filename) | Duplicate detection |
/// | [`list_documents`](Store::list_documents) | All documents, newest first |
/// | [`delete_document`](Store::delete_document) | Remove a document and its chunks |
/// | [`insert_chunks`](Store::insert_chunks) | Store chunk text and page lists |
/// | [`set_vector_range`](Store::set_vector_range) | Record ids assigned by the index |
/// | [`get_chunk_text`](Store::get_chunk_text) | Text of one chunk |
/// | [`get_chunk_pages`](Store::get_chunk_pages) | Page numbers of one chunk |
/// | [`get_chunks`](Store::get_chunks) | All chunks of a document, in order |
/// | [`count_chunks`](Store::count_chunks) | Total chunks across documents |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a document. Fails if the filename is already stored.
    async fn insert_document(&self, doc: &NewDocument) -> Result<DocumentId>;

    async fn get_document_metadata(&self, id: DocumentId) -> Result<Option<DocumentMetadata>>;

    async fn find_document_by_filename(&self, filename: &str) -> Result<Option<DocumentMetadata>>;

    /// All documents, most recently uploaded first.
    async fn list_documents(&self) -> Result<Vec<DocumentMetadata>>;

    /// Delete a document and all of its chunks. Returns `false` if it did
    /// not exist.
    async fn delete_document(&self, id: DocumentId) -> Result<bool>;

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()>;

    /// Record the index range and chunk count after a successful `add`.
    async fn set_vector_range(
        &self,
        id: DocumentId,
        range: Option<VectorRange>,
        chunk_count: u32,
    ) -> Result<()>;

    async fn get_chunk_text(&self, id: DocumentId, chunk_index: u32) -> Result<Option<String>>;

    async fn get_chunk_pages(&self, id: DocumentId, chunk_index: u32) -> Result<Option<Vec<u32>>>;

    /// All chunks of a document ordered by `chunk_index`.
    async fn get_chunks(&self, id: DocumentId) -> Result<Vec<Chunk>>;

    async fn count_chunks(&self) -> Result<u64>;
}
