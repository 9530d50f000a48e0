//! In-memory [`Store`] implementation for tests and embedding in other tools.
//!
//! Uses `BTreeMap`s behind `std::sync::RwLock`. Document ids are assigned
//! from an atomic counter starting at 1, like SQLite rowids.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::models::{Chunk, DocumentId, DocumentMetadata, NewDocument, VectorRange};

use super::Store;

/// In-memory store.
pub struct InMemoryStore {
    docs: RwLock<BTreeMap<DocumentId, DocumentMetadata>>,
    chunks: RwLock<BTreeMap<(DocumentId, u32), Chunk>>,
    next_id: AtomicI64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(BTreeMap::new()),
            chunks: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_document(&self, doc: &NewDocument) -> Result<DocumentId> {
        let mut docs = self.docs.write().unwrap();
        if docs.values().any(|d| d.filename == doc.filename) {
            bail!("Document with filename '{}' already exists", doc.filename);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        docs.insert(
            id,
            DocumentMetadata {
                id,
                filename: doc.filename.clone(),
                file_path: doc.file_path.clone(),
                document_type: doc.document_type,
                upload_date: Utc::now(),
                total_pages: doc.total_pages,
                file_size_mb: doc.file_size_mb,
                chunk_count: 0,
                vector_start: None,
                vector_end: None,
            },
        );
        Ok(id)
    }

    async fn get_document_metadata(&self, id: DocumentId) -> Result<Option<DocumentMetadata>> {
        Ok(self.docs.read().unwrap().get(&id).cloned())
    }

    async fn find_document_by_filename(&self, filename: &str) -> Result<Option<DocumentMetadata>> {
        let docs = self.docs.read().unwrap();
        Ok(docs.values().find(|d| d.filename == filename).cloned())
    }

    async fn list_documents(&self) -> Result<Vec<DocumentMetadata>> {
        let mut docs: Vec<DocumentMetadata> = self.docs.read().unwrap().values().cloned().collect();
        docs.sort_by(|a, b| b.upload_date.cmp(&a.upload_date).then(b.id.cmp(&a.id)));
        Ok(docs)
    }

    async fn delete_document(&self, id: DocumentId) -> Result<bool> {
        let removed = self.docs.write().unwrap().remove(&id).is_some();
        if removed {
            self.chunks.write().unwrap().retain(|(doc_id, _), _| *doc_id != id);
        }
        Ok(removed)
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let docs = self.docs.read().unwrap();
        let mut stored = self.chunks.write().unwrap();
        for c in chunks {
            if !docs.contains_key(&c.document_id) {
                bail!("Chunk references unknown document {}", c.document_id);
            }
            let key = (c.document_id, c.chunk_index);
            if stored.contains_key(&key) {
                bail!(
                    "Chunk {} of document {} already exists",
                    c.chunk_index,
                    c.document_id
                );
            }
            stored.insert(key, c.clone());
        }
        Ok(())
    }

    async fn set_vector_range(
        &self,
        id: DocumentId,
        range: Option<VectorRange>,
        chunk_count: u32,
    ) -> Result<()> {
        let mut docs = self.docs.write().unwrap();
        match docs.get_mut(&id) {
            Some(doc) => {
                doc.vector_start = range.map(|r| r.start);
                doc.vector_end = range.map(|r| r.end);
                doc.chunk_count = chunk_count;
                Ok(())
            }
            None => bail!("Document not found: {}", id),
        }
    }

    async fn get_chunk_text(&self, id: DocumentId, chunk_index: u32) -> Result<Option<String>> {
        let chunks = self.chunks.read().unwrap();
        Ok(chunks.get(&(id, chunk_index)).map(|c| c.text.clone()))
    }

    async fn get_chunk_pages(&self, id: DocumentId, chunk_index: u32) -> Result<Option<Vec<u32>>> {
        let chunks = self.chunks.read().unwrap();
        Ok(chunks.get(&(id, chunk_index)).map(|c| c.page_numbers.clone()))
    }

    async fn get_chunks(&self, id: DocumentId) -> Result<Vec<Chunk>> {
        let chunks = self.chunks.read().unwrap();
        Ok(chunks
            .range((id, 0)..=(id, u32::MAX))
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn count_chunks(&self) -> Result<u64> {
        Ok(self.chunks.read().unwrap().len() as u64)
    }
}
