//! Document lifecycle: add, remove, list, stats.
//!
//! Ingestion runs extract → store metadata → chunk → store chunks → embed →
//! index add → record vector range. Ingestion and removal are serialised by
//! a single write lock; searches never take it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use walkdir::WalkDir;

use folio_core::chunk::chunk_pages;
use folio_core::embedding::Embedder;
use folio_core::error::IndexResult;
use folio_core::index::VectorIndex;
use folio_core::models::{DocumentId, DocumentMetadata, DocumentType, NewDocument};
use folio_core::store::Store;

use crate::config::ChunkingConfig;
use crate::extract::{self, ExtractedDocument};
use crate::snapshot::FileSnapshot;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// System-wide counters reported by `folio stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStats {
    pub total_documents: usize,
    pub total_chunks: u64,
    pub total_vectors: usize,
    pub dimension: usize,
    pub index_size_bytes: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Outcome of [`DocumentManager::add_directory`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DirectorySummary {
    pub added: Vec<DocumentMetadata>,
    pub failed: usize,
}

pub struct DocumentManager {
    store: Arc<dyn Store>,
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    snapshot: Option<FileSnapshot>,
    write_lock: Mutex<()>,
}

impl DocumentManager {
    pub fn new(
        store: Arc<dyn Store>,
        index: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
            chunking,
            snapshot: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Report on-disk index size from this snapshot in [`stats`](Self::stats).
    pub fn with_snapshot(mut self, snapshot: FileSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Ingest one file.
    ///
    /// Fails if the file is missing, its filename is already stored, or it
    /// holds no extractable text. If embedding or indexing fails the
    /// inserted document row is removed so the file can be added again.
    pub async fn add_document(
        &self,
        path: &Path,
        document_type: DocumentType,
    ) -> Result<DocumentMetadata> {
        if !path.is_file() {
            bail!("File not found: {}", path.display());
        }
        let path = path
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", path.display()))?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("Invalid filename: {}", path.display()))?;

        let _guard = self.write_lock.lock().await;

        if self.store.find_document_by_filename(&filename).await?.is_some() {
            bail!("Document {} already exists", filename);
        }

        tracing::info!(filename = %filename, document_type = %document_type, "adding document");

        let file_size_mb = std::fs::metadata(&path)
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len() as f64
            / BYTES_PER_MB;

        let extracted = extract_blocking(path.clone()).await?;
        if extracted.pages.is_empty() {
            bail!("No extractable text in {}", filename);
        }

        let doc_id = self
            .store
            .insert_document(&NewDocument {
                filename: filename.clone(),
                file_path: path.display().to_string(),
                document_type,
                total_pages: extracted.total_pages,
                file_size_mb,
            })
            .await?;

        if let Err(e) = self.index_document(doc_id, &extracted).await {
            tracing::error!(filename = %filename, error = %e, "ingestion failed, removing document row");
            if self.index.count_for_document(doc_id) > 0 {
                let removed = self
                    .with_index(move |index| index.delete_document(doc_id))
                    .await;
                if let Err(cleanup) = removed {
                    tracing::warn!(
                        document_id = doc_id,
                        error = %cleanup,
                        "failed to remove vectors of failed document"
                    );
                }
            }
            if let Err(cleanup) = self.store.delete_document(doc_id).await {
                tracing::warn!(document_id = doc_id, error = %cleanup, "failed to remove document row");
            }
            return Err(e.context(format!("Failed to add {}", filename)));
        }

        let metadata = self
            .store
            .get_document_metadata(doc_id)
            .await?
            .with_context(|| format!("Document {} vanished after ingestion", doc_id))?;

        tracing::info!(
            document_id = doc_id,
            filename = %filename,
            chunks = metadata.chunk_count,
            "document added"
        );
        Ok(metadata)
    }

    async fn index_document(&self, doc_id: DocumentId, extracted: &ExtractedDocument) -> Result<()> {
        let chunks = chunk_pages(
            doc_id,
            &extracted.pages,
            self.chunking.chunk_size,
            self.chunking.chunk_overlap,
        );
        self.store.insert_chunks(&chunks).await?;

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        let chunk_indices: Vec<u32> = chunks.iter().map(|c| c.chunk_index).collect();

        let range = self
            .with_index(move |index| index.add(&vectors, doc_id, &chunk_indices))
            .await?;
        self.store
            .set_vector_range(doc_id, range, chunks.len() as u32)
            .await?;
        Ok(())
    }

    /// Ingest every supported file under `dir`, recursing into
    /// subdirectories. Per-file failures are logged and counted.
    pub async fn add_directory(
        &self,
        dir: &Path,
        document_type: DocumentType,
    ) -> Result<DirectorySummary> {
        if !dir.is_dir() {
            bail!("Directory not found: {}", dir.display());
        }

        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(e) => Some(e),
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unreadable entry");
                    None
                }
            })
            .filter(|e| e.file_type().is_file() && extract::is_supported(e.path()))
            .map(|e| e.into_path())
            .collect();
        files.sort();

        let mut summary = DirectorySummary::default();
        for file in &files {
            match self.add_document(file, document_type).await {
                Ok(doc) => summary.added.push(doc),
                Err(e) => {
                    tracing::warn!(path = %file.display(), error = %format!("{:#}", e), "failed to add file");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            dir = %dir.display(),
            added = summary.added.len(),
            failed = summary.failed,
            "directory ingestion finished"
        );
        Ok(summary)
    }

    /// Remove a document's vectors, then its rows. Returns `false` if the
    /// document does not exist.
    pub async fn remove_document(&self, id: DocumentId) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        if self.store.get_document_metadata(id).await?.is_none() {
            return Ok(false);
        }

        let had_vectors = self
            .with_index(move |index| index.delete_document(id))
            .await?;
        let deleted = match self.store.delete_document(id).await {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::error!(
                    document_id = id,
                    had_vectors,
                    error = %e,
                    "vectors removed but document rows remain; retry the removal"
                );
                return Err(e);
            }
        };
        tracing::info!(document_id = id, had_vectors, "document removed");
        Ok(deleted)
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentMetadata>> {
        self.store.list_documents().await
    }

    pub async fn get_document(&self, id: DocumentId) -> Result<Option<DocumentMetadata>> {
        self.store.get_document_metadata(id).await
    }

    pub async fn stats(&self) -> Result<SystemStats> {
        let documents = self.store.list_documents().await?;
        let index_stats = self.index.stats();
        Ok(SystemStats {
            total_documents: documents.len(),
            total_chunks: self.store.count_chunks().await?,
            total_vectors: index_stats.total_vectors,
            dimension: index_stats.dimension,
            index_size_bytes: self
                .snapshot
                .as_ref()
                .map(FileSnapshot::size_on_disk)
                .unwrap_or(0),
            last_updated: documents.iter().map(|d| d.upload_date).max(),
        })
    }

    /// Drop every vector. Stored documents and chunks are kept.
    pub async fn reset_index(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.with_index(|index| index.reset()).await?;
        tracing::warn!("vector index reset; documents must be re-added to be searchable");
        Ok(())
    }
}

impl DocumentManager {
    /// Run an index mutation, which saves the snapshot to disk, off the
    /// async worker threads.
    async fn with_index<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&VectorIndex) -> IndexResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let index = Arc::clone(&self.index);
        let value = tokio::task::spawn_blocking(move || f(&index))
            .await
            .context("Index task panicked")??;
        Ok(value)
    }
}

async fn extract_blocking(path: PathBuf) -> Result<ExtractedDocument> {
    let doc = tokio::task::spawn_blocking(move || extract::extract_pages(&path))
        .await
        .context("Extraction task panicked")??;
    Ok(doc)
}
