//! SQLite implementation of the core [`Store`] trait.
//!
//! Documents live in `documents`, chunk text and page lists in
//! `document_chunks`. Page numbers are stored as a comma-separated list.
//! Deleting a document cascades to its chunks via the foreign key.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_core::models::{Chunk, DocumentId, DocumentMetadata, NewDocument, VectorRange};
use folio_core::store::Store;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::{db, migrate};

const DOCUMENT_COLUMNS: &str = "id, filename, file_path, document_type, upload_date, total_pages, \
     file_size_mb, chunk_count, vector_start, vector_end";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and apply migrations.
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn row_to_metadata(row: &SqliteRow) -> Result<DocumentMetadata> {
    let upload_ts: i64 = row.get("upload_date");
    let doc_type: String = row.get("document_type");
    let total_pages: i64 = row.get("total_pages");
    let chunk_count: i64 = row.get("chunk_count");
    let vector_start: Option<i64> = row.get("vector_start");
    let vector_end: Option<i64> = row.get("vector_end");

    Ok(DocumentMetadata {
        id: row.get("id"),
        filename: row.get("filename"),
        file_path: row.get("file_path"),
        document_type: doc_type.parse()?,
        upload_date: DateTime::from_timestamp(upload_ts, 0).unwrap_or_default(),
        total_pages: total_pages as u32,
        file_size_mb: row.get("file_size_mb"),
        chunk_count: chunk_count as u32,
        vector_start: vector_start.map(|v| v as u64),
        vector_end: vector_end.map(|v| v as u64),
    })
}

/// `[1, 2, 5]` → `"1,2,5"`.
pub fn encode_pages(pages: &[u32]) -> String {
    pages
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Inverse of [`encode_pages`]. Unparseable entries are dropped.
pub fn decode_pages(s: &str) -> Vec<u32> {
    s.split(',')
        .filter_map(|p| p.trim().parse().ok())
        .collect()
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_document(&self, doc: &NewDocument) -> Result<DocumentId> {
        let result = sqlx::query(
            r#"
            INSERT INTO documents (filename, file_path, document_type, upload_date, total_pages, file_size_mb)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.filename)
        .bind(&doc.file_path)
        .bind(doc.document_type.as_str())
        .bind(Utc::now().timestamp())
        .bind(doc.total_pages as i64)
        .bind(doc.file_size_mb)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert document '{}'", doc.filename))?;

        Ok(result.last_insert_rowid())
    }

    async fn get_document_metadata(&self, id: DocumentId) -> Result<Option<DocumentMetadata>> {
        let row = sqlx::query(&format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_metadata).transpose()
    }

    async fn find_document_by_filename(&self, filename: &str) -> Result<Option<DocumentMetadata>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE filename = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(filename)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_metadata).transpose()
    }

    async fn list_documents(&self) -> Result<Vec<DocumentMetadata>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents ORDER BY upload_date DESC, id DESC",
            DOCUMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_metadata).collect()
    }

    async fn delete_document(&self, id: DocumentId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for c in chunks {
            sqlx::query(
                r#"
                INSERT INTO document_chunks (document_id, chunk_index, page_numbers, text_content, chunk_size)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(c.document_id)
            .bind(c.chunk_index as i64)
            .bind(encode_pages(&c.page_numbers))
            .bind(&c.text)
            .bind(c.char_length as i64)
            .execute(&mut *tx)
            .await
            .with_context(|| {
                format!(
                    "Failed to insert chunk {} of document {}",
                    c.chunk_index, c.document_id
                )
            })?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn set_vector_range(
        &self,
        id: DocumentId,
        range: Option<VectorRange>,
        chunk_count: u32,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE documents SET vector_start = ?, vector_end = ?, chunk_count = ? WHERE id = ?",
        )
        .bind(range.map(|r| r.start as i64))
        .bind(range.map(|r| r.end as i64))
        .bind(chunk_count as i64)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("Document not found: {}", id);
        }
        Ok(())
    }

    async fn get_chunk_text(&self, id: DocumentId, chunk_index: u32) -> Result<Option<String>> {
        let text: Option<String> = sqlx::query_scalar(
            "SELECT text_content FROM document_chunks WHERE document_id = ? AND chunk_index = ?",
        )
        .bind(id)
        .bind(chunk_index as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(text)
    }

    async fn get_chunk_pages(&self, id: DocumentId, chunk_index: u32) -> Result<Option<Vec<u32>>> {
        let pages: Option<String> = sqlx::query_scalar(
            "SELECT page_numbers FROM document_chunks WHERE document_id = ? AND chunk_index = ?",
        )
        .bind(id)
        .bind(chunk_index as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(pages.as_deref().map(decode_pages))
    }

    async fn get_chunks(&self, id: DocumentId) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT chunk_index, page_numbers, text_content, chunk_size FROM document_chunks \
             WHERE document_id = ? ORDER BY chunk_index ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let chunk_index: i64 = row.get("chunk_index");
                let pages: String = row.get("page_numbers");
                let size: i64 = row.get("chunk_size");
                Chunk {
                    document_id: id,
                    chunk_index: chunk_index as u32,
                    page_numbers: decode_pages(&pages),
                    text: row.get("text_content"),
                    char_length: size as usize,
                }
            })
            .collect())
    }

    async fn count_chunks(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM document_chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}
