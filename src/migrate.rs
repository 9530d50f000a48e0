use anyhow::Result;
use sqlx::SqlitePool;

/// Create the folio schema. Safe to run repeatedly.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Create documents table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT NOT NULL UNIQUE,
            file_path TEXT NOT NULL,
            document_type TEXT NOT NULL DEFAULT 'financial_report',
            upload_date INTEGER NOT NULL,
            total_pages INTEGER NOT NULL DEFAULT 0,
            file_size_mb REAL NOT NULL DEFAULT 0,
            chunk_count INTEGER NOT NULL DEFAULT 0,
            vector_start INTEGER,
            vector_end INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create chunks table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id INTEGER NOT NULL,
            chunk_index INTEGER NOT NULL,
            page_numbers TEXT NOT NULL,
            text_content TEXT NOT NULL,
            chunk_size INTEGER NOT NULL,
            UNIQUE(document_id, chunk_index),
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_document_chunks_document_id ON document_chunks(document_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_type ON documents(document_type)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_upload_date ON documents(upload_date DESC)",
    )
    .execute(pool)
    .await?;

    tracing::debug!("schema migrations applied");
    Ok(())
}
