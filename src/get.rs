//! `folio get` and `folio list`: document metadata and chunks.

use anyhow::{bail, Result};
use folio_core::models::{DocumentId, DocumentMetadata};

use crate::app::App;

pub async fn run_get(app: &App, id: DocumentId, show_chunks: bool) -> Result<()> {
    let Some(doc) = app.documents.get_document(id).await? else {
        bail!("document not found: {}", id);
    };

    println!("--- Document ---");
    println!("id:            {}", doc.id);
    println!("filename:      {}", doc.filename);
    println!("path:          {}", doc.file_path);
    println!("type:          {}", doc.document_type);
    println!("uploaded:      {}", doc.upload_date.format("%Y-%m-%d %H:%M:%S"));
    println!("pages:         {}", doc.total_pages);
    println!("size:          {:.2} MB", doc.file_size_mb);
    println!("chunks:        {}", doc.chunk_count);
    println!("vectors:       {}", app.index.count_for_document(doc.id));
    if let (Some(start), Some(end)) = (doc.vector_start, doc.vector_end) {
        println!("vector range:  {}..={} (at ingestion)", start, end);
    }

    if show_chunks {
        let chunks = app.documents.store().get_chunks(id).await?;
        println!();
        println!("--- Chunks ({}) ---", chunks.len());
        for chunk in &chunks {
            let pages: Vec<String> = chunk.page_numbers.iter().map(u32::to_string).collect();
            println!(
                "[chunk {}] pages {} ({} chars)",
                chunk.chunk_index,
                pages.join(","),
                chunk.char_length
            );
            println!("{}", chunk.text);
            println!();
        }
    }
    Ok(())
}

pub async fn run_list(app: &App, json: bool) -> Result<()> {
    let docs = app.documents.list_documents().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&docs)?);
        return Ok(());
    }
    if docs.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    println!(
        "{:>6}  {:<40} {:<18} {:>6} {:>7}  {}",
        "ID", "FILENAME", "TYPE", "PAGES", "CHUNKS", "UPLOADED"
    );
    println!("{}", "-".repeat(98));
    for doc in &docs {
        print_row(doc);
    }
    Ok(())
}

fn print_row(doc: &DocumentMetadata) {
    println!(
        "{:>6}  {:<40} {:<18} {:>6} {:>7}  {}",
        doc.id,
        truncate(&doc.filename, 40),
        doc.document_type.as_str(),
        doc.total_pages,
        doc.chunk_count,
        doc.upload_date.format("%Y-%m-%d %H:%M")
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
