//! `folio stats`: a summary of what is indexed.

use anyhow::Result;

use crate::app::App;

pub async fn run_stats(app: &App) -> Result<()> {
    let stats = app.documents.stats().await?;
    let db_size = std::fs::metadata(&app.config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Folio Index Stats");
    println!("=================");
    println!();
    println!("  Database:    {}", app.config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Index dir:   {}", app.config.index.dir.display());
    println!("  Index size:  {}", format_bytes(stats.index_size_bytes));
    println!();
    println!("  Documents:   {}", stats.total_documents);
    println!("  Chunks:      {}", stats.total_chunks);
    println!(
        "  Vectors:     {} ({} dims, {})",
        stats.total_vectors,
        stats.dimension,
        app.embedder.model_name()
    );
    println!(
        "  Last added:  {}",
        stats
            .last_updated
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string())
    );
    if stats.total_chunks != stats.total_vectors as u64 {
        println!();
        println!(
            "  warning: {} chunks but {} vectors; re-add documents after reset-index",
            stats.total_chunks, stats.total_vectors
        );
    }
    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
