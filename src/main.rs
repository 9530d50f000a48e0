//! # Folio CLI (`folio`)
//!
//! ```bash
//! folio --config ./config/folio.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `folio init` | Create the database and an empty vector index |
//! | `folio add <path>` | Ingest one PDF, text, or Markdown file |
//! | `folio add-dir <dir>` | Ingest every supported file under a directory |
//! | `folio remove <id>` | Remove a document and its vectors |
//! | `folio list` | List stored documents |
//! | `folio get <id>` | Show one document, optionally with its chunks |
//! | `folio search "<query>"` | Hybrid keyword + semantic search |
//! | `folio stats` | Document, chunk, and vector counts |
//! | `folio reset-index` | Drop every vector from the index |

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use folio::app::App;
use folio::{config, get, logging, search, stats};
use folio_core::models::{DocumentId, DocumentType};

/// Folio: local hybrid search over PDF and text documents.
#[derive(Parser)]
#[command(name = "folio", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/folio.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema and an empty vector index. Idempotent.
    Init,

    /// Ingest a single file.
    Add {
        path: PathBuf,
        /// financial_report, invoice, statement, contract, or other.
        #[arg(long = "type", default_value = "financial_report", value_parser = parse_document_type)]
        document_type: DocumentType,
    },

    /// Ingest every supported file under a directory, recursively.
    AddDir {
        dir: PathBuf,
        #[arg(long = "type", default_value = "financial_report", value_parser = parse_document_type)]
        document_type: DocumentType,
    },

    /// Remove a document, its chunks, and its vectors.
    Remove { id: DocumentId },

    /// List stored documents, newest first.
    List {
        #[arg(long)]
        json: bool,
    },

    /// Show a document's metadata.
    Get {
        id: DocumentId,
        /// Also print every chunk.
        #[arg(long)]
        chunks: bool,
    },

    /// Search stored documents.
    Search {
        query: String,
        /// Maximum number of documents (capped by `retrieval.max_top_k`).
        #[arg(long)]
        top_k: Option<usize>,
        /// Only return documents of this type.
        #[arg(long = "type", value_parser = parse_document_type)]
        document_type: Option<DocumentType>,
        /// Print the response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show index statistics.
    Stats,

    /// Remove every vector. Documents stay stored but must be re-added to
    /// be searchable.
    ResetIndex,
}

fn parse_document_type(s: &str) -> Result<DocumentType, String> {
    s.parse::<DocumentType>().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_config(&cli.config)?;
    let app = App::open(cfg).await?;
    let result = run(&app, cli.command).await;
    app.close().await;
    result
}

async fn run(app: &App, command: Commands) -> Result<()> {
    match command {
        Commands::Init => {
            println!("Database initialized successfully.");
            println!("  database: {}", app.config.db.path.display());
            println!("  index:    {}", app.config.index.dir.display());
        }
        Commands::Add {
            path,
            document_type,
        } => {
            let doc = app.documents.add_document(&path, document_type).await?;
            println!(
                "Added {} (id {}): {} pages, {} chunks",
                doc.filename, doc.id, doc.total_pages, doc.chunk_count
            );
        }
        Commands::AddDir { dir, document_type } => {
            let summary = app.documents.add_directory(&dir, document_type).await?;
            for doc in &summary.added {
                println!("  added {} (id {}, {} chunks)", doc.filename, doc.id, doc.chunk_count);
            }
            println!(
                "Added {} document{}, {} failed.",
                summary.added.len(),
                if summary.added.len() == 1 { "" } else { "s" },
                summary.failed
            );
        }
        Commands::Remove { id } => {
            if !app.documents.remove_document(id).await? {
                bail!("document not found: {}", id);
            }
            println!("Removed document {}.", id);
        }
        Commands::List { json } => get::run_list(app, json).await?,
        Commands::Get { id, chunks } => get::run_get(app, id, chunks).await?,
        Commands::Search {
            query,
            top_k,
            document_type,
            json,
        } => search::run_search(app, &query, top_k, document_type, json).await?,
        Commands::Stats => stats::run_stats(app).await?,
        Commands::ResetIndex => {
            app.documents.reset_index().await?;
            println!("Vector index reset.");
        }
    }
    Ok(())
}
