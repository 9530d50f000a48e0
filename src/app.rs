//! Process-wide handles shared by every command.
//!
//! The store, embedder, and vector index are built once per invocation and
//! handed to both the [`DocumentManager`] and the [`HybridRanker`].

use std::sync::Arc;

use anyhow::{Context, Result};
use folio_core::embedding::Embedder;
use folio_core::index::VectorIndex;
use folio_core::search::HybridRanker;
use folio_core::store::Store;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::ingest::DocumentManager;
use crate::snapshot::FileSnapshot;
use crate::sqlite_store::SqliteStore;

pub struct App {
    pub config: Config,
    pub sqlite: Arc<SqliteStore>,
    pub index: Arc<VectorIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub documents: DocumentManager,
    pub ranker: HybridRanker,
}

impl App {
    /// Connect the database, load (or create) the index snapshot, and build
    /// the configured embedder.
    pub async fn open(config: Config) -> Result<Self> {
        let sqlite = Arc::new(SqliteStore::connect(&config).await?);
        let store: Arc<dyn Store> = sqlite.clone();

        let snapshot = FileSnapshot::new(&config.index.dir);
        let index = Arc::new(
            VectorIndex::open(config.embedding.dims, Box::new(snapshot.clone())).with_context(
                || format!("Failed to open vector index in {}", config.index.dir.display()),
            )?,
        );

        let embedder = create_embedder(&config.embedding)?;

        let documents = DocumentManager::new(
            store.clone(),
            index.clone(),
            embedder.clone(),
            config.chunking.clone(),
        )
        .with_snapshot(snapshot);
        let ranker = HybridRanker::new(
            index.clone(),
            store,
            embedder.clone(),
            config.retrieval.ranking_params(),
        );

        tracing::debug!(
            provider = %config.embedding.provider,
            dims = config.embedding.dims,
            vectors = index.len(),
            "opened folio workspace"
        );

        Ok(Self {
            config,
            sqlite,
            index,
            embedder,
            documents,
            ranker,
        })
    }

    pub async fn close(&self) {
        self.sqlite.close().await;
    }
}
