//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/folio.sqlite"
//!
//! [index]
//! dir = "./data/vectordb"
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [retrieval]
//! keyword_weight = 0.5
//! semantic_weight = 0.5
//! min_similarity_threshold = 0.15
//! default_top_k = 5
//! max_top_k = 20
//!
//! [embedding]
//! provider = "hash"      # hash | openai | ollama | local | disabled
//! dims = 384
//! ```
//!
//! Only `[db]` is required; every other section falls back to the
//! defaults shown above.

use anyhow::{bail, Context, Result};
use folio_core::search::RankingParams;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Directory holding `index.bin` and `metadata.json`.
    #[serde(default = "default_index_dir")]
    pub dir: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: default_index_dir(),
        }
    }
}

fn default_index_dir() -> PathBuf {
    PathBuf::from("./data/vectordb")
}

/// Chunk sizes, in characters.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_weight")]
    pub keyword_weight: f64,
    #[serde(default = "default_weight")]
    pub semantic_weight: f64,
    #[serde(default = "default_threshold")]
    pub min_similarity_threshold: f64,
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            keyword_weight: default_weight(),
            semantic_weight: default_weight(),
            min_similarity_threshold: default_threshold(),
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
        }
    }
}

impl RetrievalConfig {
    pub fn ranking_params(&self) -> RankingParams {
        RankingParams {
            keyword_weight: self.keyword_weight,
            semantic_weight: self.semantic_weight,
            min_score_threshold: self.min_similarity_threshold,
        }
    }

    /// Requested `top_k`, defaulted and capped at `max_top_k`.
    pub fn effective_top_k(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_top_k)
            .clamp(1, self.max_top_k)
    }
}

fn default_weight() -> f64 {
    0.5
}
fn default_threshold() -> f64 {
    0.15
}
fn default_top_k() -> usize {
    5
}
fn default_max_top_k() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: default_dims(),
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }

    // Validate retrieval
    let r = &config.retrieval;
    if r.keyword_weight < 0.0 || r.semantic_weight < 0.0 {
        bail!("retrieval.keyword_weight and retrieval.semantic_weight must be >= 0");
    }
    if r.min_similarity_threshold < 0.0 {
        bail!("retrieval.min_similarity_threshold must be >= 0");
    }
    if r.default_top_k < 1 {
        bail!("retrieval.default_top_k must be >= 1");
    }
    if r.default_top_k > r.max_top_k {
        bail!("retrieval.default_top_k must not exceed retrieval.max_top_k");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "hash" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hash, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims == 0 {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
    }
    if matches!(config.embedding.provider.as_str(), "openai" | "ollama")
        && config.embedding.model.is_none()
    {
        bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }

    Ok(config)
}
