//! Hybrid ranker: keyword overlap blended with embedding similarity.
//!
//! The ranker embeds the query, over-fetches candidates from the
//! [`VectorIndex`], scores each candidate chunk against the query, and
//! aggregates surviving chunks into document-level results.
//!
//! # Scoring Algorithm
//!
//! 1. Embed the query and fetch `top_k × 5` nearest chunks.
//! 2. `keyword = |query_tokens ∩ chunk_tokens| / |query_tokens|`.
//! 3. `semantic = 1 / (1 + distance)` (the candidate's similarity).
//! 4. `combined = keyword_weight × keyword + semantic_weight × semantic`.
//! 5. Drop chunks with `combined < min_score_threshold`.
//! 6. Group by document (MEAN aggregation). The best chunk supplies the snippet.
//! 7. Sort by relevance (desc, stable) and truncate to `top_k`.
//!
//! Missing chunk text or a failed chunk lookup skips that one candidate.
//! Embedding and index failures abort the search.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;

use crate::embedding::Embedder;
use crate::index::VectorIndex;
use crate::models::{DocumentId, DocumentType, RankedResult, SearchCandidate, SearchResponse};
use crate::store::Store;

/// Candidates fetched per requested result.
pub const OVERFETCH_FACTOR: usize = 5;

/// Snippet length in characters before `"..."` is appended.
pub const SNIPPET_MAX_CHARS: usize = 500;

/// A keyword score above this marks the chunk as an exact match.
pub const EXACT_MATCH_THRESHOLD: f64 = 0.5;

/// Score blending parameters, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingParams {
    pub keyword_weight: f64,
    pub semantic_weight: f64,
    /// Chunks scoring below this are discarded before aggregation.
    pub min_score_threshold: f64,
}

impl Default for RankingParams {
    fn default() -> Self {
        Self {
            keyword_weight: 0.5,
            semantic_weight: 0.5,
            min_score_threshold: 0.15,
        }
    }
}

/// Inputs for a single search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    /// Maximum number of documents to return.
    pub top_k: usize,
    /// Only return documents filed under this type.
    pub document_type_filter: Option<DocumentType>,
}

/// A candidate chunk with its scores and text.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: SearchCandidate,
    pub keyword_score: f64,
    pub semantic_score: f64,
    pub combined_score: f64,
    pub has_exact_match: bool,
    pub text: String,
}

/// Ranks documents for free-text queries.
///
/// Holds shared handles to the index, store, and embedder; construct one
/// per process and reuse it for every query.
pub struct HybridRanker {
    index: Arc<VectorIndex>,
    store: Arc<dyn Store>,
    embedder: Arc<dyn Embedder>,
    params: RankingParams,
}

impl HybridRanker {
    pub fn new(
        index: Arc<VectorIndex>,
        store: Arc<dyn Store>,
        embedder: Arc<dyn Embedder>,
        params: RankingParams,
    ) -> Self {
        Self {
            index,
            store,
            embedder,
            params,
        }
    }

    pub fn params(&self) -> &RankingParams {
        &self.params
    }

    /// Run a hybrid search and return at most `top_k` documents.
    ///
    /// An empty index, or no candidate surviving the threshold, yields an
    /// empty response rather than an error.
    pub async fn search(&self, req: &SearchRequest<'_>) -> Result<SearchResponse> {
        let started = Instant::now();
        if req.top_k == 0 {
            return Ok(SearchResponse::empty(req.query, elapsed_ms(started)));
        }

        let query_vec = self.embedder.embed(req.query).await?;
        let candidates = self
            .index
            .search(&query_vec, req.top_k.saturating_mul(OVERFETCH_FACTOR))?;
        if candidates.is_empty() {
            tracing::debug!(query = req.query, "no candidates in index");
            return Ok(SearchResponse::empty(req.query, elapsed_ms(started)));
        }
        let candidate_count = candidates.len();

        let query_tokens = tokenize(req.query);
        let mut scored: Vec<ScoredCandidate> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let text = match self
                .store
                .get_chunk_text(candidate.document_id, candidate.chunk_index)
                .await
            {
                Ok(Some(text)) if !text.trim().is_empty() => text,
                Ok(_) => {
                    tracing::warn!(
                        document_id = candidate.document_id,
                        chunk_index = candidate.chunk_index,
                        "chunk text missing, skipping candidate"
                    );
                    continue;
                }
                Err(e) => {
                    tracing::warn!(
                        document_id = candidate.document_id,
                        chunk_index = candidate.chunk_index,
                        error = %e,
                        "chunk lookup failed, skipping candidate"
                    );
                    continue;
                }
            };
            scored.push(score_candidate(candidate, text, &query_tokens, &self.params));
        }

        scored.sort_by(|a, b| {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.retain(|s| s.combined_score >= self.params.min_score_threshold);
        if scored.is_empty() {
            tracing::debug!(
                query = req.query,
                candidates = candidate_count,
                threshold = self.params.min_score_threshold,
                "no candidate above threshold"
            );
            return Ok(SearchResponse::empty(req.query, elapsed_ms(started)));
        }

        let mut results: Vec<RankedResult> = Vec::new();
        for (document_id, group) in group_by_document(scored) {
            if let Some(result) = self.rank_group(document_id, &group, req).await {
                results.push(result);
            }
        }

        results.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(req.top_k);

        let search_time_ms = elapsed_ms(started);
        tracing::info!(
            query = req.query,
            candidates = candidate_count,
            results = results.len(),
            search_time_ms,
            "search complete"
        );

        Ok(SearchResponse {
            query: req.query.to_string(),
            total_results: results.len(),
            results,
            search_time_ms,
        })
    }

    /// Build the document-level result for one group, or `None` if the
    /// document is filtered out or its metadata is unavailable.
    async fn rank_group(
        &self,
        document_id: DocumentId,
        group: &[ScoredCandidate],
        req: &SearchRequest<'_>,
    ) -> Option<RankedResult> {
        let meta = match self.store.get_document_metadata(document_id).await {
            Ok(Some(meta)) => meta,
            Ok(None) => {
                tracing::warn!(document_id, "document metadata missing, skipping");
                return None;
            }
            Err(e) => {
                tracing::warn!(document_id, error = %e, "document lookup failed, skipping");
                return None;
            }
        };

        if let Some(wanted) = req.document_type_filter {
            if meta.document_type != wanted {
                return None;
            }
        }

        let n = group.len() as f64;
        let relevance_score = group.iter().map(|s| s.combined_score).sum::<f64>() / n;

        let mut pages = BTreeSet::new();
        for s in group {
            match self
                .store
                .get_chunk_pages(document_id, s.candidate.chunk_index)
                .await
            {
                Ok(Some(p)) => pages.extend(p),
                Ok(None) => {}
                Err(e) => tracing::warn!(
                    document_id,
                    chunk_index = s.candidate.chunk_index,
                    error = %e,
                    "page lookup failed"
                ),
            }
        }

        tracing::debug!(
            document_id,
            chunks = group.len(),
            keyword = group.iter().map(|s| s.keyword_score).sum::<f64>() / n,
            semantic = group.iter().map(|s| s.semantic_score).sum::<f64>() / n,
            combined = relevance_score,
            exact_match = group.iter().any(|s| s.has_exact_match),
            "document score"
        );

        Some(RankedResult {
            document_id,
            filename: meta.filename,
            file_path: meta.file_path,
            document_type: meta.document_type,
            relevance_score,
            matched_chunk_indices: group.iter().map(|s| s.candidate.chunk_index).collect(),
            matched_pages: pages.into_iter().collect(),
            snippet: truncate_snippet(&group[0].text),
        })
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Group candidates by document, keeping first-appearance order of both
/// documents and candidates.
fn group_by_document(scored: Vec<ScoredCandidate>) -> Vec<(DocumentId, Vec<ScoredCandidate>)> {
    let mut positions: HashMap<DocumentId, usize> = HashMap::new();
    let mut groups: Vec<(DocumentId, Vec<ScoredCandidate>)> = Vec::new();
    for s in scored {
        let doc_id = s.candidate.document_id;
        let pos = *positions.entry(doc_id).or_insert_with(|| {
            groups.push((doc_id, Vec::new()));
            groups.len() - 1
        });
        groups[pos].1.push(s);
    }
    groups
}

/// Lowercase alphanumeric tokens of `text`, de-duplicated.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fraction of query tokens that appear in `text`. `0.0` for a query with
/// no tokens.
pub fn keyword_score(query_tokens: &HashSet<String>, text: &str) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let text_tokens = tokenize(text);
    let hits = query_tokens.intersection(&text_tokens).count();
    hits as f64 / query_tokens.len() as f64
}

pub fn combined_score(keyword: f64, semantic: f64, params: &RankingParams) -> f64 {
    params.keyword_weight * keyword + params.semantic_weight * semantic
}

/// Cut `text` to [`SNIPPET_MAX_CHARS`] characters, appending `"..."` if
/// anything was removed.
pub fn truncate_snippet(text: &str) -> String {
    if text.chars().count() <= SNIPPET_MAX_CHARS {
        return text.to_string();
    }
    let mut s: String = text.chars().take(SNIPPET_MAX_CHARS).collect();
    s.push_str("...");
    s
}

/// Score one candidate chunk against the query tokens.
pub fn score_candidate(
    candidate: SearchCandidate,
    text: String,
    query_tokens: &HashSet<String>,
    params: &RankingParams,
) -> ScoredCandidate {
    let keyword = keyword_score(query_tokens, &text);
    let semantic = candidate.similarity;
    ScoredCandidate {
        keyword_score: keyword,
        semantic_score: semantic,
        combined_score: combined_score(keyword, semantic, params),
        has_exact_match: keyword > EXACT_MATCH_THRESHOLD,
        text,
        candidate,
    }
}
