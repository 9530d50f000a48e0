//! End-to-end tests: chunk → embed → index → rank, using the in-memory
//! store and the hashing embedder.

use std::sync::Arc;

use folio_core::chunk::chunk_pages;
use folio_core::embedding::{Embedder, HashEmbedder};
use folio_core::index::VectorIndex;
use folio_core::models::{DocumentId, DocumentType, NewDocument, Page};
use folio_core::search::{HybridRanker, RankingParams, SearchRequest};
use folio_core::store::memory::InMemoryStore;
use folio_core::store::Store;

const DIMS: usize = 384;

struct Pipeline {
    store: Arc<InMemoryStore>,
    index: Arc<VectorIndex>,
    embedder: Arc<HashEmbedder>,
}

impl Pipeline {
    fn new() -> Self {
        Self {
            store: Arc::new(InMemoryStore::new()),
            index: Arc::new(VectorIndex::new(DIMS)),
            embedder: Arc::new(HashEmbedder::new(DIMS)),
        }
    }

    async fn ingest(&self, filename: &str, doc_type: DocumentType, pages: &[Page]) -> DocumentId {
        let id = self
            .store
            .insert_document(&NewDocument {
                filename: filename.to_string(),
                file_path: format!("/data/{}", filename),
                document_type: doc_type,
                total_pages: pages.len() as u32,
                file_size_mb: 0.01,
            })
            .await
            .unwrap();

        let chunks = chunk_pages(id, pages, 1000, 200);
        self.store.insert_chunks(&chunks).await.unwrap();

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await.unwrap();
        let indices: Vec<u32> = chunks.iter().map(|c| c.chunk_index).collect();
        let range = self.index.add(&vectors, id, &indices).unwrap();
        self.store
            .set_vector_range(id, range, chunks.len() as u32)
            .await
            .unwrap();
        id
    }

    fn ranker(&self, params: RankingParams) -> HybridRanker {
        HybridRanker::new(
            self.index.clone(),
            self.store.clone(),
            self.embedder.clone(),
            params,
        )
    }
}

fn request(query: &str) -> SearchRequest<'_> {
    SearchRequest {
        query,
        top_k: 5,
        document_type_filter: None,
    }
}

#[tokio::test]
async fn revenue_query_ranks_financial_document_first() {
    let p = Pipeline::new();
    let a = p
        .ingest(
            "annual.pdf",
            DocumentType::FinancialReport,
            &[Page::new(1, "annual revenue grew 16 percent")],
        )
        .await;
    let b = p
        .ingest(
            "handbook.pdf",
            DocumentType::Other,
            &[Page::new(1, "vacation policy offers 20 days")],
        )
        .await;

    let resp = p
        .ranker(RankingParams::default())
        .search(&request("revenue growth"))
        .await
        .unwrap();

    assert!(!resp.results.is_empty());
    let top = &resp.results[0];
    assert_eq!(top.document_id, a);
    assert!(top.relevance_score > 0.15);
    assert_eq!(top.matched_pages, vec![1]);
    assert_eq!(top.snippet, "annual revenue grew 16 percent");

    if let Some(other) = resp.results.iter().find(|r| r.document_id == b) {
        assert!(other.relevance_score >= 0.15);
        assert!(other.relevance_score < top.relevance_score);
    }

    // B shares no vocabulary with the query, so it scores only half its
    // semantic similarity and a stricter threshold removes it.
    let strict = RankingParams {
        min_score_threshold: 0.2,
        ..RankingParams::default()
    };
    let resp = p.ranker(strict).search(&request("revenue growth")).await.unwrap();
    let ids: Vec<DocumentId> = resp.results.iter().map(|r| r.document_id).collect();
    assert_eq!(ids, vec![a]);
}

#[tokio::test]
async fn empty_index_returns_no_results() {
    let p = Pipeline::new();
    let resp = p
        .ranker(RankingParams::default())
        .search(&request("anything at all"))
        .await
        .unwrap();
    assert_eq!(resp.total_results, 0);
    assert!(resp.results.is_empty());
}

#[tokio::test]
async fn deleted_document_never_appears() {
    let p = Pipeline::new();
    let long_report: Vec<Page> = (1..=3)
        .map(|n| {
            Page::new(
                n,
                "Quarterly revenue and operating margin improved again. ".repeat(40),
            )
        })
        .collect();
    let a = p.ingest("q3.pdf", DocumentType::FinancialReport, &long_report).await;
    let b = p
        .ingest(
            "q4.pdf",
            DocumentType::FinancialReport,
            &[Page::new(1, "Quarterly revenue declined slightly.")],
        )
        .await;

    let before = p.index.stats().total_vectors;
    let a_vectors = p.index.count_for_document(a);
    assert!(a_vectors > 1);

    assert!(p.index.delete_document(a).unwrap());
    assert!(p.store.delete_document(a).await.unwrap());
    assert_eq!(p.index.stats().total_vectors, before - a_vectors);
    for (pos, r) in p.index.records().iter().enumerate() {
        assert_eq!(r.vector_id, pos as u64);
    }

    let resp = p
        .ranker(RankingParams::default())
        .search(&request("quarterly revenue"))
        .await
        .unwrap();
    assert!(resp.results.iter().all(|r| r.document_id != a));
    assert_eq!(resp.results[0].document_id, b);

    assert!(!p.index.delete_document(a).unwrap());
}

#[tokio::test]
async fn type_filter_restricts_results() {
    let p = Pipeline::new();
    p.ingest(
        "inv-001.pdf",
        DocumentType::Invoice,
        &[Page::new(1, "Invoice total amount due 500 dollars")],
    )
    .await;
    let contract = p
        .ingest(
            "msa.pdf",
            DocumentType::Contract,
            &[Page::new(1, "Contract total amount payable on signature")],
        )
        .await;

    let req = SearchRequest {
        query: "total amount",
        top_k: 5,
        document_type_filter: Some(DocumentType::Contract),
    };
    let resp = p.ranker(RankingParams::default()).search(&req).await.unwrap();
    assert_eq!(resp.results.len(), 1);
    assert_eq!(resp.results[0].document_id, contract);
}

#[tokio::test]
async fn multi_page_document_reports_matched_pages() {
    let p = Pipeline::new();
    let pages: Vec<Page> = (1..=3)
        .map(|n| Page::new(n, format!("Section {} covers lease obligations. ", n).repeat(30)))
        .collect();
    let id = p.ingest("lease.pdf", DocumentType::Contract, &pages).await;

    let chunks = p.store.get_chunks(id).await.unwrap();
    assert!(chunks.len() >= 2);
    for (i, c) in chunks.iter().enumerate() {
        assert_eq!(c.chunk_index, i as u32);
    }

    let resp = p
        .ranker(RankingParams::default())
        .search(&request("lease obligations"))
        .await
        .unwrap();
    let top = &resp.results[0];
    assert_eq!(top.document_id, id);
    assert!(!top.matched_pages.is_empty());
    for pair in top.matched_pages.windows(2) {
        assert!(pair[0] < pair[1]);
    }
}
