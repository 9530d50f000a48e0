//! `folio search`: run the hybrid ranker and print results.

use anyhow::Result;
use folio_core::models::{DocumentType, SearchResponse};
use folio_core::search::SearchRequest;

use crate::app::App;

pub async fn run_search(
    app: &App,
    query: &str,
    top_k: Option<usize>,
    document_type: Option<DocumentType>,
    json: bool,
) -> Result<()> {
    let response = search(app, query, top_k, document_type).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_human(&response);
    }
    Ok(())
}

/// Search with `top_k` defaulted and capped by `[retrieval]`.
pub async fn search(
    app: &App,
    query: &str,
    top_k: Option<usize>,
    document_type: Option<DocumentType>,
) -> Result<SearchResponse> {
    if query.trim().is_empty() {
        return Ok(SearchResponse::empty(query, 0.0));
    }
    let request = SearchRequest {
        query,
        top_k: app.config.retrieval.effective_top_k(top_k),
        document_type_filter: document_type,
    };
    app.ranker.search(&request).await
}

fn print_human(response: &SearchResponse) {
    if response.results.is_empty() {
        println!("No results.");
        return;
    }

    for (i, result) in response.results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} ({})",
            i + 1,
            result.relevance_score,
            result.filename,
            result.document_type
        );
        println!("    id: {}", result.document_id);
        println!("    pages: {}", join_numbers(&result.matched_pages));
        println!("    chunks: {}", join_numbers(&result.matched_chunk_indices));
        println!("    snippet: {}", result.snippet.replace('\n', " "));
        println!();
    }
    println!(
        "{} result{} in {:.1} ms",
        response.total_results,
        if response.total_results == 1 { "" } else { "s" },
        response.search_time_ms
    );
}

fn join_numbers(values: &[u32]) -> String {
    values
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_numbers() {
        assert_eq!(join_numbers(&[]), "");
        assert_eq!(join_numbers(&[1, 2, 5]), "1, 2, 5");
    }
}
