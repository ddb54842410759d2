use std::time::Duration;

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use graphagent_core::config::RetrievalConfig;
use graphagent_core::error::Result;
use graphagent_core::traits::Retriever;
use graphagent_core::types::Snippet;

/// Client for a RAG search service.
///
/// Sends `POST <endpoint>` and expects `{"results": [{"text", "title",
/// "canonical_url"}]}`. Transport and decoding failures are reported as a
/// single `[RAG_ERROR]` snippet.
pub struct HttpRetriever {
    endpoint: String,
    api_key: Option<String>,
    profile: String,
    recall_k: usize,
    rerank_k: usize,
    context_k: usize,
    rerank: bool,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    limit: usize,
    profile: &'a str,
    recall_k: usize,
    rerank_k: usize,
    context_k: usize,
    rerank: bool,
}

impl HttpRetriever {
    pub fn new(endpoint: &str, config: &RetrievalConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build HTTP client with timeout, using defaults");
                reqwest::Client::new()
            });
        Self {
            endpoint: endpoint.to_string(),
            api_key: config.api_key.clone(),
            profile: config.profile.clone(),
            recall_k: config.recall_k,
            rerank_k: config.rerank_k,
            context_k: config.context_k,
            rerank: config.rerank,
            http,
        }
    }

    async fn fetch(&self, query: &str, limit: usize) -> std::result::Result<Value, String> {
        let body = SearchRequest {
            query,
            limit,
            profile: &self.profile,
            recall_k: self.recall_k,
            rerank_k: self.rerank_k,
            context_k: self.context_k,
            rerank: self.rerank,
        };

        let mut req = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req.send().await.map_err(|e| e.to_string())?;
        let status = resp.status();
        if !status.is_success() {
            return Err(format!("HTTP {} from {}", status, self.endpoint));
        }
        resp.json::<Value>().await.map_err(|e| e.to_string())
    }
}

/// Extract snippets from a search response body.
///
/// Accepts `{"results": [...]}` or a bare array; each hit may carry its text
/// under `text` or `snippet` and its source under `canonical_url`, `source`
/// or `url`.
pub fn parse_results(body: &Value, limit: usize) -> Vec<Snippet> {
    let hits = body
        .get("results")
        .and_then(Value::as_array)
        .or_else(|| body.as_array());

    let Some(hits) = hits else {
        return vec![];
    };

    hits.iter()
        .filter_map(|hit| {
            if let Some(s) = hit.as_str() {
                return Some(Snippet::new(s));
            }
            let field = |names: &[&str]| {
                names
                    .iter()
                    .filter_map(|n| hit.get(*n).and_then(Value::as_str))
                    .map(str::trim)
                    .find(|s| !s.is_empty())
                    .map(str::to_string)
            };
            let text = field(&["text", "snippet", "content"])?;
            Some(Snippet {
                text,
                title: field(&["title"]),
                source: field(&["canonical_url", "source", "url"]),
            })
        })
        .take(limit)
        .collect()
}

impl Retriever for HttpRetriever {
    fn name(&self) -> &str {
        "http"
    }

    fn search(&self, query: &str, limit: usize) -> BoxFuture<'_, Result<Vec<Snippet>>> {
        let query = query.to_string();
        Box::pin(async move {
            match self.fetch(&query, limit).await {
                Ok(body) => {
                    let hits = parse_results(&body, limit);
                    debug!(query = %query, hits = hits.len(), "RAG search");
                    Ok(hits)
                }
                Err(e) => {
                    warn!(endpoint = %self.endpoint, error = %e, "RAG search failed");
                    Ok(vec![Snippet::retrieval_error(format!(
                        "{} unreachable: {}",
                        self.endpoint, e
                    ))])
                }
            }
        })
    }
}
