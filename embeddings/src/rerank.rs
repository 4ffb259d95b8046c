//! Relevance reranking.
//!
//! A [`Reranker`] scores (query, passage) pairs; [`rerank`] orders a
//! candidate list by those scores, highest first.

use std::cmp::Reverse;

use async_trait::async_trait;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EmbeddingError, Result};

/// Trait for relevance scorers.
#[async_trait]
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    /// Score one candidate against the query. Higher is more relevant.
    async fn score(&self, query: &str, candidate: &str) -> Result<f32>;

    /// Score every candidate, one score per input in input order.
    async fn score_all(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>> {
        let mut scores = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            scores.push(self.score(query, candidate).await?);
        }
        Ok(scores)
    }
}

/// Order `candidates` by descending relevance to `query` and keep `top_n`.
///
/// Equal scores keep candidate order. NaN scores rank last.
pub async fn rerank(
    reranker: &dyn Reranker,
    query: &str,
    candidates: Vec<String>,
    top_n: usize,
) -> Result<Vec<String>> {
    if candidates.is_empty() || top_n == 0 {
        return Ok(Vec::new());
    }

    let scores = reranker.score_all(query, &candidates).await?;
    if scores.len() != candidates.len() {
        return Err(EmbeddingError::InvalidResponse(format!(
            "{} scores for {} candidates",
            scores.len(),
            candidates.len()
        )));
    }

    let mut ranked: Vec<(OrderedFloat<f32>, String)> = scores
        .into_iter()
        .map(|s| OrderedFloat(if s.is_nan() { f32::NEG_INFINITY } else { s }))
        .zip(candidates)
        .collect();
    ranked.sort_by_key(|(score, _)| Reverse(*score));
    ranked.truncate(top_n);

    debug!(
        "Reranked with {}; best score {:?}",
        reranker.name(),
        ranked.first().map(|(s, _)| s.0)
    );
    Ok(ranked.into_iter().map(|(_, text)| text).collect())
}

/// Scores every candidate equally, leaving the fused order in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughReranker;

#[async_trait]
impl Reranker for PassthroughReranker {
    fn name(&self) -> &str {
        "passthrough"
    }

    async fn score(&self, _query: &str, _candidate: &str) -> Result<f32> {
        Ok(0.0)
    }

    async fn score_all(&self, _query: &str, candidates: &[String]) -> Result<Vec<f32>> {
        Ok(vec![0.0; candidates.len()])
    }
}

/// Cross-encoder served over HTTP.
///
/// Posts `{"query", "texts"}` to `<base_url>/rerank` and expects
/// `[{"index", "score"}, ...]` back, the shape text-embeddings-inference
/// serves.
pub struct HttpReranker {
    base_url: String,
    model: Option<String>,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Deserialize)]
struct RerankScore {
    index: usize,
    score: f32,
}

impl HttpReranker {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: None,
            api_key: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    fn name(&self) -> &str {
        "http"
    }

    async fn score(&self, query: &str, candidate: &str) -> Result<f32> {
        let scores = self.score_all(query, &[candidate.to_string()]).await?;
        scores
            .first()
            .copied()
            .ok_or_else(|| EmbeddingError::InvalidResponse("no score in response".to_string()))
    }

    async fn score_all(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let body = RerankRequest {
            query,
            texts: candidates,
            model: self.model.as_deref(),
        };
        let mut request = self
            .client
            .post(format!("{}/rerank", self.base_url))
            .json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiRequest(format!(
                "{status}: {error_text}"
            )));
        }

        let results: Vec<RerankScore> = response.json().await?;
        let mut scores: Vec<Option<f32>> = vec![None; candidates.len()];
        for result in results {
            let slot = scores.get_mut(result.index).ok_or_else(|| {
                EmbeddingError::InvalidResponse(format!(
                    "score for index {} of {} candidates",
                    result.index,
                    candidates.len()
                ))
            })?;
            *slot = Some(result.score);
        }

        scores
            .into_iter()
            .enumerate()
            .map(|(i, s)| {
                s.ok_or_else(|| EmbeddingError::InvalidResponse(format!("no score for index {i}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Scores by how many query words the candidate contains.
    struct OverlapReranker;

    #[async_trait]
    impl Reranker for OverlapReranker {
        fn name(&self) -> &str {
            "overlap"
        }

        async fn score(&self, query: &str, candidate: &str) -> Result<f32> {
            Ok(query
                .split_whitespace()
                .filter(|w| candidate.contains(w))
                .count() as f32)
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn test_rerank_orders_by_score_and_truncates() {
        let candidates = strings(&["nothing", "land lease", "land", "lease"]);
        let ranked = rerank(&OverlapReranker, "land lease", candidates, 3)
            .await
            .unwrap();
        assert_eq!(ranked, strings(&["land lease", "land", "lease"]));
    }

    #[tokio::test]
    async fn test_rerank_ties_keep_input_order() {
        let candidates = strings(&["c", "a", "b"]);
        let ranked = rerank(&PassthroughReranker, "q", candidates.clone(), 10)
            .await
            .unwrap();
        assert_eq!(ranked, candidates);
    }

    #[tokio::test]
    async fn test_rerank_empty() {
        let ranked = rerank(&PassthroughReranker, "q", Vec::new(), 10)
            .await
            .unwrap();
        assert!(ranked.is_empty());
    }

    #[tokio::test]
    async fn test_http_reranker_maps_scores_by_index() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rerank"))
            .and(body_json(serde_json::json!({
                "query": "q",
                "texts": ["a", "b", "c"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"index": 2, "score": 0.9},
                {"index": 0, "score": 0.1},
                {"index": 1, "score": 0.5}
            ])))
            .mount(&server)
            .await;

        let reranker = HttpReranker::new(server.uri());
        let ranked = rerank(&reranker, "q", strings(&["a", "b", "c"]), 2)
            .await
            .unwrap();
        assert_eq!(ranked, strings(&["c", "b"]));
    }

    #[tokio::test]
    async fn test_http_reranker_missing_score_is_invalid() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rerank"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{"index": 0, "score": 0.3}])),
            )
            .mount(&server)
            .await;

        let reranker = HttpReranker::new(server.uri());
        let err = reranker
            .score_all("q", &strings(&["a", "b"]))
            .await
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidResponse(_)));
    }
}
