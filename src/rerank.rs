//! Pluggable page reranking.
//!
//! Candidate pages carry a base score from fusion and aggregation; a
//! reranker reorders them with a second, more precise signal. The lexical
//! variant blends in candidate-local TF-IDF similarity and is always
//! available; the model variant delegates text-pair scoring to an external
//! cross-encoder backend. A failed model backend is substituted with the
//! lexical variant; the substitution never fails the request and is
//! observable via telemetry and the response debug block.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use crate::config::Config;
use crate::error::{RagError, Result};
use crate::features::{build_idf, sparse_similarity, sparse_terms};

/// One candidate handed to a reranker.
#[derive(Debug, Clone)]
pub struct RerankItem {
    pub item_id: String,
    pub text: String,
    pub base_score: f64,
}

/// A reranking capability: reorder candidates, best first.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Short name reported in telemetry and debug output.
    fn name(&self) -> &'static str;

    /// Return `(item_id, score)` pairs sorted descending by score.
    async fn rerank(&self, query: &str, items: &[RerankItem]) -> Result<Vec<(String, f64)>>;
}

// ============ Lexical reranker ============

/// Blends the base score with TF-IDF similarity computed over exactly the
/// candidate items' texts. Pure computation, cannot fail.
pub struct LexicalReranker {
    alpha: f64,
}

impl LexicalReranker {
    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }
}

#[async_trait]
impl Reranker for LexicalReranker {
    fn name(&self) -> &'static str {
        "lexical"
    }

    async fn rerank(&self, query: &str, items: &[RerankItem]) -> Result<Vec<(String, f64)>> {
        let q_terms = sparse_terms(query);
        let item_terms: Vec<HashMap<String, f64>> =
            items.iter().map(|i| sparse_terms(&i.text)).collect();
        let refs: Vec<&HashMap<String, f64>> = item_terms.iter().collect();
        let idf = build_idf(&refs);

        let mut scored: Vec<(String, f64)> = items
            .iter()
            .zip(item_terms.iter())
            .map(|(item, terms)| {
                let lexical = sparse_similarity(&q_terms, terms, &idf);
                let score = item.base_score * (1.0 - self.alpha) + lexical * self.alpha;
                (item.item_id.clone(), score)
            })
            .collect();
        sort_desc(&mut scored);
        Ok(scored)
    }
}

// ============ Model-backed reranker ============

/// Delegates text-pair scoring to an external reranking endpoint
/// (`POST {api_base}/rerank`, Cohere/TEI-style), in batches, and blends
/// the returned scores with the base score.
#[derive(Debug)]
pub struct ModelReranker {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
    base_weight: f64,
    batch_size: usize,
}

impl ModelReranker {
    pub fn new(config: &Config) -> Result<Self> {
        let api_base = config
            .rerank
            .api_base
            .clone()
            .filter(|base| !base.trim().is_empty())
            .ok_or_else(|| {
                RagError::Configuration(
                    "rerank.api_base is required for the model reranker".to_string(),
                )
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.rerank.timeout_secs))
            .build()
            .map_err(|e| RagError::Configuration(format!("reranker http client: {e}")))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: config.rerank.api_key.clone(),
            model: config.rerank.model.clone(),
            base_weight: config.rag.rerank_base_weight,
            batch_size: config.rag.rerank_batch_size.max(1),
        })
    }

    /// Score one batch of texts against the query, aligned by position.
    async fn score_batch(&self, query: &str, texts: &[&str]) -> Result<Vec<f64>> {
        let mut request = self
            .client
            .post(format!("{}/rerank", self.api_base))
            .json(&json!({
                "model": self.model,
                "query": query,
                "documents": texts,
            }));
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| RagError::transient("reranker", e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RagError::transient("reranker", format!("HTTP {status}")));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RagError::transient("reranker", e))?;

        let results = body["results"]
            .as_array()
            .ok_or_else(|| RagError::transient("reranker", "malformed rerank response"))?;

        let mut scores = vec![0.0; texts.len()];
        for entry in results {
            let index = entry["index"].as_u64().map(|i| i as usize);
            let score = entry["relevance_score"].as_f64();
            match (index, score) {
                (Some(i), Some(s)) if i < scores.len() => scores[i] = s,
                _ => {
                    return Err(RagError::transient(
                        "reranker",
                        "rerank result out of alignment",
                    ))
                }
            }
        }
        Ok(scores)
    }
}

#[async_trait]
impl Reranker for ModelReranker {
    fn name(&self) -> &'static str {
        "model"
    }

    async fn rerank(&self, query: &str, items: &[RerankItem]) -> Result<Vec<(String, f64)>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let mut model_scores: Vec<f64> = Vec::with_capacity(items.len());
        for batch in items.chunks(self.batch_size) {
            let texts: Vec<&str> = batch.iter().map(|i| i.text.as_str()).collect();
            model_scores.extend(self.score_batch(query, &texts).await?);
        }

        let mut scored: Vec<(String, f64)> = items
            .iter()
            .zip(model_scores)
            .map(|(item, model_score)| {
                let score =
                    item.base_score * self.base_weight + model_score * (1.0 - self.base_weight);
                (item.item_id.clone(), score)
            })
            .collect();
        sort_desc(&mut scored);
        Ok(scored)
    }
}

fn sort_desc(scored: &mut [(String, f64)]) {
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
}

/// Select the configured reranker; a model reranker that fails to
/// construct is substituted with the lexical one.
pub fn build_reranker(config: &Config) -> Arc<dyn Reranker> {
    if config.rerank.provider == "model" {
        match ModelReranker::new(config) {
            Ok(reranker) => return Arc::new(reranker),
            Err(err) => {
                warn!(error = %err, "model reranker unavailable, using lexical reranker");
            }
        }
    }
    Arc::new(LexicalReranker::new(config.rag.rerank_lexical_alpha))
}
