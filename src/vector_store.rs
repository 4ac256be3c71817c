//! External vector store collaborator (Qdrant).
//!
//! The [`VectorIndex`] trait is the capability set the retriever needs:
//! ensure a collection with a dense cosine space and a sparse space,
//! upsert per-chunk records, delete a document's records, and run a
//! combined dense+sparse query with server-side RRF fusion.
//!
//! Every call is bounded by the configured timeout and every failure
//! surfaces as [`RagError::TransientCollaborator`]; the retriever catches
//! that at its boundary and falls back to local fusion, so a vector-store
//! outage can never fail a query.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::config::QdrantConfig;
use crate::error::{RagError, Result};
use crate::models::StoredChunk;

/// Capability set of an external vector database.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection if it does not exist yet.
    async fn ensure_collection(&self) -> Result<()>;

    /// Upsert dense+sparse records for the given chunks.
    async fn upsert_chunks(&self, chunks: &[StoredChunk]) -> Result<()>;

    /// Delete all records belonging to one document.
    async fn delete_doc_chunks(&self, doc_id: &str) -> Result<()>;

    /// Combined dense+sparse query with server-side fusion.
    ///
    /// Returns fused relevance scores keyed by chunk id.
    async fn hybrid_search(
        &self,
        q_dense: &[f32],
        q_sparse_terms: &HashMap<String, f64>,
        dense_top_k: usize,
        sparse_top_k: usize,
    ) -> Result<HashMap<String, f64>>;
}

/// Qdrant REST implementation of [`VectorIndex`].
pub struct QdrantIndex {
    client: reqwest::Client,
    url: String,
    collection: String,
    api_key: Option<String>,
    vector_dim: usize,
}

impl QdrantIndex {
    pub fn new(config: &QdrantConfig, vector_dim: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::transient("qdrant", e))?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            api_key: config.api_key.clone(),
            vector_dim,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, format!("{}{path}", self.url));
        if let Some(key) = &self.api_key {
            builder = builder.header("api-key", key);
        }
        builder
    }

    async fn send_json(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let mut builder = self.request(method, path);
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| RagError::transient("qdrant", e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(RagError::transient(
                "qdrant",
                format!("HTTP {status}: {detail}"),
            ));
        }
        response
            .json()
            .await
            .map_err(|e| RagError::transient("qdrant", e))
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_collection(&self) -> Result<()> {
        let exists = self
            .send_json(
                reqwest::Method::GET,
                &format!("/collections/{}/exists", self.collection),
                None,
            )
            .await?;
        if exists["result"]["exists"].as_bool() == Some(true) {
            return Ok(());
        }

        self.send_json(
            reqwest::Method::PUT,
            &format!("/collections/{}", self.collection),
            Some(json!({
                "vectors": {
                    "dense": { "size": self.vector_dim, "distance": "Cosine" }
                },
                "sparse_vectors": {
                    "sparse": {}
                }
            })),
        )
        .await?;
        Ok(())
    }

    async fn upsert_chunks(&self, chunks: &[StoredChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let points: Vec<serde_json::Value> = chunks
            .iter()
            .map(|chunk| {
                let sparse = to_sparse_vector(&chunk.sparse_terms);
                json!({
                    "id": point_id(&chunk.chunk_id),
                    "vector": {
                        "dense": chunk.dense_vector,
                        "sparse": sparse,
                    },
                    "payload": {
                        "chunk_id": chunk.chunk_id,
                        "doc_id": chunk.doc_id,
                        "page_id": chunk.page_id,
                        "page_no": chunk.page_no,
                        "chunk_no": chunk.chunk_no,
                    }
                })
            })
            .collect();

        self.send_json(
            reqwest::Method::PUT,
            &format!("/collections/{}/points?wait=true", self.collection),
            Some(json!({ "points": points })),
        )
        .await?;
        Ok(())
    }

    async fn delete_doc_chunks(&self, doc_id: &str) -> Result<()> {
        self.send_json(
            reqwest::Method::POST,
            &format!("/collections/{}/points/delete?wait=true", self.collection),
            Some(json!({
                "filter": {
                    "must": [
                        { "key": "doc_id", "match": { "value": doc_id } }
                    ]
                }
            })),
        )
        .await?;
        Ok(())
    }

    async fn hybrid_search(
        &self,
        q_dense: &[f32],
        q_sparse_terms: &HashMap<String, f64>,
        dense_top_k: usize,
        sparse_top_k: usize,
    ) -> Result<HashMap<String, f64>> {
        let sparse = to_sparse_vector(q_sparse_terms);
        let response = self
            .send_json(
                reqwest::Method::POST,
                &format!("/collections/{}/points/query", self.collection),
                Some(json!({
                    "prefetch": [
                        { "query": q_dense, "using": "dense", "limit": dense_top_k },
                        { "query": sparse, "using": "sparse", "limit": sparse_top_k }
                    ],
                    "query": { "fusion": "rrf" },
                    "limit": dense_top_k.max(sparse_top_k),
                    "with_payload": true
                })),
            )
            .await?;

        let points = response["result"]["points"]
            .as_array()
            .ok_or_else(|| RagError::transient("qdrant", "malformed query response"))?;

        let mut scores = HashMap::new();
        for point in points {
            let chunk_id = point["payload"]["chunk_id"]
                .as_str()
                .ok_or_else(|| RagError::transient("qdrant", "point missing chunk_id payload"))?;
            let score = point["score"].as_f64().unwrap_or(0.0);
            scores.insert(chunk_id.to_string(), score);
        }
        Ok(scores)
    }
}

/// Stable point id for a chunk. Qdrant only accepts UUIDs or integers as
/// point ids, so the chunk id is folded through SHA-256 into a UUID-shaped
/// string; the real chunk id travels in the payload.
fn point_id(chunk_id: &str) -> String {
    let digest = Sha256::digest(chunk_id.as_bytes());
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        digest[0], digest[1], digest[2], digest[3],
        digest[4], digest[5], digest[6], digest[7],
        digest[8], digest[9], digest[10], digest[11],
        digest[12], digest[13], digest[14], digest[15],
    )
}

/// Map a term-frequency map onto Qdrant's sparse indices/values pairs.
/// Term indices are the first four bytes of the term's SHA-256, sorted for
/// deterministic payloads.
fn to_sparse_vector(terms: &HashMap<String, f64>) -> serde_json::Value {
    let mut pairs: Vec<(u32, f64)> = terms
        .iter()
        .map(|(term, freq)| (term_index(term), *freq))
        .collect();
    pairs.sort_by_key(|(idx, _)| *idx);

    json!({
        "indices": pairs.iter().map(|(idx, _)| *idx).collect::<Vec<_>>(),
        "values": pairs.iter().map(|(_, v)| *v).collect::<Vec<_>>(),
    })
}

fn term_index(term: &str) -> u32 {
    let digest = Sha256::digest(term.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_is_stable_and_uuid_shaped() {
        let a = point_id("doc:p1:c1");
        let b = point_id("doc:p1:c1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 36);
        assert_eq!(a.matches('-').count(), 4);
        assert_ne!(a, point_id("doc:p1:c2"));
    }

    #[test]
    fn test_sparse_vector_sorted_and_aligned() {
        let terms = HashMap::from([
            ("apple".to_string(), 0.5),
            ("banana".to_string(), 0.25),
            ("cherry".to_string(), 0.25),
        ]);
        let sparse = to_sparse_vector(&terms);
        let indices: Vec<u64> = sparse["indices"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_u64().unwrap())
            .collect();
        let values = sparse["values"].as_array().unwrap();
        assert_eq!(indices.len(), 3);
        assert_eq!(values.len(), 3);
        assert!(indices.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_empty_sparse_vector() {
        let sparse = to_sparse_vector(&HashMap::new());
        assert!(sparse["indices"].as_array().unwrap().is_empty());
        assert!(sparse["values"].as_array().unwrap().is_empty());
    }

    fn unreachable_index() -> QdrantIndex {
        let config = QdrantConfig {
            enabled: true,
            url: "http://127.0.0.1:1".to_string(),
            api_key: None,
            collection: "test".to_string(),
            timeout_secs: 1,
        };
        QdrantIndex::new(&config, 16).unwrap()
    }

    #[tokio::test]
    async fn test_ensure_collection_unreachable_is_transient() {
        let err = unreachable_index().ensure_collection().await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_hybrid_search_unreachable_is_transient() {
        let index = unreachable_index();
        let err = index
            .hybrid_search(&[0.0; 16], &HashMap::new(), 5, 5)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
