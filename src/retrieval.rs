//! Hybrid retrieval and rank fusion.
//!
//! Chunks are scored against a query on two independent signals, dense
//! cosine similarity and sparse TF-IDF overlap, and the two rankings are
//! fused with Reciprocal Rank Fusion. When an external vector store is
//! configured its server-side fusion is preferred, but any failure there
//! falls through to the local path: a retrieval outage must never fail
//! the overall query.

use std::collections::HashMap;

use tracing::warn;

use crate::config::RagConfig;
use crate::features::{build_idf, cosine_similarity, sparse_similarity};
use crate::models::StorageSnapshot;
use crate::vector_store::VectorIndex;

/// Which path produced the fused chunk scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalSource {
    /// Server-side fusion from the external vector store.
    VectorStore,
    /// Local dense+sparse RRF fusion over the snapshot.
    LocalRrf,
}

impl RetrievalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VectorStore => "qdrant_hybrid",
            Self::LocalRrf => "local_rrf",
        }
    }
}

/// Fuse two 1-based rank lists with Reciprocal Rank Fusion.
///
/// `score(id) = 1/(k + rank_dense) + 1/(k + rank_sparse)`; a list in which
/// an id does not appear contributes 0, and ids absent from both lists are
/// absent from the result.
pub fn rrf_fusion(
    dense_ranks: &HashMap<String, usize>,
    sparse_ranks: &HashMap<String, usize>,
    k: usize,
) -> HashMap<String, f64> {
    let mut fused = HashMap::with_capacity(dense_ranks.len() + sparse_ranks.len());
    for id in dense_ranks.keys().chain(sparse_ranks.keys()) {
        if fused.contains_key(id) {
            continue;
        }
        let dense = dense_ranks
            .get(id)
            .map(|rank| 1.0 / (k + rank) as f64)
            .unwrap_or(0.0);
        let sparse = sparse_ranks
            .get(id)
            .map(|rank| 1.0 / (k + rank) as f64)
            .unwrap_or(0.0);
        fused.insert(id.clone(), dense + sparse);
    }
    fused
}

/// Score every chunk locally and fuse dense and sparse rankings.
///
/// The IDF is rebuilt fresh from the current corpus so re-ingests are
/// reflected immediately. Ties are broken by chunk id so the ranking is
/// reproducible.
pub fn local_hybrid_scores(
    snapshot: &StorageSnapshot,
    q_vector: &[f32],
    q_terms: &HashMap<String, f64>,
    cfg: &RagConfig,
) -> HashMap<String, f64> {
    let chunks: Vec<_> = snapshot.chunks.values().collect();
    let sparse_docs: Vec<&HashMap<String, f64>> = chunks.iter().map(|c| &c.sparse_terms).collect();
    let idf = build_idf(&sparse_docs);

    let mut dense: Vec<(&str, f64)> = chunks
        .iter()
        .map(|c| {
            (
                c.chunk_id.as_str(),
                cosine_similarity(q_vector, &c.dense_vector) as f64,
            )
        })
        .collect();
    sort_scored_desc(&mut dense);
    dense.truncate(cfg.dense_top_k);

    let mut sparse: Vec<(&str, f64)> = chunks
        .iter()
        .map(|c| {
            (
                c.chunk_id.as_str(),
                sparse_similarity(q_terms, &c.sparse_terms, &idf),
            )
        })
        .collect();
    sort_scored_desc(&mut sparse);
    sparse.truncate(cfg.sparse_top_k);

    let dense_ranks: HashMap<String, usize> = dense
        .iter()
        .enumerate()
        .map(|(i, (id, _))| (id.to_string(), i + 1))
        .collect();
    let sparse_ranks: HashMap<String, usize> = sparse
        .iter()
        .enumerate()
        .map(|(i, (id, _))| (id.to_string(), i + 1))
        .collect();

    rrf_fusion(&dense_ranks, &sparse_ranks, cfg.rrf_k)
}

/// Fused chunk scores for a query, preferring the external vector store.
///
/// Any vector-store failure is caught here and control falls through to
/// the local path with a telemetry event; the tag in the result reports
/// which path actually ran.
pub async fn fused_chunk_scores(
    snapshot: &StorageSnapshot,
    q_vector: &[f32],
    q_terms: &HashMap<String, f64>,
    cfg: &RagConfig,
    vector_index: Option<&dyn VectorIndex>,
) -> (HashMap<String, f64>, RetrievalSource) {
    if let Some(index) = vector_index {
        match index
            .hybrid_search(q_vector, q_terms, cfg.dense_top_k, cfg.sparse_top_k)
            .await
        {
            Ok(scores) => return (scores, RetrievalSource::VectorStore),
            Err(err) => {
                warn!(error = %err, "vector store retrieval failed, falling back to local fusion");
            }
        }
    }
    (
        local_hybrid_scores(snapshot, q_vector, q_terms, cfg),
        RetrievalSource::LocalRrf,
    )
}

/// Sort score-descending with id ascending as the deterministic tie-break.
pub fn sort_scored_desc(scored: &mut [(&str, f64)]) {
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
}
