//! Feature extraction: dense hash embeddings and sparse term statistics.
//!
//! The dense vector is a deterministic, locality-insensitive hashing
//! embedding, a reproducible stand-in for a trained model. Per token, a
//! SHA-256 digest selects one of `dim` buckets and a ±1 sign; the
//! accumulated vector is L2-normalized so that downstream similarity is a
//! plain dot product. The same text and dimension always produce a
//! bit-identical vector.
//!
//! The sparse side is normalized term frequency plus a smoothed IDF over
//! whatever corpus the caller supplies (the full chunk set during
//! retrieval, the candidate set during lexical reranking).

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::text::tokenize;

/// Default dense vector dimensionality.
pub const DEFAULT_VECTOR_DIM: usize = 384;

/// L2-normalize in place. A zero vector is left untouched.
pub fn l2_normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for v in vec.iter_mut() {
        *v /= norm;
    }
}

/// Deterministic hashing embedding of `text` into `dim` buckets.
///
/// Each token's SHA-256 digest picks an index (first four digest bytes,
/// big-endian, mod `dim`) and a sign (parity of the fifth byte). The
/// accumulated vector is L2-normalized; text with no tokens yields the
/// zero vector.
pub fn hash_embedding(text: &str, dim: usize) -> Vec<f32> {
    let tokens = tokenize(text);
    let mut vec = vec![0.0f32; dim];
    if tokens.is_empty() {
        return vec;
    }

    for token in &tokens {
        let digest = Sha256::digest(token.as_bytes());
        let idx = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize % dim;
        let sign = if digest[4] % 2 == 0 { 1.0 } else { -1.0 };
        vec[idx] += sign;
    }

    l2_normalize(&mut vec);
    vec
}

/// Dot product of two already-normalized vectors.
///
/// Returns `0.0` when the lengths differ or either vector is empty, so
/// similarity against the zero vector is defined without division.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Normalized term frequencies of `text`: token count / total tokens.
///
/// Empty text yields an empty map.
pub fn sparse_terms(text: &str) -> HashMap<String, f64> {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return HashMap::new();
    }
    let total = tokens.len() as f64;
    let mut tf: HashMap<String, f64> = HashMap::new();
    for token in tokens {
        *tf.entry(token).or_insert(0.0) += 1.0;
    }
    for v in tf.values_mut() {
        *v /= total;
    }
    tf
}

/// Smoothed inverse document frequency over a corpus of term maps.
///
/// `idf = ln(1 + (n - df + 0.5) / (df + 0.5))` with `n = max(corpus, 1)`.
/// Never clamped: a term present in every document bottoms out at
/// `ln(1 + 0.5/(n + 0.5))`, just above zero, and that exact value must
/// flow through to scoring.
pub fn build_idf(docs: &[&HashMap<String, f64>]) -> HashMap<String, f64> {
    let n = docs.len().max(1) as f64;
    let mut df: HashMap<&str, f64> = HashMap::new();
    for terms in docs {
        for term in terms.keys() {
            *df.entry(term.as_str()).or_insert(0.0) += 1.0;
        }
    }
    df.into_iter()
        .map(|(term, count)| {
            let idf = (1.0 + (n - count + 0.5) / (count + 0.5)).ln();
            (term.to_string(), idf)
        })
        .collect()
}

/// Weighted term overlap between a query and a document.
///
/// Sums `query_tf * doc_tf * idf[term]` over query terms present in the
/// document; a term with no computed IDF weighs `1.0`, and terms absent
/// from the document contribute nothing.
pub fn sparse_similarity(
    query_terms: &HashMap<String, f64>,
    doc_terms: &HashMap<String, f64>,
    idf: &HashMap<String, f64>,
) -> f64 {
    let mut score = 0.0;
    for (term, q_tf) in query_terms {
        if let Some(d_tf) = doc_terms.get(term) {
            score += q_tf * d_tf * idf.get(term).copied().unwrap_or(1.0);
        }
    }
    score
}
