//! Core data models: the persisted document/page/chunk records, the
//! storage snapshot aggregate, and the service request/response types.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current UTC time as an RFC 3339 string, the timestamp format used
/// throughout the snapshot.
pub fn utc_now_iso() -> String {
    Utc::now().to_rfc3339()
}

/// A document owning an ordered set of pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub doc_id: String,
    pub doc_name: String,
    pub version: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: String,
    pub updated_at: String,
}

/// One page of a document.
///
/// `page_id` is derived deterministically as `"{doc_id}:p{page_no}"`;
/// page numbers are contiguous starting at 1 within a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPage {
    pub page_id: String,
    pub doc_id: String,
    pub page_no: usize,
    pub page_text: String,
    pub page_summary: String,
    pub keywords: Vec<String>,
}

impl StoredPage {
    /// Deterministic page identity from document id and 1-based number.
    pub fn page_id_for(doc_id: &str, page_no: usize) -> String {
        format!("{doc_id}:p{page_no}")
    }
}

/// A token-windowed slice of a page: the unit of retrieval scoring.
///
/// `chunk_id` is `"{page_id}:c{chunk_no}"`, 1-based. `doc_id` and
/// `page_no` are denormalized for fast filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    pub chunk_id: String,
    pub page_id: String,
    pub doc_id: String,
    pub page_no: usize,
    pub chunk_no: usize,
    pub offset_start: usize,
    pub offset_end: usize,
    pub chunk_text: String,
    pub token_count: usize,
    pub dense_vector: Vec<f32>,
    pub sparse_terms: HashMap<String, f64>,
}

impl StoredChunk {
    /// Deterministic chunk identity from page id and 1-based number.
    pub fn chunk_id_for(page_id: &str, chunk_no: usize) -> String {
        format!("{page_id}:c{chunk_no}")
    }
}

/// The unit of persistence: all documents, pages, and chunks plus a single
/// last-updated timestamp. Read in full, written in full.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSnapshot {
    #[serde(default)]
    pub documents: HashMap<String, StoredDocument>,
    #[serde(default)]
    pub pages: HashMap<String, StoredPage>,
    #[serde(default)]
    pub chunks: HashMap<String, StoredChunk>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl StorageSnapshot {
    /// Remove all pages and chunks belonging to `doc_id` (replace-on-reingest).
    pub fn remove_document_data(&mut self, doc_id: &str) {
        self.pages.retain(|_, p| p.doc_id != doc_id);
        self.chunks.retain(|_, c| c.doc_id != doc_id);
    }
}

// ============ Service request/response types ============

/// Ingest input: a named document with either raw content or an explicit
/// ordered page list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub doc_id: Option<String>,
    pub doc_name: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub pages: Option<Vec<String>>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "v1".to_string()
}

/// Ingest outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub doc_id: String,
    pub version: String,
    pub page_count: usize,
    pub chunk_count: usize,
    pub updated_at: String,
}

/// Query input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub with_debug: bool,
}

fn default_top_k() -> usize {
    10
}

/// A (document, page, chunk) triple tying an answer back to its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub doc_id: String,
    pub page_no: usize,
    pub chunk_id: String,
}

/// Pipeline introspection attached to a response when requested.
///
/// `reranker`, `generator`, and `retrieval_source` report what actually
/// ran, so degraded fallback paths are auditable without log access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDebug {
    pub retrieved_chunks: usize,
    pub candidate_pages: usize,
    pub rerank_pages: usize,
    pub reranker: Option<String>,
    pub generator: Option<String>,
    pub retrieval_source: Option<String>,
}

/// Query outcome: answer text plus ordered citations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<QueryDebug>,
}

/// Store counts, a pure read of the current snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub docs: usize,
    pub pages: usize,
    pub chunks: usize,
    pub updated_at: Option<String>,
}
