//! End-to-end tests of the ingest and query pipeline against a
//! temp-directory snapshot store, with local retrieval, the lexical
//! reranker, and the extractive generator.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use page_index_rag::config::Config;
use page_index_rag::error::{RagError, Result};
use page_index_rag::generate::ExtractiveGenerator;
use page_index_rag::models::{IngestRequest, QueryRequest, StoredChunk};
use page_index_rag::rerank::{LexicalReranker, RerankItem, Reranker};
use page_index_rag::service::{RagService, EMPTY_STORE_ANSWER};
use page_index_rag::store::SnapshotStore;
use page_index_rag::vector_store::VectorIndex;

fn test_config(dir: &tempfile::TempDir) -> Config {
    let mut config = Config::default();
    config.store.path = dir.path().join("snapshot.json");
    config
}

fn test_service(dir: &tempfile::TempDir) -> RagService {
    let config = test_config(dir);
    let store = Arc::new(SnapshotStore::new(config.store.path.clone()));
    let alpha = config.rag.rerank_lexical_alpha;
    RagService::new(
        config,
        store,
        None,
        Arc::new(LexicalReranker::new(alpha)),
        Arc::new(ExtractiveGenerator),
    )
}

fn ingest_request(doc_id: &str, pages: &[&str]) -> IngestRequest {
    IngestRequest {
        doc_id: Some(doc_id.to_string()),
        doc_name: "fruit-handbook".to_string(),
        content: None,
        pages: Some(pages.iter().map(|p| p.to_string()).collect()),
        metadata: HashMap::new(),
        version: "v1".to_string(),
    }
}

fn query_request(query: &str, top_k: usize) -> QueryRequest {
    QueryRequest {
        query: query.to_string(),
        top_k,
        with_debug: true,
    }
}

#[tokio::test]
async fn query_finds_the_right_page() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);

    let response = service
        .ingest(ingest_request("doc1", &["苹果 富含 维生素 C", "香蕉 富含 钾"]))
        .await
        .unwrap();
    assert_eq!(response.page_count, 2);
    assert_eq!(response.chunk_count, 2);

    let answer = service.query(query_request("钾 在 哪一页", 3)).await.unwrap();
    assert!(
        answer.citations.iter().any(|c| c.page_no == 2),
        "expected a citation for page 2, got {:?}",
        answer.citations
    );
    assert!(answer.citations.len() <= 3);
    assert!(answer.answer.contains("[p2]"));

    let debug = answer.debug.unwrap();
    assert_eq!(debug.retrieval_source.as_deref(), Some("local_rrf"));
    assert_eq!(debug.reranker.as_deref(), Some("lexical"));
    assert_eq!(debug.generator.as_deref(), Some("extractive"));
    assert!(debug.retrieved_chunks > 0);
    assert!(debug.candidate_pages > 0);
    assert!(debug.rerank_pages > 0);
}

#[tokio::test]
async fn empty_store_returns_fixed_answer() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);

    let response = service.query(query_request("anything at all", 5)).await.unwrap();
    assert_eq!(response.answer, EMPTY_STORE_ANSWER);
    assert!(response.citations.is_empty());
    let debug = response.debug.unwrap();
    assert_eq!(debug.retrieved_chunks, 0);
    assert!(debug.retrieval_source.is_none());
}

#[tokio::test]
async fn reingest_replaces_pages_and_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);

    service
        .ingest(ingest_request(
            "doc1",
            &["first edition page one", "first edition page two"],
        ))
        .await
        .unwrap();
    let before = service.status().unwrap();
    assert_eq!((before.docs, before.pages, before.chunks), (1, 2, 2));

    service
        .ingest(ingest_request("doc1", &["second edition only page"]))
        .await
        .unwrap();
    let after = service.status().unwrap();
    assert_eq!((after.docs, after.pages, after.chunks), (1, 1, 1));

    // No citation may ever reference a chunk from the replaced edition.
    let response = service.query(query_request("edition page", 10)).await.unwrap();
    assert!(!response.citations.is_empty());
    for citation in &response.citations {
        assert_eq!(citation.chunk_id, "doc1:p1:c1");
        assert_eq!(citation.page_no, 1);
    }
}

#[tokio::test]
async fn ingest_from_raw_content_segments_pages() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);

    let content = "alpha section\u{0c}beta section\u{0c}gamma section";
    let response = service
        .ingest(IngestRequest {
            doc_id: None,
            doc_name: "scanned".to_string(),
            content: Some(content.to_string()),
            pages: None,
            metadata: HashMap::new(),
            version: "v1".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(response.page_count, 3);
    assert!(!response.doc_id.is_empty());

    let status = service.status().unwrap();
    assert_eq!(status.pages, 3);
    assert!(status.updated_at.is_some());
}

#[tokio::test]
async fn empty_ingest_is_a_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);

    let err = service
        .ingest(IngestRequest {
            doc_id: None,
            doc_name: "empty".to_string(),
            content: Some("   \n\n  ".to_string()),
            pages: None,
            metadata: HashMap::new(),
            version: "v1".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Validation(_)));

    let err = service
        .query(query_request("   ", 3))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Validation(_)));
}

struct FailingReranker;

#[async_trait]
impl Reranker for FailingReranker {
    fn name(&self) -> &'static str {
        "model"
    }
    async fn rerank(&self, _query: &str, _items: &[RerankItem]) -> Result<Vec<(String, f64)>> {
        Err(RagError::transient("reranker", "backend unreachable"))
    }
}

#[tokio::test]
async fn reranker_failure_degrades_to_lexical() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let store = Arc::new(SnapshotStore::new(config.store.path.clone()));
    let service = RagService::new(
        config,
        store,
        None,
        Arc::new(FailingReranker),
        Arc::new(ExtractiveGenerator),
    );

    service
        .ingest(ingest_request("doc1", &["bananas are rich in potassium"]))
        .await
        .unwrap();

    let response = service
        .query(query_request("potassium", 3))
        .await
        .expect("a reranker failure must never fail the query");
    assert!(!response.citations.is_empty());
    assert_eq!(response.debug.unwrap().reranker.as_deref(), Some("lexical"));
}

struct FailingIndex;

#[async_trait]
impl VectorIndex for FailingIndex {
    async fn ensure_collection(&self) -> Result<()> {
        Err(RagError::transient("qdrant", "connection refused"))
    }
    async fn upsert_chunks(&self, _chunks: &[StoredChunk]) -> Result<()> {
        Err(RagError::transient("qdrant", "connection refused"))
    }
    async fn delete_doc_chunks(&self, _doc_id: &str) -> Result<()> {
        Err(RagError::transient("qdrant", "connection refused"))
    }
    async fn hybrid_search(
        &self,
        _q_dense: &[f32],
        _q_sparse_terms: &HashMap<String, f64>,
        _dense_top_k: usize,
        _sparse_top_k: usize,
    ) -> Result<HashMap<String, f64>> {
        Err(RagError::transient("qdrant", "connection refused"))
    }
}

#[tokio::test]
async fn vector_store_failure_degrades_to_local_retrieval() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let store = Arc::new(SnapshotStore::new(config.store.path.clone()));
    let alpha = config.rag.rerank_lexical_alpha;
    let service = RagService::new(
        config,
        store,
        Some(Arc::new(FailingIndex)),
        Arc::new(LexicalReranker::new(alpha)),
        Arc::new(ExtractiveGenerator),
    );

    // Ingest succeeds even though every vector-store call fails.
    service
        .ingest(ingest_request("doc1", &["香蕉 富含 钾"]))
        .await
        .expect("vector store failures must not fail ingest");

    let response = service.query(query_request("钾", 3)).await.unwrap();
    assert!(!response.citations.is_empty());
    assert_eq!(
        response.debug.unwrap().retrieval_source.as_deref(),
        Some("local_rrf")
    );
}

#[tokio::test]
async fn citations_are_capped_at_top_k() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(&dir);

    let pages: Vec<String> = (1..=6)
        .map(|n| format!("potassium facts volume {n} about bananas"))
        .collect();
    let page_refs: Vec<&str> = pages.iter().map(String::as_str).collect();
    service
        .ingest(ingest_request("doc1", &page_refs))
        .await
        .unwrap();

    let response = service.query(query_request("potassium", 2)).await.unwrap();
    assert!(response.citations.len() <= 2);
}

#[tokio::test]
async fn concurrent_ingests_are_serialized() {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(test_service(&dir));

    let mut handles = Vec::new();
    for n in 0..4 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service
                .ingest(ingest_request(
                    &format!("doc{n}"),
                    &["some page content here"],
                ))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // No ingest may clobber another's writes.
    let status = service.status().unwrap();
    assert_eq!(status.docs, 4);
    assert_eq!(status.pages, 4);
}
