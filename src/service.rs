//! Query/ingest orchestration.
//!
//! [`RagService`] ties the pipeline together: ingest runs
//! normalize → segment → chunk → feature-extract → persist, and query runs
//! retrieve → aggregate → expand → rerank → compose. Collaborators
//! (vector store, model reranker, generator) degrade locally on failure;
//! generation is the only hard dependency.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::aggregate::{expand_neighbors, page_scores, select_chunks, top_candidate_pages};
use crate::chunk::chunk_tokens;
use crate::config::Config;
use crate::error::{RagError, Result};
use crate::features::{hash_embedding, sparse_terms};
use crate::generate::{build_generator, no_evidence_answer, AnswerGenerator, EvidenceSnippet};
use crate::models::{
    utc_now_iso, Citation, IngestRequest, IngestResponse, QueryDebug, QueryRequest, QueryResponse,
    StatusResponse, StorageSnapshot, StoredChunk, StoredDocument, StoredPage,
};
use crate::rerank::{build_reranker, LexicalReranker, RerankItem, Reranker};
use crate::retrieval::fused_chunk_scores;
use crate::segment::split_pages;
use crate::store::SnapshotStore;
use crate::text::{normalize, tokenize};
use crate::vector_store::{QdrantIndex, VectorIndex};

/// Fixed answer returned when the store holds no chunks at all.
pub const EMPTY_STORE_ANSWER: &str =
    "The knowledge base is empty. Ingest a document before querying.";

/// Number of keywords extracted per page.
const PAGE_KEYWORDS: usize = 8;

/// Evidence chunks taken per selected page.
const CHUNKS_PER_PAGE: usize = 2;

/// The service-level contract over the whole pipeline.
pub struct RagService {
    config: Config,
    store: Arc<SnapshotStore>,
    vector_index: Option<Arc<dyn VectorIndex>>,
    reranker: Arc<dyn Reranker>,
    generator: Arc<dyn AnswerGenerator>,
}

impl RagService {
    pub fn new(
        config: Config,
        store: Arc<SnapshotStore>,
        vector_index: Option<Arc<dyn VectorIndex>>,
        reranker: Arc<dyn Reranker>,
        generator: Arc<dyn AnswerGenerator>,
    ) -> Self {
        Self {
            config,
            store,
            vector_index,
            reranker,
            generator,
        }
    }

    /// Build a service from configuration, selecting collaborators and
    /// their documented fallbacks.
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(SnapshotStore::new(config.store.path.clone()));

        let vector_index: Option<Arc<dyn VectorIndex>> = if config.qdrant.enabled {
            match QdrantIndex::new(&config.qdrant, config.rag.vector_dim) {
                Ok(index) => Some(Arc::new(index)),
                Err(err) => {
                    warn!(error = %err, "vector store unavailable, using local retrieval only");
                    None
                }
            }
        } else {
            None
        };

        let reranker = build_reranker(&config);
        let generator = build_generator(&config.generation);

        Ok(Self::new(config, store, vector_index, reranker, generator))
    }

    /// Index a document: segment into pages, chunk, extract features, and
    /// persist, replacing any previous data for the same document id.
    pub async fn ingest(&self, req: IngestRequest) -> Result<IngestResponse> {
        if req.doc_name.trim().is_empty() {
            return Err(RagError::Validation(
                "doc_name must not be empty".to_string(),
            ));
        }
        let pages = self.extract_pages(&req);
        if pages.is_empty() {
            return Err(RagError::Validation(
                "no valid content or pages provided for ingestion".to_string(),
            ));
        }

        // Exclusive load-mutate-write cycle; released on every exit path.
        let _guard = self.store.lock_for_ingest().await;
        let mut snapshot = self.store.load()?;

        let doc_id = req
            .doc_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let now = utc_now_iso();

        let doc = match snapshot.documents.get(&doc_id) {
            Some(existing) => {
                let mut doc = existing.clone();
                doc.doc_name = req.doc_name.clone();
                doc.version = req.version.clone();
                doc.metadata = req.metadata.clone();
                doc.updated_at = now.clone();
                snapshot.remove_document_data(&doc_id);
                doc
            }
            None => StoredDocument {
                doc_id: doc_id.clone(),
                doc_name: req.doc_name.clone(),
                version: req.version.clone(),
                metadata: req.metadata.clone(),
                created_at: now.clone(),
                updated_at: now.clone(),
            },
        };
        snapshot.documents.insert(doc_id.clone(), doc);

        if let Some(index) = &self.vector_index {
            // Stale external records go first; a vector-store failure
            // degrades rather than failing ingest, the snapshot stays
            // authoritative.
            if let Err(err) = index.delete_doc_chunks(&doc_id).await {
                warn!(error = %err, doc_id, "vector store delete failed");
            }
        }

        let mut new_chunks: Vec<StoredChunk> = Vec::new();
        for (idx, page_text) in pages.iter().enumerate() {
            let page_no = idx + 1;
            let page_id = StoredPage::page_id_for(&doc_id, page_no);
            let page_tokens = tokenize(page_text);

            snapshot.pages.insert(
                page_id.clone(),
                StoredPage {
                    page_id: page_id.clone(),
                    doc_id: doc_id.clone(),
                    page_no,
                    page_text: page_text.clone(),
                    page_summary: summary_prefix(page_text, self.config.rag.summary_chars),
                    keywords: top_keywords(&page_tokens, PAGE_KEYWORDS),
                },
            );

            let windows = chunk_tokens(
                &page_tokens,
                self.config.rag.chunk_size,
                self.config.rag.chunk_overlap,
            )?;
            for (chunk_idx, window) in windows.iter().enumerate() {
                let chunk_no = chunk_idx + 1;
                let text = window.text();
                let chunk = StoredChunk {
                    chunk_id: StoredChunk::chunk_id_for(&page_id, chunk_no),
                    page_id: page_id.clone(),
                    doc_id: doc_id.clone(),
                    page_no,
                    chunk_no,
                    offset_start: window.start,
                    offset_end: window.end,
                    token_count: window.tokens.len(),
                    dense_vector: hash_embedding(&text, self.config.rag.vector_dim),
                    sparse_terms: sparse_terms(&text),
                    chunk_text: text,
                };
                snapshot.chunks.insert(chunk.chunk_id.clone(), chunk.clone());
                new_chunks.push(chunk);
            }
        }

        snapshot.updated_at = Some(now.clone());
        self.store.save(&snapshot)?;

        if let Some(index) = &self.vector_index {
            let upsert = async {
                index.ensure_collection().await?;
                index.upsert_chunks(&new_chunks).await
            };
            if let Err(err) = upsert.await {
                warn!(error = %err, doc_id, "vector store upsert failed");
            }
        }

        info!(
            doc_id,
            pages = pages.len(),
            chunks = new_chunks.len(),
            "document ingested"
        );
        Ok(IngestResponse {
            doc_id,
            version: req.version,
            page_count: pages.len(),
            chunk_count: new_chunks.len(),
            updated_at: now,
        })
    }

    /// Answer a query with citations back to the source pages.
    pub async fn query(&self, req: QueryRequest) -> Result<QueryResponse> {
        if req.query.trim().is_empty() {
            return Err(RagError::Validation("query must not be empty".to_string()));
        }

        let snapshot = self.store.load()?;
        if snapshot.chunks.is_empty() {
            info!("query against empty store");
            return Ok(QueryResponse {
                answer: EMPTY_STORE_ANSWER.to_string(),
                citations: Vec::new(),
                debug: req.with_debug.then(|| QueryDebug {
                    retrieved_chunks: 0,
                    candidate_pages: 0,
                    rerank_pages: 0,
                    reranker: Some(self.reranker.name().to_string()),
                    generator: Some(self.generator.name().to_string()),
                    retrieval_source: None,
                }),
            });
        }

        let query = normalize(&req.query);
        let q_vector = hash_embedding(&query, self.config.rag.vector_dim);
        let q_terms = sparse_terms(&query);

        let (fused, retrieval_source) = fused_chunk_scores(
            &snapshot,
            &q_vector,
            &q_terms,
            &self.config.rag,
            self.vector_index.as_deref(),
        )
        .await;

        let selected = select_chunks(
            &fused,
            &snapshot,
            self.config.rag.min_score_threshold,
            req.top_k,
        );
        let (scores, page_chunks) = page_scores(&selected);
        let candidates = top_candidate_pages(&scores, self.config.rag.page_pool_size);
        let expanded = expand_neighbors(
            &candidates,
            &snapshot.pages,
            self.config.rag.neighbor_window,
        );

        let (mut reranked, reranker_used) = self.rerank_pages(&query, &expanded, &snapshot).await;
        reranked.truncate(self.config.rag.rerank_top_k);
        let top_pages: Vec<(String, f64)> = reranked
            .into_iter()
            .take(req.top_k.min(self.config.rag.max_context_pages))
            .collect();

        let mut citations: Vec<Citation> = Vec::new();
        let mut evidence: Vec<EvidenceSnippet> = Vec::new();
        for (page_id, _) in &top_pages {
            let Some(chunks) = page_chunks.get(page_id) else {
                continue;
            };
            let mut chunks = chunks.clone();
            chunks.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.chunk_id.cmp(&b.0.chunk_id))
            });
            for (chunk, _) in chunks.iter().take(CHUNKS_PER_PAGE) {
                citations.push(Citation {
                    doc_id: chunk.doc_id.clone(),
                    page_no: chunk.page_no,
                    chunk_id: chunk.chunk_id.clone(),
                });
                evidence.push(EvidenceSnippet {
                    page_no: chunk.page_no,
                    text: chunk.chunk_text.clone(),
                });
            }
        }
        citations.truncate(req.top_k);

        let answer = self.compose_answer(&query, &evidence).await?;

        info!(
            retrieved = selected.len(),
            candidate_pages = candidates.len(),
            rerank_pages = top_pages.len(),
            source = retrieval_source.as_str(),
            reranker = reranker_used,
            generator = self.generator.name(),
            "query answered"
        );

        Ok(QueryResponse {
            answer,
            citations,
            debug: req.with_debug.then(|| QueryDebug {
                retrieved_chunks: selected.len(),
                candidate_pages: candidates.len(),
                rerank_pages: top_pages.len(),
                reranker: Some(reranker_used.to_string()),
                generator: Some(self.generator.name().to_string()),
                retrieval_source: Some(retrieval_source.as_str().to_string()),
            }),
        })
    }

    /// Current snapshot counts; a pure read.
    pub fn status(&self) -> Result<StatusResponse> {
        let snapshot = self.store.load()?;
        Ok(StatusResponse {
            docs: snapshot.documents.len(),
            pages: snapshot.pages.len(),
            chunks: snapshot.chunks.len(),
            updated_at: snapshot.updated_at,
        })
    }

    fn extract_pages(&self, req: &IngestRequest) -> Vec<String> {
        if let Some(pages) = &req.pages {
            let normalized: Vec<String> = pages
                .iter()
                .map(|p| normalize(p))
                .filter(|p| !p.is_empty())
                .collect();
            if !normalized.is_empty() {
                return normalized;
            }
        }
        if let Some(content) = &req.content {
            return split_pages(content, self.config.rag.max_page_chars);
        }
        Vec::new()
    }

    /// Run the configured reranker; on failure substitute the lexical one
    /// for this request and report what actually ran.
    async fn rerank_pages(
        &self,
        query: &str,
        expanded: &[(String, f64)],
        snapshot: &StorageSnapshot,
    ) -> (Vec<(String, f64)>, &'static str) {
        let items: Vec<RerankItem> = expanded
            .iter()
            .filter_map(|(page_id, base_score)| {
                snapshot.pages.get(page_id).map(|page| RerankItem {
                    item_id: page_id.clone(),
                    text: page.page_text.clone(),
                    base_score: *base_score,
                })
            })
            .collect();

        match self.reranker.rerank(query, &items).await {
            Ok(ranked) => (ranked, self.reranker.name()),
            Err(err) => {
                warn!(error = %err, "reranker failed, substituting lexical reranker");
                let lexical = LexicalReranker::new(self.config.rag.rerank_lexical_alpha);
                // The lexical variant is pure computation and cannot fail.
                let ranked = lexical.rerank(query, &items).await.unwrap_or_default();
                (ranked, lexical.name())
            }
        }
    }

    /// Hold every generator to the same contract: the empty-evidence check
    /// happens here, before delegation.
    async fn compose_answer(&self, query: &str, evidence: &[EvidenceSnippet]) -> Result<String> {
        let usable: Vec<EvidenceSnippet> = evidence
            .iter()
            .filter(|s| !s.text.is_empty())
            .cloned()
            .collect();
        if usable.is_empty() {
            return Ok(no_evidence_answer(query));
        }
        self.generator.generate(query, &usable).await
    }
}

fn summary_prefix(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Most frequent tokens of a page, frequency-descending with the token
/// itself as the deterministic tie-break.
fn top_keywords(tokens: &[String], n: usize) -> Vec<String> {
    let mut freq: HashMap<&str, usize> = HashMap::new();
    for token in tokens {
        *freq.entry(token.as_str()).or_insert(0) += 1;
    }
    let mut ranked: Vec<(&str, usize)> = freq.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(n)
        .map(|(token, _)| token.to_string())
        .collect()
}
