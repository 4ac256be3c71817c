//! TOML configuration parsing and validation.
//!
//! One immutable [`Config`] is constructed at process start and passed by
//! reference into every component; nothing reads ambient global state.
//! Invalid settings are rejected here, before any data is touched.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{RagError, Result};
use crate::features::DEFAULT_VECTOR_DIM;
use crate::segment::DEFAULT_MAX_PAGE_CHARS;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub qdrant: QdrantConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Path of the JSON snapshot file.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/page_index_store.json")
}

/// Retrieval pipeline tuning knobs.
#[derive(Debug, Deserialize, Clone)]
pub struct RagConfig {
    /// Token window size for chunking.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Tokens shared between consecutive chunks; must stay below `chunk_size`.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Maximum page size in characters when bucketing paragraphs.
    #[serde(default = "default_max_page_chars")]
    pub max_page_chars: usize,
    /// Dense hash-embedding dimensionality.
    #[serde(default = "default_vector_dim")]
    pub vector_dim: usize,
    #[serde(default = "default_top_k_60")]
    pub dense_top_k: usize,
    #[serde(default = "default_top_k_60")]
    pub sparse_top_k: usize,
    /// Reciprocal Rank Fusion constant.
    #[serde(default = "default_top_k_60")]
    pub rrf_k: usize,
    /// How many top-scoring pages are carried into reranking.
    #[serde(default = "default_page_pool_size")]
    pub page_pool_size: usize,
    /// How many adjacent pages to pull in around each candidate.
    #[serde(default = "default_neighbor_window")]
    pub neighbor_window: usize,
    #[serde(default = "default_rerank_top_k")]
    pub rerank_top_k: usize,
    /// Hard cap on pages passed to answer composition.
    #[serde(default = "default_max_context_pages")]
    pub max_context_pages: usize,
    /// Minimum fused score for a chunk to be selected outright.
    #[serde(default = "default_min_score_threshold")]
    pub min_score_threshold: f64,
    /// Page summary prefix length in characters.
    #[serde(default = "default_summary_chars")]
    pub summary_chars: usize,
    /// Lexical rerank blend weight (α).
    #[serde(default = "default_rerank_lexical_alpha")]
    pub rerank_lexical_alpha: f64,
    /// Base-score weight (β) when blending model reranker scores.
    #[serde(default = "default_rerank_base_weight")]
    pub rerank_base_weight: f64,
    /// Text pairs per model-reranker batch.
    #[serde(default = "default_rerank_batch_size")]
    pub rerank_batch_size: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_page_chars: default_max_page_chars(),
            vector_dim: default_vector_dim(),
            dense_top_k: default_top_k_60(),
            sparse_top_k: default_top_k_60(),
            rrf_k: default_top_k_60(),
            page_pool_size: default_page_pool_size(),
            neighbor_window: default_neighbor_window(),
            rerank_top_k: default_rerank_top_k(),
            max_context_pages: default_max_context_pages(),
            min_score_threshold: default_min_score_threshold(),
            summary_chars: default_summary_chars(),
            rerank_lexical_alpha: default_rerank_lexical_alpha(),
            rerank_base_weight: default_rerank_base_weight(),
            rerank_batch_size: default_rerank_batch_size(),
        }
    }
}

fn default_chunk_size() -> usize {
    320
}
fn default_chunk_overlap() -> usize {
    64
}
fn default_max_page_chars() -> usize {
    DEFAULT_MAX_PAGE_CHARS
}
fn default_vector_dim() -> usize {
    DEFAULT_VECTOR_DIM
}
fn default_top_k_60() -> usize {
    60
}
fn default_page_pool_size() -> usize {
    20
}
fn default_neighbor_window() -> usize {
    1
}
fn default_rerank_top_k() -> usize {
    10
}
fn default_max_context_pages() -> usize {
    8
}
fn default_min_score_threshold() -> f64 {
    0.22
}
fn default_summary_chars() -> usize {
    180
}
fn default_rerank_lexical_alpha() -> f64 {
    0.2
}
fn default_rerank_base_weight() -> f64 {
    0.7
}
fn default_rerank_batch_size() -> usize {
    16
}

/// External vector store (Qdrant) settings. Disabled by default; the
/// local fusion path is always available.
#[derive(Debug, Deserialize, Clone)]
pub struct QdrantConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_qdrant_collection")]
    pub collection: String,
    #[serde(default = "default_qdrant_timeout")]
    pub timeout_secs: u64,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_qdrant_url(),
            api_key: None,
            collection: default_qdrant_collection(),
            timeout_secs: default_qdrant_timeout(),
        }
    }
}

fn default_qdrant_url() -> String {
    "http://127.0.0.1:6333".to_string()
}
fn default_qdrant_collection() -> String {
    "page_index_rag_chunks".to_string()
}
fn default_qdrant_timeout() -> u64 {
    3
}

/// Reranker selection: `"lexical"` (always available) or `"model"`
/// (external cross-encoder backend, degrades to lexical on failure).
#[derive(Debug, Deserialize, Clone)]
pub struct RerankConfig {
    #[serde(default = "default_rerank_provider")]
    pub provider: String,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_rerank_model")]
    pub model: String,
    #[serde(default = "default_rerank_timeout")]
    pub timeout_secs: u64,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            provider: default_rerank_provider(),
            api_base: None,
            api_key: None,
            model: default_rerank_model(),
            timeout_secs: default_rerank_timeout(),
        }
    }
}

fn default_rerank_provider() -> String {
    "lexical".to_string()
}
fn default_rerank_model() -> String {
    "BAAI/bge-reranker-v2-m3".to_string()
}
fn default_rerank_timeout() -> u64 {
    10
}

/// Answer generation selection: `"extractive"` (always available) or
/// `"openai"` for an OpenAI-compatible chat completion endpoint.
#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_gen_provider")]
    pub provider: String,
    #[serde(default = "default_gen_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_gen_model")]
    pub model: String,
    #[serde(default = "default_gen_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_gen_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_gen_temperature")]
    pub temperature: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_gen_provider(),
            api_base: default_gen_api_base(),
            api_key: None,
            model: default_gen_model(),
            timeout_secs: default_gen_timeout(),
            max_tokens: default_gen_max_tokens(),
            temperature: default_gen_temperature(),
        }
    }
}

fn default_gen_provider() -> String {
    "extractive".to_string()
}
fn default_gen_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_gen_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_gen_timeout() -> u64 {
    20
}
fn default_gen_max_tokens() -> u32 {
    512
}
fn default_gen_temperature() -> f64 {
    0.2
}

impl Config {
    /// Reject invalid settings before any component is constructed.
    pub fn validate(&self) -> Result<()> {
        if self.rag.chunk_size == 0 {
            return Err(RagError::Configuration(
                "rag.chunk_size must be > 0".to_string(),
            ));
        }
        if self.rag.chunk_overlap >= self.rag.chunk_size {
            return Err(RagError::Configuration(format!(
                "rag.chunk_overlap ({}) must be smaller than rag.chunk_size ({})",
                self.rag.chunk_overlap, self.rag.chunk_size
            )));
        }
        if self.rag.vector_dim == 0 {
            return Err(RagError::Configuration(
                "rag.vector_dim must be > 0".to_string(),
            ));
        }
        if self.rag.rrf_k == 0 {
            return Err(RagError::Configuration(
                "rag.rrf_k must be >= 1".to_string(),
            ));
        }
        if self.rag.max_page_chars == 0 {
            return Err(RagError::Configuration(
                "rag.max_page_chars must be > 0".to_string(),
            ));
        }
        if self.rag.min_score_threshold < 0.0 {
            return Err(RagError::Configuration(
                "rag.min_score_threshold must be >= 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.rag.rerank_lexical_alpha) {
            return Err(RagError::Configuration(
                "rag.rerank_lexical_alpha must be in [0.0, 1.0]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.rag.rerank_base_weight) {
            return Err(RagError::Configuration(
                "rag.rerank_base_weight must be in [0.0, 1.0]".to_string(),
            ));
        }
        match self.rerank.provider.as_str() {
            "lexical" | "model" => {}
            other => {
                return Err(RagError::Configuration(format!(
                    "unknown rerank provider: '{other}'. Must be lexical or model."
                )))
            }
        }
        match self.generation.provider.as_str() {
            "extractive" | "openai" => {}
            other => {
                return Err(RagError::Configuration(format!(
                    "unknown generation provider: '{other}'. Must be extractive or openai."
                )))
            }
        }
        Ok(())
    }
}

/// Read and validate a TOML configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        RagError::Configuration(format!("failed to read config file {}: {e}", path.display()))
    })?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| RagError::Configuration(format!("failed to parse config file: {e}")))?;

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_overlap_at_least_chunk_size_rejected() {
        let mut config = Config::default();
        config.rag.chunk_overlap = config.rag.chunk_size;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    #[test]
    fn test_unknown_providers_rejected() {
        let mut config = Config::default();
        config.rerank.provider = "cross-encoder".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.generation.provider = "llama".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config: Config = toml::from_str(
            r#"
            [store]
            path = "/tmp/store.json"

            [rag]
            chunk_size = 8
            chunk_overlap = 2
            "#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.rag.chunk_size, 8);
        assert_eq!(config.rag.rrf_k, 60);
        assert_eq!(config.generation.provider, "extractive");
    }
}
