//! Answer generation collaborators.
//!
//! The composer hands an ordered list of evidence snippets (page number +
//! chunk text) to a generator. The extractive generator quotes evidence
//! directly and is the always-available baseline; the OpenAI-compatible
//! generator calls a chat-completion endpoint with the evidence inlined.
//! Both must handle an empty snippet list gracefully: the orchestrator
//! checks for missing evidence before delegation, and the trait contract
//! holds every implementation to the same behavior.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use crate::config::GenerationConfig;
use crate::error::{RagError, Result};

/// A chunk's text plus its page number, the unit of evidence passed to
/// generation.
#[derive(Debug, Clone)]
pub struct EvidenceSnippet {
    pub page_no: usize,
    pub text: String,
}

/// Fixed response when retrieval produced no usable evidence.
pub fn no_evidence_answer(query: &str) -> String {
    format!("No page relevant to \"{query}\" was found. Try more specific keywords.")
}

/// An answer-generation capability.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Short name reported in telemetry and debug output.
    fn name(&self) -> &'static str;

    /// Compose an answer from the query and ordered evidence snippets.
    async fn generate(&self, query: &str, snippets: &[EvidenceSnippet]) -> Result<String>;
}

// ============ Extractive generator ============

/// Quotes the top evidence snippets verbatim with their page references.
/// Never fabricates and never fails.
pub struct ExtractiveGenerator;

#[async_trait]
impl AnswerGenerator for ExtractiveGenerator {
    fn name(&self) -> &'static str {
        "extractive"
    }

    async fn generate(&self, query: &str, snippets: &[EvidenceSnippet]) -> Result<String> {
        if snippets.is_empty() {
            return Ok(no_evidence_answer(query));
        }
        let lines: Vec<String> = snippets
            .iter()
            .take(6)
            .map(|s| format!("[p{}] {}", s.page_no, clip_chars(&s.text, 220)))
            .collect();
        Ok(format!(
            "Key passages retrieved for the question:\n{}",
            lines.join("\n")
        ))
    }
}

// ============ OpenAI-compatible generator ============

/// Calls `POST {api_base}/chat/completions` with the evidence inlined in
/// the prompt and instructions to answer only from it, citing pages as
/// `[pN]`.
#[derive(Debug)]
pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                RagError::Configuration(
                    "generation.api_key is required for the openai generator".to_string(),
                )
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::Configuration(format!("generator http client: {e}")))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl AnswerGenerator for OpenAiGenerator {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn generate(&self, query: &str, snippets: &[EvidenceSnippet]) -> Result<String> {
        if snippets.is_empty() {
            return Ok(no_evidence_answer(query));
        }

        let evidence: Vec<String> = snippets
            .iter()
            .take(8)
            .map(|s| format!("[p{}] {}", s.page_no, clip_chars(&s.text, 260)))
            .collect();
        let prompt = format!(
            "Answer strictly from the evidence below; do not invent facts. \
             Include at least one page citation of the form [p12].\n\
             Question: {query}\n\
             Evidence:\n{}",
            evidence.join("\n")
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": "You answer with grounded citations." },
                    { "role": "user", "content": prompt }
                ],
                "max_tokens": self.max_tokens,
                "temperature": self.temperature,
            }))
            .send()
            .await
            .map_err(|e| RagError::transient("generator", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RagError::transient("generator", format!("HTTP {status}")));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RagError::transient("generator", e))?;

        body["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| RagError::transient("generator", "malformed completion response"))
    }
}

/// Select the configured generator; an OpenAI generator that fails to
/// construct (missing key) is substituted with the extractive one.
pub fn build_generator(config: &GenerationConfig) -> Arc<dyn AnswerGenerator> {
    if config.provider == "openai" {
        match OpenAiGenerator::new(config) {
            Ok(generator) => return Arc::new(generator),
            Err(err) => {
                warn!(error = %err, "openai generator unavailable, using extractive generator");
            }
        }
    }
    Arc::new(ExtractiveGenerator)
}

/// Truncate to at most `max` characters on a char boundary.
fn clip_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
