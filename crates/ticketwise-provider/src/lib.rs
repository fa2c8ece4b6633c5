//! Collaborator adapters for the query pipeline.
//!
//! Two families: HTTP clients for deployments with real embedding and
//! language-model endpoints, and deterministic in-process stand-ins that keep
//! the stack fully local for development, CLI use, and integration tests.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use ticketwise_core::{Embedder, LanguageModel, PipelineError};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    text: String,
}

/// Embedding service client: `POST {texts} -> {embeddings}`.
pub struct HttpEmbedder {
    agent: ureq::Agent,
    endpoint: String,
}

impl HttpEmbedder {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(HTTP_TIMEOUT).build();
        Self { agent, endpoint: endpoint.into() }
    }
}

impl Embedder for HttpEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(endpoint = %self.endpoint, texts = texts.len(), "requesting embeddings");
        let response = self
            .agent
            .post(&self.endpoint)
            .send_json(EmbedRequest { texts })
            .map_err(|err| PipelineError::Embedding(format!("embedding endpoint: {err}")))?;
        let parsed: EmbedResponse = response
            .into_json()
            .map_err(|err| PipelineError::Embedding(format!("embedding response body: {err}")))?;

        if parsed.embeddings.len() != texts.len() {
            return Err(PipelineError::Embedding(format!(
                "endpoint returned {} vectors for {} texts",
                parsed.embeddings.len(),
                texts.len()
            )));
        }
        Ok(parsed.embeddings)
    }
}

/// Language-model service client: `POST {prompt} -> {text}`.
pub struct HttpLanguageModel {
    agent: ureq::Agent,
    endpoint: String,
}

impl HttpLanguageModel {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(HTTP_TIMEOUT).build();
        Self { agent, endpoint: endpoint.into() }
    }
}

impl LanguageModel for HttpLanguageModel {
    fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
        tracing::debug!(endpoint = %self.endpoint, prompt_chars = prompt.len(), "requesting generation");
        let response = self
            .agent
            .post(&self.endpoint)
            .send_json(GenerateRequest { prompt })
            .map_err(|err| PipelineError::Generation(format!("model endpoint: {err}")))?;
        let parsed: GenerateResponse = response
            .into_json()
            .map_err(|err| PipelineError::Generation(format!("model response body: {err}")))?;
        Ok(parsed.text)
    }
}

/// Deterministic hashed bag-of-words embedder. Each lowercase token is
/// SHA-256 hashed into a bucket with a hash-derived sign, and the result is
/// normalized to unit length. Not a semantic model, but stable across runs
/// and platforms, which is what local mode and tests need.
pub struct LexicalEmbedder {
    dim: usize,
}

impl LexicalEmbedder {
    pub const DEFAULT_DIM: usize = 64;

    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dim];
        for token in text.to_lowercase().split(|c: char| !c.is_ascii_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            let digest = Sha256::digest(token.as_bytes());
            let bucket = (usize::from(digest[0]) << 8) | usize::from(digest[1]);
            let sign = if digest[2] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket % self.dim] += sign;
        }
        normalize(&mut vector);
        vector
    }
}

impl Default for LexicalEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIM)
    }
}

impl Embedder for LexicalEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

/// Deterministic extractive model for local mode: answers by citing the
/// ticket IDs present in the prompt, so downstream citation verification has
/// something real to check.
pub struct OfflineModel;

impl LanguageModel for OfflineModel {
    fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
        let ids = cited_ticket_ids(prompt);
        if ids.is_empty() {
            return Ok("No ticket evidence was provided for this question.".to_string());
        }
        if prompt.starts_with("Summarize") {
            return Ok(format!("Digest of resolutions recorded in {}", ids.join(" ")));
        }
        Ok(format!(
            "According to the resolved tickets, the documented fixes apply here. \
             Sources: {}",
            ids.join(" ")
        ))
    }
}

/// Distinct `TCK-` tokens in first-seen order, with trailing punctuation
/// stripped so prompt separators like `TCK-1,` match the bare ID.
fn cited_ticket_ids(prompt: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut ids = Vec::new();
    for token in prompt.split_whitespace() {
        let trimmed = token.trim_end_matches(|c: char| !c.is_ascii_alphanumeric());
        if trimmed.starts_with("TCK-") && seen.insert(trimmed.to_string()) {
            ids.push(trimmed.to_string());
        }
    }
    ids
}

fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}
