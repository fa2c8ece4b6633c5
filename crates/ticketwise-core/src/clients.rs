//! Trait seams for the external collaborators the pipeline depends on.

use std::collections::BTreeSet;

use crate::error::PipelineError;
use crate::evidence::EvidenceChunk;

/// Embedding service. Must return exactly as many vectors as input texts, in
/// matching order; empty input yields empty output.
pub trait Embedder: Send + Sync {
    /// # Errors
    /// Returns [`PipelineError::Embedding`] when the service cannot produce
    /// vectors for the given texts.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError>;
}

/// Language-model service. Failures surface as recognizable error values so
/// the calling operator can propagate or degrade.
pub trait LanguageModel: Send + Sync {
    /// # Errors
    /// Returns [`PipelineError::Generation`] when no text can be produced.
    fn generate(&self, prompt: &str) -> Result<String, PipelineError>;
}

/// Vector store view used by retrieval: up to `k` chunks whose `product_tag`
/// is in `allowed_tags`, ordered by ascending distance to `embedding`. Tag
/// scoping belongs in the storage predicate so out-of-scope content is never
/// transferred into process memory.
pub trait EvidenceIndex {
    /// # Errors
    /// Returns [`PipelineError::Retrieval`] on storage-layer failure.
    fn search(
        &self,
        embedding: &[f32],
        allowed_tags: &BTreeSet<String>,
        k: usize,
    ) -> Result<Vec<EvidenceChunk>, PipelineError>;
}
