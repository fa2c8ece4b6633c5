//! Operator contract: a named, stateless-per-call unit of work with a fixed
//! input/output shape, dispatched as a tagged-variant set rather than a class
//! hierarchy.

mod answer;
mod ranking;
mod rbac_filter;
mod retrieval;
mod summarization;
mod verify;

use std::collections::BTreeSet;

pub use answer::AnswerOperator;
pub use ranking::RankingOperator;
pub use rbac_filter::RbacFilterOperator;
pub use retrieval::RetrievalOperator;
pub use summarization::SummarizationOperator;
pub use verify::{VerificationOperator, TICKET_ID_PREFIX};

use crate::error::PipelineError;
use crate::evidence::EvidenceChunk;

/// Input shapes the six operators accept. `Prompt` is shared by the two
/// model-backed operators, which take the same positional inputs.
#[derive(Debug, Clone)]
pub enum OperatorInput {
    Retrieve { question: String, allowed_tags: BTreeSet<String> },
    Filter { chunks: Vec<EvidenceChunk>, allowed_tags: BTreeSet<String> },
    Rank { chunks: Vec<EvidenceChunk> },
    Prompt { question: String, chunks: Vec<EvidenceChunk> },
    Check { answer: String, chunks: Vec<EvidenceChunk> },
}

/// Output shapes the six operators produce.
#[derive(Debug, Clone)]
pub enum OperatorOutput {
    Chunks(Vec<EvidenceChunk>),
    Text(String),
    Verdict(bool),
}

impl OperatorOutput {
    fn shape(&self) -> &'static str {
        match self {
            Self::Chunks(_) => "chunks",
            Self::Text(_) => "text",
            Self::Verdict(_) => "verdict",
        }
    }

    /// # Errors
    /// Returns [`PipelineError::OutputMismatch`] when the output is not a
    /// chunk sequence.
    pub fn into_chunks(self, operator: &'static str) -> Result<Vec<EvidenceChunk>, PipelineError> {
        match self {
            Self::Chunks(chunks) => Ok(chunks),
            other => Err(PipelineError::OutputMismatch { operator, got: other.shape() }),
        }
    }

    /// # Errors
    /// Returns [`PipelineError::OutputMismatch`] when the output is not text.
    pub fn into_text(self, operator: &'static str) -> Result<String, PipelineError> {
        match self {
            Self::Text(text) => Ok(text),
            other => Err(PipelineError::OutputMismatch { operator, got: other.shape() }),
        }
    }

    /// # Errors
    /// Returns [`PipelineError::OutputMismatch`] when the output is not a
    /// verdict.
    pub fn into_verdict(self, operator: &'static str) -> Result<bool, PipelineError> {
        match self {
            Self::Verdict(verdict) => Ok(verdict),
            other => Err(PipelineError::OutputMismatch { operator, got: other.shape() }),
        }
    }
}

/// One pipeline stage. Implementations hold read-only collaborators and keep
/// no per-call state.
pub trait Operator {
    fn name(&self) -> &'static str;

    /// # Errors
    /// Returns [`PipelineError::InputMismatch`] for a foreign input variant,
    /// or the operator's own failure kind.
    fn call(&self, input: OperatorInput) -> Result<OperatorOutput, PipelineError>;
}

/// Join chunk texts into one context block bounded to `char_budget` chars.
/// Char-based truncation keeps the cut UTF-8 safe.
fn joined_context(chunks: &[EvidenceChunk], char_budget: usize) -> String {
    let joined = chunks.iter().map(|chunk| chunk.text.as_str()).collect::<Vec<_>>().join("\n");
    if joined.chars().count() <= char_budget {
        joined
    } else {
        joined.chars().take(char_budget).collect()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::Value;

    use crate::evidence::EvidenceChunk;

    pub fn chunk(ticket_id: &str, product_tag: &str, chunk_index: u32, text: &str) -> EvidenceChunk {
        EvidenceChunk {
            ticket_id: ticket_id.to_string(),
            product_tag: product_tag.to_string(),
            chunk_index,
            text: text.to_string(),
            created_at: None,
            metadata: Value::Null,
        }
    }
}
