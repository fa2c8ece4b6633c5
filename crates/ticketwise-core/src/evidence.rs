//! Evidence chunks: the retrievable, citable units of ticket content.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// One retrievable span of a resolved ticket. `chunk_index` is unique within
/// a `ticket_id` and denotes the original document order. The pipeline only
/// ever reads copies; the store owns the rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceChunk {
    pub ticket_id: String,
    pub product_tag: String,
    pub chunk_index: u32,
    pub text: String,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub metadata: Value,
}

/// Projection of an [`EvidenceChunk`] as it appears in a query result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsedChunk {
    pub ticket_id: String,
    pub product_tag: String,
    pub chunk_index: u32,
    pub text: String,
}

impl From<&EvidenceChunk> for UsedChunk {
    fn from(chunk: &EvidenceChunk) -> Self {
        Self {
            ticket_id: chunk.ticket_id.clone(),
            product_tag: chunk.product_tag.clone(),
            chunk_index: chunk.chunk_index,
            text: chunk.text.clone(),
        }
    }
}
