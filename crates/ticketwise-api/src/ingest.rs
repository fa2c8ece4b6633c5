//! Ticket loading and chunking for the ingestion path.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;
use ticketwise_core::{EvidenceChunk, Ticket};

/// Chunker settings. `chunk_overlap` is clamped below `chunk_size` so the
/// window always advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { chunk_size: 800, chunk_overlap: 120 }
    }
}

/// Load resolved tickets from a JSON array file.
///
/// # Errors
/// Returns an error when the file cannot be read or parsed.
pub fn load_tickets_from_file(path: &Path) -> Result<Vec<Ticket>> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("failed to read ticket data file {}", path.display()))?;
    let tickets: Vec<Ticket> = serde_json::from_str(&body)
        .with_context(|| format!("ticket data file {} is not a ticket array", path.display()))?;
    Ok(tickets)
}

/// Character-window chunking with overlap. Operates on chars so multi-byte
/// text never splits inside a code point.
#[must_use]
pub fn split_text_with_overlap(text: &str, config: IngestConfig) -> Vec<String> {
    if text.is_empty() || config.chunk_size == 0 {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let overlap = config.chunk_overlap.min(config.chunk_size - 1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + config.chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start = end - overlap;
    }
    chunks
}

/// Chunk one ticket's resolution summary into evidence chunks. Tickets
/// without a summary produce nothing. Chunk `created_at` carries the ticket's
/// creation time so ranking expresses ticket recency.
#[must_use]
pub fn chunks_for_ticket(ticket: &Ticket, config: IngestConfig) -> Vec<EvidenceChunk> {
    let Some(summary) = ticket.resolution_summary.as_deref() else {
        return Vec::new();
    };

    split_text_with_overlap(summary, config)
        .into_iter()
        .enumerate()
        .map(|(index, text)| EvidenceChunk {
            ticket_id: ticket.ticket_id.clone(),
            product_tag: ticket.product_tag.clone(),
            chunk_index: u32::try_from(index).unwrap_or(u32::MAX),
            text,
            created_at: ticket.created_at,
            metadata: json!({
                "customer_segment": ticket.customer_segment,
                "language": ticket.language,
                "tags": ticket.tags,
            }),
        })
        .collect()
}
