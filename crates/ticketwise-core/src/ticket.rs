//! Resolved support tickets as they enter the system at ingestion time.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One resolved ticket. Only `resolution_summary` is chunked into evidence;
/// the remaining fields travel into chunk metadata or stay ticket-level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    pub ticket_id: String,
    pub product_tag: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub customer_segment: Option<String>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub created_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub resolved_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub resolution_summary: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
}
