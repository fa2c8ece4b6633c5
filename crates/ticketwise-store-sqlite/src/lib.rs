//! SQLite-backed ticket and evidence-chunk store with embedded vectors.
//!
//! The tag predicate of [`search_chunks`](SqliteStore::search_chunks) is the
//! storage-layer row-level security filter: scoping happens in the SQL
//! `WHERE` clause, so out-of-scope chunk content is never transferred into
//! process memory. Embeddings are stored as little-endian `f32` blobs beside
//! the chunk row.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::Path;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use ticketwise_core::{EvidenceChunk, EvidenceIndex, PipelineError, Ticket};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use ulid::Ulid;

const LATEST_SCHEMA_VERSION: i64 = 1;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS tickets (
  ticket_id TEXT PRIMARY KEY,
  product_tag TEXT NOT NULL,
  customer_id TEXT,
  customer_segment TEXT,
  created_at TEXT,
  resolved_at TEXT,
  resolution_summary TEXT,
  tags_json TEXT NOT NULL,
  language TEXT
);

CREATE TABLE IF NOT EXISTS evidence_chunks (
  chunk_id TEXT PRIMARY KEY,
  ticket_id TEXT NOT NULL,
  product_tag TEXT NOT NULL,
  chunk_index INTEGER NOT NULL CHECK (chunk_index >= 0),
  text TEXT NOT NULL,
  embedding BLOB NOT NULL,
  metadata_json TEXT NOT NULL,
  created_at TEXT,
  UNIQUE (ticket_id, chunk_index),
  FOREIGN KEY (ticket_id) REFERENCES tickets(ticket_id)
);

CREATE INDEX IF NOT EXISTS idx_evidence_chunks_product_tag ON evidence_chunks(product_tag);
CREATE INDEX IF NOT EXISTS idx_evidence_chunks_ticket ON evidence_chunks(ticket_id);
";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("timestamp formatting error: {0}")]
    TimestampFormat(#[from] time::error::Format),
    #[error("stored row is malformed: {0}")]
    MalformedRow(String),
    #[error("embedding dimension mismatch: query has {query}, stored row has {stored}")]
    DimensionMismatch { query: usize, stored: usize },
}

/// One chunk plus the vector it was embedded into, ready for indexing.
#[derive(Debug, Clone)]
pub struct ChunkEmbedding {
    pub chunk: EvidenceChunk,
    pub embedding: Vec<f32>,
}

/// Corpus counters surfaced by the CLI and the ingestion report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreStats {
    pub ticket_count: usize,
    pub chunk_count: usize,
    pub product_tags: Vec<String>,
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if absent) a store at `path`.
    ///
    /// # Errors
    /// Returns [`StoreError::Sqlite`] when the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn })
    }

    /// # Errors
    /// Returns [`StoreError::Sqlite`] when the database cannot be opened.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn })
    }

    /// Apply any pending schema migrations. Safe to call repeatedly.
    ///
    /// # Errors
    /// Returns [`StoreError::Sqlite`] when a migration statement fails.
    pub fn migrate(&mut self) -> Result<(), StoreError> {
        self.conn.execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)?;
        let current = self.schema_version()?;
        if current >= LATEST_SCHEMA_VERSION {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        if current < 1 {
            tx.execute_batch(MIGRATION_001_SQL)?;
            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                params![1_i64, OffsetDateTime::now_utc().format(&Rfc3339)?],
            )?;
        }
        tx.commit()?;
        tracing::debug!(version = LATEST_SCHEMA_VERSION, "store schema migrated");
        Ok(())
    }

    /// # Errors
    /// Returns [`StoreError::Sqlite`] when the version table cannot be read.
    pub fn schema_version(&self) -> Result<i64, StoreError> {
        self.conn.execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)?;
        let version: Option<i64> = self
            .conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| row.get(0))
            .optional()?
            .flatten();
        Ok(version.unwrap_or(0))
    }

    /// Insert or update one ticket row.
    ///
    /// # Errors
    /// Returns [`StoreError::Sqlite`] on write failure.
    pub fn upsert_ticket(&mut self, ticket: &Ticket) -> Result<(), StoreError> {
        let tags_json = serde_json::to_string(&ticket.tags)
            .map_err(|err| StoreError::MalformedRow(err.to_string()))?;
        self.conn.execute(
            "INSERT INTO tickets (ticket_id, product_tag, customer_id, customer_segment, \
             created_at, resolved_at, resolution_summary, tags_json, language) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
             ON CONFLICT(ticket_id) DO UPDATE SET \
             product_tag = excluded.product_tag, \
             customer_id = excluded.customer_id, \
             customer_segment = excluded.customer_segment, \
             created_at = excluded.created_at, \
             resolved_at = excluded.resolved_at, \
             resolution_summary = excluded.resolution_summary, \
             tags_json = excluded.tags_json, \
             language = excluded.language",
            params![
                ticket.ticket_id,
                ticket.product_tag,
                ticket.customer_id,
                ticket.customer_segment,
                format_optional_timestamp(ticket.created_at)?,
                format_optional_timestamp(ticket.resolved_at)?,
                ticket.resolution_summary,
                tags_json,
                ticket.language,
            ],
        )?;
        Ok(())
    }

    /// Replace the indexed chunks of every ticket present in `records`, in a
    /// single transaction. Either all rows land or none do; a failure part
    /// way through leaves the previously indexed state untouched.
    ///
    /// # Errors
    /// Returns [`StoreError::Sqlite`] on write failure.
    pub fn index_chunks(&mut self, records: &[ChunkEmbedding]) -> Result<usize, StoreError> {
        let affected_tickets: BTreeSet<&str> =
            records.iter().map(|record| record.chunk.ticket_id.as_str()).collect();

        let tx = self.conn.transaction()?;
        for ticket_id in &affected_tickets {
            tx.execute("DELETE FROM evidence_chunks WHERE ticket_id = ?1", params![ticket_id])?;
        }
        for record in records {
            let metadata_json = serde_json::to_string(&record.chunk.metadata)
                .map_err(|err| StoreError::MalformedRow(err.to_string()))?;
            tx.execute(
                "INSERT INTO evidence_chunks (chunk_id, ticket_id, product_tag, chunk_index, \
                 text, embedding, metadata_json, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    Ulid::new().to_string(),
                    record.chunk.ticket_id,
                    record.chunk.product_tag,
                    record.chunk.chunk_index,
                    record.chunk.text,
                    encode_embedding(&record.embedding),
                    metadata_json,
                    format_optional_timestamp(record.chunk.created_at)?,
                ],
            )?;
        }
        tx.commit()?;
        tracing::debug!(chunks = records.len(), tickets = affected_tickets.len(), "chunks indexed");
        Ok(records.len())
    }

    /// Nearest-neighbour search over chunks whose `product_tag` is in
    /// `allowed_tags`, ascending distance, at most `k` rows. Distance ties
    /// break by `(ticket_id, chunk_index)` so identical corpora rank
    /// identically across runs.
    ///
    /// # Errors
    /// Returns [`StoreError::DimensionMismatch`] when a stored vector does
    /// not match the query dimensionality, [`StoreError::Sqlite`] on read
    /// failure.
    pub fn search_chunks(
        &self,
        embedding: &[f32],
        allowed_tags: &BTreeSet<String>,
        k: usize,
    ) -> Result<Vec<EvidenceChunk>, StoreError> {
        if allowed_tags.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let placeholders: String = (1..=allowed_tags.len())
            .map(|position| format!("?{position}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT ticket_id, product_tag, chunk_index, text, embedding, metadata_json, \
             created_at FROM evidence_chunks WHERE product_tag IN ({placeholders})"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(allowed_tags.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Vec<u8>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })?;

        let mut scored: Vec<(f32, EvidenceChunk)> = Vec::new();
        for row in rows {
            let (ticket_id, product_tag, chunk_index, text, blob, metadata_json, created_at) =
                row?;
            let stored = decode_embedding(&blob);
            if stored.len() != embedding.len() {
                return Err(StoreError::DimensionMismatch {
                    query: embedding.len(),
                    stored: stored.len(),
                });
            }
            let distance = squared_l2_distance(embedding, &stored);
            scored.push((
                distance,
                EvidenceChunk {
                    ticket_id,
                    product_tag,
                    chunk_index,
                    text,
                    created_at: parse_optional_timestamp(created_at.as_deref())?,
                    metadata: serde_json::from_str(&metadata_json)
                        .map_err(|err| StoreError::MalformedRow(err.to_string()))?,
                },
            ));
        }

        scored.sort_by(|lhs, rhs| {
            lhs.0
                .partial_cmp(&rhs.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| lhs.1.ticket_id.cmp(&rhs.1.ticket_id))
                .then_with(|| lhs.1.chunk_index.cmp(&rhs.1.chunk_index))
        });
        scored.truncate(k);
        Ok(scored.into_iter().map(|(_, chunk)| chunk).collect())
    }

    /// # Errors
    /// Returns [`StoreError::Sqlite`] on read failure.
    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let ticket_count: i64 =
            self.conn.query_row("SELECT COUNT(*) FROM tickets", [], |row| row.get(0))?;
        let chunk_count: i64 =
            self.conn.query_row("SELECT COUNT(*) FROM evidence_chunks", [], |row| row.get(0))?;
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT product_tag FROM evidence_chunks ORDER BY product_tag")?;
        let product_tags = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(StoreStats {
            ticket_count: usize::try_from(ticket_count).unwrap_or(0),
            chunk_count: usize::try_from(chunk_count).unwrap_or(0),
            product_tags,
        })
    }
}

impl EvidenceIndex for SqliteStore {
    fn search(
        &self,
        embedding: &[f32],
        allowed_tags: &BTreeSet<String>,
        k: usize,
    ) -> Result<Vec<EvidenceChunk>, PipelineError> {
        self.search_chunks(embedding, allowed_tags, k)
            .map_err(|err| PipelineError::Retrieval(err.to_string()))
    }
}

fn format_optional_timestamp(value: Option<OffsetDateTime>) -> Result<Option<String>, StoreError> {
    value.map(|timestamp| timestamp.format(&Rfc3339)).transpose().map_err(StoreError::from)
}

fn parse_optional_timestamp(value: Option<&str>) -> Result<Option<OffsetDateTime>, StoreError> {
    value
        .map(|text| {
            OffsetDateTime::parse(text, &Rfc3339)
                .map_err(|err| StoreError::MalformedRow(format!("bad timestamp '{text}': {err}")))
        })
        .transpose()
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect()
}

fn squared_l2_distance(lhs: &[f32], rhs: &[f32]) -> f32 {
    // Monotone in true L2, which is all the ascending ordering needs.
    lhs.iter().zip(rhs.iter()).map(|(a, b)| (a - b) * (a - b)).sum()
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    fn open_store() -> SqliteStore {
        let mut store = SqliteStore::open_in_memory()
            .unwrap_or_else(|err| panic!("failed to open in-memory store: {err}"));
        store.migrate().unwrap_or_else(|err| panic!("migration failed: {err}"));
        store
    }

    fn ticket(ticket_id: &str, product_tag: &str) -> Ticket {
        Ticket {
            ticket_id: ticket_id.to_string(),
            product_tag: product_tag.to_string(),
            customer_id: None,
            customer_segment: None,
            created_at: None,
            resolved_at: None,
            resolution_summary: Some("resolved".to_string()),
            tags: vec![],
            language: Some("en".to_string()),
        }
    }

    fn record(
        ticket_id: &str,
        product_tag: &str,
        chunk_index: u32,
        embedding: Vec<f32>,
    ) -> ChunkEmbedding {
        ChunkEmbedding {
            chunk: EvidenceChunk {
                ticket_id: ticket_id.to_string(),
                product_tag: product_tag.to_string(),
                chunk_index,
                text: format!("{ticket_id}#{chunk_index}"),
                created_at: None,
                metadata: Value::Null,
            },
            embedding,
        }
    }

    fn tags(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| (*name).to_string()).collect()
    }

    #[test]
    fn migrate_is_idempotent() {
        let mut store = open_store();
        store.migrate().unwrap_or_else(|err| panic!("second migration failed: {err}"));
        assert_eq!(
            store.schema_version().unwrap_or_else(|err| panic!("version read failed: {err}")),
            LATEST_SCHEMA_VERSION
        );
    }

    #[test]
    fn upsert_replaces_ticket_fields() {
        let mut store = open_store();
        store
            .upsert_ticket(&ticket("TCK-1", "Product_A"))
            .unwrap_or_else(|err| panic!("first upsert failed: {err}"));
        store
            .upsert_ticket(&ticket("TCK-1", "Product_B"))
            .unwrap_or_else(|err| panic!("second upsert failed: {err}"));

        let stats = store.stats().unwrap_or_else(|err| panic!("stats failed: {err}"));
        assert_eq!(stats.ticket_count, 1);
    }

    #[test]
    fn embedding_blob_round_trips() {
        let original = vec![0.25_f32, -1.5, 3.75, 0.0];
        assert_eq!(decode_embedding(&encode_embedding(&original)), original);
    }

    #[test]
    fn search_never_returns_out_of_scope_tags() {
        let mut store = open_store();
        store
            .upsert_ticket(&ticket("TCK-1", "Product_A"))
            .unwrap_or_else(|err| panic!("upsert failed: {err}"));
        store
            .upsert_ticket(&ticket("TCK-2", "Product_B"))
            .unwrap_or_else(|err| panic!("upsert failed: {err}"));
        store
            .index_chunks(&[
                record("TCK-1", "Product_A", 0, vec![0.0, 0.0]),
                record("TCK-2", "Product_B", 0, vec![0.0, 0.0]),
            ])
            .unwrap_or_else(|err| panic!("indexing failed: {err}"));

        let hits = store
            .search_chunks(&[0.0, 0.0], &tags(&["Product_A"]), 10)
            .unwrap_or_else(|err| panic!("search failed: {err}"));
        assert_eq!(hits.len(), 1);
        assert!(hits.iter().all(|chunk| chunk.product_tag == "Product_A"));
    }

    #[test]
    fn search_orders_by_ascending_distance_and_truncates() {
        let mut store = open_store();
        store
            .upsert_ticket(&ticket("TCK-1", "Product_A"))
            .unwrap_or_else(|err| panic!("upsert failed: {err}"));
        store
            .index_chunks(&[
                record("TCK-1", "Product_A", 0, vec![3.0, 0.0]),
                record("TCK-1", "Product_A", 1, vec![1.0, 0.0]),
                record("TCK-1", "Product_A", 2, vec![2.0, 0.0]),
            ])
            .unwrap_or_else(|err| panic!("indexing failed: {err}"));

        let hits = store
            .search_chunks(&[0.0, 0.0], &tags(&["Product_A"]), 2)
            .unwrap_or_else(|err| panic!("search failed: {err}"));
        let indexes: Vec<u32> = hits.iter().map(|chunk| chunk.chunk_index).collect();
        assert_eq!(indexes, vec![1, 2]);
    }

    #[test]
    fn distance_ties_break_deterministically() {
        let mut store = open_store();
        store
            .upsert_ticket(&ticket("TCK-1", "Product_A"))
            .unwrap_or_else(|err| panic!("upsert failed: {err}"));
        store
            .upsert_ticket(&ticket("TCK-2", "Product_A"))
            .unwrap_or_else(|err| panic!("upsert failed: {err}"));
        store
            .index_chunks(&[
                record("TCK-2", "Product_A", 0, vec![1.0]),
                record("TCK-1", "Product_A", 0, vec![1.0]),
            ])
            .unwrap_or_else(|err| panic!("indexing failed: {err}"));

        let hits = store
            .search_chunks(&[0.0], &tags(&["Product_A"]), 10)
            .unwrap_or_else(|err| panic!("search failed: {err}"));
        let ids: Vec<&str> = hits.iter().map(|chunk| chunk.ticket_id.as_str()).collect();
        assert_eq!(ids, vec!["TCK-1", "TCK-2"]);
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        let mut store = open_store();
        store
            .upsert_ticket(&ticket("TCK-1", "Product_A"))
            .unwrap_or_else(|err| panic!("upsert failed: {err}"));
        store
            .index_chunks(&[record("TCK-1", "Product_A", 0, vec![1.0, 2.0])])
            .unwrap_or_else(|err| panic!("indexing failed: {err}"));

        let err = match store.search_chunks(&[1.0, 2.0, 3.0], &tags(&["Product_A"]), 10) {
            Ok(_) => panic!("dimension mismatch must fail"),
            Err(err) => err,
        };
        assert!(matches!(err, StoreError::DimensionMismatch { query: 3, stored: 2 }));
    }

    #[test]
    fn reindexing_a_ticket_replaces_its_chunks() {
        let mut store = open_store();
        store
            .upsert_ticket(&ticket("TCK-1", "Product_A"))
            .unwrap_or_else(|err| panic!("upsert failed: {err}"));
        store
            .index_chunks(&[
                record("TCK-1", "Product_A", 0, vec![1.0]),
                record("TCK-1", "Product_A", 1, vec![1.0]),
            ])
            .unwrap_or_else(|err| panic!("first indexing failed: {err}"));
        store
            .index_chunks(&[record("TCK-1", "Product_A", 0, vec![1.0])])
            .unwrap_or_else(|err| panic!("second indexing failed: {err}"));

        let stats = store.stats().unwrap_or_else(|err| panic!("stats failed: {err}"));
        assert_eq!(stats.chunk_count, 1);
    }

    #[test]
    fn empty_tag_set_short_circuits() {
        let store = open_store();
        let hits = store
            .search_chunks(&[0.0], &BTreeSet::new(), 10)
            .unwrap_or_else(|err| panic!("search failed: {err}"));
        assert!(hits.is_empty());
    }
}
