//! Facade shared by the HTTP service and the CLI: ingestion, querying, and
//! store statistics over one SQLite database path and a pair of model
//! collaborators.

pub mod ingest;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use ticketwise_core::{
    AccessContext, Embedder, EvidenceIndex, LanguageModel, PipelineConfig, PipelineController,
    QueryResult,
};
use ticketwise_store_sqlite::{ChunkEmbedding, SqliteStore, StoreStats};

pub use ingest::{chunks_for_ticket, load_tickets_from_file, split_text_with_overlap, IngestConfig};

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestReport {
    pub ticket_count: usize,
    pub chunk_count: usize,
}

/// Entry point over one store path. A fresh store handle and a fresh
/// controller are created per call, so one `TicketwiseApi` may serve many
/// concurrent requests while each request keeps its own reasoning buffer.
#[derive(Clone)]
pub struct TicketwiseApi {
    db_path: PathBuf,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn LanguageModel>,
    pipeline: PipelineConfig,
    ingest: IngestConfig,
}

impl TicketwiseApi {
    #[must_use]
    pub fn new(
        db_path: PathBuf,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
        pipeline: PipelineConfig,
        ingest: IngestConfig,
    ) -> Self {
        Self { db_path, embedder, model, pipeline, ingest }
    }

    fn open_store(&self) -> Result<SqliteStore> {
        let mut store = SqliteStore::open(&self.db_path)
            .with_context(|| format!("failed to open store at {}", self.db_path.display()))?;
        store.migrate().context("failed to migrate store schema")?;
        Ok(store)
    }

    /// Load tickets from `data_path`, chunk their resolution summaries, embed
    /// the chunks, and index everything. An embedding count mismatch aborts
    /// before any chunk row is written.
    ///
    /// # Errors
    /// Returns an error on unreadable data, store failure, embedding failure,
    /// or an embedding/chunk count mismatch.
    pub fn ingest(&self, data_path: &Path) -> Result<IngestReport> {
        let tickets = ingest::load_tickets_from_file(data_path)?;
        let mut store = self.open_store()?;
        for ticket in &tickets {
            store
                .upsert_ticket(ticket)
                .with_context(|| format!("failed to upsert ticket {}", ticket.ticket_id))?;
        }

        let chunks: Vec<_> =
            tickets.iter().flat_map(|ticket| ingest::chunks_for_ticket(ticket, self.ingest)).collect();
        if chunks.is_empty() {
            tracing::info!(tickets = tickets.len(), "ingestion produced no chunks");
            return Ok(IngestReport { ticket_count: tickets.len(), chunk_count: 0 });
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts)?;
        if embeddings.len() != chunks.len() {
            bail!(
                "embedding count mismatch: {} chunks but {} vectors; aborting before any \
                 chunk is written",
                chunks.len(),
                embeddings.len()
            );
        }

        let records: Vec<ChunkEmbedding> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| ChunkEmbedding { chunk, embedding })
            .collect();
        let indexed = store.index_chunks(&records)?;
        tracing::info!(tickets = tickets.len(), chunks = indexed, "ingestion complete");
        Ok(IngestReport { ticket_count: tickets.len(), chunk_count: indexed })
    }

    /// Run the query pipeline for one question under one access context.
    ///
    /// # Errors
    /// Returns an error on store, embedding, retrieval, or generation
    /// failure. Access-policy outcomes are ordinary results.
    pub fn query(&self, question: &str, access: &AccessContext) -> Result<QueryResult> {
        let store = self.open_store()?;
        let index: Arc<dyn EvidenceIndex> = Arc::new(store);
        let mut controller = PipelineController::new(
            Arc::clone(&self.embedder),
            index,
            Arc::clone(&self.model),
            self.pipeline,
        )?;
        let result = controller.run(question, access)?;
        tracing::debug!(
            steps = controller.trace().len(),
            verified = result.metadata.verified,
            "query pipeline finished"
        );
        Ok(result)
    }

    /// # Errors
    /// Returns an error when the store cannot be read.
    pub fn stats(&self) -> Result<StoreStats> {
        let store = self.open_store()?;
        Ok(store.stats()?)
    }
}
