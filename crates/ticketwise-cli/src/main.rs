//! `tw`: local CLI over the ticket store and query pipeline. Runs fully
//! offline with the deterministic providers, or against HTTP endpoints when
//! given them.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use ticketwise_api::{IngestConfig, TicketwiseApi};
use ticketwise_core::{AccessContext, Embedder, LanguageModel, PipelineConfig};
use ticketwise_provider::{HttpEmbedder, HttpLanguageModel, LexicalEmbedder, OfflineModel};

#[derive(Debug, Parser)]
#[command(name = "tw")]
#[command(about = "Access-controlled RAG over resolved support tickets")]
struct Cli {
    #[arg(long, default_value = "./ticketwise.sqlite3")]
    db: PathBuf,
    /// Embedding endpoint; omit to embed locally.
    #[arg(long)]
    embed_endpoint: Option<String>,
    /// Language-model endpoint; omit to answer with the offline model.
    #[arg(long)]
    llm_endpoint: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load, chunk, embed, and index a ticket JSON file.
    Ingest(IngestArgs),
    /// Ask a question under an explicit access context.
    Query(QueryArgs),
    /// Print corpus counters.
    Stats,
}

#[derive(Debug, Args)]
struct IngestArgs {
    #[arg(long)]
    data: PathBuf,
    #[arg(long, default_value_t = 800)]
    chunk_size: usize,
    #[arg(long, default_value_t = 120)]
    chunk_overlap: usize,
}

#[derive(Debug, Args)]
struct QueryArgs {
    question: String,
    #[arg(long, default_value = "cli-user")]
    user: String,
    /// Repeatable; permissions are derived from roles.
    #[arg(long = "role")]
    roles: Vec<String>,
    /// Repeatable; the product scope the question may draw evidence from.
    #[arg(long = "tag")]
    tags: Vec<String>,
    #[arg(long, default_value_t = 10)]
    retrieval_k: usize,
    #[arg(long, default_value_t = 5)]
    max_context_chunks: usize,
}

fn build_api(cli: &Cli, pipeline: PipelineConfig, ingest: IngestConfig) -> TicketwiseApi {
    let embedder: Arc<dyn Embedder> = match &cli.embed_endpoint {
        Some(endpoint) => Arc::new(HttpEmbedder::new(endpoint.clone())),
        None => Arc::new(LexicalEmbedder::default()),
    };
    let model: Arc<dyn LanguageModel> = match &cli.llm_endpoint {
        Some(endpoint) => Arc::new(HttpLanguageModel::new(endpoint.clone())),
        None => Arc::new(OfflineModel),
    };
    TicketwiseApi::new(cli.db.clone(), embedder, model, pipeline, ingest)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Command::Ingest(args) => {
            let ingest =
                IngestConfig { chunk_size: args.chunk_size, chunk_overlap: args.chunk_overlap };
            let api = build_api(&cli, PipelineConfig::default(), ingest);
            let report = api.ingest(&args.data)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Query(args) => {
            let pipeline = PipelineConfig {
                retrieval_k: args.retrieval_k,
                max_context_chunks: args.max_context_chunks,
                ..PipelineConfig::default()
            };
            let api = build_api(&cli, pipeline, IngestConfig::default());
            let roles: BTreeSet<String> = args.roles.iter().cloned().collect();
            let tags: BTreeSet<String> = args.tags.iter().cloned().collect();
            let access = AccessContext::new(args.user.clone(), roles, tags);
            let result = api.query(&args.question, &access)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Stats => {
            let api = build_api(&cli, PipelineConfig::default(), IngestConfig::default());
            let stats = api.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}
