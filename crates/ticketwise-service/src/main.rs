//! HTTP surface for Ticketwise: health, ingestion, and the query pipeline,
//! behind a bearer-token gateway that produces the access context.

mod auth;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::{Deserialize, Serialize};
use ticketwise_api::{IngestConfig, IngestReport, TicketwiseApi};
use ticketwise_core::{Embedder, LanguageModel, PipelineConfig, QueryResult};
use ticketwise_provider::{HttpEmbedder, HttpLanguageModel, LexicalEmbedder, OfflineModel};

use crate::auth::{AuthError, Gateway};

#[derive(Debug, Parser)]
#[command(name = "ticketwise-service")]
#[command(about = "Access-controlled RAG over resolved support tickets")]
struct Args {
    #[arg(long, default_value = "./ticketwise.sqlite3")]
    db: PathBuf,
    #[arg(long, default_value = "127.0.0.1:4020")]
    bind: SocketAddr,
    /// Default ticket corpus for `/v1/ingest` requests without a path.
    #[arg(long, default_value = "./data/tickets.sample.json")]
    data: PathBuf,
    /// JSON map of bearer token to claims; omit for the development profile.
    #[arg(long)]
    token_file: Option<PathBuf>,
    /// Embedding endpoint; omit to embed locally.
    #[arg(long)]
    embed_endpoint: Option<String>,
    /// Language-model endpoint; omit to answer with the offline model.
    #[arg(long)]
    llm_endpoint: Option<String>,
    #[arg(long, default_value_t = 10)]
    retrieval_k: usize,
    #[arg(long, default_value_t = 5)]
    max_context_chunks: usize,
}

#[derive(Clone)]
struct ServiceState {
    api: TicketwiseApi,
    gateway: Gateway,
    default_data: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    error: String,
    #[serde(skip)]
    status: StatusCode,
}

impl ServiceError {
    fn forbidden(message: impl Into<String>) -> Self {
        Self { error: message.into(), status: StatusCode::FORBIDDEN }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self { error: message.into(), status: StatusCode::INTERNAL_SERVER_ERROR }
    }
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        Self { error: err.to_string(), status: StatusCode::UNAUTHORIZED }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct QueryRequest {
    question: String,
}

#[derive(Debug, Clone, Deserialize)]
struct IngestRequest {
    #[serde(default)]
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct ReadyResponse {
    ready: bool,
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/ready", get(ready))
        .route("/v1/query", post(query))
        .route("/v1/ingest", post(ingest))
        .with_state(state)
}

fn auth_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(http::header::AUTHORIZATION).and_then(|value| value.to_str().ok())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let embedder: Arc<dyn Embedder> = match &args.embed_endpoint {
        Some(endpoint) => Arc::new(HttpEmbedder::new(endpoint.clone())),
        None => Arc::new(LexicalEmbedder::default()),
    };
    let model: Arc<dyn LanguageModel> = match &args.llm_endpoint {
        Some(endpoint) => Arc::new(HttpLanguageModel::new(endpoint.clone())),
        None => Arc::new(OfflineModel),
    };
    let gateway = match &args.token_file {
        Some(path) => Gateway::from_token_file(path)
            .map_err(|err| anyhow::anyhow!("failed to load token file: {err}"))?,
        None => Gateway::development(),
    };

    let api = TicketwiseApi::new(
        args.db,
        embedder,
        model,
        PipelineConfig {
            retrieval_k: args.retrieval_k,
            max_context_chunks: args.max_context_chunks,
            ..PipelineConfig::default()
        },
        IngestConfig::default(),
    );
    let state = ServiceState { api, gateway, default_data: args.data };

    tracing::info!(bind = %args.bind, "ticketwise service starting");
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn ready() -> Json<ReadyResponse> {
    Json(ReadyResponse { ready: true })
}

/// The response body is the pipeline's `QueryResult` serialized verbatim;
/// its field names are the wire contract.
async fn query(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResult>, ServiceError> {
    let access = state.gateway.resolve(auth_header(&headers))?;
    if !access.has_permission("query:read") {
        return Err(ServiceError::forbidden("query:read permission required"));
    }

    let result = state
        .api
        .query(&request.question, &access)
        .map_err(|err| ServiceError::internal(err.to_string()))?;
    Ok(Json(result))
}

async fn ingest(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestReport>, ServiceError> {
    let access = state.gateway.resolve(auth_header(&headers))?;
    if !access.has_permission("ingest:write") {
        return Err(ServiceError::forbidden("ingest:write permission required"));
    }

    let data_path = request.path.unwrap_or_else(|| state.default_data.clone());
    let report = state
        .api
        .ingest(&data_path)
        .map_err(|err| ServiceError::internal(err.to_string()))?;
    Ok(Json(report))
}
