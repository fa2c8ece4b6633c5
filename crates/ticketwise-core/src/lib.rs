//! Core query pipeline for Ticketwise: access control, operator contracts,
//! and the controller that turns a question plus an access context into a
//! cited, access-safe answer.

pub mod access;
pub mod clients;
pub mod controller;
pub mod error;
pub mod evidence;
pub mod operators;
pub mod query;
pub mod registry;
pub mod ticket;
pub mod trace;

pub use access::{permissions_for_roles, AccessContext};
pub use clients::{Embedder, EvidenceIndex, LanguageModel};
pub use controller::{PipelineConfig, PipelineController};
pub use error::PipelineError;
pub use evidence::{EvidenceChunk, UsedChunk};
pub use operators::{Operator, OperatorInput, OperatorOutput};
pub use query::{QueryMetadata, QueryResult};
pub use registry::OperatorRegistry;
pub use ticket::Ticket;
pub use trace::{ReasoningBuffer, ReasoningStep};
