//! Error taxonomy for the query pipeline.
//!
//! Registration errors are fatal at controller construction. Upstream service
//! errors are attributed to the operator that triggered them: retrieval and
//! answer failures fail the request, summarization failures degrade. Policy
//! outcomes (no access, everything filtered, verification false) are NOT
//! errors; the controller returns a complete result for those.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("operator '{0}' is already registered")]
    DuplicateOperator(String),
    #[error("operator '{0}' is not registered")]
    UnknownOperator(String),
    #[error("operator '{operator}' expected {expected} input")]
    InputMismatch { operator: &'static str, expected: &'static str },
    #[error("operator '{operator}' produced unexpected {got} output")]
    OutputMismatch { operator: &'static str, got: &'static str },
    #[error("embedding failed: {0}")]
    Embedding(String),
    #[error("retrieval failed: {0}")]
    Retrieval(String),
    #[error("generation failed: {0}")]
    Generation(String),
}
