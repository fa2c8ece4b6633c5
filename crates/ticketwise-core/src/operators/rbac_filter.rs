//! In-memory RBAC gate over retrieved evidence.
//!
//! Intentionally redundant with the retrieval predicate: if the storage-layer
//! scoping is ever misconfigured or bypassed, this is the last gate before
//! content reaches ranking and prompting. Do not remove one because the other
//! exists.

use crate::error::PipelineError;
use crate::operators::{Operator, OperatorInput, OperatorOutput};

pub struct RbacFilterOperator;

impl Operator for RbacFilterOperator {
    fn name(&self) -> &'static str {
        "rbac_filter"
    }

    fn call(&self, input: OperatorInput) -> Result<OperatorOutput, PipelineError> {
        let OperatorInput::Filter { mut chunks, allowed_tags } = input else {
            return Err(PipelineError::InputMismatch {
                operator: self.name(),
                expected: "chunks and allowed tags",
            });
        };

        if allowed_tags.is_empty() {
            return Ok(OperatorOutput::Chunks(Vec::new()));
        }
        chunks.retain(|chunk| allowed_tags.contains(&chunk.product_tag));
        Ok(OperatorOutput::Chunks(chunks))
    }
}
