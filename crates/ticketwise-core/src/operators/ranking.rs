//! Deterministic total ordering of access-filtered evidence.
//!
//! Sort key: product tag, then ticket recency, then chunk order within the
//! ticket, with ticket id as the final tie-breaker so the order is total for
//! distinct chunks regardless of storage return order. A missing `created_at`
//! sorts first (`Option`'s natural order treats `None` as the minimum), so
//! undated chunks rank ahead of dated ones.

use crate::error::PipelineError;
use crate::operators::{Operator, OperatorInput, OperatorOutput};

pub struct RankingOperator;

impl Operator for RankingOperator {
    fn name(&self) -> &'static str {
        "ranking"
    }

    fn call(&self, input: OperatorInput) -> Result<OperatorOutput, PipelineError> {
        let OperatorInput::Rank { mut chunks } = input else {
            return Err(PipelineError::InputMismatch { operator: self.name(), expected: "chunks" });
        };

        chunks.sort_by(|lhs, rhs| {
            lhs.product_tag
                .cmp(&rhs.product_tag)
                .then_with(|| lhs.created_at.cmp(&rhs.created_at))
                .then_with(|| lhs.chunk_index.cmp(&rhs.chunk_index))
                .then_with(|| lhs.ticket_id.cmp(&rhs.ticket_id))
        });
        Ok(OperatorOutput::Chunks(chunks))
    }
}
