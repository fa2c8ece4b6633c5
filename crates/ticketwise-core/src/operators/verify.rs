//! Citation guard: every ticket ID the answer cites must come from the
//! evidence that produced it. The check cannot correct the answer, only flag
//! whether it should be trusted; policy on a false verdict belongs to the
//! caller.

use std::collections::BTreeSet;

use crate::error::PipelineError;
use crate::operators::{Operator, OperatorInput, OperatorOutput};

/// Ticket identifiers are whitespace-delimited tokens with this prefix.
pub const TICKET_ID_PREFIX: &str = "TCK-";

pub struct VerificationOperator;

impl Operator for VerificationOperator {
    fn name(&self) -> &'static str {
        "verify"
    }

    fn call(&self, input: OperatorInput) -> Result<OperatorOutput, PipelineError> {
        let OperatorInput::Check { answer, chunks } = input else {
            return Err(PipelineError::InputMismatch {
                operator: self.name(),
                expected: "answer and chunks",
            });
        };

        if chunks.is_empty() {
            return Ok(OperatorOutput::Verdict(true));
        }

        let allowed: BTreeSet<&str> = chunks.iter().map(|chunk| chunk.ticket_id.as_str()).collect();
        let verdict = answer
            .split_whitespace()
            .filter(|token| token.starts_with(TICKET_ID_PREFIX))
            .all(|token| allowed.contains(token));
        Ok(OperatorOutput::Verdict(verdict))
    }
}
