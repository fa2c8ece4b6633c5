//! Answer synthesis from the context window. The model is instructed to use
//! only the supplied excerpts and to cite ticket IDs explicitly; whether it
//! obeyed is checked afterwards by verification.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::clients::LanguageModel;
use crate::error::PipelineError;
use crate::operators::{joined_context, Operator, OperatorInput, OperatorOutput};

pub struct AnswerOperator {
    model: Arc<dyn LanguageModel>,
    char_budget: usize,
}

impl AnswerOperator {
    #[must_use]
    pub fn new(model: Arc<dyn LanguageModel>, char_budget: usize) -> Self {
        Self { model, char_budget }
    }
}

impl Operator for AnswerOperator {
    fn name(&self) -> &'static str {
        "answer"
    }

    fn call(&self, input: OperatorInput) -> Result<OperatorOutput, PipelineError> {
        let OperatorInput::Prompt { question, chunks } = input else {
            return Err(PipelineError::InputMismatch {
                operator: self.name(),
                expected: "question and chunks",
            });
        };

        let context = joined_context(&chunks, self.char_budget);
        let ticket_ids: BTreeSet<&str> =
            chunks.iter().map(|chunk| chunk.ticket_id.as_str()).collect();
        let referenced = ticket_ids.into_iter().collect::<Vec<_>>().join(", ");

        let prompt = format!(
            "You are an expert support assistant.\n\n\
             User question:\n{question}\n\n\
             Relevant ticket excerpts:\n{context}\n\n\
             Tickets referenced: {referenced}\n\n\
             Provide a precise, accurate answer based ONLY on these excerpts. \
             Cite ticket IDs explicitly in your answer."
        );
        self.model.generate(&prompt).map(OperatorOutput::Text)
    }
}
