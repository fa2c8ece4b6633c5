//! Internal digest of the context window. The output never reaches the
//! user-visible answer; the controller treats failure here as non-fatal.

use std::sync::Arc;

use crate::clients::LanguageModel;
use crate::error::PipelineError;
use crate::operators::{joined_context, Operator, OperatorInput, OperatorOutput};

pub struct SummarizationOperator {
    model: Arc<dyn LanguageModel>,
    char_budget: usize,
}

impl SummarizationOperator {
    #[must_use]
    pub fn new(model: Arc<dyn LanguageModel>, char_budget: usize) -> Self {
        Self { model, char_budget }
    }
}

impl Operator for SummarizationOperator {
    fn name(&self) -> &'static str {
        "summarization"
    }

    fn call(&self, input: OperatorInput) -> Result<OperatorOutput, PipelineError> {
        let OperatorInput::Prompt { question, chunks } = input else {
            return Err(PipelineError::InputMismatch {
                operator: self.name(),
                expected: "question and chunks",
            });
        };

        if chunks.is_empty() {
            return Ok(OperatorOutput::Text(String::new()));
        }

        let context = joined_context(&chunks, self.char_budget);
        let prompt = format!(
            "Summarize the following support ticket excerpts into a concise technical \
             digest that a support engineer can act on.\n\n\
             Question under investigation:\n{question}\n\n\
             Ticket excerpts:\n{context}"
        );
        self.model.generate(&prompt).map(OperatorOutput::Text)
    }
}
