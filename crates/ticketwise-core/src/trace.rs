//! Append-only reasoning trace scoped to one controller invocation.
//!
//! The buffer exists for internal diagnostics only: it is owned by exactly
//! one request, never reordered or deduplicated, and discarded when the
//! response is assembled. It must never appear in a [`crate::QueryResult`].

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasoningStep {
    pub text: String,
}

#[derive(Debug, Default)]
pub struct ReasoningBuffer {
    steps: Vec<ReasoningStep>,
}

impl ReasoningBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: impl Into<String>) {
        self.steps.push(ReasoningStep { text: text.into() });
    }

    #[must_use]
    pub fn steps(&self) -> &[ReasoningStep] {
        &self.steps
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
