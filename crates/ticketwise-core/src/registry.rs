//! Name-keyed operator lookup, built once per controller instance.

use crate::error::PipelineError;
use crate::operators::Operator;

/// Explicit per-controller map; no process-wide state. Insertion order is
/// preserved so `names()` reports operators in registration order.
#[derive(Default)]
pub struct OperatorRegistry {
    entries: Vec<(String, Box<dyn Operator>)>,
}

impl OperatorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// Returns [`PipelineError::DuplicateOperator`] when `name` is taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        operator: Box<dyn Operator>,
    ) -> Result<(), PipelineError> {
        let name = name.into();
        if self.entries.iter().any(|(existing, _)| *existing == name) {
            return Err(PipelineError::DuplicateOperator(name));
        }
        self.entries.push((name, operator));
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn Operator> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, operator)| operator.as_ref())
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }
}
