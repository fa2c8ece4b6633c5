//! Retrieval: embed the question and run a tag-scoped nearest-neighbour
//! search. The tag predicate is enforced at the storage layer; the in-memory
//! RBAC filter downstream is the redundant second gate.

use std::sync::Arc;

use crate::clients::{Embedder, EvidenceIndex};
use crate::error::PipelineError;
use crate::operators::{Operator, OperatorInput, OperatorOutput};

pub struct RetrievalOperator {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn EvidenceIndex>,
    k: usize,
}

impl RetrievalOperator {
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn EvidenceIndex>, k: usize) -> Self {
        Self { embedder, index, k }
    }
}

impl Operator for RetrievalOperator {
    fn name(&self) -> &'static str {
        "retrieval"
    }

    fn call(&self, input: OperatorInput) -> Result<OperatorOutput, PipelineError> {
        let OperatorInput::Retrieve { question, allowed_tags } = input else {
            return Err(PipelineError::InputMismatch {
                operator: self.name(),
                expected: "question and allowed tags",
            });
        };

        let vectors = self.embedder.embed(&[question])?;
        let [vector] = vectors.as_slice() else {
            return Err(PipelineError::Embedding(format!(
                "expected exactly 1 vector for the question, got {}",
                vectors.len()
            )));
        };
        if vector.is_empty() {
            return Err(PipelineError::Embedding("embedder returned an empty vector".to_string()));
        }

        tracing::debug!(k = self.k, tags = allowed_tags.len(), "running evidence search");
        let chunks = self.index.search(vector, &allowed_tags, self.k)?;
        Ok(OperatorOutput::Chunks(chunks))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::evidence::EvidenceChunk;
    use crate::operators::fixtures::chunk;

    struct FixedEmbedder(Vec<Vec<f32>>);

    impl Embedder for FixedEmbedder {
        fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
            Ok(self.0.clone())
        }
    }

    struct FixedIndex(Vec<EvidenceChunk>);

    impl EvidenceIndex for FixedIndex {
        fn search(
            &self,
            _embedding: &[f32],
            _allowed_tags: &BTreeSet<String>,
            k: usize,
        ) -> Result<Vec<EvidenceChunk>, PipelineError> {
            Ok(self.0.iter().take(k).cloned().collect())
        }
    }

    fn tags(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| (*name).to_string()).collect()
    }

    #[test]
    fn returns_index_results_for_a_single_vector() {
        let operator = RetrievalOperator::new(
            Arc::new(FixedEmbedder(vec![vec![0.1, 0.2]])),
            Arc::new(FixedIndex(vec![chunk("TCK-1", "Product_A", 0, "vpn drops")])),
            10,
        );
        let output = operator
            .call(OperatorInput::Retrieve {
                question: "why does vpn drop".to_string(),
                allowed_tags: tags(&["Product_A"]),
            })
            .unwrap_or_else(|err| panic!("retrieval failed: {err}"));
        let chunks = output
            .into_chunks("retrieval")
            .unwrap_or_else(|err| panic!("retrieval output shape: {err}"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].ticket_id, "TCK-1");
    }

    #[test]
    fn missing_vector_is_an_embedding_error() {
        let operator = RetrievalOperator::new(
            Arc::new(FixedEmbedder(vec![])),
            Arc::new(FixedIndex(vec![])),
            10,
        );
        let err = match operator.call(OperatorInput::Retrieve {
            question: "anything".to_string(),
            allowed_tags: tags(&["Product_A"]),
        }) {
            Ok(_) => panic!("zero vectors must fail"),
            Err(err) => err,
        };
        assert!(matches!(err, PipelineError::Embedding(_)));
    }

    #[test]
    fn empty_vector_is_an_embedding_error() {
        let operator = RetrievalOperator::new(
            Arc::new(FixedEmbedder(vec![vec![]])),
            Arc::new(FixedIndex(vec![])),
            10,
        );
        let err = match operator.call(OperatorInput::Retrieve {
            question: "anything".to_string(),
            allowed_tags: tags(&["Product_A"]),
        }) {
            Ok(_) => panic!("empty vector must fail"),
            Err(err) => err,
        };
        assert!(matches!(err, PipelineError::Embedding(_)));
    }

    #[test]
    fn foreign_input_is_rejected() {
        let operator = RetrievalOperator::new(
            Arc::new(FixedEmbedder(vec![vec![0.5]])),
            Arc::new(FixedIndex(vec![])),
            10,
        );
        let err = match operator.call(OperatorInput::Rank { chunks: vec![] }) {
            Ok(_) => panic!("rank input must be rejected"),
            Err(err) => err,
        };
        assert!(matches!(err, PipelineError::InputMismatch { operator: "retrieval", .. }));
    }
}
