//! Pipeline controller: drives the fixed operator sequence, applies the
//! early-exit policy, and assembles the final [`QueryResult`].
//!
//! One controller serves one request. It owns the request's reasoning buffer
//! and operator registry; collaborators are shared read-only. Policy outcomes
//! (no access, nothing retrieved, everything filtered) are terminal states
//! with canned answers, never errors.

use std::sync::Arc;

use crate::access::AccessContext;
use crate::clients::{Embedder, EvidenceIndex, LanguageModel};
use crate::error::PipelineError;
use crate::evidence::UsedChunk;
use crate::operators::{
    AnswerOperator, OperatorInput, OperatorOutput, RankingOperator, RbacFilterOperator,
    RetrievalOperator, SummarizationOperator, VerificationOperator,
};
use crate::query::{QueryMetadata, QueryResult};
use crate::registry::OperatorRegistry;
use crate::trace::{ReasoningBuffer, ReasoningStep};

const NO_ACCESS_ANSWER: &str =
    "You do not have access to any products, so no tickets can be used to answer this question.";
const NO_DATA_ANSWER: &str =
    "I couldn't find any relevant resolved tickets to answer this question.";
const FILTERED_OUT_ANSWER: &str =
    "Relevant tickets exist but are not accessible under your current permissions.";

/// Fixed per-controller configuration; never derived per-request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Nearest-neighbour candidates fetched by retrieval.
    pub retrieval_k: usize,
    /// Upper bound on chunks admitted into the model context window.
    pub max_context_chunks: usize,
    /// Character budget for the summarization context block.
    pub summary_char_budget: usize,
    /// Character budget for the answer context block.
    pub answer_char_budget: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retrieval_k: 10,
            max_context_chunks: 5,
            summary_char_budget: 6000,
            answer_char_budget: 8000,
        }
    }
}

pub struct PipelineController {
    registry: OperatorRegistry,
    buffer: ReasoningBuffer,
    config: PipelineConfig,
}

impl PipelineController {
    /// Build a controller with all six operators registered in pipeline
    /// order.
    ///
    /// # Errors
    /// Returns [`PipelineError::DuplicateOperator`] if registration collides,
    /// which indicates a construction bug rather than a runtime condition.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn EvidenceIndex>,
        model: Arc<dyn LanguageModel>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let mut registry = OperatorRegistry::new();
        registry.register(
            "retrieval",
            Box::new(RetrievalOperator::new(embedder, index, config.retrieval_k)),
        )?;
        registry.register("rbac_filter", Box::new(RbacFilterOperator))?;
        registry.register("ranking", Box::new(RankingOperator))?;
        registry.register(
            "summarization",
            Box::new(SummarizationOperator::new(Arc::clone(&model), config.summary_char_budget)),
        )?;
        registry.register(
            "answer",
            Box::new(AnswerOperator::new(model, config.answer_char_budget)),
        )?;
        registry.register("verify", Box::new(VerificationOperator))?;

        Ok(Self { registry, buffer: ReasoningBuffer::new(), config })
    }

    fn invoke(&self, name: &str, input: OperatorInput) -> Result<OperatorOutput, PipelineError> {
        let operator = self
            .registry
            .get(name)
            .ok_or_else(|| PipelineError::UnknownOperator(name.to_string()))?;
        operator.call(input)
    }

    /// Internal diagnostics only; never serialized into a response.
    #[must_use]
    pub fn trace(&self) -> &[ReasoningStep] {
        self.buffer.steps()
    }

    /// Run the full pipeline for one question.
    ///
    /// # Errors
    /// Returns the failing operator's error for retrieval, answer synthesis,
    /// or a contract violation. Policy outcomes are returned as ordinary
    /// results with canned answers.
    pub fn run(
        &mut self,
        question: &str,
        access: &AccessContext,
    ) -> Result<QueryResult, PipelineError> {
        let allowed = &access.allowed_product_tags;

        if allowed.is_empty() {
            self.buffer.push("request carries no allowed product tags; skipping retrieval");
            tracing::info!(user_id = %access.user_id, "query denied: empty product scope");
            return Ok(canned_result(NO_ACCESS_ANSWER, true, 0, 0, vec![]));
        }

        self.buffer.push(format!(
            "retrieving evidence for user '{}' across {} allowed product tags",
            access.user_id,
            allowed.len()
        ));
        let retrieved = self
            .invoke(
                "retrieval",
                OperatorInput::Retrieve {
                    question: question.to_string(),
                    allowed_tags: allowed.clone(),
                },
            )?
            .into_chunks("retrieval")?;
        let retrieved_k = retrieved.len();
        self.buffer.push(format!("retrieved {retrieved_k} chunks from the evidence index"));

        if retrieved.is_empty() {
            tracing::info!(user_id = %access.user_id, "query found no evidence");
            return Ok(canned_result(NO_DATA_ANSWER, true, 0, 0, vec!["retrieval".to_string()]));
        }

        let filtered = self
            .invoke(
                "rbac_filter",
                OperatorInput::Filter { chunks: retrieved, allowed_tags: allowed.clone() },
            )?
            .into_chunks("rbac_filter")?;
        let filtered_k = filtered.len();
        self.buffer.push(format!("{filtered_k} chunks remain after the in-memory access gate"));

        if filtered.is_empty() {
            tracing::warn!(
                user_id = %access.user_id,
                retrieved_k,
                "all retrieved evidence rejected by the in-memory access gate"
            );
            return Ok(canned_result(
                FILTERED_OUT_ANSWER,
                true,
                retrieved_k,
                0,
                vec!["retrieval".to_string(), "rbac_filter".to_string()],
            ));
        }

        let ranked =
            self.invoke("ranking", OperatorInput::Rank { chunks: filtered })?.into_chunks("ranking")?;
        let window_len = self.config.max_context_chunks.min(ranked.len());
        let window: Vec<_> = ranked.into_iter().take(window_len).collect();
        self.buffer.push(format!("selected {window_len} ranked chunks as the context window"));

        // Best-effort digest; the answer path does not consume it, so a
        // failure degrades instead of aborting the request.
        match self
            .invoke(
                "summarization",
                OperatorInput::Prompt { question: question.to_string(), chunks: window.clone() },
            )
            .and_then(|output| output.into_text("summarization"))
        {
            Ok(digest) if digest.is_empty() => {
                self.buffer.push("summarization produced an empty digest");
            }
            Ok(digest) => {
                let preview: String = digest.chars().take(200).collect();
                self.buffer.push(format!("internal digest: {preview}"));
            }
            Err(err) => {
                tracing::warn!(error = %err, "summarization failed; continuing without digest");
                self.buffer.push(format!("summarization failed and was skipped: {err}"));
            }
        }

        let answer = self
            .invoke(
                "answer",
                OperatorInput::Prompt { question: question.to_string(), chunks: window.clone() },
            )?
            .into_text("answer")?;
        self.buffer.push("composed final answer from the context window");

        let verified = self
            .invoke(
                "verify",
                OperatorInput::Check { answer: answer.clone(), chunks: window.clone() },
            )?
            .into_verdict("verify")?;
        self.buffer.push(format!("citation verification verdict: {verified}"));

        let source_ticket_ids = window.iter().map(|chunk| chunk.ticket_id.clone()).collect();
        let used_chunks = window.iter().map(UsedChunk::from).collect();

        Ok(QueryResult {
            answer,
            source_ticket_ids,
            used_chunks,
            metadata: QueryMetadata {
                verified,
                retrieved_k,
                filtered_k,
                operator_sequence: self.registry.names(),
            },
        })
    }
}

fn canned_result(
    answer: &str,
    verified: bool,
    retrieved_k: usize,
    filtered_k: usize,
    operator_sequence: Vec<String>,
) -> QueryResult {
    QueryResult {
        answer: answer.to_string(),
        source_ticket_ids: std::collections::BTreeSet::new(),
        used_chunks: vec![],
        metadata: QueryMetadata { verified, retrieved_k, filtered_k, operator_sequence },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::evidence::EvidenceChunk;
    use crate::operators::fixtures::chunk;

    struct FixedEmbedder;

    impl Embedder for FixedEmbedder {
        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
            Ok(texts.iter().map(|_| vec![0.1, 0.2, 0.3]).collect())
        }
    }

    /// Returns its fixture rows regardless of the query vector; tag scoping
    /// is deliberately NOT applied so the in-memory gate can be observed.
    struct LeakyIndex(Vec<EvidenceChunk>);

    impl EvidenceIndex for LeakyIndex {
        fn search(
            &self,
            _embedding: &[f32],
            _allowed_tags: &BTreeSet<String>,
            k: usize,
        ) -> Result<Vec<EvidenceChunk>, PipelineError> {
            Ok(self.0.iter().take(k).cloned().collect())
        }
    }

    struct FixedModel(&'static str);

    impl LanguageModel for FixedModel {
        fn generate(&self, _prompt: &str) -> Result<String, PipelineError> {
            Ok(self.0.to_string())
        }
    }

    /// Fails digest prompts, answers everything else.
    struct DigestAverseModel(&'static str);

    impl LanguageModel for DigestAverseModel {
        fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
            if prompt.starts_with("Summarize") {
                return Err(PipelineError::Generation("digest endpoint down".to_string()));
            }
            Ok(self.0.to_string())
        }
    }

    struct DownModel;

    impl LanguageModel for DownModel {
        fn generate(&self, _prompt: &str) -> Result<String, PipelineError> {
            Err(PipelineError::Generation("model endpoint unavailable".to_string()))
        }
    }

    fn controller(
        chunks: Vec<EvidenceChunk>,
        model: Arc<dyn LanguageModel>,
    ) -> PipelineController {
        PipelineController::new(
            Arc::new(FixedEmbedder),
            Arc::new(LeakyIndex(chunks)),
            model,
            PipelineConfig::default(),
        )
        .unwrap_or_else(|err| panic!("controller construction failed: {err}"))
    }

    fn access(tags: &[&str]) -> AccessContext {
        AccessContext::new(
            "demo-user",
            ["support_rep".to_string()].into_iter().collect(),
            tags.iter().map(|tag| (*tag).to_string()).collect(),
        )
    }

    fn full_sequence() -> Vec<String> {
        ["retrieval", "rbac_filter", "ranking", "summarization", "answer", "verify"]
            .iter()
            .map(|name| (*name).to_string())
            .collect()
    }

    #[test]
    fn empty_product_scope_short_circuits_before_retrieval() {
        let mut controller = controller(
            vec![chunk("TCK-1", "Product_A", 0, "text")],
            Arc::new(FixedModel("unused")),
        );
        let result = controller
            .run("anything", &access(&[]))
            .unwrap_or_else(|err| panic!("run failed: {err}"));

        assert_eq!(result.answer, NO_ACCESS_ANSWER);
        assert!(result.used_chunks.is_empty());
        assert!(result.source_ticket_ids.is_empty());
        assert!(result.metadata.verified);
        assert_eq!(result.metadata.retrieved_k, 0);
        assert_eq!(result.metadata.filtered_k, 0);
        assert!(result.metadata.operator_sequence.is_empty());
    }

    #[test]
    fn zero_retrieval_reports_no_data() {
        let mut controller = controller(vec![], Arc::new(FixedModel("unused")));
        let result = controller
            .run("anything", &access(&["Product_A"]))
            .unwrap_or_else(|err| panic!("run failed: {err}"));

        assert_eq!(result.answer, NO_DATA_ANSWER);
        assert_eq!(result.metadata.retrieved_k, 0);
        assert_eq!(result.metadata.operator_sequence, vec!["retrieval".to_string()]);
        assert!(result.metadata.verified);
    }

    #[test]
    fn fully_filtered_evidence_reports_inaccessible() {
        let mut controller = controller(
            vec![
                chunk("TCK-1", "Product_B", 0, "other product"),
                chunk("TCK-2", "Product_B", 0, "other product"),
            ],
            Arc::new(FixedModel("unused")),
        );
        let result = controller
            .run("anything", &access(&["Product_A"]))
            .unwrap_or_else(|err| panic!("run failed: {err}"));

        assert_eq!(result.answer, FILTERED_OUT_ANSWER);
        assert_eq!(result.metadata.retrieved_k, 2);
        assert_eq!(result.metadata.filtered_k, 0);
        assert_eq!(
            result.metadata.operator_sequence,
            vec!["retrieval".to_string(), "rbac_filter".to_string()]
        );
    }

    #[test]
    fn in_scope_evidence_reaches_verification() {
        let mut controller = controller(
            vec![
                chunk("TCK-1", "Product_A", 0, "vpn drops on resume"),
                chunk("TCK-1", "Product_A", 1, "fixed by driver update"),
                chunk("TCK-2", "Product_A", 0, "same symptom, same fix"),
            ],
            Arc::new(FixedModel("Update the driver, see TCK-1 and TCK-2")),
        );
        let result = controller
            .run("vpn drops", &access(&["Product_A"]))
            .unwrap_or_else(|err| panic!("run failed: {err}"));

        assert_eq!(result.metadata.retrieved_k, 3);
        assert_eq!(result.metadata.filtered_k, 3);
        assert!(result.metadata.verified);
        assert_eq!(result.metadata.operator_sequence, full_sequence());
        let ids: Vec<&str> =
            result.source_ticket_ids.iter().map(String::as_str).collect();
        assert_eq!(ids, vec!["TCK-1", "TCK-2"]);
        assert_eq!(result.used_chunks.len(), 3);
    }

    #[test]
    fn mixed_tags_are_gated_in_memory() {
        let mut controller = controller(
            vec![
                chunk("TCK-1", "Product_A", 0, "a"),
                chunk("TCK-2", "Product_B", 0, "b"),
                chunk("TCK-3", "Product_A", 0, "c"),
                chunk("TCK-4", "Product_B", 1, "d"),
                chunk("TCK-5", "Product_A", 1, "e"),
            ],
            Arc::new(FixedModel("All three tickets agree")),
        );
        let result = controller
            .run("anything", &access(&["Product_A"]))
            .unwrap_or_else(|err| panic!("run failed: {err}"));

        assert_eq!(result.metadata.retrieved_k, 5);
        assert_eq!(result.metadata.filtered_k, 3);
        assert!(result
            .used_chunks
            .iter()
            .all(|used| used.product_tag == "Product_A"));
    }

    #[test]
    fn context_window_is_bounded_by_configuration() {
        let chunks: Vec<EvidenceChunk> = (0..9)
            .map(|index| chunk(&format!("TCK-{index}"), "Product_A", 0, "text"))
            .collect();
        let mut controller = PipelineController::new(
            Arc::new(FixedEmbedder),
            Arc::new(LeakyIndex(chunks)),
            Arc::new(FixedModel("ok")),
            PipelineConfig { retrieval_k: 10, max_context_chunks: 4, ..PipelineConfig::default() },
        )
        .unwrap_or_else(|err| panic!("controller construction failed: {err}"));

        let result = controller
            .run("anything", &access(&["Product_A"]))
            .unwrap_or_else(|err| panic!("run failed: {err}"));
        assert_eq!(result.used_chunks.len(), 4);
        assert_eq!(result.metadata.filtered_k, 9);
    }

    #[test]
    fn hallucinated_citation_flips_verified_false() {
        let mut controller = controller(
            vec![chunk("TCK-123", "Product_A", 0, "the only evidence")],
            Arc::new(FixedModel("See TCK-999 for details")),
        );
        let result = controller
            .run("anything", &access(&["Product_A"]))
            .unwrap_or_else(|err| panic!("run failed: {err}"));

        assert!(!result.metadata.verified);
        assert_eq!(result.answer, "See TCK-999 for details");
    }

    #[test]
    fn summarization_failure_does_not_abort_the_request() {
        let mut controller = controller(
            vec![chunk("TCK-1", "Product_A", 0, "evidence")],
            Arc::new(DigestAverseModel("Answer citing TCK-1")),
        );
        let result = controller
            .run("anything", &access(&["Product_A"]))
            .unwrap_or_else(|err| panic!("run failed: {err}"));

        assert_eq!(result.answer, "Answer citing TCK-1");
        assert!(result.metadata.verified);
        assert!(controller
            .trace()
            .iter()
            .any(|step| step.text.contains("summarization failed")));
    }

    #[test]
    fn answer_failure_aborts_the_request() {
        let mut controller =
            controller(vec![chunk("TCK-1", "Product_A", 0, "evidence")], Arc::new(DownModel));
        let err = match controller.run("anything", &access(&["Product_A"])) {
            Ok(_) => panic!("answer failure must abort"),
            Err(err) => err,
        };
        assert!(matches!(err, PipelineError::Generation(_)));
    }

    #[test]
    fn trace_never_leaks_into_the_result() {
        let mut controller = controller(
            vec![chunk("TCK-1", "Product_A", 0, "evidence")],
            Arc::new(FixedModel("Cites TCK-1")),
        );
        let result = controller
            .run("anything", &access(&["Product_A"]))
            .unwrap_or_else(|err| panic!("run failed: {err}"));
        assert!(!controller.trace().is_empty());

        let serialized = serde_json::to_string(&result)
            .unwrap_or_else(|err| panic!("result serialization failed: {err}"));
        for step in controller.trace() {
            assert!(!serialized.contains(&step.text));
        }
    }
}
