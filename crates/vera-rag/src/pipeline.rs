//! The self-correction pipeline
//!
//! Four stages per query:
//!   1. Retrieval (cosine similarity over the persisted index)
//!   2. Guardrail relevance filtering, with an all-or-nothing fallback
//!   3. Answer generation
//!   4. Evaluation, looping back to generation while the score is below
//!      the threshold and the retry budget allows
//!
//! The retry budget is for answer quality only; provider failures
//! propagate immediately.

use std::sync::Arc;
use vera_core::{
    AppConfig, LlmClient, PipelineResult, RagConfig, Result, RetrievedChunk,
};
use vera_index::{create_embedding_client, EmbeddingClient, IndexStore, Retriever};

use crate::evaluator::{Evaluation, EvaluatorAgent};
use crate::generator::GeneratorAgent;
use crate::guardrail::GuardrailAgent;
use crate::llm::create_llm_client;

pub struct SelfCorrectingPipeline {
    retriever: Retriever,
    guardrail: GuardrailAgent,
    generator: GeneratorAgent,
    evaluator: EvaluatorAgent,
    config: RagConfig,
}

impl SelfCorrectingPipeline {
    pub fn new(
        retriever: Retriever,
        guardrail: GuardrailAgent,
        generator: GeneratorAgent,
        evaluator: EvaluatorAgent,
        config: RagConfig,
    ) -> Self {
        Self {
            retriever,
            guardrail,
            generator,
            evaluator,
            config,
        }
    }

    /// Wire up the full pipeline from configuration: embedding and chat
    /// providers, index store, and the three agents.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let embedder: Arc<dyn EmbeddingClient> = create_embedding_client(&config.llm)?.into();
        let llm: Arc<dyn LlmClient> = create_llm_client(&config.llm)?.into();

        let retriever = Retriever::new(IndexStore::new(config.paths.clone()), embedder);
        let guardrail = GuardrailAgent::new(llm.clone(), config.rag.guardrail_threshold);
        let generator = GeneratorAgent::new(llm.clone());
        let evaluator = EvaluatorAgent::new(llm);

        Ok(Self::new(
            retriever,
            guardrail,
            generator,
            evaluator,
            config.rag.clone(),
        ))
    }

    /// Answer one query end to end.
    pub async fn run(&self, query: &str) -> Result<PipelineResult> {
        tracing::info!("pipeline started");

        let mut retrieved = self.retriever.retrieve(query, self.config.top_k).await?;
        tracing::debug!("retrieved {} chunks", retrieved.len());

        let kept = self.guardrail.filter_chunks(query, &mut retrieved).await?;
        let context = if kept.is_empty() {
            // All-or-nothing fallback: an over-aggressive guardrail must
            // not leave the generator with no context at all
            tracing::warn!("guardrail dropped every chunk, using the unfiltered retrieval");
            retrieved
        } else {
            tracing::debug!("guardrail kept {} of {} chunks", kept.len(), retrieved.len());
            kept
        };

        self.answer_with_context(query, context).await
    }

    /// The generate/evaluate loop over caller-supplied context. Attempts
    /// are 1-based and never exceed the configured budget; the loop stops
    /// early as soon as a score reaches the evaluation threshold.
    pub async fn answer_with_context(
        &self,
        query: &str,
        context: Vec<RetrievedChunk>,
    ) -> Result<PipelineResult> {
        let budget = self.config.max_self_correct_steps.max(1);

        let mut attempts = 0u32;
        let mut answer: Option<String> = None;
        let mut verdict = Evaluation {
            score: 0.0,
            explanation: String::new(),
        };

        while attempts < budget {
            attempts += 1;
            let candidate = self
                .generator
                .generate(query, &context, answer.as_deref())
                .await?;
            verdict = self.evaluator.evaluate(query, &candidate, &context).await?;
            tracing::info!(attempt = attempts, score = verdict.score, "answer evaluated");
            answer = Some(candidate);

            if verdict.score >= self.config.eval_threshold {
                break;
            }
        }

        Ok(PipelineResult {
            query: query.to_string(),
            answer: answer.unwrap_or_default(),
            score: verdict.score,
            explanation: verdict.explanation,
            attempts,
            used_chunks: context,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FailingLlm, NullEmbedding, RecordingLlm};
    use vera_core::{Document, PathsConfig, VeraError};

    fn pipeline_with(
        generator_llm: Arc<dyn LlmClient>,
        evaluator_llm: Arc<dyn LlmClient>,
        config: RagConfig,
    ) -> SelfCorrectingPipeline {
        // The retriever is unused by answer_with_context; point it at
        // nothing in particular
        let retriever = Retriever::new(
            IndexStore::new(PathsConfig::default()),
            Arc::new(NullEmbedding),
        );
        SelfCorrectingPipeline::new(
            retriever,
            GuardrailAgent::new(Arc::new(RecordingLlm::fixed("1.0")), config.guardrail_threshold),
            GeneratorAgent::new(generator_llm),
            EvaluatorAgent::new(evaluator_llm),
            config,
        )
    }

    fn context() -> Vec<RetrievedChunk> {
        vec![RetrievedChunk::from_document(
            &Document::new(0, "a.txt", "Paris is the capital of France."),
            0.9,
        )]
    }

    #[tokio::test]
    async fn test_budget_exhaustion_returns_last_answer() {
        let generator = Arc::new(RecordingLlm::scripted(&["first try", "second try"]));
        let evaluator = Arc::new(RecordingLlm::fixed(r#"{"score": 0.5, "explanation": "ok"}"#));
        let pipeline = pipeline_with(generator.clone(), evaluator.clone(), RagConfig::default());

        let result = pipeline
            .answer_with_context("capital of France?", context())
            .await
            .unwrap();

        // eval_threshold 0.7, max steps 2: exactly 2 attempts, last answer
        assert_eq!(result.attempts, 2);
        assert_eq!(result.answer, "second try");
        assert_eq!(result.score, 0.5);
        assert_eq!(result.explanation, "ok");
        assert_eq!(generator.call_count(), 2);
        assert_eq!(evaluator.call_count(), 2);
    }

    #[tokio::test]
    async fn test_passing_score_stops_after_one_attempt() {
        let generator = Arc::new(RecordingLlm::fixed("good answer"));
        let evaluator = Arc::new(RecordingLlm::fixed(
            r#"{"score": 0.9, "explanation": "grounded"}"#,
        ));
        let pipeline = pipeline_with(generator.clone(), evaluator, RagConfig::default());

        let result = pipeline.answer_with_context("q", context()).await.unwrap();

        assert_eq!(result.attempts, 1);
        assert_eq!(result.answer, "good answer");
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_score_equal_to_threshold_counts_as_success() {
        let generator = Arc::new(RecordingLlm::fixed("borderline answer"));
        let evaluator = Arc::new(RecordingLlm::fixed(
            r#"{"score": 0.7, "explanation": "just enough"}"#,
        ));
        let pipeline = pipeline_with(generator, evaluator, RagConfig::default());

        let result = pipeline.answer_with_context("q", context()).await.unwrap();
        assert_eq!(result.attempts, 1);
        assert_eq!(result.score, 0.7);
    }

    #[tokio::test]
    async fn test_retry_feeds_previous_answer_to_generator() {
        let generator = Arc::new(RecordingLlm::scripted(&["first try", "second try"]));
        let evaluator = Arc::new(RecordingLlm::fixed(r#"{"score": 0.1, "explanation": "weak"}"#));
        let pipeline = pipeline_with(generator.clone(), evaluator, RagConfig::default());

        pipeline.answer_with_context("q", context()).await.unwrap();

        let prompts = generator.user_prompts();
        assert_eq!(prompts.len(), 2);
        assert!(!prompts[0].contains("Previous answer"));
        assert!(prompts[1].contains("Previous answer that was judged low quality:\nfirst try"));
    }

    #[tokio::test]
    async fn test_provider_failure_propagates_unretried() {
        let generator = Arc::new(FailingLlm);
        let evaluator = Arc::new(RecordingLlm::fixed(r#"{"score": 0.9, "explanation": "x"}"#));
        let pipeline = pipeline_with(generator, evaluator.clone(), RagConfig::default());

        let err = pipeline.answer_with_context("q", context()).await.unwrap_err();
        assert!(matches!(err, VeraError::CapabilityUnavailable(_)));
        assert_eq!(evaluator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_result_carries_query_and_context() {
        let generator = Arc::new(RecordingLlm::fixed("answer"));
        let evaluator = Arc::new(RecordingLlm::fixed(r#"{"score": 0.8, "explanation": "ok"}"#));
        let pipeline = pipeline_with(generator, evaluator, RagConfig::default());

        let result = pipeline
            .answer_with_context("the question", context())
            .await
            .unwrap();

        assert_eq!(result.query, "the question");
        assert_eq!(result.used_chunks.len(), 1);
        assert_eq!(result.used_chunks[0].filename, "a.txt");
    }
}
