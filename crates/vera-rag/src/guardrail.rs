//! Guardrail relevance filtering
//!
//! Scores every retrieved chunk against the query with the LLM and keeps
//! only the ones above the relevance threshold. The per-chunk calls are
//! independent and fan out concurrently; results are reassembled in input
//! order, so the filter is stable. An empty survivor set is not an error
//! here; the pipeline falls back to the unfiltered chunks.

use futures::future::try_join_all;
use std::sync::Arc;
use vera_core::{LlmClient, Result, RetrievedChunk};

const SYSTEM_PROMPT: &str = "You are a guardrail agent. Given a user query and a document chunk, \
you must output ONLY a floating point number between 0.0 and 1.0 \
indicating how relevant the chunk is to answering the query. \
0.0 means not relevant at all. 1.0 means perfectly relevant.";

pub struct GuardrailAgent {
    llm: Arc<dyn LlmClient>,
    threshold: f32,
}

impl GuardrailAgent {
    pub fn new(llm: Arc<dyn LlmClient>, threshold: f32) -> Self {
        Self { llm, threshold }
    }

    /// Ask the LLM how relevant `chunk_text` is to `query`. Unparsable
    /// output scores 0.0; out-of-range values are clamped into [0, 1].
    pub async fn score_relevance(&self, query: &str, chunk_text: &str) -> Result<f32> {
        let user_prompt = format!(
            "Query:\n{query}\n\n\
             Document chunk:\n{chunk_text}\n\n\
             Relevance score (0.0-1.0):"
        );

        let content = self.llm.chat(SYSTEM_PROMPT, &user_prompt).await?;
        let value = content.trim().parse::<f32>().unwrap_or(0.0);
        Ok(value.clamp(0.0, 1.0))
    }

    /// Score every chunk and return the ones at or above the threshold,
    /// in their original order. Every input chunk gets its score recorded,
    /// filtered out or not.
    pub async fn filter_chunks(
        &self,
        query: &str,
        chunks: &mut [RetrievedChunk],
    ) -> Result<Vec<RetrievedChunk>> {
        let scores = try_join_all(
            chunks
                .iter()
                .map(|chunk| self.score_relevance(query, &chunk.text)),
        )
        .await?;

        let mut kept = Vec::new();
        for (chunk, score) in chunks.iter_mut().zip(scores) {
            chunk.guardrail_score = Some(score);
            if score >= self.threshold {
                kept.push(chunk.clone());
            } else {
                tracing::debug!(id = chunk.id, score, "guardrail dropped chunk");
            }
        }

        Ok(kept)
    }
}
