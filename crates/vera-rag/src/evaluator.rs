//! Answer evaluation
//!
//! Judges factual consistency of an answer against the context. The
//! provider is asked for a JSON object `{score, explanation}`; anything
//! that fails the strict parse degrades to a zero score with a fixed
//! explanation instead of surfacing a parse error to the pipeline.

use serde::Deserialize;
use std::sync::Arc;
use vera_core::{LlmClient, Result, RetrievedChunk};

const SYSTEM_PROMPT: &str = "You are an evaluator agent. Your job is to check whether a candidate answer \
is factually supported by the given context.\n\n\
Return JSON with two keys: 'score' (float between 0.0 and 1.0) and \
'explanation' (short string). Higher score means better factual grounding.\n\
If the answer contradicts the context, give a low score (<0.4).";

const PARSE_FAILURE_EXPLANATION: &str = "Failed to parse evaluator output.";

/// Verdict on one candidate answer.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Factual-consistency score in [0, 1]
    pub score: f32,
    pub explanation: String,
}

#[derive(Debug, Deserialize)]
struct EvaluationJson {
    score: f32,
    explanation: String,
}

pub struct EvaluatorAgent {
    llm: Arc<dyn LlmClient>,
}

impl EvaluatorAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn evaluate(
        &self,
        query: &str,
        answer: &str,
        chunks: &[RetrievedChunk],
    ) -> Result<Evaluation> {
        let context: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let context = context.join("\n\n");

        let user_prompt = format!(
            "User question:\n{query}\n\n\
             Context:\n{context}\n\n\
             Candidate answer:\n{answer}\n\n\
             Now respond with the JSON object only."
        );

        let content = self.llm.chat(SYSTEM_PROMPT, &user_prompt).await?;
        Ok(parse_verdict(&content))
    }
}

/// Strict parse with a deterministic fallback. Models sometimes wrap the
/// object in a ```json fence; that much is tolerated.
fn parse_verdict(content: &str) -> Evaluation {
    let trimmed = strip_code_fence(content.trim());

    match serde_json::from_str::<EvaluationJson>(trimmed) {
        Ok(parsed) => Evaluation {
            score: parsed.score.clamp(0.0, 1.0),
            explanation: parsed.explanation,
        },
        Err(e) => {
            tracing::warn!("evaluator output was not valid JSON: {e}");
            Evaluation {
                score: 0.0,
                explanation: PARSE_FAILURE_EXPLANATION.to_string(),
            }
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
