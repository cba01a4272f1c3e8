//! Vera RAG - Retrieval-augmented answering with self-correction
//!
//! This crate implements the query side of the pipeline: the chat
//! provider adapters, the guardrail/generator/evaluator agents, and the
//! controller that loops generate → evaluate until an answer is judged
//! factually grounded or the retry budget runs out.

pub mod evaluator;
pub mod generator;
pub mod guardrail;
pub mod llm;
pub mod pipeline;

pub use evaluator::{Evaluation, EvaluatorAgent};
pub use generator::GeneratorAgent;
pub use guardrail::GuardrailAgent;
pub use llm::{create_llm_client, OllamaChatClient, OpenAiCompatClient};
pub use pipeline::SelfCorrectingPipeline;

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use vera_core::{LlmClient, Result, VeraError};
    use vera_index::EmbeddingClient;

    /// Stub chat client that replays scripted replies and records every
    /// user prompt it was given.
    pub struct RecordingLlm {
        replies: Mutex<VecDeque<String>>,
        fallback: String,
        prompts: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl RecordingLlm {
        /// Same reply on every call
        pub fn fixed(reply: &str) -> Self {
            Self::scripted(&[reply])
        }

        /// Replies in order; the last one repeats once exhausted
        pub fn scripted(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
                fallback: replies.last().map(|s| s.to_string()).unwrap_or_default(),
                prompts: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn user_prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }

        pub fn last_user_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl LlmClient for RecordingLlm {
        async fn chat(&self, _system: &str, user: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(user.to_string());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone());
            Ok(reply)
        }
    }

    /// Stub chat client that picks its reply by which keyword appears in
    /// the user prompt. Keeps guardrail tests independent of the order
    /// concurrent scoring calls happen to run in.
    pub struct KeywordScoreLlm {
        rules: Vec<(String, String)>,
    }

    impl KeywordScoreLlm {
        pub fn new(rules: &[(&str, &str)]) -> Self {
            Self {
                rules: rules
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl LlmClient for KeywordScoreLlm {
        async fn chat(&self, _system: &str, user: &str) -> Result<String> {
            for (keyword, reply) in &self.rules {
                if user.contains(keyword.as_str()) {
                    return Ok(reply.clone());
                }
            }
            Ok("0.0".to_string())
        }
    }

    /// Stub chat client that is always down.
    pub struct FailingLlm;

    #[async_trait]
    impl LlmClient for FailingLlm {
        async fn chat(&self, _system: &str, _user: &str) -> Result<String> {
            Err(VeraError::CapabilityUnavailable("provider offline".to_string()))
        }
    }

    /// Embedder stub for pipelines that never actually retrieve.
    pub struct NullEmbedding;

    #[async_trait]
    impl EmbeddingClient for NullEmbedding {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
        }

        fn dimension(&self) -> usize {
            4
        }
    }
}
