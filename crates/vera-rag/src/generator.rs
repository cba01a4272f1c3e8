//! Answer generation
//!
//! Produces an answer grounded in the supplied context chunks. When a
//! previous answer is supplied it was judged insufficient, and the prompt
//! asks for a corrected answer rather than a fresh one.

use std::sync::Arc;
use vera_core::{LlmClient, Result, RetrievedChunk};

const SYSTEM_PROMPT: &str = "You are a careful assistant that only uses the given context.";

/// Concatenate chunk texts into a single numbered context block.
pub fn build_context_snippet(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| format!("[Document {} from {}]\n{}", i + 1, c.filename, c.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct GeneratorAgent {
    llm: Arc<dyn LlmClient>,
}

impl GeneratorAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn generate(
        &self,
        query: &str,
        chunks: &[RetrievedChunk],
        previous_answer: Option<&str>,
    ) -> Result<String> {
        let context = build_context_snippet(chunks);

        let user_prompt = match previous_answer {
            Some(previous) => format!(
                "User question:\n{query}\n\n\
                 Relevant context:\n{context}\n\n\
                 Previous answer that was judged low quality:\n{previous}\n\n\
                 Please provide a corrected and improved answer that is strictly grounded \
                 in the context. If the context does not contain the answer, say you are \
                 not sure instead of guessing."
            ),
            None => format!(
                "User question:\n{query}\n\n\
                 Relevant context:\n{context}\n\n\
                 Provide a helpful answer that is strictly grounded in the context above. \
                 If the context does not contain the information, say you are not sure."
            ),
        };

        let answer = self.llm.chat(SYSTEM_PROMPT, &user_prompt).await?;
        Ok(answer.trim().to_string())
    }
}
