//! End-to-end pipeline tests over a real on-disk index, with stub
//! embedding and chat providers.

use async_trait::async_trait;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use vera_core::{LlmClient, PathsConfig, RagConfig, Result, VeraError};
use vera_index::{EmbeddingClient, IndexStore, Retriever};
use vera_rag::{EvaluatorAgent, GeneratorAgent, GuardrailAgent, SelfCorrectingPipeline};

/// Deterministic embedder: hashes words into buckets, so overlapping
/// texts score positive cosine similarity.
struct WordHashEmbedding;

#[async_trait]
impl EmbeddingClient for WordHashEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; 16];
                for word in text
                    .to_lowercase()
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                {
                    let mut h: usize = 0;
                    for b in word.bytes() {
                        h = h.wrapping_mul(31).wrapping_add(b as usize);
                    }
                    v[h % 16] += 1.0;
                }
                v
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        16
    }
}

/// One stub serving all three agent roles, dispatching on prompt shape
/// the way a single configured provider would.
struct StubLlm {
    guardrail_reply: String,
    answer_reply: String,
    verdict_reply: String,
}

impl StubLlm {
    fn new(guardrail: &str, answer: &str, verdict: &str) -> Self {
        Self {
            guardrail_reply: guardrail.to_string(),
            answer_reply: answer.to_string(),
            verdict_reply: verdict.to_string(),
        }
    }
}

#[async_trait]
impl LlmClient for StubLlm {
    async fn chat(&self, _system: &str, user: &str) -> Result<String> {
        if user.contains("Relevance score (0.0-1.0):") {
            Ok(self.guardrail_reply.clone())
        } else if user.contains("Candidate answer:") {
            Ok(self.verdict_reply.clone())
        } else {
            Ok(self.answer_reply.clone())
        }
    }
}

fn corpus(dir: &TempDir, docs: &[(&str, &str)]) -> PathsConfig {
    let paths = PathsConfig {
        docs_dir: dir.path().join("docs"),
        index_dir: dir.path().join("state"),
    };
    fs::create_dir_all(&paths.docs_dir).unwrap();
    for (name, content) in docs {
        fs::write(paths.docs_dir.join(name), content).unwrap();
    }
    paths
}

fn pipeline(paths: PathsConfig, llm: Arc<dyn LlmClient>, config: RagConfig) -> SelfCorrectingPipeline {
    let retriever = Retriever::new(IndexStore::new(paths), Arc::new(WordHashEmbedding));
    SelfCorrectingPipeline::new(
        retriever,
        GuardrailAgent::new(llm.clone(), config.guardrail_threshold),
        GeneratorAgent::new(llm.clone()),
        EvaluatorAgent::new(llm),
        config,
    )
}

#[tokio::test]
async fn answers_from_a_built_index() {
    let dir = TempDir::new().unwrap();
    let paths = corpus(&dir, &[("a.txt", "Paris is the capital of France.")]);

    let count = IndexStore::new(paths.clone())
        .build(&WordHashEmbedding)
        .await
        .unwrap();
    assert_eq!(count, 1);

    let llm = Arc::new(StubLlm::new(
        "0.9",
        "Paris.",
        r#"{"score": 0.95, "explanation": "directly supported"}"#,
    ));
    let pipeline = pipeline(paths, llm, RagConfig::default());

    let result = pipeline.run("What is the capital of France?").await.unwrap();

    assert_eq!(result.answer, "Paris.");
    assert_eq!(result.attempts, 1);
    assert_eq!(result.score, 0.95);
    assert_eq!(result.used_chunks.len(), 1);
    assert_eq!(result.used_chunks[0].filename, "a.txt");
    assert_eq!(result.used_chunks[0].guardrail_score, Some(0.9));
    assert!(result.used_chunks[0].score > 0.3);
}

#[tokio::test]
async fn guardrail_dropping_everything_falls_back_to_full_retrieval() {
    let dir = TempDir::new().unwrap();
    let paths = corpus(
        &dir,
        &[
            ("a.txt", "Paris is the capital of France."),
            ("b.txt", "Berlin is the capital of Germany."),
        ],
    );
    IndexStore::new(paths.clone())
        .build(&WordHashEmbedding)
        .await
        .unwrap();

    // Every relevance score lands below the 0.6 threshold
    let llm = Arc::new(StubLlm::new(
        "0.2",
        "Not sure.",
        r#"{"score": 0.8, "explanation": "honest"}"#,
    ));
    let pipeline = pipeline(paths, llm, RagConfig::default());

    let result = pipeline.run("capital of France?").await.unwrap();

    // The unfiltered retrieval is used, scores still recorded
    assert_eq!(result.used_chunks.len(), 2);
    assert!(result
        .used_chunks
        .iter()
        .all(|c| c.guardrail_score == Some(0.2)));
}

#[tokio::test]
async fn low_scores_exhaust_the_retry_budget() {
    let dir = TempDir::new().unwrap();
    let paths = corpus(&dir, &[("a.txt", "Paris is the capital of France.")]);
    IndexStore::new(paths.clone())
        .build(&WordHashEmbedding)
        .await
        .unwrap();

    let llm = Arc::new(StubLlm::new(
        "0.9",
        "an answer",
        r#"{"score": 0.5, "explanation": "ok"}"#,
    ));
    let config = RagConfig::default();
    assert_eq!(config.max_self_correct_steps, 2);
    let pipeline = pipeline(paths, llm, config);

    let result = pipeline.run("capital of France?").await.unwrap();

    assert_eq!(result.attempts, 2);
    assert_eq!(result.score, 0.5);
}

#[tokio::test]
async fn query_before_build_is_index_not_found() {
    let dir = TempDir::new().unwrap();
    let paths = PathsConfig {
        docs_dir: dir.path().join("docs"),
        index_dir: dir.path().join("state"),
    };

    let llm = Arc::new(StubLlm::new("0.9", "x", r#"{"score": 0.9, "explanation": "x"}"#));
    let pipeline = pipeline(paths, llm, RagConfig::default());

    let err = pipeline.run("anything").await.unwrap_err();
    assert!(matches!(err, VeraError::IndexNotFound { .. }));
}

#[tokio::test]
async fn retrieval_ranks_the_matching_document_first() {
    let dir = TempDir::new().unwrap();
    let paths = corpus(
        &dir,
        &[
            ("cooking.txt", "Bread needs flour water salt and yeast."),
            ("geography.txt", "Paris is the capital of France."),
        ],
    );
    IndexStore::new(paths.clone())
        .build(&WordHashEmbedding)
        .await
        .unwrap();

    let llm = Arc::new(StubLlm::new(
        "0.9",
        "Paris.",
        r#"{"score": 0.9, "explanation": "good"}"#,
    ));
    let pipeline = pipeline(paths, llm, RagConfig { top_k: 1, ..RagConfig::default() });

    let result = pipeline.run("What is the capital of France?").await.unwrap();
    assert_eq!(result.used_chunks.len(), 1);
    assert_eq!(result.used_chunks[0].filename, "geography.txt");
}
