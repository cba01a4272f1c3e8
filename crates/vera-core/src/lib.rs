//! Vera Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout the vera
//! pipeline:
//! - Document and retrieval result types
//! - Common error types
//! - The `LlmClient` trait implemented by provider adapters
//! - Configuration management

pub mod config;

pub use config::{AppConfig, ConfigError, LlmConfig, LlmProvider, LoggingConfig, PathsConfig, RagConfig};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for vera operations
#[derive(Error, Debug)]
pub enum VeraError {
    #[error("no usable documents found in {dir}")]
    EmptyCorpus { dir: String },

    #[error("index files not found at {path}; run `vera build-index` first")]
    IndexNotFound { path: String },

    #[error("index is corrupt: {0}")]
    IndexCorrupt(String),

    #[error("embedding error: {0}")]
    EmbeddingError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, VeraError>;

// ============================================================================
// Document Models
// ============================================================================

/// A retrievable unit of content. One indexed file, whole, no sub-document
/// splitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Ordinal id, assigned at index-build time in discovery order
    pub id: usize,

    /// Source file name, unique within an index
    pub filename: String,

    /// Full text content (newlines flattened to spaces when persisted)
    pub text: String,
}

impl Document {
    pub fn new(id: usize, filename: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id,
            filename: filename.into(),
            text: text.into(),
        }
    }
}

/// A document returned by retrieval, carrying its similarity score and,
/// after the guardrail stage, a relevance judgment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: usize,
    pub filename: String,
    pub text: String,

    /// Cosine similarity against the query embedding
    pub score: f32,

    /// Relevance score from the guardrail agent, in [0, 1]. `None` until
    /// the guardrail stage has run; set on every chunk it scores, even
    /// ones it filters out.
    pub guardrail_score: Option<f32>,
}

impl RetrievedChunk {
    pub fn from_document(doc: &Document, score: f32) -> Self {
        Self {
            id: doc.id,
            filename: doc.filename.clone(),
            text: doc.text.clone(),
            score,
            guardrail_score: None,
        }
    }
}

// ============================================================================
// Pipeline Result
// ============================================================================

/// Final outcome of one query through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    /// The question as asked
    pub query: String,

    /// Last answer produced by the generator
    pub answer: String,

    /// Last factual-consistency score from the evaluator, in [0, 1]
    pub score: f32,

    /// Evaluator's explanation of the score
    pub explanation: String,

    /// Number of generate/evaluate round trips taken (1-based)
    pub attempts: u32,

    /// Context chunks the final answer was generated from
    pub used_chunks: Vec<RetrievedChunk>,
}

// ============================================================================
// Traits
// ============================================================================

/// Trait for chat-completion LLM clients
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a system + user message pair, return the assistant reply.
    async fn chat(&self, system: &str, user: &str) -> Result<String>;
}

// ============================================================================
// Tests
// ============================================================================
