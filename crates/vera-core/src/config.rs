//! Vera Configuration Management
//!
//! Handles configuration from environment variables and config files
//! with sensible defaults for development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Corpus and index file locations
    pub paths: PathsConfig,

    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Retrieval and self-correction configuration
    pub rag: RagConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Paths
        if let Ok(dir) = std::env::var("VERA_DOCS_DIR") {
            config.paths.docs_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("VERA_INDEX_DIR") {
            config.paths.index_dir = PathBuf::from(dir);
        }

        // LLM
        if let Ok(provider) = std::env::var("VERA_LLM_PROVIDER") {
            config.llm.provider = provider.parse()?;
        }
        if let Ok(key) = std::env::var("VERA_API_KEY") {
            config.llm.api_key = Some(key);
        } else if let Ok(key) = std::env::var("GROQ_API_KEY") {
            // The default deployment talks to Groq's OpenAI-compatible API
            config.llm.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("VERA_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            config.llm.ollama_url = url;
        }
        if let Ok(model) = std::env::var("VERA_MODEL") {
            config.llm.model = model;
        }
        if let Ok(model) = std::env::var("VERA_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }

        // RAG
        if let Ok(k) = std::env::var("VERA_TOP_K") {
            config.rag.top_k = parse_value("VERA_TOP_K", &k)?;
        }
        if let Ok(t) = std::env::var("VERA_GUARDRAIL_THRESHOLD") {
            config.rag.guardrail_threshold = parse_value("VERA_GUARDRAIL_THRESHOLD", &t)?;
        }
        if let Ok(t) = std::env::var("VERA_EVAL_THRESHOLD") {
            config.rag.eval_threshold = parse_value("VERA_EVAL_THRESHOLD", &t)?;
        }
        if let Ok(n) = std::env::var("VERA_MAX_SELF_CORRECT_STEPS") {
            config.rag.max_self_correct_steps = parse_value("VERA_MAX_SELF_CORRECT_STEPS", &n)?;
        }

        // Logging
        if let Ok(level) = std::env::var("VERA_LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;

        if env_config.paths.docs_dir != PathsConfig::default().docs_dir {
            self.paths.docs_dir = env_config.paths.docs_dir;
        }
        if env_config.paths.index_dir != PathsConfig::default().index_dir {
            self.paths.index_dir = env_config.paths.index_dir;
        }

        // Always use env for sensitive values
        if env_config.llm.api_key.is_some() {
            self.llm.api_key = env_config.llm.api_key;
        }

        Ok(self)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Corpus and index file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory of `.txt` documents to index
    pub docs_dir: PathBuf,

    /// Directory the persisted index artifacts live in
    pub index_dir: PathBuf,
}

impl PathsConfig {
    /// Binary embedding matrix file
    pub fn matrix_path(&self) -> PathBuf {
        self.index_dir.join("index.vec")
    }

    /// Tab-separated document metadata file
    pub fn meta_path(&self) -> PathBuf {
        self.index_dir.join("index.meta.tsv")
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            docs_dir: PathBuf::from("data/docs"),
            index_dir: PathBuf::from("data"),
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// LLM provider to use
    pub provider: LlmProvider,

    /// API key for the OpenAI-compatible provider
    pub api_key: Option<String>,

    /// OpenAI-compatible API base URL
    pub base_url: String,

    /// Ollama server URL
    pub ollama_url: String,

    /// Chat model for generation, evaluation, and guardrail scoring
    pub model: String,

    /// Embedding model name
    pub embedding_model: String,

    /// Temperature for answer generation
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAi,
            api_key: None,
            base_url: "https://api.groq.com/openai/v1".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            model: "llama-3.1-8b-instant".to_string(),
            embedding_model: "nomic-embed-text-v1.5".to_string(),
            temperature: 0.2,
            timeout_secs: 60,
        }
    }
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAi,
    Ollama,
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            _ => Err(ConfigError::InvalidValue {
                key: "VERA_LLM_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Retrieval and self-correction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Number of documents to retrieve per query
    pub top_k: usize,

    /// Minimum guardrail relevance score to keep a chunk, in [0, 1]
    pub guardrail_threshold: f32,

    /// Minimum factual-consistency score to accept an answer, in [0, 1]
    pub eval_threshold: f32,

    /// Maximum generate/evaluate round trips per query
    pub max_self_correct_steps: u32,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            guardrail_threshold: 0.6,
            eval_threshold: 0.7,
            max_self_correct_steps: 2,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
