//! LLM client implementations
//!
//! Chat adapters for OpenAI-compatible APIs (OpenAI, Groq) and Ollama.
//! Transport failures surface as `CapabilityUnavailable`; the pipeline's
//! retry budget is for answer quality, not availability, so these are
//! never retried.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use vera_core::{LlmClient, LlmConfig, LlmProvider, Result, VeraError};

// ============================================================================
// OpenAI-compatible client
// ============================================================================

pub struct OpenAiCompatClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

impl OpenAiCompatClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| VeraError::CapabilityUnavailable(format!("http client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_ref()
            .ok_or_else(|| VeraError::ConfigError("API key required for chat provider".to_string()))?;

        Self::new(
            config.base_url.clone(),
            api_key.clone(),
            config.model.clone(),
            config.temperature,
            config.timeout_secs,
        )
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| VeraError::CapabilityUnavailable(format!("chat request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(VeraError::LlmError(format!("chat provider error: {error_text}")));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| VeraError::LlmError(format!("failed to parse chat response: {e}")))?;

        result
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| VeraError::LlmError("no response generated".to_string()))
    }
}

// ============================================================================
// Ollama client
// ============================================================================

pub struct OllamaChatClient {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: Message,
}

impl OllamaChatClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(config.ollama_url.clone(), config.model.clone())
    }
}

#[async_trait]
impl LlmClient for OllamaChatClient {
    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let request = OllamaChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| VeraError::CapabilityUnavailable(format!("Ollama request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(VeraError::LlmError(format!("Ollama error: {error_text}")));
        }

        let result: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| VeraError::LlmError(format!("failed to parse Ollama response: {e}")))?;

        Ok(result.message.content.trim().to_string())
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create a chat client from config
pub fn create_llm_client(config: &LlmConfig) -> Result<Box<dyn LlmClient>> {
    match config.provider {
        LlmProvider::OpenAi => Ok(Box::new(OpenAiCompatClient::from_config(config)?)),
        LlmProvider::Ollama => Ok(Box::new(OllamaChatClient::from_config(config))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_compat_client_creation() {
        let client =
            OpenAiCompatClient::new("https://api.groq.com/openai/v1", "k", "llama-3.1-8b-instant", 0.2, 60)
                .unwrap();
        assert_eq!(client.model, "llama-3.1-8b-instant");
    }

    #[test]
    fn test_ollama_client_creation() {
        let client = OllamaChatClient::new("http://localhost:11434", "llama3");
        assert_eq!(client.model, "llama3");
    }

    #[test]
    fn test_from_config_requires_api_key() {
        let config = LlmConfig::default();
        assert!(OpenAiCompatClient::from_config(&config).is_err());
    }
}
