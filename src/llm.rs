//! LLM client abstraction and Anthropic API implementation.
//!
//! The language model is the intent resolver's oracle: it receives a fixed
//! instruction set plus the user's utterance and answers with a best-effort
//! JSON guess. Nothing it returns is trusted until [`crate::schema::validate`]
//! accepts it.
//!
//! - [`AnthropicClient`]: production client for Anthropic's Messages API
//! - [`MockLlmClient`]: test double for unit tests

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default model used when `INVENTORY_LLM_MODEL` is not set.
pub const DEFAULT_MODEL: &str = "claude-haiku-4-5";

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The ANTHROPIC_API_KEY environment variable is not set.
    #[error("ANTHROPIC_API_KEY environment variable not set")]
    MissingApiKey,

    /// HTTP or network error occurred.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Failed to parse the API response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Model returned no text content.
    #[error("Model returned empty response")]
    EmptyResponse,
}

// ============================================================================
// Completion Type
// ============================================================================

/// The result of a successful LLM completion request.
#[derive(Debug, Clone)]
pub struct Completion {
    /// The generated text from the model.
    pub text: String,
}

// ============================================================================
// LlmClient Trait
// ============================================================================

/// Generic interface for LLM clients.
///
/// Supports simple system+user prompt completion with text response.
/// Output is unconstrained and may be malformed; callers own all parsing.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a completion given a system prompt and user message.
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, LlmError>;
}

// ============================================================================
// Anthropic API Implementation
// ============================================================================

/// Client for the Anthropic Claude API.
///
/// Sampling temperature is pinned to `0.0` so identical input and
/// configuration produce the same guess as far as the service allows.
pub struct AnthropicClient {
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

impl AnthropicClient {
    /// Create a new client from the environment.
    ///
    /// Reads `ANTHROPIC_API_KEY` (required) and `INVENTORY_LLM_MODEL`
    /// (optional, defaults to [`DEFAULT_MODEL`]).
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::MissingApiKey`] if the API key is not set.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| LlmError::MissingApiKey)?;
        let client = Self::new(api_key);
        Ok(match std::env::var("INVENTORY_LLM_MODEL") {
            Ok(model) if !model.trim().is_empty() => client.with_model(model.trim()),
            _ => client,
        })
    }

    /// Create a new client with an explicit API key and default settings.
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 512,
            temperature: 0.0,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, LlmError> {
        let request_body = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: system.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: user.to_string(),
            }],
        };

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let text = api_response
            .content
            .into_iter()
            .map(|block| block.text)
            .find(|text| !text.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)?;

        Ok(Completion { text })
    }
}

// ============================================================================
// Mock Implementation (Test Only)
// ============================================================================

/// Mock LLM client for testing. Returns pre-programmed responses in FIFO order
/// and records every prompt it was given.
#[cfg(test)]
pub struct MockLlmClient {
    /// Pre-programmed responses to return in FIFO order.
    pub responses: std::sync::Mutex<std::collections::VecDeque<String>>,
    /// `(system, user)` pairs received so far.
    pub prompts: std::sync::Mutex<Vec<(String, String)>>,
}

#[cfg(test)]
impl MockLlmClient {
    /// Create a new mock client with a sequence of responses.
    ///
    /// Once the responses run out, [`complete`](LlmClient::complete) fails
    /// with [`LlmError::Http`], standing in for an unreachable service.
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
            prompts: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[cfg(test)]
#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, LlmError> {
        self.prompts
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string()));

        let text = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::Http("MockLlmClient: no more responses".into()))?;

        Ok(Completion { text })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env_missing_key() {
        // SAFETY: This test runs serially and no other thread reads ANTHROPIC_API_KEY concurrently.
        unsafe { std::env::remove_var("ANTHROPIC_API_KEY") };

        let result = AnthropicClient::from_env();
        assert!(matches!(result, Err(LlmError::MissingApiKey)));
    }

    #[test]
    fn test_new_defaults() {
        let client = AnthropicClient::new("key".into());
        assert_eq!(client.model(), DEFAULT_MODEL);
        assert_eq!(client.temperature, 0.0);

        let client = client.with_model("claude-sonnet-4-5");
        assert_eq!(client.model(), "claude-sonnet-4-5");
    }

    #[test]
    fn test_request_serializes_temperature() {
        let body = AnthropicRequest {
            model: DEFAULT_MODEL.into(),
            max_tokens: 16,
            temperature: 0.0,
            system: "sys".into(),
            messages: vec![Message {
                role: "user".into(),
                content: "hi".into(),
            }],
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["temperature"], 0.0);
        assert_eq!(value["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn test_mock_returns_responses_in_order() {
        let mock = MockLlmClient::new(vec!["first".to_string(), "second".to_string()]);

        let completion1 = mock.complete("sys", "user").await.unwrap();
        assert_eq!(completion1.text, "first");

        let completion2 = mock.complete("sys", "user").await.unwrap();
        assert_eq!(completion2.text, "second");

        assert!(matches!(
            mock.complete("sys", "user").await,
            Err(LlmError::Http(_))
        ));
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn test_mock_records_prompts() {
        let mock = MockLlmClient::new(vec!["ok".to_string()]);
        mock.complete("You are a parser.", "show all products")
            .await
            .unwrap();

        let prompts = mock.prompts.lock().unwrap();
        assert_eq!(prompts[0].0, "You are a parser.");
        assert_eq!(prompts[0].1, "show all products");
    }
}
