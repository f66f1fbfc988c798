//! Core traits for oracle backends.
//!
//! This module defines the `OracleBackend` trait - the seam between the
//! triage pipeline and whatever text-completion service classifies complaints.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Error types for oracle calls.
///
/// Every variant counts as "oracle unavailable" for retry purposes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OracleError {
    /// Backend is not available
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),

    /// No answer within the hard timeout
    #[error("Oracle timed out after {0}ms")]
    Timeout(u64),

    /// Credentials rejected
    #[error("Oracle authentication failed: {0}")]
    Authentication(String),

    /// Rate limited by the backend
    #[error("Rate limited, retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    /// Request failed
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The transport envelope could not be decoded
    #[error("Malformed oracle response: {0}")]
    MalformedResponse(String),
}

/// Core trait for oracle backends.
#[async_trait]
pub trait OracleBackend: Send + Sync {
    /// Get the backend identifier (the model name, used as the result version tag).
    fn id(&self) -> &str;

    /// Check if the backend is currently reachable.
    async fn is_available(&self) -> bool;

    /// Generate a completion.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, OracleError>;
}

/// Request for a completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// System instruction
    pub system_prompt: Option<String>,
    /// User content
    pub user_prompt: String,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature (0.0-2.0)
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    /// Create a new request with a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            user_prompt: content.into(),
            ..Default::default()
        }
    }

    /// Add a system prompt.
    pub fn with_system(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set max tokens.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set temperature.
    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp.clamp(0.0, 2.0));
        self
    }
}

/// Response from a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated content
    pub content: String,
    /// Token usage
    pub usage: Usage,
}

/// Token usage information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,
    /// Tokens in the completion
    pub completion_tokens: u32,
}

impl Usage {
    /// Get total tokens.
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder_clamps_temperature() {
        let request = CompletionRequest::user("hello")
            .with_system("be brief")
            .with_max_tokens(500)
            .with_temperature(3.5);

        assert_eq!(request.system_prompt.as_deref(), Some("be brief"));
        assert_eq!(request.max_tokens, Some(500));
        assert_eq!(request.temperature, Some(2.0));
    }
}
