//! LLM Provider Trait - Generation Contract for Scoring and Repair
//!
//! `TigerStyle`: Simulation-first provider abstraction.
//!
//! The model-based evaluator asks a provider for numeric ratings and the
//! self-correction loop asks it for rewritten responses. Both depend only on
//! [`LLMProvider`]; concrete backends are supplied by the embedding
//! application.
//!
//! ```text
//! LLMProvider (trait)
//! └── SimLLMProvider   (deterministic, wraps DST SimLLM)
//! ```

mod sim;

pub use sim::SimLLMProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::constants::{CHAIN_CHARS_PER_TOKEN_ESTIMATE, LLM_PROMPT_BYTES_MAX};

// =============================================================================
// Error Types
// =============================================================================

/// Error returned by any generation provider.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Request timed out
    #[error("Request timed out")]
    Timeout,

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after_secs:?}s")]
    RateLimit {
        /// Seconds until the limit resets, if known
        retry_after_secs: Option<u64>,
    },

    /// Prompt too long for the provider
    #[error("Context length exceeded: {tokens} tokens")]
    ContextOverflow {
        /// Estimated prompt tokens
        tokens: usize,
    },

    /// Provider returned something unusable
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// What was wrong
        message: String,
    },

    /// Provider is down
    #[error("Service unavailable: {message}")]
    ServiceUnavailable {
        /// Reason
        message: String,
    },

    /// Credentials rejected
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Response body could not be decoded
    #[error("JSON error: {message}")]
    JsonError {
        /// Decoder message
        message: String,
    },

    /// Transport failure
    #[error("Network error: {message}")]
    NetworkError {
        /// Transport message
        message: String,
    },

    /// Request rejected before sending
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// What was invalid
        message: String,
    },
}

impl ProviderError {
    /// Rate limit error.
    #[must_use]
    pub fn rate_limit(retry_after_secs: Option<u64>) -> Self {
        Self::RateLimit { retry_after_secs }
    }

    /// Context overflow error.
    #[must_use]
    pub fn context_overflow(tokens: usize) -> Self {
        Self::ContextOverflow { tokens }
    }

    /// Invalid response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Service unavailable error.
    #[must_use]
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
        }
    }

    /// Invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::RateLimit { .. }
                | Self::ServiceUnavailable { .. }
                | Self::NetworkError { .. }
        )
    }
}

// =============================================================================
// Request / Response
// =============================================================================

/// Speaker of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    /// Instructions
    System,
    /// End user
    User,
    /// Model output
    Assistant,
    /// Tool output
    Tool,
}

impl PromptRole {
    /// Lowercase role name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// One `{role, content}` pair sent to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Speaker
    pub role: PromptRole,
    /// Text
    pub content: String,
}

impl PromptMessage {
    /// Create a prompt message.
    #[must_use]
    pub fn new(role: PromptRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Request for a completion.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Conversation sent to the provider, system message first if any
    pub messages: Vec<PromptMessage>,
    /// Maximum tokens to generate (provider default if None)
    pub max_tokens: Option<usize>,
    /// Temperature in [0, 1] (provider default if None)
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    /// Request holding a single user message.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![PromptMessage::new(PromptRole::User, prompt)],
            max_tokens: None,
            temperature: None,
        }
    }

    /// Set or replace the leading system message.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        let message = PromptMessage::new(PromptRole::System, system);
        match self.messages.first_mut() {
            Some(first) if first.role == PromptRole::System => *first = message,
            _ => self.messages.insert(0, message),
        }
        self
    }

    /// Set maximum tokens to generate.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set temperature.
    ///
    /// # Panics
    /// Panics if temperature is not in [0.0, 1.0].
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        assert!(
            (0.0..=1.0).contains(&temperature),
            "temperature must be in [0.0, 1.0]"
        );
        self.temperature = Some(temperature);
        self
    }

    /// The system message, if any.
    #[must_use]
    pub fn system(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.role == PromptRole::System)
            .map(|m| m.content.as_str())
    }

    /// All message contents joined by blank lines.
    #[must_use]
    pub fn prompt_text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Total content bytes.
    #[must_use]
    pub fn prompt_bytes(&self) -> usize {
        self.messages.iter().map(|m| m.content.len()).sum()
    }

    /// Check the request before it is sent.
    ///
    /// # Errors
    /// `InvalidRequest` if there is no non-empty content, `ContextOverflow`
    /// if the prompt exceeds `LLM_PROMPT_BYTES_MAX`.
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.messages.iter().all(|m| m.content.trim().is_empty()) {
            return Err(ProviderError::invalid_request("prompt must not be empty"));
        }
        let bytes = self.prompt_bytes();
        if bytes > LLM_PROMPT_BYTES_MAX {
            return Err(ProviderError::context_overflow(estimate_tokens(bytes)));
        }
        Ok(())
    }
}

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt
    pub prompt_tokens: usize,
    /// Tokens generated
    pub completion_tokens: usize,
}

impl TokenUsage {
    /// Prompt plus completion tokens.
    #[must_use]
    pub fn total(&self) -> usize {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A provider's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResponse {
    /// Generated text
    pub content: String,
    /// Model that produced it
    pub model: String,
    /// Token accounting
    pub usage: TokenUsage,
}

/// Rough token estimate from a byte count.
#[must_use]
pub fn estimate_tokens(bytes: usize) -> usize {
    bytes.div_ceil(CHAIN_CHARS_PER_TOKEN_ESTIMATE)
}

// =============================================================================
// Provider Trait
// =============================================================================

/// Text-generation backend.
///
/// Any conforming implementation is interchangeable; callers treat every
/// error as recoverable.
#[async_trait]
pub trait LLMProvider: Send + Sync + std::fmt::Debug {
    /// Complete a request.
    ///
    /// # Errors
    /// Returns `ProviderError` on any failure.
    async fn complete(&self, request: &CompletionRequest)
        -> Result<CompletionResponse, ProviderError>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;

    /// Whether this is a simulation provider.
    fn is_simulation(&self) -> bool;
}

// =============================================================================
// Tests
// =============================================================================
