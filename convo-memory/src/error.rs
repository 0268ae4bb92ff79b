//! Memory Errors
//!
//! `TigerStyle`: One error type at the public surface. Only `NotFound` on a
//! direct id lookup reaches callers in normal operation; provider failures
//! and capacity pressure are absorbed below this layer.

use thiserror::Error;

use crate::config::ConfigError;
use crate::entities::ChainError;
use crate::llm::ProviderError;
use crate::storage::StorageError;

/// Errors from memory operations.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Malformed block or message input
    #[error("validation error: {message}")]
    Validation {
        /// What was wrong
        message: String,
    },

    /// Unknown block or session id
    #[error("{kind} not found: {id}")]
    NotFound {
        /// `block`, `session`, or `message`
        kind: &'static str,
        /// Id that was looked up
        id: String,
    },

    /// Generation call failure
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Storage failure other than not-found or validation
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// Message chain integrity failure
    #[error("chain error: {0}")]
    Chain(ChainError),

    /// Invalid configuration
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl MemoryError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a block-not-found error.
    #[must_use]
    pub fn block_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "block",
            id: id.into(),
        }
    }

    /// Whether retrying may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_retryable(),
            Self::Storage(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Whether this is a not-found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<StorageError> for MemoryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { id } => Self::block_not_found(id),
            StorageError::Validation { message } => Self::Validation { message },
            other => Self::Storage(other),
        }
    }
}

impl From<ChainError> for MemoryError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::NotFound { message_id } => Self::NotFound {
                kind: "message",
                id: message_id,
            },
            other => Self::Chain(other),
        }
    }
}

/// Result type for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
