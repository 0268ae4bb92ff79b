//! MessageChain - Ordered Per-Session Message History
//!
//! `TigerStyle`: One `RwLock` guards every session list and the id index, so
//! append, remove, rollback, insert, and replace are atomic with respect to
//! each other. Ingestion and correction both mutate the chain concurrently.
//!
//! Invariants:
//! - every indexed id is present in exactly one session list
//! - every listed message is indexed

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use super::message::{Message, MessageRole};
use crate::constants::CHAIN_CHARS_PER_TOKEN_ESTIMATE;

// =============================================================================
// Errors
// =============================================================================

/// Chain operation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// Message id is not in the chain (or not in the given session)
    #[error("message not found: {message_id}")]
    NotFound {
        /// Missing id
        message_id: String,
    },

    /// Message id is already indexed
    #[error("duplicate message id: {message_id}")]
    Duplicate {
        /// Duplicate id
        message_id: String,
    },

    /// A session violates an ordering or role rule
    #[error("chain integrity violated in session {session_id}: {reason}")]
    Integrity {
        /// Offending session
        session_id: String,
        /// First violation found
        reason: String,
    },
}

impl ChainError {
    /// Not found error.
    #[must_use]
    pub fn not_found(message_id: impl Into<String>) -> Self {
        Self::NotFound {
            message_id: message_id.into(),
        }
    }

    /// Duplicate id error.
    #[must_use]
    pub fn duplicate(message_id: impl Into<String>) -> Self {
        Self::Duplicate {
            message_id: message_id.into(),
        }
    }

    /// Integrity error.
    #[must_use]
    pub fn integrity(session_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Integrity {
            session_id: session_id.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Summary
// =============================================================================

/// Statistics for one session's chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainSummary {
    /// Messages in the session
    pub total_messages: usize,
    /// Messages per role name
    pub role_counts: BTreeMap<String, usize>,
    /// Timestamp of the first message
    pub first_message: Option<DateTime<Utc>>,
    /// Timestamp of the last message
    pub last_message: Option<DateTime<Utc>>,
    /// Seconds between first and last message
    pub duration_seconds: f64,
}

// =============================================================================
// MessageChain
// =============================================================================

#[derive(Debug, Default)]
struct ChainState {
    sessions: HashMap<String, Vec<Message>>,
    /// message id -> owning session
    index: HashMap<String, String>,
}

impl ChainState {
    fn position(&self, session_id: &str, message_id: &str) -> Result<usize, ChainError> {
        if self.index.get(message_id).map(String::as_str) != Some(session_id) {
            return Err(ChainError::not_found(message_id));
        }
        self.sessions
            .get(session_id)
            .and_then(|list| list.iter().position(|m| m.id == message_id))
            .ok_or_else(|| ChainError::not_found(message_id))
    }
}

/// Per-session ordered message lists plus an id index.
#[derive(Debug, Default)]
pub struct MessageChain {
    state: RwLock<ChainState>,
}

impl MessageChain {
    /// Empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to a session. Returns the message id.
    ///
    /// # Errors
    /// `Duplicate` if the id is already present in any session.
    pub fn add_message(&self, session_id: &str, message: Message) -> Result<String, ChainError> {
        let mut state = self.state.write();
        if state.index.contains_key(&message.id) {
            return Err(ChainError::duplicate(&message.id));
        }

        let id = message.id.clone();
        state.index.insert(id.clone(), session_id.to_string());
        state
            .sessions
            .entry(session_id.to_string())
            .or_default()
            .push(message);
        Ok(id)
    }

    /// Remove a message wherever it lives. Returns whether it existed.
    pub fn remove_message(&self, message_id: &str) -> bool {
        let mut state = self.state.write();
        let Some(session_id) = state.index.remove(message_id) else {
            return false;
        };
        if let Some(list) = state.sessions.get_mut(&session_id) {
            list.retain(|m| m.id != message_id);
        }
        true
    }

    /// Look up a message by id.
    #[must_use]
    pub fn get(&self, message_id: &str) -> Option<Message> {
        let state = self.state.read();
        let session_id = state.index.get(message_id)?;
        state
            .sessions
            .get(session_id)?
            .iter()
            .find(|m| m.id == message_id)
            .cloned()
    }

    /// Snapshot of a session's messages in order.
    #[must_use]
    pub fn messages(&self, session_id: &str) -> Vec<Message> {
        self.state
            .read()
            .sessions
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of messages in a session.
    #[must_use]
    pub fn len(&self, session_id: &str) -> usize {
        self.state
            .read()
            .sessions
            .get(session_id)
            .map_or(0, Vec::len)
    }

    /// Whether the session holds no messages.
    #[must_use]
    pub fn is_empty(&self, session_id: &str) -> bool {
        self.len(session_id) == 0
    }

    /// Truncate the session after `message_id`. Returns the dropped
    /// messages, oldest first.
    ///
    /// # Errors
    /// `NotFound` if the message is not in this session.
    pub fn rollback_to(
        &self,
        session_id: &str,
        message_id: &str,
    ) -> Result<Vec<Message>, ChainError> {
        let mut state = self.state.write();
        let position = state.position(session_id, message_id)?;

        let removed: Vec<Message> = state
            .sessions
            .get_mut(session_id)
            .map(|list| list.split_off(position + 1))
            .unwrap_or_default();
        for message in &removed {
            state.index.remove(&message.id);
        }
        Ok(removed)
    }

    /// Check ordering, indexing, and the opening role of a session.
    ///
    /// # Errors
    /// `Integrity` naming the first violation.
    pub fn validate_chain(&self, session_id: &str) -> Result<(), ChainError> {
        let state = self.state.read();
        let Some(list) = state.sessions.get(session_id) else {
            return Ok(());
        };

        if let Some(first) = list.first() {
            if !first.role.can_open_chain() {
                return Err(ChainError::integrity(
                    session_id,
                    format!("first message {} has role {}", first.id, first.role),
                ));
            }
        }

        let mut previous: Option<&Message> = None;
        for message in list {
            if state.index.get(&message.id).map(String::as_str) != Some(session_id) {
                return Err(ChainError::integrity(
                    session_id,
                    format!("message {} is not indexed", message.id),
                ));
            }
            if let Some(prev) = previous {
                if message.timestamp < prev.timestamp {
                    return Err(ChainError::integrity(
                        session_id,
                        format!("message {} is older than {}", message.id, prev.id),
                    ));
                }
            }
            previous = Some(message);
        }
        Ok(())
    }

    /// Newest messages fitting in `max_tokens`, returned oldest first.
    ///
    /// Tokens are estimated at `CHAIN_CHARS_PER_TOKEN_ESTIMATE` chars each.
    /// Stops at the first message that does not fit.
    #[must_use]
    pub fn context_window(&self, session_id: &str, max_tokens: usize) -> Vec<Message> {
        let char_limit = max_tokens.saturating_mul(CHAIN_CHARS_PER_TOKEN_ESTIMATE);
        let state = self.state.read();
        let Some(list) = state.sessions.get(session_id) else {
            return Vec::new();
        };

        let mut total_chars = 0usize;
        let mut window: Vec<Message> = Vec::new();
        for message in list.iter().rev() {
            let chars = message.content.chars().count();
            if total_chars + chars > char_limit {
                break;
            }
            total_chars += chars;
            window.push(message.clone());
        }
        window.reverse();
        window
    }

    /// Insert `message` directly after `after_id` in the session.
    ///
    /// # Errors
    /// `NotFound` if `after_id` is not in this session, `Duplicate` if the new
    /// id is already indexed.
    pub fn insert_message_after(
        &self,
        session_id: &str,
        after_id: &str,
        message: Message,
    ) -> Result<(), ChainError> {
        let mut state = self.state.write();
        let position = state.position(session_id, after_id)?;
        if state.index.contains_key(&message.id) {
            return Err(ChainError::duplicate(&message.id));
        }

        state
            .index
            .insert(message.id.clone(), session_id.to_string());
        if let Some(list) = state.sessions.get_mut(session_id) {
            list.insert(position + 1, message);
        }
        Ok(())
    }

    /// Replace `message_id` in place with `message`.
    ///
    /// # Errors
    /// `NotFound` if the target is not in this session, `Duplicate` if the
    /// replacement id belongs to another message.
    pub fn replace_message(
        &self,
        session_id: &str,
        message_id: &str,
        message: Message,
    ) -> Result<(), ChainError> {
        let mut state = self.state.write();
        let position = state.position(session_id, message_id)?;
        if message.id != message_id && state.index.contains_key(&message.id) {
            return Err(ChainError::duplicate(&message.id));
        }

        state.index.remove(message_id);
        state
            .index
            .insert(message.id.clone(), session_id.to_string());
        if let Some(list) = state.sessions.get_mut(session_id) {
            list[position] = message;
        }
        Ok(())
    }

    /// Summary statistics for a session.
    #[must_use]
    pub fn chain_summary(&self, session_id: &str) -> ChainSummary {
        let state = self.state.read();
        let list = state
            .sessions
            .get(session_id)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut role_counts: BTreeMap<String, usize> = BTreeMap::new();
        for message in list {
            *role_counts.entry(message.role.as_str().to_string()).or_insert(0) += 1;
        }

        let first = list.first().map(|m| m.timestamp);
        let last = list.last().map(|m| m.timestamp);
        #[allow(clippy::cast_precision_loss)]
        let duration_seconds = match (first, last) {
            (Some(a), Some(b)) => (b - a).num_milliseconds() as f64 / 1000.0,
            _ => 0.0,
        };

        ChainSummary {
            total_messages: list.len(),
            role_counts,
            first_message: first,
            last_message: last,
            duration_seconds,
        }
    }

    /// Drop a session and its index entries. Returns messages dropped.
    pub fn clear_session(&self, session_id: &str) -> usize {
        let mut state = self.state.write();
        let Some(list) = state.sessions.remove(session_id) else {
            return 0;
        };
        for message in &list {
            state.index.remove(&message.id);
        }
        list.len()
    }

    /// Sessions with at least one message, sorted.
    #[must_use]
    pub fn sessions(&self) -> Vec<String> {
        let mut sessions: Vec<String> = self
            .state
            .read()
            .sessions
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        sessions.sort();
        sessions
    }

    /// Whether the first message of a session may open a chain.
    #[must_use]
    pub fn opens_with(&self, session_id: &str, role: MessageRole) -> bool {
        self.state
            .read()
            .sessions
            .get(session_id)
            .and_then(|list| list.first())
            .is_some_and(|m| m.role == role)
    }
}
