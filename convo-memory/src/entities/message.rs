//! Message - One Conversational Turn
//!
//! `TigerStyle`: Immutable after creation. Chains change only by replacing
//! or inserting whole messages.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::{PromptMessage, PromptRole};

// =============================================================================
// Role / Type
// =============================================================================

/// Speaker of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// End user
    User,
    /// The agent
    Assistant,
    /// Instructions
    System,
    /// Tool output
    Tool,
}

impl MessageRole {
    /// Lowercase role name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }

    /// Whether a chain may start with this role.
    #[must_use]
    pub fn can_open_chain(&self) -> bool {
        matches!(self, Self::User | Self::System)
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of message content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Plain text
    #[default]
    Text,
    /// Assistant requested a tool
    ToolCall,
    /// Tool answered
    ToolResult,
    /// Error report
    Error,
    /// Replacement for an earlier message
    Correction,
}

// =============================================================================
// Message
// =============================================================================

/// One conversational turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// UUID v4 string
    pub id: String,
    /// Speaker
    pub role: MessageRole,
    /// Text
    pub content: String,
    /// Content kind
    #[serde(rename = "type", default)]
    pub message_type: MessageType,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Tool invoked or answering
    #[serde(default)]
    pub tool_name: Option<String>,
    /// Tool call correlation id
    #[serde(default)]
    pub tool_call_id: Option<String>,
    /// Tool arguments
    #[serde(default)]
    pub tool_parameters: Option<serde_json::Value>,
    /// Message this one corrects
    #[serde(default)]
    pub parent_message_id: Option<String>,
    /// Why the correction was made
    #[serde(default)]
    pub correction_reason: Option<String>,
}

impl Message {
    /// Text message with a fresh id.
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            message_type: MessageType::Text,
            timestamp: now,
            metadata: HashMap::new(),
            tool_name: None,
            tool_call_id: None,
            tool_parameters: None,
            parent_message_id: None,
            correction_reason: None,
        }
    }

    /// User text message.
    #[must_use]
    pub fn user(content: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self::new(MessageRole::User, content, now)
    }

    /// Assistant text message.
    #[must_use]
    pub fn assistant(content: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self::new(MessageRole::Assistant, content, now)
    }

    /// System text message.
    #[must_use]
    pub fn system(content: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self::new(MessageRole::System, content, now)
    }

    /// Tool result answering `tool_call_id`.
    #[must_use]
    pub fn tool_result(
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut message = Self::new(MessageRole::Tool, content, now);
        message.message_type = MessageType::ToolResult;
        message.tool_name = Some(tool_name.into());
        message.tool_call_id = Some(tool_call_id.into());
        message
    }

    /// Correction replacing `original`, linked through `parent_message_id`.
    ///
    /// The correction keeps the original's role.
    #[must_use]
    pub fn correction_of(
        original: &Message,
        content: impl Into<String>,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut message = Self::new(original.role, content, now);
        message.message_type = MessageType::Correction;
        message.parent_message_id = Some(original.id.clone());
        message.correction_reason = Some(reason.into());
        message
    }

    /// Override the generated id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Attach a tool call request.
    #[must_use]
    pub fn with_tool_call(
        mut self,
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        self.message_type = MessageType::ToolCall;
        self.tool_name = Some(tool_name.into());
        self.tool_call_id = Some(tool_call_id.into());
        self.tool_parameters = Some(parameters);
        self
    }

    /// Add a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Whether this message corrects another.
    #[must_use]
    pub fn is_correction(&self) -> bool {
        self.message_type == MessageType::Correction || self.parent_message_id.is_some()
    }

    /// `{role, content}` pair for a provider request.
    #[must_use]
    pub fn to_prompt_message(&self) -> PromptMessage {
        let role = match self.role {
            MessageRole::User => PromptRole::User,
            MessageRole::Assistant => PromptRole::Assistant,
            MessageRole::System => PromptRole::System,
            MessageRole::Tool => PromptRole::Tool,
        };
        PromptMessage::new(role, self.content.clone())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview: String = self.content.chars().take(50).collect();
        write!(f, "[{}] {preview}", self.role.as_str().to_uppercase())
    }
}
