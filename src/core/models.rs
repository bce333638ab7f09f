//! Conversation entities
//!
//! Messages are immutable once built. Conversations are append-only; the only
//! code that mutates them lives in the store reducer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type ConversationId = String;
pub type MessageId = String;

/// Fresh opaque identifier
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Per-conversation hint forwarded to the backend on each send
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Normal,
    Deepthink,
    Research,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Normal => write!(f, "normal"),
            Mode::Deepthink => write!(f, "deepthink"),
            Mode::Research => write!(f, "research"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(Mode::Normal),
            "deepthink" => Ok(Mode::Deepthink),
            "research" => Ok(Mode::Research),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub content: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
    /// Only ever set on snapshot copies; never persisted
    #[serde(skip)]
    pub pending: bool,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            content: content.into(),
            role,
            timestamp,
            pending: false,
        }
    }

    pub fn user(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(Role::User, content, timestamp)
    }

    pub fn assistant(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(Role::Assistant, content, timestamp)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    /// Set when the title came from the caller rather than from derivation
    #[serde(default)]
    pub title_explicit: bool,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub mode: Mode,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Id the backend knows this conversation by, when it differs from ours
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_id: Option<ConversationId>,
}

impl Conversation {
    pub fn new(placeholder_title: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            title: placeholder_title.to_string(),
            title_explicit: false,
            messages: Vec::new(),
            mode: Mode::Normal,
            created_at: now,
            updated_at: now,
            backend_id: None,
        }
    }

    /// The id to use when talking to the backend about this conversation
    pub fn remote_id(&self) -> &str {
        self.backend_id.as_deref().unwrap_or(&self.id)
    }

    pub fn has_user_message(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::User)
    }

    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Whether the conversation has reached the configured message limit.
    /// The store does not act on this; collaborators decide the overflow policy.
    pub fn is_full(&self, max_messages: usize) -> bool {
        self.messages.len() >= max_messages
    }
}
