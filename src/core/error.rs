//! Error taxonomy
//!
//! Only `SendRejected` and `StoreError` cross the public API as `Err` values.
//! Everything the engine recovers from locally is surfaced as an `EngineError`
//! in the store's `last_error` slot instead.

use crate::core::models::ConversationId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("message is empty")]
    Empty,
    #[error("message is {length} characters long, the limit is {max}")]
    TooLong { length: usize, max: usize },
}

/// Value held in `last_error`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineError {
    #[error("failed to load conversations: {cause}")]
    LoadFailure { cause: String },
    #[error("failed to send message: {cause}")]
    SendFailure {
        conversation_id: ConversationId,
        cause: String,
    },
    #[error("conversation was deleted locally but the backend delete failed: {cause}")]
    DeleteFailure {
        conversation_id: ConversationId,
        cause: String,
    },
    #[error("conversation was updated locally but the backend update failed: {cause}")]
    UpdateFailure {
        conversation_id: ConversationId,
        cause: String,
    },
}

/// Failure reported by a Backend Chat Client
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode backend response: {0}")]
    Decode(String),
    #[error("{0}")]
    Rejected(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("conversation store has been disposed")]
    Disposed,
}

/// Reasons a send is refused before anything is appended
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendRejected {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("conversation {0} already has a message awaiting a reply")]
    Busy(ConversationId),
    #[error("conversation {0} does not exist")]
    UnknownConversation(ConversationId),
    #[error(transparent)]
    Store(#[from] StoreError),
}
