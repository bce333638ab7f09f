//! In-process Backend Chat Client
//!
//! Answers with canned replies and can be told to fail or stall. Backs the
//! `mock` backend kind and the test suites.

use crate::core::backend::{
    ChatBackend, ConversationPatch, SendMessageRequest, SendMessageResponse,
};
use crate::core::error::BackendError;
use crate::core::models::{new_id, Conversation, Message, Mode};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Default)]
struct MockState {
    conversations: Vec<Conversation>,
    fail_list: Option<String>,
    fail_send: Option<String>,
    fail_delete: Option<String>,
    fail_update: Option<String>,
    assigned_id: Option<String>,
    latency: Duration,
    sent: Vec<SendMessageRequest>,
    deleted: Vec<String>,
    list_calls: usize,
}

#[derive(Default)]
pub struct MockChatBackend {
    state: Mutex<MockState>,
}

impl MockChatBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Conversations returned by `list_conversations`
    pub fn with_conversations(self, conversations: Vec<Conversation>) -> Self {
        self.lock().conversations = conversations;
        self
    }

    /// Delay applied to every send and listing, to keep calls in flight
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = latency;
        self
    }

    /// Reply with this conversation id regardless of the one sent
    pub fn assigning_id(self, id: impl Into<String>) -> Self {
        self.lock().assigned_id = Some(id.into());
        self
    }

    pub fn fail_list(&self, cause: Option<&str>) {
        self.lock().fail_list = cause.map(str::to_string);
    }

    pub fn fail_sends(&self, cause: Option<&str>) {
        self.lock().fail_send = cause.map(str::to_string);
    }

    pub fn fail_deletes(&self, cause: Option<&str>) {
        self.lock().fail_delete = cause.map(str::to_string);
    }

    pub fn fail_updates(&self, cause: Option<&str>) {
        self.lock().fail_update = cause.map(str::to_string);
    }

    /// Every send request received, in arrival order
    pub fn sent_requests(&self) -> Vec<SendMessageRequest> {
        self.lock().sent.clone()
    }

    pub fn deleted_ids(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // Poisoned only by a panicking test
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn reply_for(request: &SendMessageRequest) -> String {
        match request.mode {
            Mode::Normal => format!("You said: {}", request.message),
            Mode::Deepthink => format!("After careful thought about \"{}\": it depends.", request.message),
            Mode::Research => format!("Here is what I found about \"{}\".", request.message),
        }
    }
}

#[async_trait]
impl ChatBackend for MockChatBackend {
    async fn list_conversations(&self) -> Result<Vec<Conversation>, BackendError> {
        let latency = {
            let mut state = self.lock();
            state.list_calls += 1;
            state.latency
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let state = self.lock();
        if let Some(cause) = &state.fail_list {
            return Err(BackendError::Rejected(cause.clone()));
        }
        Ok(state.conversations.clone())
    }

    async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<SendMessageResponse, BackendError> {
        let latency = {
            let mut state = self.lock();
            state.sent.push(request.clone());
            state.latency
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let state = self.lock();
        if let Some(cause) = &state.fail_send {
            tracing::debug!("[MockChatBackend] Rejecting send: {}", cause);
            return Err(BackendError::Rejected(cause.clone()));
        }

        let conversation_id = state
            .assigned_id
            .clone()
            .or_else(|| request.conversation_id.clone())
            .unwrap_or_else(new_id);

        Ok(SendMessageResponse {
            message: Message::assistant(Self::reply_for(&request), Utc::now()),
            conversation_id,
        })
    }

    async fn create_conversation(
        &self,
        title: Option<String>,
    ) -> Result<Conversation, BackendError> {
        let mut conversation = Conversation::new("New Conversation", Utc::now());
        if let Some(title) = title {
            conversation.title = title;
            conversation.title_explicit = true;
        }
        self.lock().conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn delete_conversation(&self, id: &str) -> Result<(), BackendError> {
        let mut state = self.lock();
        if let Some(cause) = &state.fail_delete {
            return Err(BackendError::Rejected(cause.clone()));
        }
        state.conversations.retain(|c| c.id != id);
        state.deleted.push(id.to_string());
        Ok(())
    }

    async fn update_conversation(
        &self,
        id: &str,
        patch: ConversationPatch,
    ) -> Result<Conversation, BackendError> {
        let mut state = self.lock();
        if let Some(cause) = &state.fail_update {
            return Err(BackendError::Rejected(cause.clone()));
        }

        let now = Utc::now();
        let index = match state.conversations.iter().position(|c| c.id == id) {
            Some(index) => index,
            None => {
                let mut fresh = Conversation::new("New Conversation", now);
                fresh.id = id.to_string();
                state.conversations.push(fresh);
                state.conversations.len() - 1
            }
        };
        let conversation = &mut state.conversations[index];

        if let Some(title) = patch.title {
            conversation.title = title;
            conversation.title_explicit = true;
        }
        if let Some(mode) = patch.mode {
            conversation.mode = mode;
        }
        conversation.updated_at = now;
        Ok(conversation.clone())
    }
}
