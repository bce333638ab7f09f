//! Send Pipeline - optimistic send of one user message
//!
//! Information Hiding:
//! - Target resolution and the optimistic append happen in one store step
//! - The backend round-trip runs on its own task, keyed by the captured id
//! - Failures land in the store's `last_error`, never in the caller's lap

use crate::actors::store_actor::ConversationStore;
use crate::core::backend::{ChatBackend, SendMessageRequest};
use crate::core::error::{BackendError, SendRejected};
use crate::core::models::{ConversationId, Message, Mode};
use crate::core::validation::validate_message;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// How the backend leg of a send ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Assistant reply appended to the conversation
    Delivered(Message),
    /// Backend failed; `last_error` carries the cause
    Failed(String),
    /// The conversation disappeared while the reply was in flight
    Discarded,
}

/// A send whose user message is already visible
pub struct PendingSend {
    pub conversation_id: ConversationId,
    pub user_message: Message,
    /// The conversation was created for this send
    pub created_conversation: bool,
    task: JoinHandle<SendOutcome>,
}

impl PendingSend {
    pub async fn wait(self) -> SendOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("[SendPipeline] Send task failed: {}", e);
                SendOutcome::Failed(e.to_string())
            }
        }
    }
}

#[derive(Clone)]
pub struct SendPipeline {
    store: ConversationStore,
    backend: Arc<dyn ChatBackend>,
    max_message_length: usize,
}

impl SendPipeline {
    pub fn new(
        store: ConversationStore,
        backend: Arc<dyn ChatBackend>,
        max_message_length: usize,
    ) -> Self {
        Self {
            store,
            backend,
            max_message_length,
        }
    }

    /// Send `text` into `conversation_id`, or into the current conversation
    /// when `None` (creating one if nothing is selected).
    ///
    /// Returns once the user message has been appended and the typing flag
    /// is up. Rejections happen before any state change.
    pub async fn send_message(
        &self,
        conversation_id: Option<&str>,
        text: &str,
        mode: Mode,
    ) -> Result<PendingSend, SendRejected> {
        let content = validate_message(text, self.max_message_length)?;

        let ticket = self
            .store
            .begin_send(conversation_id.map(str::to_string), content, mode)
            .await?;

        tracing::debug!(
            "[SendPipeline] Sending into '{}' (mode {})",
            ticket.conversation_id,
            ticket.mode
        );

        let request = SendMessageRequest {
            message: ticket.user_message.content.clone(),
            conversation_id: Some(ticket.remote_id.clone()),
            mode: ticket.mode,
        };

        let task = tokio::spawn(resolve_send(
            self.store.clone(),
            Arc::clone(&self.backend),
            ticket.conversation_id.clone(),
            request,
        ));

        Ok(PendingSend {
            conversation_id: ticket.conversation_id,
            user_message: ticket.user_message,
            created_conversation: ticket.created,
            task,
        })
    }

    /// `send_message` followed by waiting for the backend leg
    pub async fn send_and_wait(
        &self,
        conversation_id: Option<&str>,
        text: &str,
        mode: Mode,
    ) -> Result<SendOutcome, SendRejected> {
        let pending = self.send_message(conversation_id, text, mode).await?;
        Ok(pending.wait().await)
    }
}

async fn resolve_send(
    store: ConversationStore,
    backend: Arc<dyn ChatBackend>,
    conversation_id: ConversationId,
    request: SendMessageRequest,
) -> SendOutcome {
    // Own task so a panicking backend still ends in `fail_send`
    let call = tokio::spawn(async move { backend.send_message(request).await });
    let result = match call.await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("[SendPipeline] Backend call for '{}' panicked: {}", conversation_id, e);
            Err(BackendError::Transport(format!("backend call panicked: {}", e)))
        }
    };

    match result {
        Ok(response) => {
            let reply = response.message.clone();
            match store
                .complete_send(conversation_id.clone(), response.message, response.conversation_id)
                .await
            {
                Ok(true) => SendOutcome::Delivered(reply),
                Ok(false) => {
                    tracing::debug!(
                        "[SendPipeline] Conversation '{}' is gone, dropping reply",
                        conversation_id
                    );
                    SendOutcome::Discarded
                }
                Err(e) => {
                    tracing::debug!("[SendPipeline] Store unavailable for reply: {}", e);
                    SendOutcome::Discarded
                }
            }
        }
        Err(e) => {
            let cause = e.to_string();
            tracing::warn!(
                "[SendPipeline] Backend send for '{}' failed: {}",
                conversation_id,
                cause
            );
            match store.fail_send(conversation_id, cause.clone()).await {
                Ok(true) => SendOutcome::Failed(cause),
                _ => SendOutcome::Discarded,
            }
        }
    }
}
