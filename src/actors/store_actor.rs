//! Conversation Store Actor
//!
//! Information Hiding:
//! - The collection lives inside one task and is never shared
//! - Each message is applied, persisted and published before it is answered
//! - Backend calls happen on the handle side, outside the actor

use crate::actors::messages::{LoadStart, StoreMessage};
use crate::config::EngineConfig;
use crate::core::backend::{ChatBackend, ConversationPatch};
use crate::core::error::{EngineError, SendRejected, StoreError};
use crate::core::models::{Conversation, ConversationId, Message, Mode};
use crate::core::state::{DeletedConversation, Dirty, SendTicket, StoreSnapshot, StoreState};
use crate::storage::{keys, StorageAdapter};
use std::sync::Arc;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::sync::{oneshot, watch};

/// Cloneable handle to a running conversation store
#[derive(Clone)]
pub struct ConversationStore {
    sender: Sender<StoreMessage>,
    snapshots: watch::Receiver<StoreSnapshot>,
    backend: Arc<dyn ChatBackend>,
}

impl ConversationStore {
    /// Spawn the store actor. Must be called inside a tokio runtime.
    pub fn new(
        config: EngineConfig,
        storage: StorageAdapter,
        backend: Arc<dyn ChatBackend>,
        buffer_size: usize,
    ) -> Self {
        let (sender, receiver) = channel(buffer_size.max(1));
        let state = StoreState::new(config);
        let (publisher, snapshots) = watch::channel(state.snapshot());

        let actor = StoreActor {
            state,
            storage,
            publisher,
        };
        tokio::spawn(actor.run(receiver));

        Self {
            sender,
            snapshots,
            backend,
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> StoreMessage,
    ) -> Result<T, StoreError> {
        let (respond, response) = oneshot::channel();
        self.sender
            .send(build(respond))
            .await
            .map_err(|_| StoreError::Disposed)?;
        response.await.map_err(|_| StoreError::Disposed)
    }

    /// Latest published state. Reflects every operation that has returned.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Notified after every applied operation
    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.snapshots.clone()
    }

    /// Restore persisted conversations, falling back to the backend listing.
    /// A load that arrives while another is running returns the current state.
    pub async fn load_initial_state(&self) -> Result<StoreSnapshot, StoreError> {
        let (conversations, current) = match self
            .request(|respond| StoreMessage::BeginLoad { respond })
            .await?
        {
            LoadStart::Coalesced => {
                tracing::debug!("[ConversationStore] Load already running, ignoring");
                return Ok(self.snapshot());
            }
            LoadStart::Started {
                conversations,
                current,
            } => (conversations, current),
        };

        let (result, fetched) = match conversations {
            Some(persisted) => (Ok(persisted), false),
            None => match self.backend.list_conversations().await {
                Ok(listed) => {
                    tracing::info!(
                        "[ConversationStore] Fetched {} conversations from backend",
                        listed.len()
                    );
                    (Ok(listed), true)
                }
                Err(e) => {
                    tracing::warn!("[ConversationStore] Listing conversations failed: {}", e);
                    (Err(e.to_string()), false)
                }
            },
        };

        self.request(|respond| StoreMessage::FinishLoad {
            result,
            persisted_current: current,
            fetched,
            respond,
        })
        .await
    }

    pub async fn create_conversation(
        &self,
        initial_title: Option<&str>,
    ) -> Result<ConversationId, StoreError> {
        let title = initial_title.map(str::to_string);
        self.request(|respond| StoreMessage::Create { title, respond })
            .await
    }

    /// Returns false (and changes nothing) for unknown ids
    pub async fn select_conversation(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        self.request(|respond| StoreMessage::Select { id, respond })
            .await
    }

    /// Delete locally, then tell the backend. A backend failure is reported
    /// through `last_error`; the local deletion stands.
    pub async fn delete_conversation(
        &self,
        id: &str,
    ) -> Result<Option<DeletedConversation>, StoreError> {
        let id = id.to_string();
        let deleted = self
            .request(|respond| StoreMessage::Delete { id, respond })
            .await?;

        if let Some(deleted) = &deleted {
            if let Err(e) = self.backend.delete_conversation(&deleted.remote_id).await {
                tracing::warn!(
                    "[ConversationStore] Backend delete of '{}' failed: {}",
                    deleted.id,
                    e
                );
                self.raise_error(EngineError::DeleteFailure {
                    conversation_id: deleted.id.clone(),
                    cause: e.to_string(),
                })
                .await?;
            }
        }

        Ok(deleted)
    }

    /// Returns false when the conversation does not exist
    pub async fn append_message(
        &self,
        conversation_id: &str,
        message: Message,
    ) -> Result<bool, StoreError> {
        let conversation_id = conversation_id.to_string();
        self.request(|respond| StoreMessage::Append {
            conversation_id,
            message,
            respond,
        })
        .await
    }

    /// Set an explicit title; an empty title goes back to the derived one
    pub async fn rename_conversation(&self, id: &str, title: &str) -> Result<bool, StoreError> {
        let conversation_id = id.to_string();
        let remote_id = self
            .request(|respond| StoreMessage::Rename {
                id: conversation_id.clone(),
                title: title.to_string(),
                respond,
            })
            .await?;

        let Some(remote_id) = remote_id else {
            return Ok(false);
        };

        let patch = ConversationPatch {
            title: self
                .snapshot()
                .conversation(&conversation_id)
                .map(|c| c.title.clone()),
            mode: None,
        };
        self.push_update(conversation_id, remote_id, patch).await?;
        Ok(true)
    }

    pub async fn set_mode(&self, id: &str, mode: Mode) -> Result<bool, StoreError> {
        let conversation_id = id.to_string();
        let remote_id = self
            .request(|respond| StoreMessage::SetMode {
                id: conversation_id.clone(),
                mode,
                respond,
            })
            .await?;

        let Some(remote_id) = remote_id else {
            return Ok(false);
        };

        let patch = ConversationPatch {
            title: None,
            mode: Some(mode),
        };
        self.push_update(conversation_id, remote_id, patch).await?;
        Ok(true)
    }

    pub async fn clear_error(&self) -> Result<(), StoreError> {
        self.request(|respond| StoreMessage::ClearError { respond })
            .await
    }

    /// Stop the actor. Later calls fail with `StoreError::Disposed`.
    pub async fn dispose(&self) -> Result<(), StoreError> {
        self.sender
            .send(StoreMessage::Shutdown)
            .await
            .map_err(|_| StoreError::Disposed)
    }

    pub(crate) async fn begin_send(
        &self,
        target: Option<ConversationId>,
        content: String,
        mode: Mode,
    ) -> Result<SendTicket, SendRejected> {
        self.request(|respond| StoreMessage::BeginSend {
            target,
            content,
            mode,
            respond,
        })
        .await?
    }

    pub(crate) async fn complete_send(
        &self,
        conversation_id: ConversationId,
        reply: Message,
        backend_conversation_id: ConversationId,
    ) -> Result<bool, StoreError> {
        self.request(|respond| StoreMessage::CompleteSend {
            conversation_id,
            reply,
            backend_conversation_id,
            respond,
        })
        .await
    }

    pub(crate) async fn fail_send(
        &self,
        conversation_id: ConversationId,
        cause: String,
    ) -> Result<bool, StoreError> {
        self.request(|respond| StoreMessage::FailSend {
            conversation_id,
            cause,
            respond,
        })
        .await
    }

    async fn raise_error(&self, error: EngineError) -> Result<(), StoreError> {
        self.request(|respond| StoreMessage::RaiseError { error, respond })
            .await
    }

    async fn push_update(
        &self,
        conversation_id: ConversationId,
        remote_id: ConversationId,
        patch: ConversationPatch,
    ) -> Result<(), StoreError> {
        if let Err(e) = self.backend.update_conversation(&remote_id, patch).await {
            tracing::warn!(
                "[ConversationStore] Backend update of '{}' failed: {}",
                conversation_id,
                e
            );
            self.raise_error(EngineError::UpdateFailure {
                conversation_id,
                cause: e.to_string(),
            })
            .await?;
        }
        Ok(())
    }
}

struct StoreActor {
    state: StoreState,
    storage: StorageAdapter,
    publisher: watch::Sender<StoreSnapshot>,
}

impl StoreActor {
    async fn run(mut self, mut receiver: Receiver<StoreMessage>) {
        tracing::info!("[StoreActor] Started with {} storage", self.storage.backend_name());

        while let Some(message) = receiver.recv().await {
            if !self.handle(message).await {
                tracing::info!("[StoreActor] Received shutdown signal");
                break;
            }
        }

        tracing::info!("[StoreActor] Stopped");
    }

    /// Apply one message. Returns false on shutdown.
    async fn handle(&mut self, message: StoreMessage) -> bool {
        match message {
            StoreMessage::BeginLoad { respond } => {
                let start = if self.state.begin_load() {
                    let conversations = self
                        .storage
                        .get::<Vec<Conversation>>(keys::CONVERSATIONS)
                        .await;
                    let current = self
                        .storage
                        .get::<ConversationId>(keys::CURRENT_CONVERSATION_ID)
                        .await;
                    LoadStart::Started {
                        conversations,
                        current,
                    }
                } else {
                    LoadStart::Coalesced
                };
                self.commit(Dirty::NONE).await;
                let _ = respond.send(start);
            }
            StoreMessage::FinishLoad {
                result,
                persisted_current,
                fetched,
                respond,
            } => {
                let dirty = self.state.finish_load(result, persisted_current, fetched);
                self.commit(dirty).await;
                tracing::info!(
                    "[StoreActor] Load finished ({:?}) with {} conversations",
                    self.state.phase(),
                    self.state.len()
                );
                let _ = respond.send(self.state.snapshot());
            }
            StoreMessage::Create { title, respond } => {
                let (id, dirty) = self.state.create(title);
                self.commit(dirty).await;
                let _ = respond.send(id);
            }
            StoreMessage::Select { id, respond } => {
                let (selected, dirty) = self.state.select(&id);
                self.commit(dirty).await;
                let _ = respond.send(selected);
            }
            StoreMessage::Delete { id, respond } => {
                let (deleted, dirty) = self.state.delete(&id);
                self.commit(dirty).await;
                let _ = respond.send(deleted);
            }
            StoreMessage::Append {
                conversation_id,
                message,
                respond,
            } => {
                let (appended, dirty) = self.state.append(&conversation_id, message);
                self.commit(dirty).await;
                let _ = respond.send(appended);
            }
            StoreMessage::BeginSend {
                target,
                content,
                mode,
                respond,
            } => {
                let (ticket, dirty) = self.state.begin_send(target, content, mode);
                self.commit(dirty).await;
                let _ = respond.send(ticket);
            }
            StoreMessage::CompleteSend {
                conversation_id,
                reply,
                backend_conversation_id,
                respond,
            } => {
                let (delivered, dirty) =
                    self.state
                        .complete_send(&conversation_id, reply, backend_conversation_id);
                self.commit(dirty).await;
                let _ = respond.send(delivered);
            }
            StoreMessage::FailSend {
                conversation_id,
                cause,
                respond,
            } => {
                let surfaced = self.state.fail_send(&conversation_id, cause);
                self.commit(Dirty::NONE).await;
                let _ = respond.send(surfaced);
            }
            StoreMessage::Rename { id, title, respond } => {
                let (remote_id, dirty) = self.state.rename(&id, &title);
                self.commit(dirty).await;
                let _ = respond.send(remote_id);
            }
            StoreMessage::SetMode { id, mode, respond } => {
                let (found, dirty) = self.state.set_mode(&id, mode);
                self.commit(dirty).await;
                let remote_id = found
                    .then(|| self.state.get(&id).map(|c| c.remote_id().to_string()))
                    .flatten();
                let _ = respond.send(remote_id);
            }
            StoreMessage::RaiseError { error, respond } => {
                self.state.raise(error);
                self.commit(Dirty::NONE).await;
                let _ = respond.send(());
            }
            StoreMessage::ClearError { respond } => {
                self.state.clear_error();
                self.commit(Dirty::NONE).await;
                let _ = respond.send(());
            }
            StoreMessage::Shutdown => return false,
        }
        true
    }

    /// Persist if anything durable changed, then publish the new snapshot
    async fn commit(&mut self, dirty: Dirty) {
        if dirty.any() {
            self.storage
                .set(keys::CONVERSATIONS, &self.state.persisted_conversations())
                .await;
            match self.state.current_id() {
                Some(id) => self.storage.set(keys::CURRENT_CONVERSATION_ID, id).await,
                None => self.storage.remove(keys::CURRENT_CONVERSATION_ID).await,
            }
            tracing::debug!(
                "[StoreActor] Persisted {} conversations",
                self.state.len()
            );
        }
        self.publisher.send_replace(self.state.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mock::MockChatBackend;
    use crate::core::state::LoadPhase;
    use crate::storage::memory::InMemoryStorage;
    use chrono::Utc;
    use std::time::Duration;

    fn store_with(storage: StorageAdapter, backend: Arc<MockChatBackend>) -> ConversationStore {
        ConversationStore::new(EngineConfig::default(), storage, backend, 16)
    }

    #[tokio::test]
    async fn test_create_persists_collection_and_selection() {
        let storage = StorageAdapter::in_memory();
        let store = store_with(storage.clone(), Arc::new(MockChatBackend::new()));

        let id = store.create_conversation(None).await.unwrap();

        let persisted: Vec<Conversation> = storage.get(keys::CONVERSATIONS).await.unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].id, id);
        let current: String = storage.get(keys::CURRENT_CONVERSATION_ID).await.unwrap();
        assert_eq!(current, id);
        assert_eq!(store.snapshot().current_conversation_id, Some(id));
    }

    #[tokio::test]
    async fn test_load_prefers_persisted_state() {
        let storage = StorageAdapter::in_memory();
        let mut saved = Conversation::new("New Conversation", Utc::now());
        saved.title = "From disk".to_string();
        storage.set(keys::CONVERSATIONS, &vec![saved.clone()]).await;
        storage.set(keys::CURRENT_CONVERSATION_ID, &saved.id).await;

        let backend = Arc::new(MockChatBackend::new());
        backend.fail_list(Some("must not be called"));
        let store = store_with(storage, backend);

        let snapshot = store.load_initial_state().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.current().unwrap().title, "From disk");
        assert!(snapshot.last_error.is_none());
        assert!(!snapshot.is_loading);
    }

    #[tokio::test]
    async fn test_load_falls_back_to_backend_and_saves() {
        let storage = StorageAdapter::in_memory();
        let seeded = Conversation::new("New Conversation", Utc::now());
        let backend = Arc::new(MockChatBackend::new().with_conversations(vec![seeded.clone()]));
        let store = store_with(storage.clone(), backend);

        let snapshot = store.load_initial_state().await.unwrap();
        assert_eq!(snapshot.len(), 1);

        let persisted: Vec<Conversation> = storage.get(keys::CONVERSATIONS).await.unwrap();
        assert_eq!(persisted[0].id, seeded.id);
    }

    #[tokio::test]
    async fn test_overlapping_loads_list_backend_once() {
        let seeded = Conversation::new("New Conversation", Utc::now());
        let backend = Arc::new(
            MockChatBackend::new()
                .with_conversations(vec![seeded.clone()])
                .with_latency(Duration::from_millis(50)),
        );
        let store = store_with(StorageAdapter::in_memory(), backend.clone());

        let (first, second) = tokio::join!(store.load_initial_state(), store.load_initial_state());
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(backend.list_calls(), 1);
        assert_eq!(first.phase, LoadPhase::Ready);
        assert_eq!(first.len(), 1);
        assert!(second.is_loading);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.phase, LoadPhase::Ready);
        assert!(snapshot.conversation(&seeded.id).is_some());
    }

    #[tokio::test]
    async fn test_load_failure_leaves_usable_empty_state() {
        let backend = Arc::new(MockChatBackend::new());
        backend.fail_list(Some("503"));
        let store = store_with(StorageAdapter::in_memory(), backend);

        let snapshot = store.load_initial_state().await.unwrap();
        assert!(snapshot.is_empty());
        assert!(!snapshot.is_loading);
        assert!(matches!(
            snapshot.last_error,
            Some(EngineError::LoadFailure { .. })
        ));

        let id = store.create_conversation(None).await.unwrap();
        assert_eq!(store.snapshot().current_conversation_id, Some(id));
    }

    #[tokio::test]
    async fn test_delete_failure_keeps_local_deletion() {
        let backend = Arc::new(MockChatBackend::new());
        backend.fail_deletes(Some("gone fishing"));
        let store = store_with(StorageAdapter::in_memory(), backend);

        let doomed = store.create_conversation(None).await.unwrap();
        let deleted = store.delete_conversation(&doomed).await.unwrap().unwrap();

        let snapshot = store.snapshot();
        assert!(snapshot.conversation(&doomed).is_none());
        assert_eq!(snapshot.current_conversation_id, deleted.selected);
        assert!(matches!(
            snapshot.last_error,
            Some(EngineError::DeleteFailure { ref conversation_id, .. }) if *conversation_id == doomed
        ));
    }

    #[tokio::test]
    async fn test_delete_unknown_does_not_call_backend() {
        let backend = Arc::new(MockChatBackend::new());
        let store = store_with(StorageAdapter::in_memory(), Arc::clone(&backend));

        assert!(store.delete_conversation("ghost").await.unwrap().is_none());
        assert!(backend.deleted_ids().is_empty());
    }

    #[tokio::test]
    async fn test_rename_pushes_title_to_backend() {
        let backend = Arc::new(MockChatBackend::new());
        backend.fail_updates(Some("read-only"));
        let store = store_with(StorageAdapter::in_memory(), backend);

        let id = store.create_conversation(None).await.unwrap();
        assert!(store.rename_conversation(&id, "Taxes 2024").await.unwrap());

        let snapshot = store.snapshot();
        assert_eq!(snapshot.conversation(&id).unwrap().title, "Taxes 2024");
        assert!(matches!(snapshot.last_error, Some(EngineError::UpdateFailure { .. })));

        assert!(!store.rename_conversation("ghost", "x").await.unwrap());
    }

    #[tokio::test]
    async fn test_subscribers_see_selection_changes() {
        let store = store_with(StorageAdapter::in_memory(), Arc::new(MockChatBackend::new()));
        let first = store.create_conversation(None).await.unwrap();
        let _second = store.create_conversation(None).await.unwrap();

        let mut updates = store.subscribe();
        updates.borrow_and_update();
        assert!(store.select_conversation(&first).await.unwrap());

        updates.changed().await.unwrap();
        assert_eq!(
            updates.borrow().current_conversation_id.as_deref(),
            Some(first.as_str())
        );
    }

    #[tokio::test]
    async fn test_storage_failures_do_not_break_operations() {
        let storage = StorageAdapter::new(Arc::new(InMemoryStorage::new().with_quota(4)));
        let store = store_with(storage.clone(), Arc::new(MockChatBackend::new()));

        let id = store.create_conversation(Some("Unsaved")).await.unwrap();
        assert!(store.snapshot().conversation(&id).is_some());
        assert!(storage.get::<Vec<Conversation>>(keys::CONVERSATIONS).await.is_none());
    }

    #[tokio::test]
    async fn test_dispose_stops_the_store() {
        let store = store_with(StorageAdapter::in_memory(), Arc::new(MockChatBackend::new()));
        store.dispose().await.unwrap();

        // Give the actor a moment to drain
        tokio::task::yield_now().await;
        let err = store.create_conversation(None).await.unwrap_err();
        assert_eq!(err, StoreError::Disposed);
    }
}
