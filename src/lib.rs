//! Chatkeep - client-held conversation store for chat applications
//!
//! This library keeps a bounded set of conversations, sends messages through
//! an asynchronous backend with optimistic local updates, and persists the
//! collection and UI preferences across sessions.

pub mod actors;
pub mod config;
pub mod core;
pub mod preferences;
pub mod storage;
pub mod utils;

pub mod cli;

pub use actors::{ConversationStore, PendingSend, SendOutcome, SendPipeline};
pub use config::Settings;
pub use core::backend::ChatBackend;
pub use core::error::{BackendError, EngineError, SendRejected, StoreError, ValidationError};
pub use core::models::{Conversation, ConversationId, Message, MessageId, Mode, Role};
pub use core::state::{LoadPhase, StoreSnapshot};
pub use preferences::{Language, Page, PreferenceStore, PreferencesPatch, Theme, UiPreferences};
pub use storage::StorageAdapter;

use crate::config::BackendKind;
use crate::core::http::HttpChatBackend;
use crate::core::mock::MockChatBackend;
use std::sync::Arc;

/// Everything a chat client needs, wired together
pub struct Engine {
    store: ConversationStore,
    pipeline: SendPipeline,
    preferences: PreferenceStore,
    storage: StorageAdapter,
}

impl Engine {
    /// Open the configured storage and spawn the store.
    /// Must be called inside a tokio runtime.
    pub async fn new(settings: &Settings, backend: Arc<dyn ChatBackend>) -> Self {
        let storage = StorageAdapter::open(&settings.storage).await;
        Self::with_storage(settings, storage, backend)
    }

    pub fn with_storage(
        settings: &Settings,
        storage: StorageAdapter,
        backend: Arc<dyn ChatBackend>,
    ) -> Self {
        let store = ConversationStore::new(
            settings.engine.clone(),
            storage.clone(),
            Arc::clone(&backend),
            settings.system.channel_buffer_size,
        );
        let pipeline = SendPipeline::new(
            store.clone(),
            backend,
            settings.engine.max_message_length,
        );
        let preferences =
            PreferenceStore::new(storage.clone(), settings.ui.mobile_breakpoint_px);

        tracing::info!(
            "[Engine] Ready with {} storage",
            storage.backend_name()
        );

        Self {
            store,
            pipeline,
            preferences,
            storage,
        }
    }

    /// Build the backend named in the settings
    pub fn backend_from_settings(settings: &Settings) -> Result<Arc<dyn ChatBackend>, BackendError> {
        Ok(match settings.backend.kind {
            BackendKind::Mock => Arc::new(MockChatBackend::new()),
            BackendKind::Http => Arc::new(HttpChatBackend::new(&settings.backend)?),
        })
    }

    /// Restore conversations and preferences
    pub async fn load_initial_state(&self) -> Result<(StoreSnapshot, UiPreferences), StoreError> {
        let snapshot = self.store.load_initial_state().await?;
        let preferences = self.preferences.load().await;
        Ok((snapshot, preferences))
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn pipeline(&self) -> &SendPipeline {
        &self.pipeline
    }

    pub fn preferences(&self) -> &PreferenceStore {
        &self.preferences
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.snapshot()
    }

    /// Send into the current conversation, or into `conversation_id`
    pub async fn send_message(
        &self,
        conversation_id: Option<&str>,
        text: &str,
        mode: Mode,
    ) -> Result<PendingSend, SendRejected> {
        self.pipeline.send_message(conversation_id, text, mode).await
    }

    /// Wipe storage and go back to default preferences. In-memory
    /// conversations are untouched until the next mutation persists them.
    pub async fn reset(&self) -> UiPreferences {
        self.storage.clear().await;
        tracing::info!("[Engine] Storage cleared");
        self.preferences.reset().await
    }

    pub async fn dispose(&self) -> Result<(), StoreError> {
        tracing::info!("[Engine] Shutting down");
        self.store.dispose().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> (Arc<MockChatBackend>, Engine) {
        let backend = Arc::new(MockChatBackend::new());
        let engine = Engine::with_storage(
            &Settings::ephemeral(),
            StorageAdapter::in_memory(),
            backend.clone(),
        );
        (backend, engine)
    }

    #[tokio::test]
    async fn test_load_then_send() {
        let (_, engine) = engine();
        let (snapshot, prefs) = engine.load_initial_state().await.unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(prefs, UiPreferences::default());

        let pending = engine.send_message(None, "Hi", Mode::Normal).await.unwrap();
        assert!(matches!(pending.wait().await, SendOutcome::Delivered(_)));
        assert_eq!(engine.snapshot().current().unwrap().message_count(), 2);
    }

    #[tokio::test]
    async fn test_reset_restores_default_preferences() {
        let (_, engine) = engine();
        engine
            .preferences()
            .update(PreferencesPatch {
                theme: Some(Theme::Dark),
                ..PreferencesPatch::default()
            })
            .await;

        assert_eq!(engine.reset().await.theme, Theme::Light);
    }

    #[tokio::test]
    async fn test_dispose_stops_the_store() {
        let (_, engine) = engine();
        engine.dispose().await.unwrap();
        tokio::task::yield_now().await;

        let result = engine.store().create_conversation(None).await;
        assert_eq!(result, Err(StoreError::Disposed));
    }

    #[test]
    fn test_backend_from_settings_builds_http() {
        let mut settings = Settings::ephemeral();
        settings.backend.kind = BackendKind::Http;
        assert!(Engine::backend_from_settings(&settings).is_ok());
    }
}
