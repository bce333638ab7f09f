//! Conversation collection and its transitions
//!
//! `StoreState` is owned by the store actor and never shared. Every method is a
//! pure in-memory transition; persistence and notification happen in the actor
//! based on the returned `Dirty` flags.

use crate::config::EngineConfig;
use crate::core::error::{EngineError, SendRejected};
use crate::core::models::{Conversation, ConversationId, Message, Mode, Role};
use crate::core::validation::{derive_title, normalize_title};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPhase {
    #[default]
    Idle,
    Loading,
    Ready,
    /// Degraded to an empty but usable collection
    LoadFailed,
}

/// Which persisted keys a transition touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dirty {
    pub conversations: bool,
    pub selection: bool,
}

impl Dirty {
    pub const NONE: Dirty = Dirty {
        conversations: false,
        selection: false,
    };
    pub const ALL: Dirty = Dirty {
        conversations: true,
        selection: true,
    };

    pub fn conversations() -> Self {
        Self {
            conversations: true,
            selection: false,
        }
    }

    pub fn any(&self) -> bool {
        self.conversations || self.selection
    }

    fn merge(self, other: Dirty) -> Dirty {
        Dirty {
            conversations: self.conversations || other.conversations,
            selection: self.selection || other.selection,
        }
    }
}

/// Hands out strictly increasing timestamps
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Option<DateTime<Utc>>,
}

impl MonotonicClock {
    pub fn now(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.last = Some(now);
        now
    }

    /// Make sure later stamps sort after `instant`
    pub fn observe(&mut self, instant: DateTime<Utc>) {
        if self.last.map_or(true, |last| instant > last) {
            self.last = Some(instant);
        }
    }
}

/// Everything the send pipeline needs after the optimistic append
#[derive(Debug, Clone)]
pub struct SendTicket {
    pub conversation_id: ConversationId,
    /// Id to address the backend with
    pub remote_id: ConversationId,
    pub user_message: Message,
    pub mode: Mode,
    /// The conversation was created implicitly for this send
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedConversation {
    pub id: ConversationId,
    pub remote_id: ConversationId,
    /// Newly selected conversation, when the deleted one was current
    pub selected: Option<ConversationId>,
}

/// Read-only view published to observers
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    /// Most recently updated first
    pub conversations: Vec<Conversation>,
    pub current_conversation_id: Option<ConversationId>,
    pub phase: LoadPhase,
    pub is_loading: bool,
    pub is_typing: bool,
    pub last_error: Option<EngineError>,
}

impl StoreSnapshot {
    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn current(&self) -> Option<&Conversation> {
        self.current_conversation_id
            .as_deref()
            .and_then(|id| self.conversation(id))
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}

pub struct StoreState {
    conversations: HashMap<ConversationId, Conversation>,
    current: Option<ConversationId>,
    phase: LoadPhase,
    in_flight: HashSet<ConversationId>,
    last_error: Option<EngineError>,
    clock: MonotonicClock,
    config: EngineConfig,
}

impl StoreState {
    /// A `max_conversations` of zero is raised to one.
    pub fn new(mut config: EngineConfig) -> Self {
        if config.max_conversations == 0 {
            tracing::warn!("[StoreState] max_conversations of 0 raised to 1");
            config.max_conversations = 1;
        }
        Self {
            conversations: HashMap::new(),
            current: None,
            phase: LoadPhase::Idle,
            in_flight: HashSet::new(),
            last_error: None,
            clock: MonotonicClock::default(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn is_typing(&self) -> bool {
        !self.in_flight.is_empty()
    }

    pub fn last_error(&self) -> Option<&EngineError> {
        self.last_error.as_ref()
    }

    /// Conversations ordered by `updated_at` descending
    pub fn ordered(&self) -> Vec<&Conversation> {
        let mut ordered: Vec<&Conversation> = self.conversations.values().collect();
        ordered.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        ordered
    }

    /// Persisted form of the collection, recency order
    pub fn persisted_conversations(&self) -> Vec<Conversation> {
        self.ordered().into_iter().cloned().collect()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let conversations = self
            .ordered()
            .into_iter()
            .map(|conversation| {
                let mut view = conversation.clone();
                if self.in_flight.contains(&view.id) {
                    if let Some(last) = view.messages.iter_mut().rev().find(|m| m.role == Role::User) {
                        last.pending = true;
                    }
                }
                view
            })
            .collect();

        StoreSnapshot {
            conversations,
            current_conversation_id: self.current.clone(),
            phase: self.phase,
            is_loading: self.phase == LoadPhase::Loading,
            is_typing: self.is_typing(),
            last_error: self.last_error.clone(),
        }
    }

    /// Enter `Loading`. Returns false when a load is already running.
    pub fn begin_load(&mut self) -> bool {
        if self.phase == LoadPhase::Loading {
            return false;
        }
        self.phase = LoadPhase::Loading;
        true
    }

    /// Install a loaded collection, or degrade to an empty `LoadFailed` one.
    ///
    /// Conversations created while the load was running are kept and win over
    /// loaded entries with the same id. `fetched` marks collections that came
    /// from the backend rather than from storage and therefore need saving.
    pub fn finish_load(
        &mut self,
        result: Result<Vec<Conversation>, String>,
        persisted_current: Option<ConversationId>,
        fetched: bool,
    ) -> Dirty {
        let loaded = match result {
            Ok(loaded) => loaded,
            Err(cause) => {
                self.phase = LoadPhase::LoadFailed;
                self.last_error = Some(EngineError::LoadFailure { cause });
                return Dirty::NONE;
            }
        };

        let before = self.conversations.len();
        let loaded_count = loaded.len();
        for conversation in loaded {
            self.clock.observe(conversation.updated_at);
            self.clock.observe(conversation.created_at);
            self.conversations
                .entry(conversation.id.clone())
                .or_insert(conversation);
        }

        let mut dirty = if fetched {
            Dirty::conversations()
        } else {
            Dirty::NONE
        };

        if self.enforce_capacity() {
            dirty = dirty.merge(Dirty::ALL);
        }

        if self.current.is_none() {
            if let Some(id) = persisted_current {
                if self.conversations.contains_key(&id) {
                    self.current = Some(id);
                }
            }
        }
        if before > 0 && loaded_count > 0 {
            // Merged with conversations created during the load
            dirty = dirty.merge(Dirty::ALL);
        }

        self.phase = LoadPhase::Ready;
        dirty
    }

    pub fn create(&mut self, title: Option<String>) -> (ConversationId, Dirty) {
        let now = self.clock.now();
        let mut conversation = Conversation::new(&self.config.placeholder_title, now);
        if let Some(title) = title.as_deref().and_then(normalize_title) {
            conversation.title = title;
            conversation.title_explicit = true;
        }

        let id = conversation.id.clone();
        self.conversations.insert(id.clone(), conversation);
        self.current = Some(id.clone());
        self.enforce_capacity();

        (id, Dirty::ALL)
    }

    /// Unknown ids are ignored; returns whether the selection changed hands
    pub fn select(&mut self, id: &str) -> (bool, Dirty) {
        if !self.conversations.contains_key(id) {
            return (false, Dirty::NONE);
        }
        if self.current.as_deref() == Some(id) {
            return (true, Dirty::NONE);
        }
        self.current = Some(id.to_string());
        (
            true,
            Dirty {
                conversations: false,
                selection: true,
            },
        )
    }

    pub fn delete(&mut self, id: &str) -> (Option<DeletedConversation>, Dirty) {
        let Some(removed) = self.conversations.remove(id) else {
            return (None, Dirty::NONE);
        };

        let mut selected = None;
        if self.current.as_deref() == Some(id) {
            let next = self.ordered().first().map(|c| c.id.clone());
            let next = match next {
                Some(next) => next,
                None => self.create(None).0,
            };
            self.current = Some(next.clone());
            selected = Some(next);
        }

        let deleted = DeletedConversation {
            id: removed.id.clone(),
            remote_id: removed.remote_id().to_string(),
            selected,
        };
        (Some(deleted), Dirty::ALL)
    }

    /// Append to an existing conversation; unknown ids are a no-op
    pub fn append(&mut self, conversation_id: &str, message: Message) -> (bool, Dirty) {
        let now = self.clock.now();
        let Some(conversation) = self.conversations.get_mut(conversation_id) else {
            tracing::debug!(
                "[StoreState] Dropping message for unknown conversation '{}'",
                conversation_id
            );
            return (false, Dirty::NONE);
        };

        if message.role == Role::User && !conversation.title_explicit && !conversation.has_user_message() {
            if let Some(title) = derive_title(&message.content) {
                conversation.title = title;
            }
        }

        conversation.messages.push(message);
        conversation.updated_at = conversation.updated_at.max(now);
        self.enforce_capacity();

        (true, Dirty::conversations())
    }

    /// Start a send: resolve the target, append the user message and
    /// mark the conversation as awaiting a reply.
    pub fn begin_send(
        &mut self,
        target: Option<ConversationId>,
        content: String,
        mode: Mode,
    ) -> (Result<SendTicket, SendRejected>, Dirty) {
        let mut dirty = Dirty::NONE;
        let mut created = false;

        let conversation_id = match target.or_else(|| self.current.clone()) {
            Some(id) if self.conversations.contains_key(&id) => id,
            Some(id) => return (Err(SendRejected::UnknownConversation(id)), dirty),
            None => {
                let (id, create_dirty) = self.create(None);
                dirty = dirty.merge(create_dirty);
                created = true;
                id
            }
        };

        if self.in_flight.contains(&conversation_id) {
            return (Err(SendRejected::Busy(conversation_id)), dirty);
        }

        let now = self.clock.now();
        let user_message = Message::user(content, now);
        let (_, append_dirty) = self.append(&conversation_id, user_message.clone());
        dirty = dirty.merge(append_dirty);

        let remote_id = match self.conversations.get_mut(&conversation_id) {
            Some(conversation) => {
                conversation.mode = mode;
                conversation.remote_id().to_string()
            }
            None => conversation_id.clone(),
        };

        self.in_flight.insert(conversation_id.clone());

        let ticket = SendTicket {
            conversation_id,
            remote_id,
            user_message,
            mode,
            created,
        };
        (Ok(ticket), dirty)
    }

    /// Append the reply. Returns false when the conversation is gone and the reply was dropped.
    pub fn complete_send(
        &mut self,
        conversation_id: &str,
        reply: Message,
        backend_conversation_id: ConversationId,
    ) -> (bool, Dirty) {
        self.in_flight.remove(conversation_id);

        let (delivered, dirty) = self.append(conversation_id, reply);
        if !delivered {
            return (false, Dirty::NONE);
        }

        if let Some(conversation) = self.conversations.get_mut(conversation_id) {
            if backend_conversation_id != conversation.id
                && conversation.backend_id.as_deref() != Some(backend_conversation_id.as_str())
            {
                conversation.backend_id = Some(backend_conversation_id);
            }
        }
        self.last_error = None;
        (true, dirty)
    }

    /// Record a failed send. The optimistic user message stays where it is.
    pub fn fail_send(&mut self, conversation_id: &str, cause: String) -> bool {
        self.in_flight.remove(conversation_id);
        if !self.conversations.contains_key(conversation_id) {
            return false;
        }
        self.last_error = Some(EngineError::SendFailure {
            conversation_id: conversation_id.to_string(),
            cause,
        });
        true
    }

    /// Set or clear an explicit title. Returns the remote id when the conversation exists.
    pub fn rename(&mut self, id: &str, title: &str) -> (Option<ConversationId>, Dirty) {
        let now = self.clock.now();
        let placeholder = self.config.placeholder_title.clone();
        let Some(conversation) = self.conversations.get_mut(id) else {
            return (None, Dirty::NONE);
        };

        match normalize_title(title) {
            Some(title) => {
                conversation.title = title;
                conversation.title_explicit = true;
            }
            None => {
                conversation.title_explicit = false;
                conversation.title = conversation
                    .messages
                    .iter()
                    .find(|m| m.role == Role::User)
                    .and_then(|m| derive_title(&m.content))
                    .unwrap_or(placeholder);
            }
        }
        conversation.updated_at = conversation.updated_at.max(now);

        (Some(conversation.remote_id().to_string()), Dirty::conversations())
    }

    pub fn set_mode(&mut self, id: &str, mode: Mode) -> (bool, Dirty) {
        let now = self.clock.now();
        let Some(conversation) = self.conversations.get_mut(id) else {
            return (false, Dirty::NONE);
        };
        if conversation.mode == mode {
            return (true, Dirty::NONE);
        }
        conversation.mode = mode;
        conversation.updated_at = conversation.updated_at.max(now);
        (true, Dirty::conversations())
    }

    pub fn raise(&mut self, error: EngineError) {
        self.last_error = Some(error);
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Evict least recently updated conversations beyond the cap.
    /// Returns whether anything was evicted.
    fn enforce_capacity(&mut self) -> bool {
        let max = self.config.max_conversations;
        if self.conversations.len() <= max {
            return false;
        }

        let evicted: Vec<ConversationId> = self
            .ordered()
            .into_iter()
            .skip(max)
            .map(|c| c.id.clone())
            .collect();

        for id in &evicted {
            self.conversations.remove(id);
            tracing::debug!("[StoreState] Evicted conversation '{}'", id);
        }

        if let Some(current) = self.current.as_deref() {
            if !self.conversations.contains_key(current) {
                self.current = self.ordered().first().map(|c| c.id.clone());
            }
        }
        true
    }
}
