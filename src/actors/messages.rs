use crate::core::error::{EngineError, SendRejected};
use crate::core::models::{Conversation, ConversationId, Message, Mode};
use crate::core::state::{DeletedConversation, SendTicket, StoreSnapshot};
use tokio::sync::oneshot;

/// Result of asking the store to start loading
#[derive(Debug)]
pub enum LoadStart {
    /// A load is already running
    Coalesced,
    Started {
        /// `None` when nothing usable was persisted
        conversations: Option<Vec<Conversation>>,
        current: Option<ConversationId>,
    },
}

/// The closed set of operations the store actor applies, one at a time
#[derive(Debug)]
pub enum StoreMessage {
    BeginLoad {
        respond: oneshot::Sender<LoadStart>,
    },
    FinishLoad {
        result: Result<Vec<Conversation>, String>,
        persisted_current: Option<ConversationId>,
        fetched: bool,
        respond: oneshot::Sender<StoreSnapshot>,
    },
    Create {
        title: Option<String>,
        respond: oneshot::Sender<ConversationId>,
    },
    Select {
        id: ConversationId,
        respond: oneshot::Sender<bool>,
    },
    Delete {
        id: ConversationId,
        respond: oneshot::Sender<Option<DeletedConversation>>,
    },
    Append {
        conversation_id: ConversationId,
        message: Message,
        respond: oneshot::Sender<bool>,
    },
    BeginSend {
        target: Option<ConversationId>,
        content: String,
        mode: Mode,
        respond: oneshot::Sender<Result<SendTicket, SendRejected>>,
    },
    CompleteSend {
        conversation_id: ConversationId,
        reply: Message,
        backend_conversation_id: ConversationId,
        respond: oneshot::Sender<bool>,
    },
    FailSend {
        conversation_id: ConversationId,
        cause: String,
        respond: oneshot::Sender<bool>,
    },
    Rename {
        id: ConversationId,
        title: String,
        respond: oneshot::Sender<Option<ConversationId>>,
    },
    SetMode {
        id: ConversationId,
        mode: Mode,
        respond: oneshot::Sender<Option<ConversationId>>,
    },
    RaiseError {
        error: EngineError,
        respond: oneshot::Sender<()>,
    },
    ClearError {
        respond: oneshot::Sender<()>,
    },
    Shutdown,
}
