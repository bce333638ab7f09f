pub mod messages;
pub mod send_pipeline;
pub mod store_actor;

pub use send_pipeline::{PendingSend, SendOutcome, SendPipeline};
pub use store_actor::ConversationStore;
