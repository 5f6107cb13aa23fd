//! Conversation memory scoped by session id

mod session;
mod store;

pub use session::{ConversationMessage, ConversationRole, ConversationSession};
pub use store::{SessionHandle, SessionStore};
