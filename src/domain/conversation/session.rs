use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;
use crate::domain::llm::Message;
use crate::domain::rag::ProviderSelection;

/// Who wrote a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationRole {
    User,
    Assistant,
}

/// One message of a conversation, as remembered between queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: ConversationRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Chunk ids the answer was grounded on; empty for user messages
    #[serde(default)]
    pub citations: Vec<String>,
}

impl ConversationMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ConversationRole::User,
            text: text.into(),
            timestamp: Utc::now(),
            citations: Vec::new(),
        }
    }

    pub fn assistant(text: impl Into<String>, citations: Vec<String>) -> Self {
        Self {
            role: ConversationRole::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
            citations,
        }
    }

    pub fn to_llm_message(&self) -> Message {
        match self.role {
            ConversationRole::User => Message::user(self.text.clone()),
            ConversationRole::Assistant => Message::assistant(self.text.clone()),
        }
    }
}

/// Conversation memory for one session id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    pub session_id: String,
    pub messages: Vec<ConversationMessage>,
    /// Pinned by the first completed query
    pub selection: Option<ProviderSelection>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationSession {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();

        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            selection: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Fail if the session already runs under a different selection
    pub fn check_selection(&self, selection: &ProviderSelection) -> Result<(), DomainError> {
        match &self.selection {
            Some(pinned) if pinned != selection => Err(DomainError::invalid_config(format!(
                "session '{}' is pinned to {pinned}; got {selection}",
                self.session_id
            ))),
            _ => Ok(()),
        }
    }

    /// The last `turns` user/assistant pairs, oldest first
    pub fn recent_turns(&self, turns: usize) -> &[ConversationMessage] {
        let keep = turns.saturating_mul(2).min(self.messages.len());
        &self.messages[self.messages.len() - keep..]
    }

    /// Record a completed query. Both messages land together or not at all.
    pub fn append_turn(
        &mut self,
        selection: &ProviderSelection,
        question: ConversationMessage,
        answer: ConversationMessage,
    ) -> Result<(), DomainError> {
        self.check_selection(selection)?;

        if self.selection.is_none() {
            self.selection = Some(selection.clone());
        }

        self.messages.push(question);
        self.messages.push(answer);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Forget all messages but keep the pinned selection
    pub fn clear(&mut self) {
        self.messages.clear();
        self.updated_at = Utc::now();
    }
}
