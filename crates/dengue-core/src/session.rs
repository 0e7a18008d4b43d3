// Chat session entity
//
// Sessions live for the lifetime of the process. History is append-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::Message;
use crate::metadata::Metadata;

/// User ID applied when the caller does not identify the user
pub const ANONYMOUS_USER: &str = "anonymous";

/// Per-conversation state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub session_id: String,
    pub user_id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            messages: Vec::new(),
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Generate a fresh session identifier
    pub fn generate_id() -> String {
        Uuid::now_v7().to_string()
    }

    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_message_appends_and_touches() {
        let mut session = ChatSession::new("s1", ANONYMOUS_USER);
        let created = session.updated_at;

        session.add_message(Message::user("hello"));
        session.add_message(Message::assistant("hi"));

        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.last_message().map(|m| m.content.as_str()), Some("hi"));
        assert!(session.updated_at >= created);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(ChatSession::generate_id(), ChatSession::generate_id());
    }
}
