// Message types
//
// A Message is the unit passed into and returned from every agent. Content may be
// empty when an agent communicates only through metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metadata::{keys, Metadata};

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Function,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Function => write!(f, "function"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

impl From<&str> for MessageRole {
    fn from(s: &str) -> Self {
        match s {
            "system" => MessageRole::System,
            "assistant" => MessageRole::Assistant,
            "function" => MessageRole::Function,
            "tool" => MessageRole::Tool,
            _ => MessageRole::User,
        }
    }
}

/// A message exchanged between the interpreter, agents and the session history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role,
            content: content.into(),
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set one metadata key, stamping a `timestamp` key if none is present yet
    pub fn update_metadata(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.metadata.insert(key, value);
        if !self.metadata.contains_key(keys::TIMESTAMP) {
            self.metadata
                .insert(keys::TIMESTAMP, Utc::now().to_rfc3339());
        }
    }

    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_round_trip_names() {
        assert_eq!(MessageRole::from("assistant"), MessageRole::Assistant);
        assert_eq!(MessageRole::from("unknown"), MessageRole::User);
        assert_eq!(MessageRole::Tool.to_string(), "tool");
        assert_eq!(
            serde_json::to_value(MessageRole::Function).unwrap(),
            json!("function")
        );
    }

    #[test]
    fn test_update_metadata_stamps_timestamp_once() {
        let mut msg = Message::assistant("hi");
        msg.update_metadata("a", 1);
        let stamp = msg.metadata.get(keys::TIMESTAMP).cloned();
        assert!(stamp.is_some());

        msg.update_metadata("b", 2);
        assert_eq!(msg.metadata.get(keys::TIMESTAMP).cloned(), stamp);
        assert_eq!(msg.metadata.get("b"), Some(&json!(2)));
    }

    #[test]
    fn test_metadata_defaults_to_empty_when_missing() {
        let msg: Message = serde_json::from_value(json!({
            "id": Uuid::now_v7(),
            "role": "user",
            "content": "",
            "created_at": Utc::now(),
        }))
        .unwrap();
        assert!(msg.metadata.is_empty());
        assert!(!msg.has_content());
    }
}
