//! Chat Messages
//!
//! The message model shared by the controller, the history store and the
//! surfaces that render a conversation.
//!
//! Messages serialize with the field names the mobile client has always
//! stored (`id`, `from`, `text`, `intent`), so a persisted history survives
//! an app update.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of the seeded welcome message
pub const WELCOME_ID: &str = "welcome";

/// Unique message identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Generate a fresh random identifier
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Identifier of the seeded welcome message
    #[must_use]
    pub fn welcome() -> Self {
        Self(WELCOME_ID.to_string())
    }

    /// Borrow the identifier as a string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Who authored a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// Typed by the human
    User,
    /// Generated by the mentor backend
    Bot,
    /// Synthesized by the client, never sent to or received from the backend
    System,
}

/// One turn in the conversation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Stable identifier
    pub id: MessageId,
    /// Author of the message
    #[serde(rename = "from")]
    pub sender: Sender,
    /// Message text; grows while a bot reply is streaming
    pub text: String,
    /// Classification tag of a completed bot or system message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
}

impl ChatMessage {
    /// A message typed by the user
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            sender: Sender::User,
            text: text.into(),
            intent: None,
        }
    }

    /// An empty bot message waiting for a reply
    #[must_use]
    pub fn pending_bot() -> Self {
        Self {
            id: MessageId::new(),
            sender: Sender::Bot,
            text: String::new(),
            intent: None,
        }
    }

    /// The seeded welcome message
    pub fn welcome(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::welcome(),
            sender: Sender::Bot,
            text: text.into(),
            intent: None,
        }
    }

    /// A client-side notice tagged with the intent that caused it
    pub fn notice(text: impl Into<String>, intent: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            sender: Sender::System,
            text: text.into(),
            intent: Some(intent.into()),
        }
    }
}

/// Intent tags returned by the backend or assigned by the client
pub mod intent {
    /// A normal model reply
    pub const AI_REPLY: &str = "AI_REPLY";
    /// The model usage quota was hit
    pub const QUOTA_EXCEEDED: &str = "QUOTA_EXCEEDED";
    /// Assigned by the client when no reply could be obtained
    pub const FALLBACK: &str = "FALLBACK";

    /// Whether a completed reply with this intent warrants a system notice
    #[must_use]
    pub fn needs_notice(intent: Option<&str>) -> bool {
        matches!(intent, Some(tag) if !tag.is_empty() && tag != AI_REPLY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_shape() {
        let msg = ChatMessage {
            id: MessageId::from("m-1"),
            sender: Sender::Bot,
            text: "Olá".to_string(),
            intent: None,
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "id": "m-1", "from": "bot", "text": "Olá" })
        );

        let notice = ChatMessage::notice("limit", intent::QUOTA_EXCEEDED);
        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["from"], "system");
        assert_eq!(json["intent"], "QUOTA_EXCEEDED");
    }

    #[test]
    fn test_message_reads_stored_history() {
        let stored = r#"[
            {"id":"welcome","from":"bot","text":"Hi"},
            {"id":"a","from":"user","text":"Will AI take my job?"},
            {"id":"b","from":"system","text":"Limit","intent":"QUOTA_EXCEEDED"}
        ]"#;

        let messages: Vec<ChatMessage> = serde_json::from_str(stored).unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].id, MessageId::welcome());
        assert_eq!(messages[1].sender, Sender::User);
        assert_eq!(messages[2].intent.as_deref(), Some("QUOTA_EXCEEDED"));
    }

    #[test]
    fn test_fresh_ids_are_unique() {
        assert_ne!(MessageId::new(), MessageId::new());
        assert_ne!(ChatMessage::pending_bot().id, ChatMessage::pending_bot().id);
    }

    #[test]
    fn test_needs_notice() {
        assert!(!intent::needs_notice(None));
        assert!(!intent::needs_notice(Some("")));
        assert!(!intent::needs_notice(Some(intent::AI_REPLY)));
        assert!(intent::needs_notice(Some(intent::QUOTA_EXCEEDED)));
        assert!(intent::needs_notice(Some(intent::FALLBACK)));
        assert!(intent::needs_notice(Some("MODEL_UNAVAILABLE")));
    }
}
