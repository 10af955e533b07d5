use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};

/// Title every conversation starts with until one is generated or set.
pub const PLACEHOLDER_TITLE: &str = "New Chat";

/// Current time as Unix milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    #[serde(alias = "user", alias = "You")]
    User,
    #[serde(alias = "assistant", alias = "model", alias = "ChatGPT")]
    Assistant,
}

/// A single entry in a conversation's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    #[serde(default)]
    pub text: String,
    /// Data URI of an attached image (display-only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub timestamp: i64,
}

impl Message {
    pub fn user(text: impl Into<String>, image: Option<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
            image,
            timestamp: now_millis(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Assistant,
            text: text.into(),
            image: None,
            timestamp: now_millis(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.sender == Sender::User
    }
}

/// A named, append-only thread of messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(deserialize_with = "deserialize_id")]
    id: String,
    #[serde(default = "default_title")]
    title: String,
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default, alias = "createdAt")]
    created_at: i64,
}

/// Older snapshots stored `Date.now()` ids as JSON numbers
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Integer(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(id) => id,
        RawId::Integer(id) => id.to_string(),
    })
}

fn default_title() -> String {
    PLACEHOLDER_TITLE.to_string()
}

impl Conversation {
    /// Create an empty conversation with the placeholder title
    pub fn new(id: String, created_at: i64) -> Self {
        Self {
            id,
            title: default_title(),
            messages: Vec::new(),
            created_at,
        }
    }

    /// Get conversation ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get conversation title
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Set conversation title
    pub fn set_title(&mut self, title: String) {
        self.title = title;
    }

    /// Whether the title is still the untouched placeholder
    pub fn has_placeholder_title(&self) -> bool {
        self.title == PLACEHOLDER_TITLE
    }

    /// Get the complete message history
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Append messages in order
    pub fn push_messages(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    /// Get the count of messages in history
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Get creation timestamp (Unix millis)
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// First message the user sent, if any
    pub fn first_user_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.is_user())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_conversation_is_empty_with_placeholder() {
        let conv = Conversation::new("1".to_string(), 1000);
        assert_eq!(conv.title(), PLACEHOLDER_TITLE);
        assert!(conv.has_placeholder_title());
        assert_eq!(conv.message_count(), 0);
        assert_eq!(conv.created_at(), 1000);
    }

    #[test]
    fn test_push_messages_preserves_order() {
        let mut conv = Conversation::new("1".to_string(), 1000);
        conv.push_messages([Message::user("a", None), Message::assistant("b")]);
        conv.push_messages([Message::user("c", None)]);

        let texts: Vec<&str> = conv.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert_eq!(conv.first_user_message().unwrap().text, "a");
    }

    #[test]
    fn test_deserialize_applies_defaults() {
        let conv: Conversation = serde_json::from_str(r#"{"id": "42"}"#).unwrap();
        assert_eq!(conv.id(), "42");
        assert_eq!(conv.title(), PLACEHOLDER_TITLE);
        assert!(conv.messages().is_empty());
        assert_eq!(conv.created_at(), 0);

        let msg: Message = serde_json::from_str(r#"{"sender": "model"}"#).unwrap();
        assert_eq!(msg.sender, Sender::Assistant);
        assert_eq!(msg.text, "");
        assert!(msg.image.is_none());
    }

    #[test]
    fn test_accepts_camel_case_created_at() {
        let conv: Conversation =
            serde_json::from_str(r#"{"id": "7", "title": "Soil", "createdAt": 55}"#).unwrap();
        assert_eq!(conv.created_at(), 55);
        assert_eq!(conv.title(), "Soil");
    }

    #[test]
    fn test_accepts_numeric_id() {
        let conv: Conversation =
            serde_json::from_str(r#"{"id": 1712345678901, "title": "Wheat"}"#).unwrap();
        assert_eq!(conv.id(), "1712345678901");

        let json = serde_json::to_value(&conv).unwrap();
        assert_eq!(json["id"], "1712345678901");

        assert!(serde_json::from_str::<Conversation>(r#"{"id": true}"#).is_err());
    }

    #[test]
    fn test_image_is_omitted_when_absent() {
        let json = serde_json::to_string(&Message::assistant("hi")).unwrap();
        assert!(!json.contains("image"));
    }
}
