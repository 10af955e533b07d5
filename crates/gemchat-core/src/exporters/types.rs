use serde::Serialize;

/// Top-level structure written by `export_conversation`
#[derive(Debug, Serialize)]
pub struct ConversationExport {
    pub id: String,
    pub title: String,
    /// RFC 3339
    pub created: String,
    pub messages: Vec<ExportedMessage>,
}

#[derive(Debug, Serialize)]
pub struct ExportedMessage {
    pub sender: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub timestamp: String,
}
