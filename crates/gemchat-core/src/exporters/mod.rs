pub mod json_exporter;
pub mod types;

pub use json_exporter::{conversation_to_export, export_conversation, export_filename};
pub use types::{ConversationExport, ExportedMessage};
