use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use tracing::info;

use super::types::{ConversationExport, ExportedMessage};
use crate::models::{Conversation, Sender};

const FALLBACK_FILENAME: &str = "conversation";

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{M}\p{N}]+").expect("valid filename regex"));

fn rfc3339(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Convert a conversation into its export shape.
///
/// This is a pure function with no side effects.
pub fn conversation_to_export(conversation: &Conversation) -> ConversationExport {
    let messages = conversation
        .messages()
        .iter()
        .map(|m| ExportedMessage {
            sender: match m.sender {
                Sender::User => "user".to_string(),
                Sender::Assistant => "assistant".to_string(),
            },
            text: m.text.clone(),
            image: m.image.clone(),
            timestamp: rfc3339(m.timestamp),
        })
        .collect();

    ConversationExport {
        id: conversation.id().to_string(),
        title: conversation.title().to_string(),
        created: rfc3339(conversation.created_at()),
        messages,
    }
}

fn slug(text: &str) -> String {
    let lowered = text.to_lowercase();
    NON_ALPHANUMERIC
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string()
}

/// File name for an exported conversation: `<title>_<id>.json`, where the
/// title is lowercased with runs of anything but letters and digits
/// collapsed to `_`. The id keeps same-titled exports apart.
pub fn export_filename(title: &str, id: &str) -> String {
    let title = slug(title);
    let title = if title.is_empty() {
        FALLBACK_FILENAME
    } else {
        title.as_str()
    };

    match slug(id) {
        id if id.is_empty() => format!("{title}.json"),
        id => format!("{title}_{id}.json"),
    }
}

/// Write `conversation` as pretty JSON into `dir`, returning the file path
pub async fn export_conversation(conversation: &Conversation, dir: &Path) -> Result<PathBuf> {
    let export = conversation_to_export(conversation);
    let json = serde_json::to_string_pretty(&export).context("Failed to serialize export")?;

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create export directory {}", dir.display()))?;

    let path = dir.join(export_filename(conversation.title(), conversation.id()));
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!(conversation_id = %conversation.id(), path = %path.display(), "Exported conversation");
    Ok(path)
}
