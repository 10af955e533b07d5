//! Wire format of the persisted conversation collection.
//!
//! Written as `{"version": 1, "conversations": [...]}`. The unversioned
//! legacy shape (a bare array of conversations) is still accepted on read.
//! Decoding is entry-tolerant: an entry that does not parse is dropped and
//! counted, the rest of the collection survives.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::error::{StorageError, StorageResult};
use crate::models::{Conversation, Message};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    conversations: &'a [Conversation],
}

/// Result of decoding a persisted collection
#[derive(Debug, Default)]
pub struct DecodedSnapshot {
    pub conversations: Vec<Conversation>,
    /// Entries that were malformed or duplicated and therefore skipped
    pub dropped: usize,
}

/// Serialize the whole collection as one unit
pub fn encode(conversations: &[Conversation]) -> StorageResult<String> {
    let snapshot = SnapshotRef {
        version: SNAPSHOT_VERSION,
        conversations,
    };
    Ok(serde_json::to_string(&snapshot)?)
}

/// Deserialize a collection, dropping malformed entries
pub fn decode(raw: &str) -> StorageResult<DecodedSnapshot> {
    let value: Value = serde_json::from_str(raw)?;

    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(mut map) => {
            if let Some(version) = map.get("version").and_then(Value::as_u64)
                && version > u64::from(SNAPSHOT_VERSION)
            {
                warn!(
                    version,
                    supported = SNAPSHOT_VERSION,
                    "Snapshot written by a newer version, reading what we understand"
                );
            }

            match map.remove("conversations") {
                Some(Value::Array(entries)) => entries,
                _ => {
                    return Err(StorageError::InvalidData {
                        message: "snapshot has no conversations array".to_string(),
                    });
                }
            }
        }
        _ => {
            return Err(StorageError::InvalidData {
                message: "snapshot is neither an array nor an object".to_string(),
            });
        }
    };

    let mut decoded = DecodedSnapshot::default();
    let mut seen = HashSet::new();

    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<Conversation>(entry) {
            Ok(conversation) if seen.insert(conversation.id().to_string()) => {
                decoded.conversations.push(conversation);
            }
            Ok(conversation) => {
                warn!(index, id = %conversation.id(), "Dropping duplicate conversation entry");
                decoded.dropped += 1;
            }
            Err(e) => {
                warn!(index, error = %e, "Dropping malformed conversation entry");
                decoded.dropped += 1;
            }
        }
    }

    Ok(decoded)
}

/// Decode the flat history the single-thread chat page kept
/// (`[{"sender": "You" | "ChatGPT", "text": ...}]`).
pub fn decode_legacy_history(raw: &str) -> StorageResult<Vec<Message>> {
    let entries: Vec<Value> = serde_json::from_str(raw)?;

    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<Message>(entry) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(error = %e, "Dropping malformed legacy history entry");
                None
            }
        })
        .collect())
}
