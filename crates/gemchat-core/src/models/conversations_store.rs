use std::sync::Arc;

use tracing::{debug, info, warn};

use super::conversation::{Conversation, Message, now_millis};
use super::notice_store::{Notice, NoticeStore};
use crate::repositories::snapshot::{self, DecodedSnapshot};
use crate::repositories::{CONVERSATIONS_KEY, KeyValueStorage, LEGACY_HISTORY_KEY};
use crate::services::title_generator::fallback_title;

/// Key a snapshot is copied to when it cannot be decoded at all
pub const CORRUPT_BACKUP_KEY: &str = "conversations.corrupt";

const NOTICE_TARGET: &str = "gemchat_core::store";

/// Single source of truth for all conversations and the active pointer.
///
/// Newest conversation first. Every mutation rewrites the whole collection
/// through the injected storage backend before returning, so the in-memory
/// state and the persisted snapshot never diverge by more than the
/// operation in progress. Write failures never propagate: they are logged
/// and recorded in the notice store.
pub struct ConversationStore {
    storage: Arc<dyn KeyValueStorage>,
    conversations: Vec<Conversation>,
    active_id: Option<String>,
    notices: NoticeStore,
    last_id_millis: i64,
    /// Set when the saved snapshot could not be read or backed up; writes
    /// are skipped so it is never replaced
    persistence_suspended: bool,
}

impl ConversationStore {
    /// Read the persisted collection.
    ///
    /// Malformed entries are dropped; a missing or unusable snapshot yields
    /// one fresh empty conversation, which is persisted. The first
    /// conversation becomes active.
    pub async fn load(storage: Arc<dyn KeyValueStorage>, notices: NoticeStore) -> Self {
        let mut store = Self {
            storage,
            conversations: Vec::new(),
            active_id: None,
            notices,
            last_id_millis: 0,
            persistence_suspended: false,
        };

        match store.storage.read(CONVERSATIONS_KEY).await {
            Ok(Some(raw)) => match snapshot::decode(&raw) {
                Ok(DecodedSnapshot {
                    conversations,
                    dropped,
                }) => {
                    if dropped > 0 {
                        store.notify(format!(
                            "{} saved conversation(s) could not be read and were skipped",
                            dropped
                        ));
                    }
                    store.conversations = conversations;
                }
                Err(e) => {
                    warn!(error = %e, "Saved conversations are unreadable, starting fresh");
                    store.notify("Saved conversations were unreadable; a backup was kept");
                    if let Err(e) = store.storage.write(CORRUPT_BACKUP_KEY, raw).await {
                        warn!(error = %e, "Failed to back up unreadable conversations");
                        store.persistence_suspended = true;
                    }
                }
            },
            Ok(None) => store.import_legacy_history().await,
            Err(e) => {
                // Do not overwrite data we merely failed to read
                warn!(error = %e, "Failed to read saved conversations");
                store.notify(format!(
                    "Could not read saved conversations ({}); changes in this session will not be saved",
                    e
                ));
                store.persistence_suspended = true;
            }
        }

        store.last_id_millis = store
            .conversations
            .iter()
            .filter_map(|c| c.id().parse::<i64>().ok())
            .max()
            .unwrap_or(0);

        if store.conversations.is_empty() {
            store.insert_new();
            store.persist().await;
        } else {
            store.active_id = store.conversations.first().map(|c| c.id().to_string());
        }

        info!(
            count = store.conversations.len(),
            active = ?store.active_id,
            "Loaded conversations"
        );

        store
    }

    /// Turn the single-thread page's flat history into one conversation
    async fn import_legacy_history(&mut self) {
        let raw = match self.storage.read(LEGACY_HISTORY_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Failed to read legacy chat history");
                return;
            }
        };

        let messages = match snapshot::decode_legacy_history(&raw) {
            Ok(messages) if !messages.is_empty() => messages,
            Ok(_) => return,
            Err(e) => {
                warn!(error = %e, "Legacy chat history is unreadable, ignoring it");
                return;
            }
        };

        let id = self.insert_new();
        if let Some(conversation) = self.conversation_mut(&id) {
            conversation.push_messages(messages);
            if let Some(title) = conversation
                .first_user_message()
                .map(|m| fallback_title(&m.text))
            {
                conversation.set_title(title);
            }
        }

        if self.persist().await
            && let Err(e) = self.storage.remove(LEGACY_HISTORY_KEY).await
        {
            warn!(error = %e, "Failed to remove migrated legacy chat history");
        }
        info!(id = %id, "Imported legacy chat history");
    }

    /// Insert a new empty conversation at the front and make it active
    pub async fn create(&mut self) -> String {
        let id = self.insert_new();
        self.persist().await;
        debug!(id = %id, "Created conversation");
        id
    }

    /// Make `id` active; returns false (and changes nothing) if it is unknown
    pub fn select(&mut self, id: &str) -> bool {
        if self.contains(id) {
            self.active_id = Some(id.to_string());
            true
        } else {
            debug!(id = %id, "Ignoring selection of unknown conversation");
            false
        }
    }

    /// Remove a conversation. Deleting the active one activates the newest
    /// remaining conversation, or a fresh one when none remain.
    pub async fn delete(&mut self, id: &str) -> bool {
        let Some(index) = self.conversations.iter().position(|c| c.id() == id) else {
            debug!(id = %id, "Ignoring deletion of unknown conversation");
            return false;
        };

        self.conversations.remove(index);

        if self.active_id.as_deref() == Some(id) {
            self.active_id = self.conversations.first().map(|c| c.id().to_string());
            if self.active_id.is_none() {
                self.insert_new();
            }
        }

        self.persist().await;
        debug!(id = %id, active = ?self.active_id, "Deleted conversation");
        true
    }

    /// Set a conversation's title; no-op for unknown ids
    pub async fn rename(&mut self, id: &str, title: String) -> bool {
        let Some(conversation) = self.conversation_mut(id) else {
            debug!(id = %id, "Ignoring rename of unknown conversation");
            return false;
        };

        conversation.set_title(title);
        self.persist().await;
        true
    }

    /// Append messages in order. An unknown id is logged and ignored: the
    /// conversation may have been deleted while a reply was in flight.
    pub async fn append_messages(&mut self, id: &str, messages: Vec<Message>) -> bool {
        let Some(conversation) = self.conversation_mut(id) else {
            warn!(id = %id, count = messages.len(), "Dropping messages for missing conversation");
            return false;
        };

        conversation.push_messages(messages);
        self.persist().await;
        true
    }

    /// All conversations, newest first
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn active(&self) -> Option<&Conversation> {
        self.active_id.as_deref().and_then(|id| self.get(id))
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn count(&self) -> usize {
        self.conversations.len()
    }

    pub fn notices(&self) -> &NoticeStore {
        &self.notices
    }

    fn conversation_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id() == id)
    }

    /// Millisecond timestamp id, bumped to stay strictly increasing
    fn next_id(&mut self) -> String {
        let millis = now_millis().max(self.last_id_millis + 1);
        self.last_id_millis = millis;
        millis.to_string()
    }

    fn insert_new(&mut self) -> String {
        let id = self.next_id();
        self.conversations
            .insert(0, Conversation::new(id.clone(), now_millis()));
        self.active_id = Some(id.clone());
        id
    }

    /// Whether writes are being skipped to protect an unread snapshot
    pub fn is_persistence_suspended(&self) -> bool {
        self.persistence_suspended
    }

    /// Write the whole collection; failures become notices
    async fn persist(&mut self) -> bool {
        if self.persistence_suspended {
            debug!("Skipping save, saved conversations were never read");
            return false;
        }

        let raw = match snapshot::encode(&self.conversations) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to serialize conversations");
                self.notify(format!("Could not save conversations: {}", e));
                return false;
            }
        };

        match self.storage.write(CONVERSATIONS_KEY, raw).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to persist conversations");
                self.notify(format!("Could not save conversations: {}", e));
                false
            }
        }
    }

    fn notify(&self, message: impl Into<String>) {
        self.notices.push(Notice::warning(NOTICE_TARGET, message));
    }
}
