use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;

pub const DEFAULT_MAX_NOTICES: usize = 100;

#[derive(Clone, Debug, PartialEq)]
pub enum NoticeLevel {
    Warning,
    Error,
}

/// A non-blocking message for the user, e.g. "could not save conversations"
#[derive(Clone, Debug)]
pub struct Notice {
    pub timestamp: SystemTime,
    pub level: NoticeLevel,
    pub message: String,
    pub target: String,
    pub fields: HashMap<String, String>,
}

impl Notice {
    pub fn warning(target: &str, message: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            level: NoticeLevel::Warning,
            message: message.into(),
            target: target.to_string(),
            fields: HashMap::new(),
        }
    }
}

/// Bounded FIFO of notices. Clones share the same buffer.
#[derive(Clone)]
pub struct NoticeStore {
    entries: Arc<Mutex<VecDeque<Notice>>>,
    max_entries: usize,
}

impl NoticeStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::new())),
            max_entries,
        }
    }

    pub fn push(&self, notice: Notice) {
        let mut entries = self.entries.lock();
        entries.push_back(notice);

        // FIFO eviction when exceeding max
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    pub fn all(&self) -> Vec<Notice> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Remove and return everything collected so far
    pub fn drain(&self) -> Vec<Notice> {
        self.entries.lock().drain(..).collect()
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.level == NoticeLevel::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.level == NoticeLevel::Warning)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for NoticeStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NOTICES)
    }
}
