pub mod conversation;
pub mod conversations_store;
pub mod notice_store;

pub use conversation::{Conversation, Message, PLACEHOLDER_TITLE, Sender};
pub use conversations_store::ConversationStore;
pub use notice_store::{Notice, NoticeLevel, NoticeStore};
