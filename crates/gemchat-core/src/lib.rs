//! Conversation sessions against a hosted generative-language model.
//!
//! [`models::ConversationStore`] owns every conversation and persists it
//! through a [`repositories::KeyValueStorage`] backend.
//! [`controllers::MessageExchangeController`] drives a user turn from
//! submission to the persisted reply using a [`services::ModelClient`].

pub mod attachments;
pub mod compose;
pub mod controllers;
pub mod exporters;
pub mod models;
pub mod prompts;
pub mod repositories;
pub mod services;
pub mod settings;

pub use attachments::{AttachmentError, ImageAttachment};
pub use controllers::{ExchangeOptions, MessageExchangeController, SendOutcome, TurnPhase};
pub use models::{Conversation, ConversationStore, Message, NoticeStore, Sender};
pub use services::{GenerationConfig, ModelClient, ModelError, Prompt};
