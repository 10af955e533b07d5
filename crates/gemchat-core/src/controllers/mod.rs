pub mod exchange_controller;

pub use exchange_controller::{
    ERROR_REPLY_PREFIX, ExchangeOptions, IMAGE_DEFAULT_PROMPT, MessageExchangeController,
    RejectReason, RevealFrame, SendOutcome, SharedStore, TurnPhase,
};
