pub mod gemini_client;
pub mod mock_model_client;
pub mod model_client;
pub mod notice_collector_layer;
pub mod reply_parser;
pub mod title_generator;
pub mod typing_reveal;

pub use gemini_client::GeminiClient;
pub use mock_model_client::MockModelClient;
pub use model_client::{GenerationConfig, ModelClient, ModelError, Prompt};
pub use notice_collector_layer::NoticeCollectorLayer;
pub use reply_parser::{Block, Span, parse_reply};
pub use title_generator::{fallback_title, generate_title};
pub use typing_reveal::{CancelToken, DEFAULT_REVEAL_TICK, RevealOutcome, reveal};
