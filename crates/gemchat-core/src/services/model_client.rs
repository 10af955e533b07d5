use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::attachments::ImageAttachment;

/// What the model is asked: text plus an optional inline image
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub text: String,
    pub image: Option<ImageAttachment>,
}

impl Prompt {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
        }
    }
}

/// Sampling configuration sent with every call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".to_string(),
            temperature: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("network error: {0}")]
    Network(String),
    #[error("quota exceeded: {0}")]
    Quota(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    /// Short label for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Quota(_) => "quota",
            Self::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// A hosted generative-language model.
///
/// Resolves with the generated text or fails; no retries or timeouts are
/// layered on top by callers.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(
        &self,
        prompt: &Prompt,
        config: &GenerationConfig,
    ) -> Result<String, ModelError>;
}
