use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::attachments::ImageAttachment;

/// Text and image the user is composing, before it is sent
#[derive(Debug, Clone, Default)]
pub struct ComposeDraft {
    text: String,
    image: Option<ImageAttachment>,
}

impl ComposeDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn image(&self) -> Option<&ImageAttachment> {
        self.image.as_ref()
    }

    pub fn attach_image(&mut self, image: ImageAttachment) {
        self.image = Some(image);
    }

    pub fn clear_image(&mut self) {
        self.image = None;
    }

    /// Append a dictated transcript, separated from existing text by a space
    pub fn append_transcript(&mut self, transcript: &str) {
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return;
        }
        if !self.text.is_empty() && !self.text.ends_with(char::is_whitespace) {
            self.text.push(' ');
        }
        self.text.push_str(transcript);
    }

    /// Whether a send would be accepted (some text or an image)
    pub fn is_sendable(&self) -> bool {
        !self.text.trim().is_empty() || self.image.is_some()
    }

    /// Hand the draft over for sending and reset it
    pub fn take(&mut self) -> (String, Option<ImageAttachment>) {
        (std::mem::take(&mut self.text), self.image.take())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DictationError {
    #[error("no speech was recognized")]
    NoSpeech,

    #[error("speech recognition failed: {0}")]
    Failed(String),
}

/// One-shot speech recognition
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn recognize_once(&self) -> Result<String, DictationError>;
}

/// Whether the host offers speech input. An unavailable capability means a
/// disabled control, never an error.
#[derive(Clone, Default)]
pub enum DictationCapability {
    Available(Arc<dyn SpeechRecognizer>),
    #[default]
    Unavailable,
}

impl DictationCapability {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Run one dictation and append the transcript to `draft`.
    ///
    /// Returns `Ok(false)` without doing anything when unavailable.
    pub async fn dictate_into(&self, draft: &mut ComposeDraft) -> Result<bool, DictationError> {
        let Self::Available(recognizer) = self else {
            debug!("Dictation requested but unavailable");
            return Ok(false);
        };

        let transcript = recognizer.recognize_once().await?;
        if transcript.trim().is_empty() {
            return Err(DictationError::NoSpeech);
        }

        draft.append_transcript(&transcript);
        Ok(true)
    }
}
