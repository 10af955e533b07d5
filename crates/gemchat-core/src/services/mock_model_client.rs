use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::model_client::{GenerationConfig, ModelClient, ModelError, Prompt};
use super::title_generator::{fallback_title, is_title_prompt};

type Responder = Box<dyn Fn(&Prompt) -> Result<String, ModelError> + Send + Sync>;

/// Scripted model used by tests and the CLI `--mock` mode.
///
/// Every call is recorded; the reply comes from the responder function,
/// optionally after a delay so callers can observe the in-flight state.
pub struct MockModelClient {
    responder: Responder,
    delay: Option<Duration>,
    calls: Mutex<Vec<Prompt>>,
}

impl MockModelClient {
    pub fn from_fn(
        responder: impl Fn(&Prompt) -> Result<String, ModelError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Replies with the same text every time
    pub fn replying(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self::from_fn(move |_| Ok(reply.clone()))
    }

    /// Fails every call with the same error
    pub fn failing(error: ModelError) -> Self {
        Self::from_fn(move |_| Err(error.clone()))
    }

    /// Echoes the prompt back, mentioning an attached image. Title prompts
    /// get the first words of the quoted message.
    pub fn echo() -> Self {
        Self::from_fn(|prompt| {
            if is_title_prompt(&prompt.text) {
                let message = prompt
                    .text
                    .rsplit_once("Message: ")
                    .map(|(_, message)| message)
                    .unwrap_or_default();
                return Ok(fallback_title(message));
            }

            let mut reply = format!("You said: {}", prompt.text);
            if let Some(image) = &prompt.image {
                reply.push_str(&format!(
                    "\n(with a {} image, {} bytes)",
                    image.mime_type,
                    image.data.len()
                ));
            }
            Ok(reply)
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Prompt> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn generate(
        &self,
        prompt: &Prompt,
        _config: &GenerationConfig,
    ) -> Result<String, ModelError> {
        self.calls.lock().push(prompt.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        (self.responder)(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachments::ImageAttachment;
    use crate::services::title_generator::title_prompt;

    #[tokio::test]
    async fn test_echo_mentions_image() {
        let client = MockModelClient::echo();
        let prompt = Prompt {
            text: "look".to_string(),
            image: Some(ImageAttachment {
                mime_type: "image/jpeg".to_string(),
                data: vec![0; 4],
            }),
        };

        let reply = client
            .generate(&prompt, &GenerationConfig::default())
            .await
            .unwrap();

        assert_eq!(reply, "You said: look\n(with a image/jpeg image, 4 bytes)");
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_echo_titles_from_message_words() {
        let client = MockModelClient::echo();
        let prompt = Prompt::text(title_prompt("which fertilizer suits black soil in June"));

        let reply = client
            .generate(&prompt, &GenerationConfig::default())
            .await
            .unwrap();

        assert_eq!(reply, "which fertilizer suits black soil");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_is_applied_before_reply() {
        let client = MockModelClient::failing(ModelError::Network("down".to_string()))
            .with_delay(Duration::from_secs(3));
        let started = tokio::time::Instant::now();

        let result = client
            .generate(&Prompt::text("hi"), &GenerationConfig::default())
            .await;

        assert_eq!(result, Err(ModelError::Network("down".to_string())));
        assert!(started.elapsed() >= Duration::from_secs(3));
    }
}
