use anyhow::{Result, anyhow};
use tracing::debug;

use super::model_client::{GenerationConfig, ModelClient, Prompt};

/// Words kept by the client-side fallback title
pub const FALLBACK_TITLE_WORDS: usize = 5;

/// Fallback for a conversation whose first turn was an image without text
pub const IMAGE_ONLY_TITLE: &str = "Image chat";

const MAX_TITLE_CHARS: usize = 100;

const TITLE_PROMPT_PREFIX: &str = "Generate a concise, descriptive title (3-7 words) for a conversation that starts with this message.";

/// Truncate text to max length
fn truncate_text(text: &str, max_len: usize) -> String {
    text.chars().take(max_len).collect()
}

/// The dedicated short prompt sent for title generation
pub fn title_prompt(first_user_text: &str) -> String {
    format!(
        "{} Output ONLY the title, no quotes, no explanation.\n\nMessage: {}",
        TITLE_PROMPT_PREFIX,
        truncate_text(first_user_text.trim(), 500)
    )
}

/// Whether a prompt was built by [`title_prompt`]
pub fn is_title_prompt(text: &str) -> bool {
    text.starts_with(TITLE_PROMPT_PREFIX)
}

/// Strip quotes, keep the first line, cap the length. `None` when nothing
/// usable is left.
pub fn clean_title(raw_title: &str) -> Option<String> {
    let quotes: &[char] = &['"', '\'', '`', '“', '”', '‘', '’', '*'];

    let first_line = raw_title.trim().lines().next().unwrap_or_default();
    let cleaned = first_line.trim().trim_matches(quotes).trim();

    if cleaned.is_empty() {
        None
    } else if cleaned.chars().count() > MAX_TITLE_CHARS {
        Some(format!("{}...", truncate_text(cleaned, MAX_TITLE_CHARS - 3)))
    } else {
        Some(cleaned.to_string())
    }
}

/// Client-side title: the first few words of the user's message
pub fn fallback_title(user_text: &str) -> String {
    let words: Vec<&str> = user_text.split_whitespace().take(FALLBACK_TITLE_WORDS).collect();

    if words.is_empty() {
        IMAGE_ONLY_TITLE.to_string()
    } else {
        truncate_text(&words.join(" "), MAX_TITLE_CHARS)
    }
}

/// Ask the model for a short title derived from the first user message.
///
/// # Errors
/// Returns an error if:
/// - The message has no text to derive a title from
/// - The model call fails
/// - The model returns nothing usable
pub async fn generate_title(
    client: &dyn ModelClient,
    config: &GenerationConfig,
    first_user_text: &str,
) -> Result<String> {
    if first_user_text.trim().is_empty() {
        return Err(anyhow!("no text to derive a title from"));
    }

    let response = client
        .generate(&Prompt::text(title_prompt(first_user_text)), config)
        .await?;
    debug!(response = %response, "Title response received");

    let title = clean_title(&response).ok_or_else(|| anyhow!("model returned an empty title"))?;
    debug!(cleaned_title = %title, "Title cleaned");

    Ok(title)
}

/// Generated title, or the fallback when generation fails
pub async fn title_or_fallback(
    client: &dyn ModelClient,
    config: &GenerationConfig,
    first_user_text: &str,
) -> String {
    match generate_title(client, config, first_user_text).await {
        Ok(title) => title,
        Err(e) => {
            debug!(error = %e, "Title generation failed, using fallback");
            fallback_title(first_user_text)
        }
    }
}
