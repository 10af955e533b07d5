use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::services::model_client::GenerationConfig;

/// User-level configuration, persisted as `settings.json`.
///
/// Missing fields take their defaults, so older files keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub model: String,
    pub temperature: f32,
    pub typing_reveal: bool,
    pub reveal_tick_ms: u64,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    /// Conversation storage directory; the config directory when unset
    pub storage_dir: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        let generation = GenerationConfig::default();
        Self {
            model: generation.model,
            temperature: generation.temperature,
            typing_reveal: true,
            reveal_tick_ms: 20,
            api_key_env: "GEMINI_API_KEY".to_string(),
            storage_dir: None,
        }
    }
}

impl AppSettings {
    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            model: self.model.clone(),
            temperature: self.temperature,
        }
    }

    pub fn reveal_tick(&self) -> Duration {
        Duration::from_millis(self.reveal_tick_ms.max(1))
    }

    /// API key from the configured environment variable, if set and non-empty
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}
