//! gemchat - chat with Gemini from the terminal

mod commands;
mod render;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use gemchat_core::compose::DictationCapability;
use gemchat_core::controllers::{ExchangeOptions, MessageExchangeController};
use gemchat_core::models::NoticeStore;
use gemchat_core::prompts::{CropQuery, Language};
use gemchat_core::services::NoticeCollectorLayer;
use gemchat_core::settings::{AppSettings, SettingsJsonRepository, SettingsRepository};
use tracing::{Level, warn};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Chat with Gemini from the terminal
#[derive(Parser, Debug)]
#[command(name = "gemchat")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Model to use (overrides settings.json)
    #[arg(long, global = true, env = "GEMCHAT_MODEL")]
    model: Option<String>,

    /// Sampling temperature
    #[arg(long, global = true)]
    temperature: Option<f32>,

    /// Show replies at once instead of revealing them
    #[arg(long, global = true)]
    no_typing: bool,

    /// Use the offline echo model instead of Gemini
    #[arg(long, global = true)]
    mock: bool,

    /// Directory holding conversations.json
    #[arg(long, global = true, env = "GEMCHAT_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `gemchat_core=trace` (defaults to RUST_LOG, then `warn`)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive chat (the default)
    Chat,

    /// List saved conversations
    List,

    /// Export one conversation as JSON
    Export {
        /// Conversation id (see `gemchat list`)
        id: String,

        /// Output directory (defaults to the current directory)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Crop and fertilizer recommendation for field conditions
    Predict(PredictArgs),
}

#[derive(clap::Args, Debug)]
struct PredictArgs {
    /// Soil type, e.g. loamy
    #[arg(long)]
    soil: Option<String>,

    #[arg(long)]
    climate: Option<String>,

    /// Crop currently grown or planned
    #[arg(long)]
    crop: Option<String>,

    /// Rainfall, e.g. 1200mm
    #[arg(long)]
    rainfall: Option<String>,

    /// Field temperature, e.g. 28C
    #[arg(long)]
    temp: Option<String>,

    /// Answer in Hindi
    #[arg(long)]
    hindi: bool,

    /// Photo of the field or soil
    #[arg(long)]
    image: Option<PathBuf>,
}

impl PredictArgs {
    fn query(&self) -> CropQuery {
        CropQuery {
            soil_type: self.soil.clone(),
            climate: self.climate.clone(),
            crop: self.crop.clone(),
            rainfall: self.rainfall.clone(),
            temperature: self.temp.clone(),
            language: if self.hindi {
                Language::Hindi
            } else {
                Language::English
            },
        }
    }
}

impl Args {
    /// Command-line flags take precedence over settings.json
    fn apply(&self, mut settings: AppSettings) -> AppSettings {
        if let Some(model) = &self.model {
            settings.model = model.clone();
        }
        if let Some(temperature) = self.temperature {
            settings.temperature = temperature;
        }
        if self.no_typing {
            settings.typing_reveal = false;
        }
        if let Some(dir) = &self.storage_dir {
            settings.storage_dir = Some(dir.clone());
        }
        settings
    }
}

fn init_tracing(log_level: Option<&str>, notices: NoticeStore) {
    let filter = match log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .with(NoticeCollectorLayer::new(notices, Level::ERROR))
        .init();
}

async fn load_settings() -> AppSettings {
    let repo = match SettingsJsonRepository::new() {
        Ok(repo) => repo,
        Err(e) => {
            warn!(error = %e, "Cannot locate settings, using defaults");
            return AppSettings::default();
        }
    };

    match repo.load().await {
        Ok(settings) => settings,
        Err(e) => {
            warn!(error = %e, path = %repo.path().display(), "Failed to load settings, using defaults");
            AppSettings::default()
        }
    }
}

async fn run(command: Command, settings: &AppSettings, mock: bool, notices: NoticeStore) -> Result<()> {
    match command {
        Command::Chat => {
            let store = commands::open_store(settings, notices.clone()).await?;
            let client = commands::model_client(settings, mock)?;
            let options = ExchangeOptions {
                generation: settings.generation_config(),
                typing_reveal: settings.typing_reveal,
                reveal_tick: settings.reveal_tick(),
            };
            let controller = Arc::new(MessageExchangeController::new(store, client, options));

            commands::ChatSession::new(controller, notices, DictationCapability::Unavailable)
                .run()
                .await
        }
        Command::List => {
            let store = commands::open_store(settings, notices).await?;
            commands::list(&store)
        }
        Command::Export { id, out } => {
            let store = commands::open_store(settings, notices).await?;
            commands::export(&store, &id, out).await
        }
        Command::Predict(predict) => {
            let client = commands::model_client(settings, mock)?;
            commands::predict(
                client.as_ref(),
                &settings.generation_config(),
                predict.query(),
                predict.image,
            )
            .await
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let notices = NoticeStore::default();
    init_tracing(args.log_level.as_deref(), notices.clone());

    let settings = args.apply(load_settings().await);
    let mock = args.mock;
    let command = args.command.unwrap_or(Command::Chat);

    let result = run(command, &settings, mock, notices.clone()).await;
    render::print_notices(&notices.drain())?;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_settings() {
        let args = Args::parse_from([
            "gemchat",
            "--model",
            "gemini-pro",
            "--temperature",
            "0.3",
            "--no-typing",
            "list",
        ]);

        let settings = args.apply(AppSettings::default());

        assert_eq!(settings.model, "gemini-pro");
        assert_eq!(settings.temperature, 0.3);
        assert!(!settings.typing_reveal);
        assert!(matches!(args.command, Some(Command::List)));
    }

    #[test]
    fn test_predict_args_build_query() {
        let args = Args::parse_from([
            "gemchat", "predict", "--soil", "clay", "--temp", "30C", "--hindi",
        ]);

        let Some(Command::Predict(predict)) = args.command else {
            panic!("expected predict");
        };
        let query = predict.query();
        assert_eq!(query.soil_type.as_deref(), Some("clay"));
        assert_eq!(query.temperature.as_deref(), Some("30C"));
        assert_eq!(query.language, Language::Hindi);
        assert_eq!(query.climate, None);
    }
}
