use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use gemchat_core::attachments::ImageAttachment;
use gemchat_core::compose::{ComposeDraft, DictationCapability};
use gemchat_core::controllers::{
    MessageExchangeController, RejectReason, RevealFrame, SendOutcome,
};
use gemchat_core::exporters::export_conversation;
use gemchat_core::models::{ConversationStore, NoticeStore, Sender};
use gemchat_core::prompts::{CropQuery, build_recommendation_prompt, format_recommendation};
use gemchat_core::repositories::{JsonFileStorage, KeyValueStorage};
use gemchat_core::services::{
    GeminiClient, GenerationConfig, MockModelClient, ModelClient, Prompt,
};
use gemchat_core::settings::AppSettings;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::render;

const HELP: &str = "\
Commands:
  /new               start a new conversation
  /list              list conversations (* marks the active one)
  /switch <n|id>     switch to a conversation
  /delete <n|id>     delete a conversation
  /rename <title>    rename the active conversation
  /export [dir]      export the active conversation as JSON
  /image <path>      attach an image to the next message
  /dictate           add spoken text to the draft
  /help              show this help
  /quit              leave
An empty line sends an attached image or dictated text on its own.";

pub async fn open_store(settings: &AppSettings, notices: NoticeStore) -> Result<ConversationStore> {
    let storage = match &settings.storage_dir {
        Some(dir) => JsonFileStorage::with_dir(dir.clone()),
        None => JsonFileStorage::new().context("Failed to locate the conversation storage directory")?,
    };
    debug!(dir = %storage.dir().display(), "Opening conversation storage");

    let storage: Arc<dyn KeyValueStorage> = Arc::new(storage);
    Ok(ConversationStore::load(storage, notices).await)
}

pub fn model_client(settings: &AppSettings, mock: bool) -> Result<Arc<dyn ModelClient>> {
    if mock {
        info!("Using the offline echo model");
        return Ok(Arc::new(MockModelClient::echo()));
    }

    let api_key = settings.api_key().ok_or_else(|| {
        anyhow!(
            "No API key found. Set {} or run with --mock.",
            settings.api_key_env
        )
    })?;
    Ok(Arc::new(GeminiClient::new(api_key)))
}

pub fn list(store: &ConversationStore) -> Result<()> {
    render::print_conversation_list(store.conversations(), store.active_id())?;
    Ok(())
}

pub async fn export(store: &ConversationStore, id: &str, out: Option<PathBuf>) -> Result<()> {
    let conversation = store
        .get(id)
        .ok_or_else(|| anyhow!("No conversation with id {id}"))?;
    let dir = match out {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to read the current directory")?,
    };

    let path = export_conversation(conversation, &dir).await?;
    println!("{}", path.display());
    Ok(())
}

pub async fn predict(
    client: &dyn ModelClient,
    config: &GenerationConfig,
    query: CropQuery,
    image: Option<PathBuf>,
) -> Result<()> {
    let image = match image {
        Some(path) => Some(
            ImageAttachment::from_path(&path)
                .await
                .with_context(|| format!("Cannot attach {}", path.display()))?,
        ),
        None => None,
    };

    let prompt = Prompt {
        text: build_recommendation_prompt(&query),
        image,
    };
    debug!(conditions = %query.conditions(), "Requesting recommendation");

    let reply = client
        .generate(&prompt, config)
        .await
        .context("Failed to get a recommendation")?;

    render::print_blocks(&format_recommendation(&reply))?;
    Ok(())
}

#[derive(Debug, PartialEq)]
enum Input {
    Text(String),
    Command(ReplCommand),
}

#[derive(Debug, PartialEq)]
enum ReplCommand {
    New,
    List,
    Switch(String),
    Delete(String),
    Rename(String),
    Export(Option<PathBuf>),
    Image(PathBuf),
    Dictate,
    Help,
    Quit,
    Unknown(String),
}

fn parse_input(line: &str) -> Input {
    let trimmed = line.trim();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Input::Text(line.to_string());
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    let command = match name {
        "new" => ReplCommand::New,
        "list" => ReplCommand::List,
        "switch" if !arg.is_empty() => ReplCommand::Switch(arg.to_string()),
        "delete" if !arg.is_empty() => ReplCommand::Delete(arg.to_string()),
        "rename" if !arg.is_empty() => ReplCommand::Rename(arg.to_string()),
        "export" => ReplCommand::Export((!arg.is_empty()).then(|| PathBuf::from(arg))),
        "image" if !arg.is_empty() => ReplCommand::Image(PathBuf::from(arg)),
        "dictate" => ReplCommand::Dictate,
        "help" => ReplCommand::Help,
        "quit" | "exit" => ReplCommand::Quit,
        _ => ReplCommand::Unknown(trimmed.to_string()),
    };
    Input::Command(command)
}

/// A conversation reference is either an id or a 1-based list position
fn resolve_conversation(store: &ConversationStore, reference: &str) -> Option<String> {
    if store.contains(reference) {
        return Some(reference.to_string());
    }

    reference
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|index| store.conversations().get(index))
        .map(|c| c.id().to_string())
}

/// Interactive chat over stdin.
///
/// Sends run as tasks so input stays live while a reply is pending or being
/// revealed: a new message or a conversation switch cancels the reveal.
pub struct ChatSession {
    controller: Arc<MessageExchangeController>,
    notices: NoticeStore,
    dictation: DictationCapability,
    draft: ComposeDraft,
    in_flight: FuturesUnordered<JoinHandle<SendOutcome>>,
    revealed_chars: usize,
}

impl ChatSession {
    pub fn new(
        controller: Arc<MessageExchangeController>,
        notices: NoticeStore,
        dictation: DictationCapability,
    ) -> Self {
        Self {
            controller,
            notices,
            dictation,
            draft: ComposeDraft::new(),
            in_flight: FuturesUnordered::new(),
            revealed_chars: 0,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        self.print_active().await?;
        render::print_info("Type a message, or /help for commands.")?;
        render::print_notices(&self.notices.drain())?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut frames = self.controller.subscribe_reveal();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line.context("Failed to read input")? else {
                        break;
                    };
                    if self.handle_line(&line).await?.is_break() {
                        break;
                    }
                }
                Ok(()) = frames.changed() => {
                    let frame = frames.borrow_and_update().clone();
                    self.show_frame(frame).await?;
                }
                Some(joined) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    match joined {
                        Ok(outcome) => self.report_outcome(outcome).await?,
                        Err(e) => warn!(error = %e, "Send task failed"),
                    }
                }
            }

            render::print_notices(&self.notices.drain())?;
        }

        self.controller.shutdown();
        Ok(())
    }

    async fn handle_line(&mut self, line: &str) -> Result<ControlFlow<()>> {
        match parse_input(line) {
            Input::Text(text) => {
                // Typed text joins anything already dictated
                self.draft.append_transcript(&text);
                if self.draft.is_sendable() {
                    self.submit().await?;
                }
                Ok(ControlFlow::Continue(()))
            }
            Input::Command(command) => self.handle_command(command).await,
        }
    }

    /// Hand the draft to the controller. While the active conversation still
    /// waits for its reply the draft is kept untouched.
    async fn submit(&mut self) -> Result<bool> {
        if let Some(id) = self.active_id().await
            && !self.controller.can_send(&id)
        {
            render::print_info(
                "Still waiting for the previous reply; your message is kept. Press Enter to send it.",
            )?;
            return Ok(false);
        }

        let (text, image) = self.draft.take();
        let controller = self.controller.clone();
        self.in_flight
            .push(tokio::spawn(async move { controller.send(&text, image).await }));
        Ok(true)
    }

    async fn handle_command(&mut self, command: ReplCommand) -> Result<ControlFlow<()>> {
        match command {
            ReplCommand::New => {
                self.controller.create_conversation().await;
                render::print_info("Started a new conversation.")?;
            }
            ReplCommand::List => {
                let store = self.controller.store();
                let store = store.lock().await;
                render::print_conversation_list(store.conversations(), store.active_id())?;
            }
            ReplCommand::Switch(reference) => match self.resolve(&reference).await {
                Some(id) => {
                    self.controller.select(&id).await;
                    self.print_active().await?;
                }
                None => render::print_info(&format!("No conversation matches {reference}."))?,
            },
            ReplCommand::Delete(reference) => match self.resolve(&reference).await {
                Some(id) => {
                    self.controller.delete_conversation(&id).await;
                    render::print_info("Conversation deleted.")?;
                    self.print_active().await?;
                }
                None => render::print_info(&format!("No conversation matches {reference}."))?,
            },
            ReplCommand::Rename(title) => {
                let active = self.active_id().await;
                if let Some(id) = active {
                    self.controller.rename_conversation(&id, title).await;
                    render::print_info("Conversation renamed.")?;
                }
            }
            ReplCommand::Export(dir) => self.export_active(dir).await?,
            ReplCommand::Image(path) => match ImageAttachment::from_path(&path).await {
                Ok(image) => {
                    render::print_info(&format!(
                        "Attached {} ({} bytes). It is sent with your next message; press Enter to send it alone.",
                        path.display(),
                        image.data.len()
                    ))?;
                    self.draft.attach_image(image);
                }
                Err(e) => render::print_info(&format!("Cannot attach {}: {e}", path.display()))?,
            },
            ReplCommand::Dictate => {
                if !self.dictation.is_available() {
                    render::print_info("Speech input is not available in this terminal.")?;
                } else {
                    match self.dictation.dictate_into(&mut self.draft).await {
                        Ok(_) => render::print_info(&format!(
                            "Draft: {} (press Enter to send)",
                            self.draft.text()
                        ))?,
                        Err(e) => render::print_info(&format!("Dictation failed: {e}"))?,
                    }
                }
            }
            ReplCommand::Help => println!("{HELP}"),
            ReplCommand::Quit => return Ok(ControlFlow::Break(())),
            ReplCommand::Unknown(input) => {
                render::print_info(&format!("Unknown command {input}. Type /help."))?
            }
        }

        Ok(ControlFlow::Continue(()))
    }

    async fn export_active(&self, dir: Option<PathBuf>) -> Result<()> {
        let dir = match dir {
            Some(dir) => dir,
            None => std::env::current_dir().context("Failed to read the current directory")?,
        };

        let store = self.controller.store();
        let store = store.lock().await;
        let Some(conversation) = store.active() else {
            return Ok(());
        };

        match export_conversation(conversation, &dir).await {
            Ok(path) => render::print_info(&format!("Exported to {}", path.display()))?,
            Err(e) => render::print_info(&format!("Export failed: {e:#}"))?,
        }
        Ok(())
    }

    async fn show_frame(&mut self, frame: Option<RevealFrame>) -> Result<()> {
        let Some(frame) = frame else {
            return Ok(());
        };
        if !self.is_active(&frame.conversation_id).await {
            return Ok(());
        }

        let total = frame.text.chars().count();
        if total < self.revealed_chars {
            println!();
            self.revealed_chars = 0;
        }
        if self.revealed_chars == 0 {
            render::print_label(Sender::Assistant)?;
        }

        let delta: String = frame.text.chars().skip(self.revealed_chars).collect();
        render::print_partial(&delta)?;
        self.revealed_chars = total;
        Ok(())
    }

    async fn report_outcome(&mut self, outcome: SendOutcome) -> Result<()> {
        debug!(outcome = ?outcome, "Send finished");

        match outcome {
            SendOutcome::Rejected(RejectReason::EmptyInput) => {}
            SendOutcome::Rejected(RejectReason::ConcurrentSend) => {
                render::print_info("Still waiting for the previous reply; message not sent.")?
            }
            SendOutcome::Replied { conversation_id }
            | SendOutcome::Failed {
                conversation_id, ..
            } => {
                let store = self.controller.store();
                let store = store.lock().await;

                if store.active_id() != Some(conversation_id.as_str()) {
                    let title = store
                        .get(&conversation_id)
                        .map(|c| c.title().to_string())
                        .unwrap_or_default();
                    render::print_info(&format!("Reply saved to \"{title}\"."))?;
                    return Ok(());
                }

                let Some(reply) = store
                    .get(&conversation_id)
                    .and_then(|c| c.messages().last())
                else {
                    return Ok(());
                };

                if self.revealed_chars > 0 {
                    let rest: String = reply.text.chars().skip(self.revealed_chars).collect();
                    render::print_partial(&rest)?;
                    println!();
                } else {
                    render::print_message(reply)?;
                }
                self.revealed_chars = 0;
            }
            SendOutcome::Cancelled { .. } => {
                if self.revealed_chars > 0 {
                    render::print_info(" [interrupted, full reply saved]")?;
                    self.revealed_chars = 0;
                }
            }
        }

        Ok(())
    }

    async fn print_active(&self) -> Result<()> {
        let store = self.controller.store();
        let store = store.lock().await;
        if let Some(conversation) = store.active() {
            render::print_conversation(conversation)?;
        }
        Ok(())
    }

    async fn active_id(&self) -> Option<String> {
        self.controller
            .store()
            .lock()
            .await
            .active_id()
            .map(str::to_string)
    }

    async fn is_active(&self, conversation_id: &str) -> bool {
        self.active_id().await.as_deref() == Some(conversation_id)
    }

    async fn resolve(&self, reference: &str) -> Option<String> {
        let store = self.controller.store();
        let store = store.lock().await;
        resolve_conversation(&store, reference)
    }
}
