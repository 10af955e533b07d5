use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::attachments::ImageAttachment;
use crate::models::{ConversationStore, Message};
use crate::services::model_client::{GenerationConfig, ModelClient, ModelError, Prompt};
use crate::services::title_generator::title_or_fallback;
use crate::services::typing_reveal::{CancelToken, DEFAULT_REVEAL_TICK, RevealOutcome, reveal};

/// Prefix of the assistant message that stands in for a failed reply
pub const ERROR_REPLY_PREFIX: &str = "Sorry, I encountered an error: ";

/// Prompt used when the user sends an image without text
pub const IMAGE_DEFAULT_PROMPT: &str = "Describe this image";

pub type SharedStore = Arc<tokio::sync::Mutex<ConversationStore>>;

/// Where a conversation is in its current turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    AwaitingModel,
    Revealing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// No text and no image
    EmptyInput,
    /// The conversation is already waiting for the model
    ConcurrentSend,
}

/// How a `send` ended. Every variant leaves the conversation idle.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Rejected(RejectReason),
    Replied { conversation_id: String },
    Failed { conversation_id: String, error: ModelError },
    /// The reveal was cut short; the full reply was still appended
    Cancelled { conversation_id: String },
}

/// Growing prefix of a reply being revealed
#[derive(Debug, Clone, PartialEq)]
pub struct RevealFrame {
    pub conversation_id: String,
    /// Turn whose reply is being revealed
    pub turn: u64,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ExchangeOptions {
    pub generation: GenerationConfig,
    pub typing_reveal: bool,
    pub reveal_tick: Duration,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self {
            generation: GenerationConfig::default(),
            typing_reveal: true,
            reveal_tick: DEFAULT_REVEAL_TICK,
        }
    }
}

struct ActiveTurn {
    turn: u64,
    phase: TurnPhase,
    cancel: CancelToken,
    /// Full reply while revealing; whoever takes it appends it
    pending_reply: Option<String>,
}

/// Drives user turns from submission to persisted reply.
///
/// Per conversation: `Idle -> AwaitingModel -> (reply | error) -> Idle`,
/// with `Revealing` in between when the typing reveal is enabled. Turns
/// within one conversation are serialized; a send that arrives while the
/// conversation is awaiting the model is rejected. Any new send, any
/// conversation switch through the controller, and `shutdown` cancel running
/// reveals. A cancelled reveal still appends the complete reply, before
/// whatever the interrupting operation does, so user and assistant messages
/// keep alternating.
pub struct MessageExchangeController {
    store: SharedStore,
    client: Arc<dyn ModelClient>,
    options: ExchangeOptions,
    turns: Mutex<HashMap<String, ActiveTurn>>,
    next_turn: AtomicU64,
    reveal_buffers: Mutex<HashMap<String, (u64, String)>>,
    reveal_tx: watch::Sender<Option<RevealFrame>>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl MessageExchangeController {
    pub fn new(
        store: ConversationStore,
        client: Arc<dyn ModelClient>,
        options: ExchangeOptions,
    ) -> Self {
        let (reveal_tx, _) = watch::channel(None);

        Self {
            store: Arc::new(tokio::sync::Mutex::new(store)),
            client,
            options,
            turns: Mutex::new(HashMap::new()),
            next_turn: AtomicU64::new(1),
            reveal_buffers: Mutex::new(HashMap::new()),
            reveal_tx,
            background: Mutex::new(Vec::new()),
        }
    }

    /// Shared handle to the conversation store
    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    pub fn options(&self) -> &ExchangeOptions {
        &self.options
    }

    /// Send a user turn to the active conversation and wait for it to finish
    pub async fn send(&self, text: &str, image: Option<ImageAttachment>) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() && image.is_none() {
            debug!("Ignoring empty send");
            return SendOutcome::Rejected(RejectReason::EmptyInput);
        }

        let turn = self.next_turn.fetch_add(1, Ordering::SeqCst);
        let cancel = CancelToken::new();

        let (conversation_id, needs_title) = {
            let mut store = self.store.lock().await;

            let existing = store.active_id().map(str::to_string);
            let conversation_id = match existing {
                Some(id) => id,
                None => store.create().await,
            };

            if self.phase(&conversation_id) == TurnPhase::AwaitingModel {
                debug!(conversation_id = %conversation_id, "Rejecting send while awaiting model");
                return SendOutcome::Rejected(RejectReason::ConcurrentSend);
            }

            self.interrupt_reveals(&mut store).await;
            self.turns.lock().insert(
                conversation_id.clone(),
                ActiveTurn {
                    turn,
                    phase: TurnPhase::AwaitingModel,
                    cancel: cancel.clone(),
                    pending_reply: None,
                },
            );

            let user_message = Message::user(text, image.as_ref().map(ImageAttachment::to_data_uri));
            store
                .append_messages(&conversation_id, vec![user_message])
                .await;

            let needs_title = store
                .get(&conversation_id)
                .is_some_and(|c| c.message_count() == 1 && c.has_placeholder_title());

            (conversation_id, needs_title)
        };

        debug!(conversation_id = %conversation_id, turn, "Turn awaiting model");

        if needs_title {
            self.spawn_title_generation(conversation_id.clone(), text.to_string());
        }

        let prompt = Prompt {
            text: if text.is_empty() {
                IMAGE_DEFAULT_PROMPT.to_string()
            } else {
                text.to_string()
            },
            image,
        };

        let outcome = match self.client.generate(&prompt, &self.options.generation).await {
            Ok(reply) => {
                if self.deliver_reply(&conversation_id, turn, &cancel, reply).await {
                    SendOutcome::Replied {
                        conversation_id: conversation_id.clone(),
                    }
                } else {
                    SendOutcome::Cancelled {
                        conversation_id: conversation_id.clone(),
                    }
                }
            }
            Err(error) => {
                warn!(
                    conversation_id = %conversation_id,
                    kind = error.kind(),
                    error = %error,
                    "Model call failed"
                );
                let surrogate = Message::assistant(format!("{}{}", ERROR_REPLY_PREFIX, error));
                self.store
                    .lock()
                    .await
                    .append_messages(&conversation_id, vec![surrogate])
                    .await;
                SendOutcome::Failed {
                    conversation_id: conversation_id.clone(),
                    error,
                }
            }
        };

        self.finish_turn(&conversation_id, turn);
        debug!(conversation_id = %conversation_id, turn, outcome = ?outcome, "Turn finished");

        outcome
    }

    /// Append the reply, revealing it first when enabled. Returns false if
    /// the reveal was cancelled; the full reply is appended either way.
    async fn deliver_reply(
        &self,
        conversation_id: &str,
        turn: u64,
        cancel: &CancelToken,
        reply: String,
    ) -> bool {
        if !self.options.typing_reveal {
            self.store
                .lock()
                .await
                .append_messages(conversation_id, vec![Message::assistant(reply)])
                .await;
            return true;
        }

        if let Some(active) = self.turns.lock().get_mut(conversation_id)
            && active.turn == turn
        {
            active.phase = TurnPhase::Revealing;
            active.pending_reply = Some(reply.clone());
        }

        let outcome = reveal(&reply, self.options.reveal_tick, cancel, |partial| {
            self.publish_frame(conversation_id, turn, partial);
        })
        .await;

        let delivered = matches!(outcome, RevealOutcome::Completed(_));
        if !delivered {
            debug!(conversation_id = %conversation_id, turn, "Reveal cancelled, appending full reply");
        }

        // Taken under the store lock so an interrupting send cannot append in between
        let mut store = self.store.lock().await;
        if let Some(reply) = self.take_pending_reply(conversation_id, turn) {
            store
                .append_messages(conversation_id, vec![Message::assistant(reply)])
                .await;
        }
        drop(store);

        self.clear_reveal_buffer(conversation_id, turn);
        delivered
    }

    fn take_pending_reply(&self, conversation_id: &str, turn: u64) -> Option<String> {
        self.turns
            .lock()
            .get_mut(conversation_id)
            .filter(|active| active.turn == turn)
            .and_then(|active| active.pending_reply.take())
    }

    fn publish_frame(&self, conversation_id: &str, turn: u64, partial: &str) {
        self.reveal_buffers
            .lock()
            .insert(conversation_id.to_string(), (turn, partial.to_string()));
        self.reveal_tx.send_replace(Some(RevealFrame {
            conversation_id: conversation_id.to_string(),
            turn,
            text: partial.to_string(),
        }));
    }

    /// Drop the reveal state of `turn`, leaving a newer turn's reveal alone
    fn clear_reveal_buffer(&self, conversation_id: &str, turn: u64) {
        let mut buffers = self.reveal_buffers.lock();
        if buffers
            .get(conversation_id)
            .is_some_and(|(owner, _)| *owner == turn)
        {
            buffers.remove(conversation_id);
        }
        drop(buffers);

        self.reveal_tx.send_if_modified(|frame| {
            if frame
                .as_ref()
                .is_some_and(|f| f.conversation_id == conversation_id && f.turn == turn)
            {
                *frame = None;
                true
            } else {
                false
            }
        });
    }

    fn finish_turn(&self, conversation_id: &str, turn: u64) {
        let mut turns = self.turns.lock();
        if turns.get(conversation_id).is_some_and(|t| t.turn == turn) {
            turns.remove(conversation_id);
        }
    }

    fn spawn_title_generation(&self, conversation_id: String, first_user_text: String) {
        let store = self.store.clone();
        let client = self.client.clone();
        let config = self.options.generation.clone();

        let handle = tokio::spawn(async move {
            let title = title_or_fallback(client.as_ref(), &config, &first_user_text).await;

            let mut store = store.lock().await;
            let still_placeholder = store
                .get(&conversation_id)
                .is_some_and(|c| c.has_placeholder_title());
            if still_placeholder {
                info!(conversation_id = %conversation_id, title = %title, "Titled conversation");
                store.rename(&conversation_id, title).await;
            }
        });

        let mut background = self.background.lock();
        background.retain(|h| !h.is_finished());
        background.push(handle);
    }

    /// Stop every running reveal and append the replies they were showing
    async fn interrupt_reveals(&self, store: &mut ConversationStore) {
        let interrupted: Vec<(String, String)> = self
            .turns
            .lock()
            .iter_mut()
            .filter(|(_, active)| active.phase == TurnPhase::Revealing)
            .filter_map(|(conversation_id, active)| {
                debug!(conversation_id = %conversation_id, turn = active.turn, "Cancelling reveal");
                active.cancel.cancel();
                active
                    .pending_reply
                    .take()
                    .map(|reply| (conversation_id.clone(), reply))
            })
            .collect();

        for (conversation_id, reply) in interrupted {
            store
                .append_messages(&conversation_id, vec![Message::assistant(reply)])
                .await;
        }
    }

    /// Switch the active conversation; unknown ids are ignored
    pub async fn select(&self, id: &str) -> bool {
        let mut store = self.store.lock().await;
        self.interrupt_reveals(&mut store).await;
        store.select(id)
    }

    /// Start a new conversation and make it active
    pub async fn create_conversation(&self) -> String {
        let mut store = self.store.lock().await;
        self.interrupt_reveals(&mut store).await;
        store.create().await
    }

    pub async fn delete_conversation(&self, id: &str) -> bool {
        let mut store = self.store.lock().await;
        self.interrupt_reveals(&mut store).await;
        store.delete(id).await
    }

    pub async fn rename_conversation(&self, id: &str, title: String) -> bool {
        self.store.lock().await.rename(id, title).await
    }

    /// Current phase of a conversation's turn
    pub fn phase(&self, conversation_id: &str) -> TurnPhase {
        self.turns
            .lock()
            .get(conversation_id)
            .map(|t| t.phase)
            .unwrap_or(TurnPhase::Idle)
    }

    /// Whether the send control for a conversation should be enabled
    pub fn can_send(&self, conversation_id: &str) -> bool {
        self.phase(conversation_id) != TurnPhase::AwaitingModel
    }

    /// Partially revealed reply for a conversation, if one is in progress
    pub fn revealing_text(&self, conversation_id: &str) -> Option<String> {
        self.reveal_buffers
            .lock()
            .get(conversation_id)
            .map(|(_, text)| text.clone())
    }

    /// Observe reveal progress; `None` once a reveal finishes or is cancelled
    pub fn subscribe_reveal(&self) -> watch::Receiver<Option<RevealFrame>> {
        self.reveal_tx.subscribe()
    }

    /// Wait for pending title generation to finish
    pub async fn wait_for_background(&self) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.background.lock());
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                warn!(error = %e, "Background task failed");
            }
        }
    }

    /// Cancel reveals and abort background work (front end teardown).
    /// Cancelled turns still append their full reply before finishing.
    pub fn shutdown(&self) {
        for active in self.turns.lock().values() {
            active.cancel.cancel();
        }
        for handle in self.background.lock().drain(..) {
            handle.abort();
        }
        debug!("Exchange controller shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NoticeStore, Sender};
    use crate::repositories::InMemoryStorage;
    use crate::services::mock_model_client::MockModelClient;
    use crate::services::title_generator::{IMAGE_ONLY_TITLE, is_title_prompt};

    fn scripted(reply: &'static str) -> Arc<MockModelClient> {
        Arc::new(MockModelClient::from_fn(move |prompt| {
            if is_title_prompt(&prompt.text) {
                Ok("Weather Talk".to_string())
            } else {
                Ok(reply.to_string())
            }
        }))
    }

    async fn controller(
        client: Arc<MockModelClient>,
        typing_reveal: bool,
    ) -> (Arc<MessageExchangeController>, InMemoryStorage) {
        let storage = InMemoryStorage::default();
        let store = ConversationStore::load(Arc::new(storage.clone()), NoticeStore::default()).await;
        let options = ExchangeOptions {
            typing_reveal,
            ..ExchangeOptions::default()
        };
        let controller = MessageExchangeController::new(store, client, options);
        (Arc::new(controller), storage)
    }

    async fn active_id(controller: &MessageExchangeController) -> String {
        controller
            .store()
            .lock()
            .await
            .active_id()
            .map(str::to_string)
            .unwrap()
    }

    async fn messages(controller: &MessageExchangeController, id: &str) -> Vec<Message> {
        controller
            .store()
            .lock()
            .await
            .get(id)
            .map(|c| c.messages().to_vec())
            .unwrap_or_default()
    }

    async fn wait_for_phase(controller: &MessageExchangeController, id: &str, phase: TurnPhase) {
        for _ in 0..1000 {
            if controller.phase(id) == phase {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("conversation {id} never reached {phase:?}");
    }

    fn chat_calls(client: &MockModelClient) -> Vec<Prompt> {
        client
            .calls()
            .into_iter()
            .filter(|p| !is_title_prompt(&p.text))
            .collect()
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected_without_model_call() {
        let client = scripted("unused");
        let (controller, _) = controller(client.clone(), false).await;
        let id = active_id(&controller).await;

        let outcome = controller.send("   ", None).await;

        assert_eq!(outcome, SendOutcome::Rejected(RejectReason::EmptyInput));
        assert_eq!(client.call_count(), 0);
        assert!(messages(&controller, &id).await.is_empty());
    }

    #[tokio::test]
    async fn test_send_appends_user_and_reply_then_titles() {
        let client = scripted("It is sunny.");
        let (controller, _) = controller(client.clone(), false).await;
        let id = active_id(&controller).await;

        let outcome = controller.send("How is the weather today?", None).await;
        controller.wait_for_background().await;

        assert_eq!(
            outcome,
            SendOutcome::Replied {
                conversation_id: id.clone()
            }
        );
        let history = messages(&controller, &id).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].sender, Sender::User);
        assert_eq!(history[0].text, "How is the weather today?");
        assert_eq!(history[1].sender, Sender::Assistant);
        assert_eq!(history[1].text, "It is sunny.");
        assert_eq!(controller.phase(&id), TurnPhase::Idle);

        let store = controller.store();
        let store = store.lock().await;
        assert_eq!(store.get(&id).unwrap().title(), "Weather Talk");
    }

    #[tokio::test]
    async fn test_title_is_generated_only_for_first_message() {
        let client = scripted("ok");
        let (controller, _) = controller(client.clone(), false).await;

        controller.send("first", None).await;
        controller.send("second", None).await;
        controller.wait_for_background().await;

        let title_calls = client
            .calls()
            .iter()
            .filter(|p| is_title_prompt(&p.text))
            .count();
        assert_eq!(title_calls, 1);
        assert_eq!(chat_calls(&client).len(), 2);
    }

    #[tokio::test]
    async fn test_model_failure_appends_error_message() {
        let client = Arc::new(MockModelClient::failing(ModelError::Quota(
            "limit reached".to_string(),
        )));
        let (controller, _) = controller(client, false).await;
        let id = active_id(&controller).await;

        let outcome = controller
            .send("one two three four five six", None)
            .await;
        controller.wait_for_background().await;

        assert!(matches!(outcome, SendOutcome::Failed { error: ModelError::Quota(_), .. }));
        let history = messages(&controller, &id).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].sender, Sender::Assistant);
        assert!(history[1].text.starts_with(ERROR_REPLY_PREFIX));
        assert!(history[1].text.contains("limit reached"));
        assert_eq!(controller.phase(&id), TurnPhase::Idle);

        // Title generation failed as well, so the fallback applies
        let store = controller.store();
        let store = store.lock().await;
        assert_eq!(store.get(&id).unwrap().title(), "one two three four five");
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_send_while_awaiting_model_is_rejected() {
        let client = Arc::new(
            MockModelClient::replying("slow reply").with_delay(Duration::from_secs(2)),
        );
        let (controller, _) = controller(client.clone(), false).await;
        let id = active_id(&controller).await;

        let first = tokio::spawn({
            let controller = controller.clone();
            async move { controller.send("first", None).await }
        });
        wait_for_phase(&controller, &id, TurnPhase::AwaitingModel).await;
        assert!(!controller.can_send(&id));

        let second = controller.send("second", None).await;
        assert_eq!(second, SendOutcome::Rejected(RejectReason::ConcurrentSend));

        let first = first.await.unwrap();
        assert!(matches!(first, SendOutcome::Replied { .. }));
        assert!(controller.can_send(&id));

        let history = messages(&controller, &id).await;
        let user_texts: Vec<&str> = history
            .iter()
            .filter(|m| m.is_user())
            .map(|m| m.text.as_str())
            .collect();
        assert_eq!(user_texts, vec!["first"]);
        assert_eq!(chat_calls(&client).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reveal_completes_and_appends_full_text() {
        let client = scripted("hello");
        let (controller, _) = controller(client, true).await;
        let id = active_id(&controller).await;
        let mut frames = controller.subscribe_reveal();

        let outcome = controller.send("hi", None).await;

        assert!(matches!(outcome, SendOutcome::Replied { .. }));
        let history = messages(&controller, &id).await;
        assert_eq!(history.last().unwrap().text, "hello");
        assert_eq!(controller.revealing_text(&id), None);
        assert!(frames.has_changed().unwrap());
        assert_eq!(*frames.borrow_and_update(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_conversation_cancels_reveal() {
        let client = scripted("a long reply that takes a while");
        let (controller, _) = controller(client, true).await;
        let first_id = active_id(&controller).await;
        let other_id = controller.create_conversation().await;
        controller.select(&first_id).await;

        let pending = tokio::spawn({
            let controller = controller.clone();
            async move { controller.send("question", None).await }
        });
        wait_for_phase(&controller, &first_id, TurnPhase::Revealing).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(controller.revealing_text(&first_id).is_some());

        assert!(controller.select(&other_id).await);
        let outcome = pending.await.unwrap();

        assert_eq!(
            outcome,
            SendOutcome::Cancelled {
                conversation_id: first_id.clone()
            }
        );
        let history = messages(&controller, &first_id).await;
        assert_eq!(history.len(), 2);
        assert!(history[0].is_user());
        assert_eq!(history[1].sender, Sender::Assistant);
        assert_eq!(history[1].text, "a long reply that takes a while");
        assert!(messages(&controller, &other_id).await.is_empty());
        assert_eq!(controller.revealing_text(&first_id), None);
        assert_eq!(controller.phase(&first_id), TurnPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_send_cancels_running_reveal() {
        let client = scripted("a reply long enough to interrupt");
        let (controller, _) = controller(client, true).await;
        let id = active_id(&controller).await;

        let pending = tokio::spawn({
            let controller = controller.clone();
            async move { controller.send("first", None).await }
        });
        wait_for_phase(&controller, &id, TurnPhase::Revealing).await;
        assert!(controller.can_send(&id));

        let second = controller.send("second", None).await;
        let first = pending.await.unwrap();

        assert!(matches!(first, SendOutcome::Cancelled { .. }));
        assert!(matches!(second, SendOutcome::Replied { .. }));
        let history = messages(&controller, &id).await;
        let texts: Vec<&str> = history.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "first",
                "a reply long enough to interrupt",
                "second",
                "a reply long enough to interrupt",
            ]
        );
        for (index, message) in history.iter().enumerate() {
            assert_eq!(message.is_user(), index % 2 == 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupted_reveal_in_other_conversation_keeps_its_reply() {
        let client = scripted("the answer for this field");
        let (controller, _) = controller(client, true).await;
        let first_id = active_id(&controller).await;

        let pending = tokio::spawn({
            let controller = controller.clone();
            async move { controller.send("first field", None).await }
        });
        wait_for_phase(&controller, &first_id, TurnPhase::Revealing).await;

        let other_id = controller.create_conversation().await;
        let second = controller.send("second field", None).await;

        assert!(matches!(pending.await.unwrap(), SendOutcome::Cancelled { .. }));
        assert!(matches!(second, SendOutcome::Replied { .. }));
        for id in [&first_id, &other_id] {
            let history = messages(&controller, id).await;
            assert_eq!(history.len(), 2);
            assert!(history[0].is_user());
            assert_eq!(history[1].text, "the answer for this field");
        }
    }

    #[tokio::test]
    async fn test_finished_turn_leaves_newer_reveal_frame() {
        let client = scripted("unused");
        let (controller, _) = controller(client, true).await;
        let id = active_id(&controller).await;
        let frames = controller.subscribe_reveal();

        controller.publish_frame(&id, 2, "newer reply");
        controller.clear_reveal_buffer(&id, 1);

        assert_eq!(controller.revealing_text(&id).as_deref(), Some("newer reply"));
        let frame = frames.borrow().clone().expect("newer frame kept");
        assert_eq!(frame.turn, 2);
        assert_eq!(frame.text, "newer reply");

        controller.clear_reveal_buffer(&id, 2);

        assert_eq!(controller.revealing_text(&id), None);
        assert_eq!(*frames.borrow(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_reveal() {
        let client = scripted("never fully shown");
        let (controller, _) = controller(client, true).await;
        let id = active_id(&controller).await;

        let pending = tokio::spawn({
            let controller = controller.clone();
            async move { controller.send("bye", None).await }
        });
        wait_for_phase(&controller, &id, TurnPhase::Revealing).await;

        controller.shutdown();

        assert!(matches!(
            pending.await.unwrap(),
            SendOutcome::Cancelled { .. }
        ));
        let history = messages(&controller, &id).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].text, "never fully shown");
        assert_eq!(controller.phase(&id), TurnPhase::Idle);
    }

    #[tokio::test]
    async fn test_image_only_send_uses_default_prompt() {
        let client = scripted("A cat on a mat.");
        let (controller, _) = controller(client.clone(), false).await;
        let id = active_id(&controller).await;
        let image = ImageAttachment {
            mime_type: "image/png".to_string(),
            data: vec![1, 2, 3],
        };

        let outcome = controller.send("", Some(image.clone())).await;
        controller.wait_for_background().await;

        assert!(matches!(outcome, SendOutcome::Replied { .. }));
        let calls = chat_calls(&client);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].text, IMAGE_DEFAULT_PROMPT);
        assert_eq!(calls[0].image.as_ref(), Some(&image));

        let history = messages(&controller, &id).await;
        assert_eq!(history[0].text, "");
        assert_eq!(history[0].image.as_deref(), Some(image.to_data_uri().as_str()));

        let store = controller.store();
        let store = store.lock().await;
        assert_eq!(store.get(&id).unwrap().title(), IMAGE_ONLY_TITLE);
    }

    #[tokio::test]
    async fn test_send_persists_each_append() {
        let client = scripted("ok");
        let (controller, storage) = controller(client, false).await;
        let before = storage.write_count();

        controller.send("hello", None).await;
        controller.wait_for_background().await;

        // user append, reply append, title rename
        assert_eq!(storage.write_count(), before + 3);
    }
}
