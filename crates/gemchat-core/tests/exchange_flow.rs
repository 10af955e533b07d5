use std::sync::Arc;

use gemchat_core::controllers::{ExchangeOptions, MessageExchangeController, SendOutcome};
use gemchat_core::exporters::export_conversation;
use gemchat_core::models::{ConversationStore, NoticeStore, PLACEHOLDER_TITLE, Sender};
use gemchat_core::repositories::{JsonFileStorage, KeyValueStorage};
use gemchat_core::services::MockModelClient;
use gemchat_core::services::title_generator::is_title_prompt;

fn storage(dir: &std::path::Path) -> Arc<dyn KeyValueStorage> {
    Arc::new(JsonFileStorage::with_dir(dir.to_path_buf()))
}

fn options() -> ExchangeOptions {
    ExchangeOptions {
        typing_reveal: false,
        ..ExchangeOptions::default()
    }
}

#[tokio::test]
async fn test_first_exchange_is_persisted_and_reloaded() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(MockModelClient::from_fn(|prompt| {
        if is_title_prompt(&prompt.text) {
            Ok("\"Greeting Chat\"".to_string())
        } else {
            Ok("Hi there!".to_string())
        }
    }));

    let store = ConversationStore::load(storage(dir.path()), NoticeStore::default()).await;
    assert_eq!(store.count(), 1);
    assert_eq!(store.active().unwrap().title(), PLACEHOLDER_TITLE);

    let controller = MessageExchangeController::new(store, client, options());
    let outcome = controller.send("hello", None).await;
    controller.wait_for_background().await;
    assert!(matches!(outcome, SendOutcome::Replied { .. }));

    let reloaded = ConversationStore::load(storage(dir.path()), NoticeStore::default()).await;
    let conversation = reloaded.active().unwrap();
    assert_eq!(conversation.title(), "Greeting Chat");
    let messages = conversation.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].sender, Sender::User);
    assert_eq!(messages[0].text, "hello");
    assert_eq!(messages[1].sender, Sender::Assistant);
    assert_eq!(messages[1].text, "Hi there!");
}

#[tokio::test]
async fn test_failed_title_falls_back_to_message_text() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(MockModelClient::from_fn(|prompt| {
        if is_title_prompt(&prompt.text) {
            Err(gemchat_core::ModelError::Network("offline".to_string()))
        } else {
            Ok("reply".to_string())
        }
    }));

    let store = ConversationStore::load(storage(dir.path()), NoticeStore::default()).await;
    let controller = MessageExchangeController::new(store, client, options());
    controller.send("hello", None).await;
    controller.wait_for_background().await;

    let store = controller.store();
    let store = store.lock().await;
    assert_eq!(store.active().unwrap().title(), "hello");
}

#[tokio::test]
async fn test_conversations_survive_restart_and_export() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(MockModelClient::echo());

    let store = ConversationStore::load(storage(dir.path()), NoticeStore::default()).await;
    let controller = MessageExchangeController::new(store, client, options());
    let first = controller.store().lock().await.active_id().unwrap().to_string();
    controller.send("soil question", None).await;
    let second = controller.create_conversation().await;
    controller.send("rain question", None).await;
    controller
        .rename_conversation(&second, "Monsoon Planning".to_string())
        .await;
    controller.wait_for_background().await;

    let reloaded = ConversationStore::load(storage(dir.path()), NoticeStore::default()).await;
    let ids: Vec<&str> = reloaded.conversations().iter().map(|c| c.id()).collect();
    assert_eq!(ids, vec![second.as_str(), first.as_str()]);
    assert_eq!(reloaded.get(&second).unwrap().title(), "Monsoon Planning");
    assert_eq!(
        reloaded.get(&first).unwrap().messages()[1].text,
        "You said: soil question"
    );

    let export_dir = dir.path().join("exports");
    let path = export_conversation(reloaded.get(&second).unwrap(), &export_dir)
        .await
        .unwrap();
    assert_eq!(path, export_dir.join(format!("monsoon_planning_{second}.json")));
}
