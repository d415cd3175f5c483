//! The enable-model-access tool end to end

mod common;

use common::{start_relay, start_upstream, MockResponse};
use serde_json::{json, Value};
use std::sync::Arc;

use broker_relay::access::{enable_model_access, AccessContext, ADMIN_HINT};
use broker_relay::events::{ChannelEmitter, NotificationLevel, UiEvent};
use async_trait::async_trait;
use broker_relay::host::{FileUserStore, MemoryUserStore, StoreError, UserRecord, UserStore};
use serde_json::Map;
use broker_relay::server::USER_ID_HEADER;

fn user_with_settings() -> UserRecord {
    let mut user = UserRecord::new("u1", Some("oidc@abc123"));
    user.settings = Some(
        json!({
            "ui": { "theme": "dark", "directConnections": { "stale": true } },
            "notes": "keep me"
        })
        .as_object()
        .unwrap()
        .clone(),
    );
    user
}

async fn drain(mut rx: tokio::sync::mpsc::Receiver<UiEvent>) -> Vec<UiEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_success_stores_direct_connection_and_keeps_other_settings() {
    let upstream = start_upstream().await;
    let config = upstream.config();
    upstream.queue_broker(MockResponse::json(200, json!({ "token": "tok_1" })));
    let store = MemoryUserStore::with_users([user_with_settings()]);
    let http = reqwest::Client::new();

    let (emitter, rx) = ChannelEmitter::channel(16);
    let ctx = AccessContext {
        config: &config,
        http: &http,
        store: &store,
    };
    let text = enable_model_access(&ctx, "u1", &emitter).await;
    drop(emitter);

    assert_eq!(
        text,
        "✅ Please **refresh the page** to access newly enabled models.\nRemember to top-up credit balance at https://ai.lklk.tech."
    );

    let user = store.get_user("u1").await.unwrap().unwrap();
    let settings = user.settings.unwrap();
    assert_eq!(settings["notes"], "keep me");
    assert_eq!(settings["ui"]["theme"], "dark");
    assert_eq!(
        settings["ui"]["directConnections"],
        json!({
            "OPENAI_API_BASE_URLS": [format!("http://{}/v1", upstream.addr)],
            "OPENAI_API_KEYS": ["tok_1"],
            "OPENAI_API_CONFIGS": {
                "0": {
                    "enable": true,
                    "tags": [],
                    "prefix_id": "",
                    "model_ids": [],
                    "connection_type": "external"
                }
            }
        })
    );
    assert!(user.updated_at.is_some());

    let events = drain(rx).await;
    assert_eq!(
        events,
        vec![
            UiEvent::status("Enabling model access", false),
            UiEvent::status("Obtaining API key", false),
            UiEvent::status("Configuring direct connection", false),
            UiEvent::notification(NotificationLevel::Success, "Operation completed."),
            UiEvent::status("API Key configured", true),
        ]
    );
}

#[tokio::test]
async fn test_broker_404_returns_login_hint_and_leaves_settings() {
    let upstream = start_upstream().await;
    let config = upstream.config();
    upstream.queue_broker(MockResponse::json(404, json!({ "detail": "unknown" })));
    let store = MemoryUserStore::with_users([user_with_settings()]);
    let http = reqwest::Client::new();

    let (emitter, rx) = ChannelEmitter::channel(16);
    let ctx = AccessContext {
        config: &config,
        http: &http,
        store: &store,
    };
    let text = enable_model_access(&ctx, "u1", &emitter).await;
    drop(emitter);

    assert_eq!(
        text,
        "❗ **User not found at LakeLink AI Aggregator.**\nPlease first login using OIDC at https://ai.lklk.tech."
    );
    let user = store.get_user("u1").await.unwrap().unwrap();
    assert_eq!(user.settings, user_with_settings().settings);

    let events = drain(rx).await;
    assert!(events.contains(&UiEvent::notification(
        NotificationLevel::Warning,
        "Please first login using OIDC at https://ai.lklk.tech."
    )));
    assert!(!events.contains(&UiEvent::status("Configuring direct connection", false)));
}

#[tokio::test]
async fn test_broker_failure_points_at_administrator() {
    let upstream = start_upstream().await;
    let config = upstream.config();
    upstream.queue_broker(MockResponse::text(502, "upstream down"));
    let store = MemoryUserStore::with_users([user_with_settings()]);
    let http = reqwest::Client::new();

    let (emitter, rx) = ChannelEmitter::channel(16);
    let ctx = AccessContext {
        config: &config,
        http: &http,
        store: &store,
    };
    let text = enable_model_access(&ctx, "u1", &emitter).await;
    drop(emitter);

    assert_eq!(
        text,
        format!(
            "❗ **An error occurred while obtaining API key: upstream down**\n{}",
            ADMIN_HINT
        )
    );
    let events = drain(rx).await;
    assert!(events.contains(&UiEvent::notification(NotificationLevel::Warning, ADMIN_HINT)));
}

/// Serves users from memory but fails every settings write
struct ReadOnlyStore(MemoryUserStore);

#[async_trait]
impl UserStore for ReadOnlyStore {
    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        self.0.get_user(id).await
    }

    async fn update_user_settings(
        &self,
        _id: &str,
        _settings: Map<String, Value>,
    ) -> Result<UserRecord, StoreError> {
        Err(StoreError::Io {
            path: "users.json".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        })
    }
}

#[tokio::test]
async fn test_settings_write_failure_is_reported_and_leaves_settings() {
    let upstream = start_upstream().await;
    let config = upstream.config();
    upstream.queue_broker(MockResponse::json(200, json!({ "token": "tok_1" })));
    let store = ReadOnlyStore(MemoryUserStore::with_users([user_with_settings()]));
    let http = reqwest::Client::new();

    let (emitter, rx) = ChannelEmitter::channel(16);
    let ctx = AccessContext {
        config: &config,
        http: &http,
        store: &store,
    };
    let text = enable_model_access(&ctx, "u1", &emitter).await;
    drop(emitter);

    let failure = "Failed to access user store users.json: read-only";
    assert_eq!(text, format!("Tell the user: {}", failure));

    let events = drain(rx).await;
    assert!(events.contains(&UiEvent::status("Configuring direct connection", false)));
    assert!(events.contains(&UiEvent::notification(NotificationLevel::Warning, ADMIN_HINT)));
    assert_eq!(
        events.last().unwrap(),
        &UiEvent::status(format!("An error occurred: {}", failure), true)
    );
    assert!(!events.contains(&UiEvent::status("API Key configured", true)));

    let user = store.get_user("u1").await.unwrap().unwrap();
    assert_eq!(user.settings, user_with_settings().settings);
}

#[tokio::test]
async fn test_file_store_persists_the_connection() {
    let upstream = start_upstream().await;
    let config = upstream.config();
    upstream.queue_broker(MockResponse::json(200, json!({ "token": "tok_file" })));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.json");
    std::fs::write(&path, serde_json::to_string(&vec![user_with_settings()]).unwrap()).unwrap();

    let store = FileUserStore::open(&path).unwrap();
    let http = reqwest::Client::new();
    let (emitter, _rx) = ChannelEmitter::channel(16);
    let ctx = AccessContext {
        config: &config,
        http: &http,
        store: &store,
    };
    enable_model_access(&ctx, "u1", &emitter).await;

    let reopened = FileUserStore::open(&path).unwrap();
    let user = reopened.get_user("u1").await.unwrap().unwrap();
    let keys = &user.settings.unwrap()["ui"]["directConnections"]["OPENAI_API_KEYS"];
    assert_eq!(keys, &json!(["tok_file"]));
}

/// Split an SSE body into (event name, data) pairs
fn parse_sse(body: &str) -> Vec<(Option<String>, Value)> {
    body.split("\n\n")
        .filter(|block| !block.trim().is_empty())
        .map(|block| {
            let mut name = None;
            let mut data = Value::Null;
            for line in block.lines() {
                if let Some(rest) = line.strip_prefix("event:") {
                    name = Some(rest.trim().to_string());
                } else if let Some(rest) = line.strip_prefix("data:") {
                    data = serde_json::from_str(rest.trim()).unwrap();
                }
            }
            (name, data)
        })
        .collect()
}

#[tokio::test]
async fn test_tool_route_streams_events_then_result() {
    let upstream = start_upstream().await;
    let config = upstream.config();
    upstream.queue_broker(MockResponse::json(200, json!({ "token": "tok_1" })));
    let store: Arc<dyn UserStore> = Arc::new(MemoryUserStore::with_users([user_with_settings()]));

    let relay = start_relay(config, store.clone()).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/tools/enable_model_access", relay))
        .header(USER_ID_HEADER, "u1")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let events = parse_sse(&resp.text().await.unwrap());

    assert_eq!(
        events.first().unwrap(),
        &(None, json!({ "type": "status", "data": { "description": "Enabling model access", "done": false } }))
    );
    assert!(events.contains(&(
        None,
        json!({ "type": "notification", "data": { "type": "success", "content": "Operation completed." } })
    )));
    let (name, data) = events.last().unwrap();
    assert_eq!(name.as_deref(), Some("result"));
    assert!(data["result"].as_str().unwrap().starts_with("✅"));

    let user = store.get_user("u1").await.unwrap().unwrap();
    assert!(user.ui_settings().unwrap().contains_key("directConnections"));
}
