//! End-to-end tests for the webhook router.
//!
//! The router is driven with `tower::ServiceExt::oneshot`; the Graph API and
//! the OpenAI API are stood up as separate wiremock servers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use whatsapp_relay::error::StoreError;
use whatsapp_relay::relay::{FALLBACK_REPLY, TRANSCRIPTION_FALLBACK};
use whatsapp_relay::{router, AppState, Config, ConversationHandle, ConversationStore};

const APP_SECRET: &str = "app-secret";
const VERIFY_TOKEN: &str = "verify-me";
const SENDER: &str = "4917012345";
const SEND_PATH: &str = "/v17.0/1234/messages";

struct TestApp {
    graph: MockServer,
    openai: MockServer,
    state: AppState,
    router: Router,
}

impl TestApp {
    /// Assistant-thread mode unless `extra` blanks `OPENAI_ASSISTANT_ID`.
    async fn spawn(extra: &[(&str, &str)]) -> Self {
        Self::spawn_with(extra, None).await
    }

    async fn spawn_with(extra: &[(&str, &str)], store: Option<Arc<dyn ConversationStore>>) -> Self {
        let graph = MockServer::start().await;
        let openai = MockServer::start().await;

        let mut vars: HashMap<String, String> = [
            ("APP_SECRET", APP_SECRET.to_string()),
            ("VERIFY_TOKEN", VERIFY_TOKEN.to_string()),
            ("WHATSAPP_TOKEN", "wa-token".to_string()),
            ("WHATSAPP_API_BASE", graph.uri()),
            ("OPENAI_API_KEY", "sk-test".to_string()),
            ("OPENAI_API_BASE", openai.uri()),
            ("OPENAI_ASSISTANT_ID", "asst_test".to_string()),
            ("RUN_POLL_INTERVAL_MS", "10".to_string()),
            ("RUN_TIMEOUT_MS", "2000".to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        for (key, value) in extra {
            vars.insert(key.to_string(), value.to_string());
        }

        let config = Config::from_lookup(|name| vars.get(name).cloned());
        let state = match store {
            Some(store) => AppState::with_store(config, store).unwrap(),
            None => AppState::new(config).unwrap(),
        };

        Self {
            graph,
            openai,
            router: router(state.clone()),
            state,
        }
    }

    async fn post(&self, body: &str, signature: Option<String>) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            request = request.header("x-hub-signature-256", signature);
        }

        self.call(request.body(Body::from(body.to_string())).unwrap())
            .await
    }

    async fn post_signed(&self, body: &str) -> (StatusCode, Value) {
        self.post(body, Some(sign(body.as_bytes()))).await
    }

    async fn get(&self, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn call(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    /// Bodies of every outbound WhatsApp text send, in arrival order.
    async fn sent_texts(&self) -> Vec<String> {
        self.graph
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.method.as_str() == "POST" && r.url.path() == SEND_PATH)
            .map(|r| {
                let payload: Value = serde_json::from_slice(&r.body).unwrap();
                assert_eq!(payload["to"], SENDER);
                payload["text"]["body"].as_str().unwrap().to_string()
            })
            .collect()
    }

    async fn openai_requests(&self, method_name: &str, request_path: &str) -> usize {
        self.openai
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.method.as_str() == method_name && r.url.path() == request_path)
            .count()
    }
}

fn sign(body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(APP_SECRET.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

fn envelope(value: Value) -> String {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{"id": "WABA", "changes": [{"field": "messages", "value": value}]}]
    })
    .to_string()
}

fn text_message(text: &str) -> String {
    envelope(json!({
        "messaging_product": "whatsapp",
        "metadata": {"display_phone_number": "4930000000", "phone_number_id": "1234"},
        "messages": [{"from": SENDER, "id": "wamid.in", "type": "text", "text": {"body": text}}]
    }))
}

fn audio_message() -> String {
    envelope(json!({
        "metadata": {"phone_number_id": "1234"},
        "messages": [{
            "from": SENDER,
            "type": "audio",
            "audio": {"id": "media-9", "mime_type": "audio/ogg; codecs=opus", "voice": true}
        }]
    }))
}

async fn mount_send(graph: &MockServer) {
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messaging_product": "whatsapp",
            "messages": [{"id": "wamid.out"}]
        })))
        .mount(graph)
        .await;
}

/// Thread, message, run and reply endpoints for `thread_id` answering `reply`.
async fn mount_thread_flow(openai: &MockServer, thread_id: &str, reply: &str) {
    Mock::given(method("POST"))
        .and(path("/threads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": thread_id})))
        .mount(openai)
        .await;
    mount_run_flow(openai, thread_id, reply).await;
}

async fn mount_run_flow(openai: &MockServer, thread_id: &str, reply: &str) {
    let messages = format!("/threads/{}/messages", thread_id);

    Mock::given(method("POST"))
        .and(path(messages.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "msg_user"})))
        .mount(openai)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/threads/{}/runs", thread_id)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "run_1", "status": "queued"})),
        )
        .mount(openai)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/threads/{}/runs/run_1", thread_id)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "run_1", "status": "completed"})),
        )
        .mount(openai)
        .await;
    Mock::given(method("GET"))
        .and(path(messages.as_str()))
        .and(query_param("order", "desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "id": "msg_reply",
                "role": "assistant",
                "run_id": "run_1",
                "content": [{"type": "text", "text": {"value": reply, "annotations": []}}]
            }]
        })))
        .mount(openai)
        .await;
}

// =============================================================================
// Signature
// =============================================================================

#[tokio::test]
async fn test_invalid_signature_is_forbidden() {
    let app = TestApp::spawn(&[]).await;
    let body = text_message("Hallo");

    let (status, response) = app
        .post(&body, Some(format!("sha256={}", "0".repeat(64))))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(response, json!({"status": "error", "message": "Invalid signature"}));
    assert!(app.openai.received_requests().await.unwrap().is_empty());
    assert!(app.graph.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_signature_is_forbidden() {
    let app = TestApp::spawn(&[]).await;

    let (status, _) = app.post(&text_message("Hallo"), None).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(app.openai.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_signature_over_other_bytes_is_forbidden() {
    let app = TestApp::spawn(&[]).await;
    let body = text_message("Hallo");
    let parsed: Value = serde_json::from_str(&body).unwrap();
    let reformatted = serde_json::to_string_pretty(&parsed).unwrap();

    let (status, _) = app.post(&reformatted, Some(sign(body.as_bytes()))).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

// =============================================================================
// Payload handling
// =============================================================================

#[tokio::test]
async fn test_status_update_is_acknowledged_without_reply() {
    let app = TestApp::spawn(&[]).await;
    let body = envelope(json!({
        "metadata": {"phone_number_id": "1234"},
        "statuses": [{"id": "wamid.out", "status": "delivered", "recipient_id": SENDER}]
    }));

    let (status, response) = app.post_signed(&body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!({"status": "ok"}));
    assert!(app.graph.received_requests().await.unwrap().is_empty());
    assert!(app.openai.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_body_is_acknowledged() {
    let app = TestApp::spawn(&[]).await;

    let (status, response) = app.post_signed("").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!({"status": "ok", "message": "No valid JSON body"}));
}

#[tokio::test]
async fn test_falsy_json_is_acknowledged() {
    let app = TestApp::spawn(&[]).await;

    for body in ["[]", "\"\"", "0"] {
        let (status, response) = app.post_signed(body).await;

        assert_eq!(status, StatusCode::OK, "body {}", body);
        assert_eq!(response, json!({"status": "ok", "message": "No valid JSON body"}));
    }
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = TestApp::spawn(&[]).await;

    let (status, response) = app.post_signed("{\"entry\": [").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response, json!({"status": "error", "message": "Invalid JSON provided"}));
}

#[tokio::test]
async fn test_missing_key_is_bad_request() {
    let app = TestApp::spawn(&[]).await;
    let body = envelope(json!({
        "metadata": {"phone_number_id": "1234"},
        "messages": [{"type": "text", "text": {"body": "Hallo"}}]
    }));

    let (status, response) = app.post_signed(&body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["message"], "Missing key in payload: 'from'");
}

#[tokio::test]
async fn test_missing_phone_number_id_is_bad_request() {
    let app = TestApp::spawn(&[]).await;
    let body = envelope(json!({
        "messages": [{"from": SENDER, "type": "text", "text": {"body": "Hallo"}}]
    }));

    let (status, response) = app.post_signed(&body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["message"], "Missing key in payload: 'phone_number_id'");
    assert!(app.openai.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unrecognized_event_is_not_found() {
    let app = TestApp::spawn(&[]).await;

    let (status, response) = app.post_signed(r#"{"object": "page", "entry": []}"#).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(response, json!({"status": "error", "message": "Not a WhatsApp API event"}));
}

#[tokio::test]
async fn test_unsupported_message_type_is_ignored() {
    let app = TestApp::spawn(&[]).await;
    let body = envelope(json!({
        "metadata": {"phone_number_id": "1234"},
        "messages": [{"from": SENDER, "type": "image", "image": {"id": "img-1"}}]
    }));

    let (status, _) = app.post_signed(&body).await;

    assert_eq!(status, StatusCode::OK);
    assert!(app.graph.received_requests().await.unwrap().is_empty());
    assert!(app.openai.received_requests().await.unwrap().is_empty());
}

// =============================================================================
// Replies
// =============================================================================

#[tokio::test]
async fn test_text_message_gets_single_reply() {
    let app = TestApp::spawn(&[("WHATSAPP_PHONE_NUMBER_ID", "1234")]).await;
    mount_thread_flow(&app.openai, "thread_1", "Hallo! Wie kann ich helfen?").await;
    mount_send(&app.graph).await;

    // Payload without metadata falls back to the configured number.
    let body = r#"{"entry":[{"changes":[{"value":{"messages":[{"from":"4917012345","type":"text","text":{"body":"Hallo"}}]}}]}]}"#;
    let (status, response) = app.post_signed(body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!({"status": "ok"}));
    assert_eq!(app.sent_texts().await, vec!["Hallo! Wie kann ich helfen?"]);
}

#[tokio::test]
async fn test_same_sender_reuses_thread() {
    let app = TestApp::spawn(&[]).await;
    Mock::given(method("POST"))
        .and(path("/threads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "thread_1"})))
        .expect(1)
        .mount(&app.openai)
        .await;
    mount_run_flow(&app.openai, "thread_1", "Antwort").await;
    mount_send(&app.graph).await;

    let (first, _) = app.post_signed(&text_message("Hallo")).await;
    let (second, _) = app.post_signed(&text_message("Noch eine Frage")).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(app.sent_texts().await.len(), 2);
    assert_eq!(app.openai_requests("POST", "/threads/thread_1/messages").await, 2);
    assert_eq!(
        app.state.conversations.get(SENDER).await.unwrap(),
        Some(ConversationHandle::new("thread_1"))
    );
}

#[tokio::test]
async fn test_reply_is_split_into_ordered_sends() {
    let app = TestApp::spawn(&[]).await;
    mount_thread_flow(&app.openai, "thread_1", "Erster Teil[NL]Zweiter Teil\\nmit Umbruch").await;
    mount_send(&app.graph).await;

    let (status, _) = app.post_signed(&text_message("Hallo")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        app.sent_texts().await,
        vec!["Erster Teil", "Zweiter Teil\nmit Umbruch"]
    );
}

#[tokio::test]
async fn test_marker_only_reply_sends_fallback() {
    let app = TestApp::spawn(&[]).await;
    mount_thread_flow(&app.openai, "thread_1", "[NL] \\n [NL]").await;
    mount_send(&app.graph).await;

    let (status, _) = app.post_signed(&text_message("Hallo")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.sent_texts().await, vec![FALLBACK_REPLY]);
}

#[tokio::test]
async fn test_chat_completion_mode() {
    let app = TestApp::spawn(&[("OPENAI_ASSISTANT_ID", "")]).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"messages": [{"role": "user", "content": "Hallo"}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hi!"}}]
        })))
        .expect(1)
        .mount(&app.openai)
        .await;
    mount_send(&app.graph).await;

    let (status, _) = app.post_signed(&text_message("Hallo")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.sent_texts().await, vec!["Hi!"]);
    assert_eq!(app.openai_requests("POST", "/threads").await, 0);
}

#[tokio::test]
async fn test_backend_failure_sends_fallback() {
    let app = TestApp::spawn(&[]).await;
    Mock::given(method("POST"))
        .and(path("/threads"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&app.openai)
        .await;
    mount_send(&app.graph).await;

    let (status, _) = app.post_signed(&text_message("Hallo")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.sent_texts().await, vec![FALLBACK_REPLY]);
}

#[tokio::test]
async fn test_send_failure_is_still_acknowledged() {
    let app = TestApp::spawn(&[]).await;
    mount_thread_flow(&app.openai, "thread_1", "Antwort").await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"message": "Recipient not allowed", "code": 131030}
        })))
        .expect(1)
        .mount(&app.graph)
        .await;

    let (status, response) = app.post_signed(&text_message("Hallo")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!({"status": "ok"}));
}

// =============================================================================
// Assistant runs
// =============================================================================

#[tokio::test]
async fn test_run_is_polled_until_completed() {
    let app = TestApp::spawn(&[]).await;
    Mock::given(method("GET"))
        .and(path("/threads/thread_1/runs/run_1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "run_1", "status": "in_progress"})),
        )
        .up_to_n_times(2)
        .mount(&app.openai)
        .await;
    mount_thread_flow(&app.openai, "thread_1", "Fertig").await;
    mount_send(&app.graph).await;

    let (status, _) = app.post_signed(&text_message("Hallo")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.sent_texts().await, vec!["Fertig"]);
    assert_eq!(app.openai_requests("GET", "/threads/thread_1/runs/run_1").await, 3);
}

#[tokio::test]
async fn test_run_timeout_cancels_and_sends_fallback() {
    let app = TestApp::spawn(&[("RUN_TIMEOUT_MS", "100")]).await;
    Mock::given(method("GET"))
        .and(path("/threads/thread_1/runs/run_1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "run_1", "status": "in_progress"})),
        )
        .mount(&app.openai)
        .await;
    Mock::given(method("POST"))
        .and(path("/threads/thread_1/runs/run_1/cancel"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "run_1", "status": "cancelling"})),
        )
        .expect(1)
        .mount(&app.openai)
        .await;
    mount_thread_flow(&app.openai, "thread_1", "zu spät").await;
    mount_send(&app.graph).await;

    let (status, _) = app.post_signed(&text_message("Hallo")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.sent_texts().await, vec![FALLBACK_REPLY]);
}

#[tokio::test]
async fn test_missing_thread_is_recreated() {
    let app = TestApp::spawn(&[]).await;
    app.state
        .conversations
        .update(SENDER, ConversationHandle::new("thread_old"))
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/threads/thread_old/messages"))
        .respond_with(ResponseTemplate::new(404).set_body_string("No thread found"))
        .expect(1)
        .mount(&app.openai)
        .await;
    mount_thread_flow(&app.openai, "thread_new", "Neu gestartet").await;
    mount_send(&app.graph).await;

    let (status, _) = app.post_signed(&text_message("Hallo")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.sent_texts().await, vec!["Neu gestartet"]);
    assert_eq!(
        app.state.conversations.get(SENDER).await.unwrap(),
        Some(ConversationHandle::new("thread_new"))
    );
}

struct UnavailableStore;

#[async_trait]
impl ConversationStore for UnavailableStore {
    async fn get(&self, _sender: &str) -> Result<Option<ConversationHandle>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn get_or_insert(
        &self,
        _sender: &str,
        _handle: ConversationHandle,
    ) -> Result<ConversationHandle, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn update(&self, _sender: &str, _handle: ConversationHandle) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

#[tokio::test]
async fn test_store_failure_is_internal_error() {
    let store: Arc<dyn ConversationStore> = Arc::new(UnavailableStore);
    let app = TestApp::spawn_with(&[], Some(store)).await;
    mount_send(&app.graph).await;

    let (status, response) = app.post_signed(&text_message("Hallo")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response, json!({"status": "error", "message": "Internal server error"}));
    assert!(app.sent_texts().await.is_empty());
}

// =============================================================================
// Voice notes
// =============================================================================

#[tokio::test]
async fn test_voice_note_is_transcribed_and_answered() {
    let app = TestApp::spawn(&[]).await;
    Mock::given(method("GET"))
        .and(path("/v17.0/media-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "media-9",
            "mime_type": "audio/ogg",
            "url": format!("{}/download/media-9", app.graph.uri())
        })))
        .mount(&app.graph)
        .await;
    Mock::given(method("GET"))
        .and(path("/download/media-9"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"OggS-voice".to_vec()))
        .mount(&app.graph)
        .await;
    Mock::given(method("POST"))
        .and(path("/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Wie spät ist es?\n"))
        .expect(1)
        .mount(&app.openai)
        .await;
    Mock::given(method("POST"))
        .and(path("/threads/thread_1/messages"))
        .and(body_partial_json(json!({"content": "Wie spät ist es?"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "msg_voice"})))
        .expect(1)
        .mount(&app.openai)
        .await;
    mount_thread_flow(&app.openai, "thread_1", "Es ist Mittag.").await;
    mount_send(&app.graph).await;

    let (status, _) = app.post_signed(&audio_message()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.sent_texts().await, vec!["Es ist Mittag."]);
}

#[tokio::test]
async fn test_voice_note_download_failure_sends_fixed_text() {
    let app = TestApp::spawn(&[]).await;
    Mock::given(method("GET"))
        .and(path("/v17.0/media-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": format!("{}/download/media-9", app.graph.uri())
        })))
        .mount(&app.graph)
        .await;
    Mock::given(method("GET"))
        .and(path("/download/media-9"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&app.graph)
        .await;
    mount_send(&app.graph).await;

    let (status, _) = app.post_signed(&audio_message()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.sent_texts().await, vec![TRANSCRIPTION_FALLBACK]);
    assert!(app.openai.received_requests().await.unwrap().is_empty());
}

// =============================================================================
// Verification handshake and health
// =============================================================================

#[tokio::test]
async fn test_verification_echoes_challenge() {
    let app = TestApp::spawn(&[]).await;

    let (status, body) = app
        .get("/webhook?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=1158201444")
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "1158201444");
}

#[tokio::test]
async fn test_verification_wrong_token_is_forbidden() {
    let app = TestApp::spawn(&[]).await;

    let (status, body) = app
        .get("/webhook?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=42")
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("Verification failed"));

    let (status, _) = app
        .get("/webhook?hub.mode=unsubscribe&hub.verify_token=verify-me&hub.challenge=42")
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_verification_missing_parameters() {
    let app = TestApp::spawn(&[]).await;

    let (status, body) = app.get("/webhook?hub.mode=subscribe").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Missing parameters"));
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::spawn(&[]).await;

    let (status, body) = app.get("/health").await;
    let body: Value = serde_json::from_str(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"status": "ok", "reply_mode": "assistant_thread", "conversations": 0})
    );
}
