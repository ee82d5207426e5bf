//! Webhook endpoint handlers.
//!
//! `GET /webhook` answers Meta's subscription handshake. `POST /webhook`
//! verifies the payload signature and hands the raw body to the relay.
//! The POST handler answers 200 for everything it accepts, even when a
//! downstream call failed, because Meta redelivers unacknowledged events.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::clients::{build_http_client, OpenAiClient, WhatsAppClient};
use crate::error::RelayError;
use crate::relay::{relay_webhook, RelayOutcome};
use crate::store::{ConversationStore, InMemoryConversationStore};
use crate::web::signature::{verify_signature, SIGNATURE_HEADER};
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub whatsapp: WhatsAppClient,
    pub openai: OpenAiClient,
    pub conversations: Arc<dyn ConversationStore>,
}

impl AppState {
    /// Build state with the in-memory conversation store.
    pub fn new(config: Config) -> Result<Self> {
        let store = InMemoryConversationStore::new(
            config.conversation_ttl(),
            config.conversation_max_entries,
        );
        Self::with_store(config, Arc::new(store))
    }

    pub fn with_store(config: Config, conversations: Arc<dyn ConversationStore>) -> Result<Self> {
        let http = build_http_client(&config)?;

        Ok(Self {
            whatsapp: WhatsAppClient::new(http.clone(), &config),
            openai: OpenAiClient::new(http, &config),
            config: Arc::new(config),
            conversations,
        })
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub reply_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversations: Option<usize>,
}

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let reply_mode = if state.config.uses_threads() {
        "assistant_thread"
    } else {
        "chat_completion"
    };

    Json(HealthResponse {
        status: "ok",
        reply_mode,
        conversations: state.conversations.len().await.ok(),
    })
}

// =============================================================================
// Webhook
// =============================================================================

/// JSON body of every webhook response except the verification echo.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WebhookResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok",
            message: None,
        }
    }

    pub fn ok_with(message: impl Into<String>) -> Self {
        Self {
            status: "ok",
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: Some(message.into()),
        }
    }
}

/// Query parameters of the subscription handshake.
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Subscription handshake endpoint.
///
/// Echoes `hub.challenge` when `hub.mode` is `subscribe` and the token
/// matches the configured verify token.
pub async fn verify_webhook(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    let (Some(mode), Some(token), Some(challenge)) = (query.mode, query.verify_token, query.challenge)
    else {
        info!("webhook_verify_missing_parameters");
        return (
            StatusCode::BAD_REQUEST,
            Json(WebhookResponse::error("Missing parameters")),
        )
            .into_response();
    };

    let token_matches = state
        .config
        .verify_token
        .as_deref()
        .is_some_and(|expected| expected == token);

    if mode == "subscribe" && token_matches {
        info!("webhook_verified");
        return (StatusCode::OK, challenge).into_response();
    }

    warn!(mode = %mode, token_matches = token_matches, "webhook_verification_failed");
    (
        StatusCode::FORBIDDEN,
        Json(WebhookResponse::error("Verification failed")),
    )
        .into_response()
}

/// Webhook delivery endpoint.
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    info!(
        body_length = body.len(),
        has_signature = signature.is_some(),
        "webhook_received"
    );

    let verified = match (state.config.app_secret.as_deref(), signature) {
        (Some(secret), Some(signature)) => verify_signature(secret, &body, signature),
        (None, _) => {
            error!("webhook_app_secret_not_configured");
            false
        }
        (_, None) => false,
    };

    if !verified {
        warn!(has_signature = signature.is_some(), "webhook_signature_rejected");
        return RelayError::InvalidSignature.into_response();
    }

    match relay_webhook(&state, &body).await {
        Ok(RelayOutcome::NoContent) => (
            StatusCode::OK,
            Json(WebhookResponse::ok_with("No valid JSON body")),
        )
            .into_response(),
        Ok(outcome) => {
            info!(outcome = ?outcome, "webhook_processed");
            (StatusCode::OK, Json(WebhookResponse::ok())).into_response()
        }
        Err(e) => {
            match &e {
                RelayError::Internal(source) => {
                    error!(error = %source, "webhook_internal_error")
                }
                other => warn!(error = %other, "webhook_rejected"),
            }
            e.into_response()
        }
    }
}
