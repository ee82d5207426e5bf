//! Error types for each stage of the relay.
//!
//! Only [`RelayError`] reaches the HTTP layer. Failures of the outbound
//! services are absorbed into fallback replies by the relay.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::web::WebhookResponse;

/// Errors that terminate webhook processing with a non-200 status.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid JSON provided")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Missing key in payload: '{0}'")]
    MissingKey(&'static str),

    #[error("Not a WhatsApp API event")]
    UnrecognizedEvent,

    #[error("Internal server error")]
    Internal(#[source] anyhow::Error),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::InvalidSignature => StatusCode::FORBIDDEN,
            RelayError::InvalidJson(_) | RelayError::MissingKey(_) => StatusCode::BAD_REQUEST,
            RelayError::UnrecognizedEvent => StatusCode::NOT_FOUND,
            RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        // The Display text is the client-facing message; sources stay in the logs.
        (
            self.status_code(),
            Json(WebhookResponse::error(self.to_string())),
        )
            .into_response()
    }
}

/// Errors from the WhatsApp Graph API.
#[derive(Debug, Error)]
pub enum WhatsAppError {
    #[error("{stage} returned HTTP {status}: {body}")]
    Status {
        stage: &'static str,
        status: u16,
        body: String,
    },

    #[error("media metadata has no download url")]
    MissingMediaUrl,

    #[error("graph api request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors from the OpenAI API.
#[derive(Debug, Error)]
pub enum OpenAiError {
    #[error("openai returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("openai request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("run {run_id} did not finish within {waited_ms} ms")]
    RunTimeout { run_id: String, waited_ms: u64 },

    #[error("run {run_id} ended with status {status}")]
    RunEnded { run_id: String, status: String },
}

impl OpenAiError {
    /// Whether the backend reported the addressed resource as gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, OpenAiError::Status { status: 404, .. })
    }
}

/// Errors from a [`ConversationStore`](crate::store::ConversationStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conversation store unavailable: {0}")]
    Unavailable(String),
}

/// Failure while turning a voice note into text.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("media fetch failed: {0}")]
    Media(#[from] WhatsAppError),

    #[error("transcription failed: {0}")]
    Backend(#[from] OpenAiError),
}

impl TranscriptionError {
    /// Pipeline step that failed, for logging.
    pub fn stage(&self) -> &'static str {
        match self {
            TranscriptionError::Media(WhatsAppError::Status { stage, .. }) => stage,
            TranscriptionError::Media(WhatsAppError::MissingMediaUrl) => "media_metadata",
            TranscriptionError::Media(WhatsAppError::Http(_)) => "media_request",
            TranscriptionError::Backend(_) => "transcription",
        }
    }
}

/// Failure while producing an assistant reply on a conversation thread.
#[derive(Debug, Error)]
pub enum ConversationError {
    #[error(transparent)]
    Backend(#[from] OpenAiError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
