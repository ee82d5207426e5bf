//! Message relay: turns a verified webhook body into WhatsApp replies.
//!
//! ## Processing Flow
//!
//! ```text
//! body → parse → classify → text (transcribe audio) → reply → split → send
//! ```
//!
//! Each step either hands over to the next one or ends the request with a
//! [`RelayOutcome`]. Failures of the outbound services never end the request
//! with an error status; they degrade to a fallback reply.

pub mod conversation;
pub mod reply;

use tracing::{info, warn};

use crate::error::{RelayError, TranscriptionError};
use crate::event::{classify, parse_body, InboundEvent, MessageContent};
use crate::web::AppState;

pub use conversation::{generate_reply, wait_for_run, FALLBACK_REPLY};
pub use reply::split_reply;

/// Sent instead of a model reply when a voice note cannot be transcribed.
pub const TRANSCRIPTION_FALLBACK: &str = "Transcription failed.";

/// How a webhook delivery was handled. Every outcome is acknowledged with 200.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Body carried no JSON content.
    NoContent,
    /// Delivery/read receipt.
    StatusUpdate,
    /// Message type the relay does not answer.
    Unsupported,
    /// Message resolved to empty text.
    EmptyText,
    /// Reply delivered; `sent` of `parts` sends succeeded.
    Replied { sent: usize, parts: usize },
}

/// Process a webhook body whose signature has already been verified.
pub async fn relay_webhook(state: &AppState, body: &[u8]) -> Result<RelayOutcome, RelayError> {
    let Some(payload) = parse_body(body)? else {
        info!(body_length = body.len(), "relay_no_content");
        return Ok(RelayOutcome::NoContent);
    };

    let message = match classify(&payload)? {
        InboundEvent::Status { count } => {
            info!(statuses = count, "relay_status_update");
            return Ok(RelayOutcome::StatusUpdate);
        }
        InboundEvent::Message(message) => message,
    };

    info!(
        sender = %message.from,
        message_id = ?message.id,
        "relay_message_received"
    );

    if let MessageContent::Unsupported(kind) = &message.content {
        info!(sender = %message.from, message_type = %kind, "relay_unsupported_type");
        return Ok(RelayOutcome::Unsupported);
    }

    // Payload metadata wins over the configured default number.
    let phone_number_id = message
        .phone_number_id
        .clone()
        .or_else(|| state.config.phone_number_id.clone())
        .ok_or(RelayError::MissingKey("phone_number_id"))?;

    let text = match &message.content {
        MessageContent::Text(body) => body.clone(),
        MessageContent::Audio {
            media_id,
            mime_type,
        } => match transcribe_voice_note(state, media_id, mime_type.as_deref()).await {
            Ok(transcript) => transcript,
            Err(e) => {
                warn!(
                    sender = %message.from,
                    media_id = %media_id,
                    stage = e.stage(),
                    error = %e,
                    "relay_transcription_failed"
                );
                return deliver(state, &phone_number_id, &message.from, TRANSCRIPTION_FALLBACK)
                    .await;
            }
        },
        MessageContent::Unsupported(_) => return Ok(RelayOutcome::Unsupported),
    };

    if text.trim().is_empty() {
        info!(sender = %message.from, "relay_empty_text");
        return Ok(RelayOutcome::EmptyText);
    }

    info!(sender = %message.from, text_length = text.len(), "relay_text_resolved");

    let reply = generate_reply(state, &message.from, &text)
        .await
        .map_err(|e| RelayError::Internal(e.into()))?;

    deliver(state, &phone_number_id, &message.from, &reply).await
}

/// Fetch a voice note from WhatsApp and transcribe it.
async fn transcribe_voice_note(
    state: &AppState,
    media_id: &str,
    mime_type: Option<&str>,
) -> Result<String, TranscriptionError> {
    let url = state.whatsapp.fetch_media_url(media_id).await?;
    let audio = state.whatsapp.download_media(&url).await?;

    let mime_type = mime_type
        .and_then(|m| m.split(';').next())
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or("audio/ogg");

    let transcript = state
        .openai
        .transcribe(audio, audio_file_name(mime_type), mime_type)
        .await?;

    Ok(transcript)
}

/// File name whose extension tells the transcription backend the container format.
fn audio_file_name(mime_type: &str) -> &'static str {
    match mime_type {
        "audio/mpeg" | "audio/mp3" => "audio.mp3",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "audio.m4a",
        "audio/wav" | "audio/x-wav" => "audio.wav",
        "audio/webm" => "audio.webm",
        _ => "audio.ogg",
    }
}

/// Send every part of `reply` to `to`, in order.
///
/// Sends are best effort: a failed part is logged and the rest still go out.
/// A reply that splits into nothing is replaced by [`FALLBACK_REPLY`].
async fn deliver(
    state: &AppState,
    phone_number_id: &str,
    to: &str,
    reply: &str,
) -> Result<RelayOutcome, RelayError> {
    let mut parts = split_reply(reply, &state.config.reply_split_marker);
    if parts.is_empty() {
        warn!(to = %to, reply_length = reply.len(), "relay_reply_blank_after_split");
        parts.push(FALLBACK_REPLY.to_string());
    }
    let mut sent = 0;

    for (index, part) in parts.iter().enumerate() {
        match state
            .whatsapp
            .send_text(phone_number_id, to, part)
            .await
        {
            Ok(()) => sent += 1,
            Err(e) => {
                warn!(
                    to = %to,
                    part = index,
                    error = %e,
                    "relay_send_failed"
                );
            }
        }
    }

    info!(
        to = %to,
        parts = parts.len(),
        sent = sent,
        "relay_reply_delivered"
    );

    Ok(RelayOutcome::Replied {
        sent,
        parts: parts.len(),
    })
}
