//! Web server module for the WhatsApp webhook.
//!
//! This module provides:
//! - Signature verification of inbound deliveries
//! - The subscription handshake and delivery handlers
//! - The router shared by the binary and the integration tests

pub mod handlers;
pub mod signature;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use tower_http::trace::TraceLayer;

pub use handlers::{
    health, receive_webhook, verify_webhook, AppState, HealthResponse, VerifyQuery,
    WebhookResponse,
};
pub use signature::{verify_signature, SIGNATURE_HEADER};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let max_body_bytes = state.config.max_body_bytes;

    Router::new()
        .route("/health", get(health))
        .route("/webhook", get(verify_webhook).post(receive_webhook))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
