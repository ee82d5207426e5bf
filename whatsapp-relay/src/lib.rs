//! WhatsApp relay - webhook bridge between WhatsApp and an OpenAI assistant.
//!
//! Receives signed WhatsApp Cloud API webhooks, turns text and voice
//! messages into assistant prompts, and sends the assistant's answer back
//! to the sender.
//!
//! ## Architecture
//!
//! ```text
//! Meta → POST /webhook → signature → relay → OpenAI → WhatsApp send API
//!                                      │
//!                            conversation store (sender → thread)
//! ```

pub mod clients;
pub mod config;
pub mod error;
pub mod event;
pub mod relay;
pub mod store;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use error::RelayError;
pub use relay::{relay_webhook, RelayOutcome};
pub use store::{ConversationHandle, ConversationStore, InMemoryConversationStore};
pub use web::{router, AppState};
