//! HTTP clients for the two external services.
//!
//! Both clients share one `reqwest::Client` so connections are pooled across
//! requests. Every call is made once; there are no retries.

pub mod openai;
pub mod whatsapp;

use anyhow::{Context, Result};
use reqwest::Client;

use crate::Config;

pub use openai::{OpenAiClient, Run, RunStatus};
pub use whatsapp::WhatsAppClient;

/// Build the shared HTTP client with the configured per-request timeout.
pub fn build_http_client(config: &Config) -> Result<Client> {
    Client::builder()
        .timeout(config.request_timeout())
        .pool_max_idle_per_host(32)
        .build()
        .context("Failed to create HTTP client")
}
