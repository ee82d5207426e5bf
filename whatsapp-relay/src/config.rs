//! Configuration module for environment variable parsing.
//!
//! All settings are read once at startup. Secrets stay optional here so the
//! binary can report every missing variable at once instead of failing on the
//! first one.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;
use url::Url;

pub const DEFAULT_WHATSAPP_API_BASE: &str = "https://graph.facebook.com";
pub const DEFAULT_WHATSAPP_API_VERSION: &str = "v17.0";
pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_REPLY_SPLIT_MARKER: &str = "[NL]";

/// Application configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Meta app secret used to sign webhook deliveries
    pub app_secret: Option<String>,

    /// Token echoed back by Meta during the GET verification handshake
    pub verify_token: Option<String>,

    /// Bearer token for the WhatsApp Graph API
    pub whatsapp_token: Option<String>,

    pub whatsapp_api_base: String,
    pub whatsapp_api_version: String,

    /// Sending number used when a payload carries no `metadata.phone_number_id`
    pub phone_number_id: Option<String>,

    /// Bearer token for the OpenAI API
    pub openai_api_key: Option<String>,

    pub openai_api_base: String,

    /// Assistant to run on per-sender threads. Unset means stateless completions.
    pub assistant_id: Option<String>,

    /// Chat model used when no assistant is configured
    pub openai_model: String,

    /// Optional system prompt for stateless completions
    pub system_prompt: Option<String>,

    /// Speech-to-text model for voice notes
    pub transcription_model: String,

    /// Delay between two run status polls
    pub run_poll_interval_ms: u64,

    /// Deadline for an assistant run to reach a terminal status
    pub run_timeout_ms: u64,

    /// Timeout applied to every outbound HTTP request
    pub request_timeout_ms: u64,

    /// Idle time after which a sender's conversation is forgotten
    pub conversation_ttl_secs: u64,

    /// Maximum number of senders tracked at once
    pub conversation_max_entries: usize,

    /// Marker the assistant uses to request separate WhatsApp messages
    pub reply_split_marker: String,

    /// Maximum accepted webhook body size
    pub max_body_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Config {
            port: parse_or(&lookup, "PORT", 8080),

            app_secret: non_empty(&lookup, "APP_SECRET"),
            verify_token: non_empty(&lookup, "VERIFY_TOKEN"),
            whatsapp_token: non_empty(&lookup, "WHATSAPP_TOKEN"),

            whatsapp_api_base: base_url(&lookup, "WHATSAPP_API_BASE", DEFAULT_WHATSAPP_API_BASE),
            whatsapp_api_version: non_empty(&lookup, "WHATSAPP_API_VERSION")
                .unwrap_or_else(|| DEFAULT_WHATSAPP_API_VERSION.to_string()),
            phone_number_id: non_empty(&lookup, "WHATSAPP_PHONE_NUMBER_ID"),

            openai_api_key: non_empty(&lookup, "OPENAI_API_KEY"),
            openai_api_base: base_url(&lookup, "OPENAI_API_BASE", DEFAULT_OPENAI_API_BASE),
            assistant_id: non_empty(&lookup, "OPENAI_ASSISTANT_ID"),
            openai_model: non_empty(&lookup, "OPENAI_MODEL")
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            system_prompt: non_empty(&lookup, "OPENAI_SYSTEM_PROMPT"),
            transcription_model: non_empty(&lookup, "TRANSCRIPTION_MODEL")
                .unwrap_or_else(|| "whisper-1".to_string()),

            run_poll_interval_ms: parse_or(&lookup, "RUN_POLL_INTERVAL_MS", 500),
            run_timeout_ms: parse_or(&lookup, "RUN_TIMEOUT_MS", 60_000),
            request_timeout_ms: parse_or(&lookup, "REQUEST_TIMEOUT_MS", 30_000),

            conversation_ttl_secs: parse_or(&lookup, "CONVERSATION_TTL_SECS", 86_400),
            conversation_max_entries: parse_or(&lookup, "CONVERSATION_MAX_ENTRIES", 10_000),

            // Not trimmed: the marker is matched verbatim.
            reply_split_marker: lookup("REPLY_SPLIT_MARKER")
                .unwrap_or_else(|| DEFAULT_REPLY_SPLIT_MARKER.to_string()),

            max_body_bytes: parse_or(&lookup, "MAX_BODY_BYTES", 1024 * 1024),
        }
    }

    /// Names of required variables that are not set.
    pub fn missing_required(&self) -> Vec<&'static str> {
        [
            ("APP_SECRET", self.app_secret.is_none()),
            ("VERIFY_TOKEN", self.verify_token.is_none()),
            ("WHATSAPP_TOKEN", self.whatsapp_token.is_none()),
            ("OPENAI_API_KEY", self.openai_api_key.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, missing)| missing.then_some(name))
        .collect()
    }

    /// Whether replies come from an assistant thread (multi-turn memory).
    pub fn uses_threads(&self) -> bool {
        self.assistant_id.is_some()
    }

    pub fn run_poll_interval(&self) -> Duration {
        Duration::from_millis(self.run_poll_interval_ms)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn conversation_ttl(&self) -> Duration {
        Duration::from_secs(self.conversation_ttl_secs)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("app_secret_set", &self.app_secret.is_some())
            .field("verify_token_set", &self.verify_token.is_some())
            .field("whatsapp_token_set", &self.whatsapp_token.is_some())
            .field("whatsapp_api_base", &self.whatsapp_api_base)
            .field("whatsapp_api_version", &self.whatsapp_api_version)
            .field("phone_number_id", &self.phone_number_id)
            .field("openai_api_key_set", &self.openai_api_key.is_some())
            .field("openai_api_base", &self.openai_api_base)
            .field("assistant_id", &self.assistant_id)
            .field("openai_model", &self.openai_model)
            .field("transcription_model", &self.transcription_model)
            .field("run_poll_interval_ms", &self.run_poll_interval_ms)
            .field("run_timeout_ms", &self.run_timeout_ms)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("conversation_ttl_secs", &self.conversation_ttl_secs)
            .field("conversation_max_entries", &self.conversation_max_entries)
            .field("reply_split_marker", &self.reply_split_marker)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

/// Parse a numeric variable, falling back to `default` when unset or invalid.
fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(name) else {
        return default;
    };

    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            default
        }
    }
}

/// Read a variable, treating blank values as unset.
fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read a base URL, stripping the trailing slash so paths can be appended.
fn base_url<F>(lookup: &F, name: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let raw = match non_empty(lookup, name) {
        Some(v) => v,
        None => return default.to_string(),
    };

    match Url::parse(&raw) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
            raw.trim_end_matches('/').to_string()
        }
        _ => {
            warn!(env_var = name, value = %raw, "Invalid base URL, using default");
            default.to_string()
        }
    }
}
