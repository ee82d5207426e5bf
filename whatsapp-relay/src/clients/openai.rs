//! OpenAI API client: transcription, assistant threads and chat completions.

use reqwest::{multipart, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::error::OpenAiError;
use crate::Config;

const ASSISTANTS_BETA_HEADER: &str = "OpenAI-Beta";
const ASSISTANTS_BETA_VERSION: &str = "assistants=v2";

/// Lifecycle status of an assistant run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Whether polling can stop. `requires_action` counts as final because
    /// the relay never submits tool outputs.
    pub fn is_final(self) -> bool {
        !matches!(
            self,
            RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling | RunStatus::Unknown
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
            RunStatus::Unknown => "unknown",
        }
    }
}

/// An assistant run on a thread.
#[derive(Debug, Clone, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
}

#[derive(Debug, Deserialize)]
struct CreatedObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    data: Vec<ThreadMessage>,
}

#[derive(Debug, Deserialize)]
struct ThreadMessage {
    role: String,
    #[serde(default)]
    run_id: Option<String>,
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: TextValue },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    value: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for the subset of the OpenAI API the relay needs.
#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: String,
    transcription_model: String,
    chat_model: String,
    system_prompt: Option<String>,
}

impl OpenAiClient {
    pub fn new(http: Client, config: &Config) -> Self {
        Self {
            http,
            base_url: config.openai_api_base.clone(),
            api_key: config.openai_api_key.clone().unwrap_or_default(),
            transcription_model: config.transcription_model.clone(),
            chat_model: config.openai_model.clone(),
            system_prompt: config.system_prompt.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn assistants(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(ASSISTANTS_BETA_HEADER, ASSISTANTS_BETA_VERSION)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, OpenAiError> {
        let response = request.bearer_auth(&self.api_key).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    /// Transcribe an audio clip to plain text.
    pub async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: &str,
        mime_type: &str,
    ) -> Result<String, OpenAiError> {
        let size_bytes = audio.len();
        let file = multipart::Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str(mime_type)?;

        let form = multipart::Form::new()
            .text("model", self.transcription_model.clone())
            .text("response_format", "text")
            .part("file", file);

        let response = self
            .http
            .post(self.url("audio/transcriptions"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let transcript = ensure_success(response).await?.text().await?;
        let transcript = transcript.trim().to_string();

        info!(
            size_bytes = size_bytes,
            transcript_length = transcript.len(),
            model = %self.transcription_model,
            "openai_transcription_complete"
        );

        Ok(transcript)
    }

    /// Create an empty thread and return its id.
    pub async fn create_thread(&self) -> Result<String, OpenAiError> {
        let request = self.assistants(self.http.post(self.url("threads")).json(&json!({})));
        let thread: CreatedObject = self.send_json(request).await?;

        info!(thread_id = %thread.id, "openai_thread_created");
        Ok(thread.id)
    }

    /// Append a user message to a thread.
    pub async fn add_user_message(&self, thread_id: &str, text: &str) -> Result<(), OpenAiError> {
        let request = self.assistants(
            self.http
                .post(self.url(&format!("threads/{}/messages", thread_id)))
                .json(&json!({"role": "user", "content": text})),
        );
        let message: CreatedObject = self.send_json(request).await?;

        info!(
            thread_id = %thread_id,
            message_id = %message.id,
            text_length = text.len(),
            "openai_message_added"
        );
        Ok(())
    }

    /// Start the assistant on a thread.
    pub async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, OpenAiError> {
        let request = self.assistants(
            self.http
                .post(self.url(&format!("threads/{}/runs", thread_id)))
                .json(&json!({"assistant_id": assistant_id})),
        );
        let run: Run = self.send_json(request).await?;

        info!(
            thread_id = %thread_id,
            run_id = %run.id,
            status = run.status.as_str(),
            "openai_run_created"
        );
        Ok(run)
    }

    pub async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, OpenAiError> {
        let request = self.assistants(
            self.http
                .get(self.url(&format!("threads/{}/runs/{}", thread_id, run_id))),
        );
        self.send_json(request).await
    }

    pub async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run, OpenAiError> {
        let request = self.assistants(
            self.http
                .post(self.url(&format!("threads/{}/runs/{}/cancel", thread_id, run_id))),
        );
        let run: Run = self.send_json(request).await?;

        info!(
            thread_id = %thread_id,
            run_id = %run.id,
            status = run.status.as_str(),
            "openai_run_cancel_requested"
        );
        Ok(run)
    }

    /// Text of the newest thread message if it is the assistant's answer to `run_id`.
    pub async fn latest_assistant_reply(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<Option<String>, OpenAiError> {
        let request = self.assistants(
            self.http
                .get(self.url(&format!("threads/{}/messages", thread_id)))
                .query(&[("order", "desc"), ("limit", "1")]),
        );
        let list: MessageList = self.send_json(request).await?;

        let reply = list
            .data
            .into_iter()
            .filter(|m| m.role == "assistant" && m.run_id.as_deref() == Some(run_id))
            .find_map(|m| {
                m.content.into_iter().find_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.value),
                    ContentBlock::Other => None,
                })
            });

        if reply.is_none() {
            warn!(thread_id = %thread_id, run_id = %run_id, "openai_run_reply_missing");
        }

        Ok(reply)
    }

    /// Stateless single-turn completion.
    pub async fn chat_completion(&self, text: &str) -> Result<Option<String>, OpenAiError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(prompt) = self.system_prompt.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: prompt,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: text,
        });

        let request = self.http.post(self.url("chat/completions")).json(&ChatRequest {
            model: &self.chat_model,
            messages,
        });
        let response: ChatResponse = self.send_json(request).await?;

        let reply = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content);

        info!(
            model = %self.chat_model,
            has_reply = reply.is_some(),
            "openai_chat_completion_complete"
        );

        Ok(reply)
    }
}

async fn ensure_success(response: Response) -> Result<Response, OpenAiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!(
        status_code = status.as_u16(),
        body_preview = %body.chars().take(200).collect::<String>(),
        "openai_request_rejected"
    );

    Err(OpenAiError::Status {
        status: status.as_u16(),
        body,
    })
}
