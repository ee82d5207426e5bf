//! WhatsApp Cloud API client: media retrieval and text sends.

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::WhatsAppError;
use crate::Config;

/// Media metadata returned by `GET /{version}/{media-id}`.
#[derive(Debug, Deserialize)]
struct MediaMetadata {
    url: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}

/// Body of `POST /{version}/{phone-number-id}/messages` for a text message.
#[derive(Debug, Serialize)]
struct OutboundText<'a> {
    messaging_product: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text: TextBody<'a>,
}

#[derive(Debug, Serialize)]
struct TextBody<'a> {
    body: &'a str,
}

/// Graph API client sharing the service-wide HTTP connection pool.
#[derive(Clone)]
pub struct WhatsAppClient {
    http: Client,
    base_url: String,
    api_version: String,
    token: String,
}

impl WhatsAppClient {
    pub fn new(http: Client, config: &Config) -> Self {
        Self {
            http,
            base_url: config.whatsapp_api_base.clone(),
            api_version: config.whatsapp_api_version.clone(),
            token: config.whatsapp_token.clone().unwrap_or_default(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.api_version, path)
    }

    /// Resolve a media id to its short-lived download URL.
    pub async fn fetch_media_url(&self, media_id: &str) -> Result<String, WhatsAppError> {
        let response = self
            .http
            .get(self.endpoint(media_id))
            .bearer_auth(&self.token)
            .send()
            .await?;

        let response = ensure_success(response, "media_metadata").await?;
        let metadata: MediaMetadata = response.json().await?;

        info!(
            media_id = %media_id,
            mime_type = ?metadata.mime_type,
            has_url = metadata.url.is_some(),
            "whatsapp_media_metadata_fetched"
        );

        metadata
            .url
            .filter(|u| !u.is_empty())
            .ok_or(WhatsAppError::MissingMediaUrl)
    }

    /// Download media bytes. The URL requires the same bearer token.
    pub async fn download_media(&self, url: &str) -> Result<Vec<u8>, WhatsAppError> {
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        let response = ensure_success(response, "media_download").await?;
        let bytes = response.bytes().await?;

        info!(size_bytes = bytes.len(), "whatsapp_media_downloaded");

        Ok(bytes.to_vec())
    }

    /// Send a single text message from `phone_number_id` to `to`.
    ///
    /// Non-2xx statuses are logged and reported as errors; the caller decides
    /// whether they matter.
    pub async fn send_text(
        &self,
        phone_number_id: &str,
        to: &str,
        body: &str,
    ) -> Result<(), WhatsAppError> {
        let payload = OutboundText {
            messaging_product: "whatsapp",
            to,
            kind: "text",
            text: TextBody { body },
        };

        let response = self
            .http
            .post(self.endpoint(&format!("{}/messages", phone_number_id)))
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(to = %to, error = %e, "whatsapp_send_request_failed");
                e
            })?;

        let status = response.status().as_u16();
        let is_success = response.status().is_success();
        let response_body = response.text().await.unwrap_or_default();

        info!(
            to = %to,
            status_code = status,
            body_length = body.len(),
            response_body = %response_body,
            "whatsapp_send_complete"
        );

        if is_success {
            Ok(())
        } else {
            Err(WhatsAppError::Status {
                stage: "send_message",
                status,
                body: response_body,
            })
        }
    }
}

/// Turn a non-2xx response into a [`WhatsAppError::Status`].
async fn ensure_success(response: Response, stage: &'static str) -> Result<Response, WhatsAppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!(
        stage = stage,
        status_code = status.as_u16(),
        body_preview = %body.chars().take(200).collect::<String>(),
        "whatsapp_request_rejected"
    );

    Err(WhatsAppError::Status {
        stage,
        status: status.as_u16(),
        body,
    })
}
