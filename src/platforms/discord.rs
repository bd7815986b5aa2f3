// Discord attachment backend
//
// Uploads ride a bot message posted to the configured channel. Retrieval is
// two calls: resolve the message to get a (signed) attachment URL, then
// download it. The bot token is captured into the coordinates at upload time
// so old files stay fetchable after a config change.

use super::{
    http_client, upstream_error, Coordinates, FetchedFile, PlatformConfig, StorageBackend,
    UploadPayload,
};
use crate::types::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

pub struct DiscordBackend {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct MessageResponse {
    id: String,
    #[serde(default)]
    attachments: Vec<Attachment>,
}

#[derive(Deserialize)]
struct Attachment {
    url: String,
}

impl DiscordBackend {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            base_url: DISCORD_API_BASE.to_string(),
        }
    }

    /// Point the backend at a different API host (test servers).
    pub fn with_base_url(timeout: Duration, base_url: impl Into<String>) -> Self {
        Self {
            client: http_client(timeout),
            base_url: base_url.into(),
        }
    }

    async fn resolve_message(&self, channel_id: &str, message_id: &str, token: &str) -> AppResult<MessageResponse> {
        let url = format!("{}/channels/{}/messages/{}", self.base_url, channel_id, message_id);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bot {}", token))
            .send()
            .await
            .map_err(|e| upstream_error("discord", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "discord API error ({}): {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("failed to parse discord response: {}", e)))
    }
}

#[async_trait]
impl StorageBackend for DiscordBackend {
    async fn store(&self, payload: &UploadPayload, config: &PlatformConfig) -> AppResult<Coordinates> {
        let config = config
            .as_discord()
            .ok_or_else(|| AppError::Internal("discord backend called with a non-discord config".to_string()))?;

        let url = format!("{}/channels/{}/messages", self.base_url, config.channel_id);
        let part = Part::bytes(payload.bytes.to_vec())
            .file_name(payload.file_name.clone())
            .mime_str(&payload.content_type)
            .map_err(|e| {
                AppError::InvalidRequest(format!("invalid content type {}: {}", payload.content_type, e))
            })?;
        let form = Form::new().text("payload_json", "{}").part("files[0]", part);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bot {}", config.bot_token))
            .multipart(form)
            .send()
            .await
            .map_err(|e| upstream_error("discord", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "discord API error ({}): {}",
                status, body
            )));
        }

        let message: MessageResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("failed to parse discord response: {}", e)))?;

        if message.attachments.is_empty() {
            return Err(AppError::Upstream(
                "incomplete response: discord message carries no attachment".to_string(),
            ));
        }

        Ok(Coordinates::Discord {
            message_id: message.id,
            channel_id: config.channel_id.clone(),
            bot_token: Some(config.bot_token.clone()),
        })
    }

    async fn fetch(
        &self,
        coordinates: &Coordinates,
        fallback: Option<&PlatformConfig>,
    ) -> AppResult<FetchedFile> {
        let (message_id, channel_id, bot_token) = match coordinates {
            Coordinates::Discord {
                message_id,
                channel_id,
                bot_token,
            } => (message_id, channel_id, bot_token),
            _ => {
                return Err(AppError::Internal(
                    "discord backend called with foreign coordinates".to_string(),
                ))
            }
        };

        let token = bot_token
            .clone()
            .or_else(|| fallback.and_then(|c| c.as_discord()).map(|c| c.bot_token.clone()))
            .ok_or_else(|| AppError::ConfigMissing("discord config not found".to_string()))?;

        let message = self.resolve_message(channel_id, message_id, &token).await?;
        let attachment = message.attachments.first().ok_or_else(|| {
            AppError::Upstream("discord message carries no attachment".to_string())
        })?;

        let download = self
            .client
            .get(&attachment.url)
            .send()
            .await
            .map_err(|e| upstream_error("discord", e))?;

        let status = download.status();
        if !status.is_success() {
            return Err(AppError::Upstream(format!("discord CDN error ({})", status)));
        }

        let content_type = download
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = download
            .bytes()
            .await
            .map_err(|e| upstream_error("discord", e))?;

        Ok(FetchedFile { bytes, content_type })
    }
}
