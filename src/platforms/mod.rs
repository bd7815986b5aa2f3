// Storage backend abstraction layer

pub mod discord;
pub mod huggingface;
pub mod telegram;

use crate::types::{AppError, AppResult, Platform};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// A file handed to a backend for upload.
#[derive(Debug, Clone)]
pub struct UploadPayload {
    pub bytes: Bytes,
    pub file_name: String,
    pub content_type: String,
}

/// Bytes pulled back from a backend. The content type is whatever the
/// platform reported, if anything; the registry record stays authoritative.
#[derive(Debug)]
pub struct FetchedFile {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// Uniform store/fetch capability over one external platform.
///
/// Implementations keep no state between calls and never retry; any upstream
/// failure surfaces as `AppError::Upstream` with the platform's status and
/// message preserved.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Push bytes to the platform and return the coordinates needed to fetch
    /// them again. Must fail, not partially succeed, when the platform
    /// response is missing those coordinates.
    async fn store(&self, payload: &UploadPayload, config: &PlatformConfig) -> AppResult<Coordinates>;

    /// Pull bytes back. Credentials embedded in the coordinates win over the
    /// fallback config; with neither, fails with `ConfigMissing`.
    async fn fetch(
        &self,
        coordinates: &Coordinates,
        fallback: Option<&PlatformConfig>,
    ) -> AppResult<FetchedFile>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordConfig {
    pub bot_token: String,
    pub channel_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HuggingFaceConfig {
    pub token: String,
    pub repo: String,
    #[serde(default)]
    pub is_private: bool,
    /// Optional path prefix inside the repo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    /// Accepted and stored for compatibility; not used for transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
}

/// Per-user credentials for one platform, stored as a JSON blob keyed by
/// (user, platform) so the blob itself carries no tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlatformConfig {
    Discord(DiscordConfig),
    HuggingFace(HuggingFaceConfig),
    Telegram(TelegramConfig),
}

impl PlatformConfig {
    pub fn parse(platform: Platform, value: serde_json::Value) -> Result<Self, serde_json::Error> {
        Ok(match platform {
            Platform::Discord => PlatformConfig::Discord(serde_json::from_value(value)?),
            Platform::HuggingFace => PlatformConfig::HuggingFace(serde_json::from_value(value)?),
            Platform::Telegram => PlatformConfig::Telegram(serde_json::from_value(value)?),
        })
    }

    pub fn as_discord(&self) -> Option<&DiscordConfig> {
        match self {
            PlatformConfig::Discord(config) => Some(config),
            _ => None,
        }
    }

    pub fn as_hugging_face(&self) -> Option<&HuggingFaceConfig> {
        match self {
            PlatformConfig::HuggingFace(config) => Some(config),
            _ => None,
        }
    }

    pub fn as_telegram(&self) -> Option<&TelegramConfig> {
        match self {
            PlatformConfig::Telegram(config) => Some(config),
            _ => None,
        }
    }
}

/// What an adapter needs to fetch a stored object again. Persisted verbatim
/// as JSON at store time and never recomputed; the wire keys match the
/// registry layout consumed by existing deployments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Coordinates {
    Discord {
        #[serde(rename = "DiscordMessageId")]
        message_id: String,
        #[serde(rename = "DiscordChannelId")]
        channel_id: String,
        #[serde(rename = "DiscordBotToken", default, skip_serializing_if = "Option::is_none")]
        bot_token: Option<String>,
    },
    HuggingFace {
        #[serde(rename = "Repo")]
        repo: String,
        #[serde(rename = "FilePath")]
        file_path: String,
        #[serde(rename = "FileUrl")]
        file_url: String,
        #[serde(rename = "Oid", default, skip_serializing_if = "Option::is_none")]
        oid: Option<String>,
    },
    Telegram {
        #[serde(rename = "TgFileId")]
        file_id: String,
        #[serde(rename = "TgChatId")]
        chat_id: String,
        #[serde(rename = "TgBotToken", default, skip_serializing_if = "Option::is_none")]
        bot_token: Option<String>,
    },
}

impl Coordinates {
    /// Whether credentials were captured at upload time. Hugging Face
    /// coordinates never embed a token, so fetching there always needs a
    /// fallback config.
    pub fn has_credentials(&self) -> bool {
        match self {
            Coordinates::Discord { bot_token, .. } | Coordinates::Telegram { bot_token, .. } => {
                bot_token.is_some()
            }
            Coordinates::HuggingFace { .. } => false,
        }
    }
}

/// The three live adapters, selected by platform tag.
#[derive(Clone)]
pub struct BackendSet {
    discord: Arc<dyn StorageBackend>,
    huggingface: Arc<dyn StorageBackend>,
    telegram: Arc<dyn StorageBackend>,
}

impl BackendSet {
    pub fn live(timeout: Duration) -> Self {
        Self {
            discord: Arc::new(discord::DiscordBackend::new(timeout)),
            huggingface: Arc::new(huggingface::HuggingFaceBackend::new(timeout)),
            telegram: Arc::new(telegram::TelegramBackend::new(timeout)),
        }
    }

    pub fn with_backends(
        discord: Arc<dyn StorageBackend>,
        huggingface: Arc<dyn StorageBackend>,
        telegram: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            discord,
            huggingface,
            telegram,
        }
    }

    pub fn get(&self, platform: Platform) -> Arc<dyn StorageBackend> {
        match platform {
            Platform::Discord => self.discord.clone(),
            Platform::HuggingFace => self.huggingface.clone(),
            Platform::Telegram => self.telegram.clone(),
        }
    }
}

pub(crate) fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .expect("failed to build HTTP client")
}

pub(crate) fn upstream_error(platform: &str, err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        AppError::Upstream("timeout".to_string())
    } else {
        AppError::Upstream(format!("{} request failed: {}", platform, err))
    }
}
