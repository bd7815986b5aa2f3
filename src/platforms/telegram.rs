// Telegram bot backend
//
// Images go through sendPhoto, everything else through sendDocument; Telegram
// returns different result shapes for the two, so the file id is pulled from
// whichever is present. Retrieval is getFile (file id to path) followed by a
// download from the file endpoint.

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

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

pub struct TelegramBackend {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: serde::Deserialize<'de>"))]
struct TgResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct TgMessage {
    #[serde(default)]
    document: Option<TgFileRef>,
    #[serde(default)]
    photo: Option<Vec<TgPhotoSize>>,
}

#[derive(Deserialize)]
struct TgFileRef {
    file_id: String,
}

#[derive(Deserialize)]
struct TgPhotoSize {
    file_id: String,
}

#[derive(Deserialize)]
struct TgFilePath {
    #[serde(default)]
    file_path: Option<String>,
}

/// Telegram lists photo sizes smallest first; the last entry is the original.
fn extract_file_id(message: &TgMessage) -> Option<String> {
    if let Some(document) = &message.document {
        return Some(document.file_id.clone());
    }
    message
        .photo
        .as_ref()
        .and_then(|sizes| sizes.last())
        .map(|size| size.file_id.clone())
}

impl TelegramBackend {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            base_url: TELEGRAM_API_BASE.to_string(),
        }
    }

    /// Point the backend at a different API host (test servers).
    pub fn with_base_url(timeout: Duration, base_url: impl Into<String>) -> Self {
        Self {
            client: http_client(timeout),
            base_url: base_url.into(),
        }
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> AppResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| upstream_error("telegram", e))?;

        let parsed: Result<TgResponse<T>, _> = serde_json::from_str(&body);
        match parsed {
            Ok(tg) if tg.ok => tg.result.ok_or_else(|| {
                AppError::Upstream("incomplete response: telegram result is empty".to_string())
            }),
            Ok(tg) => Err(AppError::Upstream(format!(
                "telegram API error ({}): {}",
                status,
                tg.description.unwrap_or_else(|| "unknown".to_string())
            ))),
            Err(_) => Err(AppError::Upstream(format!(
                "telegram API error ({}): {}",
                status, body
            ))),
        }
    }
}

#[async_trait]
impl StorageBackend for TelegramBackend {
    async fn store(&self, payload: &UploadPayload, config: &PlatformConfig) -> AppResult<Coordinates> {
        let config = config.as_telegram().ok_or_else(|| {
            AppError::Internal("telegram backend called with a non-telegram config".to_string())
        })?;

        let is_image = payload.content_type.starts_with("image/");
        let (method, field) = if is_image {
            ("sendPhoto", "photo")
        } else {
            ("sendDocument", "document")
        };

        let url = format!("{}/bot{}/{}", self.base_url, config.bot_token, method);
        let part = Part::bytes(payload.bytes.to_vec())
            .file_name(payload.file_name.clone())
            .mime_str(&payload.content_type)
            .map_err(|e| {
                AppError::InvalidRequest(format!("invalid content type {}: {}", payload.content_type, e))
            })?;
        let form = Form::new()
            .text("chat_id", config.chat_id.clone())
            .part(field, part);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| upstream_error("telegram", e))?;

        let message: TgMessage = Self::parse_response(response).await?;
        let file_id = extract_file_id(&message).ok_or_else(|| {
            AppError::Upstream("incomplete response: telegram message carries no file id".to_string())
        })?;

        Ok(Coordinates::Telegram {
            file_id,
            chat_id: config.chat_id.clone(),
            bot_token: Some(config.bot_token.clone()),
        })
    }

    async fn fetch(
        &self,
        coordinates: &Coordinates,
        fallback: Option<&PlatformConfig>,
    ) -> AppResult<FetchedFile> {
        let (file_id, bot_token) = match coordinates {
            Coordinates::Telegram {
                file_id, bot_token, ..
            } => (file_id, bot_token),
            _ => {
                return Err(AppError::Internal(
                    "telegram backend called with foreign coordinates".to_string(),
                ))
            }
        };

        let token = bot_token
            .clone()
            .or_else(|| fallback.and_then(|c| c.as_telegram()).map(|c| c.bot_token.clone()))
            .ok_or_else(|| AppError::ConfigMissing("telegram config not found".to_string()))?;

        let url = format!("{}/bot{}/getFile", self.base_url, token);
        let response = self
            .client
            .get(&url)
            .query(&[("file_id", file_id.as_str())])
            .send()
            .await
            .map_err(|e| upstream_error("telegram", e))?;

        let resolved: TgFilePath = Self::parse_response(response).await?;
        let file_path = resolved.file_path.ok_or_else(|| {
            AppError::Upstream("incomplete response: telegram getFile returned no path".to_string())
        })?;

        let download_url = format!("{}/file/bot{}/{}", self.base_url, token, file_path);
        let download = self
            .client
            .get(&download_url)
            .send()
            .await
            .map_err(|e| upstream_error("telegram", e))?;

        let status = download.status();
        if !status.is_success() {
            return Err(AppError::Upstream(format!(
                "telegram file download error ({})",
                status
            )));
        }

        let content_type = download
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = download
            .bytes()
            .await
            .map_err(|e| upstream_error("telegram", e))?;

        Ok(FetchedFile { bytes, content_type })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn telegram_config() -> PlatformConfig {
        PlatformConfig::Telegram(super::super::TelegramConfig {
            bot_token: "bot-token".to_string(),
            chat_id: "123".to_string(),
            proxy_url: None,
        })
    }

    #[test]
    fn test_extract_file_id_prefers_document() {
        let message: TgMessage = serde_json::from_str(
            r#"{"document": {"file_id": "DOC"}, "photo": [{"file_id": "P1"}]}"#,
        )
        .unwrap();
        assert_eq!(extract_file_id(&message).as_deref(), Some("DOC"));
    }

    #[test]
    fn test_extract_file_id_takes_largest_photo() {
        let message: TgMessage = serde_json::from_str(
            r#"{"photo": [{"file_id": "small"}, {"file_id": "medium"}, {"file_id": "large"}]}"#,
        )
        .unwrap();
        assert_eq!(extract_file_id(&message).as_deref(), Some("large"));
    }

    #[test]
    fn test_extract_file_id_missing() {
        let message: TgMessage = serde_json::from_str(r#"{"text": "hi"}"#).unwrap();
        assert_eq!(extract_file_id(&message), None);
    }

    #[tokio::test]
    async fn test_store_image_uses_send_photo() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botbot-token/sendPhoto")
            .with_status(200)
            .with_body(r#"{"ok": true, "result": {"photo": [{"file_id": "ABC"}]}}"#)
            .create_async()
            .await;

        let backend = TelegramBackend::with_base_url(Duration::from_secs(5), server.url());
        let payload = UploadPayload {
            bytes: Bytes::from_static(b"png bytes"),
            file_name: "a.png".to_string(),
            content_type: "image/png".to_string(),
        };
        let coords = backend.store(&payload, &telegram_config()).await.unwrap();

        mock.assert_async().await;
        match coords {
            Coordinates::Telegram {
                file_id,
                chat_id,
                bot_token,
            } => {
                assert_eq!(file_id, "ABC");
                assert_eq!(chat_id, "123");
                assert_eq!(bot_token.as_deref(), Some("bot-token"));
            }
            other => panic!("unexpected coordinates: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_store_document_for_non_image() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botbot-token/sendDocument")
            .with_status(200)
            .with_body(r#"{"ok": true, "result": {"document": {"file_id": "DOC"}}}"#)
            .create_async()
            .await;

        let backend = TelegramBackend::with_base_url(Duration::from_secs(5), server.url());
        let payload = UploadPayload {
            bytes: Bytes::from_static(b"%PDF"),
            file_name: "a.pdf".to_string(),
            content_type: "application/pdf".to_string(),
        };
        backend.store(&payload, &telegram_config()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_store_surfaces_api_error_description() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/botbot-token/sendPhoto")
            .with_status(400)
            .with_body(r#"{"ok": false, "description": "Bad Request: chat not found"}"#)
            .create_async()
            .await;

        let backend = TelegramBackend::with_base_url(Duration::from_secs(5), server.url());
        let payload = UploadPayload {
            bytes: Bytes::from_static(b"x"),
            file_name: "a.png".to_string(),
            content_type: "image/png".to_string(),
        };
        let err = backend.store(&payload, &telegram_config()).await.unwrap_err();
        match err {
            AppError::Upstream(message) => assert!(message.contains("chat not found")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_resolves_path_then_downloads() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/botstored-token/getFile")
            .match_query(mockito::Matcher::UrlEncoded("file_id".into(), "ABC".into()))
            .with_status(200)
            .with_body(r#"{"ok": true, "result": {"file_path": "photos/file_1.png"}}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/file/botstored-token/photos/file_1.png")
            .with_status(200)
            .with_body("png bytes")
            .create_async()
            .await;

        let backend = TelegramBackend::with_base_url(Duration::from_secs(5), server.url());
        let coords = Coordinates::Telegram {
            file_id: "ABC".to_string(),
            chat_id: "123".to_string(),
            bot_token: Some("stored-token".to_string()),
        };
        let fetched = backend.fetch(&coords, None).await.unwrap();
        assert_eq!(&fetched.bytes[..], b"png bytes");
    }

    #[tokio::test]
    async fn test_fetch_prefers_stored_token_over_fallback() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/botstored-token/getFile")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"ok": true, "result": {"file_path": "p"}}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/file/botstored-token/p")
            .with_status(200)
            .with_body("x")
            .create_async()
            .await;

        let backend = TelegramBackend::with_base_url(Duration::from_secs(5), server.url());
        let coords = Coordinates::Telegram {
            file_id: "ABC".to_string(),
            chat_id: "123".to_string(),
            bot_token: Some("stored-token".to_string()),
        };
        backend
            .fetch(&coords, Some(&telegram_config()))
            .await
            .unwrap();
        mock.assert_async().await;
    }
}
