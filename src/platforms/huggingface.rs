// Hugging Face repository backend
//
// Uploads go through the hub's NDJSON commit endpoint with the file content
// inlined as base64; downloads replay the stored resolve URL. Coordinates
// never embed the token, so fetching always needs a config with one.

use super::{
    http_client, upstream_error, Coordinates, FetchedFile, PlatformConfig, StorageBackend,
    UploadPayload,
};
use crate::types::{AppError, AppResult};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const HUGGINGFACE_BASE: &str = "https://huggingface.co";

pub struct HuggingFaceBackend {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct CommitResponse {
    #[serde(rename = "commitOid", default)]
    commit_oid: Option<String>,
}

impl HuggingFaceBackend {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            base_url: HUGGINGFACE_BASE.to_string(),
        }
    }

    /// Point the backend at a different hub host (test servers).
    pub fn with_base_url(timeout: Duration, base_url: impl Into<String>) -> Self {
        Self {
            client: http_client(timeout),
            base_url: base_url.into(),
        }
    }

    fn resolve_url(&self, repo: &str, repo_path: &str) -> String {
        format!(
            "{}/{}/resolve/main/{}",
            self.base_url,
            repo,
            encode_repo_path(repo_path)
        )
    }
}

/// Percent-encode a repo path one segment at a time, keeping the slashes.
fn encode_repo_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn repo_path(config: &super::HuggingFaceConfig, file_name: &str) -> String {
    match &config.path {
        Some(prefix) if !prefix.is_empty() => {
            format!("{}/{}", prefix.trim_end_matches('/'), file_name)
        }
        _ => file_name.to_string(),
    }
}

#[async_trait]
impl StorageBackend for HuggingFaceBackend {
    async fn store(&self, payload: &UploadPayload, config: &PlatformConfig) -> AppResult<Coordinates> {
        let config = config.as_hugging_face().ok_or_else(|| {
            AppError::Internal("huggingface backend called with a non-huggingface config".to_string())
        })?;

        let path = repo_path(config, &payload.file_name);
        let url = format!("{}/api/models/{}/commit/main", self.base_url, config.repo);

        let header_line = serde_json::json!({
            "key": "header",
            "value": {"summary": format!("Upload {}", path), "description": ""},
        });
        let file_line = serde_json::json!({
            "key": "file",
            "value": {
                "content": BASE64.encode(&payload.bytes),
                "path": path,
                "encoding": "base64",
            },
        });
        let body = format!("{}\n{}", header_line, file_line);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", config.token))
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| upstream_error("huggingface", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "huggingface API error ({}): {}",
                status, body
            )));
        }

        let commit: CommitResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("failed to parse huggingface response: {}", e)))?;

        Ok(Coordinates::HuggingFace {
            repo: config.repo.clone(),
            file_path: path.clone(),
            file_url: self.resolve_url(&config.repo, &path),
            oid: commit.commit_oid,
        })
    }

    async fn fetch(
        &self,
        coordinates: &Coordinates,
        fallback: Option<&PlatformConfig>,
    ) -> AppResult<FetchedFile> {
        let (repo, file_path, file_url) = match coordinates {
            Coordinates::HuggingFace {
                repo,
                file_path,
                file_url,
                ..
            } => (repo, file_path, file_url),
            _ => {
                return Err(AppError::Internal(
                    "huggingface backend called with foreign coordinates".to_string(),
                ))
            }
        };

        let token = fallback
            .and_then(|c| c.as_hugging_face())
            .map(|c| c.token.clone())
            .ok_or_else(|| AppError::ConfigMissing("huggingface config not found".to_string()))?;

        // Old records may predate the stored resolve URL.
        let url = if file_url.is_empty() {
            self.resolve_url(repo, file_path)
        } else {
            file_url.clone()
        };

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .map_err(|e| upstream_error("huggingface", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Upstream(format!(
                "huggingface download error ({})",
                status
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| upstream_error("huggingface", e))?;

        Ok(FetchedFile { bytes, content_type })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn hf_config(path: Option<&str>) -> PlatformConfig {
        PlatformConfig::HuggingFace(super::super::HuggingFaceConfig {
            token: "hf-token".to_string(),
            repo: "user/repo".to_string(),
            is_private: false,
            path: path.map(str::to_string),
        })
    }

    #[test]
    fn test_repo_path_with_and_without_prefix() {
        let bare = hf_config(None);
        assert_eq!(repo_path(bare.as_hugging_face().unwrap(), "a.png"), "a.png");

        let prefixed = hf_config(Some("images/"));
        assert_eq!(
            repo_path(prefixed.as_hugging_face().unwrap(), "a.png"),
            "images/a.png"
        );
    }

    #[test]
    fn test_encode_repo_path_keeps_slashes() {
        assert_eq!(encode_repo_path("images/my file.png"), "images/my%20file.png");
        assert_eq!(encode_repo_path("图.png"), "%E5%9B%BE.png");
    }

    #[test]
    fn test_commit_response_tolerates_missing_oid() {
        let commit: CommitResponse = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(commit.commit_oid.is_none());

        let commit: CommitResponse =
            serde_json::from_str(r#"{"commitOid": "abc", "commitUrl": "u"}"#).unwrap();
        assert_eq!(commit.commit_oid.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_store_commits_and_builds_resolve_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/models/user/repo/commit/main")
            .match_header("authorization", "Bearer hf-token")
            .match_header("content-type", "application/x-ndjson")
            .with_status(200)
            .with_body(r#"{"commitOid": "deadbeef"}"#)
            .create_async()
            .await;

        let backend = HuggingFaceBackend::with_base_url(Duration::from_secs(5), server.url());
        let payload = UploadPayload {
            bytes: Bytes::from_static(b"contents"),
            file_name: "a.png".to_string(),
            content_type: "image/png".to_string(),
        };
        let coords = backend
            .store(&payload, &hf_config(Some("images")))
            .await
            .unwrap();

        mock.assert_async().await;
        match coords {
            Coordinates::HuggingFace {
                repo,
                file_path,
                file_url,
                oid,
            } => {
                assert_eq!(repo, "user/repo");
                assert_eq!(file_path, "images/a.png");
                assert_eq!(
                    file_url,
                    format!("{}/user/repo/resolve/main/images/a.png", server.url())
                );
                assert_eq!(oid.as_deref(), Some("deadbeef"));
            }
            other => panic!("unexpected coordinates: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_requires_config_token() {
        let backend = HuggingFaceBackend::new(Duration::from_secs(5));
        let coords = Coordinates::HuggingFace {
            repo: "user/repo".to_string(),
            file_path: "a.png".to_string(),
            file_url: String::new(),
            oid: None,
        };
        let err = backend.fetch(&coords, None).await.unwrap_err();
        assert!(matches!(err, AppError::ConfigMissing(_)));
    }

    #[tokio::test]
    async fn test_fetch_replays_stored_url() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/user/repo/resolve/main/a.png")
            .match_header("authorization", "Bearer hf-token")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body("contents")
            .create_async()
            .await;

        let backend = HuggingFaceBackend::with_base_url(Duration::from_secs(5), server.url());
        let coords = Coordinates::HuggingFace {
            repo: "user/repo".to_string(),
            file_path: "a.png".to_string(),
            file_url: format!("{}/user/repo/resolve/main/a.png", server.url()),
            oid: None,
        };
        let fetched = backend.fetch(&coords, Some(&hf_config(None))).await.unwrap();
        assert_eq!(&fetched.bytes[..], b"contents");
    }
}
