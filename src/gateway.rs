//! Storage gateway: the single store/fetch contract over the three platform
//! backends and the metadata registry.
//!
//! Store runs Validate -> Dispatch -> Persist -> Respond; a registry record is
//! written if and only if the upstream store call succeeded, and only after
//! it. Fetch runs Lookup -> Resolve -> Stream and re-dispatches to the
//! backend named by the stored record, never re-deriving coordinates.

use crate::db::{ConfigStore, Registry};
use crate::models::{FileRecord, FileSummary};
use crate::platforms::{BackendSet, FetchedFile, PlatformConfig, UploadPayload};
use crate::types::{AppError, AppResult, Platform};
use crate::utils::recover_file_name;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// Owner id used for programmatic uploads and as the fallback config source
/// when stored coordinates carry no credentials.
pub const SYSTEM_OWNER_ID: i64 = 1;

/// Read-only view of the per-user platform credentials.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    async fn platform_config(
        &self,
        owner_id: i64,
        platform: Platform,
    ) -> AppResult<Option<PlatformConfig>>;
}

#[async_trait]
impl ConfigProvider for ConfigStore {
    async fn platform_config(
        &self,
        owner_id: i64,
        platform: Platform,
    ) -> AppResult<Option<PlatformConfig>> {
        self.get(owner_id, platform).await
    }
}

/// Hands out upload timestamps that are distinct process-wide even when two
/// requests land in the same millisecond; the id embeds the file name, so the
/// timestamp is the only uniqueness lever.
struct FileIdGenerator {
    last: AtomicI64,
}

impl FileIdGenerator {
    fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    fn next_millis(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let prev = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| {
                Some(prev.max(now - 1) + 1)
            })
            .unwrap_or(now - 1);
        prev.max(now - 1) + 1
    }
}

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub id: String,
    pub platform: Platform,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
}

#[derive(Debug)]
pub struct FetchedObject {
    pub bytes: Bytes,
    pub content_type: String,
    pub file_name: String,
}

pub struct StorageGateway {
    registry: Registry,
    configs: Arc<dyn ConfigProvider>,
    backends: BackendSet,
    ids: FileIdGenerator,
}

impl StorageGateway {
    pub fn new(registry: Registry, configs: Arc<dyn ConfigProvider>, backends: BackendSet) -> Self {
        Self {
            registry,
            configs,
            backends,
            ids: FileIdGenerator::new(),
        }
    }

    pub async fn store(
        &self,
        platform_id: &str,
        payload: UploadPayload,
        uploader_ip: Option<String>,
        owner_id: i64,
    ) -> AppResult<StoredFile> {
        let platform = Platform::from_id(platform_id)
            .ok_or_else(|| AppError::InvalidPlatform(platform_id.to_string()))?;

        let config = self
            .configs
            .platform_config(owner_id, platform)
            .await?
            .ok_or_else(|| {
                AppError::ConfigMissing(format!(
                    "{} config not found. Please configure {} first.",
                    platform, platform
                ))
            })?;

        // Charset recovery happens once, here; the recovered name is what the
        // backend, the id, and the metadata all see.
        let payload = UploadPayload {
            file_name: recover_file_name(&payload.file_name),
            ..payload
        };

        let backend = self.backends.get(platform);
        let coordinates = backend.store(&payload, &config).await?;
        let coordinates_json = serde_json::to_string(&coordinates)
            .map_err(|e| AppError::Internal(format!("failed to serialize coordinates: {}", e)))?;

        let timestamp = self.ids.next_millis();
        let file_id = format!("{}_{}", timestamp, payload.file_name);
        let now = chrono::Utc::now().to_rfc3339();
        let record = FileRecord {
            id: file_id.clone(),
            backend: platform.as_str().to_string(),
            coordinates: coordinates_json.clone(),
            file_name: payload.file_name.clone(),
            content_type: payload.content_type.clone(),
            size_bytes: payload.bytes.len() as i64,
            upload_ip: uploader_ip.unwrap_or_else(|| "unknown".to_string()),
            upload_timestamp: timestamp,
            label: "None".to_string(),
            directory: String::new(),
            tags: "[]".to_string(),
            created_at: now.clone(),
            updated_at: now,
        };

        if let Err(e) = self.registry.insert(&record).await {
            // The bytes made it upstream but nothing points at them anymore;
            // log the coordinates so an operator can reconcile by hand.
            error!(
                file_id = %record.id,
                platform = %platform,
                coordinates = %coordinates_json,
                "registry insert failed after upstream store; orphaned upstream object: {}",
                e
            );
            return Err(e);
        }

        info!(file_id = %file_id, platform = %platform, size_bytes = record.size_bytes, "stored file");

        Ok(StoredFile {
            id: file_id,
            platform,
            file_name: payload.file_name,
            content_type: payload.content_type,
            size_bytes: record.size_bytes,
        })
    }

    pub async fn fetch(&self, file_id: &str) -> AppResult<FetchedObject> {
        let record = self
            .registry
            .get(file_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("file {}", file_id)))?;

        let platform = record.platform()?;
        let coordinates = record.coords()?;

        let fallback = if coordinates.has_credentials() {
            None
        } else {
            self.configs
                .platform_config(SYSTEM_OWNER_ID, platform)
                .await?
        };

        let backend = self.backends.get(platform);
        let fetched: FetchedFile = backend.fetch(&coordinates, fallback.as_ref()).await?;

        let content_type = if record.content_type.is_empty() {
            fetched
                .content_type
                .unwrap_or_else(|| "application/octet-stream".to_string())
        } else {
            record.content_type
        };

        Ok(FetchedObject {
            bytes: fetched.bytes,
            content_type,
            file_name: record.file_name,
        })
    }

    pub async fn list(&self, limit: Option<i64>, offset: Option<i64>) -> AppResult<(Vec<FileSummary>, i64, i64, i64)> {
        let limit = limit.unwrap_or(50).clamp(1, 500);
        let offset = offset.unwrap_or(0).max(0);
        let files = self.registry.list(limit, offset).await?;
        let total = self.registry.count().await?;
        Ok((files, total, limit, offset))
    }

    /// Local registry removal only; the platform-side object is left alone.
    pub async fn delete(&self, file_id: &str) -> AppResult<()> {
        if self.registry.get(file_id).await?.is_none() {
            return Err(AppError::NotFound(format!("file {}", file_id)));
        }
        self.registry.delete(file_id).await?;
        info!(file_id = %file_id, "deleted file record");
        Ok(())
    }
}
