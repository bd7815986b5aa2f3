use crate::models::{FileRecord, FileSummary, User};
use crate::platforms::PlatformConfig;
use crate::types::{AppError, AppResult, Platform};
use sqlx::SqlitePool;
use tracing::warn;

/// Durable store of FileRecords, the sole source of truth for where a file
/// lives. Writes commit before the call returns; SQLite serializes them.
#[derive(Clone)]
pub struct Registry {
    pool: SqlitePool,
}

impl Registry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fails on a duplicate id; ids are assigned once and never reused.
    pub async fn insert(&self, record: &FileRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO files (id, backend, coordinates, file_name, content_type, size_bytes,
                               upload_ip, upload_timestamp, label, directory, tags, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.backend)
        .bind(&record.coordinates)
        .bind(&record.file_name)
        .bind(&record.content_type)
        .bind(record.size_bytes)
        .bind(&record.upload_ip)
        .bind(record.upload_timestamp)
        .bind(&record.label)
        .bind(&record.directory)
        .bind(&record.tags)
        .bind(&record.created_at)
        .bind(&record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: &str) -> AppResult<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>("SELECT * FROM files WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    /// Newest first, offset-based so callers can restart a listing.
    pub async fn list(&self, limit: i64, offset: i64) -> AppResult<Vec<FileSummary>> {
        let rows = sqlx::query_as::<_, FileSummary>(
            r#"
            SELECT id, file_name, content_type, size_bytes, backend, upload_timestamp, created_at, updated_at
            FROM files
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn count(&self) -> AppResult<i64> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM files")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    /// Idempotent; deleting an absent id is not an error.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Per-user platform credentials, one JSON blob per (user, platform) pair.
#[derive(Clone)]
pub struct ConfigStore {
    pool: SqlitePool,
}

impl ConfigStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: i64, platform: Platform) -> AppResult<Option<PlatformConfig>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT config FROM configs WHERE user_id = ? AND platform = ?")
                .bind(user_id)
                .bind(platform.as_str())
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((json,)) => {
                let value: serde_json::Value = serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("corrupt {} config for user {}: {}", platform, user_id, e))
                })?;
                let config = PlatformConfig::parse(platform, value).map_err(|e| {
                    AppError::Internal(format!("corrupt {} config for user {}: {}", platform, user_id, e))
                })?;
                Ok(Some(config))
            }
            None => Ok(None),
        }
    }

    /// All configured platforms for a user, keyed by platform tag.
    pub async fn all(&self, user_id: i64) -> AppResult<serde_json::Map<String, serde_json::Value>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT platform, config FROM configs WHERE user_id = ?")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        let mut configs = serde_json::Map::new();
        for (platform, json) in rows {
            match serde_json::from_str(&json) {
                Ok(value) => {
                    configs.insert(platform, value);
                }
                Err(e) => warn!("skipping corrupt {} config for user {}: {}", platform, user_id, e),
            }
        }
        Ok(configs)
    }

    pub async fn set(
        &self,
        user_id: i64,
        platform: Platform,
        config: &PlatformConfig,
    ) -> AppResult<()> {
        let json = serde_json::to_string(config)
            .map_err(|e| AppError::Internal(format!("failed to serialize config: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO configs (user_id, platform, config)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id, platform) DO UPDATE SET
                config = excluded.config,
                updated_at = datetime('now')
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .bind(&json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[derive(Clone)]
pub struct Users {
    pool: SqlitePool,
}

impl Users {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn by_username(&self, username: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn update_password(&self, user_id: i64, password_hash: &str) -> AppResult<()> {
        sqlx::query("UPDATE users SET password = ? WHERE id = ?")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Seed the admin account on a fresh database so the instance is usable.
    pub async fn ensure_default_admin(&self) -> AppResult<()> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        if count > 0 {
            return Ok(());
        }

        let hash = crate::middleware::auth::hash_password("admin123")?;
        sqlx::query("INSERT INTO users (username, password) VALUES (?, ?)")
            .bind("admin")
            .bind(&hash)
            .execute(&self.pool)
            .await?;

        warn!("created default admin user (admin / admin123); change the password");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::platforms::TelegramConfig;
    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
    use std::str::FromStr;
    use std::time::Duration;
    use tempfile::TempDir;

    pub(crate) async fn test_pool() -> (SqlitePool, TempDir) {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite:{}", dir.path().join("test.db").display());
        let options = SqliteConnectOptions::from_str(&url)
            .unwrap()
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        (pool, dir)
    }

    pub(crate) fn sample_record(id: &str, created_at: &str) -> FileRecord {
        FileRecord {
            id: id.to_string(),
            backend: "telegram".to_string(),
            coordinates: r#"{"TgFileId":"ABC","TgChatId":"123"}"#.to_string(),
            file_name: "a.png".to_string(),
            content_type: "image/png".to_string(),
            size_bytes: 42,
            upload_ip: "127.0.0.1".to_string(),
            upload_timestamp: 1_700_000_000_000,
            label: "None".to_string(),
            directory: String::new(),
            tags: "[]".to_string(),
            created_at: created_at.to_string(),
            updated_at: created_at.to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_round_trip() {
        let (pool, _dir) = test_pool().await;
        let registry = Registry::new(pool);

        let record = sample_record("1700_a.png", "2026-01-01T00:00:00Z");
        registry.insert(&record).await.unwrap();

        let loaded = registry.get("1700_a.png").await.unwrap().unwrap();
        assert_eq!(loaded.backend, "telegram");
        assert_eq!(loaded.coordinates, record.coordinates);
        assert_eq!(loaded.size_bytes, 42);

        assert!(registry.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_fails() {
        let (pool, _dir) = test_pool().await;
        let registry = Registry::new(pool);

        let record = sample_record("dup", "2026-01-01T00:00:00Z");
        registry.insert(&record).await.unwrap();
        let err = registry.insert(&record).await.unwrap_err();
        assert!(matches!(err, AppError::Registry(_)));
        assert_eq!(registry.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_newest_first_with_offset() {
        let (pool, _dir) = test_pool().await;
        let registry = Registry::new(pool);

        for (id, created) in [
            ("old", "2026-01-01T00:00:00Z"),
            ("mid", "2026-01-02T00:00:00Z"),
            ("new", "2026-01-03T00:00:00Z"),
        ] {
            registry.insert(&sample_record(id, created)).await.unwrap();
        }

        let page = registry.list(2, 0).await.unwrap();
        assert_eq!(page.iter().map(|f| f.id.as_str()).collect::<Vec<_>>(), ["new", "mid"]);

        let rest = registry.list(2, 2).await.unwrap();
        assert_eq!(rest.iter().map(|f| f.id.as_str()).collect::<Vec<_>>(), ["old"]);
        assert_eq!(registry.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (pool, _dir) = test_pool().await;
        let registry = Registry::new(pool);

        registry
            .insert(&sample_record("x", "2026-01-01T00:00:00Z"))
            .await
            .unwrap();
        registry.delete("x").await.unwrap();
        registry.delete("x").await.unwrap();
        registry.delete("never-existed").await.unwrap();
        assert_eq!(registry.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_config_upsert_overwrites() {
        let (pool, _dir) = test_pool().await;
        let store = ConfigStore::new(pool);

        let first = PlatformConfig::Telegram(TelegramConfig {
            bot_token: "t1".to_string(),
            chat_id: "1".to_string(),
            proxy_url: None,
        });
        store.set(1, Platform::Telegram, &first).await.unwrap();

        let second = PlatformConfig::Telegram(TelegramConfig {
            bot_token: "t2".to_string(),
            chat_id: "2".to_string(),
            proxy_url: None,
        });
        store.set(1, Platform::Telegram, &second).await.unwrap();

        let loaded = store.get(1, Platform::Telegram).await.unwrap().unwrap();
        assert_eq!(loaded.as_telegram().unwrap().bot_token, "t2");

        let all = store.all(1).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all.contains_key("telegram"));

        assert!(store.get(2, Platform::Telegram).await.unwrap().is_none());
        assert!(store.get(1, Platform::Discord).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_default_admin_seeded_once() {
        let (pool, _dir) = test_pool().await;
        let users = Users::new(pool);

        users.ensure_default_admin().await.unwrap();
        users.ensure_default_admin().await.unwrap();

        let admin = users.by_username("admin").await.unwrap().unwrap();
        assert!(crate::middleware::auth::verify_password("admin123", &admin.password));

        users.update_password(admin.id, "newhash").await.unwrap();
        let updated = users.by_username("admin").await.unwrap().unwrap();
        assert_eq!(updated.password, "newhash");
    }
}
