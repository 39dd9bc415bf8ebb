//! Metadata store
//!
//! A SQLite index from identifier to validators and blob key. The pool is
//! limited to one connection and every operation, including close and
//! reopen, runs while holding the handle lock, so the store behaves as a
//! single logical writer. The blob write that precedes a metadata write is
//! not part of any transaction here.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::defaults::METADATA_FILE_NAME;
use crate::errors::{StorageError, StorageResult};
use crate::models::ResourceRecord;
use crate::storage::DirectoryManager;

const CREATE_IMAGES_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS Images (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        url TEXT UNIQUE,
        etag TEXT,
        lastModified TEXT,
        localPath TEXT
    )
"#;

const DROP_IMAGES_TABLE: &str = "DROP TABLE IF EXISTS Images";

pub struct MetadataStore {
    directories: Arc<DirectoryManager>,
    pool: Mutex<Option<SqlitePool>>,
}

impl MetadataStore {
    /// Open (creating if needed) `images.sqlite` under the metadata root
    pub async fn new(directories: Arc<DirectoryManager>) -> StorageResult<Self> {
        let store = Self {
            directories,
            pool: Mutex::new(None),
        };
        store.open().await?;
        Ok(store)
    }

    /// Path of the backing database file
    pub async fn database_path(&self) -> PathBuf {
        self.directories
            .metadata_root()
            .await
            .join(METADATA_FILE_NAME)
    }

    /// Acquire the handle and ensure the schema exists. No-op when already open.
    pub async fn open(&self) -> StorageResult<()> {
        let mut guard = self.pool.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let path = self.database_path().await;
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(CREATE_IMAGES_TABLE).execute(&pool).await?;
        info!(path = %path.display(), "Metadata store opened");

        *guard = Some(pool);
        Ok(())
    }

    /// Release the handle. Later operations fail with `StoreClosed` until `open`.
    pub async fn close(&self) {
        let mut guard = self.pool.lock().await;
        if let Some(pool) = guard.take() {
            pool.close().await;
            info!("Metadata store closed");
        }
    }

    pub async fn is_open(&self) -> bool {
        self.pool.lock().await.is_some()
    }

    pub async fn exists(&self, identifier: &str) -> StorageResult<bool> {
        let guard = self.pool.lock().await;
        let pool = guard.as_ref().ok_or(StorageError::StoreClosed)?;

        let row = sqlx::query("SELECT 1 FROM Images WHERE url = ? LIMIT 1")
            .bind(identifier)
            .fetch_optional(pool)
            .await?;

        Ok(row.is_some())
    }

    pub async fn lookup(&self, identifier: &str) -> StorageResult<Option<ResourceRecord>> {
        let guard = self.pool.lock().await;
        let pool = guard.as_ref().ok_or(StorageError::StoreClosed)?;

        let row = sqlx::query(
            "SELECT url, etag, lastModified, localPath FROM Images WHERE url = ? LIMIT 1",
        )
        .bind(identifier)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|row| ResourceRecord {
            identifier: row.get("url"),
            etag: row.get::<Option<String>, _>("etag").unwrap_or_default(),
            last_modified: row
                .get::<Option<String>, _>("lastModified")
                .unwrap_or_default(),
            blob_key: row.get::<Option<String>, _>("localPath").unwrap_or_default(),
        }))
    }

    /// Insert unless the identifier is already present; the first writer wins.
    ///
    /// Returns whether a row was written.
    pub async fn insert_if_absent(
        &self,
        identifier: &str,
        etag: &str,
        last_modified: &str,
        blob_key: &str,
    ) -> StorageResult<bool> {
        let guard = self.pool.lock().await;
        let pool = guard.as_ref().ok_or(StorageError::StoreClosed)?;

        let result = sqlx::query(
            "INSERT OR IGNORE INTO Images (url, etag, lastModified, localPath) VALUES (?, ?, ?, ?)",
        )
        .bind(identifier)
        .bind(etag)
        .bind(last_modified)
        .bind(blob_key)
        .execute(pool)
        .await?;

        let written = result.rows_affected() > 0;
        debug!(identifier, written, "insert_if_absent");
        Ok(written)
    }

    /// Insert, or overwrite only when either validator differs from the stored one.
    ///
    /// The comparison and the write are one statement. Returns whether a row
    /// was written.
    pub async fn upsert_if_changed(
        &self,
        identifier: &str,
        etag: &str,
        last_modified: &str,
        blob_key: &str,
    ) -> StorageResult<bool> {
        let guard = self.pool.lock().await;
        let pool = guard.as_ref().ok_or(StorageError::StoreClosed)?;

        let result = sqlx::query(
            r#"
            INSERT INTO Images (url, etag, lastModified, localPath)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                etag = excluded.etag,
                lastModified = excluded.lastModified,
                localPath = excluded.localPath
            WHERE Images.etag IS NOT excluded.etag
               OR Images.lastModified IS NOT excluded.lastModified
            "#,
        )
        .bind(identifier)
        .bind(etag)
        .bind(last_modified)
        .bind(blob_key)
        .execute(pool)
        .await?;

        let written = result.rows_affected() > 0;
        debug!(identifier, written, "upsert_if_changed");
        Ok(written)
    }

    /// Insert or overwrite unconditionally
    pub async fn upsert(
        &self,
        identifier: &str,
        etag: &str,
        last_modified: &str,
        blob_key: &str,
    ) -> StorageResult<()> {
        let guard = self.pool.lock().await;
        let pool = guard.as_ref().ok_or(StorageError::StoreClosed)?;

        sqlx::query(
            r#"
            INSERT INTO Images (url, etag, lastModified, localPath)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                etag = excluded.etag,
                lastModified = excluded.lastModified,
                localPath = excluded.localPath
            "#,
        )
        .bind(identifier)
        .bind(etag)
        .bind(last_modified)
        .bind(blob_key)
        .execute(pool)
        .await?;

        debug!(identifier, blob_key, "upsert");
        Ok(())
    }

    /// Drop and recreate the `Images` table
    pub async fn reset(&self) -> StorageResult<()> {
        let guard = self.pool.lock().await;
        let pool = guard.as_ref().ok_or(StorageError::StoreClosed)?;

        let mut transaction = pool.begin().await?;
        sqlx::query(DROP_IMAGES_TABLE)
            .execute(&mut *transaction)
            .await?;
        sqlx::query(CREATE_IMAGES_TABLE)
            .execute(&mut *transaction)
            .await?;
        transaction.commit().await?;

        info!("Images table reset successfully");
        Ok(())
    }

    pub async fn count(&self) -> StorageResult<i64> {
        let guard = self.pool.lock().await;
        let pool = guard.as_ref().ok_or(StorageError::StoreClosed)?;

        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM Images")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }
}
