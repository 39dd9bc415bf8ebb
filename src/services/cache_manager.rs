//! Whole-cache operations: full wipe and disk usage
//!
//! A wipe closes the metadata store before touching any file and reopens it
//! afterwards, so no pipeline write can land on a half-deleted database.
//! Pipelines running during the wipe fail with a cache error instead.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::defaults::METADATA_FILE_NAME;
use crate::database::MetadataStore;
use crate::errors::{CacheError, CacheResult};
use crate::storage::DirectoryManager;

const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

/// Result of a full wipe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub removed_entries: usize,
    pub failed_entries: usize,
}

/// Bytes used by both managed roots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheUsage {
    pub total_bytes: u64,
    pub file_count: usize,
    pub capacity_bytes: Option<u64>,
}

impl CacheUsage {
    pub fn megabytes(&self) -> f64 {
        self.total_bytes as f64 / BYTES_PER_MEGABYTE
    }

    /// Share of the capacity in percent, if a non-zero capacity was given
    pub fn percent_of_capacity(&self) -> Option<f64> {
        match self.capacity_bytes {
            Some(capacity) if capacity > 0 => {
                Some(self.total_bytes as f64 / capacity as f64 * 100.0)
            }
            _ => None,
        }
    }

    /// e.g. `12.3 MB`
    pub fn formatted_size(&self) -> String {
        format!("{:.1} MB", self.megabytes())
    }

    /// e.g. `4.56%`
    pub fn formatted_percent(&self) -> Option<String> {
        self.percent_of_capacity()
            .map(|percent| format!("{:.2}%", percent))
    }
}

pub struct CacheManager {
    store: Arc<MetadataStore>,
    directories: Arc<DirectoryManager>,
}

impl CacheManager {
    pub fn new(store: Arc<MetadataStore>, directories: Arc<DirectoryManager>) -> Self {
        Self { store, directories }
    }

    /// Delete every cached blob and every metadata record.
    ///
    /// Steps run in order: reset the table, close the store, delete the
    /// contents of both roots, clear the creation flags, reopen the store
    /// (which recreates the schema). Individual file failures are logged and
    /// counted; only a failure to reopen the store is returned as an error.
    pub async fn clean(&self) -> CacheResult<CleanReport> {
        info!("Wiping image cache");

        // Empty table even if the database file itself survives deletion
        if let Err(e) = self.store.reset().await {
            warn!(error = %e, "Failed to reset metadata table before wipe");
        }
        self.store.close().await;

        let mut report = CleanReport::default();
        for root in self.directories.managed_roots() {
            let (removed, failed) = remove_contents(root).await;
            report.removed_entries += removed;
            report.failed_entries += failed;
        }

        self.directories.reset_created();

        self.store
            .open()
            .await
            .map_err(|e| CacheError::cache_write(METADATA_FILE_NAME, e))?;

        info!(
            removed = report.removed_entries,
            failed = report.failed_entries,
            "Image cache wiped"
        );
        Ok(report)
    }

    /// Sum the sizes of every file under both roots
    pub async fn usage(&self, capacity_bytes: Option<u64>) -> CacheUsage {
        let mut usage = CacheUsage {
            total_bytes: 0,
            file_count: 0,
            capacity_bytes,
        };

        for root in self.directories.managed_roots() {
            let (bytes, files) = directory_size(root).await;
            usage.total_bytes += bytes;
            usage.file_count += files;
        }

        debug!(
            total_bytes = usage.total_bytes,
            file_count = usage.file_count,
            "Computed cache usage"
        );
        usage
    }
}

/// Remove everything inside `root`, keeping `root` itself
async fn remove_contents(root: &Path) -> (usize, usize) {
    let mut entries = match fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return (0, 0),
        Err(e) => {
            warn!(root = %root.display(), error = %e, "Failed to list cache root");
            return (0, 1);
        }
    };

    let mut removed = 0;
    let mut failed = 0;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "Failed to read cache root entry");
                failed += 1;
                break;
            }
        };

        let path = entry.path();
        let result = match entry.file_type().await {
            Ok(file_type) if file_type.is_dir() => fs::remove_dir_all(&path).await,
            _ => fs::remove_file(&path).await,
        };

        match result {
            Ok(()) => removed += 1,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove cache entry");
                failed += 1;
            }
        }
    }

    (removed, failed)
}

async fn directory_size(root: &Path) -> (u64, usize) {
    let mut total = 0;
    let mut files = 0;
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(_) => continue,
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            match entry.metadata().await {
                Ok(metadata) if metadata.is_dir() => pending.push(entry.path()),
                Ok(metadata) => {
                    total += metadata.len();
                    files += 1;
                }
                Err(e) => debug!(path = %entry.path().display(), error = %e, "Skipping entry"),
            }
        }
    }

    (total, files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn manager(temp_dir: &TempDir) -> (CacheManager, Arc<MetadataStore>, Arc<DirectoryManager>) {
        let directories = Arc::new(DirectoryManager::new(
            temp_dir.path().join("CacheImages"),
            temp_dir.path().join("DataBase"),
        ));
        let store = Arc::new(MetadataStore::new(directories.clone()).await.unwrap());
        (
            CacheManager::new(store.clone(), directories.clone()),
            store,
            directories,
        )
    }

    #[test]
    fn test_usage_formatting() {
        let usage = CacheUsage {
            total_bytes: 5 * 1024 * 1024 + 512 * 1024,
            file_count: 3,
            capacity_bytes: Some(100 * 1024 * 1024),
        };
        assert_eq!(usage.formatted_size(), "5.5 MB");
        assert_eq!(usage.formatted_percent().unwrap(), "5.50%");

        let unbounded = CacheUsage {
            capacity_bytes: None,
            ..usage
        };
        assert!(unbounded.formatted_percent().is_none());
        let zero = CacheUsage {
            capacity_bytes: Some(0),
            ..usage
        };
        assert!(zero.percent_of_capacity().is_none());
    }

    #[tokio::test]
    async fn test_clean_empties_roots_and_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let (manager, store, directories) = manager(&temp_dir).await;

        let images = directories.images_root().await;
        std::fs::write(images.join("blob-a"), b"aaaa").unwrap();
        std::fs::create_dir_all(images.join("nested")).unwrap();
        std::fs::write(images.join("nested/blob-b"), b"bb").unwrap();
        store
            .insert_if_absent("https://example.com/a.png", "\"v1\"", "", "blob-a")
            .await
            .unwrap();

        let report = manager.clean().await.unwrap();
        assert_eq!(report.failed_entries, 0);
        assert!(report.removed_entries >= 2);

        assert!(store.is_open().await);
        assert!(!store.exists("https://example.com/a.png").await.unwrap());
        assert!(!images.join("blob-a").exists());
        assert!(!images.join("nested").exists());
    }

    #[tokio::test]
    async fn test_usage_counts_both_roots() {
        let temp_dir = TempDir::new().unwrap();
        let (manager, _store, directories) = manager(&temp_dir).await;

        let images = directories.images_root().await;
        std::fs::write(images.join("blob-a"), vec![0u8; 2048]).unwrap();

        let usage = manager.usage(Some(1024 * 1024)).await;
        // Blob plus the sqlite file
        assert!(usage.total_bytes >= 2048);
        assert!(usage.file_count >= 2);
        assert!(usage.percent_of_capacity().unwrap() > 0.0);
    }
}
