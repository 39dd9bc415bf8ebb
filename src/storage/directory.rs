//! Lazily created, resettable cache roots
//!
//! A root directory is created on first access and the fact is memoized.
//! A full wipe deletes the directories out from under the providers, so
//! the flag can be reset to force re-creation on the next access.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs;
use tracing::{debug, warn};

use crate::config::StorageConfig;

pub struct DirectoryProvider {
    path: PathBuf,
    created: AtomicBool,
}

impl DirectoryProvider {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            created: AtomicBool::new(false),
        }
    }

    /// Resolve the root, creating it on first access.
    ///
    /// A failed creation is logged and the path is returned anyway; the
    /// flag stays unset so the next access retries.
    pub async fn directory(&self) -> PathBuf {
        if !self.created.load(Ordering::Acquire) {
            match fs::create_dir_all(&self.path).await {
                Ok(()) => {
                    debug!(path = %self.path.display(), "Cache root ready");
                    self.created.store(true, Ordering::Release);
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Failed to create directory");
                }
            }
        }
        self.path.clone()
    }

    /// The root path without touching the filesystem
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_created(&self) -> bool {
        self.created.load(Ordering::Acquire)
    }

    pub fn reset_created(&self) {
        self.created.store(false, Ordering::Release);
    }
}

/// The two roots the cache manages: image blobs and the metadata database
pub struct DirectoryManager {
    images: DirectoryProvider,
    metadata: DirectoryProvider,
}

impl DirectoryManager {
    pub fn new<I: Into<PathBuf>, M: Into<PathBuf>>(images_root: I, metadata_root: M) -> Self {
        Self {
            images: DirectoryProvider::new(images_root),
            metadata: DirectoryProvider::new(metadata_root),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.images_root(), config.metadata_root())
    }

    pub async fn images_root(&self) -> PathBuf {
        self.images.directory().await
    }

    pub async fn metadata_root(&self) -> PathBuf {
        self.metadata.directory().await
    }

    /// Both roots, for wipes and usage scans
    pub fn managed_roots(&self) -> [&Path; 2] {
        [self.images.path(), self.metadata.path()]
    }

    pub fn reset_created(&self) {
        self.images.reset_created();
        self.metadata.reset_created();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_lazy_creation() {
        let temp_dir = TempDir::new().unwrap();
        let provider = DirectoryProvider::new(temp_dir.path().join("a/b"));

        assert!(!provider.is_created());
        assert!(!provider.path().exists());

        let path = provider.directory().await;
        assert!(path.is_dir());
        assert!(provider.is_created());
    }

    #[tokio::test]
    async fn test_reset_forces_recreation() {
        let temp_dir = TempDir::new().unwrap();
        let provider = DirectoryProvider::new(temp_dir.path().join("images"));

        let path = provider.directory().await;
        std::fs::remove_dir_all(&path).unwrap();

        // Memoized: no re-creation until the flag is reset
        provider.directory().await;
        assert!(!path.exists());

        provider.reset_created();
        provider.directory().await;
        assert!(path.is_dir());
    }

    #[tokio::test]
    async fn test_manager_roots_are_distinct() {
        let temp_dir = TempDir::new().unwrap();
        let manager = DirectoryManager::new(
            temp_dir.path().join("CacheImages"),
            temp_dir.path().join("DataBase"),
        );

        let images = manager.images_root().await;
        let metadata = manager.metadata_root().await;
        assert_ne!(images, metadata);
        assert!(images.is_dir() && metadata.is_dir());

        manager.reset_created();
        assert!(!manager.images.is_created());
        assert!(!manager.metadata.is_created());
    }
}
