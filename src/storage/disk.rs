//! Disk object store
//!
//! Maps a blob key to a file directly under the images root. Writes go to a
//! temporary file in the same directory and are renamed into place, so a
//! partially written blob is never visible under its final name. There is
//! no eviction; only a full wipe reclaims space.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use super::directory::DirectoryManager;
use crate::errors::{StorageError, StorageResult};

/// Longest blob key kept as a plain encoding; most filesystems cap names at 255 bytes
const MAX_ENCODED_KEY_LEN: usize = 200;

/// Prefix for digest keys. Plain keys of http(s) identifiers start with `aHR0`.
const DIGEST_KEY_PREFIX: &str = "h_";

/// Derive a stable file name from an identifier.
///
/// URL-safe base64 of the identifier, which is reversible and therefore
/// collision-free. Identifiers whose encoding would exceed the file name
/// limit fall back to a SHA-256 digest.
pub fn blob_key_for(identifier: &str) -> String {
    let encoded = URL_SAFE_NO_PAD.encode(identifier.as_bytes());
    if !encoded.is_empty() && encoded.len() <= MAX_ENCODED_KEY_LEN {
        encoded
    } else {
        let digest = Sha256::digest(identifier.as_bytes());
        format!("{}{}", DIGEST_KEY_PREFIX, hex::encode(digest))
    }
}

/// A key is used verbatim only if it is a single plain path component
fn is_plain_file_name(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_ENCODED_KEY_LEN
        && key != "."
        && key != ".."
        && !key.starts_with('.')
        && !key.contains(['/', '\\', '\0'])
}

#[derive(Clone)]
pub struct DiskObjectStore {
    directories: Arc<DirectoryManager>,
}

impl DiskObjectStore {
    pub fn new(directories: Arc<DirectoryManager>) -> Self {
        Self { directories }
    }

    /// The file name actually used for `key`
    pub fn file_name_for(key: &str) -> String {
        if is_plain_file_name(key) {
            key.to_string()
        } else {
            blob_key_for(key)
        }
    }

    /// Write `data` atomically and return the name it was stored under
    pub async fn put(&self, key: &str, data: &[u8]) -> StorageResult<String> {
        let root = self.directories.images_root().await;
        let file_name = Self::file_name_for(key);
        let target = root.join(&file_name);
        let data = data.to_vec();

        let written = data.len();
        tokio::task::spawn_blocking(move || write_atomic(root, target, &data))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;

        debug!(blob_key = %file_name, bytes = written, "Stored blob");
        Ok(file_name)
    }

    pub async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let root = self.directories.images_root().await;
        let file_name = Self::file_name_for(key);

        match tokio::fs::read(root.join(&file_name)).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::not_found(file_name))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    pub async fn contains(&self, key: &str) -> bool {
        let root = self.directories.images_root().await;
        tokio::fs::try_exists(root.join(Self::file_name_for(key)))
            .await
            .unwrap_or(false)
    }
}

fn write_atomic(root: PathBuf, target: PathBuf, data: &[u8]) -> StorageResult<()> {
    let mut temp = tempfile::NamedTempFile::new_in(&root)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(&target).map_err(|e| StorageError::Io(e.error))?;
    Ok(())
}
