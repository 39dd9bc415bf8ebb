use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

use crate::models::TransformOptions;

pub mod defaults;

use defaults::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub http: HttpConfig,
    /// Bounded-box downsampling applied to every fetched image when set
    #[serde(default)]
    pub transform: Option<TransformOptions>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Parent of both managed roots; the wipe only touches the roots below it
    pub cache_root: PathBuf,
    #[serde(default = "default_images_dir_name")]
    pub images_dir_name: String,
    #[serde(default = "default_metadata_dir_name")]
    pub metadata_dir_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Idle pooled connections kept per host; not a cap on concurrent requests
    #[serde(default = "default_max_idle_per_host")]
    pub max_idle_per_host: usize,
}

fn default_images_dir_name() -> String {
    DEFAULT_IMAGES_DIR_NAME.to_string()
}

fn default_metadata_dir_name() -> String {
    DEFAULT_METADATA_DIR_NAME.to_string()
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_max_idle_per_host() -> usize {
    DEFAULT_MAX_IDLE_PER_HOST
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from(DEFAULT_CACHE_ROOT),
            images_dir_name: default_images_dir_name(),
            metadata_dir_name: default_metadata_dir_name(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            user_agent: default_user_agent(),
            max_idle_per_host: DEFAULT_MAX_IDLE_PER_HOST,
        }
    }
}

impl StorageConfig {
    pub fn images_root(&self) -> PathBuf {
        self.cache_root.join(&self.images_dir_name)
    }

    pub fn metadata_root(&self) -> PathBuf {
        self.cache_root.join(&self.metadata_dir_name)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from_file(&config_file)
    }

    pub fn load_from_file(config_file: &str) -> Result<Self> {
        if std::path::Path::new(config_file).exists() {
            let contents = std::fs::read_to_string(config_file)?;
            let config: Config = toml::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            info!("No config file at {}, using defaults", config_file);
            Ok(Self::default())
        }
    }

    /// Reject layouts where the two managed roots would collide
    pub fn validate(&self) -> Result<()> {
        if self.storage.images_dir_name == self.storage.metadata_dir_name {
            anyhow::bail!(
                "images_dir_name and metadata_dir_name must differ (both are '{}')",
                self.storage.images_dir_name
            );
        }
        if let Some(transform) = &self.transform {
            if transform.width == 0 || transform.height == 0 {
                anyhow::bail!("transform width and height must be non-zero");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage.cache_root, PathBuf::from("./data/cache"));
        assert_eq!(config.http.max_idle_per_host, 12);
        assert!(config.transform.is_none());
        assert_ne!(config.storage.images_root(), config.storage.metadata_root());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            cache_root = "/tmp/pixcache"

            [http]
            request_timeout_secs = 5

            [transform]
            width = 320
            height = 240
            quality = 80
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.images_dir_name, "CacheImages");
        assert_eq!(config.storage.metadata_root(), PathBuf::from("/tmp/pixcache/DataBase"));
        assert_eq!(config.http.request_timeout_secs, 5);
        assert_eq!(config.http.connect_timeout_secs, 10);
        let transform = config.transform.unwrap();
        assert_eq!((transform.width, transform.height, transform.quality), (320, 240, 80));
    }

    #[test]
    fn test_storage_section_is_optional() {
        let config: Config = toml::from_str(
            r#"
            [http]
            max_idle_per_host = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.cache_root, PathBuf::from("./data/cache"));
        assert_eq!(config.storage.images_dir_name, "CacheImages");
        assert_eq!(config.http.max_idle_per_host, 4);
    }

    #[test]
    fn test_validate_rejects_shared_roots() {
        let mut config = Config::default();
        config.storage.metadata_dir_name = config.storage.images_dir_name.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = Config::load_from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.http.request_timeout_secs, 30);
    }
}
