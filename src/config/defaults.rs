/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Storage defaults
pub const DEFAULT_CACHE_ROOT: &str = "./data/cache";
pub const DEFAULT_IMAGES_DIR_NAME: &str = "CacheImages";
pub const DEFAULT_METADATA_DIR_NAME: &str = "DataBase";
pub const METADATA_FILE_NAME: &str = "images.sqlite";

// HTTP client defaults
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_IDLE_PER_HOST: usize = 12;

// Config file
pub const DEFAULT_CONFIG_FILE: &str = "pixcache.toml";

pub fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}
