//! Error type definitions for pixcache
//!
//! The fetch and storage layers each have their own error enum; the
//! revalidation pipeline folds them into [`CacheError`], which is what a
//! caller sees as the terminal item of a pipeline stream.

use thiserror::Error;

/// Terminal condition of a revalidation pipeline
///
/// Values already emitted before one of these is produced remain valid.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The identifier is not an absolute http(s) URL
    #[error("Invalid identifier: {identifier}")]
    InvalidIdentifier { identifier: String },

    /// The network round trip failed
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Revalidation confirmed the cached copy is current; no fresh data exists
    #[error("Not modified: {identifier}")]
    NotModified { identifier: String },

    /// Downloaded bytes are not a decodable image
    #[error("Invalid image data: {identifier}")]
    InvalidPayload { identifier: String },

    /// An expected cached blob is missing or unreadable
    #[error("Error reading from cache: {key} - {message}")]
    CacheRead { key: String, message: String },

    /// Writing the blob or its metadata failed
    #[error("Error saving to cache: {key} - {message}")]
    CacheWrite { key: String, message: String },

    /// The caller cancelled the pipeline
    #[error("Pipeline cancelled")]
    Cancelled,

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

/// Conditional fetch client errors
#[derive(Error, Debug)]
pub enum FetchError {
    /// The URL could not be parsed or has an unsupported scheme
    #[error("URL address is invalid: {url}")]
    InvalidUrl { url: String },

    /// The response could not be read
    #[error("Unexpected server response: {message}")]
    InvalidResponse { message: String },

    /// Any status other than 2xx or 304
    #[error("Server error: {status}")]
    ServerError { status: u16 },

    /// Transport level failure (DNS, connect, TLS, timeout)
    #[error("Network request failed: {message}")]
    Network { message: String },
}

/// Disk object store and metadata store errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Blob key has no file under the root
    #[error("Blob not found: {key}")]
    NotFound { key: String },

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite operation failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The metadata store handle is closed (wipe in progress)
    #[error("Metadata store is closed")]
    StoreClosed,
}

/// Convenience methods for creating common error types
impl CacheError {
    /// Create an invalid identifier error
    pub fn invalid_identifier<S: Into<String>>(identifier: S) -> Self {
        Self::InvalidIdentifier {
            identifier: identifier.into(),
        }
    }

    /// Create a not-modified signal for an identifier
    pub fn not_modified<S: Into<String>>(identifier: S) -> Self {
        Self::NotModified {
            identifier: identifier.into(),
        }
    }

    /// Create an invalid payload error
    pub fn invalid_payload<S: Into<String>>(identifier: S) -> Self {
        Self::InvalidPayload {
            identifier: identifier.into(),
        }
    }

    /// Create a cache read error
    pub fn cache_read<K: Into<String>, M: ToString>(key: K, message: M) -> Self {
        Self::CacheRead {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Create a cache write error
    pub fn cache_write<K: Into<String>, M: ToString>(key: K, message: M) -> Self {
        Self::CacheWrite {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// True when revalidation confirmed the cached copy is unchanged
    pub fn is_not_modified(&self) -> bool {
        matches!(self, Self::NotModified { .. })
    }
}

impl FetchError {
    /// Create an invalid URL error
    pub fn invalid_url<U: Into<String>>(url: U) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Create a network error from any displayable cause
    pub fn network<E: ToString>(cause: E) -> Self {
        Self::Network {
            message: cause.to_string(),
        }
    }

    /// Create an invalid response error
    pub fn invalid_response<M: ToString>(message: M) -> Self {
        Self::InvalidResponse {
            message: message.to_string(),
        }
    }
}

impl StorageError {
    /// Create a blob not found error
    pub fn not_found<K: Into<String>>(key: K) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// True when the failure is a missing blob rather than an I/O fault
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
