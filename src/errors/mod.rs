//! Centralized error handling for pixcache
//!
//! Errors are split by the layer that produces them:
//!
//! - **Fetch Errors**: invalid URLs, transport failures and non-2xx/304 responses
//! - **Storage Errors**: disk object store and metadata store failures
//! - **Cache Errors**: the single terminal condition of a revalidation pipeline
//!
//! # Usage
//!
//! ```rust
//! use pixcache::errors::{CacheError, CacheResult};
//!
//! fn example_function() -> CacheResult<()> {
//!     Err(CacheError::invalid_identifier("not a url"))
//! }
//!
//! assert!(example_function().is_err());
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using CacheError
pub type CacheResult<T> = Result<T, CacheError>;

/// Convenience type alias for fetch layer Results
pub type FetchResult<T> = Result<T, FetchError>;

/// Convenience type alias for storage layer Results
pub type StorageResult<T> = Result<T, StorageError>;
