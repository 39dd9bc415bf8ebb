//! Conditional HTTP fetching
//!
//! The pipeline only sees [`ConditionalFetcher`]; [`HttpFetchClient`] is the
//! reqwest implementation used in production.

pub mod client;
pub mod traits;

pub use client::{classify, Classification, HttpFetchClient};
pub use traits::ConditionalFetcher;
