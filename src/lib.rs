//! A revalidating remote image cache.
//!
//! Images are addressed by URL. Bytes live in a flat disk object store and
//! each URL's validators (`ETag`, `Last-Modified`) live in a SQLite table.
//! [`pipeline::RevalidationPipeline`] ties them together: it serves the
//! cached copy first, then revalidates it with a single conditional GET.

pub mod config;
pub mod database;
pub mod errors;
pub mod imaging;
pub mod models;
pub mod network;
pub mod pipeline;
pub mod services;
pub mod storage;
