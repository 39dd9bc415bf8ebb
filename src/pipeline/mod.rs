//! Revalidation pipeline
//!
//! One call to [`RevalidationPipeline::open`] runs one lookup, at most one
//! network round trip and at most one persist, and yields zero, one or two
//! payloads followed by either a clean end or a single error.
//!
//! ```text
//! lookup ─ none ──────────────── cold fetch ─ decode ─ transform? ─ put ─ insert_if_absent ─ yield
//!        ─ no validators ─────── read blob ─ yield
//!        ─ validators ─ read blob (best effort) ─ yield stale
//!                     ─ conditional fetch ─ Fresh ─ decode ─ transform? ─ put ─ upsert_if_changed ─ yield
//!                                                                           (upsert when the blob key moved)
//!                                         ─ NotModified ─ error
//! ```

use async_stream::try_stream;
use futures::Stream;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::database::MetadataStore;
use crate::errors::{CacheError, CacheResult, FetchError};
use crate::imaging;
use crate::models::{
    FetchOutcome, FreshResponse, LoadOutcome, Payload, PayloadSource, ResourceRecord,
    TransformOptions, ValidatorPair,
};
use crate::network::ConditionalFetcher;
use crate::storage::{blob_key_for, DiskObjectStore};

/// How the persisted record is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PersistMode {
    /// Cold fetch: first writer wins
    InsertIfAbsent,
    /// Revalidation: overwrite only if validators changed
    UpsertIfChanged,
    /// Revalidation that moved the blob: the record must point at the new key
    Overwrite,
}

#[derive(Clone)]
pub struct RevalidationPipeline {
    store: Arc<MetadataStore>,
    disk: DiskObjectStore,
    fetcher: Arc<dyn ConditionalFetcher>,
    transform: Option<TransformOptions>,
}

impl RevalidationPipeline {
    pub fn new(
        store: Arc<MetadataStore>,
        disk: DiskObjectStore,
        fetcher: Arc<dyn ConditionalFetcher>,
    ) -> Self {
        Self {
            store,
            disk,
            fetcher,
            transform: None,
        }
    }

    /// Downsample every fetched image into the given box before storing it
    pub fn with_transform(mut self, transform: Option<TransformOptions>) -> Self {
        self.transform = transform;
        self
    }

    /// Start a pipeline for `identifier`.
    ///
    /// The stream is lazy: nothing happens until it is polled. Dropping it or
    /// cancelling `cancel` stops further work; payloads already yielded stay
    /// valid.
    pub fn open(
        &self,
        identifier: impl Into<String>,
        cancel: CancellationToken,
    ) -> impl Stream<Item = CacheResult<Payload>> + Send + 'static {
        let pipeline = self.clone();
        let identifier = identifier.into();

        try_stream! {
            ensure_active(&cancel)?;
            validate_identifier(&identifier)?;

            let record = pipeline
                .store
                .lookup(&identifier)
                .await
                .map_err(|e| CacheError::cache_read(identifier.as_str(), e))?;

            match record {
                None => {
                    debug!(identifier = %identifier, "Cache miss");
                    ensure_active(&cancel)?;

                    info!(identifier = %identifier, "Downloading uncached image");
                    let outcome = pipeline.fetcher.fetch_cold(&identifier).await;
                    let fresh = expect_fresh(&identifier, outcome, false)?;

                    let blob_key = blob_key_for(&identifier);
                    let payload = pipeline
                        .persist(&identifier, &blob_key, fresh, PersistMode::InsertIfAbsent, &cancel)
                        .await?;
                    yield payload;
                }
                Some(record) if record.validators().is_permanently_fresh() => {
                    debug!(identifier = %identifier, blob_key = %record.blob_key, "Cache hit without validators");
                    let payload = pipeline.read_cached(&record).await?;
                    yield payload;
                }
                Some(record) => {
                    debug!(identifier = %identifier, blob_key = %record.blob_key, "Cache hit, revalidating");

                    // A record whose blob is gone gets an unconditional fetch so
                    // a 304 can't leave the caller with nothing.
                    let validators = match pipeline.read_cached(&record).await {
                        Ok(stale) => {
                            yield stale;
                            Some(record.validators())
                        }
                        Err(e) => {
                            warn!(identifier = %identifier, error = %e, "Dangling metadata record, refetching");
                            None
                        }
                    };

                    ensure_active(&cancel)?;
                    let outcome = pipeline
                        .fetcher
                        .fetch_conditional(&identifier, validators.as_ref())
                        .await;
                    let fresh = expect_fresh(&identifier, outcome, validators.is_some())?;

                    let (blob_key, mode) = if record.blob_key.is_empty() {
                        (blob_key_for(&identifier), PersistMode::Overwrite)
                    } else {
                        (record.blob_key.clone(), PersistMode::UpsertIfChanged)
                    };
                    let payload = pipeline
                        .persist(&identifier, &blob_key, fresh, mode, &cancel)
                        .await?;
                    yield payload;
                }
            }
        }
    }

    /// Run a pipeline to completion and collect everything it produced
    pub async fn load(&self, identifier: impl Into<String>, cancel: CancellationToken) -> LoadOutcome {
        LoadOutcome::collect(self.open(identifier, cancel)).await
    }

    async fn read_cached(&self, record: &ResourceRecord) -> CacheResult<Payload> {
        let data = self
            .disk
            .get(&record.blob_key)
            .await
            .map_err(|e| CacheError::cache_read(record.blob_key.as_str(), e))?;

        let (width, height, data) = tokio::task::spawn_blocking(move || {
            imaging::decode(&data).map(|image| (image.width(), image.height(), data))
        })
        .await
        .map_err(|e| CacheError::cache_read(record.blob_key.as_str(), e))?
        .ok_or_else(|| {
            CacheError::cache_read(record.blob_key.as_str(), "cached blob is not a decodable image")
        })?;

        Ok(Payload {
            data,
            width,
            height,
            source: PayloadSource::Cache,
        })
    }

    async fn persist(
        &self,
        identifier: &str,
        blob_key: &str,
        fresh: FreshResponse,
        mode: PersistMode,
        cancel: &CancellationToken,
    ) -> CacheResult<Payload> {
        let FreshResponse { data, validators } = fresh;

        let transform = self.transform;
        let prepared = tokio::task::spawn_blocking(move || prepare(data, transform.as_ref()))
            .await
            .map_err(|_| CacheError::invalid_payload(identifier))?
            .ok_or_else(|| CacheError::invalid_payload(identifier))?;

        ensure_active(cancel)?;

        let stored_key = self.disk.put(blob_key, &prepared.data).await.map_err(|e| {
            error!(identifier, blob_key, error = %e, "Failed to write blob");
            CacheError::cache_write(blob_key, e)
        })?;

        // The disk store may rename unsafe keys; the record must follow
        let mode = match mode {
            PersistMode::UpsertIfChanged if stored_key != blob_key => PersistMode::Overwrite,
            mode => mode,
        };

        self.write_record(identifier, &stored_key, &validators, mode)
            .await?;

        Ok(Payload {
            data: prepared.data,
            width: prepared.width,
            height: prepared.height,
            source: PayloadSource::Network,
        })
    }

    async fn write_record(
        &self,
        identifier: &str,
        blob_key: &str,
        validators: &ValidatorPair,
        mode: PersistMode,
    ) -> CacheResult<()> {
        let result = match mode {
            PersistMode::InsertIfAbsent => {
                self.store
                    .insert_if_absent(identifier, &validators.etag, &validators.last_modified, blob_key)
                    .await
            }
            PersistMode::UpsertIfChanged => {
                self.store
                    .upsert_if_changed(identifier, &validators.etag, &validators.last_modified, blob_key)
                    .await
            }
            PersistMode::Overwrite => self
                .store
                .upsert(identifier, &validators.etag, &validators.last_modified, blob_key)
                .await
                .map(|()| true),
        };

        match result {
            Ok(written) => {
                debug!(identifier, blob_key, written, ?mode, "Metadata persisted");
                Ok(())
            }
            Err(e) => {
                error!(identifier, blob_key, error = %e, "Failed to write metadata");
                Err(CacheError::cache_write(blob_key, e))
            }
        }
    }
}

/// Bytes ready for the disk store plus their pixel dimensions
struct Prepared {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

/// Decode, then optionally transform. `None` only when the bytes are not an image.
fn prepare(data: Vec<u8>, transform: Option<&TransformOptions>) -> Option<Prepared> {
    let image = imaging::decode(&data)?;

    if let Some(options) = transform {
        match imaging::transform(&image, options) {
            Some(transformed) => {
                return Some(Prepared {
                    data: transformed.data,
                    width: transformed.width,
                    height: transformed.height,
                })
            }
            None => warn!(
                width = options.width,
                height = options.height,
                "Transform failed, storing original image"
            ),
        }
    }

    Some(Prepared {
        width: image.width(),
        height: image.height(),
        data,
    })
}

fn ensure_active(cancel: &CancellationToken) -> CacheResult<()> {
    if cancel.is_cancelled() {
        Err(CacheError::Cancelled)
    } else {
        Ok(())
    }
}

fn validate_identifier(identifier: &str) -> CacheResult<()> {
    match Url::parse(identifier) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => Err(CacheError::invalid_identifier(identifier)),
    }
}

fn expect_fresh(identifier: &str, outcome: FetchOutcome, revalidating: bool) -> CacheResult<FreshResponse> {
    match outcome {
        FetchOutcome::Fresh(fresh) => Ok(fresh),
        FetchOutcome::NotModified if revalidating => {
            debug!(identifier, "Revalidated, not modified");
            Err(CacheError::not_modified(identifier))
        }
        // 304 to a request that carried no validators
        FetchOutcome::NotModified => Err(FetchError::invalid_response(
            "304 Not Modified for an unconditional request",
        )
        .into()),
        FetchOutcome::Failed(e) => {
            debug!(identifier, error = %e, "Fetch failed");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("https://example.com/a.png").is_ok());
        assert!(validate_identifier("http://example.com/a.png").is_ok());
        assert!(matches!(
            validate_identifier("example.com/a.png"),
            Err(CacheError::InvalidIdentifier { .. })
        ));
        assert!(validate_identifier("ftp://example.com/a.png").is_err());
        assert!(validate_identifier("").is_err());
    }

    #[test]
    fn test_expect_fresh_maps_outcomes() {
        let url = "https://example.com/a.png";

        assert!(expect_fresh(url, FetchOutcome::NotModified, true)
            .unwrap_err()
            .is_not_modified());
        assert!(matches!(
            expect_fresh(url, FetchOutcome::NotModified, false),
            Err(CacheError::Fetch(FetchError::InvalidResponse { .. }))
        ));
        assert!(matches!(
            expect_fresh(url, FetchOutcome::Failed(FetchError::ServerError { status: 500 }), true),
            Err(CacheError::Fetch(FetchError::ServerError { status: 500 }))
        ));
    }

    #[test]
    fn test_prepare_rejects_non_image() {
        assert!(prepare(b"<html>".to_vec(), None).is_none());
    }

    #[test]
    fn test_cancelled_token() {
        let token = CancellationToken::new();
        assert!(ensure_active(&token).is_ok());
        token.cancel();
        assert!(matches!(ensure_active(&token), Err(CacheError::Cancelled)));
    }
}
