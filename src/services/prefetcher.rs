//! Warm the cache for a batch of identifiers
//!
//! Each identifier runs its own pipeline on its own task. Results are only
//! counted, never returned.

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pipeline::RevalidationPipeline;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetchSummary {
    /// At least one payload arrived (including revalidated-unchanged entries)
    pub loaded: usize,
    pub failed: usize,
}

pub struct Prefetcher {
    pipeline: RevalidationPipeline,
}

impl Prefetcher {
    pub fn new(pipeline: RevalidationPipeline) -> Self {
        Self { pipeline }
    }

    pub async fn prefetch<I, S>(&self, identifiers: I, cancel: CancellationToken) -> PrefetchSummary
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let handles: Vec<_> = identifiers
            .into_iter()
            .map(|identifier| {
                let identifier = identifier.into();
                let pipeline = self.pipeline.clone();
                let cancel = cancel.child_token();
                tokio::spawn(async move {
                    let outcome = pipeline.load(identifier.clone(), cancel).await;
                    (identifier, outcome)
                })
            })
            .collect();

        let total = handles.len();
        let mut summary = PrefetchSummary::default();

        for joined in join_all(handles).await {
            match joined {
                Ok((identifier, outcome)) if outcome.has_value() => {
                    debug!(identifier = %identifier, "Prefetched");
                    summary.loaded += 1;
                }
                Ok((identifier, outcome)) => {
                    if let Some(e) = outcome.error {
                        warn!(identifier = %identifier, error = %e, "Prefetch failed");
                    }
                    summary.failed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Prefetch task panicked");
                    summary.failed += 1;
                }
            }
        }

        info!(
            total,
            loaded = summary.loaded,
            failed = summary.failed,
            "Prefetch complete"
        );
        summary
    }
}
