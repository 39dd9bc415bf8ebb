use async_trait::async_trait;

use crate::models::{FetchOutcome, ValidatorPair};

/// Performs one GET and classifies the response
///
/// Implementations never return an error directly: every failure is folded
/// into [`FetchOutcome::Failed`] so the pipeline can decide what to emit.
#[async_trait]
pub trait ConditionalFetcher: Send + Sync {
    /// GET `url`, attaching at most one validator header from `validators`
    async fn fetch_conditional(&self, url: &str, validators: Option<&ValidatorPair>)
        -> FetchOutcome;

    /// Unconditional GET for an identifier with no metadata
    async fn fetch_cold(&self, url: &str) -> FetchOutcome {
        self.fetch_conditional(url, None).await
    }
}
