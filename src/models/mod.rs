//! Data model shared by the stores, the fetch client and the pipeline

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::errors::{CacheError, FetchError};

/// Server-supplied cache validators for one resource
///
/// Both fields may be empty. An entry with neither is "permanently fresh":
/// it was stored without validators and is never revalidated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorPair {
    pub etag: String,
    pub last_modified: String,
}

impl ValidatorPair {
    pub fn new<E: Into<String>, L: Into<String>>(etag: E, last_modified: L) -> Self {
        Self {
            etag: etag.into(),
            last_modified: last_modified.into(),
        }
    }

    pub fn is_permanently_fresh(&self) -> bool {
        self.etag.is_empty() && self.last_modified.is_empty()
    }

    /// The single conditional header to send, if any.
    ///
    /// An entity tag wins over a modification date; only one is ever sent.
    pub fn conditional_header(&self) -> Option<(&'static str, &str)> {
        if !self.etag.is_empty() {
            Some(("If-None-Match", self.etag.as_str()))
        } else if !self.last_modified.is_empty() {
            Some(("If-Modified-Since", self.last_modified.as_str()))
        } else {
            None
        }
    }
}

/// One row of the `Images` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub identifier: String,
    pub etag: String,
    pub last_modified: String,
    pub blob_key: String,
}

impl ResourceRecord {
    pub fn validators(&self) -> ValidatorPair {
        ValidatorPair::new(self.etag.clone(), self.last_modified.clone())
    }
}

/// Body and validators of a 2xx response
#[derive(Debug, Clone)]
pub struct FreshResponse {
    pub data: Vec<u8>,
    pub validators: ValidatorPair,
}

/// Classified result of one conditional GET
#[derive(Debug)]
pub enum FetchOutcome {
    Fresh(FreshResponse),
    NotModified,
    Failed(FetchError),
}

/// Where an emitted payload came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSource {
    Cache,
    Network,
}

impl PayloadSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadSource::Cache => "cache",
            PayloadSource::Network => "network",
        }
    }
}

/// A decoded image as emitted by the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// Encoded image bytes exactly as stored on disk
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub source: PayloadSource,
}

/// Bounded-box downsampling request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformOptions {
    /// Target box width in pixels
    pub width: u32,
    /// Target box height in pixels
    pub height: u32,
    /// JPEG quality, 1 (lowest) to 100 (highest)
    #[serde(default = "default_quality")]
    pub quality: u8,
}

fn default_quality() -> u8 {
    100
}

impl TransformOptions {
    pub fn new(width: u32, height: u32, quality: u8) -> Self {
        Self {
            width,
            height,
            quality,
        }
    }
}

/// Everything a pipeline produced, drained into one value
///
/// Keeps "a value arrived, then revalidation said unchanged" apart from
/// "nothing arrived at all".
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub values: Vec<Payload>,
    pub error: Option<CacheError>,
}

impl LoadOutcome {
    /// Drain a pipeline stream until it terminates
    pub async fn collect<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Payload, CacheError>>,
    {
        let mut outcome = Self::default();
        futures::pin_mut!(stream);
        while let Some(item) = stream.next().await {
            match item {
                Ok(payload) => outcome.values.push(payload),
                Err(e) => {
                    outcome.error = Some(e);
                    break;
                }
            }
        }
        outcome
    }

    pub fn has_value(&self) -> bool {
        !self.values.is_empty()
    }

    /// The newest value delivered, if any
    pub fn latest(&self) -> Option<&Payload> {
        self.values.last()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// A cached value was served and the server confirmed it is current
    pub fn is_revalidated_unchanged(&self) -> bool {
        self.has_value()
            && self
                .error
                .as_ref()
                .map(CacheError::is_not_modified)
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(source: PayloadSource) -> Payload {
        Payload {
            data: vec![1, 2, 3],
            width: 1,
            height: 1,
            source,
        }
    }

    #[test]
    fn test_permanently_fresh() {
        assert!(ValidatorPair::default().is_permanently_fresh());
        assert!(!ValidatorPair::new("\"abc\"", "").is_permanently_fresh());
        assert!(!ValidatorPair::new("", "Wed, 21 Oct 2015 07:28:00 GMT").is_permanently_fresh());
    }

    #[test]
    fn test_etag_takes_precedence() {
        let both = ValidatorPair::new("\"v1\"", "Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(both.conditional_header(), Some(("If-None-Match", "\"v1\"")));

        let date_only = ValidatorPair::new("", "Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(
            date_only.conditional_header(),
            Some(("If-Modified-Since", "Wed, 21 Oct 2015 07:28:00 GMT"))
        );

        assert_eq!(ValidatorPair::default().conditional_header(), None);
    }

    #[tokio::test]
    async fn test_collect_stale_then_not_modified() {
        let items: Vec<Result<Payload, CacheError>> = vec![
            Ok(payload(PayloadSource::Cache)),
            Err(CacheError::not_modified("https://example.com/a.png")),
        ];
        let outcome = LoadOutcome::collect(futures::stream::iter(items)).await;

        assert!(outcome.has_value());
        assert!(outcome.is_revalidated_unchanged());
        assert!(!outcome.is_success());
        assert_eq!(outcome.latest().unwrap().source, PayloadSource::Cache);
    }

    #[tokio::test]
    async fn test_collect_nothing_arrived() {
        let items: Vec<Result<Payload, CacheError>> =
            vec![Err(CacheError::not_modified("https://example.com/a.png"))];
        let outcome = LoadOutcome::collect(futures::stream::iter(items)).await;

        assert!(!outcome.has_value());
        assert!(!outcome.is_revalidated_unchanged());
    }

    #[test]
    fn test_payload_source_labels() {
        assert_eq!(PayloadSource::Cache.as_str(), "cache");
        assert_eq!(PayloadSource::Network.as_str(), "network");
    }

    #[test]
    fn test_transform_quality_default() {
        let opts: TransformOptions = toml::from_str("width = 10\nheight = 20").unwrap();
        assert_eq!(opts.quality, 100);
    }
}
